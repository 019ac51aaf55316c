//! Compiled programs and cache entries.

use crate::generator::ProgramSources;

/// A linked driver program together with the text it was built from.
///
/// Owned by exactly one cache entry. The sources are kept for diagnostics
/// only; programs loaded from a stored binary carry regenerated text.
#[derive(Debug)]
pub struct CompiledProgram<P> {
    handle: P,
    sources: ProgramSources,
}

impl<P: Copy> CompiledProgram<P> {
    pub(crate) fn new(handle: P, sources: ProgramSources) -> Self {
        Self { handle, sources }
    }

    /// The driver handle.
    #[inline]
    #[must_use]
    pub fn handle(&self) -> P {
        self.handle
    }

    #[must_use]
    pub fn sources(&self) -> &ProgramSources {
        &self.sources
    }
}

/// One slot of the in-memory program map.
#[derive(Debug)]
pub struct CacheEntry<P> {
    pub(crate) program: CompiledProgram<P>,
    /// The key is already durably recorded in the disk cache, either by an
    /// earlier run or by this one.
    pub(crate) in_cache: bool,
}

impl<P: Copy> CacheEntry<P> {
    #[must_use]
    pub fn program(&self) -> &CompiledProgram<P> {
        &self.program
    }

    #[inline]
    #[must_use]
    pub fn handle(&self) -> P {
        self.program.handle
    }

    #[must_use]
    pub fn in_cache(&self) -> bool {
        self.in_cache
    }
}
