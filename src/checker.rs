//! Uid Collision Checker
//!
//! Debug instrument that remembers, per stage uid, the source text generated
//! for it. Regenerating a known uid must reproduce the stored text exactly;
//! anything else is a generator bug that would poison the disk cache.
//!
//! Distinct uids that happen to generate identical text are allowed. They are
//! counted, since they point at state bits the key could drop.
//!
//! The real checker is assembled in debug builds and when the `uid-checker`
//! feature is enabled. Otherwise [`UidChecker`] is a zero-sized no-op with the
//! same call sites.

use crate::uid::{ShaderUid, UidData};

#[cfg(any(debug_assertions, feature = "uid-checker"))]
mod enabled {
    use std::collections::BTreeMap;

    use rustc_hash::FxHashMap;
    use xxhash_rust::xxh3::xxh3_64;

    use crate::errors::{Result, VestaError};
    use crate::uid::{ShaderUid, UidData};

    struct Seen {
        source: String,
        /// `Debug` rendering of the decoded fields, kept for the report.
        fields: String,
    }

    /// Uid → generated source, with a reverse index on the source hash.
    pub struct UidChecker<T: UidData> {
        seen: BTreeMap<ShaderUid<T>, Seen>,
        by_source: FxHashMap<u64, ShaderUid<T>>,
        shared_sources: usize,
    }

    impl<T: UidData> Default for UidChecker<T> {
        fn default() -> Self {
            Self {
                seen: BTreeMap::new(),
                by_source: FxHashMap::default(),
                shared_sources: 0,
            }
        }
    }

    impl<T: UidData> UidChecker<T> {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Records the source generated for `uid`.
        ///
        /// # Errors
        ///
        /// [`VestaError::DeterminismViolation`] when `uid` was recorded
        /// before with different text.
        pub fn add_uid(&mut self, uid: &ShaderUid<T>, source: &str) -> Result<()> {
            if let Some(seen) = self.seen.get(uid) {
                if seen.source == source {
                    return Ok(());
                }
                return Err(VestaError::DeterminismViolation {
                    stage: T::STAGE,
                    uid: seen.fields.clone(),
                });
            }

            let hash = xxh3_64(source.as_bytes());
            if let Some(other) = self.by_source.get(&hash) {
                self.shared_sources += 1;
                log::debug!(
                    "{} uids {:?} and {:?} generate identical source",
                    T::STAGE,
                    other.data(),
                    uid.data()
                );
            } else {
                self.by_source.insert(hash, uid.clone());
            }

            self.seen.insert(
                uid.clone(),
                Seen {
                    source: source.to_owned(),
                    fields: format!("{:?}", uid.data()),
                },
            );
            Ok(())
        }

        /// Number of distinct uids recorded.
        #[must_use]
        pub fn len(&self) -> usize {
            self.seen.len()
        }

        #[must_use]
        pub fn is_empty(&self) -> bool {
            self.seen.is_empty()
        }

        /// Uids whose source was already produced by a different uid.
        #[must_use]
        pub fn shared_sources(&self) -> usize {
            self.shared_sources
        }

        pub fn clear(&mut self) {
            self.seen.clear();
            self.by_source.clear();
            self.shared_sources = 0;
        }
    }
}

#[cfg(not(any(debug_assertions, feature = "uid-checker")))]
mod disabled {
    use std::marker::PhantomData;

    use crate::errors::Result;
    use crate::uid::{ShaderUid, UidData};

    pub struct UidChecker<T: UidData>(PhantomData<T>);

    impl<T: UidData> Default for UidChecker<T> {
        fn default() -> Self {
            Self(PhantomData)
        }
    }

    impl<T: UidData> UidChecker<T> {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        #[inline]
        #[allow(clippy::unused_self, clippy::unnecessary_wraps)]
        pub fn add_uid(&mut self, _uid: &ShaderUid<T>, _source: &str) -> Result<()> {
            Ok(())
        }

        #[must_use]
        pub fn len(&self) -> usize {
            0
        }

        #[must_use]
        pub fn is_empty(&self) -> bool {
            true
        }

        #[must_use]
        pub fn shared_sources(&self) -> usize {
            0
        }

        pub fn clear(&mut self) {}
    }
}

#[cfg(any(debug_assertions, feature = "uid-checker"))]
pub use enabled::UidChecker;

#[cfg(not(any(debug_assertions, feature = "uid-checker")))]
pub use disabled::UidChecker;

/// Whether [`UidChecker`] records anything in this build.
pub const CHECKER_ENABLED: bool = cfg!(any(debug_assertions, feature = "uid-checker"));

/// Feeds a generated stage source to its checker.
///
/// A violation is logged and then panics: continuing would persist a program
/// whose key no longer describes its source.
pub(crate) fn check<T: UidData>(
    checker: &mut UidChecker<T>,
    uid: &ShaderUid<T>,
    source: &str,
) {
    if let Err(err) = checker.add_uid(uid, source) {
        log::error!("{err}");
        panic!("{err}");
    }
}
