//! In-Memory Program Cache
//!
//! Owner of every program built for a [`PipelineKey`]. Lookups go through
//! two levels:
//!
//! - **Fast path**: the most recently requested key and its handle. Draws
//!   usually reuse the previous pipeline, so most requests stop here without
//!   touching the map.
//! - **Program map**: a `BTreeMap` ordered by the canonical key order, so
//!   [`ProgramCache::entries`] traverses the same way on every run.
//!
//! On a miss the generator produces source for every stage the key needs,
//! the driver compiles and links it, and the new program is appended to the
//! disk cache before it enters the map. A failed build inserts nothing.
//! The cache remembers every key the store already holds, so a program is
//! written at most once per store no matter how often it is rebuilt.
//!
//! # Lifecycle
//!
//! [`ProgramCache::init`] opens the disk cache and replays it according to
//! [`ReplayMode`]; [`ProgramCache::shutdown`] destroys every program, syncs
//! the store and hands the driver back. The cache is single-threaded: all
//! driver calls happen on the thread that owns it. Background replay only
//! moves store reading and source generation to a worker (see
//! [`crate::prewarm`]).

use std::collections::{BTreeMap, BTreeSet};

use crate::checker::{UidChecker, check};
use crate::disk_cache::{CacheHeader, DiskCache};
use crate::driver::{ProgramBinary, ProgramDriver, ShaderStage};
use crate::errors::Result;
use crate::generator::{ProgramGenerator, ProgramSources, ShaderGenerator};
use crate::pipeline_key::PipelineKey;
use crate::prewarm::{PrewarmReport, Prewarmer};
use crate::program::{CacheEntry, CompiledProgram};
use crate::settings::{CacheSettings, ReplayMode};
use crate::state::RenderState;
use crate::uid::{GeometryUidData, PixelUidData, VertexUidData};

// ─── Statistics ──────────────────────────────────────────────────────────────

/// Counters since `init`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub fast_path_hits: u64,
    pub map_hits: u64,
    /// Programs linked from source.
    pub compiles: u64,
    /// Builds rejected by the driver, at request or replay time.
    pub compile_failures: u64,
    /// Programs restored from a stored driver binary.
    pub binary_loads: u64,
    /// Programs restored from the disk cache, by either replay path.
    pub disk_records_loaded: u64,
    /// Stored records dropped: bad checksum, undecodable key, failed rebuild.
    pub disk_records_rejected: u64,
    pub disk_appends: u64,
}

impl CacheStats {
    /// Requests answered without building anything.
    #[must_use]
    pub fn hits(&self) -> u64 {
        self.fast_path_hits + self.map_hits
    }
}

// ─── Program Cache ───────────────────────────────────────────────────────────

/// Pipeline key → compiled program, backed by a persistent store.
pub struct ProgramCache<D: ProgramDriver, G: ProgramGenerator = ShaderGenerator> {
    driver: D,
    generator: G,
    settings: CacheSettings,

    entries: BTreeMap<PipelineKey, CacheEntry<D::Program>>,
    last: Option<(PipelineKey, D::Program)>,

    disk: Option<DiskCache>,
    /// Keys with a record in `disk`. Survives `clear`.
    persisted: BTreeSet<PipelineKey>,
    /// Bumped whenever `disk` is emptied.
    store_epoch: u64,

    pixel_checker: UidChecker<PixelUidData>,
    vertex_checker: UidChecker<VertexUidData>,
    geometry_checker: UidChecker<GeometryUidData>,

    stats: CacheStats,
}

impl<D: ProgramDriver, G: ProgramGenerator> ProgramCache<D, G> {
    /// Opens the disk cache named by `settings` and replays it.
    ///
    /// With [`ReplayMode::Blocking`] every stored program is rebuilt before
    /// this returns. With [`ReplayMode::Background`] nothing is replayed
    /// here; call [`start_prewarm`](Self::start_prewarm). Every mode
    /// indexes the stored keys so they are never appended twice.
    pub fn init(driver: D, generator: G, settings: CacheSettings) -> Result<Self> {
        let disk = match settings.cache_path() {
            Some(path) => {
                let header = CacheHeader::new(generator.version(), &driver.fingerprint());
                Some(DiskCache::open(path, header)?)
            }
            None => None,
        };

        let mut cache = Self {
            driver,
            generator,
            settings,
            entries: BTreeMap::new(),
            last: None,
            disk,
            persisted: BTreeSet::new(),
            store_epoch: 0,
            pixel_checker: UidChecker::new(),
            vertex_checker: UidChecker::new(),
            geometry_checker: UidChecker::new(),
            stats: CacheStats::default(),
        };

        match cache.settings.replay {
            ReplayMode::Blocking => cache.replay()?,
            ReplayMode::Background | ReplayMode::Disabled => cache.index_store()?,
        }

        Ok(cache)
    }

    /// Returns the program for `key`, building it on first use.
    ///
    /// # Errors
    ///
    /// [`VestaError::CompileFailure`](crate::errors::VestaError::CompileFailure)
    /// or [`VestaError::LinkFailure`](crate::errors::VestaError::LinkFailure)
    /// when the driver rejects the generated program. Nothing is cached in
    /// that case, so a later request retries.
    pub fn get_or_create(&mut self, key: &PipelineKey) -> Result<D::Program> {
        if let Some((last_key, handle)) = &self.last
            && last_key == key
        {
            self.stats.fast_path_hits += 1;
            return Ok(*handle);
        }

        if let Some(entry) = self.entries.get(key) {
            let handle = entry.handle();
            self.stats.map_hits += 1;
            self.last = Some((key.clone(), handle));
            return Ok(handle);
        }

        let sources = self.generator.sources(key)?;
        self.check_sources(key, &sources);

        let handle = match self.build(&sources) {
            Ok(handle) => handle,
            Err(err) => {
                log::warn!("No program available for {key:?}: {err}");
                return Err(err);
            }
        };

        let in_cache = self.persist(key, handle);
        self.entries.insert(
            key.clone(),
            CacheEntry {
                program: CompiledProgram::new(handle, sources),
                in_cache,
            },
        );
        self.last = Some((key.clone(), handle));

        Ok(handle)
    }

    /// [`get_or_create`](Self::get_or_create) for the key of a state snapshot.
    pub fn get_for_state(&mut self, state: &RenderState) -> Result<D::Program> {
        self.get_or_create(&PipelineKey::from_state(state))
    }

    /// Destroys every program. The disk cache is left as is, and keys it
    /// holds are not appended again when rebuilt.
    pub fn clear(&mut self) {
        let count = self.entries.len();
        for (_, entry) in std::mem::take(&mut self.entries) {
            self.driver.destroy(entry.program.handle());
        }
        self.last = None;
        log::debug!("Program cache cleared ({count} programs destroyed)");
    }

    /// Destroys every program and empties the disk cache.
    pub fn invalidate(&mut self) -> Result<()> {
        self.clear();
        if let Some(disk) = self.disk.as_mut() {
            disk.reset()?;
            self.persisted.clear();
            self.store_epoch += 1;
            log::info!("Disk cache {} invalidated", disk.path().display());
        }
        Ok(())
    }

    /// Tears the cache down and returns the driver.
    pub fn shutdown(mut self) -> D {
        self.clear();
        if let Some(disk) = self.disk.as_mut()
            && let Err(err) = disk.flush()
        {
            log::warn!("Failed to flush disk cache {}: {err}", disk.path().display());
        }
        let Self { driver, .. } = self;
        driver
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    #[must_use]
    pub fn program(&self, key: &PipelineKey) -> Option<&CompiledProgram<D::Program>> {
        self.entries.get(key).map(CacheEntry::program)
    }

    #[must_use]
    pub fn contains(&self, key: &PipelineKey) -> bool {
        self.entries.contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in canonical key order.
    pub fn entries(&self) -> impl Iterator<Item = (&PipelineKey, &CacheEntry<D::Program>)> {
        self.entries.iter()
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    #[must_use]
    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    #[must_use]
    pub fn generator(&self) -> &G {
        &self.generator
    }

    #[must_use]
    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    #[must_use]
    pub fn disk_cache(&self) -> Option<&DiskCache> {
        self.disk.as_ref()
    }

    // ── Background Replay ────────────────────────────────────────────────────

    /// Starts reading the disk cache on a worker thread.
    ///
    /// `None` unless the replay mode is [`ReplayMode::Background`] and a
    /// disk cache is open.
    pub fn start_prewarm(&self) -> Option<Prewarmer>
    where
        G: Clone + Send + 'static,
    {
        if self.settings.replay != ReplayMode::Background {
            return None;
        }
        let snapshot = self.disk.as_ref()?.snapshot();
        Some(Prewarmer::spawn(
            snapshot,
            self.generator.clone(),
            self.store_epoch,
        ))
    }

    /// Builds up to `budget` programs the worker has prepared.
    ///
    /// Keys the render thread already requested are skipped without counting
    /// against the budget. A prewarmer started before the last
    /// [`invalidate`](Self::invalidate) yields nothing. Returns the number of
    /// programs inserted.
    pub fn apply_prewarmed(&mut self, prewarmer: &Prewarmer, budget: usize) -> usize {
        if prewarmer.epoch() != self.store_epoch {
            log::debug!("Ignoring pre-warmed programs from an invalidated store");
            return 0;
        }

        let mut applied = 0;
        while applied < budget {
            let Some(item) = prewarmer.try_next() else {
                break;
            };
            if self.entries.contains_key(&item.key) {
                continue;
            }

            self.check_sources(&item.key, &item.sources);
            match self.load_or_build(&item.sources, item.binary.as_ref()) {
                Ok(handle) => {
                    self.entries.insert(
                        item.key,
                        CacheEntry {
                            program: CompiledProgram::new(handle, item.sources),
                            in_cache: true,
                        },
                    );
                    self.stats.disk_records_loaded += 1;
                    applied += 1;
                }
                Err(err) => {
                    log::warn!("Dropping stored program {:?}: {err}", item.key);
                    self.stats.disk_records_rejected += 1;
                }
            }
        }
        applied
    }

    /// Waits for the worker and folds its rejections into the stats.
    pub fn finish_prewarm(&mut self, prewarmer: Prewarmer) -> Result<PrewarmReport> {
        let report = prewarmer.join()?;
        self.stats.disk_records_rejected += report.rejected as u64;
        Ok(report)
    }

    // ── Internals ────────────────────────────────────────────────────────────

    /// Rebuilds every program stored in the disk cache.
    fn replay(&mut self) -> Result<()> {
        let Some(disk) = self.disk.as_mut() else {
            return Ok(());
        };

        let mut records = Vec::new();
        let summary = disk.read_all(|key, value| records.push((key.to_vec(), value.to_vec())))?;
        self.stats.disk_records_rejected += summary.rejected as u64;

        for (key_bytes, value) in records {
            let key = match PipelineKey::from_bytes(&key_bytes) {
                Ok(key) => key,
                Err(err) => {
                    log::warn!("Dropping stored program: {err}");
                    self.stats.disk_records_rejected += 1;
                    continue;
                }
            };
            self.persisted.insert(key.clone());
            if self.entries.contains_key(&key) {
                continue;
            }

            let built = self.generator.sources(&key).and_then(|sources| {
                self.check_sources(&key, &sources);
                let binary = ProgramBinary::from_bytes(&value);
                let handle = self.load_or_build(&sources, binary.as_ref())?;
                Ok(CompiledProgram::new(handle, sources))
            });

            match built {
                Ok(program) => {
                    self.entries.insert(
                        key,
                        CacheEntry {
                            program,
                            in_cache: true,
                        },
                    );
                    self.stats.disk_records_loaded += 1;
                }
                Err(err) => {
                    log::warn!("Dropping stored program {key:?}: {err}");
                    self.stats.disk_records_rejected += 1;
                }
            }
        }

        log::info!(
            "Replayed {} programs from disk cache ({} rejected)",
            self.stats.disk_records_loaded,
            self.stats.disk_records_rejected
        );
        Ok(())
    }

    /// Records the keys of every stored program without building any.
    fn index_store(&mut self) -> Result<()> {
        let Some(disk) = self.disk.as_mut() else {
            return Ok(());
        };

        let persisted = &mut self.persisted;
        disk.read_all(|key, _| {
            if let Ok(key) = PipelineKey::from_bytes(key) {
                persisted.insert(key);
            }
        })?;

        log::debug!("Disk cache holds {} programs", self.persisted.len());
        Ok(())
    }

    fn check_sources(&mut self, key: &PipelineKey, sources: &ProgramSources) {
        check(&mut self.vertex_checker, key.vertex(), &sources.vertex);
        if let (Some(uid), Some(source)) = (key.geometry(), &sources.geometry) {
            check(&mut self.geometry_checker, uid, source);
        }
        check(&mut self.pixel_checker, key.pixel(), &sources.pixel);
    }

    /// Restores a program from its stored binary, or builds it from source
    /// when there is none, the driver refuses it, or binaries are turned off
    /// in the settings.
    fn load_or_build(
        &mut self,
        sources: &ProgramSources,
        binary: Option<&ProgramBinary>,
    ) -> Result<D::Program> {
        if self.settings.program_binaries
            && let Some(binary) = binary
            && self.driver.supports_binaries()
        {
            match self.driver.load_binary(binary) {
                Ok(handle) => {
                    self.stats.binary_loads += 1;
                    return Ok(handle);
                }
                Err(err) => log::debug!("Stored program binary refused, rebuilding: {err}"),
            }
        }
        self.build(sources)
    }

    /// Compiles every stage and links them. Stage objects never outlive
    /// this call, whether the build succeeds or not.
    fn build(&mut self, sources: &ProgramSources) -> Result<D::Program> {
        let plan = [
            (ShaderStage::Vertex, Some(&sources.vertex)),
            (ShaderStage::Geometry, sources.geometry.as_ref()),
            (ShaderStage::Pixel, Some(&sources.pixel)),
        ];

        let mut stages = Vec::with_capacity(plan.len());
        for (stage, source) in plan {
            let Some(source) = source else {
                continue;
            };
            match self.driver.compile_stage(stage, source) {
                Ok(compiled) => stages.push(compiled),
                Err(err) => {
                    for compiled in stages {
                        self.driver.destroy_stage(compiled);
                    }
                    self.stats.compile_failures += 1;
                    return Err(err.into());
                }
            }
        }

        let linked = self.driver.link(&stages);
        for compiled in stages {
            self.driver.destroy_stage(compiled);
        }

        match linked {
            Ok(handle) => {
                self.stats.compiles += 1;
                log::debug!("Linked program {handle:?}");
                Ok(handle)
            }
            Err(err) => {
                self.stats.compile_failures += 1;
                Err(err.into())
            }
        }
    }

    /// Appends a freshly built program to the disk cache unless the store
    /// already holds its key. Returns whether the record is now durable.
    fn persist(&mut self, key: &PipelineKey, handle: D::Program) -> bool {
        if self.disk.is_none() {
            return false;
        }
        if self.persisted.contains(key) {
            return true;
        }

        let value = if self.settings.program_binaries && self.driver.supports_binaries() {
            self.driver
                .program_binary(handle)
                .as_ref()
                .map(ProgramBinary::to_bytes)
                .unwrap_or_default()
        } else {
            Vec::new()
        };

        let Some(disk) = self.disk.as_mut() else {
            return false;
        };
        match disk.append(&key.to_bytes(), &value) {
            Ok(()) => {
                self.stats.disk_appends += 1;
                self.persisted.insert(key.clone());
                true
            }
            Err(err) => {
                log::warn!("Failed to persist program {key:?}: {err}");
                false
            }
        }
    }
}
