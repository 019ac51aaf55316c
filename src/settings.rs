//! Program Cache Settings
//!
//! [`CacheSettings`] is plain data: it derives `serde` traits so a host can
//! keep it inside its own configuration file, and every field has a default
//! so partial documents deserialize.
//!
//! ```rust,ignore
//! use vesta::settings::{CacheSettings, ReplayMode};
//!
//! let settings = CacheSettings {
//!     cache_dir: Some("cache".into()),
//!     replay: ReplayMode::Background,
//!     ..Default::default()
//! };
//! assert_eq!(settings.cache_path().unwrap(), std::path::Path::new("cache/programs.vcache"));
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Extension of the store file.
pub const CACHE_FILE_EXTENSION: &str = "vcache";

/// How persisted programs are brought back at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayMode {
    /// Compile every stored program inside `init`.
    #[default]
    Blocking,
    /// Decode and generate on a worker thread; the host drains the results
    /// with [`ProgramCache::apply_prewarmed`](crate::cache::ProgramCache::apply_prewarmed).
    Background,
    /// Keep appending new programs but never replay old ones.
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// File stem of the store, so several caches can share a directory.
    pub name: String,
    /// Directory holding the store. `None` keeps the cache in memory only.
    pub cache_dir: Option<PathBuf>,
    /// Master switch for persistence.
    pub disk_cache: bool,
    /// Store driver program binaries next to the keys when the driver
    /// supports them, and load them on replay. When off, stored binaries are
    /// ignored and replay recompiles from source.
    pub program_binaries: bool,
    pub replay: ReplayMode,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            name: "programs".to_owned(),
            cache_dir: None,
            disk_cache: true,
            program_binaries: true,
            replay: ReplayMode::Blocking,
        }
    }
}

impl CacheSettings {
    /// Settings for a cache that never touches the filesystem.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            disk_cache: false,
            ..Self::default()
        }
    }

    /// Location of the store, or `None` when persistence is off.
    #[must_use]
    pub fn cache_path(&self) -> Option<PathBuf> {
        if !self.disk_cache {
            return None;
        }
        let dir = self.cache_dir.as_ref()?;
        Some(dir.join(format!("{}.{CACHE_FILE_EXTENSION}", self.name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_path() {
        let settings = CacheSettings {
            name: "ubershaders".into(),
            cache_dir: Some(PathBuf::from("/tmp/vesta")),
            ..CacheSettings::default()
        };
        assert_eq!(
            settings.cache_path(),
            Some(PathBuf::from("/tmp/vesta/ubershaders.vcache"))
        );
    }

    #[test]
    fn test_no_path_without_dir_or_when_disabled() {
        assert_eq!(CacheSettings::default().cache_path(), None);

        let disabled = CacheSettings {
            cache_dir: Some(PathBuf::from("/tmp")),
            ..CacheSettings::in_memory()
        };
        assert_eq!(disabled.cache_path(), None);
    }
}
