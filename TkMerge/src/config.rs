//! Engine configuration
//!
//! Loaded from JSON; every field has a default so a partial file (or none at
//! all) is valid.
//!
//! ```
//! use tkmerge::config::TkConfig;
//!
//! let config = TkConfig::from_json(r#"{
//!     "array_rules": [{"key": "Tags", "strategy": "equality"}],
//!     "track_rsdb_removals": true
//! }"#)?;
//! assert!(config.track_rsdb_removals);
//! assert!(config.is_pack_extension("pack"));
//! # Ok::<(), tkmerge::Error>(())
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::compression::DEFAULT_LEVEL;
use crate::diff::ArrayRules;
use crate::error::Result;
use crate::tables::RsdbTableDef;

/// Archive extensions handled as nested packs
const DEFAULT_PACK_EXTENSIONS: &[&str] = &["pack", "sarc", "blarc", "bfarc", "bkres", "genvb", "ta"];

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TkConfig {
    /// Array strategy overrides for generic trees, tried before auto-detection
    pub array_rules: ArrayRules,
    /// RSDB tables in addition to the built-in set
    pub extra_rsdb_tables: Vec<RsdbTableDef>,
    /// File extensions treated as nested archives
    pub pack_extensions: Vec<String>,
    /// Record RSDB rows missing from a mod as removals
    pub track_rsdb_removals: bool,
    /// Zstd level used when writing merged output
    pub zstd_level: i32,
}

impl Default for TkConfig {
    fn default() -> Self {
        Self {
            array_rules: ArrayRules::new(),
            extra_rsdb_tables: Vec::new(),
            pack_extensions: DEFAULT_PACK_EXTENSIONS
                .iter()
                .map(|ext| (*ext).to_string())
                .collect(),
            track_rsdb_removals: false,
            zstd_level: DEFAULT_LEVEL,
        }
    }
}

impl TkConfig {
    /// Parse a configuration from JSON text
    ///
    /// # Errors
    /// Returns an error if the JSON is malformed.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a configuration file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Save the configuration as pretty-printed JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Whether `extension` (without the dot) names an archive
    #[must_use]
    pub fn is_pack_extension(&self, extension: &str) -> bool {
        self.pack_extensions
            .iter()
            .any(|ext| ext.eq_ignore_ascii_case(extension))
    }
}
