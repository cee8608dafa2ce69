//! Kesef configuration
//!
//! Holds the household profile (card numbers and spenders), duplicate
//! detection thresholds and import limits.
//!
//! ## Configuration Resolution
//!
//! Config is loaded with a two-layer resolution:
//! 1. Check for override in data dir (~/.local/share/kesef/config/kesef.toml)
//! 2. Fall back to embedded defaults (compiled into binary)

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::profile::{CardPattern, UserProfile};

/// Embedded default config (compiled into binary)
const DEFAULT_CONFIG: &str = include_str!("../../../config/kesef.toml");

/// Duplicate detection thresholds
#[derive(Debug, Clone, PartialEq)]
pub struct DedupConfig {
    /// Minimum confidence reported by the pre-insert check
    pub near_duplicate_threshold: f64,
    /// Minimum confidence reported by the full-database scan
    pub scan_threshold: f64,
    /// Days on either side of a candidate searched by the pre-insert check
    pub window_days: i64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            near_duplicate_threshold: 0.75,
            scan_threshold: 0.6,
            window_days: 3,
        }
    }
}

/// Import limits
#[derive(Debug, Clone, PartialEq)]
pub struct ImportConfig {
    /// Rows per sheet inspected by the format detector
    pub detect_scan_rows: usize,
    /// Maximum rows written per database transaction
    pub batch_size: usize,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            detect_scan_rows: 100,
            batch_size: 400,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    pub profile: UserProfile,
    pub dedup: DedupConfig,
    pub import: ImportConfig,
}

impl Config {
    /// Load from the default override location, else the embedded defaults
    pub fn load() -> Result<Self> {
        load_config(None)
    }

    /// Load from a specific override file (embedded defaults if it does not exist)
    pub fn load_from(path: &Path) -> Result<Self> {
        load_config(Some(path))
    }

    /// Parse config from TOML content
    pub fn from_toml(content: &str) -> Result<Self> {
        parse_config(content)
    }
}

/// Default config override path
pub fn default_config_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("kesef").join("config").join("kesef.toml"))
}

/// Load configuration (override first, then default)
fn load_config(override_path: Option<&Path>) -> Result<Config> {
    let path = match override_path {
        Some(p) => Some(p.to_path_buf()),
        None => default_config_path(),
    };

    let content = match path {
        Some(ref p) if p.exists() => {
            debug!("Loading config override from {}", p.display());
            fs::read_to_string(p)?
        }
        _ => DEFAULT_CONFIG.to_string(),
    };

    parse_config(&content)
}

/// Raw config structure for TOML parsing
#[derive(Debug, Deserialize)]
struct RawConfig {
    profile: Option<RawProfile>,
    dedup: Option<RawDedup>,
    import: Option<RawImport>,
}

#[derive(Debug, Deserialize)]
struct RawProfile {
    default_spender: Option<String>,
    spenders: Option<Vec<String>>,
    cards: Option<Vec<RawCard>>,
}

#[derive(Debug, Deserialize)]
struct RawCard {
    number: String,
    spender: String,
}

#[derive(Debug, Deserialize)]
struct RawDedup {
    near_duplicate_threshold: Option<f64>,
    scan_threshold: Option<f64>,
    window_days: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RawImport {
    detect_scan_rows: Option<usize>,
    batch_size: Option<usize>,
}

fn parse_config(content: &str) -> Result<Config> {
    let raw: RawConfig = toml::from_str(content)
        .map_err(|e| Error::Config(format!("Invalid config TOML: {}", e)))?;

    let mut config = Config::default();

    if let Some(profile) = raw.profile {
        if let Some(default_spender) = profile.default_spender {
            config.profile.default_spender = default_spender;
        }
        if let Some(spenders) = profile.spenders {
            config.profile.spenders = spenders;
        }
        if let Some(cards) = profile.cards {
            config.profile.cards = cards
                .into_iter()
                .filter(|c| !c.number.trim().is_empty())
                .map(|c| CardPattern {
                    number: c.number.trim().to_string(),
                    spender: c.spender,
                })
                .collect();
        }
        for card in &config.profile.cards {
            if !config.profile.spenders.contains(&card.spender) {
                config.profile.spenders.push(card.spender.clone());
            }
        }
    }

    if let Some(dedup) = raw.dedup {
        if let Some(threshold) = dedup.near_duplicate_threshold {
            config.dedup.near_duplicate_threshold = check_threshold(threshold)?;
        }
        if let Some(threshold) = dedup.scan_threshold {
            config.dedup.scan_threshold = check_threshold(threshold)?;
        }
        if let Some(days) = dedup.window_days {
            config.dedup.window_days = check_window_days(days)?;
        }
    }

    if let Some(import) = raw.import {
        if let Some(rows) = import.detect_scan_rows {
            config.import.detect_scan_rows = rows.max(1);
        }
        if let Some(size) = import.batch_size {
            config.import.batch_size = size.max(1);
        }
    }

    Ok(config)
}

fn check_threshold(value: f64) -> Result<f64> {
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(Error::Config(format!(
            "Confidence threshold must be between 0 and 1, got {}",
            value
        )))
    }
}

/// Longest pre-insert search window, in days either side of the candidate
pub const MAX_WINDOW_DAYS: i64 = 366;

fn check_window_days(days: i64) -> Result<i64> {
    if (0..=MAX_WINDOW_DAYS).contains(&days) {
        Ok(days)
    } else {
        Err(Error::Config(format!(
            "window_days must be between 0 and {}, got {}",
            MAX_WINDOW_DAYS, days
        )))
    }
}
