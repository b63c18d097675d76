//! Typed configuration, the counterpart of the benchmark driver's CLI flags.
//!
//! `EngineConfig` is constructed programmatically (or via `serde` from a
//! config file) rather than parsed from `argv` directly — the CLI surface
//! itself is out of scope for the engine crate, but every flag it would
//! expose has a field here.

use crate::error::{Result, SpitfireError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Which tiers back the buffer pool. Mirrors the benchmark driver's
/// `bp_mode` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BufferPoolMode {
    /// DRAM + DRAM-as-second-tier + SSD (NVM tier disabled, second tier is
    /// just more DRAM capacity).
    DramDramSsd,
    /// DRAM + NVM + SSD, the full three-tier design.
    DramNvmSsd,
    /// DRAM + SSD, no middle tier at all.
    DramSsd,
    /// NVM + SSD, no DRAM cache (cold-start / capacity-constrained mode).
    NvmSsd,
}

impl BufferPoolMode {
    /// Whether this mode has a distinct middle (NVM) tier at all.
    pub fn has_nvm_tier(&self) -> bool {
        matches!(self, BufferPoolMode::DramDramSsd | BufferPoolMode::DramNvmSsd)
    }

    /// Whether the middle tier is persistent NVM (vs. more DRAM).
    pub fn middle_tier_is_nvm(&self) -> bool {
        matches!(self, BufferPoolMode::DramNvmSsd)
    }
}

/// Migration probabilities for the `Dr`/`Dw`/`Nr`/`Nw` table in the buffer
/// manager's tier-migration policy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MigrationProbabilities {
    /// Probability an SSD-tier read promotes the page to DRAM.
    pub dram_read_prob: f64,
    /// Probability a dirty DRAM-tier page write demotes a copy toward NVM
    /// instead of leaving it DRAM-resident only.
    pub dram_write_prob: f64,
    /// Probability an NVM-tier read promotes the page to DRAM.
    pub nvm_read_prob: f64,
    /// Probability an NVM-tier write is additionally buffered in DRAM.
    pub nvm_write_prob: f64,
}

impl Default for MigrationProbabilities {
    fn default() -> Self {
        Self {
            dram_read_prob: 0.2,
            dram_write_prob: 0.5,
            nvm_read_prob: 0.3,
            nvm_write_prob: 0.7,
        }
    }
}

impl MigrationProbabilities {
    fn validate(&self) -> Result<()> {
        for (name, v) in [
            ("dram_read_prob", self.dram_read_prob),
            ("dram_write_prob", self.dram_write_prob),
            ("nvm_read_prob", self.nvm_read_prob),
            ("nvm_write_prob", self.nvm_write_prob),
        ] {
            if !(0.0..=1.0).contains(&v) {
                return Err(SpitfireError::InvalidConfig(format!(
                    "{name} must be in [0.0, 1.0], got {v}"
                )));
            }
        }
        Ok(())
    }
}

/// Full engine configuration: the typed equivalent of every CLI flag the
/// benchmark driver recognizes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub scale_factor: f64,
    pub duration_secs: f64,
    pub profile_duration_secs: f64,
    pub backend_count: usize,
    pub warehouse_count: usize,
    pub loader_count: usize,

    pub bp_mode: BufferPoolMode,
    pub db_path: PathBuf,
    pub nvm_path: PathBuf,
    pub wal_path: PathBuf,

    pub migration: MigrationProbabilities,

    pub dram_buf_num_pages: usize,
    pub nvm_buf_num_pages: usize,

    pub mini_page: bool,
    pub direct_io: bool,
    pub enable_annealing: bool,
    pub enable_hymem: bool,
    /// Fraction of NVM pages the admission-set FIFO tracks.
    pub admission_set_sz: f64,

    pub load_existing_db: bool,
    pub warmup_duration_secs: f64,

    /// Page size in bytes. Fixed at 16 KiB per the persistent page layout;
    /// kept as a field (rather than a bare constant) so tests can shrink it.
    pub page_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scale_factor: 1.0,
            duration_secs: 60.0,
            profile_duration_secs: 1.0,
            backend_count: num_cpus::get(),
            warehouse_count: 1,
            loader_count: 1,

            bp_mode: BufferPoolMode::DramNvmSsd,
            db_path: PathBuf::from("./data/ssd"),
            nvm_path: PathBuf::from("./data/nvm"),
            wal_path: PathBuf::from("./data/wal"),

            migration: MigrationProbabilities::default(),

            dram_buf_num_pages: 4096,
            nvm_buf_num_pages: 65536,

            mini_page: false,
            direct_io: false,
            enable_annealing: false,
            enable_hymem: false,
            admission_set_sz: 0.1,

            load_existing_db: false,
            warmup_duration_secs: 0.0,

            page_size: 16 * 1024,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        self.migration.validate()?;
        if self.dram_buf_num_pages == 0 {
            return Err(SpitfireError::InvalidConfig(
                "dram_buf_num_pages must be > 0".into(),
            ));
        }
        if self.bp_mode.has_nvm_tier() && self.nvm_buf_num_pages == 0 {
            return Err(SpitfireError::InvalidConfig(
                "nvm_buf_num_pages must be > 0 when bp_mode uses a middle tier".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.admission_set_sz) {
            return Err(SpitfireError::InvalidConfig(
                "admission_set_sz must be in [0.0, 1.0]".into(),
            ));
        }
        if self.page_size == 0 || self.page_size % 512 != 0 {
            return Err(SpitfireError::InvalidConfig(
                "page_size must be a nonzero multiple of 512".into(),
            ));
        }
        Ok(())
    }
}

/// Builder for `EngineConfig`, mirroring the benchmark driver's flag-by-flag
/// construction without requiring every caller to spell out every field.
#[derive(Debug, Clone, Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
        }
    }

    pub fn bp_mode(mut self, mode: BufferPoolMode) -> Self {
        self.config.bp_mode = mode;
        self
    }

    pub fn db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.db_path = path.into();
        self
    }

    pub fn nvm_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.nvm_path = path.into();
        self
    }

    pub fn wal_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.wal_path = path.into();
        self
    }

    pub fn migration(mut self, migration: MigrationProbabilities) -> Self {
        self.config.migration = migration;
        self
    }

    pub fn dram_buf_num_pages(mut self, n: usize) -> Self {
        self.config.dram_buf_num_pages = n;
        self
    }

    pub fn nvm_buf_num_pages(mut self, n: usize) -> Self {
        self.config.nvm_buf_num_pages = n;
        self
    }

    pub fn enable_hymem(mut self, enabled: bool) -> Self {
        self.config.enable_hymem = enabled;
        self
    }

    pub fn mini_page(mut self, enabled: bool) -> Self {
        self.config.mini_page = enabled;
        self
    }

    pub fn direct_io(mut self, enabled: bool) -> Self {
        self.config.direct_io = enabled;
        self
    }

    pub fn build(self) -> Result<EngineConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn out_of_range_probability_rejected() {
        let mut cfg = EngineConfig::default();
        cfg.migration.dram_read_prob = 1.5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn zero_dram_pages_rejected() {
        let mut cfg = EngineConfig::default();
        cfg.dram_buf_num_pages = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn builder_produces_valid_config() {
        let cfg = EngineConfigBuilder::new()
            .bp_mode(BufferPoolMode::DramSsd)
            .dram_buf_num_pages(128)
            .build()
            .unwrap();
        assert_eq!(cfg.bp_mode, BufferPoolMode::DramSsd);
        assert_eq!(cfg.dram_buf_num_pages, 128);
    }

    #[test]
    fn dram_ssd_mode_has_no_nvm_tier() {
        assert!(!BufferPoolMode::DramSsd.has_nvm_tier());
        assert!(BufferPoolMode::DramNvmSsd.has_nvm_tier());
        assert!(BufferPoolMode::DramNvmSsd.middle_tier_is_nvm());
        assert!(!BufferPoolMode::DramDramSsd.middle_tier_is_nvm());
    }
}
