use anyhow::{bail, Context, Result};
use config::{Config, Environment};
use serde::{Deserialize, Serialize};

const ENV_PREFIX: &str = "CONTACTS";

/// Tunables for candidate detection and normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractConfig {
    pub min_phone_digits: usize,
    pub max_phone_digits: usize,
    pub max_name_length: usize,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        ExtractConfig {
            min_phone_digits: 7,
            max_phone_digits: 15,
            max_name_length: 100,
        }
    }
}

/// Command-line overrides; `None` leaves the env/default value alone.
#[derive(Debug, Default, Clone, Copy)]
pub struct Overrides {
    pub min_phone_digits: Option<usize>,
    pub max_phone_digits: Option<usize>,
    pub max_name_length: Option<usize>,
}

impl ExtractConfig {
    /// Defaults, then `CONTACTS_*` environment variables, then CLI overrides.
    pub fn load(overrides: Overrides) -> Result<Self> {
        Self::from_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true), overrides)
    }

    fn from_source(env: Environment, overrides: Overrides) -> Result<Self> {
        let d = ExtractConfig::default();
        let settings = Config::builder()
            .set_default("min_phone_digits", d.min_phone_digits as i64)?
            .set_default("max_phone_digits", d.max_phone_digits as i64)?
            .set_default("max_name_length", d.max_name_length as i64)?
            .add_source(env)
            .build()
            .context("Failed to read extraction settings")?;

        let mut cfg: ExtractConfig = settings
            .try_deserialize()
            .context("Invalid extraction settings")?;

        if let Some(v) = overrides.min_phone_digits {
            cfg.min_phone_digits = v;
        }
        if let Some(v) = overrides.max_phone_digits {
            cfg.max_phone_digits = v;
        }
        if let Some(v) = overrides.max_name_length {
            cfg.max_name_length = v;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_phone_digits == 0 {
            bail!("min_phone_digits must be at least 1");
        }
        if self.min_phone_digits > self.max_phone_digits {
            bail!(
                "min_phone_digits ({}) exceeds max_phone_digits ({})",
                self.min_phone_digits,
                self.max_phone_digits
            );
        }
        if self.max_name_length == 0 {
            bail!("max_name_length must be at least 1");
        }
        Ok(())
    }
}

// ── Tests ──
