//! Simulation configuration file.

use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use ringkey_crypto::params::{DEFAULT_EXPONENT_LEN, DEFAULT_GENERATOR};
use ringkey_crypto::GroupParameters;
use serde::{Deserialize, Serialize};

use crate::simulate::SimulationOptions;

pub const DEFAULT_PARTICIPANTS: u32 = 3;
pub const DEFAULT_LABEL: &str = "ringkey-simulation";
pub const DEFAULT_MESSAGE: &str = "Hello, world";

/// Simulation settings, as read from a JSON file or from flags.
///
/// Every field is optional; unset fields fall back to the defaults above
/// and to the 3072-bit RFC 3526 group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    /// Number of participants in the ring
    pub participants: Option<u32>,
    /// Label the session id is derived from
    pub label: Option<String>,
    /// Message encrypted with the agreed key after the run
    pub message: Option<String>,
    /// Built-in RFC 3526 group size: 2048 or 3072
    pub modp_bits: Option<u32>,
    /// Custom modulus, hex encoded. Takes precedence over `modp_bits`.
    pub modulus_hex: Option<String>,
    pub generator: Option<u64>,
    /// Secret exponent size in bytes
    pub exponent_len: Option<usize>,
    /// Seed for reproducible secret exponents
    pub seed: Option<u64>,
}

impl SimulationConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&data).with_context(|| format!("parsing {}", path.display()))
    }

    /// Apply `overrides` on top of this configuration. Set fields in
    /// `overrides` win.
    pub fn merge(self, overrides: SimulationConfig) -> Self {
        Self {
            participants: overrides.participants.or(self.participants),
            label: overrides.label.or(self.label),
            message: overrides.message.or(self.message),
            modp_bits: overrides.modp_bits.or(self.modp_bits),
            modulus_hex: overrides.modulus_hex.or(self.modulus_hex),
            generator: overrides.generator.or(self.generator),
            exponent_len: overrides.exponent_len.or(self.exponent_len),
            seed: overrides.seed.or(self.seed),
        }
    }

    pub fn group_parameters(&self) -> Result<GroupParameters> {
        if let Some(modulus_hex) = &self.modulus_hex {
            let params = GroupParameters::from_hex(
                modulus_hex,
                self.generator.unwrap_or(DEFAULT_GENERATOR),
                self.exponent_len.unwrap_or(DEFAULT_EXPONENT_LEN),
            )?;
            return Ok(params);
        }
        if self.generator.is_some() || self.exponent_len.is_some() {
            bail!("generator and exponent_len need a custom modulus_hex");
        }
        modp_group(self.modp_bits.unwrap_or(3072))
    }

    pub fn into_options(self) -> Result<SimulationOptions> {
        let params = self.group_parameters()?;
        let participants = self.participants.unwrap_or(DEFAULT_PARTICIPANTS);
        if participants < 2 {
            return Err(anyhow!(
                "a ring needs at least 2 participants, got {}",
                participants
            ));
        }
        Ok(SimulationOptions {
            participants,
            label: self.label.unwrap_or_else(|| DEFAULT_LABEL.to_string()),
            message: self.message.unwrap_or_else(|| DEFAULT_MESSAGE.to_string()),
            params,
            seed: self.seed,
        })
    }
}

/// One of the built-in RFC 3526 groups.
pub fn modp_group(bits: u32) -> Result<GroupParameters> {
    match bits {
        2048 => Ok(GroupParameters::rfc3526_2048()),
        3072 => Ok(GroupParameters::rfc3526_3072()),
        other => bail!("no built-in {}-bit group, use 2048 or 3072", other),
    }
}
