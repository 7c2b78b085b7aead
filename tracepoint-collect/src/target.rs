//! Target description and encoder configuration
//!
//! The register layout is data: which architecture registers exist, their
//! sizes, and the number the remote agent knows each one by. It can be built
//! in code or loaded from JSON.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One raw architecture register
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterDesc {
    pub name: String,
    /// Size in bytes
    pub size: u32,
    /// Number used on the wire, `None` if the agent cannot collect it
    pub remote_number: Option<u32>,
}

/// A register synthesized from raw registers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PseudoRegister {
    pub name: String,
    pub size: u32,
    /// Architecture numbers of the raw registers it is built from
    pub raw: Vec<u32>,
}

/// Register layout of the traced target
///
/// Architecture register numbers run over `registers` first and continue
/// with `pseudo_registers`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetDescription {
    pub registers: Vec<RegisterDesc>,
    #[serde(default)]
    pub pseudo_registers: Vec<PseudoRegister>,
}

impl TargetDescription {
    /// `count` registers named `r0..`, each `size` bytes, remote number
    /// equal to the architecture number
    pub fn uniform(count: u32, size: u32) -> Self {
        Self {
            registers: (0..count)
                .map(|n| RegisterDesc {
                    name: format!("r{}", n),
                    size,
                    remote_number: Some(n),
                })
                .collect(),
            pseudo_registers: Vec::new(),
        }
    }

    /// Parse a description from JSON text
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse target description")
    }

    /// Load a description from a JSON file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read target description {}", path.display()))?;
        Self::from_json(&json)
    }

    /// Number of raw registers
    pub fn num_regs(&self) -> u32 {
        self.registers.len() as u32
    }

    /// Highest remote register number; sizes the collection mask
    pub fn max_remote_regno(&self) -> u32 {
        self.registers
            .iter()
            .filter_map(|r| r.remote_number)
            .max()
            .unwrap_or(0)
    }

    /// Remote number of a raw register
    pub fn remote_register_number(&self, regno: u32) -> Option<u32> {
        self.registers.get(regno as usize)?.remote_number
    }

    /// The pseudo register with architecture number `regno`, if it is one
    pub fn pseudo(&self, regno: u32) -> Option<&PseudoRegister> {
        let index = regno.checked_sub(self.num_regs())?;
        self.pseudo_registers.get(index as usize)
    }

    /// Size in bytes of any register
    pub fn register_size(&self, regno: u32) -> Option<u32> {
        match self.registers.get(regno as usize) {
            Some(reg) => Some(reg.size),
            None => self.pseudo(regno).map(|p| p.size),
        }
    }

    /// Architecture number for a register name, case-insensitive
    pub fn register_by_name(&self, name: &str) -> Option<u32> {
        let raw = self.registers.iter().map(|r| r.name.as_str());
        let pseudo = self.pseudo_registers.iter().map(|p| p.name.as_str());
        raw.chain(pseudo)
            .position(|n| n.eq_ignore_ascii_case(name))
            .map(|i| i as u32)
    }
}

/// Options for encoding a tracepoint's actions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodeConfig {
    /// Expression list collected at every tracepoint before its own actions
    #[serde(default)]
    pub default_collect: Option<String>,
}

impl EncodeConfig {
    pub fn with_default_collect(default_collect: impl Into<String>) -> Self {
        Self {
            default_collect: Some(default_collect.into()),
        }
    }
}
