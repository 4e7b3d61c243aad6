// warden-core/src/domain/protection/mod.rs

pub mod heuristics;
pub mod verdict;

pub use heuristics::{looks_encrypted, shannon_entropy};
pub use verdict::{ProtectionVerificationResult, evaluate_encryption, evaluate_masking};

use crate::domain::governance::MaskingStrategy;
use crate::domain::quality::Rule;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A live column whose protection is being verified.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnRef {
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    pub table: String,
    pub column: String,
}

impl ColumnRef {
    pub fn from_rule(rule: &Rule) -> Option<Self> {
        Some(Self {
            source: rule.scope.source.clone(),
            schema: rule.scope.schema.clone(),
            table: rule.scope.table.clone(),
            column: rule.scope.column.clone()?,
        })
    }

    /// `schema.table.column` as used for catalog lookups.
    pub fn key(&self) -> String {
        match &self.schema {
            Some(s) => format!("{}.{}.{}", s, self.table, self.column),
            None => format!("{}.{}", self.table, self.column),
        }
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source, self.key())
    }
}

/// Masking configuration recorded in the catalog for one column.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnMasking {
    #[serde(default)]
    pub mask_in_ui: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<MaskingStrategy>,
}

fn default_prefixes() -> Vec<String> {
    ["enc:", "ENC(", "vault:v", "gAAAAA", "$aes$", "-----BEGIN PGP", "AQICAH"]
        .iter()
        .map(|p| p.to_string())
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProtectionSettings {
    /// Bits per character above which a value is considered ciphertext.
    #[serde(default = "default_entropy_threshold")]
    pub entropy_threshold: f64,
    /// Share of samples that must look encrypted.
    #[serde(default = "default_pass_ratio")]
    pub pass_ratio: f64,
    #[serde(default = "default_sample_size")]
    pub sample_size: u64,
    #[serde(default = "default_sample_timeout")]
    pub sample_timeout_secs: u64,
    /// Offending values surfaced as evidence, and how many characters of each.
    #[serde(default = "default_evidence_values")]
    pub evidence_values: usize,
    #[serde(default = "default_evidence_chars")]
    pub evidence_chars: usize,
    #[serde(default = "default_prefixes")]
    pub encryption_prefixes: Vec<String>,
}

fn default_entropy_threshold() -> f64 {
    4.5
}
fn default_pass_ratio() -> f64 {
    0.8
}
fn default_sample_size() -> u64 {
    10
}
fn default_sample_timeout() -> u64 {
    10
}
fn default_evidence_values() -> usize {
    3
}
fn default_evidence_chars() -> usize {
    8
}

impl Default for ProtectionSettings {
    fn default() -> Self {
        Self {
            entropy_threshold: default_entropy_threshold(),
            pass_ratio: default_pass_ratio(),
            sample_size: default_sample_size(),
            sample_timeout_secs: default_sample_timeout(),
            evidence_values: default_evidence_values(),
            evidence_chars: default_evidence_chars(),
            encryption_prefixes: default_prefixes(),
        }
    }
}
