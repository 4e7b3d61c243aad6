// warden-core/src/domain/protection/verdict.rs

use super::heuristics::looks_encrypted;
use super::{ColumnMasking, ProtectionSettings};
use serde::{Deserialize, Serialize};

/// Ephemeral output of a verification. `sample` holds truncated offending values only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtectionVerificationResult {
    pub is_verified: bool,
    pub reason: String,
    #[serde(default)]
    pub sample: Vec<String>,
}

impl ProtectionVerificationResult {
    pub fn verified(reason: impl Into<String>) -> Self {
        Self {
            is_verified: true,
            reason: reason.into(),
            sample: vec![],
        }
    }

    pub fn failed(reason: impl Into<String>, sample: Vec<String>) -> Self {
        Self {
            is_verified: false,
            reason: reason.into(),
            sample,
        }
    }

    /// Both checks must hold independently.
    pub fn and(self, other: Self) -> Self {
        match (self.is_verified, other.is_verified) {
            (true, true) => Self::verified(format!("{}; {}", self.reason, other.reason)),
            (true, false) => other,
            (false, true) => self,
            (false, false) => {
                let mut sample = self.sample;
                sample.extend(other.sample);
                Self::failed(format!("{}; {}", self.reason, other.reason), sample)
            }
        }
    }

    /// Text used when a reopened issue explains itself.
    pub fn explanation(&self) -> String {
        if self.sample.is_empty() {
            self.reason.clone()
        } else {
            format!("{} (sample: {})", self.reason, self.sample.join(", "))
        }
    }
}

/// Keeps just enough of a value for an operator to recognise it.
pub fn truncate_evidence(value: &str, chars: usize) -> String {
    if value.chars().count() <= chars {
        value.to_string()
    } else {
        let head: String = value.chars().take(chars).collect();
        format!("{}…", head)
    }
}

/// An empty sample is indeterminate and therefore not verified.
pub fn evaluate_encryption(samples: &[String], settings: &ProtectionSettings) -> ProtectionVerificationResult {
    if samples.is_empty() {
        return ProtectionVerificationResult::failed(
            "encryption could not be verified: no non-null values to sample",
            vec![],
        );
    }

    let plaintext: Vec<&String> = samples
        .iter()
        .filter(|v| !looks_encrypted(v, settings))
        .collect();
    let passing = samples.len() - plaintext.len();
    let ratio = passing as f64 / samples.len() as f64;

    if ratio >= settings.pass_ratio {
        ProtectionVerificationResult::verified(format!(
            "encryption verified: {}/{} sampled values look encrypted",
            passing,
            samples.len()
        ))
    } else {
        let evidence = plaintext
            .iter()
            .take(settings.evidence_values)
            .map(|v| truncate_evidence(v, settings.evidence_chars))
            .collect();
        ProtectionVerificationResult::failed(
            format!(
                "encryption not verified: only {}/{} sampled values look encrypted (need {:.0}%)",
                passing,
                samples.len(),
                settings.pass_ratio * 100.0
            ),
            evidence,
        )
    }
}

/// Masking is a display concern: trust the catalog's recorded configuration, not stored bytes.
pub fn evaluate_masking(masking: Option<&ColumnMasking>) -> ProtectionVerificationResult {
    match masking {
        Some(m) if m.mask_in_ui => ProtectionVerificationResult::verified(match m.strategy {
            Some(s) => format!("masking verified: mask_in_ui with strategy {}", s),
            None => "masking verified: mask_in_ui is set".to_string(),
        }),
        Some(_) => ProtectionVerificationResult::failed("masking not verified: mask_in_ui is disabled", vec![]),
        None => ProtectionVerificationResult::failed(
            "masking not verified: no masking configuration recorded for the column",
            vec![],
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_single_plausible_value_is_not_enough() {
        let settings = ProtectionSettings::default();
        let samples = s(&["enc:9a8b7c6d5e4f", "alice@corp.com", "bob@corp.com", "carol@corp.com", "dave@corp.com"]);
        let r = evaluate_encryption(&samples, &settings);
        assert!(!r.is_verified);
        assert_eq!(r.sample.len(), 3);
        assert_eq!(r.sample[0], "alice@co…");
    }

    #[test]
    fn test_pass_ratio_boundary() {
        let settings = ProtectionSettings::default();
        let mut samples = vec!["enc:AAAAAAAAAAAA".to_string(); 8];
        samples.extend(s(&["plain one", "plain two"]));
        assert!(evaluate_encryption(&samples, &settings).is_verified);
    }

    #[test]
    fn test_empty_sample_is_indeterminate() {
        let r = evaluate_encryption(&[], &ProtectionSettings::default());
        assert!(!r.is_verified);
        assert!(r.reason.contains("no non-null values"));
    }

    #[test]
    fn test_masking_uses_catalog_flag() {
        assert!(evaluate_masking(Some(&ColumnMasking { mask_in_ui: true, strategy: None })).is_verified);
        assert!(!evaluate_masking(Some(&ColumnMasking::default())).is_verified);
        assert!(!evaluate_masking(None).is_verified);
    }

    #[test]
    fn test_both_must_verify() {
        let ok = ProtectionVerificationResult::verified("a");
        let ko = ProtectionVerificationResult::failed("b", vec!["x".into()]);
        assert!(!ok.clone().and(ko.clone()).is_verified);
        assert_eq!(ok.and(ko).sample, vec!["x".to_string()]);
    }
}
