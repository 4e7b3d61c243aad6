// warden-core/src/domain/protection/heuristics.rs

// "Does this value look like ciphertext?" Each signal alone is weak; the verdict
// only trusts them in aggregate over a sample (see verdict.rs).

use super::ProtectionSettings;
use std::collections::HashMap;

/// Shannon entropy in bits per character.
pub fn shannon_entropy(value: &str) -> f64 {
    let len = value.chars().count();
    if len == 0 {
        return 0.0;
    }
    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in value.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }
    freq.values()
        .map(|&n| {
            let p = n as f64 / len as f64;
            -p * p.log2()
        })
        .sum()
}

/// Base64 alphabet, length a multiple of 4, at least 16 chars, and not a plain word.
pub fn looks_base64(value: &str) -> bool {
    let len = value.len();
    if len < 16 || len % 4 != 0 {
        return false;
    }
    let body = value.trim_end_matches('=');
    if len - body.len() > 2 {
        return false;
    }
    let alphabet = body
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '/');
    // Plain alphabetic words of the right length are not evidence.
    let non_alpha = body.chars().any(|c| c.is_ascii_digit() || c == '+' || c == '/') || body.len() < len;
    alphabet && non_alpha
}

/// Even-length hex string of at least 32 chars (a 128-bit digest or longer).
pub fn looks_hex(value: &str) -> bool {
    value.len() >= 32 && value.len() % 2 == 0 && value.chars().all(|c| c.is_ascii_hexdigit())
}

pub fn has_encryption_prefix(value: &str, prefixes: &[String]) -> bool {
    prefixes.iter().any(|p| value.starts_with(p.as_str()))
}

pub fn looks_encrypted(value: &str, settings: &ProtectionSettings) -> bool {
    let value = value.trim();
    has_encryption_prefix(value, &settings.encryption_prefixes)
        || looks_base64(value)
        || looks_hex(value)
        || shannon_entropy(value) > settings.entropy_threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entropy() {
        assert_eq!(shannon_entropy(""), 0.0);
        assert_eq!(shannon_entropy("aaaa"), 0.0);
        assert!((shannon_entropy("ab") - 1.0).abs() < 1e-9);
        assert!(shannon_entropy("hello world") < 4.5);
    }

    #[test]
    fn test_shapes() {
        assert!(looks_base64("U2FsdGVkX1+vupppZksvRf5pq5g5XjFRlipRkwB0K1Y="));
        assert!(!looks_base64("ChristopherSmith"));
        assert!(!looks_base64("john.doe@example.com"));
        assert!(looks_hex("9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08"));
        assert!(!looks_hex("deadbeef"));
    }

    #[test]
    fn test_plaintext_is_not_encrypted() {
        let settings = ProtectionSettings::default();
        for plain in ["john.doe@example.com", "555-0142", "Jane Smith", "1985-04-12"] {
            assert!(!looks_encrypted(plain, &settings), "{plain}");
        }
        assert!(looks_encrypted("vault:v1:8SDd3WHDOjf7mq69CyCqYjBXAiQQAVZRkFM13ok481zoCmHnSeDX9vyf7w==", &settings));
        assert!(looks_encrypted("enc:short", &settings));
    }
}
