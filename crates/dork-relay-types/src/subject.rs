//! Subject parsing, validation, wildcard matching, and hashing.
//!
//! A subject is a dot-separated sequence of tokens (`relay.agent.backend`).
//! Patterns additionally allow `*` (exactly one token) and `>` (one or more
//! trailing tokens, terminal only).

use sha2::{Digest, Sha256};

/// Validate a *concrete* subject (no wildcards).
///
/// # Errors
/// Returns a description of why the subject was rejected.
pub fn validate_subject(subject: &str) -> Result<(), String> {
    if subject.is_empty() {
        return Err("subject must not be empty".to_owned());
    }
    if subject.starts_with('.') || subject.ends_with('.') || subject.contains("..") {
        return Err("subject must not have leading, trailing, or doubled dots".to_owned());
    }
    let tokens: Vec<&str> = subject.split('.').collect();
    if tokens.first() != Some(&"relay") {
        return Err("subject must begin with the 'relay' token".to_owned());
    }
    for token in &tokens {
        if token.is_empty() || !token.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
            return Err(format!("invalid token {token:?} in subject"));
        }
    }
    Ok(())
}

/// Validate a subject *pattern*, which may additionally use `*` and a
/// terminal `>`.
///
/// # Errors
/// Returns a description of why the pattern was rejected.
pub fn validate_pattern(pattern: &str) -> Result<(), String> {
    if pattern.is_empty() {
        return Err("pattern must not be empty".to_owned());
    }
    let tokens: Vec<&str> = pattern.split('.').collect();
    for (i, token) in tokens.iter().enumerate() {
        if *token == ">" {
            if i != tokens.len() - 1 {
                return Err("'>' must be the last token in a pattern".to_owned());
            }
            continue;
        }
        if *token == "*" {
            continue;
        }
        if token.is_empty() || !token.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
            return Err(format!("invalid token {token:?} in pattern"));
        }
    }
    Ok(())
}

/// Does `concrete` match `pattern`?
///
/// `*` matches exactly one token; a trailing `>` matches one or more
/// remaining tokens. Both sides are assumed already validated.
#[must_use]
pub fn matches(pattern: &str, concrete: &str) -> bool {
    let pattern_tokens: Vec<&str> = pattern.split('.').collect();
    let concrete_tokens: Vec<&str> = concrete.split('.').collect();

    let mut pi = 0;
    let mut ci = 0;
    while pi < pattern_tokens.len() {
        match pattern_tokens[pi] {
            ">" => return ci < concrete_tokens.len(),
            "*" => {
                if ci >= concrete_tokens.len() {
                    return false;
                }
                pi += 1;
                ci += 1;
            }
            literal => {
                if concrete_tokens.get(ci) != Some(&literal) {
                    return false;
                }
                pi += 1;
                ci += 1;
            }
        }
    }
    ci == concrete_tokens.len()
}

/// A filesystem-safe, deterministic hash of a concrete subject, used as the
/// endpoint's maildir directory name.
#[must_use]
pub fn endpoint_hash(subject: &str) -> String {
    let digest = Sha256::digest(subject.as_bytes());
    hex_prefix(&digest, 16)
}

fn hex_prefix(bytes: &[u8], chars: usize) -> String {
    let mut s = String::with_capacity(chars);
    for byte in bytes {
        if s.len() >= chars {
            break;
        }
        s.push_str(&format!("{byte:02x}"));
    }
    s.truncate(chars);
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_well_formed_subject() {
        assert!(validate_subject("relay.agent.backend.01HXYZ").is_ok());
    }

    #[test]
    fn rejects_subject_without_relay_prefix() {
        assert!(validate_subject("agent.backend").is_err());
    }

    #[test]
    fn rejects_double_dots() {
        assert!(validate_subject("relay..agent").is_err());
    }

    #[test]
    fn rejects_leading_trailing_dots() {
        assert!(validate_subject(".relay.agent").is_err());
        assert!(validate_subject("relay.agent.").is_err());
    }

    #[test]
    fn rejects_invalid_characters() {
        assert!(validate_subject("relay.agent backend").is_err());
    }

    #[test]
    fn pattern_allows_star_and_gt() {
        assert!(validate_pattern("relay.agent.*").is_ok());
        assert!(validate_pattern("relay.agent.>").is_ok());
    }

    #[test]
    fn pattern_rejects_gt_not_terminal() {
        assert!(validate_pattern("relay.>.agent").is_err());
    }

    #[test]
    fn star_matches_exactly_one_token() {
        assert!(matches("relay.agent.*", "relay.agent.a"));
        assert!(matches("relay.agent.*", "relay.agent.b"));
        assert!(!matches("relay.agent.*", "relay.agent.a.b"));
        assert!(!matches("relay.agent.*", "relay.agent"));
    }

    #[test]
    fn gt_matches_one_or_more_trailing_tokens() {
        assert!(matches("relay.agent.>", "relay.agent.a"));
        assert!(matches("relay.agent.>", "relay.agent.a.b.c"));
        assert!(!matches("relay.agent.>", "relay.agent"));
    }

    #[test]
    fn literal_match_requires_exact_equality() {
        assert!(matches("relay.agent.backend", "relay.agent.backend"));
        assert!(!matches("relay.agent.backend", "relay.agent.frontend"));
    }

    #[test]
    fn hash_is_deterministic_and_fixed_length() {
        let a = endpoint_hash("relay.agent.backend");
        let b = endpoint_hash("relay.agent.backend");
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn hash_differs_across_subjects() {
        assert_ne!(
            endpoint_hash("relay.agent.a"),
            endpoint_hash("relay.agent.b")
        );
    }
}
