// ABOUTME: Input normalisation helpers used by every create/update path
// ABOUTME: Trimming, required-field checks, length limits and scope list cleanup
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Agent Broker Contributors

use crate::errors::{DomainError, DomainResult};

/// Upper bound for free-text labels and names
pub const MAX_NAME_LEN: usize = 200;

/// Upper bound for notes attached to access requests
pub const MAX_NOTE_LEN: usize = 2000;

/// Trim `value` and fail if nothing is left
pub fn required(field: &'static str, value: &str) -> DomainResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DomainError::MissingField { field });
    }
    Ok(trimmed.to_owned())
}

/// Trim `value` and treat blank as absent
#[must_use]
pub fn optional(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
}

/// Reject values longer than `max` characters
pub fn bounded(field: &'static str, value: String, max: usize) -> DomainResult<String> {
    if value.chars().count() > max {
        return Err(DomainError::invalid(format!(
            "{field} must be at most {max} characters"
        )));
    }
    Ok(value)
}

/// Trim, drop blanks and de-duplicate while keeping first-seen order
#[must_use]
pub fn normalize_scopes(scopes: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(scopes.len());
    for scope in scopes.iter().map(|s| s.trim()).filter(|s| !s.is_empty()) {
        if !out.iter().any(|seen| seen == scope) {
            out.push(scope.to_owned());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_trims_and_rejects_blank() {
        assert_eq!(required("label", "  Main ").unwrap(), "Main");
        assert_eq!(
            required("label", "   ").unwrap_err(),
            DomainError::MissingField { field: "label" }
        );
    }

    #[test]
    fn scopes_are_deduplicated_in_order() {
        let scopes = vec![
            " read ".to_owned(),
            String::new(),
            "write".to_owned(),
            "read".to_owned(),
        ];
        assert_eq!(normalize_scopes(&scopes), vec!["read", "write"]);
    }

    #[test]
    fn bounded_rejects_long_values() {
        assert!(bounded("name", "x".repeat(MAX_NAME_LEN + 1), MAX_NAME_LEN).is_err());
        assert!(bounded("name", "x".repeat(MAX_NAME_LEN), MAX_NAME_LEN).is_ok());
    }
}
