//! # Identifier Namespacing
//!
//! Region identifiers registered with the OS geofencing facility share one
//! namespace with every other region the host app registers. SDK-owned
//! identifiers carry the `ifttt_` prefix so they can be told apart.
//!
//! ## Case Rules
//! ```text
//! add_prefix("1234")        → "ifttt_1234"
//! strip_prefix("IFTTT_1234") → "1234"        (canonical strip casing)
//! strip_prefix("ifttt_1234") → "ifttt_1234"  (different casing: untouched)
//! strip_prefix("IFTT_1234")  → "IFTT_1234"   (misspelled: untouched)
//! ```
//!
//! Adding writes the lowercase prefix while stripping only recognises the
//! uppercase one. Both casings are kept exactly as the SDK has always
//! exchanged them.

/// Prefix written onto SDK-owned region identifiers.
pub const IFTTT_PREFIX: &str = "ifttt_";

/// Prefix recognised when stripping an identifier.
pub const IFTTT_STRIP_PREFIX: &str = "IFTTT_";

/// Prepends the SDK namespace to an identifier.
pub fn add_prefix(identifier: &str) -> String {
    format!("{IFTTT_PREFIX}{identifier}")
}

/// Removes exactly one occurrence of the canonical-case prefix.
///
/// Returns the input unchanged when the prefix is absent or differs in case.
pub fn strip_prefix(identifier: &str) -> &str {
    identifier
        .strip_prefix(IFTTT_STRIP_PREFIX)
        .unwrap_or(identifier)
}

/// Returns true if the identifier belongs to the SDK namespace.
pub fn is_sdk_owned(identifier: &str) -> bool {
    identifier.starts_with(IFTTT_PREFIX)
}

/// Namespaces a wire identifier unless it already carries the prefix.
pub fn namespaced(identifier: &str) -> String {
    if is_sdk_owned(identifier) {
        identifier.to_string()
    } else {
        add_prefix(identifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_prefix() {
        assert_eq!(strip_prefix("1234"), "1234");
        assert_eq!(strip_prefix("IFTTT_1234"), "1234");
        assert_eq!(strip_prefix("IFTT_1234"), "IFTT_1234");
    }

    #[test]
    fn test_strip_prefix_only_once() {
        assert_eq!(strip_prefix("IFTTT_IFTTT_1234"), "IFTTT_1234");
    }

    #[test]
    fn test_strip_prefix_is_case_sensitive() {
        assert_eq!(strip_prefix("ifttt_1234"), "ifttt_1234");
        assert_eq!(strip_prefix("Ifttt_1234"), "Ifttt_1234");
    }

    #[test]
    fn test_add_prefix() {
        assert_eq!(add_prefix("1234"), "ifttt_1234");
    }

    #[test]
    fn test_round_trip_requires_canonical_prefix() {
        // Stripping a lowercase-prefixed id is a no-op, so adding afterwards
        // double-prefixes it.
        let lower = "ifttt_1234";
        assert_ne!(add_prefix(strip_prefix(lower)), lower);

        let plain = "1234";
        assert_ne!(add_prefix(strip_prefix(plain)), plain);

        // Canonical strip casing comes back in the written casing.
        assert_eq!(add_prefix(strip_prefix("IFTTT_1234")), "ifttt_1234");
    }

    #[test]
    fn test_namespaced() {
        assert_eq!(namespaced("abc"), "ifttt_abc");
        assert_eq!(namespaced("ifttt_abc"), "ifttt_abc");
        assert!(is_sdk_owned("ifttt_abc"));
        assert!(!is_sdk_owned("home"));
    }
}
