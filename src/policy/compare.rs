//! Constant-time comparison for secrets.
//!
//! Passwords, API keys and session tokens must never be compared with `==`:
//! short-circuiting equality leaks the length of the matching prefix through
//! timing.

use subtle::ConstantTimeEq;

/// Compare two byte strings without data-dependent early exit.
///
/// A length mismatch returns `false` immediately; lengths of credentials are
/// not treated as secret.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    bool::from(a.ct_eq(b))
}
