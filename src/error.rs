//! Shared error-code contract.
//!
//! Every module error enum implements [`ErrorCode`] so callers (the CLI, a
//! host UI) can branch on a stable grepable code instead of matching display
//! strings.

/// Trait for errors that carry a grepable code.
///
/// Codes are `E_`-prefixed upper snake case. `retryable` marks transient
/// failures where repeating the same request may succeed.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}
