//! Secret wrapper for credential values

use std::fmt;
use zeroize::Zeroize;

/// Sensitive value, redacted in Debug/Display and zeroed on drop.
///
/// Account tokens live inside this wrapper for their whole lifetime. Code that
/// needs the raw value (cookie assembly, persistence) calls `expose()`.
pub struct Secret<T: Zeroize>(T);

impl<T: Zeroize> Secret<T> {
    pub fn new(value: T) -> Self {
        Self(value)
    }

    /// Borrow the inner value. Keep the borrow short and never log it.
    pub fn expose(&self) -> &T {
        &self.0
    }

    /// Swap in a new value, zeroing the old one.
    pub fn replace(&mut self, value: T) {
        self.0.zeroize();
        self.0 = value;
    }
}

impl From<String> for Secret<String> {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl<T: Zeroize> fmt::Debug for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl<T: Zeroize> fmt::Display for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl<T: Zeroize> Drop for Secret<T> {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl<T: Zeroize + Clone> Clone for Secret<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T: Zeroize + PartialEq> PartialEq for Secret<T> {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_and_display_are_redacted() {
        let secret = Secret::new(String::from("0123456789abcdef0123456789abcdef01234567"));
        let debug = format!("{secret:?}");
        let display = format!("{secret}");
        assert_eq!(debug, "[REDACTED]");
        assert_eq!(display, "[REDACTED]");
        assert!(!debug.contains("0123"));
    }

    #[test]
    fn expose_returns_inner_value() {
        let secret: Secret<String> = String::from("auth-token").into();
        assert_eq!(secret.expose(), "auth-token");
    }

    #[test]
    fn replace_swaps_value() {
        let mut secret = Secret::new(String::from("old"));
        secret.replace(String::from("new"));
        assert_eq!(secret.expose(), "new");
    }

    #[test]
    fn clones_compare_equal() {
        let secret = Secret::new(String::from("token"));
        assert_eq!(secret.clone(), secret);
    }
}
