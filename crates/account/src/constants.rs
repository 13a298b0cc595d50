//! Cookie names used by the platform's web session

/// Long-lived session cookie carrying the primary token.
pub const AUTH_TOKEN_COOKIE: &str = "auth_token";

/// Cookie the server uses to issue the CSRF token.
pub const CSRF_COOKIE: &str = "ct0";

/// Length of a valid primary token (lowercase hex).
pub const AUTH_TOKEN_LEN: usize = 40;
