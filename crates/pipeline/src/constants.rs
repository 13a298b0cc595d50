//! Platform endpoints and header names

/// Low side-effect endpoint used only to obtain a `ct0` cookie.
pub const BOOTSTRAP_URL: &str = "https://twitter.com/i/api/2/oauth2/authorize";

/// Header carrying the Unix epoch at which a rate limit window resets.
pub const RATE_LIMIT_RESET_HEADER: &str = "x-rate-limit-reset";

/// Header that must echo the `ct0` cookie.
pub const CSRF_HEADER: &str = "x-csrf-token";

/// Account settings endpoint; answers with the account's own `screen_name`.
pub const SETTINGS_URL: &str = "https://twitter.com/i/api/1.1/account/settings.json";

/// GraphQL user lookup by handle.
pub const USER_BY_SCREEN_NAME_URL: &str =
    "https://twitter.com/i/api/graphql/G3KGOASz96M-Qu0nwmGXNg/UserByScreenName";

/// Headers the web client sends on every private API call.
pub const API_HEADERS: &[(&str, &str)] = &[
    ("authority", "twitter.com"),
    ("origin", "https://twitter.com"),
    (
        "authorization",
        "Bearer AAAAAAAAAAAAAAAAAAAAANRILgAAAAAAnNwIzUejRCOuH5E6I8xnZz4puTs%3D1Zv7ttfk8LF81IUq16cHjhLTvJu4FA33AGWWjCpTnA",
    ),
    ("x-twitter-active-user", "yes"),
    ("x-twitter-auth-type", "OAuth2Session"),
    ("x-twitter-client-language", "en"),
];
