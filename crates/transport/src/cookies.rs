//! Outgoing `Cookie` header rendering
//!
//! Incoming `Set-Cookie` headers are read through reqwest's cookie support
//! in `http.rs`; only outgoing cookies are assembled here.

/// Render `(name, value)` pairs as a `Cookie` header value.
///
/// Later entries win when a name repeats, matching how the server would see
/// the jar after an overwrite.
pub fn render_cookie_header(cookies: &[(String, String)]) -> String {
    let mut seen: Vec<(&str, &str)> = Vec::with_capacity(cookies.len());
    for (name, value) in cookies {
        match seen.iter_mut().find(|(n, _)| *n == name.as_str()) {
            Some(slot) => slot.1 = value.as_str(),
            None => seen.push((name.as_str(), value.as_str())),
        }
    }
    seen.iter()
        .map(|(n, v)| format!("{n}={v}"))
        .collect::<Vec<_>>()
        .join("; ")
}
