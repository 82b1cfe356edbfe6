//! User agent resolution.

/// Default user agent advertised on outbound requests.
pub const USER_AGENT: &str = concat!(
    "hubscout/",
    env!("CARGO_PKG_VERSION"),
    " (+https://github.com/monokrome/hubscout)"
);

/// Resolve a user agent string from configuration.
/// - None or empty: the default hubscout user agent
/// - Some(custom): the custom string as-is
pub fn resolve_user_agent(configured: Option<&str>) -> String {
    match configured {
        Some(ua) if !ua.trim().is_empty() => ua.to_string(),
        _ => USER_AGENT.to_string(),
    }
}
