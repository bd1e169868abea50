//! The network gate: scheme validation and hostname allowlisting.
//!
//! Allowlist patterns: `*.x` matches exactly `x` or any host ending in
//! `.x`; a bare `x` matches only `x`. Only `http` and `https` schemes pass.
//! The actual HTTP dispatch is the embedding layer's concern — the core
//! exposes it as the [`NetworkDispatcher`] seam so headless tests and
//! non-networked builds plug in a stub.

use async_trait::async_trait;

use crate::PluginError;

/// Check one allowlist pattern against a hostname.
pub fn host_matches(pattern: &str, host: &str) -> bool {
    if let Some(base) = pattern.strip_prefix("*.") {
        host == base || host.strip_suffix(base).is_some_and(|rest| rest.ends_with('.'))
    } else {
        host == pattern
    }
}

/// Extract the hostname from an http(s) URL. Errors on other schemes,
/// empty hosts, and unparseable input.
pub fn url_host(url: &str) -> Result<String, PluginError> {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .ok_or_else(|| PluginError::InvalidUrl(url.to_string()))?;
    let authority = rest
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default();
    // Strip credentials and port.
    let host = authority
        .rsplit('@')
        .next()
        .unwrap_or_default()
        .split(':')
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();
    if host.is_empty() {
        return Err(PluginError::InvalidUrl(url.to_string()));
    }
    Ok(host)
}

/// Validate a URL against an allowlist. Returns the matched host.
pub fn check_allowlist(url: &str, allowlist: &[String]) -> Result<String, PluginError> {
    let host = url_host(url)?;
    if allowlist.iter().any(|pattern| host_matches(pattern, &host)) {
        Ok(host)
    } else {
        Err(PluginError::HostNotAllowed { host })
    }
}

/// The outbound HTTP seam.
#[async_trait]
pub trait NetworkDispatcher: Send + Sync {
    /// Fetch a URL, returning the body as text.
    async fn fetch(&self, url: &str) -> Result<String, String>;
}

/// Dispatcher used when the embedder wires no real network: every request
/// succeeds with an empty body, so gate behavior stays testable.
pub struct StubDispatcher;

#[async_trait]
impl NetworkDispatcher for StubDispatcher {
    async fn fetch(&self, _url: &str) -> Result<String, String> {
        Ok(String::new())
    }
}

// ============================================================================
// Tests
// ============================================================================
