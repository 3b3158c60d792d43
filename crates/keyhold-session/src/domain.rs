// SPDX-FileCopyrightText: 2026 Keyhold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain normalization for matching logins against sites.

use url::Url;

/// Reduce a URL or bare host to a comparable domain: lowercase host with any
/// leading `www.` removed. Returns `None` when no host can be found.
pub fn normalize_domain(input: &str) -> Option<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }

    let host = match Url::parse(trimmed) {
        Ok(url) if url.host_str().is_some() => url.host_str().map(str::to_owned),
        _ if trimmed.contains("://") => None,
        // Bare hosts such as `example.com` or `example.com:8080/login`.
        _ => Url::parse(&format!("https://{trimmed}"))
            .ok()
            .and_then(|url| url.host_str().map(str::to_owned)),
    }?;

    let host = host.to_ascii_lowercase();
    let host = host.trim_end_matches('.');
    let host = host.strip_prefix("www.").unwrap_or(host);
    if host.is_empty() {
        None
    } else {
        Some(host.to_string())
    }
}
