//! URL to tracked-domain matching.

use costscope_core::models::catalog::DomainEntry;
use url::Url;

/// True when `url`'s host is the entry's host or one of its subdomains and,
/// for entries with a path (`github.com/copilot`), the URL path starts with
/// that prefix.
pub fn url_matches(url: &str, entry: &DomainEntry) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    let Some(host) = parsed.host_str() else {
        return false;
    };
    let host = host.to_ascii_lowercase();
    let domain = entry.host();

    let host_ok = host == domain
        || host
            .strip_suffix(domain)
            .is_some_and(|rest| rest.ends_with('.'));
    if !host_ok {
        return false;
    }
    match entry.path_prefix() {
        Some(prefix) => parsed.path().starts_with(prefix),
        None => true,
    }
}

/// Index of the first entry (catalog order) matching `url`
pub fn match_domain(url: &str, domains: &[DomainEntry]) -> Option<usize> {
    domains.iter().position(|entry| url_matches(url, entry))
}
