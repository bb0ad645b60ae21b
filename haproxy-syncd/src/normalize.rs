use std::sync::LazyLock;
use regex::Regex;

static DNS_SD_TCP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)_([\w-]+)\._tcp").expect("valid DNS-SD pattern"));

/// Canonical short name for a registered service.
///
/// `_api._tcp.prod.local` becomes `api`; names without a `_<label>._tcp`
/// component are returned verbatim.
pub fn normalize(raw: &str) -> String {
    match DNS_SD_TCP.captures(raw) {
        Some(caps) => caps[1].to_string(),
        None => raw.to_string(),
    }
}
