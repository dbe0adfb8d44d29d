//! Burst signal filtering.
//!
//! Network beacons only count as ad evidence when their destination is on an
//! allowlist of domains known to fire during ad playback alone.

use serde::{Deserialize, Serialize};
use url::Url;

/// Ad-measurement and ad-serving domains whose requests only occur while an
/// ad is playing.
pub const DEFAULT_BEACON_HOSTS: &[&str] = &[
    "imasdk.googleapis.com",
    "pubads.g.doubleclick.net",
    "securepubads.g.doubleclick.net",
    "amazon-adsystem.com",
    "innovid.com",
    "tremorhub.com",
    "moatads.com",
    "doubleverify.com",
];

/// Allowlist matcher over URL hosts.
///
/// An entry matches the exact host and any of its subdomains; matching is
/// case-insensitive and ignores a trailing dot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeaconFilter {
    hosts: Vec<String>,
}

impl Default for BeaconFilter {
    fn default() -> Self {
        Self::new(DEFAULT_BEACON_HOSTS.iter().copied())
    }
}

impl BeaconFilter {
    pub fn new<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let hosts = hosts
            .into_iter()
            .map(|h| normalize_host(h.as_ref()))
            .filter(|h| !h.is_empty())
            .collect();
        Self { hosts }
    }

    pub fn hosts(&self) -> &[String] {
        &self.hosts
    }

    /// Whether `url` targets an allowlisted destination.
    pub fn matches(&self, url: &str) -> bool {
        let Some(host) = url_host(url) else {
            return false;
        };
        self.hosts.iter().any(|allowed| {
            host == *allowed
                || host
                    .strip_suffix(allowed.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.'))
        })
    }
}

fn normalize_host(host: &str) -> String {
    host.trim().trim_end_matches('.').to_ascii_lowercase()
}

/// Normalized host of an absolute URL, parsed per WHATWG rules.
fn url_host(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = normalize_host(parsed.host_str()?);
    (!host.is_empty()).then_some(host)
}
