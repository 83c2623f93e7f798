use reqwest::Url;
use serde::{Deserialize, Serialize};

/// Domains whose images are never fetched.
///
/// Some avatar hosts serve generated images that are cheaper to render
/// locally than to download. A URL on one of these domains (or any
/// subdomain) resolves straight to a placeholder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BypassPolicy {
    domains: Vec<String>,
}

impl BypassPolicy {
    pub fn new<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut policy = Self::default();
        for domain in domains {
            policy.add_domain(domain);
        }
        policy
    }

    /// Registers a domain. Matching is case-insensitive.
    pub fn add_domain(&mut self, domain: impl Into<String>) {
        let domain = domain.into().trim().trim_start_matches('.').to_ascii_lowercase();
        if !domain.is_empty() && !self.domains.contains(&domain) {
            self.domains.push(domain);
        }
    }

    pub fn domains(&self) -> &[String] {
        &self.domains
    }

    /// True if `url`'s host is a registered domain or a subdomain of one.
    /// Unparseable URLs never match.
    pub fn matches(&self, url: &str) -> bool {
        if self.domains.is_empty() {
            return false;
        }
        let Some(host) = Url::parse(url).ok().and_then(|u| u.host_str().map(str::to_ascii_lowercase))
        else {
            return false;
        };
        self.domains.iter().any(|domain| {
            host == *domain
                || host
                    .strip_suffix(domain.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.'))
        })
    }
}
