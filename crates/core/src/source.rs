//! Source-URL admission policy.
//!
//! A submission is accepted only when its URL is non-empty, uses
//! `http`/`https`, and its host is one of the configured source domains or
//! a subdomain of one.

use url::Url;

use crate::error::CoreError;

/// Domain accepted when no policy is configured.
pub const DEFAULT_SOURCE_DOMAIN: &str = "instagram.com";

/// Which hosts a submitted URL may point at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePolicy {
    domains: Vec<String>,
}

impl SourcePolicy {
    /// Build a policy from domain names. Entries are trimmed, lowercased and
    /// stripped of a leading `.`; empty entries are dropped.
    pub fn new<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let domains = domains
            .into_iter()
            .map(|d| d.as_ref().trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|d| !d.is_empty())
            .collect();
        Self { domains }
    }

    pub fn domains(&self) -> &[String] {
        &self.domains
    }

    /// Validate a submitted URL, returning its normalized form.
    pub fn validate(&self, url: &str) -> Result<String, CoreError> {
        let trimmed = url.trim();
        if trimmed.is_empty() {
            return Err(CoreError::Validation("URL must not be empty".to_string()));
        }

        let parsed = Url::parse(trimmed)
            .map_err(|e| CoreError::Validation(format!("Invalid URL '{trimmed}': {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(CoreError::Validation(format!(
                "URL must start with http:// or https://, got: '{trimmed}'"
            )));
        }
        let host = parsed
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| CoreError::Validation(format!("URL has no host: '{trimmed}'")))?;

        if self.allows_host(host) {
            Ok(parsed.to_string())
        } else {
            Err(CoreError::Validation(format!(
                "URL host '{host}' is not an accepted source. Accepted: {}",
                self.domains.join(", ")
            )))
        }
    }

    fn allows_host(&self, host: &str) -> bool {
        self.domains.iter().any(|domain| {
            host == domain
                || host
                    .strip_suffix(domain.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.'))
        })
    }
}

impl Default for SourcePolicy {
    fn default() -> Self {
        Self::new([DEFAULT_SOURCE_DOMAIN])
    }
}
