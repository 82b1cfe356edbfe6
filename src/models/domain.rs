//! Domain, place, and topic types shared across the discovery pipeline.
//!
//! A [`Domain`] is the normalized form of any URL-like input and is
//! immutable for the duration of a run. Places and topics are supplied by
//! analyzers and are read-only to the pipeline.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("empty domain input")]
    Empty,
    #[error("unparseable domain input: {0}")]
    Invalid(String),
}

/// A normalized crawl target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Domain {
    /// Lowercase host name.
    pub host: String,
    /// URL scheme (defaults to https when the input omits one).
    pub scheme: String,
    /// `scheme://host` with no trailing slash.
    pub base: String,
}

impl Domain {
    /// Normalize any URL-like input ("bbc.co.uk", "https://bbc.co.uk/news")
    /// into a domain. Fails on empty or unparseable input.
    pub fn normalize(input: &str) -> Result<Self, DomainError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(DomainError::Empty);
        }

        let with_scheme = if trimmed.contains("://") {
            trimmed.to_string()
        } else {
            format!("https://{}", trimmed)
        };

        let parsed =
            Url::parse(&with_scheme).map_err(|_| DomainError::Invalid(trimmed.to_string()))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| DomainError::Invalid(trimmed.to_string()))?
            .to_lowercase();
        let scheme = parsed.scheme().to_string();

        Ok(Self {
            base: format!("{}://{}", scheme, host),
            host,
            scheme,
        })
    }

    /// Resolve a possibly-relative predicted URL against this domain.
    pub fn absolute_url(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else if url.starts_with('/') {
            format!("{}{}", self.base, url)
        } else {
            format!("{}/{}", self.base, url)
        }
    }
}

/// Kind of geographic place a hub can aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaceKind {
    Country,
    Region,
    City,
}

impl PlaceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Country => "country",
            Self::Region => "region",
            Self::City => "city",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "country" => Some(Self::Country),
            "region" => Some(Self::Region),
            "city" => Some(Self::City),
            _ => None,
        }
    }
}

/// A geographic entity supplied by an analyzer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Place {
    pub kind: PlaceKind,
    pub name: String,
    /// ISO-style code where known (e.g. "fr").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Code of the containing place, for regions and cities.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_code: Option<String>,
    /// Relative prominence in [0, 1]; drives processing order.
    pub importance: f64,
}

impl Place {
    /// URL-safe slug derived from the place name.
    pub fn slug(&self) -> String {
        slugify(&self.name)
    }
}

/// A non-geographic subject.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Topic {
    pub slug: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl Topic {
    pub fn from_slug(slug: &str) -> Self {
        let label = slug
            .split('-')
            .map(|w| {
                let mut chars = w.chars();
                match chars.next() {
                    Some(c) => c.to_uppercase().chain(chars).collect::<String>(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ");
        Self {
            slug: slug.to_string(),
            label,
            category: None,
            language: None,
        }
    }
}

/// A predicted hub URL, transient until persisted as a candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prediction {
    /// Absolute or domain-relative URL.
    pub url: String,
    /// Name of the analyzer that produced this prediction.
    pub analyzer: String,
    /// Strategy label within the analyzer (e.g. "dspl", "convention").
    pub strategy: String,
    /// URL template the prediction was derived from, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

/// Lowercase, hyphen-separated slug for URL construction and dedup keys.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_dash = true;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}
