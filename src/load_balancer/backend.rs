//! Backend abstraction.
//!
//! # Responsibilities
//! - Represent a single upstream server by its base URL
//! - Validate the base URL once, at construction
//! - Provide the scheme/authority pair used to rewrite outbound requests

use std::fmt;
use std::str::FromStr;

use axum::http::uri::{Authority, Scheme};
use thiserror::Error;
use url::Url;

/// Why a backend base URL was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidBackend {
    #[error("{0}")]
    Malformed(String),

    #[error("unsupported scheme `{0}` (expected http or https)")]
    UnsupportedScheme(String),

    #[error("missing host")]
    MissingHost,

    #[error("credentials are not supported")]
    Credentials,

    #[error("base URL must not carry a path, query or fragment")]
    NotBaseUrl,
}

/// A single backend server. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backend {
    scheme: Scheme,
    authority: Authority,
    /// Pre-rendered `scheme://authority` for logs and metric labels.
    label: String,
}

impl Backend {
    /// Parse a base URL such as `http://10.0.0.1:8080` or `https://api.internal`.
    pub fn parse(raw: &str) -> Result<Self, InvalidBackend> {
        let url = Url::parse(raw).map_err(|e| InvalidBackend::Malformed(e.to_string()))?;

        let scheme = match url.scheme() {
            "http" => Scheme::HTTP,
            "https" => Scheme::HTTPS,
            other => return Err(InvalidBackend::UnsupportedScheme(other.to_string())),
        };

        let host = url.host_str().ok_or(InvalidBackend::MissingHost)?;
        if !url.username().is_empty() || url.password().is_some() {
            return Err(InvalidBackend::Credentials);
        }
        if url.path() != "/" || url.query().is_some() || url.fragment().is_some() {
            return Err(InvalidBackend::NotBaseUrl);
        }

        let authority = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        let authority =
            Authority::from_str(&authority).map_err(|e| InvalidBackend::Malformed(e.to_string()))?;

        let label = format!("{scheme}://{authority}");
        Ok(Self {
            scheme,
            authority,
            label,
        })
    }

    pub fn scheme(&self) -> &Scheme {
        &self.scheme
    }

    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    /// `scheme://authority`, as used in logs and metric labels.
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}
