//! Resolver configuration.
//!
//! Usually embedded in a host server's own config file as a TOML table;
//! every field has a default, so an empty table is a valid config.

use std::path::Path;

use anyhow::{Context, Result};
use http::StatusCode;
use remote_glob::GlobOptions;
use serde::{Deserialize, Serialize};

use crate::graph::DocumentCodec;
use crate::jsonld::{JSON_LD, JsonLdCodec};

/// Configuration for a [`Resolver`](crate::Resolver).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Descend into every member under `**` without probing it first.
    #[serde(default)]
    pub follow: bool,

    /// Let wildcards match names starting with `.`.
    #[serde(default)]
    pub include_hidden: bool,

    /// Media type requested when listing containers.
    #[serde(default = "default_listing_type")]
    pub listing_type: String,

    /// Media type requested for each matched document.
    #[serde(default = "default_fetch_type")]
    pub fetch_type: String,

    /// Response types offered to content negotiation, in preference order.
    #[serde(default = "default_output_types")]
    pub output_types: Vec<String>,

    /// Status returned when no output type is acceptable.
    #[serde(default = "default_not_acceptable_status")]
    pub not_acceptable_status: u16,
}

fn default_listing_type() -> String {
    JSON_LD.to_string()
}

fn default_fetch_type() -> String {
    JSON_LD.to_string()
}

fn default_output_types() -> Vec<String> {
    JsonLdCodec.output_types()
}

fn default_not_acceptable_status() -> u16 {
    405
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            follow: false,
            include_hidden: false,
            listing_type: default_listing_type(),
            fetch_type: default_fetch_type(),
            output_types: default_output_types(),
            not_acceptable_status: default_not_acceptable_status(),
        }
    }
}

impl ResolverConfig {
    /// Load configuration from a TOML file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        Self::parse(&content).with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Load from `path` if it exists, defaults otherwise.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load_from(path)
    }

    /// Parse and validate TOML text.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        StatusCode::from_u16(self.not_acceptable_status)
            .with_context(|| format!("invalid not_acceptable_status {}", self.not_acceptable_status))?;
        anyhow::ensure!(!self.output_types.is_empty(), "output_types must not be empty");
        Ok(())
    }

    pub fn glob_options(&self) -> GlobOptions {
        GlobOptions {
            follow: self.follow,
            include_hidden: self.include_hidden,
        }
    }

    /// The configured refusal status, 405 if the configured one is invalid.
    pub fn not_acceptable(&self) -> StatusCode {
        StatusCode::from_u16(self.not_acceptable_status).unwrap_or(StatusCode::METHOD_NOT_ALLOWED)
    }
}
