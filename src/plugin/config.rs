// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Chain-config parsing for the interceptor.
//!
//! The host resolver hands the plugin its directive block at load time.
//! Exactly three directives are understood:
//!
//! ```text
//! ocp_dnsnameresolver {
//!     namespaces dns-system workloads
//!     minTTL 5
//!     failureThreshold 5
//! }
//! ```
//!
//! Omitting `namespaces` monitors every namespace. Duplicate blocks, unknown
//! directives, missing arguments and non-positive values are rejected at
//! load, failing plugin initialization.

use crate::constants::{DEFAULT_FAILURE_THRESHOLD, DEFAULT_MIN_TTL_SECS};
use std::collections::HashSet;
use thiserror::Error;

/// Errors rejected at plugin load.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// The plugin block appeared more than once in the server block.
    #[error("plugin can only be declared once per server block")]
    DuplicateBlock,

    /// A directive outside the supported set.
    #[error("unknown directive: {0}")]
    UnknownDirective(String),

    /// A directive was given the wrong number of arguments.
    #[error("wrong number of arguments for directive: {0}")]
    ArgumentCount(String),

    /// A numeric directive value failed to parse.
    #[error("invalid value for {directive}: {value}")]
    InvalidValue {
        /// The directive carrying the bad value.
        directive: String,
        /// The offending token.
        value: String,
    },

    /// A numeric directive value was zero or negative.
    #[error("value of {directive} should be greater than 0: {value}")]
    NonPositiveValue {
        /// The directive carrying the bad value.
        directive: String,
        /// The offending token.
        value: String,
    },
}

/// Parsed plugin configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginConfig {
    /// Namespaces to monitor. Empty means all namespaces.
    pub namespaces: HashSet<String>,

    /// Floor applied to stored TTLs and to the re-arm period on failure.
    pub minimum_ttl: i32,

    /// Consecutive failures before a resolved name becomes eligible for
    /// eviction.
    pub failure_threshold: i32,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            namespaces: HashSet::new(),
            minimum_ttl: DEFAULT_MIN_TTL_SECS,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
        }
    }
}

impl PluginConfig {
    /// Parse a single directive block.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] for unknown directives, wrong arities,
    /// unparsable integers, or non-positive values.
    pub fn parse(block: &str) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        for line in block.lines() {
            let mut tokens = line.split_whitespace();
            let Some(directive) = tokens.next() else {
                continue;
            };
            let args: Vec<&str> = tokens.collect();

            match directive {
                "namespaces" => {
                    if args.is_empty() {
                        return Err(ConfigError::ArgumentCount(directive.to_string()));
                    }
                    for namespace in args {
                        config.namespaces.insert(namespace.to_string());
                    }
                }
                "minTTL" => {
                    config.minimum_ttl = parse_positive(directive, &args)?;
                }
                "failureThreshold" => {
                    config.failure_threshold = parse_positive(directive, &args)?;
                }
                unknown => return Err(ConfigError::UnknownDirective(unknown.to_string())),
            }
        }

        Ok(config)
    }

    /// Parse the directive blocks found for this plugin in a server block.
    /// More than one block is rejected; none yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DuplicateBlock`] for repeated blocks, or any
    /// error from [`PluginConfig::parse`].
    pub fn parse_blocks(blocks: &[&str]) -> Result<Self, ConfigError> {
        match blocks {
            [] => Ok(Self::default()),
            [block] => Self::parse(block),
            _ => Err(ConfigError::DuplicateBlock),
        }
    }

    /// Returns true when the given namespace is listed in the `namespaces`
    /// directive or when the directive was omitted.
    #[must_use]
    pub fn monitors_namespace(&self, namespace: &str) -> bool {
        self.namespaces.is_empty() || self.namespaces.contains(namespace)
    }
}

fn parse_positive(directive: &str, args: &[&str]) -> Result<i32, ConfigError> {
    let [value] = args else {
        return Err(ConfigError::ArgumentCount(directive.to_string()));
    };
    let parsed: i32 = value.parse().map_err(|_| ConfigError::InvalidValue {
        directive: directive.to_string(),
        value: (*value).to_string(),
    })?;
    if parsed <= 0 {
        return Err(ConfigError::NonPositiveValue {
            directive: directive.to_string(),
            value: (*value).to_string(),
        });
    }
    Ok(parsed)
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;
