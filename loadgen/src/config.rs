//! This module controls configuration parsing from the end user, providing a
//! convenience mechanism for the rest of the program.
//!
//! Configuration resolves in layers, later layers winning: built-in defaults,
//! then a YAML document, then the process environment, then command line
//! flags. The last layer is applied by the binary.
use std::{
    fs,
    net::SocketAddr,
    num::{NonZeroU32, ParseIntError},
    path::{Path, PathBuf},
    time::Duration,
};

use http::{
    Uri,
    uri::{InvalidUri, Scheme},
};
use serde::Deserialize;

use crate::action;

/// Environment variable naming the frontend base URL.
pub const BASE_URL_VAR: &str = "BASE_URL";
/// Environment variable naming the virtual user count.
pub const USERS_VAR: &str = "USERS";
/// Environment variable naming the run duration.
pub const DURATION_VAR: &str = "DURATION";
/// Environment variable naming the currency service address.
pub const CURRENCY_ADDR_VAR: &str = "CURRENCY_ADDR";

/// Errors produced by [`Config`]
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Error for a serde [`serde_yaml`].
    #[error("Failed to deserialize yaml: {0}")]
    SerdeYaml(#[from] serde_yaml::Error),
    /// Error reading config file
    #[error("Failed to read config file {path:?}: {source}")]
    ReadFile {
        /// File path
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: Box<std::io::Error>,
    },
    /// An environment variable holds something that is not a URI.
    #[error("{var} is not a valid URI: {source}")]
    Uri {
        /// Variable name
        var: &'static str,
        /// Underlying parse error
        #[source]
        source: InvalidUri,
    },
    /// An endpoint URI is not an absolute `http` address without a query.
    #[error("{field} must be an absolute http URI without a query, got {uri}: {reason}")]
    Endpoint {
        /// Configuration key or variable name
        field: &'static str,
        /// The offending URI
        uri: Uri,
        /// What is wrong with it
        reason: &'static str,
    },
    /// An environment variable holds something that is not a positive integer.
    #[error("{var} is not a positive integer: {source}")]
    Integer {
        /// Variable name
        var: &'static str,
        /// Underlying parse error
        #[source]
        source: ParseIntError,
    },
    /// An environment variable holds something that is not a duration.
    #[error("{var} is not a duration: {source}")]
    Duration {
        /// Variable name
        var: &'static str,
        /// Underlying parse error
        #[source]
        source: humantime::DurationError,
    },
}

fn default_base_url() -> Uri {
    Uri::from_static("http://frontend:80")
}

fn default_users() -> NonZeroU32 {
    NonZeroU32::MIN.saturating_add(9)
}

fn default_duration() -> Duration {
    Duration::from_secs(60)
}

fn default_currency_addr() -> Uri {
    Uri::from_static("http://currencyservice:7000")
}

fn default_time_unit() -> Duration {
    Duration::from_secs(1)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(60)
}

/// Main configuration struct for this program
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Root of the storefront frontend every HTTP path is appended to
    #[serde(with = "http_serde::uri", default = "default_base_url")]
    pub base_url: Uri,
    /// Number of concurrent virtual users
    #[serde(default = "default_users")]
    pub users: NonZeroU32,
    /// How long virtual users keep starting iterations
    #[serde(with = "humantime_serde", default = "default_duration")]
    pub duration: Duration,
    /// Address of the currency service, plaintext gRPC
    #[serde(with = "http_serde::uri", default = "default_currency_addr")]
    pub currency_addr: Uri,
    /// Seed for the per-user random number generators. Users draw from the
    /// operating system when unset.
    #[serde(default)]
    pub seed: Option<u64>,
    /// The unit all pauses are expressed in
    #[serde(with = "humantime_serde", default = "default_time_unit")]
    pub time_unit: Duration,
    /// Upper bound on a single HTTP exchange or gRPC connect
    #[serde(with = "humantime_serde", default = "default_request_timeout")]
    pub request_timeout: Duration,
    /// Relative selection weight of each storefront action
    #[serde(default)]
    pub weights: action::Weights,
    /// The method by which to express telemetry
    #[serde(default)]
    pub telemetry: Option<Telemetry>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            users: default_users(),
            duration: default_duration(),
            currency_addr: default_currency_addr(),
            seed: None,
            time_unit: default_time_unit(),
            request_timeout: default_request_timeout(),
            weights: action::Weights::default(),
            telemetry: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
/// Defines the manner of this program's telemetry.
pub struct Telemetry {
    /// Address and port for the prometheus exporter
    pub prometheus_addr: SocketAddr,
}

impl Config {
    /// Parse a YAML document. Keys absent from the document take their
    /// defaults.
    ///
    /// # Errors
    ///
    /// Function will return an error if the document is malformed, names an
    /// unknown key or fails [`Config::validate`].
    pub fn from_yaml(contents: &str) -> Result<Self, Error> {
        // An empty document is null to serde_yaml, not an empty mapping.
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the fields that deserialize but cannot be used, the endpoint
    /// URIs.
    ///
    /// # Errors
    ///
    /// Function will return an error if `base_url` or `currency_addr` lacks a
    /// scheme or authority, uses a scheme other than `http`, or carries a
    /// query.
    pub fn validate(&self) -> Result<(), Error> {
        check_endpoint("base_url", &self.base_url)?;
        check_endpoint("currency_addr", &self.currency_addr)?;
        Ok(())
    }

    /// Read and parse the YAML file at `path`.
    ///
    /// # Errors
    ///
    /// Function will return an error if the file cannot be read or does not
    /// parse, see [`Config::from_yaml`].
    pub fn from_path(path: &Path) -> Result<Self, Error> {
        let contents = fs::read_to_string(path).map_err(|source| Error::ReadFile {
            path: path.to_path_buf(),
            source: Box::new(source),
        })?;
        Self::from_yaml(&contents)
    }

    /// Overlay the environment on this configuration. `lookup` returns the
    /// value of a variable, if set. Unset and empty variables leave the
    /// present value alone.
    ///
    /// # Errors
    ///
    /// Function will return an error if a set variable does not parse.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.is_empty());

        if let Some(value) = var(BASE_URL_VAR) {
            self.base_url = parse_uri(BASE_URL_VAR, &value)?;
        }
        if let Some(value) = var(USERS_VAR) {
            self.users = value
                .trim()
                .parse()
                .map_err(|source| Error::Integer {
                    var: USERS_VAR,
                    source,
                })?;
        }
        if let Some(value) = var(DURATION_VAR) {
            self.duration =
                humantime::parse_duration(value.trim()).map_err(|source| Error::Duration {
                    var: DURATION_VAR,
                    source,
                })?;
        }
        if let Some(value) = var(CURRENCY_ADDR_VAR) {
            self.currency_addr = parse_uri(CURRENCY_ADDR_VAR, &value)?;
        }
        Ok(())
    }
}

fn parse_uri(var: &'static str, value: &str) -> Result<Uri, Error> {
    let uri = value
        .trim()
        .parse()
        .map_err(|source| Error::Uri { var, source })?;
    check_endpoint(var, &uri)?;
    Ok(uri)
}

fn check_endpoint(field: &'static str, uri: &Uri) -> Result<(), Error> {
    let reason = if uri.scheme().is_none() {
        "no scheme"
    } else if uri.scheme() != Some(&Scheme::HTTP) {
        "only plaintext http is supported"
    } else if uri.authority().is_none() {
        "no host"
    } else if uri.query().is_some() {
        "query strings are not allowed"
    } else {
        return Ok(());
    };
    Err(Error::Endpoint {
        field,
        uri: uri.clone(),
        reason,
    })
}
