//! Cluster topology and the role of the current process.
//!
//! A job runs as some number of trainers plus a set of parameter servers. Each
//! parameter server owns a shard of the model parameters; trainers push
//! gradients to and pull parameters from the shard owners.
//!
//! The configuration is an explicit value. Only [`ClusterConfig::from_env`]
//! (and the CLI built on top of it) looks at the process environment:
//!
//! | variable          | meaning                                        |
//! |-------------------|------------------------------------------------|
//! | `PSERVERS`        | comma-separated `host:port` of every pserver   |
//! | `SERVER_ENDPOINT` | `host:port` of this process (pserver role)     |
//! | `TRAINING_ROLE`   | `TRAINER` (default) or `PSERVER`               |

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const PSERVERS_VAR: &str = "PSERVERS";
pub const SERVER_ENDPOINT_VAR: &str = "SERVER_ENDPOINT";
pub const TRAINING_ROLE_VAR: &str = "TRAINING_ROLE";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown training role `{0}` (expected TRAINER or PSERVER)")]
    UnknownRole(String),
    #[error("invalid endpoint `{0}` (expected host:port)")]
    InvalidEndpoint(String),
    #[error("the PSERVER role needs SERVER_ENDPOINT")]
    MissingServerEndpoint,
    #[error("endpoint {0} is not one of the cluster's parameter servers")]
    EndpointNotInCluster(Endpoint),
    #[error("trainer count must be greater than zero")]
    NoTrainers,
}

/// What this process does in the job.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TrainingRole {
    #[default]
    Trainer,
    Pserver,
}

impl FromStr for TrainingRole {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "TRAINER" => Ok(Self::Trainer),
            "PSERVER" => Ok(Self::Pserver),
            _ => Err(ConfigError::UnknownRole(s.to_string())),
        }
    }
}

impl fmt::Display for TrainingRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Trainer => f.write_str("TRAINER"),
            Self::Pserver => f.write_str("PSERVER"),
        }
    }
}

/// A `host:port` address.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl FromStr for Endpoint {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidEndpoint(s.to_string());
        let (host, port) = s.trim().rsplit_once(':').ok_or_else(invalid)?;
        if host.is_empty() {
            return Err(invalid());
        }
        let port = port.parse().map_err(|_| invalid())?;
        Ok(Self::new(host, port))
    }
}

impl TryFrom<String> for Endpoint {
    type Error = ConfigError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Endpoint> for String {
    fn from(e: Endpoint) -> Self {
        e.to_string()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Splits a comma-separated endpoint list, skipping blank entries.
pub fn parse_endpoints(list: &str) -> Result<Vec<Endpoint>, ConfigError> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::parse)
        .collect()
}

/// Topology of the job as seen from one process.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    pub role: TrainingRole,
    /// Every parameter server, in shard order.
    pub pserver_endpoints: Vec<Endpoint>,
    /// This process's address; required for the pserver role.
    pub current_endpoint: Option<Endpoint>,
    pub trainers: usize,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            role: TrainingRole::Trainer,
            pserver_endpoints: Vec::new(),
            current_endpoint: None,
            trainers: 2,
        }
    }
}

impl ClusterConfig {
    /// Reads `PSERVERS`, `SERVER_ENDPOINT` and `TRAINING_ROLE` through `lookup`.
    ///
    /// Unset or blank variables keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mut config = Self::default();
        if let Some(role) = var(TRAINING_ROLE_VAR) {
            config.role = role.parse()?;
        }
        if let Some(list) = var(PSERVERS_VAR) {
            config.pserver_endpoints = parse_endpoints(&list)?;
        }
        if let Some(endpoint) = var(SERVER_ENDPOINT_VAR) {
            config.current_endpoint = Some(endpoint.parse()?);
        }
        Ok(config)
    }

    /// Reads the cluster configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Checks that the role can actually run with this topology.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.trainers == 0 {
            return Err(ConfigError::NoTrainers);
        }
        if self.role == TrainingRole::Pserver {
            let current = self
                .current_endpoint
                .as_ref()
                .ok_or(ConfigError::MissingServerEndpoint)?;
            if !self.pserver_endpoints.is_empty() && !self.pserver_endpoints.contains(current) {
                return Err(ConfigError::EndpointNotInCluster(current.clone()));
            }
        }
        Ok(())
    }

    /// `true` when parameters are split across parameter servers.
    pub fn is_distributed(&self) -> bool {
        !self.pserver_endpoints.is_empty()
    }

    /// The parameter server owning parameter `param_index` (round-robin).
    pub fn shard_for(&self, param_index: usize) -> Option<&Endpoint> {
        if self.pserver_endpoints.is_empty() {
            return None;
        }
        self.pserver_endpoints.get(param_index % self.pserver_endpoints.len())
    }
}
