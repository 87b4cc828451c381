//! Core domain types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Inventory region name (e.g. `us-east-1`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Region(pub String);

impl Region {
    /// Create a new region
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get the raw region name
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Region {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Region {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Router-local tunnel instance number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TunnelId(pub u32);

impl TunnelId {
    /// Create a new tunnel ID
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Raw instance number
    pub fn get(&self) -> u32 {
        self.0
    }

    /// Name of the tunnel interface, e.g. `ipsec0`
    pub fn interface_name(&self, prefix: &str) -> String {
        format!("{}{}", prefix, self.0)
    }
}

impl fmt::Display for TunnelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
