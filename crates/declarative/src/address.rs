//! Resource addresses (`type.name`) and target filters

use crate::error::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

static IDENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_-]*$").expect("identifier pattern is valid")
});

/// Check whether a string is a valid type, name or attribute identifier
pub fn is_identifier(s: &str) -> bool {
    IDENT.is_match(s)
}

/// Unique identity of a managed resource
///
/// Ordered by type first, then name. Every ordering the engine emits relies on
/// this, so plans and state listings are stable across runs.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceAddress {
    pub resource_type: String,
    pub name: String,
}

impl ResourceAddress {
    pub fn new(resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.resource_type, self.name)
    }
}

impl FromStr for ResourceAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once('.') {
            Some((ty, name)) if is_identifier(ty) && is_identifier(name) => {
                Ok(Self::new(ty, name))
            }
            _ => Err(Error::InvalidAddress(s.to_string())),
        }
    }
}

impl TryFrom<String> for ResourceAddress {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ResourceAddress> for String {
    fn from(addr: ResourceAddress) -> Self {
        addr.to_string()
    }
}

/// A `--target` filter: either a whole resource type or a single resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Every resource of a type, e.g. `local_file`
    Type(String),
    /// One resource, e.g. `local_file.motd`
    Resource(ResourceAddress),
}

impl Target {
    /// Check if an address is selected by this target
    pub fn matches(&self, addr: &ResourceAddress) -> bool {
        match self {
            Self::Type(ty) => &addr.resource_type == ty,
            Self::Resource(target) => target == addr,
        }
    }
}

impl FromStr for Target {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if is_identifier(s) {
            return Ok(Self::Type(s.to_string()));
        }
        s.parse().map(Self::Resource)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Type(ty) => f.write_str(ty),
            Self::Resource(addr) => addr.fmt(f),
        }
    }
}
