//! Capabilities and resolved grant sets
//!
//! A capability is an opaque, non-empty action name in a flat namespace. The
//! only reserved token is [`ALL_TOKEN`]: present in a granted set, it grants
//! every capability.

use crate::errors::{RcmsError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::borrow::Borrow;
use std::collections::BTreeSet;
use std::fmt;

/// Reserved capability token meaning "every capability is granted"
pub const ALL_TOKEN: &str = "All";

/// A named permitted action, e.g. `"task_reassign"`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Capability(String);

impl Capability {
    /// Validate and wrap a capability name
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(RcmsError::invalid("capability must be a non-empty string"));
        }
        Ok(Self(name))
    }

    /// The reserved all-capabilities token
    pub fn all_token() -> Self {
        Self(ALL_TOKEN.to_string())
    }

    /// Borrow the capability name
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for the reserved `"All"` token
    pub fn is_all_token(&self) -> bool {
        self.0 == ALL_TOKEN
    }

    /// Whether holding `self` grants `requested`
    #[inline]
    pub fn grants(&self, requested: &str) -> bool {
        self.is_all_token() || self.0 == requested
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for Capability {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Capability {
    type Error = RcmsError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl TryFrom<&str> for Capability {
    type Error = RcmsError;

    fn try_from(value: &str) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Capability> for String {
    fn from(cap: Capability) -> Self {
        cap.0
    }
}

/// The materialized result of evaluating all override rows of one actor.
///
/// Published grant sets are immutable; the client cache replaces them
/// wholesale and shares them behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrantSet {
    /// Every capability is granted
    AllCapabilities,
    /// Exactly these capabilities are granted (possibly none)
    Capabilities(BTreeSet<Capability>),
}

impl Default for GrantSet {
    fn default() -> Self {
        Self::empty()
    }
}

impl GrantSet {
    /// Literal set granting nothing
    pub fn empty() -> Self {
        Self::Capabilities(BTreeSet::new())
    }

    /// Build a literal grant set
    pub fn from_capabilities<I>(caps: I) -> Self
    where
        I: IntoIterator<Item = Capability>,
    {
        Self::Capabilities(caps.into_iter().collect())
    }

    /// Decision function shared by the evaluator and the client cache.
    pub fn allows(&self, capability: &str) -> bool {
        match self {
            Self::AllCapabilities => true,
            Self::Capabilities(set) => set.contains(ALL_TOKEN) || set.contains(capability),
        }
    }

    /// True for the `AllCapabilities` sentinel or a literal set holding `"All"`
    pub fn is_unrestricted(&self) -> bool {
        match self {
            Self::AllCapabilities => true,
            Self::Capabilities(set) => set.contains(ALL_TOKEN),
        }
    }

    /// Number of literal capabilities; `None` for the sentinel
    pub fn len(&self) -> Option<usize> {
        match self {
            Self::AllCapabilities => None,
            Self::Capabilities(set) => Some(set.len()),
        }
    }

    /// True for a literal set with no capabilities
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Capabilities(set) if set.is_empty())
    }

    /// Literal capabilities, empty for the sentinel
    pub fn capabilities(&self) -> impl Iterator<Item = &Capability> {
        let set = match self {
            Self::Capabilities(set) => Some(set),
            _ => None,
        };
        set.into_iter().flatten()
    }
}

impl fmt::Display for GrantSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllCapabilities => f.write_str(ALL_TOKEN),
            Self::Capabilities(set) => {
                let names: Vec<&str> = set.iter().map(Capability::as_str).collect();
                write!(f, "[{}]", names.join(","))
            }
        }
    }
}

// Wire form: the string "All" or an array of capability names.
#[derive(Deserialize)]
#[serde(untagged)]
enum GrantSetWire {
    Token(String),
    List(BTreeSet<Capability>),
}

impl Serialize for GrantSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::AllCapabilities => serializer.serialize_str(ALL_TOKEN),
            Self::Capabilities(set) => set.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for GrantSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        match GrantSetWire::deserialize(deserializer)? {
            GrantSetWire::Token(token) if token == ALL_TOKEN => Ok(Self::AllCapabilities),
            GrantSetWire::Token(other) => Err(serde::de::Error::custom(format!(
                "expected \"{ALL_TOKEN}\" or a capability list, got \"{other}\""
            ))),
            GrantSetWire::List(set) => Ok(Self::from_capabilities(set)),
        }
    }
}
