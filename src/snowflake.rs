use std::{convert::Infallible, fmt::Display, str::FromStr};

use serde::Deserialize;

/// Represents an ID that is either [`u64`] or [`String`].
///
/// Numeric strings are always stored as [`Snowflake::Number`], so `"101"` and
/// `101` are the same id and compare numerically. Non-numeric ids compare
/// lexicographically and order after every numeric id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(from = "RawSnowflake")]
pub enum Snowflake {
    Number(u64),
    String(String),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawSnowflake {
    Number(u64),
    String(String),
}

impl Snowflake {
    pub fn as_number(&self) -> Option<u64> {
        match self {
            Self::Number(v) => Some(*v),
            Self::String(_) => None,
        }
    }

    fn flatten(self) -> Self {
        match self {
            Self::Number(v) => Self::Number(v),
            Self::String(s) => s.parse().map(Self::Number).unwrap_or(Self::String(s)),
        }
    }
}

impl From<RawSnowflake> for Snowflake {
    fn from(raw: RawSnowflake) -> Self {
        match raw {
            RawSnowflake::Number(v) => Self::Number(v),
            RawSnowflake::String(s) => Self::String(s).flatten(),
        }
    }
}
impl From<u64> for Snowflake {
    fn from(v: u64) -> Self {
        Self::Number(v)
    }
}
impl From<&str> for Snowflake {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned()).flatten()
    }
}
impl FromStr for Snowflake {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s))
    }
}

impl Display for Snowflake {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(v) => v.fmt(f),
            Self::String(s) => f.write_str(s),
        }
    }
}

impl PartialEq<u64> for Snowflake {
    fn eq(&self, other: &u64) -> bool {
        self.as_number() == Some(*other)
    }
}
