//! Target size resolution
//!
//! Callers give a number plus a unit. The number is read as kilobytes; `MB`
//! multiplies it by 1024 first. The chain itself only ever sees bytes.

use crate::error::{Error, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Unit attached to a target size value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
pub enum SizeUnit {
    #[serde(rename = "KB", alias = "kb")]
    Kb,
    #[default]
    #[serde(rename = "MB", alias = "mb")]
    Mb,
}

impl SizeUnit {
    fn kb_factor(self) -> f64 {
        match self {
            SizeUnit::Kb => 1.0,
            SizeUnit::Mb => 1024.0,
        }
    }
}

impl FromStr for SizeUnit {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "KB" => Ok(SizeUnit::Kb),
            "MB" => Ok(SizeUnit::Mb),
            _ => Err(Error::InvalidTarget {
                value: format!("unknown unit {:?}", s),
            }),
        }
    }
}

impl fmt::Display for SizeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SizeUnit::Kb => f.write_str("KB"),
            SizeUnit::Mb => f.write_str("MB"),
        }
    }
}

/// Raw target value as supplied by a caller (JSON number or numeric string)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum TargetValue {
    Number(f64),
    Text(String),
}

impl TargetValue {
    fn parse(&self) -> Result<f64> {
        let value = match self {
            TargetValue::Number(n) => *n,
            TargetValue::Text(s) => s.trim().parse::<f64>().map_err(|_| Error::InvalidTarget {
                value: s.clone(),
            })?,
        };
        if !value.is_finite() || value <= 0.0 {
            return Err(Error::InvalidTarget {
                value: value.to_string(),
            });
        }
        Ok(value)
    }
}

impl From<f64> for TargetValue {
    fn from(value: f64) -> Self {
        TargetValue::Number(value)
    }
}

impl From<&str> for TargetValue {
    fn from(value: &str) -> Self {
        TargetValue::Text(value.to_string())
    }
}

/// Unresolved target: value plus unit
#[derive(Debug, Clone, PartialEq)]
pub struct TargetSpec {
    pub value: TargetValue,
    pub unit: SizeUnit,
}

impl TargetSpec {
    pub fn new(value: impl Into<TargetValue>, unit: SizeUnit) -> Self {
        Self {
            value: value.into(),
            unit,
        }
    }

    /// Resolve to a byte budget.
    pub fn resolve_bytes(&self) -> Result<u64> {
        let kb = self.value.parse()? * self.unit.kb_factor();
        let bytes = (kb * 1024.0).floor();
        if bytes >= u64::MAX as f64 {
            return Err(Error::InvalidTarget {
                value: kb.to_string(),
            });
        }
        Ok(bytes as u64)
    }
}
