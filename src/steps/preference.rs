use std::fmt;

use anyhow::{Context as _, Result};
use toml::Value;

use super::{Step, StepState, require_macos};
use crate::runner::RunContext;

/// Typed value for a `defaults` key.
#[derive(Debug, Clone, PartialEq)]
pub enum PreferenceValue {
    /// `-bool`
    Bool(bool),
    /// `-int`
    Int(i64),
    /// `-float`
    Float(f64),
    /// `-string`
    String(String),
}

impl PreferenceValue {
    /// Convert a configuration scalar.
    #[must_use]
    pub fn from_toml(value: &Value) -> Option<Self> {
        match value {
            Value::Boolean(b) => Some(Self::Bool(*b)),
            Value::Integer(i) => Some(Self::Int(*i)),
            Value::Float(f) => Some(Self::Float(*f)),
            Value::String(s) => Some(Self::String(s.clone())),
            _ => None,
        }
    }

    const fn type_flag(&self) -> &'static str {
        match self {
            Self::Bool(_) => "-bool",
            Self::Int(_) => "-int",
            Self::Float(_) => "-float",
            Self::String(_) => "-string",
        }
    }

    /// Whether `defaults read` output represents this value.
    fn matches(&self, raw: &str) -> bool {
        match self {
            Self::Bool(b) => match raw {
                "1" | "true" | "YES" => *b,
                "0" | "false" | "NO" => !*b,
                _ => false,
            },
            Self::Int(i) => raw.parse::<i64>().is_ok_and(|v| v == *i),
            Self::Float(f) => raw
                .parse::<f64>()
                .is_ok_and(|v| (v - *f).abs() < f64::EPSILON),
            Self::String(s) => raw == s,
        }
    }
}

impl fmt::Display for PreferenceValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

/// A macOS user or system preference managed with `defaults`.
#[derive(Debug, Clone)]
pub struct Preference {
    /// Preference domain (e.g. `com.apple.finder`).
    pub domain: String,
    /// Key within the domain.
    pub key: String,
    /// Desired value.
    pub value: PreferenceValue,
    /// Whether writing needs elevated privileges.
    pub privileged: bool,
}

impl Step for Preference {
    fn description(&self) -> String {
        format!("preference {}.{} = {}", self.domain, self.key, self.value)
    }

    fn requires_privilege(&self) -> bool {
        self.privileged
    }

    fn check(&self, ctx: &RunContext) -> Result<StepState> {
        require_macos(ctx, "defaults")?;
        let result = ctx.run_unchecked("defaults", &["read", &self.domain, &self.key])?;
        if !result.success {
            return Ok(StepState::Missing);
        }
        let current = result.stdout.trim();
        Ok(if self.value.matches(current) {
            StepState::Satisfied
        } else {
            StepState::Differs {
                current: current.to_string(),
            }
        })
    }

    fn apply(&self, ctx: &RunContext) -> Result<()> {
        require_macos(ctx, "defaults")?;
        let value = self.value.to_string();
        let args = [
            "write",
            &self.domain,
            &self.key,
            self.value.type_flag(),
            &value,
        ];
        ctx.run_as(self.privileged, "defaults", &args)
            .with_context(|| format!("writing {}.{}", self.domain, self.key))?;
        Ok(())
    }
}
