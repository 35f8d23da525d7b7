//! Discriminator enums shared across the engine.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The command type declared by an action definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    /// HTTP call to an external or internal REST service.
    Rest,
    /// Shell command executed in a restricted shell.
    Shell,
    /// Python script resolved from a feature-pack asset.
    Python,
}

impl ActionType {
    /// Get the string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Rest => "rest",
            ActionType::Shell => "shell",
            ActionType::Python => "python",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error parsing an action type from a string.
#[derive(Debug, Error)]
#[error("unknown action type: {0}")]
pub struct ParseActionTypeError(pub String);

impl FromStr for ActionType {
    type Err = ParseActionTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "rest" => Ok(ActionType::Rest),
            "shell" => Ok(ActionType::Shell),
            "python" => Ok(ActionType::Python),
            other => Err(ParseActionTypeError(other.to_string())),
        }
    }
}

/// Whether a discovered object originates from the source or target system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ObjectKind {
    Source,
    Target,
}

impl ObjectKind {
    /// Get the string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Source => "SOURCE",
            ObjectKind::Target => "TARGET",
        }
    }

    /// Get the opposing kind.
    #[must_use]
    pub fn opposite(&self) -> ObjectKind {
        match self {
            ObjectKind::Source => ObjectKind::Target,
            ObjectKind::Target => ObjectKind::Source,
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_type_round_trip() {
        for t in [ActionType::Rest, ActionType::Shell, ActionType::Python] {
            assert_eq!(t.as_str().parse::<ActionType>().unwrap(), t);
        }
    }

    #[test]
    fn test_action_type_parse_case_insensitive() {
        assert_eq!("REST".parse::<ActionType>().unwrap(), ActionType::Rest);
        assert_eq!("Shell".parse::<ActionType>().unwrap(), ActionType::Shell);
    }

    #[test]
    fn test_action_type_parse_unknown() {
        let err = "groovy".parse::<ActionType>().unwrap_err();
        assert_eq!(err.to_string(), "unknown action type: groovy");
    }

    #[test]
    fn test_object_kind_opposite() {
        assert_eq!(ObjectKind::Source.opposite(), ObjectKind::Target);
        assert_eq!(ObjectKind::Target.opposite(), ObjectKind::Source);
    }

    #[test]
    fn test_action_type_serde() {
        let t: ActionType = serde_json::from_str("\"rest\"").unwrap();
        assert_eq!(t, ActionType::Rest);
        assert_eq!(serde_json::to_string(&ActionType::Python).unwrap(), "\"python\"");
    }
}
