//! Agent type definitions

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Supported agent types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    ClaudeCode,
    Codex,
    Cursor,
    /// A user-supplied command line
    Custom,
}

impl AgentType {
    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "claude-code" | "claudecode" | "claude" => Ok(Self::ClaudeCode),
            "codex" => Ok(Self::Codex),
            "cursor" => Ok(Self::Cursor),
            "custom" => Ok(Self::Custom),
            _ => Err(Error::InvalidAgentType(s.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClaudeCode => "claude-code",
            Self::Codex => "codex",
            Self::Cursor => "cursor",
            Self::Custom => "custom",
        }
    }

    /// The executable to launch, or `None` for custom commands where the
    /// caller supplies it.
    pub fn command(&self) -> Option<&'static str> {
        match self {
            Self::ClaudeCode => {
                if cfg!(target_os = "windows") {
                    Some("claude.cmd")
                } else {
                    Some("claude")
                }
            }
            Self::Codex => Some("codex"),
            Self::Cursor => Some("cursor-agent"),
            Self::Custom => None,
        }
    }

    /// Default arguments for the agent
    pub fn default_args(&self) -> Vec<&'static str> {
        match self {
            Self::ClaudeCode => vec![],
            Self::Codex => vec![],
            Self::Cursor => vec![],
            Self::Custom => vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_type_from_str() {
        assert_eq!(AgentType::from_str("claude-code").unwrap(), AgentType::ClaudeCode);
        assert_eq!(AgentType::from_str("claude").unwrap(), AgentType::ClaudeCode);
        assert_eq!(AgentType::from_str("codex").unwrap(), AgentType::Codex);
        assert_eq!(AgentType::from_str("cursor").unwrap(), AgentType::Cursor);
        assert_eq!(AgentType::from_str("custom").unwrap(), AgentType::Custom);
        assert!(AgentType::from_str("unknown").is_err());
    }

    #[test]
    fn test_custom_has_no_builtin_command() {
        assert!(AgentType::Custom.command().is_none());
        assert!(AgentType::ClaudeCode.command().is_some());
    }
}
