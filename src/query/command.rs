use std::fmt;

use crate::core::{DbError, Result};

/// Reserved first character of every command token.
pub const COMMAND_PREFIX: char = '$';

/// A token is a command when it starts with the reserved prefix; anything
/// else is a literal field name.
pub fn is_command(token: &str) -> bool {
    token.starts_with(COMMAND_PREFIX)
}

/// Operators a field predicate can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    NotIn,
    Near,
}

impl Command {
    pub const ALL: [Command; 9] = [
        Self::Eq,
        Self::Ne,
        Self::Gt,
        Self::Gte,
        Self::Lt,
        Self::Lte,
        Self::In,
        Self::NotIn,
        Self::Near,
    ];

    pub fn token(&self) -> &'static str {
        match self {
            Self::Eq => "$eq",
            Self::Ne => "$ne",
            Self::Gt => "$gt",
            Self::Gte => "$gte",
            Self::Lt => "$lt",
            Self::Lte => "$lte",
            Self::In => "$in",
            Self::NotIn => "$nin",
            Self::Near => "$near",
        }
    }

    pub fn from_token(token: &str) -> Result<Self> {
        let lowered = token.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|command| command.token() == lowered)
            .ok_or_else(|| DbError::InvalidArgument(format!("Unknown command '{}'", token)))
    }

    /// SQL comparison operator, for the commands that have one.
    pub fn sql_operator(&self) -> Option<&'static str> {
        match self {
            Self::Eq => Some("="),
            Self::Ne => Some("!="),
            Self::Gt => Some(">"),
            Self::Gte => Some(">="),
            Self::Lt => Some("<"),
            Self::Lte => Some("<="),
            Self::In | Self::NotIn | Self::Near => None,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}
