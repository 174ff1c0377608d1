// error.rs - Error types for rule resolution and permission encoding.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Where in a policy file something went wrong.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigLocation {
    /// The policy file.
    pub file: PathBuf,
    /// 1-based line number.
    pub line: usize,
    /// The enclosing section header (without brackets), if any.
    pub section: Option<String>,
}

impl fmt::Display for ConfigLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file.display(), self.line)?;
        if let Some(section) = &self.section {
            write!(f, " [{}]", section)?;
        }
        Ok(())
    }
}

/// Errors that can occur while parsing policy or resolving it for an object.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    /// Malformed pattern, ACE or permission symbol.
    #[error("invalid grammar{}: {reason}", at(.location))]
    InvalidGrammar {
        reason: String,
        location: Option<ConfigLocation>,
    },

    /// Two rules of the same policy file match an object equally well.
    #[error(
        "ambiguous match for '{}': sections [{first}] and [{second}] in {} are equally specific",
        .path.display(),
        .source_file.display()
    )]
    AmbiguousMatch {
        path: PathBuf,
        source_file: PathBuf,
        first: String,
        second: String,
    },

    /// A user or group name could not be resolved.
    #[error("unknown identity '{name}'")]
    UnknownIdentity { name: String },

    /// A policy file governing the object failed to load.
    #[error("policy file {} is unusable: {reason}", .source_file.display())]
    ConfigUnavailable { source_file: PathBuf, reason: String },

    /// Reading or changing the object failed at the OS level.
    #[error("{kind} on {}: {reason}", .path.display())]
    ApplyFailure {
        path: PathBuf,
        kind: ApplyFailureKind,
        reason: String,
    },
}

/// Classification of OS-level failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyFailureKind {
    PermissionDenied,
    /// The object disappeared mid-run.
    Vanished,
    /// The filesystem does not support ACLs or ownership changes.
    Unsupported,
    Other,
}

impl fmt::Display for ApplyFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApplyFailureKind::PermissionDenied => write!(f, "permission denied"),
            ApplyFailureKind::Vanished => write!(f, "object vanished"),
            ApplyFailureKind::Unsupported => write!(f, "unsupported operation"),
            ApplyFailureKind::Other => write!(f, "operation failed"),
        }
    }
}

impl ApplyFailureKind {
    /// Classify an I/O error.
    pub fn from_io(err: &std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::PermissionDenied => ApplyFailureKind::PermissionDenied,
            std::io::ErrorKind::NotFound => ApplyFailureKind::Vanished,
            std::io::ErrorKind::Unsupported => ApplyFailureKind::Unsupported,
            _ => ApplyFailureKind::Other,
        }
    }
}

impl PolicyError {
    /// Shorthand for an unlocated grammar error.
    pub fn grammar(reason: impl Into<String>) -> Self {
        PolicyError::InvalidGrammar {
            reason: reason.into(),
            location: None,
        }
    }

    /// Attach a policy file location to a grammar error. Other variants are returned unchanged.
    pub fn at(self, location: ConfigLocation) -> Self {
        match self {
            PolicyError::InvalidGrammar { reason, .. } => PolicyError::InvalidGrammar {
                reason,
                location: Some(location),
            },
            other => other,
        }
    }
}

fn at(location: &Option<ConfigLocation>) -> String {
    match location {
        Some(location) => format!(" at {}", location),
        None => String::new(),
    }
}
