// error.rs - Error types for the POSIX collaborators.

use std::path::PathBuf;

use aclman_policy::{ApplyFailureKind, PolicyError};
use thiserror::Error;

/// Errors that can occur while reading or changing filesystem objects.
#[derive(Debug, Error)]
pub enum FsError {
    /// A file I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// An external ACL tool exited unsuccessfully.
    #[error("{program} failed on {path}: {stderr}")]
    CommandFailed {
        program: String,
        path: PathBuf,
        kind: ApplyFailureKind,
        stderr: String,
    },

    /// getfacl printed something we don't understand.
    #[error("unexpected getfacl output for {path}: '{line}'")]
    MalformedAcl { path: PathBuf, line: String },

    /// getfacl or setfacl is not installed.
    #[error("required tool '{program}' not found: {source}")]
    ToolMissing {
        program: String,
        source: which::Error,
    },

    #[error(transparent)]
    Policy(#[from] PolicyError),
}

impl FsError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        FsError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Collaborator traits speak `PolicyError`; everything OS-level becomes an
/// `ApplyFailure` for the object involved.
impl From<FsError> for PolicyError {
    fn from(err: FsError) -> Self {
        let reason = err.to_string();
        match err {
            FsError::Policy(inner) => inner,
            FsError::Io { path, source } => PolicyError::ApplyFailure {
                path,
                kind: ApplyFailureKind::from_io(&source),
                reason: source.to_string(),
            },
            FsError::CommandFailed {
                program,
                path,
                kind,
                stderr,
            } => PolicyError::ApplyFailure {
                path,
                kind,
                reason: format!("{}: {}", program, stderr),
            },
            FsError::MalformedAcl { path, .. } => PolicyError::ApplyFailure {
                path,
                kind: ApplyFailureKind::Other,
                reason,
            },
            FsError::ToolMissing { .. } => PolicyError::ApplyFailure {
                path: PathBuf::new(),
                kind: ApplyFailureKind::Unsupported,
                reason,
            },
        }
    }
}

/// Classify the stderr of getfacl/setfacl.
pub fn classify_stderr(stderr: &str) -> ApplyFailureKind {
    let lower = stderr.to_lowercase();
    if lower.contains("operation not permitted") || lower.contains("permission denied") {
        ApplyFailureKind::PermissionDenied
    } else if lower.contains("no such file or directory") {
        ApplyFailureKind::Vanished
    } else if lower.contains("not supported") {
        ApplyFailureKind::Unsupported
    } else {
        ApplyFailureKind::Other
    }
}
