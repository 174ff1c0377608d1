// state.rs - Reads ownership, mode bits and ACLs of real objects.

use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use aclman_policy::{ObjectKind, ObjectState, PolicyError, SpecialBits, StateReader};

use crate::acl_text::parse_getfacl;
use crate::error::{classify_stderr, FsError};
use crate::identity::SystemIdentities;

/// Locate an external program on PATH (or accept an explicit path).
pub fn locate_tool(program: &str) -> Result<PathBuf, FsError> {
    which::which(program).map_err(|source| FsError::ToolMissing {
        program: program.to_string(),
        source,
    })
}

/// `StateReader` backed by `lstat` and `getfacl`.
pub struct PosixStateReader {
    getfacl: PathBuf,
    identities: Arc<SystemIdentities>,
}

impl PosixStateReader {
    pub fn new(getfacl: PathBuf, identities: Arc<SystemIdentities>) -> Self {
        Self {
            getfacl,
            identities,
        }
    }

    fn read(&self, path: &Path) -> Result<ObjectState, FsError> {
        let meta = std::fs::symlink_metadata(path).map_err(|e| FsError::io(path, e))?;
        let kind = if meta.is_dir() {
            ObjectKind::Directory
        } else {
            ObjectKind::File
        };

        let output = Command::new(&self.getfacl)
            .args(["--omit-header", "--absolute-names", "--no-effective", "--"])
            .arg(path)
            .output()
            .map_err(|e| FsError::io(path, e))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(FsError::CommandFailed {
                program: "getfacl".to_string(),
                path: path.to_path_buf(),
                kind: classify_stderr(&stderr),
                stderr,
            });
        }
        let text = String::from_utf8_lossy(&output.stdout);
        let acl = parse_getfacl(&text).map_err(|line| FsError::MalformedAcl {
            path: path.to_path_buf(),
            line,
        })?;

        Ok(ObjectState {
            owner: self.identities.user_name(meta.uid()),
            group: self.identities.group_name(meta.gid()),
            kind,
            special: SpecialBits::from_mode(meta.mode()),
            access: acl.access,
            default: if kind.is_dir() { acl.default } else { Vec::new() },
        })
    }
}

impl StateReader for PosixStateReader {
    fn read_state(&self, path: &Path) -> Result<ObjectState, PolicyError> {
        let state = self.read(path)?;
        tracing::trace!(
            "{}: {}:{} {} access / {} default entries",
            path.display(),
            state.owner,
            state.group,
            state.access.len(),
            state.default.len()
        );
        Ok(state)
    }
}
