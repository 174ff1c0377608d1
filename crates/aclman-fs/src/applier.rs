// applier.rs - Performs planned changes with lchown, setfacl and chmod.
//
// Order matters: chown first (the kernel may clear setuid/setgid on it),
// then the ACL, then the special bits are re-asserted from the planned state.

use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use aclman_policy::{AclChange, Applier, ObjectReport, PolicyError};

use crate::error::{classify_stderr, FsError};
use crate::identity::SystemIdentities;

const SPECIAL_MASK: u32 = 0o7000;

/// `Applier` for a real POSIX filesystem.
pub struct PosixApplier {
    setfacl: PathBuf,
    identities: Arc<SystemIdentities>,
}

impl PosixApplier {
    pub fn new(setfacl: PathBuf, identities: Arc<SystemIdentities>) -> Self {
        Self {
            setfacl,
            identities,
        }
    }

    fn chown(&self, report: &ObjectReport) -> Result<(), FsError> {
        if report.chown_spec().is_none() {
            return Ok(());
        }
        let uid = match &report.owner_change {
            Some(change) => Some(self.identities.uid(&change.to).ok_or_else(|| {
                PolicyError::UnknownIdentity {
                    name: change.to.clone(),
                }
            })?),
            None => None,
        };
        let gid = match &report.group_change {
            Some(change) => Some(self.identities.gid(&change.to).ok_or_else(|| {
                PolicyError::UnknownIdentity {
                    name: change.to.clone(),
                }
            })?),
            None => None,
        };
        std::os::unix::fs::lchown(&report.path, uid, gid)
            .map_err(|e| FsError::io(&report.path, e))
    }

    fn setfacl(&self, path: &Path, args: &[&str]) -> Result<(), FsError> {
        let output = Command::new(&self.setfacl)
            .args(args)
            .arg("--")
            .arg(path)
            .output()
            .map_err(|e| FsError::io(path, e))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(FsError::CommandFailed {
                program: format!("setfacl {}", args.join(" ")),
                path: path.to_path_buf(),
                kind: classify_stderr(&stderr),
                stderr,
            });
        }
        Ok(())
    }

    fn write_acl(&self, report: &ObjectReport) -> Result<(), FsError> {
        let removals: Vec<String> = report
            .changes
            .iter()
            .filter_map(AclChange::remove_spec)
            .collect();
        if !removals.is_empty() {
            self.setfacl(&report.path, &["-x", &removals.join(",")])?;
        }
        if report.changes.contains(&AclChange::RemoveDefaults) {
            self.setfacl(&report.path, &["-k"])?;
        }
        let modifications: Vec<String> = report
            .changes
            .iter()
            .filter_map(AclChange::modify_spec)
            .collect();
        if !modifications.is_empty() {
            self.setfacl(&report.path, &["-m", &modifications.join(",")])?;
        }
        Ok(())
    }

    /// Mode bits setuid/setgid/sticky after the planned changes.
    fn planned_special(report: &ObjectReport, mode: u32) -> u32 {
        report
            .changes
            .iter()
            .fold(mode & SPECIAL_MASK, |bits, change| match change {
                AclChange::SetSpecial { bit, to: true } => bits | bit.mode_mask(),
                AclChange::SetSpecial { bit, to: false } => bits & !bit.mode_mask(),
                _ => bits,
            })
    }

    fn write_special(&self, path: &Path, wanted: u32) -> Result<(), FsError> {
        let mode = std::fs::symlink_metadata(path)
            .map_err(|e| FsError::io(path, e))?
            .mode();
        if mode & SPECIAL_MASK == wanted {
            return Ok(());
        }
        let permissions = std::fs::Permissions::from_mode((mode & 0o777) | wanted);
        std::fs::set_permissions(path, permissions).map_err(|e| FsError::io(path, e))
    }

    fn apply_all(&self, report: &ObjectReport) -> Result<(), FsError> {
        let before = std::fs::symlink_metadata(&report.path)
            .map_err(|e| FsError::io(&report.path, e))?;
        if before.file_type().is_symlink() {
            return Err(FsError::io(
                &report.path,
                std::io::Error::new(
                    std::io::ErrorKind::Unsupported,
                    "refusing to modify a symbolic link",
                ),
            ));
        }
        let wanted = Self::planned_special(report, before.mode());

        self.chown(report)?;
        self.write_acl(report)?;
        self.write_special(&report.path, wanted)
    }
}

impl Applier for PosixApplier {
    fn apply(&self, report: &ObjectReport) -> Result<(), PolicyError> {
        self.apply_all(report)?;
        if let Some(spec) = report.chown_spec() {
            tracing::info!("chown {} {}", spec, report.path.display());
        }
        for change in &report.changes {
            tracing::info!("{} {}", change, report.path.display());
        }
        Ok(())
    }
}
