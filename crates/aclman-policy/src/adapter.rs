//! Collaborator traits: where the core meets the filesystem.
//!
//! The resolver never touches the OS itself. Policy file text, current object
//! state and the final apply step are all reached through these traits, so a
//! whole run can be driven against in-memory fakes.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::PolicyError;
use crate::plan::ObjectReport;
use crate::scope::Scope;
use crate::section::ConfigFile;
use crate::state::ObjectState;

/// Raw text of one policy file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigText {
    pub path: PathBuf,
    pub text: String,
}

/// Finds the policy file of a directory.
pub trait ConfigSource: Send + Sync {
    /// File name looked up in every directory (normally `..aclman`).
    fn file_name(&self) -> &str;

    /// Text of the policy file in `dir`, or `None` when there is none.
    fn read_config(&self, dir: &Path) -> std::io::Result<Option<ConfigText>>;
}

/// Reads the current ownership and ACLs of an object.
pub trait StateReader: Send + Sync {
    fn read_state(&self, path: &Path) -> Result<ObjectState, PolicyError>;
}

/// Executes the changes of a planned report.
pub trait Applier: Send + Sync {
    /// Perform `report.changes`, the owner change and the group change.
    ///
    /// Implementations must not touch anything the report does not name.
    fn apply(&self, report: &ObjectReport) -> Result<(), PolicyError>;
}

/// Load and parse the policy file of `dir` into a scope.
///
/// Read and parse failures become `Scope::Broken`, so objects below are
/// reported as unresolvable instead of being resolved against a partial chain.
pub fn load_scope(source: &dyn ConfigSource, dir: &Path) -> Option<Scope> {
    let config = match source.read_config(dir) {
        Ok(Some(config)) => config,
        Ok(None) => return None,
        Err(e) => {
            let path = dir.join(source.file_name());
            tracing::error!("Failed to read {}: {}", path.display(), e);
            return Some(Scope::Broken {
                source: path,
                reason: e.to_string(),
            });
        }
    };

    match ConfigFile::parse(&config.path, &config.text) {
        Ok(file) => {
            for err in file.acl_errors() {
                tracing::error!("{}", err);
            }
            tracing::debug!(
                "Loaded {} ({} sections)",
                config.path.display(),
                file.rules.len()
            );
            Some(Scope::Loaded(Arc::new(file)))
        }
        Err(e) => {
            tracing::error!("{}", e);
            Some(Scope::Broken {
                source: config.path,
                reason: e.to_string(),
            })
        }
    }
}
