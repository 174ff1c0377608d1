//! # aclman-fs
//!
//! POSIX implementations of the aclman collaborators, and the walker that
//! drives them.
//!
//! - [`FileConfigLoader`] reads `..aclman` files.
//! - [`PosixStateReader`] reads ownership with `lstat` and ACLs with `getfacl`.
//! - [`PosixApplier`] changes them with `lchown`, `setfacl` and `chmod`.
//! - [`SystemIdentities`] answers passwd/group questions, with caching.
//! - [`Enforcer`] walks directory items and ties everything together.
//!
//! Symbolic links are never followed or modified.

pub mod acl_text;
pub mod applier;
pub mod error;
pub mod identity;
pub mod loader;
pub mod state;
pub mod walker;

pub use applier::PosixApplier;
pub use error::FsError;
pub use identity::SystemIdentities;
pub use loader::FileConfigLoader;
pub use state::{locate_tool, PosixStateReader};
pub use walker::{DirOutcome, Enforcer, EnforcerSettings, Start, WorkItem};
