//! # aclman-policy
//!
//! Rule resolution and permission encoding for aclman.
//!
//! Policy lives in `..aclman` files spread through a directory tree. Each
//! file holds `[pattern]` sections with OWNER, GROUP and ACL keys. For every
//! visited object the [`PolicyResolver`] picks the single most specific
//! section from the [`RuleChain`] of files above it, resolves the positional
//! permission symbols against the object's type and current bits, and
//! [`plan`] turns the result into an [`ObjectReport`] of concrete changes.
//!
//! ## Key invariants
//!
//! - **Exact depth**: a pattern only matches candidates with the same number
//!   of segments relative to its policy file.
//! - **Deepest file wins**, unless a shallower match is FINAL. Equal
//!   specificity inside one file is an [`PolicyError::AmbiguousMatch`].
//! - **No OS access**: the filesystem is reached only through the traits in
//!   [`adapter`], so everything here is deterministic and testable.

pub mod ace;
pub mod adapter;
pub mod error;
pub mod identity;
pub mod matcher;
pub mod pattern;
pub mod permission;
pub mod plan;
pub mod resolver;
pub mod scope;
pub mod section;
pub mod state;

pub use ace::{parse_acl, Ace, AclSpec, Subject};
pub use adapter::{load_scope, Applier, ConfigSource, ConfigText, StateReader};
pub use error::{ApplyFailureKind, ConfigLocation, PolicyError};
pub use identity::{IdentityResolver, StaticIdentities};
pub use matcher::{select_rule, Selection};
pub use pattern::{Pattern, Segment, WildcardFlags};
pub use permission::{PermissionIntent, Symbol};
pub use plan::{plan, AclChange, IdentityChange, ObjectReport, Outcome};
pub use resolver::{
    DesiredAcl, MatchedPolicy, PolicyResolver, ResolveOptions, SpecialSetting,
    DEFAULT_CONFIG_FILE_NAME,
};
pub use scope::{RuleChain, Scope};
pub use section::{ConfigFile, Rule, RuleRef};
pub use state::{AclEntry, AclTag, ObjectKind, ObjectState, Perms, SpecialBit, SpecialBits};
