// resolver.rs - Turns the winning rule into a concrete desired state.
//
// Resolution of one object:
//
//   1. select the governing rule from the chain (matcher.rs)
//   2. IGNORE short-circuits, protected policy files get a fixed policy
//   3. owner/group from explicit keys, then from wildcard captures
//   4. ACL intents resolved against the object's current bits and type
//
// The result is pure data; plan.rs diffs it against the current state.

use std::path::Path;

use serde::Serialize;

use crate::ace::{parse_acl, Ace, AclSpec};
use crate::error::PolicyError;
use crate::identity::IdentityResolver;
use crate::matcher::select_rule;
use crate::pattern::GroupCapture;
use crate::scope::RuleChain;
use crate::section::RuleRef;
use crate::state::{AclEntry, AclTag, ObjectKind, ObjectState, Perms, SpecialBit};

/// ACL written to protected policy files. Special bits are left alone.
pub const PROTECTED_CONFIG_ACL: &str = "u::rw-*,g::r--*,o::r--*";
/// Owner and group of protected policy files.
pub const PROTECTED_CONFIG_OWNER: &str = "root";

pub const DEFAULT_CONFIG_FILE_NAME: &str = "..aclman";

/// Knobs that change how a matched rule is turned into a desired state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Name of policy files, used to recognise them when protecting.
    pub config_file_name: String,
    /// Force root ownership and a read-only ACL on matched policy files.
    pub protect_config_files: bool,
    /// Lowercase extensions whose files never get execute bits.
    pub non_exec_extensions: Vec<String>,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            config_file_name: DEFAULT_CONFIG_FILE_NAME.to_string(),
            protect_config_files: true,
            non_exec_extensions: Vec::new(),
        }
    }
}

/// A special bit and the value it should have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SpecialSetting {
    pub bit: SpecialBit,
    pub value: bool,
}

/// Fully resolved ACL: only concrete bits, no conditional symbols left.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DesiredAcl {
    /// Access entries in declaration order.
    pub access: Vec<AclEntry>,
    /// Default entries in declaration order, always empty for files.
    pub default: Vec<AclEntry>,
    pub special: Vec<SpecialSetting>,
    /// Leave entries that are not mentioned alone.
    pub merge: bool,
}

/// What one object should look like. `None` fields stay unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MatchedPolicy {
    pub rule: Option<RuleRef>,
    pub owner: Option<String>,
    pub group: Option<String>,
    pub acl: Option<DesiredAcl>,
    /// The winning rule is FINAL.
    pub terminal: bool,
    /// The winning rule says IGNORE.
    pub ignored: bool,
}

impl MatchedPolicy {
    /// No rule matched: everything stays as it is.
    pub fn unchanged() -> Self {
        Self::default()
    }
}

/// Resolves objects against a rule chain.
pub struct PolicyResolver<'a> {
    identities: &'a dyn IdentityResolver,
    options: &'a ResolveOptions,
}

impl<'a> PolicyResolver<'a> {
    pub fn new(identities: &'a dyn IdentityResolver, options: &'a ResolveOptions) -> Self {
        Self {
            identities,
            options,
        }
    }

    /// Compute the desired state of the object at `path`.
    pub fn resolve(
        &self,
        path: &Path,
        chain: &RuleChain,
        state: &ObjectState,
    ) -> Result<MatchedPolicy, PolicyError> {
        let kind = state.kind;
        let Some(selection) = select_rule(chain, path, kind)? else {
            tracing::debug!("{}: no matching section", path.display());
            return Ok(MatchedPolicy::unchanged());
        };
        let rule = selection.rule();
        let reference = rule.reference();
        tracing::debug!("{}: matched {}", path.display(), reference);

        if rule.ignore {
            return Ok(MatchedPolicy {
                rule: Some(reference),
                terminal: rule.is_final,
                ignored: true,
                ..MatchedPolicy::default()
            });
        }

        if self.is_protected_config(path, kind) {
            let spec = parse_acl(PROTECTED_CONFIG_ACL)?;
            return Ok(MatchedPolicy {
                rule: Some(reference),
                owner: Some(PROTECTED_CONFIG_OWNER.to_string()),
                group: Some(PROTECTED_CONFIG_OWNER.to_string()),
                acl: Some(desired_acl(&spec, state, false)),
                terminal: rule.is_final,
                ignored: false,
            });
        }

        let spec = match kind {
            ObjectKind::Directory => rule.dir_acl.as_ref().or(rule.acl.as_ref()),
            ObjectKind::File => rule.acl.as_ref(),
        };
        let spec = match spec {
            Some(Ok(spec)) => Some(spec),
            Some(Err(e)) => return Err(e.clone()),
            None => None,
        };

        let captures = rule.pattern.captures(selection.segments.as_slice());
        let owner = rule.owner.clone().or(captures.owner);
        let group = match (&rule.group, captures.group) {
            (Some(group), _) => Some(group.clone()),
            (None, Some(GroupCapture::Name(name))) => Some(name),
            (None, Some(GroupCapture::PrimaryOf(user))) => {
                Some(self.identities.primary_group(&user)?)
            }
            (None, None) => None,
        };
        // Compared as text against the names read back from the object.
        let owner = owner
            .map(|owner| self.identities.canonical_user(&owner))
            .transpose()?;
        let group = group
            .map(|group| self.identities.canonical_group(&group))
            .transpose()?;

        let strip_execute = !kind.is_dir() && self.is_non_exec(path);
        Ok(MatchedPolicy {
            rule: Some(reference),
            owner,
            group,
            acl: spec.map(|spec| desired_acl(spec, state, strip_execute)),
            terminal: rule.is_final,
            ignored: false,
        })
    }

    fn is_protected_config(&self, path: &Path, kind: ObjectKind) -> bool {
        self.options.protect_config_files
            && !kind.is_dir()
            && path
                .file_name()
                .is_some_and(|name| name == self.options.config_file_name.as_str())
    }

    fn is_non_exec(&self, path: &Path) -> bool {
        let Some(name) = path.file_name() else {
            return false;
        };
        let name = name.to_string_lossy().to_lowercase();
        self.options.non_exec_extensions.iter().any(|ext| {
            let ext = ext.trim_start_matches('.').to_lowercase();
            name.strip_suffix(ext.as_str())
                .is_some_and(|stem| stem.ends_with('.'))
        })
    }
}

/// Resolve every ACE of `spec` against `state`.
pub fn desired_acl(spec: &AclSpec, state: &ObjectState, strip_execute: bool) -> DesiredAcl {
    let kind = state.kind;
    let owner_execute = state.owner_execute();
    let mut desired = DesiredAcl {
        merge: spec.merge,
        ..DesiredAcl::default()
    };

    for ace in spec.access() {
        let tag = ace.subject.tag();
        let current = state.entry(&tag, false).map(|e| e.perms).unwrap_or(Perms::NONE);
        let mut perms = ace.permission.resolve(kind, current, owner_execute);
        if strip_execute {
            perms.execute = false;
        }
        desired.access.push(AclEntry::new(tag, perms));
        push_special(&mut desired, ace, state);
    }

    if kind.is_dir() {
        for ace in spec.defaults() {
            let tag = ace.subject.tag();
            let current = current_default(state, &tag);
            let perms = ace.permission.resolve(kind, current, owner_execute);
            desired.default.push(AclEntry::new(tag, perms));
        }
    }
    desired
}

fn push_special(desired: &mut DesiredAcl, ace: &Ace, state: &ObjectState) {
    let Some(bit) = ace.subject.special_bit() else {
        return;
    };
    if let Some(value) = ace
        .permission
        .resolve_special(state.kind, state.special.get(bit))
    {
        desired.special.push(SpecialSetting { bit, value });
    }
}

/// Current bits of a default entry; base entries that don't exist yet start
/// from the access entry, like setfacl does when it creates a default ACL.
fn current_default(state: &ObjectState, tag: &AclTag) -> Perms {
    state
        .entry(tag, true)
        .or_else(|| {
            if tag.is_base() {
                state.entry(tag, false)
            } else {
                None
            }
        })
        .map(|e| e.perms)
        .unwrap_or(Perms::NONE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::StaticIdentities;
    use crate::scope::Scope;
    use crate::section::ConfigFile;
    use crate::state::SpecialBits;
    use std::sync::Arc;

    fn chain(path: &str, text: &str) -> RuleChain {
        RuleChain::new().push(Scope::Loaded(Arc::new(
            ConfigFile::parse(Path::new(path), text).unwrap(),
        )))
    }

    fn state(kind: ObjectKind, owner: Perms, group: Perms, other: Perms) -> ObjectState {
        ObjectState {
            owner: "root".to_string(),
            group: "root".to_string(),
            kind,
            special: SpecialBits::default(),
            access: vec![
                AclEntry::new(AclTag::Owner, owner),
                AclEntry::new(AclTag::OwningGroup, group),
                AclEntry::new(AclTag::Other, other),
            ],
            default: Vec::new(),
        }
    }

    fn rwx() -> Perms {
        Perms::new(true, true, true)
    }

    fn rw() -> Perms {
        Perms::new(true, true, false)
    }

    fn r() -> Perms {
        Perms::new(true, false, false)
    }

    fn ids() -> StaticIdentities {
        StaticIdentities::new().with_user("user1", "staff")
    }

    #[test]
    fn unmatched_object_is_unchanged() {
        let ids = ids();
        let options = ResolveOptions::default();
        let resolver = PolicyResolver::new(&ids, &options);
        let chain = chain("/org/..aclman", "[/opt/*/*]\nOWNER=root\n");
        let policy = resolver
            .resolve(
                Path::new("/org/opt/file3"),
                &chain,
                &state(ObjectKind::File, rw(), r(), r()),
            )
            .unwrap();
        assert_eq!(policy, MatchedPolicy::unchanged());
    }

    #[test]
    fn wildcard_flags_supply_owner_and_primary_group() {
        let ids = ids();
        let options = ResolveOptions::default();
        let resolver = PolicyResolver::new(&ids, &options);
        let chain = chain("/org/..aclman", "[/Users/*OP/*]\nACL=u::rwx-\n");
        let policy = resolver
            .resolve(
                Path::new("/org/Users/user1/notes"),
                &chain,
                &state(ObjectKind::File, rw(), r(), r()),
            )
            .unwrap();
        assert_eq!(policy.owner.as_deref(), Some("user1"));
        assert_eq!(policy.group.as_deref(), Some("staff"));
    }

    #[test]
    fn explicit_group_beats_flag_and_skips_lookup() {
        let ids = StaticIdentities::new();
        let options = ResolveOptions::default();
        let resolver = PolicyResolver::new(&ids, &options);
        let chain = chain("/org/..aclman", "[/Users/*OP/*]\nGROUP=users\n");
        let policy = resolver
            .resolve(
                Path::new("/org/Users/ghost/notes"),
                &chain,
                &state(ObjectKind::File, rw(), r(), r()),
            )
            .unwrap();
        assert_eq!(policy.owner.as_deref(), Some("ghost"));
        assert_eq!(policy.group.as_deref(), Some("users"));
    }

    #[test]
    fn unknown_primary_group_is_an_error() {
        let ids = StaticIdentities::new();
        let options = ResolveOptions::default();
        let resolver = PolicyResolver::new(&ids, &options);
        let chain = chain("/org/..aclman", "[/Users/*OP/*]\n");
        let err = resolver
            .resolve(
                Path::new("/org/Users/ghost/notes"),
                &chain,
                &state(ObjectKind::File, rw(), r(), r()),
            )
            .unwrap_err();
        assert_eq!(
            err,
            PolicyError::UnknownIdentity {
                name: "ghost".to_string()
            }
        );
    }

    #[test]
    fn g_flag_uses_segment_as_group() {
        let ids = ids();
        let options = ResolveOptions::default();
        let resolver = PolicyResolver::new(&ids, &options);
        let chain = chain("/org/..aclman", "[/Groups/*G/*]\n");
        let policy = resolver
            .resolve(
                Path::new("/org/Groups/devs/plan"),
                &chain,
                &state(ObjectKind::File, rw(), r(), r()),
            )
            .unwrap();
        assert_eq!(policy.owner, None);
        assert_eq!(policy.group.as_deref(), Some("devs"));
    }

    #[test]
    fn conditional_symbols_follow_object_type() {
        let spec = parse_acl("u::rwX-,g::r-XD,o::r-X-,d:u::rwx,d:g::r-x,d:o::r-x").unwrap();

        let file = state(ObjectKind::File, rw(), r(), r());
        let desired = desired_acl(&spec, &file, false);
        assert_eq!(desired.access[0].perms, rw());
        assert_eq!(desired.access[1].perms, r());
        assert!(desired.default.is_empty());
        assert!(desired
            .special
            .contains(&SpecialSetting { bit: SpecialBit::Setgid, value: false }));

        let dir = state(ObjectKind::Directory, rwx(), r(), r());
        let desired = desired_acl(&spec, &dir, false);
        assert_eq!(desired.access[1].perms, Perms::new(true, false, true));
        assert_eq!(desired.default.len(), 3);
        assert!(desired
            .special
            .contains(&SpecialSetting { bit: SpecialBit::Setgid, value: true }));
    }

    #[test]
    fn x_on_files_copies_the_owner_execute_bit() {
        let spec = parse_acl("u::***-,g::r-X-,o::r-X-").unwrap();
        let script = state(ObjectKind::File, rwx(), r(), r());
        let desired = desired_acl(&spec, &script, false);
        assert_eq!(desired.access[1].perms, Perms::new(true, false, true));
        let data = state(ObjectKind::File, rw(), r(), r());
        let desired = desired_acl(&spec, &data, false);
        assert_eq!(desired.access[1].perms, r());
    }

    #[test]
    fn no_change_keeps_current_bits_and_missing_entries_start_clear() {
        let spec = parse_acl("+u::*-*-,u:bob:r**").unwrap();
        let file = state(ObjectKind::File, rwx(), r(), r());
        let desired = desired_acl(&spec, &file, false);
        assert_eq!(desired.access[0].perms, Perms::new(true, false, true));
        assert_eq!(desired.access[1].perms, r());
        assert!(desired.merge);
    }

    #[test]
    fn missing_default_base_entries_start_from_access_entries() {
        let spec = parse_acl("d:u::***,d:o::*-*").unwrap();
        let dir = state(ObjectKind::Directory, rwx(), r(), Perms::new(true, true, true));
        let desired = desired_acl(&spec, &dir, false);
        assert_eq!(desired.default[0].perms, rwx());
        assert_eq!(desired.default[1].perms, Perms::new(true, false, true));
    }

    #[test]
    fn diracl_is_used_for_directories_only() {
        let ids = ids();
        let options = ResolveOptions::default();
        let resolver = PolicyResolver::new(&ids, &options);
        let chain = chain(
            "/org/..aclman",
            "[/data/*]\nACL=u::rw--,g::r---,o::----\nDIRACL=u::rwx-,g::r-x-,o::----\n",
        );
        let file = resolver
            .resolve(
                Path::new("/org/data/f"),
                &chain,
                &state(ObjectKind::File, rw(), r(), r()),
            )
            .unwrap();
        assert_eq!(file.acl.unwrap().access[0].perms, rw());

        let dir = resolver
            .resolve(
                Path::new("/org/data/d"),
                &chain,
                &state(ObjectKind::Directory, rw(), r(), r()),
            )
            .unwrap();
        assert!(dir.acl.is_none());

        let chain = chain_with_dir_section();
        let dir = resolver
            .resolve(
                Path::new("/org/data/d"),
                &chain,
                &state(ObjectKind::Directory, rw(), r(), r()),
            )
            .unwrap();
        assert_eq!(dir.acl.unwrap().access[0].perms, rwx());
    }

    fn chain_with_dir_section() -> RuleChain {
        chain(
            "/org/..aclman",
            "[/data/*/*]\nACL=u::rw--,g::r---,o::----\nDIRACL=u::rwx-,g::r-x-,o::----\n",
        )
    }

    #[test]
    fn poisoned_acl_is_reported_for_the_object() {
        let ids = ids();
        let options = ResolveOptions::default();
        let resolver = PolicyResolver::new(&ids, &options);
        let chain = chain("/org/..aclman", "[/*]\nACL=q::rwx-\n");
        let err = resolver
            .resolve(
                Path::new("/org/f"),
                &chain,
                &state(ObjectKind::File, rw(), r(), r()),
            )
            .unwrap_err();
        match err {
            PolicyError::InvalidGrammar { location, .. } => {
                assert_eq!(location.unwrap().line, 2);
            }
            other => panic!("expected InvalidGrammar, got {:?}", other),
        }
    }

    #[test]
    fn ignore_short_circuits() {
        let ids = ids();
        let options = ResolveOptions::default();
        let resolver = PolicyResolver::new(&ids, &options);
        let chain = chain("/org/..aclman", "[/*]\nOWNER=root\nIGNORE=yes\n");
        let policy = resolver
            .resolve(
                Path::new("/org/f"),
                &chain,
                &state(ObjectKind::File, rw(), r(), r()),
            )
            .unwrap();
        assert!(policy.ignored);
        assert_eq!(policy.owner, None);
        assert!(policy.rule.is_some());
    }

    #[test]
    fn matched_policy_files_are_protected() {
        let ids = ids();
        let options = ResolveOptions::default();
        let resolver = PolicyResolver::new(&ids, &options);
        let chain = chain("/org/..aclman", "[/*]\nOWNER=user1\nACL=u::rwx-,g::rwx-,o::rwx-\n");
        let policy = resolver
            .resolve(
                Path::new("/org/..aclman"),
                &chain,
                &state(ObjectKind::File, rw(), r(), r()),
            )
            .unwrap();
        assert_eq!(policy.owner.as_deref(), Some("root"));
        assert_eq!(policy.group.as_deref(), Some("root"));
        let acl = policy.acl.unwrap();
        assert!(!acl.merge);
        assert_eq!(acl.access[0].perms, rw());
        assert_eq!(acl.access[2].perms, r());

        let options = ResolveOptions {
            protect_config_files: false,
            ..ResolveOptions::default()
        };
        let resolver = PolicyResolver::new(&ids, &options);
        let policy = resolver
            .resolve(
                Path::new("/org/..aclman"),
                &chain,
                &state(ObjectKind::File, rw(), r(), r()),
            )
            .unwrap();
        assert_eq!(policy.owner.as_deref(), Some("user1"));
    }

    #[test]
    fn numeric_owner_and_group_use_account_names() {
        let ids = ids().with_uid(0, "root").with_gid(50, "staff");
        let options = ResolveOptions::default();
        let resolver = PolicyResolver::new(&ids, &options);
        let chain = chain("/org/..aclman", "[/*]\nOWNER=0\nGROUP=50\n");
        let current = state(ObjectKind::File, rw(), r(), r());
        let policy = resolver
            .resolve(Path::new("/org/file"), &chain, &current)
            .unwrap();
        assert_eq!(policy.owner.as_deref(), Some("root"));
        assert_eq!(policy.group.as_deref(), Some("staff"));

        // root already owns the file, only the group moves.
        let report = crate::plan::plan(Path::new("/org/file"), &current, &policy);
        assert!(report.owner_change.is_none());
        assert_eq!(report.chown_spec().as_deref(), Some(":staff"));
    }

    #[test]
    fn protected_policy_files_keep_special_bits() {
        let ids = ids();
        let options = ResolveOptions::default();
        let resolver = PolicyResolver::new(&ids, &options);
        let chain = chain("/org/..aclman", "[/*]\nOWNER=root\n");
        let mut current = state(ObjectKind::File, rw(), r(), r());
        current.special = SpecialBits {
            setuid: true,
            setgid: true,
            sticky: true,
        };
        let policy = resolver
            .resolve(Path::new("/org/..aclman"), &chain, &current)
            .unwrap();
        let acl = policy.acl.unwrap();
        assert_eq!(acl.special.len(), 3);
        assert!(acl.special.iter().all(|setting| setting.value));

        let report = crate::plan::plan(
            Path::new("/org/..aclman"),
            &current,
            &MatchedPolicy {
                acl: Some(acl),
                ..MatchedPolicy::default()
            },
        );
        assert!(report.changes.is_empty(), "{:?}", report.changes);
    }

    #[test]
    fn non_exec_extensions_clear_execute() {
        let ids = ids();
        let options = ResolveOptions {
            non_exec_extensions: vec!["jpg".to_string(), "tar.gz".to_string()],
            ..ResolveOptions::default()
        };
        let resolver = PolicyResolver::new(&ids, &options);
        let chain = chain("/org/..aclman", "[/*]\nACL=u::rwx-,g::r-x-,o::r-x-\n");
        let file = state(ObjectKind::File, rw(), r(), r());

        let policy = resolver
            .resolve(Path::new("/org/Photo.JPG"), &chain, &file)
            .unwrap();
        assert!(policy.acl.unwrap().access.iter().all(|e| !e.perms.execute));

        let policy = resolver
            .resolve(Path::new("/org/backup.tar.gz"), &chain, &file)
            .unwrap();
        assert!(policy.acl.unwrap().access.iter().all(|e| !e.perms.execute));

        let policy = resolver
            .resolve(Path::new("/org/notjpg"), &chain, &file)
            .unwrap();
        assert!(policy.acl.unwrap().access[0].perms.execute);
    }

    #[test]
    fn final_rule_marks_policy_terminal() {
        let ids = ids();
        let options = ResolveOptions::default();
        let resolver = PolicyResolver::new(&ids, &options);
        let chain = chain("/org/..aclman", "[/*]\nOWNER=root\nFINAL=true\n");
        let policy = resolver
            .resolve(
                Path::new("/org/f"),
                &chain,
                &state(ObjectKind::File, rw(), r(), r()),
            )
            .unwrap();
        assert!(policy.terminal);
    }
}
