// plan.rs - Diff a matched policy against the current state.
//
// The resulting ObjectReport is both the applier's work list and the record
// printed for the user, so the applier executes exactly what is reported.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::PolicyError;
use crate::resolver::MatchedPolicy;
use crate::section::RuleRef;
use crate::state::{AclEntry, AclTag, ObjectKind, ObjectState, Perms, SpecialBit, SpecialBits};

/// An owner or group transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentityChange {
    pub from: String,
    pub to: String,
}

/// One concrete ACL or mode change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum AclChange {
    SetSpecial {
        bit: SpecialBit,
        to: bool,
    },
    Modify {
        default: bool,
        tag: AclTag,
        from: Perms,
        to: Perms,
    },
    Add {
        default: bool,
        entry: AclEntry,
    },
    Remove {
        default: bool,
        tag: AclTag,
    },
    /// Drop the whole default ACL of a directory.
    RemoveDefaults,
}

impl AclChange {
    /// Entry text for `setfacl -m`, e.g. `d:u:bob:r-x`.
    pub fn modify_spec(&self) -> Option<String> {
        match self {
            AclChange::Modify { default, tag, to, .. } => Some(entry_spec(*default, tag, *to)),
            AclChange::Add { default, entry } => {
                Some(entry_spec(*default, &entry.tag, entry.perms))
            }
            _ => None,
        }
    }

    /// Entry text for `setfacl -x`, e.g. `u:bob` or `d:m::`.
    pub fn remove_spec(&self) -> Option<String> {
        match self {
            AclChange::Remove { default, tag } => {
                let prefix = if *default { "d:" } else { "" };
                match tag {
                    AclTag::Mask => Some(format!("{}m::", prefix)),
                    tag => Some(format!("{}{}", prefix, tag)),
                }
            }
            _ => None,
        }
    }
}

fn entry_spec(default: bool, tag: &AclTag, perms: Perms) -> String {
    format!("{}{}:{}", if default { "d:" } else { "" }, tag, perms)
}

/// Renders as the equivalent shell command, without the path.
impl fmt::Display for AclChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AclChange::SetSpecial { bit, to } => {
                let sign = if *to { '+' } else { '-' };
                match bit {
                    SpecialBit::Setuid => write!(f, "chmod u{}s", sign),
                    SpecialBit::Setgid => write!(f, "chmod g{}s", sign),
                    SpecialBit::Sticky => write!(f, "chmod {}t", sign),
                }
            }
            AclChange::Modify { .. } | AclChange::Add { .. } => {
                write!(f, "setfacl -m {}", self.modify_spec().unwrap_or_default())
            }
            AclChange::Remove { .. } => {
                write!(f, "setfacl -x {}", self.remove_spec().unwrap_or_default())
            }
            AclChange::RemoveDefaults => write!(f, "setfacl -k"),
        }
    }
}

/// What happened to an object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// Already compliant, or no rule matched.
    Unchanged,
    /// Changes computed but not performed (dry run).
    Planned,
    Applied,
    /// The winning rule says IGNORE.
    Ignored,
    Failed { error: String },
}

/// Per-object record of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectReport {
    pub path: PathBuf,
    pub kind: ObjectKind,
    pub matched_rule: Option<RuleRef>,
    pub owner_change: Option<IdentityChange>,
    pub group_change: Option<IdentityChange>,
    pub changes: Vec<AclChange>,
    /// The winning rule was FINAL.
    pub terminal: bool,
    pub outcome: Outcome,
}

impl ObjectReport {
    /// A report for an object that could not be resolved or applied.
    pub fn failed(
        path: &Path,
        kind: ObjectKind,
        rule: Option<RuleRef>,
        error: &PolicyError,
    ) -> Self {
        Self {
            path: path.to_path_buf(),
            kind,
            matched_rule: rule,
            owner_change: None,
            group_change: None,
            changes: Vec::new(),
            terminal: false,
            outcome: Outcome::Failed {
                error: error.to_string(),
            },
        }
    }

    pub fn has_changes(&self) -> bool {
        self.owner_change.is_some() || self.group_change.is_some() || !self.changes.is_empty()
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, Outcome::Failed { .. })
    }

    /// `user:group` argument for chown, or `None` when ownership is compliant.
    pub fn chown_spec(&self) -> Option<String> {
        match (&self.owner_change, &self.group_change) {
            (None, None) => None,
            (Some(owner), None) => Some(owner.to.clone()),
            (None, Some(group)) => Some(format!(":{}", group.to)),
            (Some(owner), Some(group)) => Some(format!("{}:{}", owner.to, group.to)),
        }
    }
}

/// Compute the changes that bring `state` in line with `policy`.
pub fn plan(path: &Path, state: &ObjectState, policy: &MatchedPolicy) -> ObjectReport {
    let mut report = ObjectReport {
        path: path.to_path_buf(),
        kind: state.kind,
        matched_rule: policy.rule.clone(),
        owner_change: None,
        group_change: None,
        changes: Vec::new(),
        terminal: policy.terminal,
        outcome: Outcome::Unchanged,
    };
    if policy.ignored {
        report.outcome = Outcome::Ignored;
        return report;
    }

    report.owner_change = identity_change(&state.owner, policy.owner.as_deref());
    report.group_change = identity_change(&state.group, policy.group.as_deref());

    if let Some(desired) = &policy.acl {
        let mut special = state.special;
        for setting in &desired.special {
            if special.get(setting.bit) != setting.value {
                set_special(&mut special, setting.bit, setting.value);
                report.changes.push(AclChange::SetSpecial {
                    bit: setting.bit,
                    to: setting.value,
                });
            }
        }
        // Duplicates collapse to the last change per bit.
        dedup_special(&mut report.changes, state.special);

        diff_entries(
            &state.access,
            &desired.access,
            false,
            desired.merge,
            &mut report.changes,
        );

        if state.kind.is_dir() {
            if !desired.merge && desired.default.is_empty() {
                if !state.default.is_empty() {
                    report.changes.push(AclChange::RemoveDefaults);
                }
            } else {
                diff_entries(
                    &state.default,
                    &desired.default,
                    true,
                    desired.merge,
                    &mut report.changes,
                );
            }
        }
    }

    if report.has_changes() {
        report.outcome = Outcome::Planned;
    }
    report
}

fn identity_change(current: &str, desired: Option<&str>) -> Option<IdentityChange> {
    match desired {
        Some(to) if to != current => Some(IdentityChange {
            from: current.to_string(),
            to: to.to_string(),
        }),
        _ => None,
    }
}

fn set_special(bits: &mut SpecialBits, bit: SpecialBit, value: bool) {
    match bit {
        SpecialBit::Setuid => bits.setuid = value,
        SpecialBit::Setgid => bits.setgid = value,
        SpecialBit::Sticky => bits.sticky = value,
    }
}

/// Keep one SetSpecial per bit (the last one) and drop those that end up
/// restoring the current value.
fn dedup_special(changes: &mut Vec<AclChange>, current: SpecialBits) {
    let mut seen = Vec::new();
    let mut kept = Vec::new();
    for change in changes.drain(..).rev() {
        if let AclChange::SetSpecial { bit, to } = change {
            if seen.contains(&bit) {
                continue;
            }
            seen.push(bit);
            if current.get(bit) == to {
                continue;
            }
        }
        kept.push(change);
    }
    kept.reverse();
    *changes = kept;
}

fn diff_entries(
    current: &[AclEntry],
    desired: &[AclEntry],
    default: bool,
    merge: bool,
    changes: &mut Vec<AclChange>,
) {
    let first = changes.len();
    let mut working: Vec<AclEntry> = current.to_vec();
    for entry in desired {
        match working.iter_mut().find(|e| e.tag == entry.tag) {
            Some(existing) if existing.perms == entry.perms => {}
            Some(existing) => {
                changes.push(AclChange::Modify {
                    default,
                    tag: entry.tag.clone(),
                    from: existing.perms,
                    to: entry.perms,
                });
                existing.perms = entry.perms;
            }
            None => {
                changes.push(AclChange::Add {
                    default,
                    entry: entry.clone(),
                });
                working.push(entry.clone());
            }
        }
    }

    let wanted = |tag: &AclTag| desired.iter().any(|e| &e.tag == tag);
    if !merge {
        for entry in current {
            if matches!(entry.tag, AclTag::User(_) | AclTag::Group(_)) && !wanted(&entry.tag) {
                changes.push(AclChange::Remove {
                    default,
                    tag: entry.tag.clone(),
                });
                working.retain(|e| e.tag != entry.tag);
            }
        }
        // A mask is required while named entries remain.
        let named_left = working
            .iter()
            .any(|e| matches!(e.tag, AclTag::User(_) | AclTag::Group(_)));
        if !named_left && current.iter().any(|e| e.tag == AclTag::Mask) && !wanted(&AclTag::Mask)
        {
            changes.push(AclChange::Remove {
                default,
                tag: AclTag::Mask,
            });
        }
    }

    // setfacl recalculates the mask on every write unless one is given.
    let scope_changed = changes.len() > first;
    let touches_mask = |change: &AclChange| match change {
        AclChange::Modify { tag, .. } | AclChange::Remove { tag, .. } => *tag == AclTag::Mask,
        AclChange::Add { entry, .. } => entry.tag == AclTag::Mask,
        _ => false,
    };
    let restate = scope_changed && !changes[first..].iter().any(touches_mask);
    if let Some(mask) = desired.iter().find(|e| restate && e.tag == AclTag::Mask) {
        changes.push(AclChange::Modify {
            default,
            tag: AclTag::Mask,
            from: mask.perms,
            to: mask.perms,
        });
    }
}
