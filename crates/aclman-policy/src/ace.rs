// ace.rs - ACL specification strings.
//
// An ACL value is a comma-separated list of ACEs:
//
//   [default:]u::<4>   owner              [default:]u:<user>:<3>   named user
//   [default:]g::<4>   owning group       [default:]g:<group>:<3>  named group
//   [default:]o::<4>   other              [default:]m::<3>         mask
//
// Default base entries take three symbols (default ACLs have no special
// bits). A leading `+` on the whole value selects merge mode.

use std::fmt;
use std::str::FromStr;

use crate::error::PolicyError;
use crate::permission::{PermissionIntent, SubjectClass};
use crate::state::{AclTag, SpecialBit};

/// Who an ACE applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Subject {
    Owner,
    OwningGroup,
    Other,
    NamedUser(String),
    NamedGroup(String),
    Mask,
}

impl Subject {
    pub fn class(&self) -> SubjectClass {
        match self {
            Subject::Owner | Subject::OwningGroup | Subject::Other => SubjectClass::Base,
            _ => SubjectClass::Named,
        }
    }

    /// The mode bit controlled by the fourth permission position.
    pub fn special_bit(&self) -> Option<SpecialBit> {
        match self {
            Subject::Owner => Some(SpecialBit::Setuid),
            Subject::OwningGroup => Some(SpecialBit::Setgid),
            Subject::Other => Some(SpecialBit::Sticky),
            _ => None,
        }
    }

    /// The concrete ACL tag this subject addresses.
    pub fn tag(&self) -> AclTag {
        match self {
            Subject::Owner => AclTag::Owner,
            Subject::OwningGroup => AclTag::OwningGroup,
            Subject::Other => AclTag::Other,
            Subject::NamedUser(name) => AclTag::User(name.clone()),
            Subject::NamedGroup(name) => AclTag::Group(name.clone()),
            Subject::Mask => AclTag::Mask,
        }
    }
}

/// One access-control-entry intent.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ace {
    pub subject: Subject,
    /// Applies to a directory's default ACL instead of its access ACL.
    pub is_default: bool,
    pub permission: PermissionIntent,
}

impl Ace {
    /// Number of permission symbols this subject takes.
    fn width(subject: &Subject, is_default: bool) -> usize {
        match subject.class() {
            SubjectClass::Base if !is_default => 4,
            _ => 3,
        }
    }
}

impl FromStr for Ace {
    type Err = PolicyError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let mut parts: Vec<&str> = text.split(':').collect();
        let is_default = matches!(parts.first(), Some(&"d") | Some(&"default"));
        if is_default {
            parts.remove(0);
        }
        let [tag, name, perms] = parts[..] else {
            return Err(PolicyError::grammar(format!(
                "ACE '{}' must have the form [default:]<tag>:<name>:<permissions>",
                text
            )));
        };

        let subject = match (tag, name) {
            ("u" | "user", "") => Subject::Owner,
            ("u" | "user", name) => Subject::NamedUser(name.to_string()),
            ("g" | "group", "") => Subject::OwningGroup,
            ("g" | "group", name) => Subject::NamedGroup(name.to_string()),
            ("o" | "other", "") => Subject::Other,
            ("m" | "mask", "") => Subject::Mask,
            ("o" | "other" | "m" | "mask", name) => {
                return Err(PolicyError::grammar(format!(
                    "'{}' entries can not have a name, found '{}' in ACE '{}'",
                    tag, name, text
                )))
            }
            (tag, _) => {
                return Err(PolicyError::grammar(format!(
                    "unknown subject tag '{}' in ACE '{}'",
                    tag, text
                )))
            }
        };

        let permission = PermissionIntent::parse(
            perms,
            subject.class(),
            Ace::width(&subject, is_default),
        )
        .map_err(|e| match e {
            PolicyError::InvalidGrammar { reason, location } => PolicyError::InvalidGrammar {
                reason: format!("{} in ACE '{}'", reason, text),
                location,
            },
            other => other,
        })?;

        Ok(Ace {
            subject,
            is_default,
            permission,
        })
    }
}

/// Canonical form: `default:` prefix and short tags.
impl fmt::Display for Ace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_default {
            write!(f, "default:")?;
        }
        let (tag, name) = match &self.subject {
            Subject::Owner => ("u", ""),
            Subject::OwningGroup => ("g", ""),
            Subject::Other => ("o", ""),
            Subject::NamedUser(name) => ("u", name.as_str()),
            Subject::NamedGroup(name) => ("g", name.as_str()),
            Subject::Mask => ("m", ""),
        };
        write!(f, "{}:{}:{}", tag, name, self.permission)
    }
}

/// A parsed ACL value: ordered ACEs plus the replace/merge switch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AclSpec {
    pub entries: Vec<Ace>,
    /// `+` prefix: leave entries that are not mentioned alone.
    pub merge: bool,
}

impl AclSpec {
    /// Access entries, in declaration order.
    pub fn access(&self) -> impl Iterator<Item = &Ace> {
        self.entries.iter().filter(|ace| !ace.is_default)
    }

    /// Default entries, in declaration order.
    pub fn defaults(&self) -> impl Iterator<Item = &Ace> {
        self.entries.iter().filter(|ace| ace.is_default)
    }
}

/// Parse a full ACL value (`ACL=` / `DIRACL=`).
pub fn parse_acl(text: &str) -> Result<AclSpec, PolicyError> {
    let text = text.trim();
    let (merge, body) = match text.strip_prefix('+') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    if body.is_empty() {
        return Err(PolicyError::grammar("empty ACL"));
    }
    let entries = body
        .split(',')
        .map(|element| element.trim().parse::<Ace>())
        .collect::<Result<Vec<_>, _>>()?;
    Ok(AclSpec { entries, merge })
}

impl FromStr for AclSpec {
    type Err = PolicyError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        parse_acl(text)
    }
}

impl fmt::Display for AclSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.merge {
            write!(f, "+")?;
        }
        for (i, ace) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", ace)?;
        }
        Ok(())
    }
}
