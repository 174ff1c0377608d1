// state.rs - Snapshot of a filesystem object's ownership and ACLs.
//
// The state reader collaborator produces an ObjectState for every visited
// object. The resolver reads it; it is never mutated.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The two object types the permission grammar distinguishes.
///
/// Anything that is not a directory (regular files, fifos, devices) is a `File`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    File,
    Directory,
}

impl ObjectKind {
    pub fn is_dir(self) -> bool {
        matches!(self, ObjectKind::Directory)
    }
}

/// Concrete read/write/execute bits of one ACL entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Perms {
    pub read: bool,
    pub write: bool,
    pub execute: bool,
}

impl Perms {
    pub const NONE: Perms = Perms {
        read: false,
        write: false,
        execute: false,
    };

    pub fn new(read: bool, write: bool, execute: bool) -> Self {
        Self {
            read,
            write,
            execute,
        }
    }

    /// Bit at a 0-based position (0 = read, 1 = write, 2 = execute).
    pub fn bit(&self, index: usize) -> bool {
        match index {
            0 => self.read,
            1 => self.write,
            _ => self.execute,
        }
    }

    pub fn with_bit(mut self, index: usize, value: bool) -> Self {
        match index {
            0 => self.read = value,
            1 => self.write = value,
            _ => self.execute = value,
        }
        self
    }
}

/// Renders as the `rwx` text used by getfacl/setfacl.
impl fmt::Display for Perms {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}",
            if self.read { 'r' } else { '-' },
            if self.write { 'w' } else { '-' },
            if self.execute { 'x' } else { '-' }
        )
    }
}

/// The subject of a concrete ACL entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "tag", content = "name", rename_all = "snake_case")]
pub enum AclTag {
    Owner,
    OwningGroup,
    Other,
    User(String),
    Group(String),
    Mask,
}

impl AclTag {
    /// Owner, owning group and other always exist and can't be removed.
    pub fn is_base(&self) -> bool {
        matches!(self, AclTag::Owner | AclTag::OwningGroup | AclTag::Other)
    }
}

/// Renders as the setfacl subject text (`u:`, `g:staff`, `m:` ...).
impl fmt::Display for AclTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AclTag::Owner => write!(f, "u:"),
            AclTag::OwningGroup => write!(f, "g:"),
            AclTag::Other => write!(f, "o:"),
            AclTag::User(name) => write!(f, "u:{}", name),
            AclTag::Group(name) => write!(f, "g:{}", name),
            AclTag::Mask => write!(f, "m:"),
        }
    }
}

/// One concrete ACL entry as it exists (or should exist) on an object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclEntry {
    pub tag: AclTag,
    pub perms: Perms,
}

impl AclEntry {
    pub fn new(tag: AclTag, perms: Perms) -> Self {
        Self { tag, perms }
    }
}

/// The setuid, setgid and sticky mode bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecialBits {
    pub setuid: bool,
    pub setgid: bool,
    pub sticky: bool,
}

impl SpecialBits {
    /// Extract the special bits from a `st_mode` value.
    pub fn from_mode(mode: u32) -> Self {
        Self {
            setuid: mode & 0o4000 != 0,
            setgid: mode & 0o2000 != 0,
            sticky: mode & 0o1000 != 0,
        }
    }

    /// The special bit carried by a base subject's fourth position.
    pub fn get(&self, bit: SpecialBit) -> bool {
        match bit {
            SpecialBit::Setuid => self.setuid,
            SpecialBit::Setgid => self.setgid,
            SpecialBit::Sticky => self.sticky,
        }
    }
}

/// Which special bit a fourth permission position controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecialBit {
    Setuid,
    Setgid,
    Sticky,
}

impl SpecialBit {
    /// Octal mask of the bit within `st_mode`.
    pub fn mode_mask(self) -> u32 {
        match self {
            SpecialBit::Setuid => 0o4000,
            SpecialBit::Setgid => 0o2000,
            SpecialBit::Sticky => 0o1000,
        }
    }
}

impl fmt::Display for SpecialBit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpecialBit::Setuid => write!(f, "setuid"),
            SpecialBit::Setgid => write!(f, "setgid"),
            SpecialBit::Sticky => write!(f, "sticky"),
        }
    }
}

/// Current ownership and ACLs of one filesystem object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectState {
    pub owner: String,
    pub group: String,
    pub kind: ObjectKind,
    pub special: SpecialBits,
    /// Access ACL; always contains the three base entries.
    pub access: Vec<AclEntry>,
    /// Default ACL; empty for files and for directories without one.
    pub default: Vec<AclEntry>,
}

impl ObjectState {
    /// Look up an entry in the access or default ACL.
    pub fn entry(&self, tag: &AclTag, default: bool) -> Option<&AclEntry> {
        let list = if default { &self.default } else { &self.access };
        list.iter().find(|e| &e.tag == tag)
    }

    /// Current owner execute bit, used by the `X` symbol on files.
    pub fn owner_execute(&self) -> bool {
        self.entry(&AclTag::Owner, false)
            .map(|e| e.perms.execute)
            .unwrap_or(false)
    }
}
