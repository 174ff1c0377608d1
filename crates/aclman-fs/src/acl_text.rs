// acl_text.rs - Parser for getfacl's long text form.
//
//   user::rwx
//   user:bob:r-x            #effective:r--
//   group::r-x
//   mask::r-x
//   other::r-x
//   default:user::rwx
//
// Names with unusual characters are escaped as octal (`\040` for a space).

use aclman_policy::{AclEntry, AclTag, Perms};

/// Access and default entries of one object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedAcl {
    pub access: Vec<AclEntry>,
    pub default: Vec<AclEntry>,
}

/// Parse getfacl output. On failure, returns the offending line.
pub fn parse_getfacl(text: &str) -> Result<ParsedAcl, String> {
    let mut acl = ParsedAcl::default();
    for raw in text.lines() {
        let line = match raw.find('#') {
            Some(pos) => &raw[..pos],
            None => raw,
        }
        .trim();
        if line.is_empty() {
            continue;
        }
        let (default, entry) = match line.strip_prefix("default:") {
            Some(rest) => (true, rest),
            None => (false, line),
        };
        let entry = parse_entry(entry).ok_or_else(|| raw.to_string())?;
        if default {
            acl.default.push(entry);
        } else {
            acl.access.push(entry);
        }
    }
    Ok(acl)
}

fn parse_entry(text: &str) -> Option<AclEntry> {
    let mut parts = text.split(':');
    let (tag, name, perms) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }
    let name = unescape(name);
    let tag = match (tag, name.is_empty()) {
        ("user", true) => AclTag::Owner,
        ("user", false) => AclTag::User(name),
        ("group", true) => AclTag::OwningGroup,
        ("group", false) => AclTag::Group(name),
        ("mask", true) => AclTag::Mask,
        ("other", true) => AclTag::Other,
        _ => return None,
    };
    Some(AclEntry::new(tag, parse_perms(perms)?))
}

fn parse_perms(text: &str) -> Option<Perms> {
    let bytes = text.as_bytes();
    if bytes.len() != 3 {
        return None;
    }
    let bit = |c: u8, set: u8| match c {
        b'-' => Some(false),
        c if c == set => Some(true),
        _ => None,
    };
    Some(Perms::new(
        bit(bytes[0], b'r')?,
        bit(bytes[1], b'w')?,
        bit(bytes[2], b'x')?,
    ))
}

/// Undo getfacl's `\ooo` octal escapes.
fn unescape(text: &str) -> String {
    if !text.contains('\\') {
        return text.to_string();
    }
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() && is_octal(&bytes[i + 1..i + 4]) {
            let digits = &bytes[i + 1..i + 4];
            out.push(digits.iter().fold(0u8, |acc, d| acc * 8 + (d - b'0')));
            i += 4;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn is_octal(digits: &[u8]) -> bool {
    digits.len() == 3 && digits[0] <= b'3' && digits.iter().all(|d| (b'0'..=b'7').contains(d))
}
