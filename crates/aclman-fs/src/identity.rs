// identity.rs - Cached passwd/group database lookups.
//
// Lookups go through the reentrant libc calls (getpwnam_r and friends), so
// NSS sources like LDAP work the same as /etc/passwd. Every answer, including
// "no such entry", is cached for the life of the process.

use std::collections::HashMap;
use std::ffi::{CStr, CString};
use std::hash::Hash;
use std::sync::RwLock;

use aclman_policy::{IdentityResolver, PolicyError};

/// Upper bound for the getpw*_r / getgr*_r scratch buffer.
const MAX_BUFFER: usize = 1 << 20;

#[derive(Debug, Clone, PartialEq, Eq)]
struct UserEntry {
    name: String,
    uid: u32,
    gid: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct GroupEntry {
    name: String,
    gid: u32,
}

/// Thread-safe, caching view of the system's users and groups.
#[derive(Debug, Default)]
pub struct SystemIdentities {
    users_by_name: RwLock<HashMap<String, Option<UserEntry>>>,
    users_by_uid: RwLock<HashMap<u32, Option<UserEntry>>>,
    groups_by_name: RwLock<HashMap<String, Option<GroupEntry>>>,
    groups_by_gid: RwLock<HashMap<u32, Option<GroupEntry>>>,
}

impl SystemIdentities {
    pub fn new() -> Self {
        Self::default()
    }

    /// uid of a user name. Numeric strings are taken as raw uids.
    pub fn uid(&self, name: &str) -> Option<u32> {
        cached(&self.users_by_name, name.to_string(), || user_by_name(name))
            .map(|user| user.uid)
            .or_else(|| name.parse().ok())
    }

    /// gid of a group name. Numeric strings are taken as raw gids.
    pub fn gid(&self, name: &str) -> Option<u32> {
        cached(&self.groups_by_name, name.to_string(), || group_by_name(name))
            .map(|group| group.gid)
            .or_else(|| name.parse().ok())
    }

    /// Name of a uid, or the number itself when it has no passwd entry.
    pub fn user_name(&self, uid: u32) -> String {
        cached(&self.users_by_uid, uid, || user_by_uid(uid))
            .map(|user| user.name)
            .unwrap_or_else(|| uid.to_string())
    }

    /// Name of a gid, or the number itself when it has no group entry.
    pub fn group_name(&self, gid: u32) -> String {
        cached(&self.groups_by_gid, gid, || group_by_gid(gid))
            .map(|group| group.name)
            .unwrap_or_else(|| gid.to_string())
    }
}

impl IdentityResolver for SystemIdentities {
    fn primary_group(&self, user: &str) -> Result<String, PolicyError> {
        let entry = cached(&self.users_by_name, user.to_string(), || user_by_name(user))
            .ok_or_else(|| PolicyError::UnknownIdentity {
                name: user.to_string(),
            })?;
        Ok(self.group_name(entry.gid))
    }

    fn canonical_user(&self, user: &str) -> Result<String, PolicyError> {
        if let Ok(uid) = user.parse() {
            return Ok(self.user_name(uid));
        }
        cached(&self.users_by_name, user.to_string(), || user_by_name(user))
            .map(|entry| entry.name)
            .ok_or_else(|| PolicyError::UnknownIdentity {
                name: user.to_string(),
            })
    }

    fn canonical_group(&self, group: &str) -> Result<String, PolicyError> {
        if let Ok(gid) = group.parse() {
            return Ok(self.group_name(gid));
        }
        cached(&self.groups_by_name, group.to_string(), || group_by_name(group))
            .map(|entry| entry.name)
            .ok_or_else(|| PolicyError::UnknownIdentity {
                name: group.to_string(),
            })
    }
}

/// Look `key` up in `cache`, filling it from `lookup` on a miss. A poisoned
/// lock only disables caching.
fn cached<K, V>(cache: &RwLock<HashMap<K, V>>, key: K, lookup: impl FnOnce() -> V) -> V
where
    K: Eq + Hash,
    V: Clone,
{
    if let Ok(map) = cache.read() {
        if let Some(value) = map.get(&key) {
            return value.clone();
        }
    }
    let value = lookup();
    if let Ok(mut map) = cache.write() {
        map.insert(key, value.clone());
    }
    value
}

type PasswdCall<'a> = dyn FnMut(
        *mut libc::passwd,
        *mut libc::c_char,
        libc::size_t,
        *mut *mut libc::passwd,
    ) -> libc::c_int
    + 'a;

type GroupCall<'a> = dyn FnMut(
        *mut libc::group,
        *mut libc::c_char,
        libc::size_t,
        *mut *mut libc::group,
    ) -> libc::c_int
    + 'a;

fn passwd_entry(call: &mut PasswdCall<'_>) -> Option<UserEntry> {
    let mut buf: Vec<libc::c_char> = vec![0; 1024];
    loop {
        // SAFETY: passwd is plain old data; the call fills it in.
        let mut pwd: libc::passwd = unsafe { std::mem::zeroed() };
        let mut result: *mut libc::passwd = std::ptr::null_mut();
        let rc = call(&mut pwd, buf.as_mut_ptr(), buf.len(), &mut result);
        if rc == libc::ERANGE && buf.len() < MAX_BUFFER {
            let grown = buf.len() * 2;
            buf.resize(grown, 0);
            continue;
        }
        if rc != 0 || result.is_null() {
            return None;
        }
        // SAFETY: on success pw_name points into `buf`, which is still alive.
        let name = unsafe { CStr::from_ptr(pwd.pw_name) }
            .to_string_lossy()
            .into_owned();
        return Some(UserEntry {
            name,
            uid: pwd.pw_uid,
            gid: pwd.pw_gid,
        });
    }
}

fn group_entry(call: &mut GroupCall<'_>) -> Option<GroupEntry> {
    let mut buf: Vec<libc::c_char> = vec![0; 1024];
    loop {
        // SAFETY: group is plain old data; the call fills it in.
        let mut grp: libc::group = unsafe { std::mem::zeroed() };
        let mut result: *mut libc::group = std::ptr::null_mut();
        let rc = call(&mut grp, buf.as_mut_ptr(), buf.len(), &mut result);
        if rc == libc::ERANGE && buf.len() < MAX_BUFFER {
            let grown = buf.len() * 2;
            buf.resize(grown, 0);
            continue;
        }
        if rc != 0 || result.is_null() {
            return None;
        }
        // SAFETY: on success gr_name points into `buf`, which is still alive.
        let name = unsafe { CStr::from_ptr(grp.gr_name) }
            .to_string_lossy()
            .into_owned();
        return Some(GroupEntry {
            name,
            gid: grp.gr_gid,
        });
    }
}

fn user_by_name(name: &str) -> Option<UserEntry> {
    let c_name = CString::new(name).ok()?;
    passwd_entry(&mut |pwd, buf, len, result| {
        // SAFETY: all pointers are valid for the duration of the call.
        unsafe { libc::getpwnam_r(c_name.as_ptr(), pwd, buf, len, result) }
    })
}

fn user_by_uid(uid: u32) -> Option<UserEntry> {
    passwd_entry(&mut |pwd, buf, len, result| {
        // SAFETY: all pointers are valid for the duration of the call.
        unsafe { libc::getpwuid_r(uid, pwd, buf, len, result) }
    })
}

fn group_by_name(name: &str) -> Option<GroupEntry> {
    let c_name = CString::new(name).ok()?;
    group_entry(&mut |grp, buf, len, result| {
        // SAFETY: all pointers are valid for the duration of the call.
        unsafe { libc::getgrnam_r(c_name.as_ptr(), grp, buf, len, result) }
    })
}

fn group_by_gid(gid: u32) -> Option<GroupEntry> {
    group_entry(&mut |grp, buf, len, result| {
        // SAFETY: all pointers are valid for the duration of the call.
        unsafe { libc::getgrgid_r(gid, grp, buf, len, result) }
    })
}
