//! Per-file access control lists.
//!
//! An ACL is an ordered list of `(username, permission)` entries. The wire
//! and on-disk serialization is `user1:RW,user2:R,user3:-`; WRITE always
//! implies READ, so a write grant is serialized (and stored) as `RW`.

use bitflags::bitflags;

bitflags! {
    /// Permission bits for a single ACL entry.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Permission: u8 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
    }
}

impl Permission {
    /// Applies the WRITE-implies-READ invariant.
    pub fn normalized(self) -> Self {
        if self.contains(Permission::WRITE) {
            self | Permission::READ
        } else {
            self
        }
    }

    /// The serialized token: `RW`, `R` or `-`.
    pub fn token(self) -> &'static str {
        let p = self.normalized();
        if p.contains(Permission::WRITE) {
            "RW"
        } else if p.contains(Permission::READ) {
            "R"
        } else {
            "-"
        }
    }

    fn from_token(token: &str) -> Option<Self> {
        match token {
            "RW" | "WR" => Some(Permission::READ | Permission::WRITE),
            "R" => Some(Permission::READ),
            "-" => Some(Permission::empty()),
            _ => None,
        }
    }
}

/// One `(username, permission)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AclEntry {
    pub user: String,
    pub perm: Permission,
}

/// Ordered access control list for a single file.
///
/// Entry order is preserved across serialization; removal shifts later
/// entries down. The file owner is conventionally entry 0 and is never
/// removed through [`Acl::revoke`] callers (enforced at the operation
/// layer, not here).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Acl {
    entries: Vec<AclEntry>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AclParseError {
    #[error("malformed ACL entry: {0:?}")]
    MalformedEntry(String),
    #[error("unknown permission token: {0:?}")]
    BadPermission(String),
}

impl Acl {
    /// A fresh ACL granting the owner read and write.
    pub fn for_owner(owner: &str) -> Self {
        Acl {
            entries: vec![AclEntry {
                user: owner.to_string(),
                perm: Permission::READ | Permission::WRITE,
            }],
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AclEntry> {
        self.entries.iter()
    }

    pub fn lookup(&self, user: &str) -> Option<Permission> {
        self.entries.iter().find(|e| e.user == user).map(|e| e.perm)
    }

    /// Whether `user` holds every bit in `wanted`.
    pub fn allows(&self, user: &str, wanted: Permission) -> bool {
        self.lookup(user)
            .map(|p| p.contains(wanted))
            .unwrap_or(false)
    }

    /// Grants `perm` (normalized) to `user`, updating an existing entry in
    /// place or appending a new one.
    pub fn grant(&mut self, user: &str, perm: Permission) {
        let perm = perm.normalized();
        match self.entries.iter_mut().find(|e| e.user == user) {
            Some(entry) => entry.perm = perm,
            None => self.entries.push(AclEntry {
                user: user.to_string(),
                perm,
            }),
        }
    }

    /// Removes `user` from the list. Returns false if no entry matched.
    pub fn revoke(&mut self, user: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.user != user);
        self.entries.len() != before
    }

    /// Serializes to the `user:RW,user:R` wire form.
    pub fn serialize(&self) -> String {
        self.entries
            .iter()
            .map(|e| format!("{}:{}", e.user, e.perm.token()))
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn parse(input: &str) -> Result<Self, AclParseError> {
        let mut entries = Vec::new();
        for part in input.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let (user, token) = part
                .rsplit_once(':')
                .ok_or_else(|| AclParseError::MalformedEntry(part.to_string()))?;
            if user.is_empty() {
                return Err(AclParseError::MalformedEntry(part.to_string()));
            }
            let perm = Permission::from_token(token)
                .ok_or_else(|| AclParseError::BadPermission(token.to_string()))?;
            entries.push(AclEntry {
                user: user.to_string(),
                perm,
            });
        }
        Ok(Acl { entries })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_implies_read() {
        let mut acl = Acl::for_owner("alice");
        acl.grant("bob", Permission::WRITE);
        assert!(acl.allows("bob", Permission::READ | Permission::WRITE));
        assert_eq!(acl.serialize(), "alice:RW,bob:RW");
    }

    #[test]
    fn serialize_parse_round_trip() {
        let mut acl = Acl::for_owner("alice");
        acl.grant("bob", Permission::READ);
        acl.grant("charlie", Permission::empty());
        let text = acl.serialize();
        assert_eq!(text, "alice:RW,bob:R,charlie:-");
        assert_eq!(Acl::parse(&text).unwrap(), acl);
    }

    #[test]
    fn revoke_shifts_down() {
        let mut acl = Acl::for_owner("alice");
        acl.grant("bob", Permission::READ);
        acl.grant("charlie", Permission::READ);
        assert!(acl.revoke("bob"));
        assert_eq!(acl.serialize(), "alice:RW,charlie:R");
        assert!(!acl.revoke("bob"));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(matches!(
            Acl::parse("nocolon"),
            Err(AclParseError::MalformedEntry(_))
        ));
        assert!(matches!(
            Acl::parse("alice:XYZ"),
            Err(AclParseError::BadPermission(_))
        ));
    }

    #[test]
    fn parse_empty_is_empty() {
        assert!(Acl::parse("").unwrap().is_empty());
    }
}
