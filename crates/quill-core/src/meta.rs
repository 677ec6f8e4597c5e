//! File metadata and its key=value codec.
//!
//! One [`FileMeta`] is persisted per file in a sidecar `<name>.meta`
//! descriptor on the owning storage node. That descriptor is the system's
//! source of truth for access control; coordinator-side copies are
//! advisory snapshots. The same text form is used to carry metadata over
//! the wire when the coordinator refreshes its cache.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::acl::{Acl, AclParseError, Permission};

/// Metadata and access control for one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMeta {
    /// Creating user; immutable for the lifetime of the file.
    pub owner: String,
    pub created: u64,
    pub modified: u64,
    pub accessed: u64,
    pub accessed_by: String,
    pub size: u64,
    pub word_count: u64,
    pub char_count: u64,
    pub acl: Acl,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MetaParseError {
    #[error("missing {0} field")]
    MissingField(&'static str),
    #[error("malformed line: {0:?}")]
    MalformedLine(String),
    #[error("bad numeric value for {0}")]
    BadNumber(&'static str),
    #[error(transparent)]
    Acl(#[from] AclParseError),
}

/// Current wall-clock time as epoch seconds.
pub fn epoch_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

impl FileMeta {
    /// Metadata for a freshly created, empty file: all counters zero,
    /// ACL granting the owner read and write.
    pub fn new(owner: &str, now: u64) -> Self {
        FileMeta {
            owner: owner.to_string(),
            created: now,
            modified: now,
            accessed: now,
            accessed_by: owner.to_string(),
            size: 0,
            word_count: 0,
            char_count: 0,
            acl: Acl::for_owner(owner),
        }
    }

    /// Whether `user` may read: the owner always can, otherwise the ACL
    /// decides.
    pub fn can_read(&self, user: &str) -> bool {
        self.owner == user || self.acl.allows(user, Permission::READ)
    }

    /// Whether `user` may write.
    pub fn can_write(&self, user: &str) -> bool {
        self.owner == user || self.acl.allows(user, Permission::WRITE)
    }

    /// Refreshes the size/word/char counters and the modification stamp
    /// after a successful content commit.
    pub fn record_modification(&mut self, content: &str, user: &str, now: u64) {
        self.size = content.len() as u64;
        self.word_count = crate::text::word_count(content) as u64;
        self.char_count = content.chars().count() as u64;
        self.modified = now;
        self.accessed = now;
        self.accessed_by = user.to_string();
    }

    /// Stamps a read access.
    pub fn record_access(&mut self, user: &str, now: u64) {
        self.accessed = now;
        self.accessed_by = user.to_string();
    }

    /// Serializes to the `.meta` key=value text form.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("owner={}\n", self.owner));
        out.push_str(&format!("created={}\n", self.created));
        out.push_str(&format!("modified={}\n", self.modified));
        out.push_str(&format!("accessed={}\n", self.accessed));
        out.push_str(&format!("accessed_by={}\n", self.accessed_by));
        out.push_str(&format!("size={}\n", self.size));
        out.push_str(&format!("word_count={}\n", self.word_count));
        out.push_str(&format!("char_count={}\n", self.char_count));
        out.push_str(&format!("access_count={}\n", self.acl.len()));
        for (i, entry) in self.acl.iter().enumerate() {
            out.push_str(&format!(
                "access_{}={}:{}\n",
                i,
                entry.user,
                entry.perm.token()
            ));
        }
        out
    }

    pub fn parse(text: &str) -> Result<Self, MetaParseError> {
        let mut owner = None;
        let mut created = None;
        let mut modified = None;
        let mut accessed = None;
        let mut accessed_by = None;
        let mut size = None;
        let mut word_count = None;
        let mut char_count = None;
        let mut acl_parts: Vec<(usize, String)> = Vec::new();

        for line in text.lines() {
            let line = line.trim_end();
            if line.is_empty() {
                continue;
            }
            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| MetaParseError::MalformedLine(line.to_string()))?;
            match key {
                "owner" => owner = Some(value.to_string()),
                "created" => created = Some(parse_u64(value, "created")?),
                "modified" => modified = Some(parse_u64(value, "modified")?),
                "accessed" => accessed = Some(parse_u64(value, "accessed")?),
                "accessed_by" => accessed_by = Some(value.to_string()),
                "size" => size = Some(parse_u64(value, "size")?),
                "word_count" => word_count = Some(parse_u64(value, "word_count")?),
                "char_count" => char_count = Some(parse_u64(value, "char_count")?),
                "access_count" => {}
                _ if key.starts_with("access_") => {
                    let index: usize = key["access_".len()..]
                        .parse()
                        .map_err(|_| MetaParseError::MalformedLine(line.to_string()))?;
                    acl_parts.push((index, value.to_string()));
                }
                _ => return Err(MetaParseError::MalformedLine(line.to_string())),
            }
        }

        acl_parts.sort_by_key(|(i, _)| *i);
        let acl_text = acl_parts
            .into_iter()
            .map(|(_, v)| v)
            .collect::<Vec<_>>()
            .join(",");

        Ok(FileMeta {
            owner: owner.ok_or(MetaParseError::MissingField("owner"))?,
            created: created.ok_or(MetaParseError::MissingField("created"))?,
            modified: modified.ok_or(MetaParseError::MissingField("modified"))?,
            accessed: accessed.ok_or(MetaParseError::MissingField("accessed"))?,
            accessed_by: accessed_by.ok_or(MetaParseError::MissingField("accessed_by"))?,
            size: size.ok_or(MetaParseError::MissingField("size"))?,
            word_count: word_count.ok_or(MetaParseError::MissingField("word_count"))?,
            char_count: char_count.ok_or(MetaParseError::MissingField("char_count"))?,
            acl: Acl::parse(&acl_text)?,
        })
    }
}

fn parse_u64(value: &str, field: &'static str) -> Result<u64, MetaParseError> {
    value.parse().map_err(|_| MetaParseError::BadNumber(field))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_meta_grants_owner_rw() {
        let meta = FileMeta::new("alice", 100);
        assert!(meta.can_read("alice"));
        assert!(meta.can_write("alice"));
        assert!(!meta.can_read("bob"));
        assert_eq!(meta.acl.serialize(), "alice:RW");
    }

    #[test]
    fn text_round_trip() {
        let mut meta = FileMeta::new("alice", 100);
        meta.acl.grant("bob", Permission::READ);
        meta.record_modification("one. two two.", "alice", 250);
        let text = meta.to_text();
        assert_eq!(FileMeta::parse(&text).unwrap(), meta);
    }

    #[test]
    fn text_form_matches_layout() {
        let mut meta = FileMeta::new("alice", 7);
        meta.acl.grant("bob", Permission::READ);
        let text = meta.to_text();
        assert!(text.contains("owner=alice\n"));
        assert!(text.contains("access_count=2\n"));
        assert!(text.contains("access_0=alice:RW\n"));
        assert!(text.contains("access_1=bob:R\n"));
    }

    #[test]
    fn parse_rejects_missing_owner() {
        assert_eq!(
            FileMeta::parse("created=1\n"),
            Err(MetaParseError::MissingField("owner"))
        );
    }

    #[test]
    fn record_modification_updates_counters() {
        let mut meta = FileMeta::new("alice", 1);
        meta.record_modification("ab cd.", "bob", 9);
        assert_eq!(meta.size, 6);
        assert_eq!(meta.word_count, 2);
        assert_eq!(meta.char_count, 6);
        assert_eq!(meta.modified, 9);
        assert_eq!(meta.accessed_by, "bob");
    }
}
