//! The durable client registry.
//!
//! One record per username ever seen. Persisted to a flat text file that
//! is loaded at startup and rewritten on registration and disconnect, so
//! a reconnecting user reoccupies the same record across coordinator
//! restarts.

use std::fs;
use std::net::IpAddr;
use std::path::PathBuf;

use quill_core::epoch_now;

/// One known user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientRecord {
    pub username: String,
    pub last_ip: IpAddr,
    pub online: bool,
    pub first_connected: u64,
}

/// The registry and its backing file.
#[derive(Debug)]
pub struct ClientRegistry {
    path: PathBuf,
    records: Vec<ClientRecord>,
}

impl ClientRegistry {
    /// Loads the registry, treating a missing file as empty. Connection
    /// state cannot survive a restart, so every loaded record is marked
    /// offline.
    pub fn load(path: PathBuf) -> std::io::Result<Self> {
        let mut records = Vec::new();
        match fs::read_to_string(&path) {
            Ok(text) => {
                for line in text.lines() {
                    match parse_record(line) {
                        Some(mut record) => {
                            record.online = false;
                            records.push(record);
                        }
                        None => log::warn!("skipping malformed registry line: {line:?}"),
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        log::info!("loaded {} client records", records.len());
        Ok(ClientRegistry { path, records })
    }

    fn save(&self) -> std::io::Result<()> {
        let mut out = String::new();
        for r in &self.records {
            out.push_str(&format!(
                "{}|{}|{}|{}\n",
                r.username,
                r.last_ip,
                if r.online { "online" } else { "offline" },
                r.first_connected
            ));
        }
        fs::write(&self.path, out)
    }

    /// Creates or reactivates the record for `username`.
    pub fn register(&mut self, username: &str, ip: IpAddr) -> std::io::Result<bool> {
        let known = match self.records.iter_mut().find(|r| r.username == username) {
            Some(record) => {
                record.last_ip = ip;
                record.online = true;
                true
            }
            None => {
                self.records.push(ClientRecord {
                    username: username.to_string(),
                    last_ip: ip,
                    online: true,
                    first_connected: epoch_now(),
                });
                false
            }
        };
        self.save()?;
        Ok(known)
    }

    pub fn mark_offline(&mut self, username: &str) {
        if let Some(record) = self.records.iter_mut().find(|r| r.username == username) {
            record.online = false;
        }
        if let Err(e) = self.save() {
            log::warn!("failed to persist registry: {e}");
        }
    }

    pub fn records(&self) -> &[ClientRecord] {
        &self.records
    }

    /// The LIST listing: one user per line with online/offline status.
    pub fn format_listing(&self) -> String {
        if self.records.is_empty() {
            return "no clients have connected yet".to_string();
        }
        self.records
            .iter()
            .map(|r| {
                format!(
                    "{} ({}) - {}",
                    r.username,
                    r.last_ip,
                    if r.online { "online" } else { "offline" }
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn parse_record(line: &str) -> Option<ClientRecord> {
    let mut parts = line.split('|');
    let username = parts.next()?.to_string();
    let last_ip: IpAddr = parts.next()?.parse().ok()?;
    let online = match parts.next()? {
        "online" => true,
        "offline" => false,
        _ => return None,
    };
    let first_connected: u64 = parts.next()?.parse().ok()?;
    if username.is_empty() || parts.next().is_some() {
        return None;
    }
    Some(ClientRecord {
        username,
        last_ip,
        online,
        first_connected,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_path() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.txt");
        (dir, path)
    }

    #[test]
    fn registry_round_trips_through_the_file() {
        let (_dir, path) = scratch_path();
        let mut registry = ClientRegistry::load(path.clone()).unwrap();
        assert!(!registry.register("alice", "10.0.0.5".parse().unwrap()).unwrap());
        assert!(!registry.register("bob", "10.0.0.6".parse().unwrap()).unwrap());
        registry.mark_offline("bob");

        let reloaded = ClientRegistry::load(path).unwrap();
        assert_eq!(reloaded.records().len(), 2);
        let alice = &reloaded.records()[0];
        assert_eq!(alice.username, "alice");
        assert_eq!(alice.last_ip, "10.0.0.5".parse::<IpAddr>().unwrap());
        // connection state does not survive a restart
        assert!(!alice.online);
        assert_eq!(alice.first_connected, registry.records()[0].first_connected);
    }

    #[test]
    fn reconnect_reoccupies_the_record() {
        let (_dir, path) = scratch_path();
        let mut registry = ClientRegistry::load(path).unwrap();
        registry.register("alice", "10.0.0.5".parse().unwrap()).unwrap();
        registry.mark_offline("alice");
        let known = registry.register("alice", "10.0.0.9".parse().unwrap()).unwrap();
        assert!(known);
        assert_eq!(registry.records().len(), 1);
        assert!(registry.records()[0].online);
    }

    #[test]
    fn listing_shows_status() {
        let (_dir, path) = scratch_path();
        let mut registry = ClientRegistry::load(path).unwrap();
        registry.register("alice", "10.0.0.5".parse().unwrap()).unwrap();
        registry.register("bob", "10.0.0.6".parse().unwrap()).unwrap();
        registry.mark_offline("bob");
        let listing = registry.format_listing();
        assert!(listing.contains("alice (10.0.0.5) - online"));
        assert!(listing.contains("bob (10.0.0.6) - offline"));
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let (_dir, path) = scratch_path();
        fs::write(&path, "alice|10.0.0.5|online|12\ngarbage line\n").unwrap();
        let registry = ClientRegistry::load(path).unwrap();
        assert_eq!(registry.records().len(), 1);
    }
}
