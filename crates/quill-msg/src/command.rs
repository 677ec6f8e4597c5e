//! Protocol command codes.

use binrw::prelude::*;

/// Command codes carried in request frames.
///
/// `Etirw` (WRITE spelled backwards) terminates a write session and
/// commits its buffered changes. `Heartbeat` is reserved and answered
/// with `INVALID_OPERATION` by every receiver.
#[derive(BinRead, BinWrite, Debug, PartialEq, Eq, Clone, Copy)]
#[brw(repr(u32))]
pub enum Command {
    View = 0,
    Read = 1,
    Create = 2,
    Write = 3,
    Etirw = 4,
    Undo = 5,
    Info = 6,
    Delete = 7,
    Stream = 8,
    List = 9,
    AddAccess = 10,
    RemAccess = 11,
    Exec = 12,
    ClientInit = 13,
    SsInit = 14,
    UpdateAcl = 15,
    Heartbeat = 16,
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Command::View => "View",
            Command::Read => "Read",
            Command::Create => "Create",
            Command::Write => "Write",
            Command::Etirw => "Etirw",
            Command::Undo => "Undo",
            Command::Info => "Info",
            Command::Delete => "Delete",
            Command::Stream => "Stream",
            Command::List => "List",
            Command::AddAccess => "Add Access",
            Command::RemAccess => "Remove Access",
            Command::Exec => "Exec",
            Command::ClientInit => "Client Init",
            Command::SsInit => "Storage Init",
            Command::UpdateAcl => "Update ACL",
            Command::Heartbeat => "Heartbeat",
        };
        write!(f, "{} ({:#x})", name, *self as u32)
    }
}
