//! Wire-visible status codes.

use binrw::prelude::*;

macro_rules! make_status {
    (
        $($name:ident = $value:literal: $description:literal, )+
    ) => {

/// Status codes carried in response frames.
///
/// Every failure anywhere in the system surfaces as exactly one of these
/// codes; storage-node errors are forwarded verbatim by the coordinator.
#[derive(BinRead, BinWrite, Debug, PartialEq, Eq, Clone, Copy)]
#[repr(u32)]
#[brw(repr(u32))]
pub enum Status {
    $(
        #[doc = concat!($description, " (", stringify!($value), ")")]
        $name = $value,
    )+
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let message_as_string = match self {
            $(
                Status::$name => $description,
            )+
        };
        write!(f, "{} ({:#x})", message_as_string, *self as u32)
    }
}
    };
}

make_status! {
    Ok = 0: "Success",
    NotFound = 1: "Not Found",
    FileExists = 2: "File Already Exists",
    ReadPermission = 3: "Read Permission Denied",
    WritePermission = 4: "Write Permission Denied",
    OwnerRequired = 5: "Owner Required",
    Locked = 6: "Sentence Locked",
    InvalidIndex = 7: "Invalid Index",
    InvalidFilename = 8: "Invalid Filename",
    InvalidArgs = 9: "Invalid Arguments",
    InvalidOperation = 10: "Invalid Operation",
    ServerUnavailable = 11: "No Storage Node Available",
    Network = 12: "Network Failure",
    Internal = 13: "Internal Error",
}

impl Status {
    pub fn is_ok(self) -> bool {
        self == Status::Ok
    }
}
