//! Fixed-size request/response frames with integrity validation.
//!
//! Both frame kinds are little-endian, magic-tagged, NUL-padded and carry
//! a trailing XOR-fold checksum over every preceding byte. A checksum or
//! magic mismatch rejects the frame; the receiver treats the connection
//! as dead.

use std::io::Cursor;

use binrw::{Endian, prelude::*};

use crate::{Command, Status};

/// Frame magic, first four bytes of every frame.
pub const MAGIC: u32 = 0xD0C5;

/// Size of the NUL-padded username field.
pub const USERNAME_LEN: usize = 64;
/// Size of the NUL-padded request args field.
pub const ARGS_LEN: usize = 1024;
/// Size of the NUL-padded response data field.
pub const DATA_LEN: usize = 4096;

/// Total encoded request frame size: magic + command + username + args +
/// checksum.
pub const REQUEST_FRAME_LEN: usize = 4 + 4 + USERNAME_LEN + ARGS_LEN + 4;
/// Total encoded response frame size: magic + status + data + checksum.
pub const RESPONSE_FRAME_LEN: usize = 4 + 4 + DATA_LEN + 4;

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("{field} exceeds {max} bytes (got {len})")]
    FieldTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },
    #[error("frame has wrong length: expected {expected}, got {got}")]
    WrongLength { expected: usize, got: usize },
    #[error("bad frame magic: {found:#010x}")]
    BadMagic { found: u32 },
    #[error("frame checksum mismatch: carried {carried:#010x}, computed {computed:#010x}")]
    ChecksumMismatch { carried: u32, computed: u32 },
    #[error("frame field is not valid UTF-8")]
    BadUtf8,
    #[error("malformed frame: {0}")]
    Malformed(#[from] binrw::Error),
}

/// XOR-fold over 32-bit little-endian strides. A short trailing chunk is
/// zero-extended. Deterministic; same input, same output.
pub fn checksum(bytes: &[u8]) -> u32 {
    let mut acc = 0u32;
    for chunk in bytes.chunks(4) {
        let mut word = [0u8; 4];
        word[..chunk.len()].copy_from_slice(chunk);
        acc ^= u32::from_le_bytes(word);
    }
    acc
}

/// A NUL-padded fixed-width string field.
///
/// Encodes as exactly `N` bytes: the UTF-8 contents followed by NUL
/// padding. Decoding takes bytes up to the first NUL and requires valid
/// UTF-8.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FixedString<const N: usize>(String);

impl<const N: usize> FixedString<N> {
    pub fn new(value: &str) -> Result<Self, FrameError> {
        if value.len() > N {
            return Err(FrameError::FieldTooLong {
                field: "string field",
                len: value.len(),
                max: N,
            });
        }
        if value.contains('\0') {
            return Err(FrameError::BadUtf8);
        }
        Ok(FixedString(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl<const N: usize> std::fmt::Display for FixedString<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<const N: usize> BinRead for FixedString<N> {
    type Args<'a> = ();

    fn read_options<R: std::io::Read + std::io::Seek>(
        reader: &mut R,
        _: Endian,
        _: Self::Args<'_>,
    ) -> BinResult<Self> {
        let pos = reader.stream_position()?;
        let mut buf = vec![0u8; N];
        reader.read_exact(&mut buf)?;
        let end = buf.iter().position(|b| *b == 0).unwrap_or(N);
        let value = std::str::from_utf8(&buf[..end]).map_err(|e| binrw::Error::Custom {
            pos,
            err: Box::new(e),
        })?;
        Ok(FixedString(value.to_string()))
    }
}

impl<const N: usize> BinWrite for FixedString<N> {
    type Args<'a> = ();

    fn write_options<W: std::io::Write + std::io::Seek>(
        &self,
        writer: &mut W,
        _: Endian,
        _: Self::Args<'_>,
    ) -> BinResult<()> {
        let bytes = self.0.as_bytes();
        debug_assert!(bytes.len() <= N);
        writer.write_all(bytes)?;
        writer.write_all(&vec![0u8; N - bytes.len()])?;
        Ok(())
    }
}

/// A request frame: client to coordinator, coordinator to storage node,
/// or client directly to storage node.
#[binrw::binrw]
#[brw(little, magic(0xD0C5u32))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestFrame {
    pub command: Command,
    pub username: FixedString<USERNAME_LEN>,
    pub args: FixedString<ARGS_LEN>,
}

/// A response frame, flowing the opposite way.
#[binrw::binrw]
#[brw(little, magic(0xD0C5u32))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseFrame {
    pub status: Status,
    pub data: FixedString<DATA_LEN>,
}

impl RequestFrame {
    pub fn new(command: Command, username: &str, args: &str) -> Result<Self, FrameError> {
        Ok(RequestFrame {
            command,
            username: FixedString::new(username).map_err(|_| FrameError::FieldTooLong {
                field: "username",
                len: username.len(),
                max: USERNAME_LEN,
            })?,
            args: FixedString::new(args).map_err(|_| FrameError::FieldTooLong {
                field: "args",
                len: args.len(),
                max: ARGS_LEN,
            })?,
        })
    }

    pub fn encode(&self) -> Result<[u8; REQUEST_FRAME_LEN], FrameError> {
        encode_frame::<_, REQUEST_FRAME_LEN>(self)
    }

    pub fn decode(buf: &[u8]) -> Result<Self, FrameError> {
        decode_frame::<_, REQUEST_FRAME_LEN>(buf)
    }
}

impl ResponseFrame {
    pub fn new(status: Status, data: &str) -> Result<Self, FrameError> {
        Ok(ResponseFrame {
            status,
            data: FixedString::new(data).map_err(|_| FrameError::FieldTooLong {
                field: "data",
                len: data.len(),
                max: DATA_LEN,
            })?,
        })
    }

    /// An OK response carrying `data`.
    pub fn ok(data: &str) -> Result<Self, FrameError> {
        Self::new(Status::Ok, data)
    }

    /// An error response; `data` holds the human-readable message shown
    /// by the client as `Error: <data>`.
    pub fn error(status: Status, data: &str) -> Self {
        Self::new(status, data).unwrap_or_else(|_| ResponseFrame {
            status,
            data: FixedString::default(),
        })
    }

    pub fn encode(&self) -> Result<[u8; RESPONSE_FRAME_LEN], FrameError> {
        encode_frame::<_, RESPONSE_FRAME_LEN>(self)
    }

    pub fn decode(buf: &[u8]) -> Result<Self, FrameError> {
        decode_frame::<_, RESPONSE_FRAME_LEN>(buf)
    }
}

fn encode_frame<T: for<'a> BinWrite<Args<'a> = ()>, const LEN: usize>(
    frame: &T,
) -> Result<[u8; LEN], FrameError> {
    let mut cursor = Cursor::new(Vec::with_capacity(LEN));
    frame.write_le(&mut cursor)?;
    let mut bytes = cursor.into_inner();
    if bytes.len() != LEN - 4 {
        return Err(FrameError::WrongLength {
            expected: LEN - 4,
            got: bytes.len(),
        });
    }
    let sum = checksum(&bytes);
    bytes.extend_from_slice(&sum.to_le_bytes());
    let mut out = [0u8; LEN];
    out.copy_from_slice(&bytes);
    Ok(out)
}

fn decode_frame<T: for<'a> BinRead<Args<'a> = ()>, const LEN: usize>(
    buf: &[u8],
) -> Result<T, FrameError> {
    if buf.len() != LEN {
        return Err(FrameError::WrongLength {
            expected: LEN,
            got: buf.len(),
        });
    }
    let (body, tail) = buf.split_at(LEN - 4);
    let carried = u32::from_le_bytes([tail[0], tail[1], tail[2], tail[3]]);
    let computed = checksum(body);
    if carried != computed {
        return Err(FrameError::ChecksumMismatch { carried, computed });
    }
    let found = u32::from_le_bytes([body[0], body[1], body[2], body[3]]);
    if found != MAGIC {
        return Err(FrameError::BadMagic { found });
    }
    Ok(T::read_le(&mut Cursor::new(body))?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_request() -> RequestFrame {
        RequestFrame::new(Command::Write, "alice", "notes.txt 2").unwrap()
    }

    fn sample_response() -> ResponseFrame {
        ResponseFrame::ok("Lock acquired for sentence 2").unwrap()
    }

    #[test]
    fn request_round_trip() {
        let frame = sample_request();
        let bytes = frame.encode().unwrap();
        assert_eq!(bytes.len(), REQUEST_FRAME_LEN);
        assert_eq!(RequestFrame::decode(&bytes).unwrap(), frame);
    }

    #[test]
    fn response_round_trip() {
        let frame = sample_response();
        let bytes = frame.encode().unwrap();
        assert_eq!(bytes.len(), RESPONSE_FRAME_LEN);
        assert_eq!(ResponseFrame::decode(&bytes).unwrap(), frame);
    }

    #[test]
    fn checksum_bit_flip_rejects_frame() {
        let frame = sample_request();
        let good = frame.encode().unwrap();
        // a flip anywhere in the frame must be caught
        for pos in [0, 5, 70, 900, REQUEST_FRAME_LEN - 1] {
            let mut bad = good;
            bad[pos] ^= 0x10;
            assert!(matches!(
                RequestFrame::decode(&bad),
                Err(FrameError::ChecksumMismatch { .. })
            ));
        }
    }

    #[test]
    fn magic_mismatch_rejects_frame() {
        let frame = sample_response();
        let mut bytes = frame.encode().unwrap();
        bytes[0] ^= 0xFF;
        // restore the checksum so only the magic is wrong
        let sum = checksum(&bytes[..RESPONSE_FRAME_LEN - 4]);
        bytes[RESPONSE_FRAME_LEN - 4..].copy_from_slice(&sum.to_le_bytes());
        assert!(matches!(
            ResponseFrame::decode(&bytes),
            Err(FrameError::BadMagic { .. })
        ));
    }

    #[test]
    fn unknown_command_code_rejects_frame() {
        let frame = sample_request();
        let mut bytes = frame.encode().unwrap();
        bytes[4] = 0xEE; // command is right after the magic
        let sum = checksum(&bytes[..REQUEST_FRAME_LEN - 4]);
        bytes[REQUEST_FRAME_LEN - 4..].copy_from_slice(&sum.to_le_bytes());
        assert!(matches!(
            RequestFrame::decode(&bytes),
            Err(FrameError::Malformed(_))
        ));
    }

    #[test]
    fn truncated_frame_is_rejected() {
        let bytes = sample_request().encode().unwrap();
        assert!(matches!(
            RequestFrame::decode(&bytes[..REQUEST_FRAME_LEN - 1]),
            Err(FrameError::WrongLength { .. })
        ));
    }

    #[test]
    fn oversized_fields_are_refused() {
        let long = "x".repeat(USERNAME_LEN + 1);
        assert!(matches!(
            RequestFrame::new(Command::List, &long, ""),
            Err(FrameError::FieldTooLong { .. })
        ));
    }

    #[test]
    fn checksum_is_deterministic() {
        let bytes = b"stride test input";
        assert_eq!(checksum(bytes), checksum(bytes));
        assert_ne!(checksum(b"aaaa"), checksum(b"aaab"));
    }
}
