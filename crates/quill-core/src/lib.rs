//! Common data types shared by the quill coordinator, storage nodes and
//! clients: permissions and ACLs, file metadata and its on-disk codec,
//! filename policy, the sentence/word document model, and the server
//! log-file writer.

#![forbid(unsafe_code)]

pub mod acl;
pub mod filename;
pub mod logging;
pub mod meta;
pub mod text;

pub use acl::{Acl, AclEntry, AclParseError, Permission};
pub use filename::{FilenameError, validate_filename};
pub use meta::{FileMeta, MetaParseError, epoch_now};
pub use text::{EditError, Sentence, apply_word_edit, parse_document, render_document};
