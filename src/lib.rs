//! Persist and restore undo stacks together with their subject.
//!
//! An envelope is URL-safe Base64 text wrapping a CBOR record (optionally
//! gzipped) that holds the stack state, the subject and a versioned
//! [`SubjectDescriptor`]. Decoding reconciles the restored subject with the
//! type the caller expects and reports a mismatch as a flag instead of an
//! error, so callers can migrate old subjects.

pub mod base64url;
pub mod compression;
pub mod config;
pub mod envelope;
pub mod error;
pub mod group;
pub mod stack;
pub mod subject;
pub mod types;

pub use config::CodecConfig;
pub use envelope::{decode, encode, DecodeHook, EncodeHook, EnvelopeCodec, ENVELOPE_FORMAT};
pub use error::{DecodingError, DescriptorError, EncodingError, GroupError, StackError};
pub use group::{GroupLink, GroupMember, SharedStack, StackGroup};
pub use stack::{SubjectStack, UndoCommand, UndoStack};
pub use subject::{NativeSubject, Subject, SubjectId};
pub use types::{RestoredResult, SubjectDescriptor, SubjectPayload};
