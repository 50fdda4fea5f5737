//! Error types shared by the whole crate.
//!
//! Library functions return [anyhow::Result] like the rest of the crate; the variants here are the
//! typed causes that can be recovered with [anyhow::Error::downcast_ref].

use crate::PartyId;
use thiserror::Error;

/// Typed failure causes of the protocol and its collaborators.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MpsiError {
    /// Parameters that can never produce a meaningful run. Checked before any party starts.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A hash function name that is not in the registry.
    #[error("unknown hash function `{0}`")]
    UnknownHashFunction(String),

    /// A party id that does not address any party of the run.
    #[error("party id {id} is out of range (party count = {party_count})")]
    OutOfRange {
        /// The offending id.
        id: PartyId,
        /// Number of parties of the run.
        party_count: usize,
    },

    /// Two shares that should have the same width do not.
    #[error("share length mismatch: expected {expected} bytes, got {actual} bytes")]
    ShareLengthMismatch {
        /// Expected length in bytes.
        expected: usize,
        /// Actual length in bytes.
        actual: usize,
    },

    /// A message that cannot be decoded or does not fit the receiver's state.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// The other end of a link has gone away.
    #[error("link {from} -> {to} is disconnected")]
    Disconnected {
        /// Sender side of the link.
        from: PartyId,
        /// Receiver side of the link.
        to: PartyId,
    },
}
