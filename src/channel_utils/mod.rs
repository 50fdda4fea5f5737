//! Point-to-point message transport between the parties of one repetition.
//!
//! Every transport implements [Transport]: a full mesh of ordered, reliable links addressed by
//! `(from, to)`. Messages are opaque byte vectors; the provided methods of [Transport] encode the
//! three payload kinds the protocol exchanges (raw shares, index lists and bit vectors).
//!
//! - [mailbox::Mailbox]: in-memory queues guarded by a mutex and a condition variable.
//! - [sync_channel_by_cb::CrossbeamMesh]: one crossbeam channel per directed pair.
//! - [sync_channel::UnixMesh]: one unix domain socket per directed pair.
//! - [overhead::Simulated]: latency/bandwidth simulation and traffic counters around any of them.

use crate::errors::MpsiError;
use crate::secret_sharing::Share;
use crate::PartyId;
use anyhow::{Context, Result};
use scuttlebutt::utils::{pack_bits, unpack_bits};

pub mod mailbox;
pub mod overhead;
pub mod sync_channel;
pub mod sync_channel_by_cb;

const WORD: usize = std::mem::size_of::<u64>();

/// A full mesh of ordered links between `party_count()` parties.
///
/// Messages on one `(from, to)` link are delivered in the order they were sent. [Transport::receive]
/// blocks until a message is available.
pub trait Transport: Send + Sync {
    /// Number of addressable parties.
    fn party_count(&self) -> usize;

    /// Enqueue `bytes` on the link `from -> to`.
    fn send(&self, from: PartyId, to: PartyId, bytes: Vec<u8>) -> Result<()>;

    /// Dequeue the oldest message on the link `from -> to`, waiting for one if necessary.
    fn receive(&self, from: PartyId, to: PartyId) -> Result<Vec<u8>>;

    /// Send a share as raw bytes.
    fn send_share(&self, from: PartyId, to: PartyId, share: &Share) -> Result<()> {
        self.send(from, to, share.as_bytes().to_vec())
    }

    /// Receive a share as raw bytes.
    fn receive_share(&self, from: PartyId, to: PartyId) -> Result<Share> {
        self.receive(from, to).map(Share::from_bytes)
    }

    /// Send a list of index lists. See [encode_index_lists].
    fn send_index_lists(&self, from: PartyId, to: PartyId, lists: &[Vec<usize>]) -> Result<()> {
        self.send(from, to, encode_index_lists(lists))
    }

    /// Receive a list of index lists. See [decode_index_lists].
    fn receive_index_lists(&self, from: PartyId, to: PartyId) -> Result<Vec<Vec<usize>>> {
        let bytes = self
            .receive(from, to)
            .with_context(|| format!("@{}:{}", file!(), line!()))?;
        Ok(decode_index_lists(&bytes)?)
    }

    /// Send a bit vector. See [encode_bits].
    fn send_bits(&self, from: PartyId, to: PartyId, bits: &[bool]) -> Result<()> {
        self.send(from, to, encode_bits(bits))
    }

    /// Receive a bit vector of `8 * bytes` bits. See [decode_bits].
    fn receive_bits(&self, from: PartyId, to: PartyId) -> Result<Vec<bool>> {
        self.receive(from, to).map(|bytes| decode_bits(&bytes))
    }
}

impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    fn party_count(&self) -> usize {
        (**self).party_count()
    }

    fn send(&self, from: PartyId, to: PartyId, bytes: Vec<u8>) -> Result<()> {
        (**self).send(from, to, bytes)
    }

    fn receive(&self, from: PartyId, to: PartyId) -> Result<Vec<u8>> {
        (**self).receive(from, to)
    }
}

/// Fail with [MpsiError::OutOfRange] unless both ids address one of `party_count` parties.
pub fn check_ids(from: PartyId, to: PartyId, party_count: usize) -> Result<(), MpsiError> {
    for id in [from, to] {
        if id >= party_count {
            return Err(MpsiError::OutOfRange { id, party_count });
        }
    }
    Ok(())
}

/// `[outer]`, then per list `[inner]` followed by `inner` values. Every field is a native-endian `u64`.
pub fn encode_index_lists(lists: &[Vec<usize>]) -> Vec<u8> {
    let words = 1 + lists.iter().map(|l| 1 + l.len()).sum::<usize>();
    let mut bytes = Vec::with_capacity(words * WORD);

    bytes.extend_from_slice(&(lists.len() as u64).to_ne_bytes());
    for list in lists {
        bytes.extend_from_slice(&(list.len() as u64).to_ne_bytes());
        for &v in list {
            bytes.extend_from_slice(&(v as u64).to_ne_bytes());
        }
    }

    bytes
}

/// Inverse of [encode_index_lists]. Truncated or oversized input is a [MpsiError::MalformedPayload].
pub fn decode_index_lists(bytes: &[u8]) -> Result<Vec<Vec<usize>>, MpsiError> {
    let mut words = bytes.chunks(WORD);
    let mut next = |what: &str| -> Result<usize, MpsiError> {
        let word = words
            .next()
            .filter(|w| w.len() == WORD)
            .ok_or_else(|| MpsiError::MalformedPayload(format!("index lists: missing {}", what)))?;
        let mut buf = [0u8; WORD];
        buf.copy_from_slice(word);
        usize::try_from(u64::from_ne_bytes(buf))
            .map_err(|_| MpsiError::MalformedPayload(format!("index lists: {} overflows", what)))
    };

    let outer = next("outer length")?;
    // every list needs at least its length word
    if outer > bytes.len() / WORD {
        return Err(MpsiError::MalformedPayload(format!(
            "index lists: {} lists cannot fit in {} bytes",
            outer,
            bytes.len()
        )));
    }

    let mut lists = Vec::with_capacity(outer);
    for _ in 0..outer {
        let inner = next("inner length")?;
        let list = (0..inner)
            .map(|_| next("index"))
            .collect::<Result<Vec<_>, _>>()?;
        lists.push(list);
    }

    if words.next().is_some() {
        return Err(MpsiError::MalformedPayload(
            "index lists: trailing bytes".to_string(),
        ));
    }

    Ok(lists)
}

/// Pack bits LSB first: bit `i` is bit `i % 8` of byte `i / 8`. The last byte is zero padded.
pub fn encode_bits(bits: &[bool]) -> Vec<u8> {
    pack_bits(bits)
}

/// Inverse of [encode_bits]. The original bit count is not transmitted, so `8 * bytes.len()` bits
/// are returned.
pub fn decode_bits(bytes: &[u8]) -> Vec<bool> {
    unpack_bits(bytes, bytes.len() * 8)
}
