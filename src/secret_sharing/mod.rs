//! XOR secret sharing over fixed-width byte buffers.
//!
//! A [Share] is `bin_count` chunks of [SHARE_BYTE_COUNT] bytes. Shares of the same width form a
//! group under XOR, which is all the protocol needs: [corrupt] marks bins with fresh randomness
//! and [aggregate] folds the shares of all contributors.

use crate::errors::MpsiError;
use rand::RngCore;
use rayon::prelude::*;
use scuttlebutt::AesRng;
use std::ops::{BitXor, BitXorAssign};

pub mod zero_sharing;

/// Width of one bin (chunk) of a share in bytes.
pub const SHARE_BYTE_COUNT: usize = 40;

/// Bins handled by one corruption task.
const BINS_PER_TASK: usize = 1 << 12;

/// XOR-additive byte buffer.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Share(Vec<u8>);

impl Share {
    /// All-zero share of `len` bytes.
    pub fn zeroed(len: usize) -> Self {
        Self(vec![0u8; len])
    }

    /// Wrap raw bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Raw bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the share has no bytes.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of whole chunks of `chunk_size` bytes.
    pub fn chunk_count(&self, chunk_size: usize) -> usize {
        self.0.len() / chunk_size
    }

    /// `i`-th chunk of `chunk_size` bytes, if it exists.
    pub fn chunk(&self, i: usize, chunk_size: usize) -> Option<&[u8]> {
        let start = i.checked_mul(chunk_size)?;
        self.0.get(start..start.checked_add(chunk_size)?)
    }

    /// Whether every byte is zero.
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }
}

impl BitXorAssign<&Share> for Share {
    fn bitxor_assign(&mut self, rhs: &Share) {
        assert_eq!(self.len(), rhs.len(), "XOR of shares of different widths");
        self.0
            .iter_mut()
            .zip(rhs.0.iter())
            .for_each(|(a, b)| *a ^= b);
    }
}

impl BitXorAssign for Share {
    fn bitxor_assign(&mut self, rhs: Share) {
        *self ^= &rhs;
    }
}

impl BitXor for Share {
    type Output = Share;

    fn bitxor(mut self, rhs: Share) -> Share {
        self ^= &rhs;
        self
    }
}

impl BitXor<&Share> for &Share {
    type Output = Share;

    fn bitxor(self, rhs: &Share) -> Share {
        let mut res = self.clone();
        res ^= rhs;
        res
    }
}

/// Replace every chunk `i` of `share` whose Bloom bit `bloom_bits[i]` is set with fresh random bytes.
///
/// Chunks whose bit is unset, and bits past the last chunk, are left alone. Work is split into
/// ranges of bins, each with its own RNG forked from `rng`.
pub fn corrupt(share: &mut Share, bloom_bits: &[bool], chunk_size: usize, rng: &mut AesRng) {
    let range_len = BINS_PER_TASK * chunk_size;
    let rngs = (0..share.len().div_ceil(range_len))
        .map(|_| rng.fork())
        .collect::<Vec<_>>();

    share
        .0
        .par_chunks_mut(range_len)
        .zip(rngs.into_par_iter())
        .enumerate()
        .for_each(|(r, (range, mut rng))| {
            let first_bin = r * BINS_PER_TASK;
            for (k, chunk) in range.chunks_exact_mut(chunk_size).enumerate() {
                if bloom_bits.get(first_bin + k).copied().unwrap_or(false) {
                    rng.fill_bytes(chunk);
                }
            }
        });
}

/// XOR-fold `shares`, each of which must be `len` bytes. No shares yield the zero share.
pub fn aggregate<I>(shares: I, len: usize) -> Result<Share, MpsiError>
where
    I: IntoIterator<Item = Share>,
{
    shares.into_iter().try_fold(Share::zeroed(len), |mut acc, s| {
        if s.len() != len {
            return Err(MpsiError::ShareLengthMismatch {
                expected: len,
                actual: s.len(),
            });
        }
        acc ^= &s;
        Ok(acc)
    })
}
