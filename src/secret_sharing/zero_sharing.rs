//! Correlated zero-sharing from pairwise seeds.
//!
//! Every pair of input parties $`(P_i, P_j)`$ shares one seed $`s_{ij}`$. Party $`P_i`$'s
//! zero-share is
//!
//! ```math
//! Z_i = \bigoplus_{j \neq i} \mathsf{XOF}(s_{ij})
//! ```
//!
//! Each seed appears in exactly two rows, so $`\bigoplus_i Z_i = 0`$, while the XOR of any strict
//! subset of shares looks random. The Server (party 0) holds no seeds.

use crate::errors::MpsiError;
use crate::hash_utils::Xof;
use crate::secret_sharing::Share;
use crate::PartyId;
use rand::{CryptoRng, Rng};
use rayon::prelude::*;

/// Length in bytes of a pairwise seed.
pub const SEED_BYTE_COUNT: usize = 16;

/// Pairwise seeds for every party of a run, produced by a trusted setup.
#[derive(Clone, Debug)]
pub struct SeedMatrix {
    rows: Vec<Vec<Vec<u8>>>,
}

impl SeedMatrix {
    /// Draw one `seed_len`-byte seed for every unordered pair of input parties `1..nparties`.
    ///
    /// Row 0 (the Server) is empty and every other row holds `nparties - 2` seeds, ordered by the
    /// id of the other party.
    pub fn generate<RNG: CryptoRng + Rng>(nparties: usize, seed_len: usize, rng: &mut RNG) -> Self {
        let mut rows = vec![Vec::new(); nparties];

        for i in 1..nparties {
            for j in (i + 1)..nparties {
                let mut seed = vec![0u8; seed_len];
                rng.fill_bytes(&mut seed);
                rows[i].push(seed.clone());
                rows[j].push(seed);
            }
        }

        Self { rows }
    }

    /// Number of parties, Server included.
    pub fn party_count(&self) -> usize {
        self.rows.len()
    }

    /// Seeds of party `id`.
    pub fn row(&self, id: PartyId) -> Result<&[Vec<u8>], MpsiError> {
        self.rows
            .get(id)
            .map(Vec::as_slice)
            .ok_or(MpsiError::OutOfRange {
                id,
                party_count: self.rows.len(),
            })
    }

    /// Split the matrix into per-party rows.
    pub fn into_rows(self) -> Vec<Vec<Vec<u8>>> {
        self.rows
    }
}

/// Expand every seed of `seed_row` into `output_len` bytes and XOR everything together.
pub fn derive_zero_share<H: Xof>(seed_row: &[Vec<u8>], output_len: usize, hash: &H) -> Share {
    seed_row
        .par_iter()
        .map(|seed| Share::from_bytes(hash.expand(seed, output_len)))
        .reduce(|| Share::zeroed(output_len), |a, b| a ^ b)
}
