//! Hash functions and extendable-output functions (XOFs) used by the protocol.
//!
//! Every function is exposed through the [Xof] trait, so that a fixed-output digest and a real
//! XOF are interchangeable: both deterministically produce any requested number of bytes from a
//! seed. Fixed-output digests are extended in counter mode, i.e. output block $`k`$ is
//! $`H(\mathsf{seed} \| k)`$ with $`k`$ encoded as a little-endian `u64`.
//!
//! [HashFunction::from_name] is the name-keyed registry. The command line parses `--hash-function`
//! through it, so an unknown name is rejected before any party starts.

use crate::errors::MpsiError;
use std::fmt::Display;

/// Capability to expand a seed into an arbitrary number of pseudorandom bytes.
pub trait Xof: Send + Sync {
    /// Fill `out` with the expansion of `seed`.
    fn expand_into(&self, seed: &[u8], out: &mut [u8]);

    /// Expand `seed` into `len` bytes.
    fn expand(&self, seed: &[u8], len: usize) -> Vec<u8> {
        let mut out = vec![0u8; len];
        self.expand_into(seed, &mut out);
        out
    }
}

/// Hash functions known to the registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HashFunction {
    /// SHA-512 in counter mode.
    Sha512,
    /// SHA3-512 in counter mode.
    Sha3_512,
    /// BLAKE2b-512 in counter mode.
    Blake2b512,
    /// SHAKE128.
    Shake128Xof,
    /// SHAKE256.
    Shake256Xof,
    /// BLAKE3 in XOF mode.
    Blake3Xof,
}

impl HashFunction {
    /// Every registered hash function.
    pub const ALL: [HashFunction; 6] = [
        HashFunction::Sha512,
        HashFunction::Sha3_512,
        HashFunction::Blake2b512,
        HashFunction::Shake128Xof,
        HashFunction::Shake256Xof,
        HashFunction::Blake3Xof,
    ];

    /// Registry name of the function.
    pub fn name(&self) -> &'static str {
        match self {
            HashFunction::Sha512 => "sha512",
            HashFunction::Sha3_512 => "sha3_512",
            HashFunction::Blake2b512 => "blake2b_512",
            HashFunction::Shake128Xof => "shake128_xof",
            HashFunction::Shake256Xof => "shake256_xof",
            HashFunction::Blake3Xof => "blake3_xof",
        }
    }

    /// Look a hash function up by its registry name.
    pub fn from_name(name: &str) -> Result<Self, MpsiError> {
        Self::ALL
            .into_iter()
            .find(|h| h.name() == name)
            .ok_or_else(|| MpsiError::UnknownHashFunction(name.to_string()))
    }
}

impl Display for HashFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl Xof for HashFunction {
    fn expand_into(&self, seed: &[u8], out: &mut [u8]) {
        match self {
            HashFunction::Sha512 => counter_mode::<sha2::Sha512>(seed, out),
            HashFunction::Sha3_512 => counter_mode::<sha3::Sha3_512>(seed, out),
            HashFunction::Blake2b512 => counter_mode::<blake2::Blake2b512>(seed, out),
            HashFunction::Shake128Xof => shake::<sha3::Shake128>(seed, out),
            HashFunction::Shake256Xof => shake::<sha3::Shake256>(seed, out),
            HashFunction::Blake3Xof => {
                let mut hasher = blake3::Hasher::new();
                hasher.update(seed);
                hasher.finalize_xof().fill(out);
            }
        }
    }
}

fn counter_mode<D: sha2::Digest>(seed: &[u8], out: &mut [u8]) {
    let block_len = <D as sha2::Digest>::output_size();
    for (k, block) in out.chunks_mut(block_len).enumerate() {
        let mut hasher = D::new();
        sha2::Digest::update(&mut hasher, seed);
        sha2::Digest::update(&mut hasher, (k as u64).to_le_bytes());
        let digest = hasher.finalize();
        block.copy_from_slice(&digest[..block.len()]);
    }
}

fn shake<X>(seed: &[u8], out: &mut [u8])
where
    X: Default + sha3::digest::Update + sha3::digest::ExtendableOutput,
{
    use sha3::digest::XofReader;

    let mut hasher = X::default();
    sha3::digest::Update::update(&mut hasher, seed);
    let mut reader = hasher.finalize_xof();
    reader.read(out);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry() {
        for h in HashFunction::ALL {
            assert_eq!(HashFunction::from_name(h.name()).unwrap(), h);
            assert_eq!(h.to_string(), h.name());
        }

        let e = HashFunction::from_name("md5").unwrap_err();
        assert_eq!(e, MpsiError::UnknownHashFunction("md5".to_string()));
    }

    #[test]
    fn test_expand_deterministic() {
        let seed = [7u8; 16];
        for h in HashFunction::ALL {
            let a = h.expand(&seed, 200);
            let b = h.expand(&seed, 200);
            assert_eq!(a.len(), 200);
            assert_eq!(a, b);
            assert_ne!(a, vec![0u8; 200]);
        }
    }

    #[test]
    fn test_expand_prefix_consistent() {
        // longer outputs extend shorter ones
        let seed = b"prefix";
        for h in HashFunction::ALL {
            let short = h.expand(seed, 8);
            let long = h.expand(seed, 1000);
            assert_eq!(short[..], long[..8], "{}", h);
        }
    }

    #[test]
    fn test_expand_seed_sensitive() {
        for h in HashFunction::ALL {
            let a = h.expand(&[1u8; 16], 64);
            let b = h.expand(&[2u8; 16], 64);
            assert_ne!(a, b, "{}", h);
        }
    }

    #[test]
    fn test_blake3_matches_reference() {
        let seed = [3u8; 16];
        let mut expected = [0u8; 100];
        blake3::Hasher::new()
            .update(&seed)
            .finalize_xof()
            .fill(&mut expected);

        assert_eq!(HashFunction::Blake3Xof.expand(&seed, 100), expected.to_vec());
    }
}
