//! Sets, their Bloom-filter encoding, and utility functions for creating sets for the protocol.

use crate::errors::MpsiError;
use crate::hash_utils::Xof;
use crate::secret_sharing::SHARE_BYTE_COUNT;
use anyhow::{bail, Result};
use rand::{CryptoRng, Rng};
use std::collections::BTreeSet;

/// Element of a set. Always in `[0, domain_size)`.
pub type Element = u64;

/// Empirical number of Bloom bits per element.
pub const BITS_PER_ELEMENT: f64 = 14.3779296875;

/// Scale factor applied to the Bloom bit array.
pub const BIT_ARRAY_SCALE: usize = 40;

/// Upper bound of the Bloom bit array.
pub const MAX_BITS: usize = 100_000_000;

/// Parameters of the Bloom-filter encoding shared by every party.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BloomParameters<H: Xof> {
    bin_count: usize,
    hash_count: usize,
    hash: H,
}

impl<H: Xof> BloomParameters<H> {
    /// `min_bin_count` is rounded up to a multiple of 64. A count whose share length would not fit
    /// in `usize` is rejected.
    pub fn new(min_bin_count: usize, hash_count: usize, hash: H) -> Result<Self, MpsiError> {
        if min_bin_count == 0 {
            return Err(MpsiError::Configuration("bin count must be positive".into()));
        }

        if hash_count == 0 {
            return Err(MpsiError::Configuration("hash count must be positive".into()));
        }

        let bin_count = min_bin_count
            .checked_next_multiple_of(64)
            .filter(|n| n.checked_mul(SHARE_BYTE_COUNT).is_some())
            .ok_or_else(|| {
                MpsiError::Configuration(format!("bin count (={}) is too large", min_bin_count))
            })?;

        Ok(Self {
            bin_count,
            hash_count,
            hash,
        })
    }

    /// Number of bins (a multiple of 64).
    pub fn bin_count(&self) -> usize {
        self.bin_count
    }

    /// Number of hash indices per element.
    pub fn hash_count(&self) -> usize {
        self.hash_count
    }

    /// The hash function.
    pub fn hash(&self) -> &H {
        &self.hash
    }

    /// Byte length of a share for these parameters.
    pub fn share_len(&self) -> usize {
        self.bin_count * SHARE_BYTE_COUNT
    }
}

/// Size of the Bloom bit array for `n` elements, before alignment.
pub fn bit_array_size(n: usize) -> usize {
    let base = (n as f64 * BITS_PER_ELEMENT).ceil() as usize;
    (base * BIT_ARRAY_SCALE).min(MAX_BITS)
}

/// Bloom indices of `element`: one index in `[0, bin_count)` per hash index.
///
/// The `i`-th index is the first 8 bytes (little endian) of the expansion of
/// `element || i`, reduced modulo `bin_count`. Bloom filters and query patterns both use this.
pub fn bloom_filter_indices<H: Xof>(
    element: Element,
    bin_count: usize,
    hash_count: usize,
    hash: &H,
) -> Vec<usize> {
    let mut input = [0u8; 16];
    input[..8].copy_from_slice(&element.to_le_bytes());

    (0..hash_count)
        .map(|i| {
            input[8..].copy_from_slice(&(i as u64).to_le_bytes());
            let mut out = [0u8; 8];
            hash.expand_into(&input, &mut out);
            (u64::from_le_bytes(out) % bin_count as u64) as usize
        })
        .collect()
}

/// Set of unique elements with ascending iteration order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Set {
    elements: BTreeSet<Element>,
}

impl Set {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an element. Inserting an existing element is a no-op.
    pub fn insert(&mut self, element: Element) {
        self.elements.insert(element);
    }

    /// Whether `element` is in the set.
    pub fn contains(&self, element: &Element) -> bool {
        self.elements.contains(element)
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Elements in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = &Element> + '_ {
        self.elements.iter()
    }

    /// Elements in ascending order.
    pub fn to_vec(&self) -> Vec<Element> {
        self.elements.iter().copied().collect()
    }

    /// Exact intersection of `sets`. Empty input yields the empty set.
    pub fn intersection(sets: &[Set]) -> Set {
        let Some((first, rest)) = sets.split_first() else {
            return Set::new();
        };

        rest.iter().fold(first.clone(), |acc, set| {
            acc.elements
                .into_iter()
                .filter(|x| set.contains(x))
                .collect()
        })
    }

    /// Bloom bit vector of the set.
    ///
    /// The vector is at least `bin_count` long and its length is a multiple of the share chunk size.
    pub fn to_bloom_filter<H: Xof>(&self, params: &BloomParameters<H>) -> Vec<bool> {
        let size = bit_array_size(self.len())
            .max(params.bin_count())
            .next_multiple_of(SHARE_BYTE_COUNT);

        let mut bits = vec![false; size];
        for &element in self.elements.iter() {
            for i in bloom_filter_indices(
                element,
                params.bin_count(),
                params.hash_count(),
                params.hash(),
            ) {
                bits[i] = true;
            }
        }

        bits
    }

    /// Query pattern of the set: its elements in iteration order and, for each, its Bloom indices.
    pub fn query_pattern<H: Xof>(
        &self,
        params: &BloomParameters<H>,
    ) -> (Vec<Element>, Vec<Vec<usize>>) {
        let elements = self.to_vec();
        let pattern = elements
            .iter()
            .map(|&x| {
                bloom_filter_indices(x, params.bin_count(), params.hash_count(), params.hash())
            })
            .collect();

        (elements, pattern)
    }
}

impl FromIterator<Element> for Set {
    fn from_iter<I: IntoIterator<Item = Element>>(iter: I) -> Self {
        Self {
            elements: iter.into_iter().collect(),
        }
    }
}

impl<const N: usize> From<[Element; N]> for Set {
    fn from(elements: [Element; N]) -> Self {
        elements.into_iter().collect()
    }
}

fn check_params(
    nsets: usize,
    set_size: usize,
    common_size: usize,
    domain_size: usize,
) -> Result<()> {
    if nsets == 0 {
        bail!("nsets (={}) == 0 @{}:{}", nsets, file!(), line!());
    }

    if set_size < common_size {
        bail!(
            "set_size (={}) < common_size (={}) @{}:{}",
            set_size,
            common_size,
            file!(),
            line!()
        );
    }

    if (domain_size as u128) < set_size as u128 {
        return Err(MpsiError::Configuration(format!(
            "domain_size (={}) < set_size (={})",
            domain_size, set_size
        ))
        .into());
    }

    Ok(())
}

fn create_common<RNG: CryptoRng + Rng>(
    common_size: usize,
    domain_size: usize,
    rng: &mut RNG,
) -> BTreeSet<Element> {
    let mut common = BTreeSet::new();
    while common.len() < common_size {
        common.insert(rng.gen_range(0..domain_size as Element));
    }
    common
}

/// Create `nsets` sets of `set_size` elements in `[0, domain_size)` sharing `common_size` elements,
/// with a check that the intersection of the sets is exactly the common subset.
///
/// Elements outside the common subset are never shared between two sets, so the domain must hold
/// `common_size + nsets * (set_size - common_size)` elements.
pub fn create_sets_with_check<RNG: CryptoRng + Rng>(
    nsets: usize,
    set_size: usize,
    common_size: usize,
    domain_size: usize,
    rng: &mut RNG,
) -> Result<(Set, Vec<Set>)> {
    check_params(nsets, set_size, common_size, domain_size)?;

    let required = common_size as u128 + nsets as u128 * (set_size - common_size) as u128;
    if (domain_size as u128) < required {
        return Err(MpsiError::Configuration(format!(
            "domain_size (={}) cannot hold {} disjoint extensions of {} elements",
            domain_size,
            nsets,
            set_size - common_size
        ))
        .into());
    }

    let common = create_common(common_size, domain_size, rng);
    let mut used = common.clone();

    let sets = (0..nsets)
        .map(|_| {
            let mut set = common.clone();
            while set.len() < set_size {
                let x = rng.gen_range(0..domain_size as Element);
                if used.insert(x) {
                    set.insert(x);
                }
            }
            Set { elements: set }
        })
        .collect::<Vec<_>>();

    let common = Set { elements: common };
    debug_assert_eq!(Set::intersection(&sets), common);

    Ok((common, sets))
}

/// Create sets for the protocol without checks.
/// Elements outside the common subset are drawn independently, so the actual intersection can be
/// larger than the returned common subset.
pub fn create_sets_without_check<RNG: CryptoRng + Rng>(
    nsets: usize,
    set_size: usize,
    common_size: usize,
    domain_size: usize,
    rng: &mut RNG,
) -> Result<(Set, Vec<Set>)> {
    check_params(nsets, set_size, common_size, domain_size)?;

    let common = create_common(common_size, domain_size, rng);

    let sets = (0..nsets)
        .map(|_| {
            let mut set = common.clone();
            while set.len() < set_size {
                set.insert(rng.gen_range(0..domain_size as Element));
            }
            Set { elements: set }
        })
        .collect::<Vec<_>>();

    Ok((Set { elements: common }, sets))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash_utils::HashFunction;
    use scuttlebutt::AesRng;

    fn params() -> BloomParameters<HashFunction> {
        BloomParameters::new(512, 4, HashFunction::Blake3Xof).unwrap()
    }

    #[test]
    fn test_insert_dedup() {
        let mut set = Set::new();
        set.insert(3);
        set.insert(1);
        set.insert(3);
        assert_eq!(set.len(), 2);
        assert_eq!(set.to_vec(), vec![1, 3]);
    }

    #[test]
    fn test_intersection() {
        let a = Set::from([1, 2, 3, 4]);
        let b = Set::from([2, 3, 4, 5]);
        let c = Set::from([0, 3, 4, 9]);

        assert_eq!(Set::intersection(&[a.clone(), b, c]), Set::from([3, 4]));
        assert_eq!(Set::intersection(&[a.clone()]), a);
        assert_eq!(Set::intersection(&[]), Set::new());
        assert_eq!(Set::intersection(&[a, Set::new()]), Set::new());
    }

    #[test]
    fn test_params_rounding() {
        let p = BloomParameters::new(500, 4, HashFunction::Sha512).unwrap();
        assert_eq!(p.bin_count(), 512);
        assert_eq!(p.share_len(), 512 * SHARE_BYTE_COUNT);

        let p = BloomParameters::new(64, 1, HashFunction::Sha512).unwrap();
        assert_eq!(p.bin_count(), 64);

        assert!(BloomParameters::new(0, 4, HashFunction::Sha512).is_err());
        assert!(BloomParameters::new(64, 0, HashFunction::Sha512).is_err());

        // rounding or the share length would overflow
        for huge in [usize::MAX, usize::MAX / SHARE_BYTE_COUNT + 1] {
            assert!(matches!(
                BloomParameters::new(huge, 4, HashFunction::Sha512),
                Err(MpsiError::Configuration(_))
            ));
        }
        let largest = usize::MAX / SHARE_BYTE_COUNT / 64 * 64;
        let p = BloomParameters::new(largest, 4, HashFunction::Sha512).unwrap();
        assert_eq!(p.share_len(), largest * SHARE_BYTE_COUNT);
    }

    #[test]
    fn test_bit_array_size() {
        assert_eq!(bit_array_size(0), 0);
        assert_eq!(bit_array_size(20), 288 * 40);
        assert_eq!(bit_array_size(1 << 30), MAX_BITS);
    }

    #[test]
    fn test_indices_in_range_and_deterministic() {
        let h = HashFunction::Blake3Xof;
        for x in 0..100 {
            let a = bloom_filter_indices(x, 512, 4, &h);
            let b = bloom_filter_indices(x, 512, 4, &h);
            assert_eq!(a.len(), 4);
            assert_eq!(a, b);
            assert!(a.iter().all(|&i| i < 512));
        }
    }

    #[test]
    fn test_bloom_round_trip() {
        let mut rng = AesRng::new();
        let params = params();
        let set = (0..50).map(|_| rng.gen_range(0..1000)).collect::<Set>();

        let bloom = set.to_bloom_filter(&params);
        assert!(bloom.len() >= params.bin_count());
        assert_eq!(bloom.len() % SHARE_BYTE_COUNT, 0);

        for &x in set.iter() {
            for i in bloom_filter_indices(x, params.bin_count(), params.hash_count(), params.hash())
            {
                assert!(bloom[i]);
            }
        }

        // nothing is set outside the bins
        assert!(bloom[params.bin_count()..].iter().all(|b| !b));
    }

    #[test]
    fn test_bloom_empty_set() {
        let params = params();
        let bloom = Set::new().to_bloom_filter(&params);
        assert_eq!(bloom.len(), params.bin_count().next_multiple_of(SHARE_BYTE_COUNT));
        assert!(bloom.iter().all(|b| !b));
    }

    #[test]
    fn test_query_pattern_matches_bloom() {
        let params = params();
        let set = Set::from([5, 17, 400, 999]);
        let (elements, pattern) = set.query_pattern(&params);
        let bloom = set.to_bloom_filter(&params);

        assert_eq!(elements, set.to_vec());
        assert_eq!(pattern.len(), elements.len());
        for (x, indices) in elements.iter().zip(pattern.iter()) {
            assert_eq!(
                indices,
                &bloom_filter_indices(*x, params.bin_count(), params.hash_count(), params.hash())
            );
            assert!(indices.iter().all(|&i| bloom[i]));
        }
    }

    #[test]
    fn test_small_with_check() {
        let mut rng = AesRng::new();

        let (common, sets) = create_sets_with_check(3, 20, 10, 1000, &mut rng).unwrap();

        dbg!(common.clone());

        assert_eq!(common.len(), 10);
        assert_eq!(sets.len(), 3);
        for set in sets.iter() {
            assert_eq!(set.len(), 20);
            assert!(set.iter().all(|&x| x < 1000));
        }
        assert_eq!(Set::intersection(&sets), common);
    }

    #[test]
    fn test_with_check_domain_too_small() {
        let mut rng = AesRng::new();
        let e = create_sets_with_check(3, 20, 10, 35, &mut rng).unwrap_err();
        assert!(matches!(
            e.downcast_ref::<MpsiError>(),
            Some(MpsiError::Configuration(_))
        ));
    }

    #[test]
    fn test_without_check() {
        let mut rng = AesRng::new();

        let (common, sets) = create_sets_without_check(5, 30, 8, 100, &mut rng).unwrap();

        let intersection = Set::intersection(&sets);
        for x in common.iter() {
            assert!(intersection.contains(x));
        }
    }

    #[test]
    fn test_invalid_params() {
        let mut rng = AesRng::new();
        assert!(create_sets_without_check(3, 5, 10, 100, &mut rng).is_err());
        assert!(create_sets_without_check(3, 20, 10, 10, &mut rng).is_err());
        assert!(create_sets_without_check(0, 20, 10, 100, &mut rng).is_err());
    }
}
