//! Approximate multi-party PSI from Bloom filters and correlated zero-sharing.
//!
//! Parties are identified by [PartyId]s in `0..party_count`:
//!
//! - the [Server](Role::Server) (id 0) holds no input. It aggregates the shares of everyone else
//!   and answers the Querier's membership queries;
//! - the [Querier](Role::Querier) (id 1) contributes a share like a Client, then learns the output;
//! - every [Client](Role::Client) (id >= 2) only contributes a share.
//!
//! Each input party derives a zero-share from its pairwise seeds and re-randomizes every bin
//! that its own Bloom filter does *not* cover. After aggregation, a bin is all-zero iff every
//! input party set it, so an element of the Querier is reported iff all of its bins are zero.
//! False positives and negatives are those of the Bloom filters.

use crate::channel_utils::Transport;
use crate::errors::MpsiError;
use crate::hash_utils::Xof;
use crate::secret_sharing::zero_sharing::derive_zero_share;
use crate::secret_sharing::{aggregate, corrupt, Share, SHARE_BYTE_COUNT};
use crate::set_utils::{BloomParameters, Element, Set};
use anyhow::{Context, Result};
use rayon::prelude::*;
use scuttlebutt::AesRng;
use std::time::{Duration, Instant};
use tracing::debug;

mod bin;
pub use bin::{run, ApproxMpsi, Outcome, RepetitionResult};

/// usize is used as a party ID. Server's ID is always 0 and Querier's ID is always 1.
pub type PartyId = usize;

/// ID of the Server.
pub const SERVER: PartyId = 0;
/// ID of the Querier.
pub const QUERIER: PartyId = 1;

/// Role played by a party, fixed by its ID.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    /// Aggregates shares and evaluates queries.
    Server,
    /// Contributes a share and learns the output.
    Querier,
    /// Contributes a share.
    Client,
}

impl Role {
    /// Role of party `id`.
    pub fn of(id: PartyId) -> Self {
        match id {
            SERVER => Role::Server,
            QUERIER => Role::Querier,
            _ => Role::Client,
        }
    }
}

/// Time one party spent in each costly operation of a run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OpTimings {
    /// Building the Bloom filter.
    pub bloom_filter: Duration,
    /// Deriving the zero-share and corrupting it.
    pub xof: Duration,
    /// Aggregating the shares and evaluating the queries.
    pub xor: Duration,
}

/// One participant of a repetition.
#[derive(Clone, Debug)]
pub struct Party<H: Xof> {
    id: PartyId,
    party_count: usize,
    params: BloomParameters<H>,
    seeds: Vec<Vec<u8>>,
}

impl<H: Xof> Party<H> {
    /// `seeds` is the party's row of the seed matrix. It is empty for the Server.
    pub fn new(
        id: PartyId,
        party_count: usize,
        params: BloomParameters<H>,
        seeds: Vec<Vec<u8>>,
    ) -> Result<Self, MpsiError> {
        if id >= party_count {
            return Err(MpsiError::OutOfRange { id, party_count });
        }

        Ok(Self {
            id,
            party_count,
            params,
            seeds,
        })
    }

    /// Get the party ID.
    pub fn id(&self) -> PartyId {
        self.id
    }

    /// Get the role of the party.
    pub fn role(&self) -> Role {
        Role::of(self.id)
    }

    /// Run the role of this party to completion.
    ///
    /// Input parties need `input`; the Server ignores it. Only the Querier returns `Some`.
    pub fn run<T: Transport>(
        &self,
        input: Option<&Set>,
        transport: &T,
        rng: &mut AesRng,
    ) -> Result<Option<Set>> {
        self.run_timed(input, transport, rng)
            .map(|(output, _)| output)
    }

    /// [Party::run], also reporting the time spent per operation.
    pub fn run_timed<T: Transport>(
        &self,
        input: Option<&Set>,
        transport: &T,
        rng: &mut AesRng,
    ) -> Result<(Option<Set>, OpTimings)> {
        if transport.party_count() != self.party_count {
            return Err(MpsiError::Configuration(format!(
                "transport has {} parties, party {} expects {}",
                transport.party_count(),
                self.id,
                self.party_count
            ))
            .into());
        }

        match (self.role(), input) {
            (Role::Server, _) => self.run_server(transport).map(|t| (None, t)),
            (Role::Querier, Some(input)) => self
                .run_querier(input, transport, rng)
                .map(|(output, t)| (Some(output), t)),
            (Role::Client, Some(input)) => self.run_client(input, transport, rng).map(|t| (None, t)),
            (role, None) => Err(MpsiError::Configuration(format!(
                "party {} ({:?}) has no input set",
                self.id, role
            ))
            .into()),
        }
    }

    /// Corrupted zero-share of `input`: every bin the Bloom filter of `input` leaves unset is
    /// re-randomized.
    pub fn client_share(&self, input: &Set, rng: &mut AesRng) -> Share {
        self.timed_client_share(input, rng).0
    }

    fn timed_client_share(&self, input: &Set, rng: &mut AesRng) -> (Share, OpTimings) {
        let ((bloom, bloom_time), (zero_share, xof_time)) = rayon::join(
            || {
                let start = Instant::now();
                (input.to_bloom_filter(&self.params), start.elapsed())
            },
            || {
                let start = Instant::now();
                let share = derive_zero_share(&self.seeds, self.params.share_len(), self.params.hash());
                (share, start.elapsed())
            },
        );

        let start = Instant::now();
        let mask = bloom.iter().map(|b| !b).collect::<Vec<_>>();
        let mut share = zero_share;
        corrupt(&mut share, &mask, SHARE_BYTE_COUNT, rng);

        let timings = OpTimings {
            bloom_filter: bloom_time,
            xof: xof_time + start.elapsed(),
            ..Default::default()
        };
        (share, timings)
    }

    fn run_client<T: Transport>(
        &self,
        input: &Set,
        transport: &T,
        rng: &mut AesRng,
    ) -> Result<OpTimings> {
        let (share, timings) = self.timed_client_share(input, rng);

        transport
            .send_share(self.id, SERVER, &share)
            .with_context(|| format!("@{}:{}", file!(), line!()))?;

        debug!(party = self.id, bytes = share.len(), "share sent");

        Ok(timings)
    }

    fn run_querier<T: Transport>(
        &self,
        input: &Set,
        transport: &T,
        rng: &mut AesRng,
    ) -> Result<(Set, OpTimings)> {
        let timings = self
            .run_client(input, transport, rng)
            .with_context(|| format!("@{}:{}", file!(), line!()))?;

        let (elements, pattern) = input.query_pattern(&self.params);
        transport
            .send_index_lists(self.id, SERVER, &pattern)
            .with_context(|| format!("@{}:{}", file!(), line!()))?;

        debug!(party = self.id, queries = pattern.len(), "query pattern sent");

        let results = transport
            .receive_bits(SERVER, self.id)
            .with_context(|| format!("@{}:{}", file!(), line!()))?;

        let output = extract_intersection(&elements, &results)?;

        debug!(party = self.id, output = output.len(), "intersection extracted");

        Ok((output, timings))
    }

    fn run_server<T: Transport>(&self, transport: &T) -> Result<OpTimings> {
        let mut shares = Vec::with_capacity(self.party_count - 1);
        for i in 1..self.party_count {
            let share = transport
                .receive_share(i, self.id)
                .with_context(|| format!("@{}:{}", file!(), line!()))?;

            if share.is_empty() {
                debug!(party = self.id, from = i, "empty share skipped");
                continue;
            }
            shares.push(share);
        }

        debug!(party = self.id, shares = shares.len(), "shares received");

        let start = Instant::now();
        let aggregated = aggregate(shares, self.params.share_len())?;
        let mut xor = start.elapsed();

        let pattern = transport
            .receive_index_lists(QUERIER, self.id)
            .with_context(|| format!("@{}:{}", file!(), line!()))?;

        let start = Instant::now();
        let results = compute_query_results(&pattern, &aggregated, SHARE_BYTE_COUNT)?;
        xor += start.elapsed();

        transport
            .send_bits(self.id, QUERIER, &results)
            .with_context(|| format!("@{}:{}", file!(), line!()))?;

        debug!(party = self.id, queries = results.len(), "query results sent");

        Ok(OpTimings {
            xor,
            ..Default::default()
        })
    }
}

/// For every index list, XOR the chunks of `aggregated` at those indices and test for all-zero.
///
/// An index outside `aggregated` is a [MpsiError::MalformedPayload].
pub fn compute_query_results(
    pattern: &[Vec<usize>],
    aggregated: &Share,
    chunk_size: usize,
) -> Result<Vec<bool>, MpsiError> {
    pattern
        .par_iter()
        .map(|indices| {
            let mut acc = vec![0u8; chunk_size];
            for &i in indices {
                let chunk = aggregated.chunk(i, chunk_size).ok_or_else(|| {
                    MpsiError::MalformedPayload(format!(
                        "query index {} is out of {} bins",
                        i,
                        aggregated.chunk_count(chunk_size)
                    ))
                })?;
                acc.iter_mut().zip(chunk).for_each(|(a, b)| *a ^= b);
            }
            Ok(acc.iter().all(|&b| b == 0))
        })
        .collect()
}

/// Elements whose result bit is set. `results` may be longer than `elements` (padding).
pub fn extract_intersection(elements: &[Element], results: &[bool]) -> Result<Set, MpsiError> {
    if results.len() < elements.len() {
        return Err(MpsiError::MalformedPayload(format!(
            "{} query results for {} elements",
            results.len(),
            elements.len()
        )));
    }

    Ok(elements
        .iter()
        .zip(results)
        .filter(|(_, hit)| **hit)
        .map(|(&x, _)| x)
        .collect())
}
