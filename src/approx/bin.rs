//! Orchestration of approximate MPSI experiments: inputs, trusted setup, one thread per party.

use crate::approx::{OpTimings, Party, PartyId, QUERIER};
use crate::channel_utils::overhead::{NetworkOverhead, Simulated, Traffic};
use crate::channel_utils::Transport;
use crate::cli_utils::{create_transport, Args, ChannelType};
use crate::errors::MpsiError;
use crate::hash_utils::Xof;
use crate::secret_sharing::zero_sharing::{SeedMatrix, SEED_BYTE_COUNT};
use crate::set_utils::{create_sets_with_check, create_sets_without_check, BloomParameters, Set};
use crate::stats::Stats;
use anyhow::{anyhow, Context, Result};
use rand::{CryptoRng, Rng};
use scuttlebutt::AesRng;
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Result of one repetition.
#[derive(Clone, Debug)]
pub struct Outcome {
    /// 1-based repetition number.
    pub repetition: usize,
    /// Whether the Querier's output is the exact intersection of the inputs.
    pub success: bool,
    /// Exact intersection of the inputs.
    pub expected: Set,
    /// Output of the Querier.
    pub actual: Option<Set>,
    /// Wall-clock time from the first party start to the last party completion.
    pub elapsed: Duration,
    /// Time each party spent, indexed by party ID.
    pub party_durations: Vec<Duration>,
    /// Traffic each party sent, indexed by party ID.
    pub traffic: Vec<Traffic>,
    /// Time each party spent per operation, indexed by party ID.
    pub op_timings: Vec<OpTimings>,
}

/// What a repetition returns: outputs, whole-party durations and per-operation timings, all
/// indexed by party ID.
pub type RepetitionResult = (Vec<Option<Set>>, Vec<Duration>, Vec<OpTimings>);

/// An approximate MPSI experiment: fixed parameters, fresh inputs and seeds every repetition.
#[derive(Clone, Debug)]
pub struct ApproxMpsi<H: Xof> {
    params: BloomParameters<H>,
    party_count: usize,
    domain_size: usize,
    set_size: usize,
    common_size: usize,
}

impl<H> ApproxMpsi<H>
where
    H: Xof + Clone + 'static,
{
    /// `party_count` includes the Server, so there are `party_count - 1` input sets of
    /// `set_size` elements, all sharing `common_size` of them.
    pub fn new(
        params: BloomParameters<H>,
        party_count: usize,
        domain_size: usize,
        set_size: usize,
        common_size: usize,
    ) -> Result<Self, MpsiError> {
        if party_count < 2 {
            return Err(MpsiError::Configuration(format!(
                "party_count (={}) < 2",
                party_count
            )));
        }

        if domain_size < set_size {
            return Err(MpsiError::Configuration(format!(
                "domain_size (={}) < set_size (={})",
                domain_size, set_size
            )));
        }

        if set_size < common_size {
            return Err(MpsiError::Configuration(format!(
                "set_size (={}) < common_size (={})",
                set_size, common_size
            )));
        }

        Ok(Self {
            params,
            party_count,
            domain_size,
            set_size,
            common_size,
        })
    }

    /// Bloom parameters shared by every party.
    pub fn params(&self) -> &BloomParameters<H> {
        &self.params
    }

    /// Inputs indexed by party ID: `None` for the Server, a set for everyone else.
    ///
    /// If the domain is large enough, the parts of the sets outside the common subset are
    /// pairwise disjoint so the intersection is exactly the common subset.
    pub fn generate_inputs<RNG: CryptoRng + Rng>(
        &self,
        rng: &mut RNG,
    ) -> Result<Vec<Option<Set>>> {
        let nsets = self.party_count - 1;

        let created = if self.disjoint_extensions_fit() {
            create_sets_with_check(nsets, self.set_size, self.common_size, self.domain_size, rng)
        } else {
            create_sets_without_check(nsets, self.set_size, self.common_size, self.domain_size, rng)
        };
        let (common, sets) = created.with_context(|| format!("@{}:{}", file!(), line!()))?;

        debug!(common = ?common.to_vec(), "inputs generated");

        Ok(std::iter::once(None)
            .chain(sets.into_iter().map(Some))
            .collect())
    }

    /// Whether the non-common parts of all sets can be pairwise disjoint within the domain.
    fn disjoint_extensions_fit(&self) -> bool {
        let nsets = (self.party_count - 1) as u128;
        let required =
            self.common_size as u128 + nsets * (self.set_size - self.common_size) as u128;
        required <= self.domain_size as u128
    }

    /// Run the trusted setup: draw pairwise seeds and build one party per ID.
    pub fn setup_parties<RNG: CryptoRng + Rng>(&self, rng: &mut RNG) -> Result<Vec<Party<H>>> {
        SeedMatrix::generate(self.party_count, SEED_BYTE_COUNT, rng)
            .into_rows()
            .into_iter()
            .enumerate()
            .map(|(id, seeds)| {
                Party::new(id, self.party_count, self.params.clone(), seeds)
                    .with_context(|| format!("@{}:{}", file!(), line!()))
            })
            .collect()
    }

    /// Run every party on its own thread and wait for all of them.
    ///
    /// Returns the outputs, the time spent by each party and its per-operation timings.
    pub fn run_repetition<T: Transport + 'static>(
        &self,
        parties: Vec<Party<H>>,
        inputs: &[Option<Set>],
        transport: Arc<T>,
        rng: &mut AesRng,
    ) -> Result<RepetitionResult> {
        if parties.len() != inputs.len() {
            return Err(MpsiError::Configuration(format!(
                "{} parties for {} inputs",
                parties.len(),
                inputs.len()
            ))
            .into());
        }

        let nparties = parties.len();
        type Report = Result<(Option<Set>, Duration, OpTimings)>;
        let (tx, rx) = mpsc::channel::<(PartyId, Report)>();

        let handles = parties
            .into_iter()
            .zip(inputs.iter().cloned())
            .map(|(party, input)| {
                let transport = transport.clone();
                let tx = tx.clone();
                let mut rng = rng.fork();
                std::thread::spawn(move || {
                    let start = Instant::now();
                    let res = party
                        .run_timed(input.as_ref(), &*transport, &mut rng)
                        .map(|(output, timings)| (output, start.elapsed(), timings));
                    // the receiver only goes away after an earlier failure
                    let _ = tx.send((party.id(), res));
                })
            })
            .collect::<Vec<_>>();
        drop(tx);

        let mut outputs = vec![None; nparties];
        let mut durations = vec![Duration::ZERO; nparties];
        let mut op_timings = vec![OpTimings::default(); nparties];
        for _ in 0..nparties {
            let (id, res) = rx
                .recv()
                .map_err(|e| anyhow!("a party exited without reporting: {} @{}:{}", e, file!(), line!()))?;
            let (output, elapsed, timings) =
                res.with_context(|| format!("party {} failed", id))?;

            debug!(party = id, ?elapsed, "party finished");

            outputs[id] = output;
            durations[id] = elapsed;
            op_timings[id] = timings;
        }

        for handle in handles {
            handle
                .join()
                .map_err(|_| anyhow!("failed to join a party thread @{}:{}", file!(), line!()))?;
        }

        Ok((outputs, durations, op_timings))
    }

    /// Compare the Querier's output with the exact intersection of the input sets.
    pub fn validate_output(inputs: &[Option<Set>], outputs: &[Option<Set>]) -> (bool, Set) {
        let sets = inputs.iter().flatten().cloned().collect::<Vec<_>>();
        let expected = Set::intersection(&sets);

        let success = outputs.get(QUERIER).and_then(Option::as_ref) == Some(&expected);

        (success, expected)
    }

    /// Run `repetitions` repetitions, each with fresh inputs, seeds and transport drawn from `rng`.
    pub fn evaluate(
        &self,
        repetitions: usize,
        channel_type: ChannelType,
        overhead: NetworkOverhead,
        stats: &mut Stats,
        rng: &mut AesRng,
    ) -> Result<Vec<Outcome>> {
        let mut outcomes = Vec::with_capacity(repetitions);

        for repetition in 1..=repetitions {
            info!(repetition, repetitions, "running repetition");

            let inputs = self
                .generate_inputs(rng)
                .with_context(|| format!("@{}:{}", file!(), line!()))?;
            let parties = self
                .setup_parties(rng)
                .with_context(|| format!("@{}:{}", file!(), line!()))?;
            let transport = Arc::new(Simulated::new(
                create_transport(channel_type, self.party_count)
                    .with_context(|| format!("@{}:{}", file!(), line!()))?,
                overhead,
            ));

            let start = Instant::now();
            let (outputs, party_durations, op_timings) = self
                .run_repetition(parties, &inputs, transport.clone(), rng)
                .with_context(|| format!("repetition {} failed", repetition))?;
            let elapsed = start.elapsed();

            let (success, expected) = Self::validate_output(&inputs, &outputs);
            let actual = outputs.into_iter().nth(QUERIER).flatten();

            if success {
                info!(repetition, ?elapsed, "output is the exact intersection");
            } else {
                warn!(
                    repetition,
                    expected = ?expected.to_vec(),
                    actual = ?actual.as_ref().map(Set::to_vec),
                    "output differs from the exact intersection"
                );
            }

            let outcome = Outcome {
                repetition,
                success,
                expected,
                actual,
                elapsed,
                party_durations,
                traffic: transport.traffic_all(),
                op_timings,
            };

            stats
                .log_result(&outcome)
                .with_context(|| format!("@{}:{}", file!(), line!()))?;
            outcomes.push(outcome);
        }

        Ok(outcomes)
    }
}

/// Run the experiment described by `args`.
pub fn run(args: Args) -> Result<()> {
    let params = args
        .validate()
        .with_context(|| "Invalid arguments.")?;

    // half of every set is common
    let experiment = ApproxMpsi::new(
        params,
        args.party_count,
        args.domain_size,
        args.set_size,
        args.set_size / 2,
    )
    .with_context(|| format!("@{}:{}", file!(), line!()))?;

    let mut stats = Stats::new(&args.results_filename, args.stats);

    let outcomes = experiment
        .evaluate(
            args.repetitions,
            args.channel_type,
            args.overhead(),
            &mut stats,
            &mut AesRng::new(),
        )
        .with_context(|| "Failed to run the protocol.")?;

    if args.verbose {
        for outcome in outcomes.iter() {
            println!(
                "repetition {}: expected {:?}, actual {:?}",
                outcome.repetition,
                outcome.expected.to_vec(),
                outcome.actual.as_ref().map(Set::to_vec)
            );
        }
    }

    stats
        .write_breakdown(args.set_size, args.party_count, args.hash_count)
        .with_context(|| format!("@{}:{}", file!(), line!()))?;
    stats
        .write_op_breakdown()
        .with_context(|| format!("@{}:{}", file!(), line!()))?;

    info!("{}", stats.summary());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel_utils::mailbox::Mailbox;
    use crate::hash_utils::HashFunction;
    use clap::Parser;
    use rand::SeedableRng;
    use scuttlebutt::Block;

    fn seeded(seed: u128) -> AesRng {
        AesRng::from_seed(Block::from(seed))
    }

    fn experiment(party_count: usize) -> ApproxMpsi<HashFunction> {
        let params = BloomParameters::new(512, 4, HashFunction::Blake3Xof).unwrap();
        ApproxMpsi::new(params, party_count, 1000, 20, 10).unwrap()
    }

    #[test]
    fn test_new_invalid() {
        let params = BloomParameters::new(512, 4, HashFunction::Blake3Xof).unwrap();
        assert!(ApproxMpsi::new(params, 1, 1000, 20, 10).is_err());
        assert!(ApproxMpsi::new(params, 4, 10, 20, 10).is_err());
        assert!(ApproxMpsi::new(params, 4, 1000, 20, 30).is_err());
    }

    #[test]
    fn test_disjoint_extensions_fit() {
        let params = BloomParameters::new(512, 4, HashFunction::Blake3Xof).unwrap();
        assert!(experiment(4).disjoint_extensions_fit());
        assert!(!ApproxMpsi::new(params, 6, 40, 20, 10)
            .unwrap()
            .disjoint_extensions_fit());

        // the required domain exceeds usize
        let huge = ApproxMpsi::new(params, usize::MAX, usize::MAX, usize::MAX, 0).unwrap();
        assert!(!huge.disjoint_extensions_fit());
    }

    #[test]
    fn test_generate_inputs() {
        let mut rng = AesRng::new();
        let inputs = experiment(4).generate_inputs(&mut rng).unwrap();

        assert_eq!(inputs.len(), 4);
        assert!(inputs[0].is_none());
        for input in inputs[1..].iter() {
            assert_eq!(input.as_ref().unwrap().len(), 20);
        }

        let sets = inputs.into_iter().flatten().collect::<Vec<_>>();
        assert_eq!(Set::intersection(&sets).len(), 10);
    }

    #[test]
    fn test_generate_inputs_small_domain() {
        // too small for disjoint extensions, large enough for the sets
        let mut rng = AesRng::new();
        let params = BloomParameters::new(512, 4, HashFunction::Sha512).unwrap();
        let inputs = ApproxMpsi::new(params, 6, 40, 20, 10)
            .unwrap()
            .generate_inputs(&mut rng)
            .unwrap();
        assert_eq!(inputs.len(), 6);
    }

    #[test]
    fn test_setup_parties() {
        let mut rng = AesRng::new();
        let parties = experiment(5).setup_parties(&mut rng).unwrap();
        assert_eq!(parties.len(), 5);
        for (id, party) in parties.iter().enumerate() {
            assert_eq!(party.id(), id);
        }
    }

    #[test]
    fn test_validate_output() {
        let inputs = vec![None, Some(Set::from([1, 2, 3])), Some(Set::from([2, 3, 4]))];

        let (ok, expected) = ApproxMpsi::<HashFunction>::validate_output(
            &inputs,
            &[None, Some(Set::from([2, 3])), None],
        );
        assert!(ok);
        assert_eq!(expected, Set::from([2, 3]));

        let (ok, _) = ApproxMpsi::<HashFunction>::validate_output(
            &inputs,
            &[None, Some(Set::from([2])), None],
        );
        assert!(!ok);

        let (ok, _) = ApproxMpsi::<HashFunction>::validate_output(&inputs, &[None, None, None]);
        assert!(!ok);
    }

    #[test]
    fn test_run_repetition() {
        let mut rng = seeded(0x0b5e_55ed);
        let experiment = experiment(4);
        let inputs = experiment.generate_inputs(&mut rng).unwrap();
        let parties = experiment.setup_parties(&mut rng).unwrap();

        let (outputs, durations, op_timings) = experiment
            .run_repetition(parties, &inputs, Arc::new(Mailbox::new(4)), &mut rng)
            .unwrap();

        assert_eq!(durations.len(), 4);
        assert_eq!(op_timings.len(), 4);
        assert!(op_timings[0].xor > Duration::ZERO);
        let (ok, _) = ApproxMpsi::<HashFunction>::validate_output(&inputs, &outputs);
        assert!(ok);
    }

    #[test]
    fn test_evaluate() {
        for channel_type in [ChannelType::Mailbox, ChannelType::CrossBeam, ChannelType::Unix] {
            let mut stats = Stats::new("unused.csv", false);
            let outcomes = experiment(4)
                .evaluate(
                    2,
                    channel_type,
                    NetworkOverhead::default(),
                    &mut stats,
                    &mut seeded(0xe7a1),
                )
                .unwrap();

            assert_eq!(outcomes.len(), 2);
            for outcome in outcomes.iter() {
                assert!(outcome.success, "{}", channel_type);
                assert_eq!(outcome.party_durations.len(), 4);
                assert_eq!(outcome.op_timings.len(), 4);
                // Server answers once, the Querier sends a share and a query, Clients a share
                assert_eq!(outcome.traffic[0].messages, 1);
                assert_eq!(outcome.traffic[1].messages, 2);
                assert_eq!(outcome.traffic[2].messages, 1);
                assert_eq!(outcome.traffic[3].bytes, 512 * 40);
            }
            assert!(stats.all_successful());
        }
    }

    #[test]
    fn test_evaluate_reproducible() {
        let draw = || {
            let mut stats = Stats::new("unused.csv", false);
            experiment(4)
                .evaluate(
                    3,
                    ChannelType::Mailbox,
                    NetworkOverhead::default(),
                    &mut stats,
                    &mut seeded(42),
                )
                .unwrap()
                .into_iter()
                .map(|o| (o.expected, o.actual))
                .collect::<Vec<_>>()
        };
        assert_eq!(draw(), draw());
    }

    #[test]
    fn test_approximate_correctness() {
        // unseeded: these bounds hold for every draw
        let mut rng = AesRng::new();
        let repetitions = 25;

        for bin_count in [64, 512] {
            let params = BloomParameters::new(bin_count, 4, HashFunction::Blake3Xof).unwrap();
            let experiment = ApproxMpsi::new(params, 4, 1000, 20, 10).unwrap();

            let mut extras = 0;
            for _ in 0..repetitions {
                let inputs = experiment.generate_inputs(&mut rng).unwrap();
                let parties = experiment.setup_parties(&mut rng).unwrap();
                let (outputs, _, _) = experiment
                    .run_repetition(parties, &inputs, Arc::new(Mailbox::new(4)), &mut rng)
                    .unwrap();

                let (_, expected) = ApproxMpsi::<HashFunction>::validate_output(&inputs, &outputs);
                let querier_input = inputs[QUERIER].as_ref().unwrap();
                let actual = outputs[QUERIER].as_ref().unwrap();

                // no false negatives, and nothing outside the Querier's own set
                assert!(expected.iter().all(|x| actual.contains(x)), "{}", bin_count);
                assert!(actual.iter().all(|x| querier_input.contains(x)), "{}", bin_count);
                extras += actual.len() - expected.len();
            }

            if bin_count == 512 {
                // 10 candidates per repetition; the expected rate is far below 1%
                assert!(extras * 20 <= repetitions * 10, "{} false positives", extras);
            }
        }
    }

    #[test]
    fn test_run_with_stats() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.csv");

        let args = Args {
            stats: true,
            repetitions: 2,
            results_filename: path.clone(),
            ..Args::parse_from(["approx_mpsi", "-n", "3"])
        };
        run(args).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        // two repetitions, the header and one breakdown row
        assert_eq!(content.lines().count(), 4);

        let content = std::fs::read_to_string(dir.path().join("results_II.csv")).unwrap();
        // the header, one row per party and the sum
        assert_eq!(content.lines().count(), 5);
    }
}
