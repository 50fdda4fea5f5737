use approx_mpsi::approx::ApproxMpsi;
use approx_mpsi::channel_utils::Transport;
use approx_mpsi::cli_utils::{create_transport, ChannelType};
use approx_mpsi::hash_utils::HashFunction;
use approx_mpsi::set_utils::BloomParameters;
use criterion::Bencher;
use scuttlebutt::AesRng;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn approx_routine<T: Transport + 'static>(
    experiment: &ApproxMpsi<HashFunction>,
    transport: T,
    rng: &mut AesRng,
) -> Duration {
    let inputs = experiment.generate_inputs(rng).unwrap();
    let parties = experiment.setup_parties(rng).unwrap();

    let start = Instant::now();
    let (outputs, _, _) = experiment
        .run_repetition(parties, &inputs, Arc::new(transport), rng)
        .unwrap();
    let elapsed = start.elapsed();

    assert!(outputs[1].is_some());
    elapsed
}

/// Bloom bins for `size` elements with `hash_count` hashes.
pub(crate) fn bin_count(size: usize, hash_count: usize) -> usize {
    2 * size * hash_count
}

pub(crate) fn approx_fn(
    nparties: usize,
    hash_count: usize,
    hash: HashFunction,
    channel_type: ChannelType,
) -> impl FnMut(&mut Bencher<'_>, &usize) {
    move |b, &size| {
        let params = BloomParameters::new(bin_count(size, hash_count), hash_count, hash).unwrap();
        let experiment = ApproxMpsi::new(params, nparties, size * nparties * 4, size, size / 2).unwrap();
        let mut rng = AesRng::new();

        b.iter_custom(|iter| {
            let mut total = Duration::ZERO;
            for _ in 0..iter {
                let transport = create_transport(channel_type, nparties).unwrap();
                total += approx_routine(&experiment, transport, &mut rng);
            }
            total
        });
    }
}
