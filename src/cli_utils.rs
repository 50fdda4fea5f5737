//! CLI (CommandLine Interface) utilities for "Approximate MPSI".
//!
//! Here, you can know the options for the protocol through enum types and structs.
//! See other modules for the actual implementation of the protocol or details of what options mean.

use crate::channel_utils::mailbox;
use crate::channel_utils::overhead::NetworkOverhead;
use crate::channel_utils::sync_channel::UnixMesh;
use crate::channel_utils::sync_channel_by_cb::CrossbeamMesh;
use crate::channel_utils::Transport;
use crate::errors::MpsiError;
use crate::hash_utils::HashFunction;
use crate::set_utils::BloomParameters;
use crate::PartyId;
use anyhow::{Context, Result};
use clap::builder::{PossibleValuesParser, TypedValueParser};
use clap::{Parser, ValueEnum};
use std::fmt::Display;
use std::path::PathBuf;

/// Channel types. Channels are used to communicate between parties. More details: [channel_utils](crate::channel_utils).
#[derive(Clone, Copy, ValueEnum, Debug, PartialEq, Eq)]
pub enum ChannelType {
    /// In-memory queues. See [mailbox::Mailbox].
    Mailbox,
    /// Native channel of Rust. See [CrossbeamMesh].
    #[value(name = "crossbeam")]
    CrossBeam,
    /// Unix domain socket. See [UnixMesh].
    Unix,
}

impl Display for ChannelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelType::Mailbox => write!(f, "mailbox"),
            ChannelType::CrossBeam => write!(f, "crossbeam"),
            ChannelType::Unix => write!(f, "unix"),
        }
    }
}

/// Arguments for Approximate MPSI protocol.
/// This struct implements [clap::Parser] to make that this binary has CommandLine Arguments.
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, next_line_help = true)]
pub struct Args {
    /// Number of participants in the protocol, Server included.
    ///
    /// Party 0 is the Server, party 1 the Querier and every other party a Client.
    #[arg(short = 'n', long, default_value_t = 4)]
    pub party_count: usize,

    /// Number of elements of the set that each input party has.
    #[arg(short = 'k', long, default_value_t = 20)]
    pub set_size: usize,

    /// Elements are drawn from `0..domain_size`.
    #[arg(short = 'u', long, default_value_t = 1000)]
    pub domain_size: usize,

    /// Minimum number of Bloom filter bins. Rounded up to a multiple of 64.
    #[arg(short = 'm', long, default_value_t = 512)]
    pub bin_count: usize,

    /// Number of hash indices per element.
    #[arg(short = 's', long, default_value_t = 4)]
    pub hash_count: usize,

    /// Hash function used for Bloom indices and seed expansion.
    #[arg(
        short = 'c',
        long,
        default_value_t = HashFunction::Blake3Xof,
        value_parser = PossibleValuesParser::new(HashFunction::ALL.map(|h| h.name()))
            .try_map(|name| HashFunction::from_name(&name))
    )]
    pub hash_function: HashFunction,

    /// Simulated latency per message, in milliseconds. 0 disables it.
    #[arg(short = 'l', long, default_value_t = 0.0)]
    pub latency: f64,

    /// Simulated bandwidth, in bytes per second. 0 disables it.
    #[arg(short = 'b', long, default_value_t = 0.0)]
    pub bytes_per_sec: f64,

    /// Number of repetitions of the experiment.
    #[arg(short = 'r', long, default_value_t = 1)]
    pub repetitions: usize,

    /// CSV file the statistics are appended to.
    #[arg(short = 'f', long, default_value = "results.csv")]
    pub results_filename: PathBuf,

    /// Record statistics to the results file.
    #[arg(short = 't', long, default_value_t = false)]
    pub stats: bool,

    /// Channel Types.
    #[arg(long = "channel", default_value_t = ChannelType::Mailbox)]
    pub channel_type: ChannelType,

    /// Verbose mode.
    ///
    /// If specified, log per-party progress and print the sets and the intersection.
    #[arg(long = "verbose", default_value_t = false)]
    pub verbose: bool,
}

impl Args {
    /// Check the arguments and build the Bloom parameters they describe.
    pub fn validate(&self) -> Result<BloomParameters<HashFunction>, MpsiError> {
        if self.party_count < 2 {
            return Err(MpsiError::Configuration(format!(
                "party_count (={}) < 2: a Server and a Querier are required",
                self.party_count
            )));
        }

        if self.domain_size < self.set_size {
            return Err(MpsiError::Configuration(format!(
                "domain_size (={}) < set_size (={})",
                self.domain_size, self.set_size
            )));
        }

        if self.repetitions == 0 {
            return Err(MpsiError::Configuration(
                "repetitions must be positive".to_string(),
            ));
        }

        if !(self.latency >= 0.0 && self.bytes_per_sec >= 0.0) {
            return Err(MpsiError::Configuration(format!(
                "latency (={}) and bytes_per_sec (={}) must be non-negative",
                self.latency, self.bytes_per_sec
            )));
        }

        BloomParameters::new(self.bin_count, self.hash_count, self.hash_function)
    }

    /// Simulated network described by the arguments.
    pub fn overhead(&self) -> NetworkOverhead {
        NetworkOverhead {
            latency_ms: self.latency,
            bytes_per_sec: self.bytes_per_sec,
        }
    }
}

/// Enum type to handle multiple channel types on runtime.
pub enum TransportUnion {
    /// In-memory queues. See [mailbox::Mailbox].
    Mailbox(mailbox::Mailbox),
    /// Native channel of Rust. See [CrossbeamMesh].
    CrossBeam(CrossbeamMesh),
    /// Unix domain socket. See [UnixMesh].
    Unix(UnixMesh),
}

use TransportUnion::*;

impl Transport for TransportUnion {
    #[inline(always)]
    fn party_count(&self) -> usize {
        match self {
            Mailbox(t) => t.party_count(),
            CrossBeam(t) => t.party_count(),
            Unix(t) => t.party_count(),
        }
    }

    #[inline(always)]
    fn send(&self, from: PartyId, to: PartyId, bytes: Vec<u8>) -> Result<()> {
        match self {
            Mailbox(t) => t.send(from, to, bytes),
            CrossBeam(t) => t.send(from, to, bytes),
            Unix(t) => t.send(from, to, bytes),
        }
    }

    #[inline(always)]
    fn receive(&self, from: PartyId, to: PartyId) -> Result<Vec<u8>> {
        match self {
            Mailbox(t) => t.receive(from, to),
            CrossBeam(t) => t.receive(from, to),
            Unix(t) => t.receive(from, to),
        }
    }
}

/// Create a transport for `nparties` parties. Runtime utility.
pub fn create_transport(type_: ChannelType, nparties: usize) -> Result<TransportUnion> {
    Ok(match type_ {
        ChannelType::Mailbox => Mailbox(mailbox::Mailbox::new(nparties)),
        ChannelType::CrossBeam => CrossBeam(CrossbeamMesh::new(nparties)),
        ChannelType::Unix => {
            Unix(UnixMesh::new(nparties).with_context(|| format!("@{}:{}", file!(), line!()))?)
        }
    })
}
