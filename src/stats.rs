//! Statistics of an experiment.
//!
//! When enabled, every repetition appends `repetition,elapsed_ms,success` to the results file and
//! [Stats::write_breakdown] appends one row of per-role averages at the end of the experiment.
//! [Stats::write_op_breakdown] writes the per-party operation timings to a sibling file whose
//! name carries an `_II` suffix (`results.csv` -> `results_II.csv`).

use crate::approx::{OpTimings, Outcome, QUERIER, SERVER};
use crate::channel_utils::overhead::Traffic;
use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

const OP_BREAKDOWN_HEADER: &str = "Party, XOR (in ms), XOF (in ms), BloomFilter (in ms)";

const BREAKDOWN_HEADER: &str = "Set Size, Party Count, Hash Count, Server Side (s), Query Servers (s), Clients (s), Query Servers Message Count, Query Servers Message Size, Client Message Count, Client Message Size";

/// Measurements of one repetition, reduced per role.
#[derive(Clone, Debug, PartialEq)]
pub struct RepetitionRecord {
    /// 1-based repetition number.
    pub repetition: usize,
    /// Wall-clock time of the whole repetition.
    pub elapsed: Duration,
    /// Whether the Querier's output was the exact intersection.
    pub success: bool,
    /// Time the Server spent.
    pub server: Duration,
    /// Time the Querier spent.
    pub querier: Duration,
    /// Mean time of a Client. Zero without Clients.
    pub client: Duration,
    /// Traffic sent by the Querier.
    pub querier_traffic: Traffic,
    /// Mean traffic sent by a Client. Zero without Clients.
    pub client_traffic: Traffic,
    /// Per-operation timings, indexed by party ID.
    pub op_timings: Vec<OpTimings>,
}

impl From<&Outcome> for RepetitionRecord {
    fn from(outcome: &Outcome) -> Self {
        let at = |id: usize| outcome.party_durations.get(id).copied().unwrap_or_default();
        let clients = outcome.party_durations.len().saturating_sub(2);

        let (client, client_traffic) = if clients == 0 {
            (Duration::ZERO, Traffic::default())
        } else {
            let total = outcome.party_durations[2..].iter().sum::<Duration>();
            let (messages, bytes) = outcome
                .traffic
                .iter()
                .skip(2)
                .fold((0, 0), |(m, b), t| (m + t.messages, b + t.bytes));
            (
                total / clients as u32,
                Traffic {
                    messages: messages / clients,
                    bytes: bytes / clients,
                },
            )
        };

        Self {
            repetition: outcome.repetition,
            elapsed: outcome.elapsed,
            success: outcome.success,
            server: at(SERVER),
            querier: at(QUERIER),
            client,
            querier_traffic: outcome.traffic.get(QUERIER).copied().unwrap_or_default(),
            client_traffic,
            op_timings: outcome.op_timings.clone(),
        }
    }
}

/// Collected records of an experiment, optionally mirrored to a CSV file.
#[derive(Debug)]
pub struct Stats {
    enabled: bool,
    path: PathBuf,
    records: Vec<RepetitionRecord>,
}

impl Stats {
    /// Records are only written to `path` if `enabled`.
    pub fn new<P: AsRef<Path>>(path: P, enabled: bool) -> Self {
        Self {
            enabled,
            path: path.as_ref().to_path_buf(),
            records: Vec::new(),
        }
    }

    /// Records collected so far.
    pub fn records(&self) -> &[RepetitionRecord] {
        &self.records
    }

    /// Collect the outcome of one repetition.
    pub fn log_result(&mut self, outcome: &Outcome) -> Result<()> {
        let record = RepetitionRecord::from(outcome);

        if self.enabled {
            let mut file = self.open()?;
            writeln!(
                file,
                "{},{},{}",
                record.repetition,
                record.elapsed.as_secs_f64() * 1000.0,
                if record.success { 1 } else { 0 }
            )
            .with_context(|| format!("@{}:{}", file!(), line!()))?;
        }

        self.records.push(record);
        Ok(())
    }

    /// Number of successful repetitions.
    pub fn success_count(&self) -> usize {
        self.records.iter().filter(|r| r.success).count()
    }

    /// Whether every repetition succeeded.
    pub fn all_successful(&self) -> bool {
        self.success_count() == self.records.len()
    }

    /// Mean repetition time in milliseconds. 0 without records.
    pub fn average_ms(&self) -> f64 {
        if self.records.is_empty() {
            return 0.0;
        }
        let total = self
            .records
            .iter()
            .map(|r| r.elapsed.as_secs_f64() * 1000.0)
            .sum::<f64>();
        total / self.records.len() as f64
    }

    /// One-line human readable summary.
    pub fn summary(&self) -> String {
        let n = self.records.len();
        let rate = if n == 0 {
            0.0
        } else {
            100.0 * self.success_count() as f64 / n as f64
        };
        format!(
            "average execution time: {:.3} ms, success rate: {} / {} ({:.1}%)",
            self.average_ms(),
            self.success_count(),
            n,
            rate
        )
    }

    /// Append a row of per-role averages, preceded by a header if the file is empty.
    pub fn write_breakdown(
        &self,
        set_size: usize,
        party_count: usize,
        hash_count: usize,
    ) -> Result<()> {
        if !self.enabled || self.records.is_empty() {
            return Ok(());
        }

        let n = self.records.len();
        let mean_secs = |f: fn(&RepetitionRecord) -> Duration| {
            self.records.iter().map(|r| f(r).as_secs_f64()).sum::<f64>() / n as f64
        };
        let mean_count = |f: fn(&RepetitionRecord) -> usize| {
            self.records.iter().map(f).sum::<usize>() / n
        };

        let mut file = self.open()?;
        let empty = file
            .metadata()
            .with_context(|| format!("@{}:{}", file!(), line!()))?
            .len()
            == 0;
        if empty {
            writeln!(file, "{}", BREAKDOWN_HEADER)
                .with_context(|| format!("@{}:{}", file!(), line!()))?;
        }

        writeln!(
            file,
            "{}, {}, {}, {}, {}, {}, {}, {}, {}, {}",
            set_size,
            party_count,
            hash_count,
            mean_secs(|r| r.server),
            mean_secs(|r| r.querier),
            mean_secs(|r| r.client),
            mean_count(|r| r.querier_traffic.messages),
            mean_count(|r| r.querier_traffic.bytes),
            mean_count(|r| r.client_traffic.messages),
            mean_count(|r| r.client_traffic.bytes),
        )
        .with_context(|| format!("@{}:{}", file!(), line!()))?;

        Ok(())
    }

    /// Append per-party mean operation timings and their sum to the `_II` file.
    pub fn write_op_breakdown(&self) -> Result<()> {
        if !self.enabled || self.records.is_empty() {
            return Ok(());
        }

        let n = self.records.len() as f64;
        let nparties = self
            .records
            .iter()
            .map(|r| r.op_timings.len())
            .max()
            .unwrap_or(0);
        let ms = |d: Duration| d.as_secs_f64() * 1000.0;

        let path = op_breakdown_path(&self.path);
        let mut file = open_append(&path)?;
        let empty = file
            .metadata()
            .with_context(|| format!("@{}:{}", file!(), line!()))?
            .len()
            == 0;
        if empty {
            writeln!(file, "{}", OP_BREAKDOWN_HEADER)
                .with_context(|| format!("@{}:{}", file!(), line!()))?;
        }

        let mut sum = [0.0f64; 3];
        for id in 0..nparties {
            let mut mean = [0.0f64; 3];
            for t in self.records.iter().filter_map(|r| r.op_timings.get(id)) {
                mean[0] += ms(t.xor) / n;
                mean[1] += ms(t.xof) / n;
                mean[2] += ms(t.bloom_filter) / n;
            }
            sum.iter_mut().zip(mean).for_each(|(s, m)| *s += m);

            writeln!(file, "{}, {}, {}, {}", id, mean[0], mean[1], mean[2])
                .with_context(|| format!("@{}:{}", file!(), line!()))?;
        }
        writeln!(file, "Sum, {}, {}, {}", sum[0], sum[1], sum[2])
            .with_context(|| format!("@{}:{}", file!(), line!()))?;

        Ok(())
    }

    fn open(&self) -> Result<std::fs::File> {
        open_append(&self.path)
    }
}

fn open_append(path: &Path) -> Result<std::fs::File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("{} @{}:{}", path.display(), file!(), line!()))
}

/// `dir/name.ext` -> `dir/name_II.ext`.
fn op_breakdown_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{}_II.{}", stem, ext.to_string_lossy()),
        None => format!("{}_II", stem),
    };
    path.with_file_name(name)
}
