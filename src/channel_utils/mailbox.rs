//! In-memory transport. Each directed link `(from, to)` is a FIFO queue; receivers sleep on a
//! condition variable until their queue is non-empty.

use super::{check_ids, Transport};
use crate::PartyId;
use anyhow::{anyhow, Result};
use std::collections::{HashMap, VecDeque};
use std::sync::{Condvar, Mutex};

/// Queues of a full mesh of `party_count` parties, owned by one repetition.
#[derive(Debug)]
pub struct Mailbox {
    party_count: usize,
    queues: Mutex<HashMap<(PartyId, PartyId), VecDeque<Vec<u8>>>>,
    arrived: Condvar,
}

impl Mailbox {
    /// Empty queues for parties `0..party_count`.
    pub fn new(party_count: usize) -> Self {
        Self {
            party_count,
            queues: Mutex::new(HashMap::new()),
            arrived: Condvar::new(),
        }
    }

    /// Non-blocking receive. `None` if nothing is queued on `from -> to`.
    pub fn try_receive(&self, from: PartyId, to: PartyId) -> Result<Option<Vec<u8>>> {
        check_ids(from, to, self.party_count)?;
        let mut queues = self
            .queues
            .lock()
            .map_err(|e| anyhow!("{} @{}:{}", e, file!(), line!()))?;
        Ok(queues.get_mut(&(from, to)).and_then(VecDeque::pop_front))
    }

    /// Number of messages waiting on `from -> to`.
    pub fn pending(&self, from: PartyId, to: PartyId) -> Result<usize> {
        check_ids(from, to, self.party_count)?;
        let queues = self
            .queues
            .lock()
            .map_err(|e| anyhow!("{} @{}:{}", e, file!(), line!()))?;
        Ok(queues.get(&(from, to)).map_or(0, VecDeque::len))
    }
}

impl Transport for Mailbox {
    fn party_count(&self) -> usize {
        self.party_count
    }

    fn send(&self, from: PartyId, to: PartyId, bytes: Vec<u8>) -> Result<()> {
        check_ids(from, to, self.party_count)?;
        let mut queues = self
            .queues
            .lock()
            .map_err(|e| anyhow!("{} @{}:{}", e, file!(), line!()))?;
        queues.entry((from, to)).or_default().push_back(bytes);
        drop(queues);

        self.arrived.notify_all();
        Ok(())
    }

    fn receive(&self, from: PartyId, to: PartyId) -> Result<Vec<u8>> {
        check_ids(from, to, self.party_count)?;
        let mut queues = self
            .queues
            .lock()
            .map_err(|e| anyhow!("{} @{}:{}", e, file!(), line!()))?;

        loop {
            if let Some(bytes) = queues.get_mut(&(from, to)).and_then(VecDeque::pop_front) {
                return Ok(bytes);
            }

            queues = self
                .arrived
                .wait(queues)
                .map_err(|e| anyhow!("{} @{}:{}", e, file!(), line!()))?;
        }
    }
}
