//! Module about native channel of Rust. See [crossbeam].
//! This module provides a transport made of one unbounded crossbeam channel per directed pair of parties.

use super::{check_ids, Transport};
use crate::errors::MpsiError;
use crate::PartyId;
use anyhow::Result;
use crossbeam::channel::{unbounded, Receiver, Sender};
use itertools::Itertools;

type Link = (Sender<Vec<u8>>, Receiver<Vec<u8>>);

/// Full mesh of crossbeam channels. `links[from][to]` carries messages from `from` to `to`.
pub struct CrossbeamMesh {
    links: Vec<Vec<Link>>,
}

impl CrossbeamMesh {
    /// Create a set of crossbeam channels for `nparties` parties.
    pub fn new(nparties: usize) -> Self {
        let links = (0..nparties)
            .map(|_| (0..nparties).map(|_| unbounded()).collect_vec())
            .collect_vec();

        Self { links }
    }

    fn link(&self, from: PartyId, to: PartyId) -> Result<&Link, MpsiError> {
        check_ids(from, to, self.links.len())?;
        Ok(&self.links[from][to])
    }
}

impl Transport for CrossbeamMesh {
    fn party_count(&self) -> usize {
        self.links.len()
    }

    fn send(&self, from: PartyId, to: PartyId, bytes: Vec<u8>) -> Result<()> {
        let (s, _) = self.link(from, to)?;
        s.send(bytes)
            .map_err(|_| MpsiError::Disconnected { from, to })?;
        Ok(())
    }

    fn receive(&self, from: PartyId, to: PartyId) -> Result<Vec<u8>> {
        let (_, r) = self.link(from, to)?;
        Ok(r.recv().map_err(|_| MpsiError::Disconnected { from, to })?)
    }
}
