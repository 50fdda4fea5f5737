//! Module about unix domain socket channel. See [UnixStream].
//! This module provides a transport made of one unix domain socket pair per directed pair of parties.
//!
//! Each message is framed as its length (`usize`) followed by its bytes.

use super::{check_ids, Transport};
use crate::PartyId;
use anyhow::{anyhow, Context, Result};
use itertools::Itertools;
use scuttlebutt::{AbstractChannel, SyncChannel};
use std::sync::Mutex;
use std::{
    io::{BufReader, BufWriter},
    os::unix::net::UnixStream,
};

type Channel = Mutex<SyncChannel<BufReader<UnixStream>, BufWriter<UnixStream>>>;

/// Full mesh of unix domain sockets.
///
/// `writers[from][to]` and `readers[from][to]` are the two ends of the socket pair carrying
/// messages from `from` to `to`.
pub struct UnixMesh {
    writers: Vec<Vec<Option<Channel>>>,
    readers: Vec<Vec<Option<Channel>>>,
}

fn sync_channel(stream: UnixStream) -> Result<Channel> {
    let reader = stream
        .try_clone()
        .with_context(|| format!("@{}:{}", file!(), line!()))?;
    Ok(Mutex::new(SyncChannel::new(
        BufReader::new(reader),
        BufWriter::new(stream),
    )))
}

impl UnixMesh {
    /// Create a set of unix domain socket channels for `nparties` parties.
    pub fn new(nparties: usize) -> Result<Self> {
        let mut writers = (0..nparties)
            .map(|_| (0..nparties).map(|_| None).collect_vec())
            .collect_vec();
        let mut readers = (0..nparties)
            .map(|_| (0..nparties).map(|_| None).collect_vec())
            .collect_vec();

        for i in 0..nparties {
            for j in 0..nparties {
                if i != j {
                    let (s, r) =
                        UnixStream::pair().with_context(|| format!("@{}:{}", file!(), line!()))?;
                    writers[i][j] = Some(sync_channel(s)?);
                    readers[i][j] = Some(sync_channel(r)?);
                }
            }
        }

        Ok(Self { writers, readers })
    }

    fn end<'a>(
        ends: &'a [Vec<Option<Channel>>],
        from: PartyId,
        to: PartyId,
    ) -> Result<&'a Channel> {
        check_ids(from, to, ends.len())?;
        ends[from][to]
            .as_ref()
            .ok_or_else(|| anyhow!("no link from party {} to itself @{}:{}", from, file!(), line!()))
    }
}

impl Transport for UnixMesh {
    fn party_count(&self) -> usize {
        self.writers.len()
    }

    fn send(&self, from: PartyId, to: PartyId, bytes: Vec<u8>) -> Result<()> {
        let mut channel = Self::end(&self.writers, from, to)?
            .lock()
            .map_err(|e| anyhow!("{} @{}:{}", e, file!(), line!()))?;

        channel
            .write_usize(bytes.len())
            .with_context(|| format!("@{}:{}", file!(), line!()))?;
        channel
            .write_bytes(&bytes)
            .with_context(|| format!("@{}:{}", file!(), line!()))?;
        channel
            .flush()
            .with_context(|| format!("@{}:{}", file!(), line!()))?;

        Ok(())
    }

    fn receive(&self, from: PartyId, to: PartyId) -> Result<Vec<u8>> {
        let mut channel = Self::end(&self.readers, from, to)?
            .lock()
            .map_err(|e| anyhow!("{} @{}:{}", e, file!(), line!()))?;

        let len = channel
            .read_usize()
            .with_context(|| format!("@{}:{}", file!(), line!()))?;
        let bytes = channel
            .read_vec(len)
            .with_context(|| format!("@{}:{}", file!(), line!()))?;

        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::MpsiError;
    use std::sync::Arc;

    #[test]
    fn test_frames() {
        let mesh = UnixMesh::new(2).unwrap();
        mesh.send(0, 1, b"hello".to_vec()).unwrap();
        mesh.send(0, 1, vec![]).unwrap();
        mesh.send(0, 1, vec![9; 3]).unwrap();

        assert_eq!(mesh.receive(0, 1).unwrap(), b"hello".to_vec());
        assert!(mesh.receive(0, 1).unwrap().is_empty());
        assert_eq!(mesh.receive(0, 1).unwrap(), vec![9; 3]);
    }

    #[test]
    fn test_large_message_across_threads() {
        let mesh = Arc::new(UnixMesh::new(3).unwrap());
        let payload = (0..1 << 20).map(|i| (i % 251) as u8).collect::<Vec<_>>();

        let m = mesh.clone();
        let p = payload.clone();
        let handle = std::thread::spawn(move || m.send(2, 0, p).unwrap());

        assert_eq!(mesh.receive(2, 0).unwrap(), payload);
        handle.join().unwrap();
    }

    #[test]
    fn test_no_self_link() {
        let mesh = UnixMesh::new(2).unwrap();
        assert!(mesh.send(1, 1, vec![1]).is_err());

        let e = mesh.send(0, 2, vec![1]).unwrap_err();
        assert!(matches!(
            e.downcast_ref::<MpsiError>(),
            Some(MpsiError::OutOfRange { id: 2, .. })
        ));
    }
}
