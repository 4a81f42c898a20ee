use crate::{
    error::{Error, Result},
    types::WorkerId,
};
use std::sync::mpsc::{self, Receiver, Sender};

/// Point-to-point byte transport between the workers of one run.
pub trait Communicator: Send {
    fn worker_id(&self) -> WorkerId;

    fn worker_num(&self) -> usize;

    fn send_to(&mut self, dst: WorkerId, bytes: &[u8]) -> Result<()>;

    /// Blocks until the next message from `src` arrives.
    fn receive_from(&mut self, src: WorkerId) -> Result<Vec<u8>>;
}

/// One endpoint of an in-process channel mesh.
///
/// Every ordered pair of workers gets its own channel, so messages from one
/// sender are received in the order they were sent.
pub struct LocalCommunicator {
    worker_id: WorkerId,
    senders: Vec<Sender<Vec<u8>>>,
    receivers: Vec<Receiver<Vec<u8>>>,
}

impl LocalCommunicator {
    /// Creates the endpoints of `worker_num` workers, indexed by worker id.
    pub fn mesh(worker_num: usize) -> Vec<LocalCommunicator> {
        let mut senders: Vec<Vec<Sender<Vec<u8>>>> = (0..worker_num).map(|_| vec![]).collect();
        let mut receivers: Vec<Vec<Receiver<Vec<u8>>>> = (0..worker_num).map(|_| vec![]).collect();
        for src in 0..worker_num {
            for dst in 0..worker_num {
                let (tx, rx) = mpsc::channel();
                senders[src].push(tx);
                receivers[dst].push(rx);
            }
        }
        senders
            .into_iter()
            .zip(receivers)
            .enumerate()
            .map(|(worker_id, (senders, receivers))| LocalCommunicator {
                worker_id,
                senders,
                receivers,
            })
            .collect()
    }

    fn check_peer(&self, peer: WorkerId) -> Result<()> {
        if peer < self.senders.len() {
            Ok(())
        } else {
            Err(Error::Sync(format!(
                "worker {} out of range [0, {})",
                peer,
                self.senders.len()
            )))
        }
    }
}

impl Communicator for LocalCommunicator {
    fn worker_id(&self) -> WorkerId {
        self.worker_id
    }

    fn worker_num(&self) -> usize {
        self.senders.len()
    }

    fn send_to(&mut self, dst: WorkerId, bytes: &[u8]) -> Result<()> {
        self.check_peer(dst)?;
        self.senders[dst]
            .send(bytes.to_vec())
            .map_err(|_| Error::Sync(format!("worker {} hung up", dst)))
    }

    fn receive_from(&mut self, src: WorkerId) -> Result<Vec<u8>> {
        self.check_peer(src)?;
        self.receivers[src]
            .recv()
            .map_err(|_| Error::Sync(format!("worker {} hung up", src)))
    }
}
