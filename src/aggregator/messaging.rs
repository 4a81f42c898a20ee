//! Request/response synchronization.
//!
//! Every non-root worker sends one [`AggregatorRequest`] per aggregator and
//! round and blocks until the root answers with the merged value. The root
//! side is an [`AggregatorRendezvous`]: request handlers deposit their
//! payloads and wait, the root collects exactly `worker_num - 1` distinct
//! contributions, merges them and publishes the result to every waiter.

use crate::{
    archive::{InArchive, OutArchive, Writable},
    error::{Error, Result},
    types::WorkerId,
};
use log::{debug, warn};
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{Arc, Condvar, Mutex, MutexGuard},
};

#[derive(Debug, Clone, PartialEq)]
pub struct AggregatorRequest {
    pub round: u64,
    pub worker_id: WorkerId,
    pub name: String,
    pub payload: Vec<u8>,
}

impl Writable for AggregatorRequest {
    fn write(&self, out: &mut OutArchive) {
        out.write(&self.round);
        out.write(&self.worker_id);
        out.write(&self.name);
        out.write(&self.payload);
    }

    fn read(input: &mut InArchive) -> Result<Self> {
        Ok(Self {
            round: input.read()?,
            worker_id: input.read()?,
            name: input.read()?,
            payload: input.read()?,
        })
    }
}

/// The root's answer: the merged value, or why it could not be produced.
#[derive(Debug, Clone, PartialEq)]
pub enum AggregatorResponse {
    Merged(Vec<u8>),
    Failed(String),
}

impl Writable for AggregatorResponse {
    fn write(&self, out: &mut OutArchive) {
        match self {
            AggregatorResponse::Merged(bytes) => {
                out.write(&0u8);
                out.write(bytes);
            }
            AggregatorResponse::Failed(message) => {
                out.write(&1u8);
                out.write(message);
            }
        }
    }

    fn read(input: &mut InArchive) -> Result<Self> {
        match input.read::<u8>()? {
            0 => Ok(AggregatorResponse::Merged(input.read()?)),
            1 => Ok(AggregatorResponse::Failed(input.read()?)),
            status => Err(Error::Corrupted(format!("invalid response status {}", status))),
        }
    }
}

impl From<Result<Vec<u8>>> for AggregatorResponse {
    fn from(result: Result<Vec<u8>>) -> Self {
        match result {
            Ok(bytes) => AggregatorResponse::Merged(bytes),
            Err(e) => AggregatorResponse::Failed(e.to_string()),
        }
    }
}

/// The non-root end of the messaging transport.
pub trait AggregatorClient: Send {
    /// Sends one contribution and blocks for the merged value.
    fn request(&mut self, request: AggregatorRequest) -> Result<Vec<u8>>;
}

#[derive(Default)]
struct RendezvousState {
    /// The round the root is synchronizing.
    round: u64,
    contributions: BTreeMap<(u64, String), BTreeMap<WorkerId, Vec<u8>>>,
    /// Aggregators of `round` already collected by the root.
    collected: BTreeSet<String>,
    published: BTreeMap<(u64, String), Vec<u8>>,
    /// Aggregators the root could not merge, with the reason.
    failed: BTreeMap<(u64, String), String>,
}

/// The root's fan-in point for one run.
pub struct AggregatorRendezvous {
    worker_num: usize,
    state: Mutex<RendezvousState>,
    changed: Condvar,
}

impl AggregatorRendezvous {
    pub fn new(worker_num: usize) -> Self {
        Self {
            worker_num,
            state: Mutex::new(RendezvousState::default()),
            changed: Condvar::new(),
        }
    }

    pub fn worker_num(&self) -> usize {
        self.worker_num
    }

    fn lock(&self) -> Result<MutexGuard<'_, RendezvousState>> {
        self.state
            .lock()
            .map_err(|_| Error::Sync("rendezvous state poisoned".to_string()))
    }

    fn wait<'a>(
        &self,
        guard: MutexGuard<'a, RendezvousState>,
    ) -> Result<MutexGuard<'a, RendezvousState>> {
        self.changed
            .wait(guard)
            .map_err(|_| Error::Sync("rendezvous state poisoned".to_string()))
    }

    /// Deposits a contribution from a non-root worker and blocks until the
    /// root publishes the merged value of that aggregator and round.
    ///
    /// A second contribution from the same worker for the same aggregator and
    /// round is ignored, though its sender still receives the merged value.
    /// Requests for a round the root has already left fail with
    /// [`Error::StaleRound`], and requests for an aggregator the root failed
    /// to merge fail with [`Error::Sync`].
    pub fn submit(&self, request: AggregatorRequest) -> Result<Vec<u8>> {
        if request.worker_id == 0 || request.worker_id >= self.worker_num {
            return Err(Error::Sync(format!(
                "request from worker {} outside [1, {})",
                request.worker_id, self.worker_num
            )));
        }
        let AggregatorRequest {
            round,
            worker_id,
            name,
            payload,
        } = request;
        let key = (round, name);
        let mut state = self.lock()?;
        if round < state.round {
            return Err(Error::StaleRound {
                round,
                current: state.round,
            });
        }
        if round == state.round && state.collected.contains(&key.1) {
            warn!(
                "ignored late contribution of worker {} to `{}` in round {}",
                worker_id, key.1, round
            );
        } else if let Some(arrived) = state
            .contributions
            .get(&key)
            .filter(|arrived| arrived.contains_key(&worker_id))
        {
            warn!(
                "ignored duplicate contribution of worker {} to `{}` in round {}, {} arrived",
                worker_id,
                key.1,
                round,
                arrived.len()
            );
        } else {
            let arrived = state.contributions.entry(key.clone()).or_default();
            arrived.insert(worker_id, payload);
            debug!(
                "worker {} contributed to `{}` in round {}, {}/{} arrived",
                worker_id,
                key.1,
                round,
                arrived.len(),
                self.worker_num - 1
            );
            self.changed.notify_all();
        }
        loop {
            if let Some(merged) = state.published.get(&key) {
                return Ok(merged.clone());
            }
            if let Some(reason) = state.failed.get(&key) {
                return Err(Error::Sync(format!(
                    "root failed to merge `{}` in round {}: {}",
                    key.1, round, reason
                )));
            }
            if state.round > round {
                return Err(Error::StaleRound {
                    round,
                    current: state.round,
                });
            }
            state = self.wait(state)?;
        }
    }

    /// Blocks until every non-root worker has contributed to `name` in
    /// `round`, then takes the contributions in ascending worker id order.
    pub fn collect(&self, round: u64, name: &str) -> Result<Vec<(WorkerId, Vec<u8>)>> {
        let mut state = self.lock()?;
        if round < state.round {
            return Err(Error::StaleRound {
                round,
                current: state.round,
            });
        }
        if round > state.round {
            state.round = round;
            state.collected.clear();
            // waiters of the previous round may not have woken up yet
            state.published.retain(|(r, _), _| r + 1 >= round);
            state.failed.retain(|(r, _), _| r + 1 >= round);
            let dropped = state.contributions.len();
            state.contributions.retain(|(r, _), _| *r >= round);
            let dropped = dropped - state.contributions.len();
            if dropped > 0 {
                warn!(
                    "dropped contributions to {} aggregators the root never collected",
                    dropped
                );
            }
            self.changed.notify_all();
        }
        let key = (round, name.to_string());
        loop {
            let arrived = state.contributions.get(&key).map_or(0, BTreeMap::len);
            if arrived >= self.worker_num - 1 {
                break;
            }
            state = self.wait(state)?;
        }
        state.collected.insert(key.1.clone());
        let contributions = state.contributions.remove(&key).unwrap_or_default();
        Ok(contributions.into_iter().collect())
    }

    /// Releases every worker waiting on `name` in `round`.
    pub fn publish(&self, round: u64, name: &str, merged: Vec<u8>) -> Result<()> {
        let mut state = self.lock()?;
        state.published.insert((round, name.to_string()), merged);
        self.changed.notify_all();
        Ok(())
    }

    /// Fails every worker waiting on `name` in `round`.
    pub fn fail(&self, round: u64, name: &str, reason: String) -> Result<()> {
        let mut state = self.lock()?;
        state.failed.insert((round, name.to_string()), reason);
        self.changed.notify_all();
        Ok(())
    }
}

/// A client living in the root's process that calls the rendezvous directly.
#[derive(Clone)]
pub struct InProcessClient {
    rendezvous: Arc<AggregatorRendezvous>,
}

impl InProcessClient {
    pub fn new(rendezvous: Arc<AggregatorRendezvous>) -> Self {
        Self { rendezvous }
    }
}

impl AggregatorClient for InProcessClient {
    fn request(&mut self, request: AggregatorRequest) -> Result<Vec<u8>> {
        self.rendezvous.submit(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{from_bytes, to_bytes};
    use std::thread;

    fn request(round: u64, worker_id: WorkerId, name: &str, value: i64) -> AggregatorRequest {
        AggregatorRequest {
            round,
            worker_id,
            name: name.to_string(),
            payload: to_bytes(&value),
        }
    }

    #[test]
    fn test_request_encoding() {
        let req = request(3, 2, "cnt", 7);
        assert_eq!(from_bytes::<AggregatorRequest>(&to_bytes(&req)).unwrap(), req);
        let failed = AggregatorResponse::Failed("boom".to_string());
        assert_eq!(from_bytes::<AggregatorResponse>(&to_bytes(&failed)).unwrap(), failed);
        assert!(from_bytes::<AggregatorResponse>(&[9]).is_err());
    }

    #[test]
    fn test_fan_in() {
        let rendezvous = Arc::new(AggregatorRendezvous::new(3));
        let handles: Vec<_> = [(1, 7), (2, 2)]
            .into_iter()
            .map(|(worker_id, value)| {
                let mut client = InProcessClient::new(rendezvous.clone());
                thread::spawn(move || client.request(request(0, worker_id, "cnt", value)))
            })
            .collect();
        let contributions = rendezvous.collect(0, "cnt").unwrap();
        let ids: Vec<_> = contributions.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![1, 2]);
        let sum: i64 = contributions
            .iter()
            .map(|(_, bytes)| from_bytes::<i64>(bytes).unwrap())
            .sum::<i64>()
            + 5;
        rendezvous.publish(0, "cnt", to_bytes(&sum)).unwrap();
        for handle in handles {
            let merged = handle.join().unwrap().unwrap();
            assert_eq!(from_bytes::<i64>(&merged).unwrap(), 14);
        }
    }

    #[test]
    fn test_duplicate_ignored() {
        let rendezvous = Arc::new(AggregatorRendezvous::new(2));
        let handles: Vec<_> = [4, 40]
            .into_iter()
            .map(|value| {
                let rendezvous = rendezvous.clone();
                thread::spawn(move || rendezvous.submit(request(0, 1, "max", value)))
            })
            .collect();
        let contributions = rendezvous.collect(0, "max").unwrap();
        assert_eq!(contributions.len(), 1);
        let first = contributions[0].1.clone();
        rendezvous.publish(0, "max", first.clone()).unwrap();
        for handle in handles {
            assert_eq!(handle.join().unwrap().unwrap(), first);
        }
    }

    #[test]
    fn test_stale_round_rejected() {
        let rendezvous = AggregatorRendezvous::new(2);
        thread::scope(|s| {
            let waiter = s.spawn(|| rendezvous.submit(request(0, 1, "cnt", 1)));
            rendezvous.collect(0, "cnt").unwrap();
            rendezvous.publish(0, "cnt", to_bytes(&1i64)).unwrap();
            assert!(waiter.join().unwrap().is_ok());
        });
        // a retry within the round is answered with the published value
        let retried = rendezvous.submit(request(0, 1, "cnt", 9)).unwrap();
        assert_eq!(from_bytes::<i64>(&retried).unwrap(), 1);
        thread::scope(|s| {
            let waiter = s.spawn(|| rendezvous.submit(request(1, 1, "cnt", 1)));
            rendezvous.collect(1, "cnt").unwrap();
            rendezvous.publish(1, "cnt", to_bytes(&2i64)).unwrap();
            assert!(waiter.join().unwrap().is_ok());
        });
        assert!(matches!(
            rendezvous.submit(request(0, 1, "other", 1)),
            Err(Error::StaleRound {
                round: 0,
                current: 1
            })
        ));
    }

    #[test]
    fn test_failure_releases_waiters() {
        let rendezvous = AggregatorRendezvous::new(2);
        thread::scope(|s| {
            let waiter = s.spawn(|| rendezvous.submit(request(0, 1, "cnt", 1)));
            rendezvous.collect(0, "cnt").unwrap();
            rendezvous.fail(0, "cnt", "bad payload".to_string()).unwrap();
            assert!(matches!(waiter.join().unwrap(), Err(Error::Sync(_))));
        });
        assert!(rendezvous.submit(request(0, 1, "cnt", 1)).is_err());
    }

    #[test]
    fn test_uncollected_pruned() {
        let rendezvous = AggregatorRendezvous::new(2);
        thread::scope(|s| {
            s.spawn(|| rendezvous.submit(request(0, 1, "orphan", 1)));
            s.spawn(|| rendezvous.submit(request(1, 1, "cnt", 1)));
            while rendezvous.lock().unwrap().contributions.len() < 2 {
                thread::yield_now();
            }
            rendezvous.collect(1, "cnt").unwrap();
            assert!(rendezvous.lock().unwrap().contributions.is_empty());
            rendezvous.publish(1, "cnt", to_bytes(&1i64)).unwrap();
        });
    }

    #[test]
    fn test_unknown_worker() {
        let rendezvous = AggregatorRendezvous::new(2);
        assert!(matches!(
            rendezvous.submit(request(0, 0, "cnt", 1)),
            Err(Error::Sync(_))
        ));
        assert!(rendezvous.submit(request(0, 2, "cnt", 1)).is_err());
    }
}
