//! Named aggregators and their per-superstep synchronization.
//!
//! Each worker owns one [`AggregatorManager`]. During a superstep values are
//! folded locally; [`AggregatorManager::post_superstep`] then merges the
//! partial values of all workers on worker 0 and hands the merged value back
//! to everyone, either over a [`Communicator`] or through request/response
//! messaging.

pub use messaging::{
    AggregatorClient, AggregatorRendezvous, AggregatorRequest, AggregatorResponse, InProcessClient,
};
pub use reduce::{BooleanAnd, BooleanOr, Max, Min, Overwrite, ReduceOp, Sum};
pub use tcp::{TcpAggregatorClient, TcpAggregatorServer};
pub use transport::{Communicator, LocalCommunicator};

use crate::{
    archive::{from_bytes, InArchive, OutArchive},
    error::{Error, Result},
    types::WorkerId,
};
use log::{debug, error, info, warn};
use std::{any::Any, collections::BTreeMap, sync::Arc};

mod messaging;
mod reduce;
mod tcp;
mod transport;

const ROOT: WorkerId = 0;

/// A registered aggregator with its value type erased.
trait Slot: Send {
    fn persistent(&self) -> bool;

    fn reset(&mut self);

    /// Folds `value` in; `false` if it is not of the aggregator's type.
    fn aggregate(&mut self, value: &dyn Any) -> bool;

    fn value(&self) -> &dyn Any;

    fn set(&mut self, value: &dyn Any) -> bool;

    /// Encodes what this worker folded in since the last merge.
    fn encode(&self, out: &mut OutArchive);

    /// Folds encoded contributions, in the given order, into the merged
    /// value of the last round.
    fn merge(&self, contributions: &[&[u8]], out: &mut OutArchive) -> Result<()>;

    /// Adopts a merged value.
    fn decode_into(&mut self, bytes: &[u8]) -> Result<()>;

    /// Adopts the local value as merged, for runs without peers.
    fn commit(&mut self);
}

struct Aggregator<R: ReduceOp> {
    op: R,
    /// The merged value of the last round; the identity unless persistent.
    base: R::Value,
    /// What was folded in since the last merge.
    local: R::Value,
    touched: bool,
    value: R::Value,
    persistent: bool,
}

impl<R: ReduceOp> Aggregator<R> {
    fn new(op: R, persistent: bool) -> Self {
        Self {
            base: op.identity(),
            local: op.identity(),
            touched: false,
            value: op.identity(),
            op,
            persistent,
        }
    }

    fn fold(&self, acc: &mut R::Value, value: R::Value) {
        let prev = std::mem::replace(acc, self.op.identity());
        *acc = self.op.fold(prev, value);
    }

    fn adopt(&mut self, merged: R::Value) {
        self.base = if self.persistent {
            merged.clone()
        } else {
            self.op.identity()
        };
        self.value = merged;
        self.local = self.op.identity();
        self.touched = false;
    }
}

impl<R: ReduceOp> Slot for Aggregator<R> {
    fn persistent(&self) -> bool {
        self.persistent
    }

    fn reset(&mut self) {
        self.adopt(self.op.identity());
    }

    fn aggregate(&mut self, value: &dyn Any) -> bool {
        match value.downcast_ref::<R::Value>() {
            Some(value) => {
                let (mut acc, mut local) = (
                    std::mem::replace(&mut self.value, self.op.identity()),
                    std::mem::replace(&mut self.local, self.op.identity()),
                );
                self.fold(&mut acc, value.clone());
                self.fold(&mut local, value.clone());
                self.value = acc;
                self.local = local;
                self.touched = true;
                true
            }
            None => false,
        }
    }

    fn value(&self) -> &dyn Any {
        &self.value
    }

    fn set(&mut self, value: &dyn Any) -> bool {
        match value.downcast_ref::<R::Value>() {
            Some(value) if self.persistent => {
                self.adopt(value.clone());
                true
            }
            Some(value) => {
                self.value = value.clone();
                self.local = value.clone();
                self.touched = true;
                true
            }
            None => false,
        }
    }

    fn encode(&self, out: &mut OutArchive) {
        out.write(&self.touched);
        if self.touched {
            out.write(&self.local);
        }
    }

    fn merge(&self, contributions: &[&[u8]], out: &mut OutArchive) -> Result<()> {
        let mut acc = self.base.clone();
        for bytes in contributions {
            let mut input = InArchive::new(bytes);
            if input.read::<bool>()? {
                let value = input.read()?;
                self.fold(&mut acc, value);
            }
            input.finish()?;
        }
        out.write(&acc);
        Ok(())
    }

    fn decode_into(&mut self, bytes: &[u8]) -> Result<()> {
        self.adopt(from_bytes(bytes)?);
        Ok(())
    }

    fn commit(&mut self) {
        let value = self.value.clone();
        self.adopt(value);
    }
}

/// How partial values travel between workers.
pub enum Transport {
    /// Single worker; nothing to exchange.
    None,
    /// Point-to-point messages to and from worker 0.
    Direct(Box<dyn Communicator>),
    /// Worker 0 answering requests through its rendezvous.
    Root(Arc<AggregatorRendezvous>),
    /// A non-root worker sending requests to worker 0.
    Client(Box<dyn AggregatorClient>),
}

impl Transport {
    fn name(&self) -> &'static str {
        match self {
            Transport::None => "none",
            Transport::Direct(_) => "direct",
            Transport::Root(_) => "messaging root",
            Transport::Client(_) => "messaging client",
        }
    }
}

pub struct AggregatorManager {
    worker_id: WorkerId,
    worker_num: usize,
    superstep: u64,
    aggregators: BTreeMap<String, Box<dyn Slot>>,
    transport: Transport,
    scratch: OutArchive,
}

impl AggregatorManager {
    pub fn new(worker_id: WorkerId, worker_num: usize, transport: Transport) -> Self {
        info!(
            "worker {}/{} synchronizes aggregators over {}",
            worker_id,
            worker_num,
            transport.name()
        );
        Self {
            worker_id,
            worker_num,
            superstep: 0,
            aggregators: BTreeMap::new(),
            transport,
            scratch: OutArchive::new(),
        }
    }

    /// A manager for a run with one worker.
    pub fn single() -> Self {
        Self::new(ROOT, 1, Transport::None)
    }

    pub fn worker_id(&self) -> WorkerId {
        self.worker_id
    }

    pub fn worker_num(&self) -> usize {
        self.worker_num
    }

    /// Returns the number of completed synchronization rounds.
    pub fn superstep(&self) -> u64 {
        self.superstep
    }

    /// Registers `name` with the identity of `op` as its value.
    ///
    /// Returns `false` and leaves the existing aggregator untouched if
    /// `name` is already registered.
    pub fn register_aggregator<R: ReduceOp>(&mut self, name: &str, op: R, persistent: bool) -> bool {
        if self.aggregators.contains_key(name) {
            warn!("aggregator `{}` is already registered", name);
            return false;
        }
        self.aggregators
            .insert(name.to_string(), Box::new(Aggregator::new(op, persistent)));
        true
    }

    pub fn register_persistent_aggregator<R: ReduceOp>(&mut self, name: &str, op: R) -> bool {
        self.register_aggregator(name, op, true)
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.aggregators.contains_key(name)
    }

    pub fn aggregator_names(&self) -> impl Iterator<Item = &str> {
        self.aggregators.keys().map(String::as_str)
    }

    fn reset_transient(&mut self) {
        self.aggregators
            .values_mut()
            .filter(|slot| !slot.persistent())
            .for_each(|slot| slot.reset());
    }

    /// Resets every non-persistent aggregator to its identity.
    pub fn pre_superstep(&mut self) {
        self.reset_transient();
    }

    /// Folds `value` into the local value of `name`.
    ///
    /// Unregistered names and values of the wrong type are logged and
    /// ignored.
    pub fn aggregate<T: Any>(&mut self, name: &str, value: T) {
        match self.aggregators.get_mut(name) {
            Some(slot) => {
                if !slot.aggregate(&value) {
                    warn!(
                        "value of type {} does not fit aggregator `{}`",
                        std::any::type_name::<T>(),
                        name
                    );
                }
            }
            None => warn!("aggregate on unregistered aggregator `{}`", name),
        }
    }

    /// Returns the current value of `name`, or `None` if it is unregistered
    /// or not of type `T`.
    pub fn get_aggregated_value<T: Any + Clone>(&self, name: &str) -> Option<T> {
        let slot = match self.aggregators.get(name) {
            Some(slot) => slot,
            None => {
                warn!("read of unregistered aggregator `{}`", name);
                return None;
            }
        };
        let value = slot.value().downcast_ref::<T>().cloned();
        if value.is_none() {
            warn!(
                "aggregator `{}` does not hold a {}",
                name,
                std::any::type_name::<T>()
            );
        }
        value
    }

    /// Replaces the current value of `name`; `false` if unregistered or of
    /// the wrong type.
    pub fn set_aggregated_value<T: Any>(&mut self, name: &str, value: T) -> bool {
        match self.aggregators.get_mut(name) {
            Some(slot) => slot.set(&value),
            None => {
                warn!("write of unregistered aggregator `{}`", name);
                false
            }
        }
    }

    /// Merges the values of every aggregator across all workers.
    ///
    /// Blocks until the round is complete on this worker. Aggregators are
    /// synchronized in name order, so every worker must have registered the
    /// same names. Any transport or decoding failure is returned as
    /// [`Error::Sync`].
    pub fn post_superstep(&mut self) -> Result<()> {
        let round = self.superstep;
        if self.worker_num > 1 {
            let Self {
                worker_id,
                worker_num,
                aggregators,
                transport,
                scratch,
                ..
            } = self;
            for (name, slot) in aggregators.iter_mut() {
                sync_one(*worker_id, *worker_num, round, name, slot.as_mut(), transport, scratch)
                    .map_err(|e| {
                        error!(
                            "worker {} failed to synchronize `{}` in superstep {}: {}",
                            worker_id, name, round, e
                        );
                        match e {
                            Error::Sync(_) => e,
                            e => Error::Sync(format!("`{}` in superstep {}: {}", name, round, e)),
                        }
                    })?;
            }
            debug!(
                "worker {} synchronized {} aggregators in superstep {}",
                worker_id,
                aggregators.len(),
                round
            );
        } else {
            self.aggregators.values_mut().for_each(|slot| slot.commit());
        }
        self.superstep += 1;
        Ok(())
    }

    /// Resets every non-persistent aggregator after the master phase.
    pub fn post_master_compute(&mut self) {
        self.reset_transient();
    }
}

fn sync_one(
    worker_id: WorkerId,
    worker_num: usize,
    round: u64,
    name: &str,
    slot: &mut dyn Slot,
    transport: &mut Transport,
    scratch: &mut OutArchive,
) -> Result<()> {
    scratch.clear();
    match transport {
        Transport::None => Err(Error::Sync(format!(
            "{} workers but no transport",
            worker_num
        ))),
        Transport::Direct(comm) if worker_id == ROOT => {
            slot.encode(scratch);
            let mut contributions = vec![scratch.as_slice().to_vec()];
            for peer in 1..worker_num {
                contributions.push(comm.receive_from(peer)?);
            }
            let merged = merge(slot, &contributions)?;
            for peer in 1..worker_num {
                comm.send_to(peer, &merged)?;
            }
            slot.decode_into(&merged)
        }
        Transport::Direct(comm) => {
            slot.encode(scratch);
            comm.send_to(ROOT, scratch.as_slice())?;
            let merged = comm.receive_from(ROOT)?;
            slot.decode_into(&merged)
        }
        Transport::Root(rendezvous) => {
            slot.encode(scratch);
            let mut contributions = vec![scratch.as_slice().to_vec()];
            contributions.extend(
                rendezvous
                    .collect(round, name)?
                    .into_iter()
                    .map(|(_, bytes)| bytes),
            );
            match merge(slot, &contributions) {
                Ok(merged) => {
                    rendezvous.publish(round, name, merged.clone())?;
                    slot.decode_into(&merged)
                }
                Err(e) => {
                    // release the waiting workers before giving up
                    rendezvous.fail(round, name, e.to_string())?;
                    Err(e)
                }
            }
        }
        Transport::Client(client) => {
            slot.encode(scratch);
            let merged = client.request(AggregatorRequest {
                round,
                worker_id,
                name: name.to_string(),
                payload: scratch.as_slice().to_vec(),
            })?;
            slot.decode_into(&merged)
        }
    }
}

/// Folds contributions that are already in ascending worker id order.
fn merge(slot: &dyn Slot, contributions: &[Vec<u8>]) -> Result<Vec<u8>> {
    let slices: Vec<&[u8]> = contributions.iter().map(Vec::as_slice).collect();
    let mut out = OutArchive::new();
    slot.merge(&slices, &mut out)?;
    Ok(out.into_vec())
}
