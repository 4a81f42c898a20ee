//! A superstep driver for one worker.
//!
//! Every superstep resets the transient aggregators, runs the computation on
//! each vertex that has not voted to halt, then merges aggregators across
//! workers. The run ends once no vertex on any worker is active, which is
//! decided through the [`ACTIVE_VERTICES`] aggregator so that every worker
//! stops after the same superstep.

use crate::{
    aggregator::{AggregatorManager, Sum},
    config::WorkerConfig,
    edge::EdgeManager,
    error::{Error, Result},
    fragment::Fragment,
    types::{check_lid, Lid, NativeScalar},
    vertex::{ComputeContext, VertexDataManager, VertexHandle, VertexIdManager},
};
use log::{debug, info};

/// The reserved aggregator counting vertices still active after a superstep.
pub const ACTIVE_VERTICES: &str = "__active_vertices";

/// Halt flags of every lid of one fragment.
#[derive(Debug, Clone)]
pub struct HaltState {
    halted: Vec<bool>,
    active: usize,
}

impl HaltState {
    /// All vertices start active.
    pub fn new(vertex_num: usize) -> Self {
        Self {
            halted: vec![false; vertex_num],
            active: vertex_num,
        }
    }

    pub fn active(&self) -> usize {
        self.active
    }
}

impl ComputeContext for HaltState {
    fn vote_to_halt(&mut self, lid: Lid) {
        check_lid(lid, self.halted.len());
        if !self.halted[lid] {
            self.halted[lid] = true;
            self.active -= 1;
        }
    }

    fn wake_up(&mut self, lid: Lid) {
        check_lid(lid, self.halted.len());
        if self.halted[lid] {
            self.halted[lid] = false;
            self.active += 1;
        }
    }

    fn is_halted(&self, lid: Lid) -> bool {
        check_lid(lid, self.halted.len());
        self.halted[lid]
    }
}

/// A vertex program.
pub trait Computation {
    type Id: NativeScalar;
    type Value: NativeScalar;
    type EdgeValue: NativeScalar;

    /// Registers the aggregators the program uses. Called once before the
    /// first superstep.
    fn register(&mut self, _aggregators: &mut AggregatorManager) {}

    fn compute<F: Fragment>(
        &mut self,
        superstep: u64,
        vertex: &mut VertexHandle<'_, '_, F, Self::Id, Self::Value, Self::EdgeValue>,
        aggregators: &mut AggregatorManager,
    );
}

/// Runs on worker 0 after each superstep, seeing the merged aggregators.
pub trait MasterCompute {
    fn compute(&mut self, superstep: u64, aggregators: &mut AggregatorManager);
}

pub struct Worker<'f, F: Fragment, C: Computation> {
    ids: VertexIdManager<C::Id>,
    data: VertexDataManager<C::Value>,
    edges: EdgeManager<'f, F, C::Id, C::EdgeValue>,
    halt: HaltState,
    aggregators: AggregatorManager,
    computation: C,
    master: Option<Box<dyn MasterCompute + Send>>,
    max_supersteps: Option<u64>,
}

impl<'f, F, C> Worker<'f, F, C>
where
    F: Fragment + Sync,
    C: Computation,
{
    pub fn new(
        fragment: &'f F,
        config: &WorkerConfig,
        mut aggregators: AggregatorManager,
        mut computation: C,
    ) -> Result<Self> {
        config.validate()?;
        if aggregators.worker_id() != config.worker_id || aggregators.worker_num() != config.worker_num {
            return Err(Error::InvalidConfig(format!(
                "aggregators of worker {}/{} given to worker {}/{}",
                aggregators.worker_id(),
                aggregators.worker_num(),
                config.worker_id,
                config.worker_num
            )));
        }
        if !aggregators.register_aggregator(ACTIVE_VERTICES, Sum::<i64>::new(), false) {
            return Err(Error::InvalidConfig(format!(
                "aggregator name `{}` is reserved",
                ACTIVE_VERTICES
            )));
        }
        computation.register(&mut aggregators);
        let ids = VertexIdManager::new(fragment)?;
        let data = VertexDataManager::new(fragment)?;
        let edges = EdgeManager::new(fragment, config.edge_strategy)?;
        info!(
            "worker {} ready: {} vertices, {} edges, {} strategy",
            config.worker_id,
            ids.vertex_num(),
            edges.total_edges(),
            edges.strategy()
        );
        Ok(Self {
            halt: HaltState::new(ids.vertex_num()),
            ids,
            data,
            edges,
            aggregators,
            computation,
            master: None,
            max_supersteps: config.max_supersteps,
        })
    }

    pub fn with_master(mut self, master: Box<dyn MasterCompute + Send>) -> Self {
        self.master = Some(master);
        self
    }

    /// Runs supersteps until every vertex has halted, returning how many
    /// supersteps ran.
    pub fn run(&mut self) -> Result<u64> {
        loop {
            let superstep = self.aggregators.superstep();
            if self.max_supersteps.map_or(false, |max| superstep >= max) {
                info!("stopping at the superstep limit {}", superstep);
                return Ok(superstep);
            }
            let active = self.superstep(superstep)?;
            if active == 0 {
                info!(
                    "worker {} finished after {} supersteps",
                    self.aggregators.worker_id(),
                    superstep + 1
                );
                return Ok(superstep + 1);
            }
        }
    }

    /// Runs one superstep and returns the number of vertices still active
    /// on all workers.
    fn superstep(&mut self, superstep: u64) -> Result<i64> {
        let Self {
            ids,
            data,
            edges,
            halt,
            aggregators,
            computation,
            master,
            ..
        } = self;
        aggregators.pre_superstep();
        let mut computed = 0;
        if ids.vertex_num() > 0 {
            let mut vertex = VertexHandle::new(0, ids, data, edges, halt);
            for lid in 0..ids.vertex_num() {
                vertex.rebind(lid);
                if vertex.is_halted() {
                    continue;
                }
                computation.compute(superstep, &mut vertex, aggregators);
                computed += 1;
            }
        }
        aggregators.aggregate(ACTIVE_VERTICES, halt.active() as i64);
        debug!(
            "superstep {}: computed {} vertices, {} still active",
            superstep,
            computed,
            halt.active()
        );
        aggregators.post_superstep()?;
        let active = aggregators
            .get_aggregated_value::<i64>(ACTIVE_VERTICES)
            .unwrap_or(0);
        if aggregators.worker_id() == 0 {
            if let Some(master) = master.as_mut() {
                master.compute(superstep, aggregators);
            }
        }
        aggregators.post_master_compute();
        info!("superstep {} done, {} vertices active", superstep, active);
        Ok(active)
    }

    pub fn ids(&self) -> &[C::Id] {
        self.ids.ids()
    }

    pub fn values(&self) -> &[C::Value] {
        self.data.values()
    }

    pub fn halt_state(&self) -> &HaltState {
        &self.halt
    }

    pub fn aggregators(&self) -> &AggregatorManager {
        &self.aggregators
    }

    pub fn into_parts(self) -> (VertexDataManager<C::Value>, AggregatorManager) {
        (self.data, self.aggregators)
    }
}
