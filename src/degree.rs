//! Out-degree statistics, the computation behind `bspfrag run`.

use crate::{
    aggregator::{AggregatorManager, BooleanAnd, Max, Sum},
    driver::{Computation, MasterCompute},
    fragment::Fragment,
    vertex::VertexHandle,
};
use derive_more::Display;
use log::{info, warn};
use std::sync::mpsc::Sender;

const VERTICES: &str = "vertices";
const EDGES: &str = "edges";
const ISOLATED: &str = "isolated";
const MAX_DEGREE: &str = "max_degree";
const WEIGHT: &str = "weight";
const POSITIVE: &str = "positive_weights";

/// Sets every vertex value to the summed weight of its out-edges and
/// aggregates degree counters over all workers.
#[derive(Debug, Default)]
pub struct DegreeStats;

impl Computation for DegreeStats {
    type Id = i64;
    type Value = f64;
    type EdgeValue = i64;

    fn register(&mut self, aggregators: &mut AggregatorManager) {
        aggregators.register_aggregator(VERTICES, Sum::<i64>::new(), false);
        aggregators.register_aggregator(EDGES, Sum::<i64>::new(), false);
        aggregators.register_aggregator(ISOLATED, Sum::<i64>::new(), false);
        aggregators.register_aggregator(MAX_DEGREE, Max::<i64>::new(), false);
        aggregators.register_aggregator(WEIGHT, Sum::<i64>::new(), false);
        aggregators.register_aggregator(POSITIVE, BooleanAnd, false);
    }

    fn compute<F: Fragment>(
        &mut self,
        _superstep: u64,
        vertex: &mut VertexHandle<'_, '_, F, i64, f64, i64>,
        aggregators: &mut AggregatorManager,
    ) {
        let degree = vertex.num_edges() as i64;
        let (mut weight, mut positive) = (0i64, true);
        let mut edges = vertex.edges();
        while let Some(edge) = edges.next_edge() {
            weight = weight.wrapping_add(edge.value());
            positive &= edge.value() > 0;
        }
        vertex.set_value(weight as f64);
        aggregators.aggregate(VERTICES, 1i64);
        aggregators.aggregate(EDGES, degree);
        aggregators.aggregate(ISOLATED, (degree == 0) as i64);
        aggregators.aggregate(MAX_DEGREE, degree);
        aggregators.aggregate(WEIGHT, weight);
        aggregators.aggregate(POSITIVE, positive);
        vertex.vote_to_halt();
    }
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
#[display(
    fmt = "vertices: {}, edges: {}, isolated: {}, max degree: {}, total weight: {}, positive weights: {}",
    vertices,
    edges,
    isolated,
    max_degree,
    weight,
    positive
)]
pub struct DegreeSummary {
    pub vertices: i64,
    pub edges: i64,
    pub isolated: i64,
    pub max_degree: i64,
    pub weight: i64,
    pub positive: bool,
}

impl DegreeSummary {
    fn read(aggregators: &AggregatorManager) -> Option<Self> {
        Some(Self {
            vertices: aggregators.get_aggregated_value(VERTICES)?,
            edges: aggregators.get_aggregated_value(EDGES)?,
            isolated: aggregators.get_aggregated_value(ISOLATED)?,
            max_degree: aggregators.get_aggregated_value(MAX_DEGREE)?,
            weight: aggregators.get_aggregated_value(WEIGHT)?,
            positive: aggregators.get_aggregated_value(POSITIVE)?,
        })
    }
}

/// Reports the merged statistics of every superstep to a channel.
pub struct DegreeReport {
    sender: Sender<DegreeSummary>,
}

impl DegreeReport {
    pub fn new(sender: Sender<DegreeSummary>) -> Self {
        Self { sender }
    }
}

impl MasterCompute for DegreeReport {
    fn compute(&mut self, superstep: u64, aggregators: &mut AggregatorManager) {
        match DegreeSummary::read(aggregators) {
            Some(summary) if summary.vertices > 0 => {
                info!("superstep {}: {}", superstep, summary);
                if self.sender.send(summary).is_err() {
                    warn!("degree summary of superstep {} dropped", superstep);
                }
            }
            Some(_) => (),
            None => warn!("degree aggregators are not registered"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::WorkerConfig,
        driver::Worker,
        edge::EdgeStrategy,
        fragment::{mm_read_iter, ColumnarFragment, FragmentSchema},
        memory_manager::MemoryManager,
        types::{DataKind, Scalar},
    };
    use std::sync::mpsc;

    #[test]
    fn test_single_worker() {
        let mut mm = MemoryManager::Mem(vec![]);
        mm_read_iter(
            &mut mm,
            FragmentSchema::new(DataKind::Int64, DataKind::Float64, DataKind::Int64),
            (0..3).map(|i| (Scalar::Int64(i), Scalar::Float64(0.0))),
            vec![(0, 1, 4), (0, 2, 6), (1, 2, -1)]
                .into_iter()
                .map(|(s, d, w)| (Scalar::Int64(s), Scalar::Int64(d), Scalar::Int64(w))),
        )
        .unwrap();
        let fragment = ColumnarFragment::new(mm).unwrap();
        let (sender, receiver) = mpsc::channel();
        let config = WorkerConfig::new(0, 1).edge_strategy(EdgeStrategy::Streaming);
        let mut worker = Worker::new(&fragment, &config, AggregatorManager::single(), DegreeStats)
            .unwrap()
            .with_master(Box::new(DegreeReport::new(sender)));
        assert_eq!(worker.run().unwrap(), 1);
        assert_eq!(worker.values(), &[10.0, -1.0, 0.0]);
        assert_eq!(
            receiver.try_recv().unwrap(),
            DegreeSummary {
                vertices: 3,
                edges: 3,
                isolated: 1,
                max_degree: 2,
                weight: 9,
                positive: false,
            }
        );
    }
}
