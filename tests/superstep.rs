use bspfrag::{
    aggregator::{
        AggregatorManager, AggregatorRendezvous, InProcessClient, LocalCommunicator,
        TcpAggregatorClient, TcpAggregatorServer, Transport,
    },
    config::{TransportKind, WorkerConfig},
    degree::{DegreeReport, DegreeStats, DegreeSummary},
    driver::{Computation, Worker},
    edge::EdgeStrategy,
    fragment::{mm_read_iter, Fragment, FragmentSchema},
    memory_manager::MemoryManager,
    types::{DataKind, Scalar},
    vertex::VertexHandle,
};
use std::{
    path::PathBuf,
    sync::{mpsc, Arc},
    thread,
};
use tempfile::NamedTempFile;

type Part = (Vec<(i64, i64)>, Vec<(i64, i64, i64)>);

/// Two partitions: oids 1 and 2 on worker 0, oids 3 to 5 on worker 1.
fn create_partitions() -> Vec<Part> {
    vec![
        (vec![(1, 1), (2, 0)], vec![(1, 2, 3), (2, 1, 4), (1, 1, 2)]),
        (vec![(3, 3), (4, 0), (5, 0)], vec![(3, 4, -1)]),
    ]
}

fn write_fragment(vdata: DataKind, (vertices, edges): Part) -> NamedTempFile {
    let file = NamedTempFile::new().unwrap();
    let mut mm = MemoryManager::new_mmap_mut(file.path(), 0).unwrap();
    let value = |v: i64| match vdata {
        DataKind::Float64 => Scalar::Float64(v as f64),
        _ => Scalar::Int64(v),
    };
    mm_read_iter(
        &mut mm,
        FragmentSchema::new(DataKind::Int64, vdata, DataKind::Int64),
        vertices
            .into_iter()
            .map(|(oid, v)| (Scalar::Int64(oid), value(v)))
            .collect::<Vec<_>>(),
        edges
            .into_iter()
            .map(|(s, d, w)| (Scalar::Int64(s), Scalar::Int64(d), Scalar::Int64(w)))
            .collect::<Vec<_>>(),
    )
    .unwrap();
    file
}

fn create_transports(kind: TransportKind, tcp: bool) -> (Vec<Transport>, Option<TcpAggregatorServer>) {
    match kind {
        TransportKind::Direct => (
            LocalCommunicator::mesh(2)
                .into_iter()
                .map(|comm| Transport::Direct(Box::new(comm)))
                .collect(),
            None,
        ),
        TransportKind::Messaging => {
            let rendezvous = Arc::new(AggregatorRendezvous::new(2));
            if tcp {
                let server = TcpAggregatorServer::bind("127.0.0.1:0", rendezvous.clone()).unwrap();
                let client = TcpAggregatorClient::connect(server.local_addr()).unwrap();
                (
                    vec![Transport::Root(rendezvous), Transport::Client(Box::new(client))],
                    Some(server),
                )
            } else {
                let client = InProcessClient::new(rendezvous.clone());
                (
                    vec![Transport::Root(rendezvous), Transport::Client(Box::new(client))],
                    None,
                )
            }
        }
    }
}

/// Counts every vertex value down to zero, one step per superstep.
struct Countdown;

impl Computation for Countdown {
    type Id = i64;
    type Value = i64;
    type EdgeValue = i64;

    fn compute<F: Fragment>(
        &mut self,
        _superstep: u64,
        vertex: &mut VertexHandle<'_, '_, F, i64, i64, i64>,
        _aggregators: &mut AggregatorManager,
    ) {
        if vertex.value() == 0 {
            vertex.vote_to_halt();
        } else {
            vertex.set_value(vertex.value() - 1);
        }
    }
}

fn run_degree(
    kind: TransportKind,
    tcp: bool,
    strategy: EdgeStrategy,
) -> (Vec<(u64, Vec<f64>)>, Vec<DegreeSummary>) {
    let files: Vec<_> = create_partitions()
        .into_iter()
        .map(|part| write_fragment(DataKind::Float64, part))
        .collect();
    let (transports, _server) = create_transports(kind, tcp);
    let (sender, receiver) = mpsc::channel();
    let handles: Vec<_> = files
        .iter()
        .map(|file| file.path().to_path_buf())
        .zip(transports)
        .enumerate()
        .map(|(worker_id, (path, transport)): (usize, (PathBuf, Transport))| {
            let config = WorkerConfig::new(worker_id, 2)
                .transport(kind)
                .edge_strategy(strategy);
            let report = config.is_root().then(|| DegreeReport::new(sender.clone()));
            thread::spawn(move || {
                let fragment = config.open_fragment(&path).unwrap();
                let aggregators = AggregatorManager::new(worker_id, 2, transport);
                let mut worker = Worker::new(&fragment, &config, aggregators, DegreeStats).unwrap();
                if let Some(report) = report {
                    worker = worker.with_master(Box::new(report));
                }
                let supersteps = worker.run().unwrap();
                (supersteps, worker.values().to_vec())
            })
        })
        .collect();
    drop(sender);
    let results = handles.into_iter().map(|h| h.join().unwrap()).collect();
    (results, receiver.into_iter().collect())
}

#[test]
fn test_degree_over_workers() {
    let expected_summary = DegreeSummary {
        vertices: 5,
        edges: 4,
        isolated: 2,
        max_degree: 2,
        weight: 8,
        positive: false,
    };
    for (kind, tcp) in [
        (TransportKind::Direct, false),
        (TransportKind::Messaging, false),
        (TransportKind::Messaging, true),
    ] {
        for strategy in [EdgeStrategy::Eager, EdgeStrategy::Streaming, EdgeStrategy::Pointer] {
            let (results, summaries) = run_degree(kind, tcp, strategy);
            assert_eq!(
                results,
                vec![(1, vec![5.0, 4.0]), (1, vec![-1.0, 0.0, 0.0])],
                "{} tcp {} {}",
                kind,
                tcp,
                strategy
            );
            assert_eq!(summaries, vec![expected_summary]);
        }
    }
}

#[test]
fn test_workers_stop_together() {
    let files: Vec<_> = create_partitions()
        .into_iter()
        .map(|part| write_fragment(DataKind::Int64, part))
        .collect();
    for kind in [TransportKind::Direct, TransportKind::Messaging] {
        let (transports, _server) = create_transports(kind, false);
        let handles: Vec<_> = files
            .iter()
            .map(|file| file.path().to_path_buf())
            .zip(transports)
            .enumerate()
            .map(|(worker_id, (path, transport))| {
                thread::spawn(move || {
                    let config = WorkerConfig::new(worker_id, 2).transport(kind).use_mmap(false);
                    let fragment = config.open_fragment(&path).unwrap();
                    let aggregators = AggregatorManager::new(worker_id, 2, transport);
                    let mut worker = Worker::new(&fragment, &config, aggregators, Countdown).unwrap();
                    let supersteps = worker.run().unwrap();
                    assert_eq!(worker.halt_state().active(), 0);
                    (supersteps, worker.values().to_vec())
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        // worker 0 halts locally after 2 supersteps but waits for worker 1
        assert_eq!(results, vec![(4, vec![0, 0]), (4, vec![0, 0, 0])], "{}", kind);
    }
}
