use bspfrag::{
    aggregator::{
        AggregatorManager, AggregatorRendezvous, InProcessClient, LocalCommunicator,
        TcpAggregatorClient, TcpAggregatorServer, Transport,
    },
    config::{TransportKind, WorkerConfig},
    degree::{DegreeReport, DegreeStats},
    driver::Worker,
    edge::EdgeStrategy,
    fragment::{mm_read_iter, ColumnarFragment, FragmentSchema},
    memory_manager::MemoryManager,
    types::{DataKind, Scalar},
};
use clap::{
    crate_authors, crate_description, crate_name, crate_version, App, AppSettings, Arg, ArgMatches,
    SubCommand,
};
use derive_more::Display;
use log::info;
use std::{
    error::Error,
    fs::File,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
    sync::{mpsc, Arc},
    thread,
};

#[derive(Debug, Display)]
enum Err {
    #[display(fmt = "missing argument {}", _0)]
    MissingArgument(&'static str),
    #[display(fmt = "{}:{}: {}", _0, _1, _2)]
    Parse(String, usize, String),
    #[display(fmt = "worker {} panicked", _0)]
    WorkerPanicked(usize),
}

impl std::error::Error for Err {}

fn value_of<'a>(matches: &'a ArgMatches, name: &'static str) -> Result<&'a str, Err> {
    matches.value_of(name).ok_or(Err::MissingArgument(name))
}

fn parse_value<T: std::str::FromStr<Err = String>>(
    matches: &ArgMatches,
    name: &'static str,
) -> Result<T, Box<dyn Error>> {
    Ok(value_of(matches, name)?.parse::<T>()?)
}

/// Reads tab-separated lines, skipping blank lines and `#` comments.
fn read_tsv<T, P, F>(path: P, parse: F) -> Result<Vec<T>, Box<dyn Error>>
where
    P: AsRef<Path>,
    F: Fn(&[&str]) -> Result<T, String>,
{
    let name = path.as_ref().display().to_string();
    let mut rows = Vec::new();
    for (i, line) in BufReader::new(File::open(&path)?).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').map(str::trim).collect();
        rows.push(parse(&fields).map_err(|e| Err::Parse(name.clone(), i + 1, e))?);
    }
    Ok(rows)
}

fn field<'a>(fields: &[&'a str], index: usize) -> Result<&'a str, String> {
    fields
        .get(index)
        .copied()
        .ok_or_else(|| format!("expected at least {} fields", index + 1))
}

fn handle_createfrag(matches: &ArgMatches) -> Result<(), Box<dyn Error>> {
    let schema = FragmentSchema::new(
        parse_value(matches, "oid-kind")?,
        parse_value(matches, "vdata-kind")?,
        parse_value(matches, "edata-kind")?,
    );
    let vertices = read_tsv(value_of(matches, "VERTICES")?, |fields: &[&str]| {
        let vdata = match schema.vdata {
            DataKind::Empty => Scalar::Empty,
            kind => Scalar::parse(kind, field(fields, 1)?)?,
        };
        Ok((Scalar::parse(schema.oid, field(fields, 0)?)?, vdata))
    })?;
    let edges = read_tsv(value_of(matches, "EDGES")?, |fields: &[&str]| {
        let edata = match schema.edata {
            DataKind::Empty => Scalar::Empty,
            kind => Scalar::parse(kind, field(fields, 2)?)?,
        };
        Ok((
            Scalar::parse(schema.oid, field(fields, 0)?)?,
            Scalar::parse(schema.oid, field(fields, 1)?)?,
            edata,
        ))
    })?;
    let mut mm = MemoryManager::new_mmap_mut(value_of(matches, "FRAGMENT")?, 0)?;
    mm_read_iter(&mut mm, schema, vertices, edges)?;
    Ok(())
}

fn handle_fraginfo(matches: &ArgMatches) -> Result<(), Box<dyn Error>> {
    let fragment = ColumnarFragment::open(value_of(matches, "FRAGMENT")?)?;
    println!("{}", fragment.info());
    if matches.is_present("display") {
        println!("{}", fragment);
    }
    Ok(())
}

/// Creates one transport per worker, plus the server that must outlive the
/// run when messaging goes over TCP.
fn create_transports(
    worker_num: usize,
    kind: TransportKind,
    tcp: bool,
) -> Result<(Vec<Transport>, Option<TcpAggregatorServer>), Box<dyn Error>> {
    if worker_num == 1 {
        return Ok((vec![Transport::None], None));
    }
    match kind {
        TransportKind::Direct => Ok((
            LocalCommunicator::mesh(worker_num)
                .into_iter()
                .map(|comm| Transport::Direct(Box::new(comm)))
                .collect(),
            None,
        )),
        TransportKind::Messaging => {
            let rendezvous = Arc::new(AggregatorRendezvous::new(worker_num));
            let server = if tcp {
                Some(TcpAggregatorServer::bind("127.0.0.1:0", rendezvous.clone())?)
            } else {
                None
            };
            let mut transports = vec![Transport::Root(rendezvous.clone())];
            for _ in 1..worker_num {
                transports.push(match &server {
                    Some(server) => {
                        Transport::Client(Box::new(TcpAggregatorClient::connect(server.local_addr())?))
                    }
                    None => Transport::Client(Box::new(InProcessClient::new(rendezvous.clone()))),
                });
            }
            Ok((transports, server))
        }
    }
}

fn run_worker(
    config: WorkerConfig,
    path: PathBuf,
    transport: Transport,
    report: Option<DegreeReport>,
) -> bspfrag::error::Result<u64> {
    let fragment = config.open_fragment(&path)?;
    let aggregators = AggregatorManager::new(config.worker_id, config.worker_num, transport);
    let mut worker = Worker::new(&fragment, &config, aggregators, DegreeStats)?;
    if let Some(report) = report {
        worker = worker.with_master(Box::new(report));
    }
    worker.run()
}

fn handle_run(matches: &ArgMatches) -> Result<(), Box<dyn Error>> {
    let paths: Vec<PathBuf> = matches
        .values_of("FRAGMENT")
        .ok_or(Err::MissingArgument("FRAGMENT"))?
        .map(PathBuf::from)
        .collect();
    let worker_num = paths.len();
    let strategy: EdgeStrategy = parse_value(matches, "strategy")?;
    let kind: TransportKind = parse_value(matches, "transport")?;
    let max_supersteps = match matches.value_of("max-supersteps") {
        Some(max) => Some(max.parse::<u64>()?),
        None => None,
    };
    let (transports, _server) = create_transports(worker_num, kind, matches.is_present("tcp"))?;
    let (sender, receiver) = mpsc::channel();
    let handles: Vec<_> = paths
        .into_iter()
        .zip(transports)
        .enumerate()
        .map(|(worker_id, (path, transport))| {
            let mut config = WorkerConfig::new(worker_id, worker_num)
                .transport(kind)
                .edge_strategy(strategy)
                .use_mmap(!matches.is_present("in-memory"));
            if let Some(max) = max_supersteps {
                config = config.max_supersteps(max);
            }
            let report = config.is_root().then(|| DegreeReport::new(sender.clone()));
            thread::spawn(move || run_worker(config, path, transport, report))
        })
        .collect();
    drop(sender);
    let mut supersteps = 0;
    for (worker_id, handle) in handles.into_iter().enumerate() {
        supersteps = handle.join().map_err(|_| Err::WorkerPanicked(worker_id))??;
    }
    info!("{} workers ran {} supersteps", worker_num, supersteps);
    for summary in receiver {
        println!("{}", summary);
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let matches = App::new(crate_name!())
        .about(crate_description!())
        .author(crate_authors!())
        .version(crate_version!())
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .subcommand(
            SubCommand::with_name("createfrag")
                .about("Creates a fragment file from tab-separated vertex and edge lists")
                .after_help(
                    r"VERTICES lines are `oid<TAB>vdata`, EDGES lines are `src<TAB>dst<TAB>edata`.
Vertices get local ids in file order. Kinds are empty, i32, i64, f32 or f64.
",
                )
                .arg(Arg::with_name("VERTICES").required(true))
                .arg(Arg::with_name("EDGES").required(true))
                .arg(Arg::with_name("FRAGMENT").required(true))
                .arg(kind_arg("oid-kind", "i64"))
                .arg(kind_arg("vdata-kind", "f64"))
                .arg(kind_arg("edata-kind", "i64")),
        )
        .subcommand(
            SubCommand::with_name("fraginfo")
                .about("Displays information about a fragment")
                .arg(Arg::with_name("FRAGMENT").required(true))
                .arg(
                    Arg::with_name("display")
                        .help("Also prints every vertex and its adjacency")
                        .long("display")
                        .takes_value(false),
                ),
        )
        .subcommand(
            SubCommand::with_name("run")
                .about("Runs out-degree statistics with one worker thread per fragment")
                .after_help("Fragments need i64 oids, f64 vertex data and i64 edge data.")
                .arg(Arg::with_name("FRAGMENT").required(true).multiple(true))
                .arg(
                    Arg::with_name("strategy")
                        .help("How edges are materialized")
                        .long("strategy")
                        .takes_value(true)
                        .default_value("eager")
                        .possible_values(&["eager", "streaming", "pointer"]),
                )
                .arg(
                    Arg::with_name("transport")
                        .help("How aggregators are synchronized")
                        .long("transport")
                        .takes_value(true)
                        .default_value("direct")
                        .possible_values(&["direct", "messaging"]),
                )
                .arg(
                    Arg::with_name("tcp")
                        .help("Sends messaging requests over loopback TCP")
                        .long("tcp")
                        .takes_value(false),
                )
                .arg(
                    Arg::with_name("in-memory")
                        .help("Loads fragments into memory instead of mapping them")
                        .long("in-memory")
                        .takes_value(false),
                )
                .arg(
                    Arg::with_name("max-supersteps")
                        .long("max-supersteps")
                        .takes_value(true),
                ),
        )
        .get_matches();
    if let Some(matches) = matches.subcommand_matches("createfrag") {
        handle_createfrag(matches)?;
    } else if let Some(matches) = matches.subcommand_matches("fraginfo") {
        handle_fraginfo(matches)?;
    } else if let Some(matches) = matches.subcommand_matches("run") {
        handle_run(matches)?;
    }
    Ok(())
}

fn kind_arg(name: &'static str, default: &'static str) -> Arg<'static, 'static> {
    Arg::with_name(name)
        .long(name)
        .takes_value(true)
        .default_value(default)
        .possible_values(&["empty", "i32", "i64", "f32", "f64"])
}
