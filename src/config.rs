//! Worker configuration.
//!
//! Values are resolved by the caller (the CLI, a test) before any manager is
//! constructed; nothing here parses configuration text.

use crate::{
    edge::EdgeStrategy,
    error::{Error, Result},
    fragment::ColumnarFragment,
    types::WorkerId,
};
use derive_more::Display;
use std::path::Path;

/// How aggregator values reach worker 0.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    #[display(fmt = "direct")]
    Direct,
    #[display(fmt = "messaging")]
    Messaging,
}

impl std::str::FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "direct" => Ok(TransportKind::Direct),
            "messaging" => Ok(TransportKind::Messaging),
            _ => Err(format!("invalid transport `{}`", s)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub worker_id: WorkerId,
    pub worker_num: usize,
    pub transport: TransportKind,
    pub edge_strategy: EdgeStrategy,
    /// Map fragment files instead of reading them onto the heap.
    pub use_mmap: bool,
    /// Stop after this many supersteps even if vertices are still active.
    pub max_supersteps: Option<u64>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: 0,
            worker_num: 1,
            transport: TransportKind::Direct,
            edge_strategy: EdgeStrategy::Eager,
            use_mmap: true,
            max_supersteps: None,
        }
    }
}

impl WorkerConfig {
    pub fn new(worker_id: WorkerId, worker_num: usize) -> Self {
        Self {
            worker_id,
            worker_num,
            ..Self::default()
        }
    }

    pub fn transport(mut self, transport: TransportKind) -> Self {
        self.transport = transport;
        self
    }

    pub fn edge_strategy(mut self, strategy: EdgeStrategy) -> Self {
        self.edge_strategy = strategy;
        self
    }

    pub fn use_mmap(mut self, use_mmap: bool) -> Self {
        self.use_mmap = use_mmap;
        self
    }

    pub fn max_supersteps(mut self, max_supersteps: u64) -> Self {
        self.max_supersteps = Some(max_supersteps);
        self
    }

    pub fn is_root(&self) -> bool {
        self.worker_id == 0
    }

    pub fn validate(&self) -> Result<()> {
        if self.worker_num == 0 || self.worker_id >= self.worker_num {
            return Err(Error::InvalidConfig(format!(
                "worker {} out of range [0, {})",
                self.worker_id, self.worker_num
            )));
        }
        Ok(())
    }

    pub fn open_fragment<P: AsRef<Path>>(&self, path: P) -> Result<ColumnarFragment> {
        if self.use_mmap {
            ColumnarFragment::open(path)
        } else {
            ColumnarFragment::load(path)
        }
    }
}
