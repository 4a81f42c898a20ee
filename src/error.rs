//! Error management.

use crate::types::{DataKind, NumKind};
use derive_more::Display;

#[derive(Debug, Display)]
pub enum Error {
    #[display(fmt = "I/O error: {}", _0)]
    Io(std::io::Error),
    #[display(
        fmt = "type mismatch on {} column: expected {}, found {}",
        column,
        expected,
        found
    )]
    TypeMismatch {
        column: &'static str,
        expected: NumKind,
        found: DataKind,
    },
    #[display(fmt = "unknown data kind tag {}", _0)]
    UnknownKind(u64),
    #[display(fmt = "fragment does not expose a raw adjacency layout")]
    NoRawLayout,
    #[display(fmt = "edge mutation `{}` is not supported during a superstep", _0)]
    UnsupportedMutation(&'static str),
    #[display(fmt = "unexpected end of stream: need {} bytes, {} left", needed, remaining)]
    UnexpectedEof { needed: usize, remaining: usize },
    #[display(fmt = "corrupted data: {}", _0)]
    Corrupted(String),
    #[display(fmt = "stale request for round {} (current round {})", round, current)]
    StaleRound { round: u64, current: u64 },
    #[display(fmt = "aggregator synchronization failed: {}", _0)]
    Sync(String),
    #[display(fmt = "invalid configuration: {}", _0)]
    InvalidConfig(String),
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
