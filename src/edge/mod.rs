//! Read-only adjacency access under three materialization strategies.
//!
//! All strategies hand out edges through an [`EdgeCursor`]. The cursor
//! overwrites a single [`Edge`] slot on every advance and lends it out for
//! the duration of the borrow, so an edge cannot be kept past the next call
//! to [`EdgeCursor::next_edge`]. Copy the fields out if they are needed
//! later.

pub use eager::{EagerCursor, EagerEdges};
pub use pointer::{PointerCursor, PointerEdges};
pub use streaming::{StreamingCursor, StreamingEdges};

use crate::{
    error::{Error, Result},
    fragment::Fragment,
    types::{Lid, NativeScalar},
};
use derive_more::Display;

mod eager;
mod pointer;
mod streaming;

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum EdgeStrategy {
    #[display(fmt = "eager")]
    Eager,
    #[display(fmt = "streaming")]
    Streaming,
    #[display(fmt = "pointer")]
    Pointer,
}

impl std::str::FromStr for EdgeStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "eager" => Ok(EdgeStrategy::Eager),
            "streaming" => Ok(EdgeStrategy::Streaming),
            "pointer" => Ok(EdgeStrategy::Pointer),
            _ => Err(format!("invalid edge strategy `{}`", s)),
        }
    }
}

/// An out-edge view: the target's original id and the edge value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Edge<I, E> {
    target: I,
    value: E,
}

impl<I: NativeScalar, E: NativeScalar> Edge<I, E> {
    pub fn new(target: I, value: E) -> Self {
        Self { target, value }
    }

    fn zero() -> Self {
        Self::new(I::ZERO, E::ZERO)
    }

    pub fn target_id(&self) -> I {
        self.target
    }

    pub fn value(&self) -> E {
        self.value
    }
}

/// The adjacency of a fragment behind one of the strategies.
pub enum EdgeManager<'f, F: Fragment, I, E> {
    Eager(EagerEdges<I, E>),
    Streaming(StreamingEdges<'f, F, I, E>),
    Pointer(PointerEdges<'f, I, E>),
}

impl<'f, F, I, E> EdgeManager<'f, F, I, E>
where
    F: Fragment + Sync,
    I: NativeScalar,
    E: NativeScalar,
{
    pub fn new(fragment: &'f F, strategy: EdgeStrategy) -> Result<Self> {
        Ok(match strategy {
            EdgeStrategy::Eager => EdgeManager::Eager(EagerEdges::new(fragment)?),
            EdgeStrategy::Streaming => EdgeManager::Streaming(StreamingEdges::new(fragment)?),
            EdgeStrategy::Pointer => EdgeManager::Pointer(PointerEdges::new(fragment)?),
        })
    }
}

impl<'f, F, I, E> EdgeManager<'f, F, I, E>
where
    F: Fragment,
    I: NativeScalar,
    E: NativeScalar,
{
    pub fn strategy(&self) -> EdgeStrategy {
        match self {
            EdgeManager::Eager(_) => EdgeStrategy::Eager,
            EdgeManager::Streaming(_) => EdgeStrategy::Streaming,
            EdgeManager::Pointer(_) => EdgeStrategy::Pointer,
        }
    }

    pub fn vertex_num(&self) -> usize {
        match self {
            EdgeManager::Eager(edges) => edges.vertex_num(),
            EdgeManager::Streaming(edges) => edges.vertex_num(),
            EdgeManager::Pointer(edges) => edges.vertex_num(),
        }
    }

    pub fn total_edges(&self) -> usize {
        match self {
            EdgeManager::Eager(edges) => edges.total_edges(),
            EdgeManager::Streaming(edges) => edges.total_edges(),
            EdgeManager::Pointer(edges) => edges.total_edges(),
        }
    }

    /// Returns the out-degree of `lid` without walking its edges.
    pub fn num_edges(&self, lid: Lid) -> usize {
        match self {
            EdgeManager::Eager(edges) => edges.num_edges(lid),
            EdgeManager::Streaming(edges) => edges.num_edges(lid),
            EdgeManager::Pointer(edges) => edges.num_edges(lid),
        }
    }

    pub fn edges(&self, lid: Lid) -> EdgeCursor<'_, I, E> {
        match self {
            EdgeManager::Eager(edges) => EdgeCursor::Eager(edges.edges(lid)),
            EdgeManager::Streaming(edges) => EdgeCursor::Streaming(edges.edges(lid)),
            EdgeManager::Pointer(edges) => EdgeCursor::Pointer(edges.edges(lid)),
        }
    }

    pub fn set_edges(&mut self, _lid: Lid, _edges: Vec<Edge<I, E>>) -> Result<()> {
        Err(Error::UnsupportedMutation("set_edges"))
    }

    pub fn add_edge(&mut self, _lid: Lid, _edge: Edge<I, E>) -> Result<()> {
        Err(Error::UnsupportedMutation("add_edge"))
    }

    pub fn remove_edges(&mut self, _lid: Lid, _target: I) -> Result<usize> {
        Err(Error::UnsupportedMutation("remove_edges"))
    }

    pub fn mutable_edges(&mut self, _lid: Lid) -> Result<std::slice::IterMut<'_, Edge<I, E>>> {
        Err(Error::UnsupportedMutation("mutable_edges"))
    }

    pub fn edge_value(&self, _lid: Lid, _target: I) -> Result<Option<E>> {
        Err(Error::UnsupportedMutation("edge_value"))
    }

    pub fn set_edge_value(&mut self, _lid: Lid, _target: I, _value: E) -> Result<()> {
        Err(Error::UnsupportedMutation("set_edge_value"))
    }
}

/// A lending cursor over the out-edges of one vertex.
pub enum EdgeCursor<'a, I, E> {
    Eager(EagerCursor<'a, I, E>),
    Streaming(StreamingCursor<I, E>),
    Pointer(PointerCursor<'a, I, E>),
}

impl<'a, I: NativeScalar, E: NativeScalar> EdgeCursor<'a, I, E> {
    /// Advances and returns the current edge, valid until the next call.
    pub fn next_edge(&mut self) -> Option<&Edge<I, E>> {
        match self {
            EdgeCursor::Eager(cursor) => cursor.next_edge(),
            EdgeCursor::Streaming(cursor) => cursor.next_edge(),
            EdgeCursor::Pointer(cursor) => cursor.next_edge(),
        }
    }

    /// Returns the number of edges not visited yet.
    pub fn remaining(&self) -> usize {
        match self {
            EdgeCursor::Eager(cursor) => cursor.remaining(),
            EdgeCursor::Streaming(cursor) => cursor.remaining(),
            EdgeCursor::Pointer(cursor) => cursor.remaining(),
        }
    }

    pub fn for_each_edge<G: FnMut(&Edge<I, E>)>(mut self, mut f: G) {
        while let Some(edge) = self.next_edge() {
            f(edge);
        }
    }
}
