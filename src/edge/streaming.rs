use super::Edge;
use crate::{
    archive::{InArchive, OutArchive},
    error::Result,
    fragment::Fragment,
    types::{check_kind, check_lid, expect_scalar, Lid, NativeScalar},
};
use std::{marker::PhantomData, mem::size_of};

/// Adjacency re-read from the fragment on every [`edges`](Self::edges) call.
///
/// Nothing is kept between calls: each call encodes the target ids and edge
/// values of one vertex into a fresh archive that the cursor decodes as it
/// advances.
pub struct StreamingEdges<'f, F, I, E> {
    fragment: &'f F,
    _marker: PhantomData<(I, E)>,
}

impl<'f, F: Fragment, I: NativeScalar, E: NativeScalar> StreamingEdges<'f, F, I, E> {
    /// Checks the advertised kinds, then every id and edge value once, so
    /// cursors never meet a value of the wrong kind.
    pub fn new(fragment: &'f F) -> Result<Self> {
        check_kind::<I>("oid", fragment.oid_kind())?;
        check_kind::<E>("edata", fragment.edata_kind())?;
        for lid in 0..fragment.vertex_num() {
            expect_scalar::<I>("oid", fragment.oid(lid))?;
            for nbr in fragment.adjacency(lid) {
                expect_scalar::<E>("edata", nbr.data)?;
            }
        }
        Ok(Self {
            fragment,
            _marker: PhantomData,
        })
    }

    pub fn vertex_num(&self) -> usize {
        self.fragment.vertex_num()
    }

    pub fn total_edges(&self) -> usize {
        self.fragment.edge_num()
    }

    pub fn num_edges(&self, lid: Lid) -> usize {
        check_lid(lid, self.fragment.vertex_num());
        self.fragment.degree(lid)
    }

    pub fn edges(&self, lid: Lid) -> StreamingCursor<I, E> {
        check_lid(lid, self.fragment.vertex_num());
        let degree = self.fragment.degree(lid);
        let mut out = OutArchive::with_capacity(degree * (size_of::<I>() + size_of::<E>()));
        for nbr in self.fragment.adjacency(lid) {
            self.fragment.oid(nbr.lid).encode(&mut out);
            nbr.data.encode(&mut out);
        }
        StreamingCursor {
            lid,
            bytes: out.into_vec(),
            pos: 0,
            remaining: degree,
            slot: Edge::zero(),
        }
    }
}

/// A cursor decoding one edge per advance from an owned byte stream.
pub struct StreamingCursor<I, E> {
    lid: Lid,
    bytes: Vec<u8>,
    pos: usize,
    remaining: usize,
    slot: Edge<I, E>,
}

impl<I: NativeScalar, E: NativeScalar> StreamingCursor<I, E> {
    pub fn next_edge(&mut self) -> Option<&Edge<I, E>> {
        if self.remaining == 0 {
            return None;
        }
        let mut input = InArchive::new(&self.bytes[self.pos..]);
        let before = input.remaining();
        let edge = match (input.read::<I>(), input.read::<E>()) {
            (Ok(target), Ok(value)) => Edge::new(target, value),
            (Err(e), _) | (_, Err(e)) => {
                panic!("corrupted edge stream of lid {}: {}", self.lid, e)
            }
        };
        self.pos += before - input.remaining();
        self.remaining -= 1;
        self.slot = edge;
        Some(&self.slot)
    }

    pub fn remaining(&self) -> usize {
        self.remaining
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        fragment::{mm_read_iter, ColumnarFragment, FragmentSchema},
        memory_manager::MemoryManager,
        types::{DataKind, Scalar},
    };

    fn create_fragment() -> ColumnarFragment {
        let mut mm = MemoryManager::Mem(vec![]);
        mm_read_iter(
            &mut mm,
            FragmentSchema::new(DataKind::Float64, DataKind::Empty, DataKind::Int32),
            vec![
                (Scalar::Float64(0.5), Scalar::Empty),
                (Scalar::Float64(1.5), Scalar::Empty),
            ],
            vec![
                (Scalar::Float64(0.5), Scalar::Float64(1.5), Scalar::Int32(7)),
                (Scalar::Float64(0.5), Scalar::Float64(0.5), Scalar::Int32(-7)),
            ],
        )
        .unwrap();
        ColumnarFragment::new(mm).unwrap()
    }

    #[test]
    fn test_stream_per_call() {
        let fragment = create_fragment();
        let edges = StreamingEdges::<_, f64, i32>::new(&fragment).unwrap();
        let mut cursor = edges.edges(0);
        assert_eq!(cursor.bytes.len(), 2 * (8 + 4));
        let mut seen = vec![];
        while let Some(e) = cursor.next_edge() {
            seen.push((e.target_id(), e.value()));
        }
        assert_eq!(seen, vec![(1.5, 7), (0.5, -7)]);
        assert_eq!(edges.edges(1).remaining(), 0);
    }

    #[test]
    fn test_kind_mismatch() {
        let fragment = create_fragment();
        assert!(StreamingEdges::<_, i64, i32>::new(&fragment).is_err());
    }
}
