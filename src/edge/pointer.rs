use super::Edge;
use crate::{
    error::{Error, Result},
    fragment::{Fragment, RawLayout},
    types::{check_lid, DataKind, Lid, NativeScalar, NumKind},
};
use log::info;
use std::marker::PhantomData;

/// Adjacency read in place from the fragment's native memory.
///
/// Only 64-bit integer ids, neighbor ids and edge values are accepted, which
/// is what lets the cursor read entries as raw `i64` words without decoding.
/// Every check happens in [`new`](Self::new), including a walk over the
/// offsets and neighbor lids; the cursor itself does no bounds checking.
pub struct PointerEdges<'f, I, E> {
    layout: RawLayout,
    vertex_num: usize,
    _marker: PhantomData<(&'f (), I, E)>,
}

fn require_int64(column: &'static str, found: DataKind) -> Result<()> {
    if found == DataKind::Int64 {
        Ok(())
    } else {
        Err(Error::TypeMismatch {
            column,
            expected: NumKind::Int64,
            found,
        })
    }
}

fn require_layout(layout: &RawLayout, vertex_num: usize, edge_num: usize) -> Result<()> {
    let (oids, offsets, nbrs) = (layout.oids(), layout.offsets(), layout.nbrs());
    let ok = oids.stride == 8
        && oids.count == vertex_num
        && offsets.stride == 8
        && offsets.count == vertex_num + 1
        && nbrs.count == edge_num
        && layout.edata_offset() >= 8
        && nbrs.stride >= layout.edata_offset() + 8;
    if ok {
        Ok(())
    } else {
        Err(Error::Corrupted(format!("unusable raw layout {:?}", layout)))
    }
}

/// Walks the offsets and neighbor lids once so the cursors can read without
/// bounds checks. Assumes `require_layout` passed.
fn require_topology(layout: &RawLayout, vertex_num: usize) -> Result<()> {
    let (offsets, nbrs) = (layout.offsets(), layout.nbrs());
    let offset = |i: usize| unsafe {
        std::ptr::read_unaligned(offsets.base.add(i * offsets.stride) as *const u64) as usize
    };
    if offset(0) != 0 || offset(vertex_num) != nbrs.count {
        return Err(Error::Corrupted(format!(
            "raw offsets must span [0, {}], found [{}, {}]",
            nbrs.count,
            offset(0),
            offset(vertex_num)
        )));
    }
    for lid in 0..vertex_num {
        if offset(lid) > offset(lid + 1) {
            return Err(Error::Corrupted(format!("raw offsets decrease at lid {}", lid)));
        }
    }
    for edge in 0..nbrs.count {
        let nbr = unsafe { std::ptr::read_unaligned(nbrs.base.add(edge * nbrs.stride) as *const u64) };
        if nbr as usize >= vertex_num {
            return Err(Error::Corrupted(format!(
                "raw edge {} points at lid {} outside [0, {})",
                edge, nbr, vertex_num
            )));
        }
    }
    Ok(())
}

impl<'f, I: NativeScalar, E: NativeScalar> PointerEdges<'f, I, E> {
    pub fn new<F: Fragment>(fragment: &'f F) -> Result<Self> {
        require_int64("oid", fragment.oid_kind())?;
        require_int64("vid", fragment.vid_kind())?;
        require_int64("edata", fragment.edata_kind())?;
        require_int64("oid", I::KIND.into())?;
        require_int64("edata", E::KIND.into())?;
        let layout = fragment.raw_layout().ok_or(Error::NoRawLayout)?;
        let vertex_num = fragment.vertex_num();
        require_layout(&layout, vertex_num, fragment.edge_num())?;
        require_topology(&layout, vertex_num)?;
        info!(
            "mapped {} edges of {} vertices in place",
            layout.nbrs().count,
            vertex_num
        );
        Ok(Self {
            layout,
            vertex_num,
            _marker: PhantomData,
        })
    }

    pub fn vertex_num(&self) -> usize {
        self.vertex_num
    }

    pub fn total_edges(&self) -> usize {
        self.layout.nbrs().count
    }

    /// Translates `lid` into its `[begin, end)` edge row range.
    fn range(&self, lid: Lid) -> (usize, usize) {
        check_lid(lid, self.vertex_num);
        let offsets = self.layout.offsets();
        unsafe {
            let begin = offsets.base.add(lid * offsets.stride) as *const u64;
            (
                std::ptr::read_unaligned(begin) as usize,
                std::ptr::read_unaligned(begin.add(1)) as usize,
            )
        }
    }

    pub fn num_edges(&self, lid: Lid) -> usize {
        let (begin, end) = self.range(lid);
        end - begin
    }

    pub fn edges(&self, lid: Lid) -> PointerCursor<'_, I, E> {
        let (begin, end) = self.range(lid);
        let nbrs = self.layout.nbrs();
        unsafe {
            PointerCursor {
                cur: nbrs.base.add(begin * nbrs.stride),
                end: nbrs.base.add(end * nbrs.stride),
                stride: nbrs.stride,
                edata_offset: self.layout.edata_offset(),
                oids: self.layout.oids().base,
                slot: Edge::zero(),
                _marker: PhantomData,
            }
        }
    }
}

/// A cursor walking `[cur, end)` of the neighbor column.
pub struct PointerCursor<'a, I, E> {
    cur: *const u8,
    end: *const u8,
    stride: usize,
    edata_offset: usize,
    oids: *const u8,
    slot: Edge<I, E>,
    _marker: PhantomData<&'a ()>,
}

impl<'a, I: NativeScalar, E: NativeScalar> PointerCursor<'a, I, E> {
    pub fn next_edge(&mut self) -> Option<&Edge<I, E>> {
        if self.cur == self.end {
            return None;
        }
        // Neighbor lids were range-checked in `PointerEdges::new`.
        unsafe {
            let nbr = std::ptr::read_unaligned(self.cur as *const u64) as usize;
            self.slot = Edge::new(
                I::read_raw(self.oids.add(nbr * 8)),
                E::read_raw(self.cur.add(self.edata_offset)),
            );
            self.cur = self.cur.add(self.stride);
        }
        Some(&self.slot)
    }

    pub fn remaining(&self) -> usize {
        (self.end as usize - self.cur as usize) / self.stride
    }
}
