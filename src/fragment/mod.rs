//! The native fragment boundary.
//!
//! A fragment is one worker's immutable partition of the graph. The managers
//! only talk to it through [`Fragment`]; [`ColumnarFragment`] is the store
//! format shipped with this crate.

pub use builder::{mm_read_iter, FragmentSchema};
pub use columnar::{ColumnarFragment, ColumnarNbrIter, FragmentInfo};

use crate::types::{DataKind, Lid, Scalar};

mod builder;
mod columnar;

/// One adjacency entry as the fragment reports it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Nbr {
    pub lid: Lid,
    pub data: Scalar,
}

/// A strided column of native memory.
#[derive(Debug, Clone, Copy)]
pub struct RawColumn {
    pub base: *const u8,
    pub stride: usize,
    pub count: usize,
}

/// The raw addresses a zero-copy reader needs.
///
/// `offsets` holds `vertex_num + 1` little-endian `u64` edge offsets,
/// `nbrs` holds one entry per edge with the neighbor lid at byte 0 and the
/// edge value at `edata_offset`.
///
/// A layout can only be built through the unsafe [`RawLayout::new`], so a
/// safe [`Fragment`] implementation cannot hand out addresses nobody vouched
/// for.
#[derive(Debug, Clone, Copy)]
pub struct RawLayout {
    oids: RawColumn,
    offsets: RawColumn,
    nbrs: RawColumn,
    edata_offset: usize,
}

impl RawLayout {
    /// # Safety
    ///
    /// For as long as the fragment that returns this layout is borrowed,
    /// every column must be readable for `count * stride` bytes from its
    /// base, and `edata_offset + 8` must not exceed the `nbrs` stride. The
    /// memory must not be written while it is borrowed.
    pub unsafe fn new(oids: RawColumn, offsets: RawColumn, nbrs: RawColumn, edata_offset: usize) -> Self {
        Self {
            oids,
            offsets,
            nbrs,
            edata_offset,
        }
    }

    pub fn oids(&self) -> RawColumn {
        self.oids
    }

    pub fn offsets(&self) -> RawColumn {
        self.offsets
    }

    pub fn nbrs(&self) -> RawColumn {
        self.nbrs
    }

    pub fn edata_offset(&self) -> usize {
        self.edata_offset
    }
}

pub trait Fragment {
    type Adjacency<'a>: Iterator<Item = Nbr>
    where
        Self: 'a;

    fn vertex_num(&self) -> usize;

    fn edge_num(&self) -> usize;

    fn oid_kind(&self) -> DataKind;

    /// The kind neighbor ids are stored as.
    fn vid_kind(&self) -> DataKind;

    fn vdata_kind(&self) -> DataKind;

    fn edata_kind(&self) -> DataKind;

    fn oid(&self, lid: Lid) -> Scalar;

    fn vdata(&self, lid: Lid) -> Scalar;

    /// Returns the out-degree of `lid` from the offset column.
    fn degree(&self, lid: Lid) -> usize;

    fn adjacency(&self, lid: Lid) -> Self::Adjacency<'_>;

    /// Returns the raw layout, or `None` if the store cannot expose one.
    ///
    /// Readers still check the offsets and neighbor lids found through the
    /// layout before trusting them.
    fn raw_layout(&self) -> Option<RawLayout> {
        None
    }
}
