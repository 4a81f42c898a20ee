use super::{Fragment, Nbr, RawColumn, RawLayout};
use crate::{
    error::{Error, Result},
    memory_manager::MemoryManager,
    types::{check_lid, DataKind, Lid, Scalar},
};
use derive_more::Display;
use log::info;
use std::path::Path;

pub(crate) const MAGIC: u64 = 0x4753_5046_5241_4731;
pub(crate) const HEADER_FIELDS: usize = 11;
pub(crate) const HEADER_SIZE: usize = HEADER_FIELDS * 8;

/// The parsed fragment header.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Header {
    pub vertex_num: usize,
    pub edge_num: usize,
    pub oid_kind: DataKind,
    pub vdata_kind: DataKind,
    pub edata_kind: DataKind,
    pub oids_pos: usize,
    pub vdata_pos: usize,
    pub offsets_pos: usize,
    pub nbrs_pos: usize,
    pub nbr_stride: usize,
    pub total_size: usize,
}

impl Header {
    /// Lays out the columns of a fragment, failing if any position does not
    /// fit in `usize`.
    pub fn new(
        vertex_num: usize,
        edge_num: usize,
        oid_kind: DataKind,
        vdata_kind: DataKind,
        edata_kind: DataKind,
    ) -> Result<Self> {
        let overflow = || {
            Error::Corrupted(format!(
                "{} vertices and {} edges overflow the address space",
                vertex_num, edge_num
            ))
        };
        let column_end = |pos: usize, width: usize| {
            vertex_num
                .checked_mul(width)
                .and_then(|len| pos.checked_add(len))
                .and_then(align8)
                .ok_or_else(overflow)
        };
        let oids_pos = HEADER_SIZE;
        let vdata_pos = column_end(oids_pos, oid_kind.width())?;
        let offsets_pos = column_end(vdata_pos, vdata_kind.width())?;
        let nbrs_pos = vertex_num
            .checked_add(1)
            .and_then(|n| n.checked_mul(8))
            .and_then(|len| offsets_pos.checked_add(len))
            .ok_or_else(overflow)?;
        let nbr_stride = 8 + (edata_kind.width() + 7) / 8 * 8;
        let total_size = edge_num
            .checked_mul(nbr_stride)
            .and_then(|len| nbrs_pos.checked_add(len))
            .ok_or_else(overflow)?;
        Ok(Self {
            vertex_num,
            edge_num,
            oid_kind,
            vdata_kind,
            edata_kind,
            oids_pos,
            vdata_pos,
            offsets_pos,
            nbrs_pos,
            nbr_stride,
            total_size,
        })
    }

    pub fn total_size(&self) -> usize {
        self.total_size
    }

    pub fn write(&self, mm: &mut MemoryManager) -> Result<()> {
        let fields = [
            MAGIC,
            self.vertex_num as u64,
            self.edge_num as u64,
            self.oid_kind.tag(),
            self.vdata_kind.tag(),
            self.edata_kind.tag(),
            self.oids_pos as u64,
            self.vdata_pos as u64,
            self.offsets_pos as u64,
            self.nbrs_pos as u64,
            self.nbr_stride as u64,
        ];
        for (i, field) in fields.iter().enumerate() {
            mm.write_u64(i * 8, *field)?;
        }
        Ok(())
    }

    fn read(mm: &MemoryManager) -> Result<Self> {
        if mm.len() < HEADER_SIZE {
            return Err(Error::Corrupted(format!(
                "fragment of {} bytes is shorter than its header",
                mm.len()
            )));
        }
        if mm.read_u64(0) != MAGIC {
            return Err(Error::Corrupted("bad fragment magic".to_string()));
        }
        let field = |i: usize| mm.read_u64(i * 8) as usize;
        let header = Header::new(
            field(1),
            field(2),
            DataKind::from_tag(field(3) as u64)?,
            DataKind::from_tag(field(4) as u64)?,
            DataKind::from_tag(field(5) as u64)?,
        )?;
        let stored = [field(6), field(7), field(8), field(9), field(10)];
        let expected = [
            header.oids_pos,
            header.vdata_pos,
            header.offsets_pos,
            header.nbrs_pos,
            header.nbr_stride,
        ];
        if stored != expected {
            return Err(Error::Corrupted(format!(
                "column layout {:?} does not match {:?}",
                stored, expected
            )));
        }
        if header.total_size() > mm.len() {
            return Err(Error::Corrupted(format!(
                "fragment needs {} bytes but only {} are mapped",
                header.total_size(),
                mm.len()
            )));
        }
        Ok(header)
    }
}

pub(crate) fn align8(n: usize) -> Option<usize> {
    n.checked_add(7).map(|n| n & !7)
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
#[display(
    fmt = "vertices: {}, edges: {}, oid: {}, vdata: {}, edata: {}",
    vertex_num,
    edge_num,
    oid_kind,
    vdata_kind,
    edata_kind
)]
pub struct FragmentInfo {
    pub vertex_num: usize,
    pub edge_num: usize,
    pub oid_kind: DataKind,
    pub vdata_kind: DataKind,
    pub edata_kind: DataKind,
}

/// A fragment stored column by column in a single buffer.
///
/// ```text
/// +-----------------------------------------+
/// |  magic | vertex_num | edge_num | kinds  |  11 x u64
/// |  oids_pos | vdata_pos | offsets_pos     |
/// |  nbrs_pos | nbr_stride                  |
/// +-----------------------------------------+
/// |            oid         ...              |  vertex_num x width(oid)
/// +-----------------------------------------+
/// |           vdata        ...              |  vertex_num x width(vdata)
/// +-----------------------------------------+
/// |          offset        ...              |  (vertex_num + 1) x u64
/// +--------------------+--------------------+
/// |      nbr lid       |       edata        |<-+
/// +--------------------+--------------------+  |- edge_num rows of nbr_stride
///                     ...                    <-+
/// ```
///
/// Columns start on 8-byte boundaries. Edges of `lid` occupy rows
/// `offset[lid]..offset[lid + 1]`.
pub struct ColumnarFragment {
    mm: MemoryManager,
    header: Header,
}

impl ColumnarFragment {
    /// Validates the buffer and wraps it.
    pub fn new(mm: MemoryManager) -> Result<Self> {
        let header = Header::read(&mm)?;
        let fragment = Self { mm, header };
        fragment.validate_topology()?;
        info!("loaded fragment ({})", fragment.info());
        Ok(fragment)
    }

    /// Maps a fragment file read-only.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::new(MemoryManager::new_mmap(path)?)
    }

    /// Reads a whole fragment file onto the heap.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::new(MemoryManager::Mem(std::fs::read(path)?))
    }

    pub fn info(&self) -> FragmentInfo {
        FragmentInfo {
            vertex_num: self.header.vertex_num,
            edge_num: self.header.edge_num,
            oid_kind: self.header.oid_kind,
            vdata_kind: self.header.vdata_kind,
            edata_kind: self.header.edata_kind,
        }
    }

    fn offset(&self, lid: usize) -> usize {
        self.mm.read_u64(self.header.offsets_pos + lid * 8) as usize
    }

    fn nbr_pos(&self, edge: usize) -> usize {
        self.header.nbrs_pos + edge * self.header.nbr_stride
    }

    fn scalar_at(&self, kind: DataKind, pos: usize) -> Scalar {
        let bytes = &self.mm.as_bytes()[pos..pos + kind.width()];
        unsafe { Scalar::read_raw(kind, bytes.as_ptr()) }
    }

    /// Checks offsets are monotone and every neighbor lid is in range, so raw
    /// readers may skip these checks.
    fn validate_topology(&self) -> Result<()> {
        let Header {
            vertex_num,
            edge_num,
            ..
        } = self.header;
        if self.offset(0) != 0 || self.offset(vertex_num) != edge_num {
            return Err(Error::Corrupted(format!(
                "offsets must span [0, {}], found [{}, {}]",
                edge_num,
                self.offset(0),
                self.offset(vertex_num)
            )));
        }
        for lid in 0..vertex_num {
            if self.offset(lid) > self.offset(lid + 1) {
                return Err(Error::Corrupted(format!("offsets decrease at lid {}", lid)));
            }
        }
        for edge in 0..edge_num {
            let nbr = self.mm.read_u64(self.nbr_pos(edge)) as usize;
            if nbr >= vertex_num {
                return Err(Error::Corrupted(format!(
                    "edge {} points at lid {} outside [0, {})",
                    edge, nbr, vertex_num
                )));
            }
        }
        Ok(())
    }

    fn column(&self, pos: usize, stride: usize, count: usize) -> RawColumn {
        RawColumn {
            base: unsafe { self.mm.as_ptr().add(pos) },
            stride,
            count,
        }
    }
}

impl Fragment for ColumnarFragment {
    type Adjacency<'a> = ColumnarNbrIter<'a>;

    fn vertex_num(&self) -> usize {
        self.header.vertex_num
    }

    fn edge_num(&self) -> usize {
        self.header.edge_num
    }

    fn oid_kind(&self) -> DataKind {
        self.header.oid_kind
    }

    fn vid_kind(&self) -> DataKind {
        DataKind::Int64
    }

    fn vdata_kind(&self) -> DataKind {
        self.header.vdata_kind
    }

    fn edata_kind(&self) -> DataKind {
        self.header.edata_kind
    }

    fn oid(&self, lid: Lid) -> Scalar {
        check_lid(lid, self.header.vertex_num);
        let kind = self.header.oid_kind;
        self.scalar_at(kind, self.header.oids_pos + lid * kind.width())
    }

    fn vdata(&self, lid: Lid) -> Scalar {
        check_lid(lid, self.header.vertex_num);
        let kind = self.header.vdata_kind;
        self.scalar_at(kind, self.header.vdata_pos + lid * kind.width())
    }

    fn degree(&self, lid: Lid) -> usize {
        check_lid(lid, self.header.vertex_num);
        self.offset(lid + 1) - self.offset(lid)
    }

    fn adjacency(&self, lid: Lid) -> ColumnarNbrIter<'_> {
        check_lid(lid, self.header.vertex_num);
        ColumnarNbrIter {
            fragment: self,
            edge: self.offset(lid),
            end: self.offset(lid + 1),
        }
    }

    fn raw_layout(&self) -> Option<RawLayout> {
        let h = &self.header;
        // Header::read checked every column against the buffer length, and
        // the buffer lives as long as the fragment.
        Some(unsafe {
            RawLayout::new(
                self.column(h.oids_pos, h.oid_kind.width(), h.vertex_num),
                self.column(h.offsets_pos, 8, h.vertex_num + 1),
                self.column(h.nbrs_pos, h.nbr_stride, h.edge_num),
                8,
            )
        })
    }
}

impl std::fmt::Display for ColumnarFragment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{}", self.info())?;
        for lid in 0..self.header.vertex_num {
            write!(f, "{:>8} {:?} {:?} ->", lid, self.oid(lid), self.vdata(lid))?;
            for nbr in self.adjacency(lid) {
                write!(f, " ({}, {:?})", nbr.lid, nbr.data)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// An iterator visiting the adjacency of one vertex.
pub struct ColumnarNbrIter<'a> {
    fragment: &'a ColumnarFragment,
    edge: usize,
    end: usize,
}

impl<'a> Iterator for ColumnarNbrIter<'a> {
    type Item = Nbr;

    fn next(&mut self) -> Option<Nbr> {
        if self.edge == self.end {
            return None;
        }
        let pos = self.fragment.nbr_pos(self.edge);
        self.edge += 1;
        Some(Nbr {
            lid: self.fragment.mm.read_u64(pos) as usize,
            data: self
                .fragment
                .scalar_at(self.fragment.header.edata_kind, pos + 8),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.end - self.edge, Some(self.end - self.edge))
    }
}

impl<'a> ExactSizeIterator for ColumnarNbrIter<'a> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::{mm_read_iter, FragmentSchema};

    fn schema() -> FragmentSchema {
        FragmentSchema::new(DataKind::Int64, DataKind::Float64, DataKind::Int32)
    }

    fn create_fragment() -> ColumnarFragment {
        let mut mm = MemoryManager::Mem(vec![]);
        mm_read_iter(
            &mut mm,
            schema(),
            vec![
                (Scalar::Int64(10), Scalar::Float64(0.5)),
                (Scalar::Int64(20), Scalar::Float64(1.5)),
                (Scalar::Int64(30), Scalar::Float64(2.5)),
            ],
            vec![
                (Scalar::Int64(10), Scalar::Int64(20), Scalar::Int32(12)),
                (Scalar::Int64(10), Scalar::Int64(30), Scalar::Int32(13)),
                (Scalar::Int64(30), Scalar::Int64(10), Scalar::Int32(31)),
            ],
        )
        .unwrap();
        ColumnarFragment::new(mm).unwrap()
    }

    #[test]
    fn test_header_layout() {
        let header = Header::new(3, 2, DataKind::Int32, DataKind::Empty, DataKind::Float32).unwrap();
        assert_eq!(header.oids_pos, HEADER_SIZE);
        assert_eq!(header.vdata_pos, HEADER_SIZE + 16);
        assert_eq!(header.offsets_pos, HEADER_SIZE + 16);
        assert_eq!(header.nbrs_pos, HEADER_SIZE + 16 + 32);
        assert_eq!(header.nbr_stride, 16);
        assert_eq!(header.total_size(), HEADER_SIZE + 16 + 32 + 32);
    }

    #[test]
    fn test_accessors() {
        let fragment = create_fragment();
        assert_eq!(fragment.vertex_num(), 3);
        assert_eq!(fragment.edge_num(), 3);
        assert_eq!(fragment.oid(2), Scalar::Int64(30));
        assert_eq!(fragment.vdata(1), Scalar::Float64(1.5));
        assert_eq!(fragment.degree(0), 2);
        assert_eq!(fragment.degree(1), 0);
        assert_eq!(
            fragment.adjacency(0).collect::<Vec<_>>(),
            vec![
                Nbr {
                    lid: 1,
                    data: Scalar::Int32(12)
                },
                Nbr {
                    lid: 2,
                    data: Scalar::Int32(13)
                }
            ]
        );
        assert_eq!(fragment.adjacency(2).len(), 1);
    }

    #[test]
    fn test_info_display() {
        assert_eq!(
            create_fragment().info().to_string(),
            "vertices: 3, edges: 3, oid: Int64, vdata: Float64, edata: Int32"
        );
    }

    #[test]
    fn test_bad_magic() {
        let mut mm = MemoryManager::new_mem(HEADER_SIZE);
        mm.write_u64(0, 1).unwrap();
        assert!(matches!(
            ColumnarFragment::new(mm),
            Err(Error::Corrupted(_))
        ));
    }

    #[test]
    fn test_oversized_header() {
        let mut mm = MemoryManager::new_mem(HEADER_SIZE);
        mm.write_u64(0, MAGIC).unwrap();
        mm.write_u64(8, u64::MAX / 4).unwrap();
        mm.write_u64(16, 1).unwrap();
        for (i, kind) in [DataKind::Int64, DataKind::Float64, DataKind::Int64].iter().enumerate() {
            mm.write_u64(24 + i * 8, kind.tag()).unwrap();
        }
        assert!(matches!(
            ColumnarFragment::new(mm),
            Err(Error::Corrupted(_))
        ));
        assert!(Header::new(1, usize::MAX / 8, DataKind::Int64, DataKind::Empty, DataKind::Int64).is_err());
    }

    #[test]
    fn test_dangling_neighbor() {
        let header = Header::new(1, 1, DataKind::Int64, DataKind::Int64, DataKind::Empty).unwrap();
        let mut mm = MemoryManager::new_mem(header.total_size());
        header.write(&mut mm).unwrap();
        mm.write_u64(header.offsets_pos + 8, 1).unwrap();
        mm.write_u64(header.nbrs_pos, 5).unwrap();
        assert!(matches!(
            ColumnarFragment::new(mm),
            Err(Error::Corrupted(_))
        ));
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_oid_out_of_range() {
        create_fragment().oid(3);
    }
}
