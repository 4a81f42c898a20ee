use super::columnar::Header;
use crate::{
    error::{Error, Result},
    memory_manager::MemoryManager,
    types::{DataKind, Lid, Scalar},
};
use itertools::Itertools;
use log::info;
use std::collections::HashMap;

type Vertex = (Scalar, Scalar);
type Edge = (Scalar, Scalar, Scalar);

/// The column kinds of a fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentSchema {
    pub oid: DataKind,
    pub vdata: DataKind,
    pub edata: DataKind,
}

impl FragmentSchema {
    pub fn new(oid: DataKind, vdata: DataKind, edata: DataKind) -> Self {
        Self { oid, vdata, edata }
    }

    fn check(&self, column: &str, expected: DataKind, value: &Scalar) -> Result<()> {
        if value.kind() == expected {
            Ok(())
        } else {
            Err(Error::Corrupted(format!(
                "{} value {:?} is not of kind {}",
                column, value, expected
            )))
        }
    }
}

/// Hashable identity of an oid. Floats compare by bit pattern.
fn oid_key(oid: &Scalar) -> u64 {
    match *oid {
        Scalar::Empty => 0,
        Scalar::Int32(v) => v as u32 as u64,
        Scalar::Int64(v) => v as u64,
        Scalar::Float32(v) => v.to_bits() as u64,
        Scalar::Float64(v) => v.to_bits(),
    }
}

fn create_lid_map(schema: &FragmentSchema, vertices: &[Vertex]) -> Result<HashMap<u64, Lid>> {
    let mut lids = HashMap::with_capacity(vertices.len());
    for (lid, (oid, vdata)) in vertices.iter().enumerate() {
        schema.check("oid", schema.oid, oid)?;
        schema.check("vdata", schema.vdata, vdata)?;
        if lids.insert(oid_key(oid), lid).is_some() {
            return Err(Error::Corrupted(format!("duplicate vertex {:?}", oid)));
        }
    }
    Ok(lids)
}

fn resolve_edges<E>(
    schema: &FragmentSchema,
    lids: &HashMap<u64, Lid>,
    edges: E,
) -> Result<Vec<(Lid, Lid, Scalar)>>
where
    E: IntoIterator<Item = Edge>,
{
    let lookup = |oid: &Scalar| {
        lids.get(&oid_key(oid))
            .copied()
            .ok_or_else(|| Error::Corrupted(format!("edge references unknown vertex {:?}", oid)))
    };
    let mut resolved = vec![];
    for (src, dst, edata) in edges {
        schema.check("edata", schema.edata, &edata)?;
        resolved.push((lookup(&src)?, lookup(&dst)?, edata));
    }
    // Stable, so parallel edges keep their input order.
    resolved.sort_by_key(|&(src, _, _)| src);
    Ok(resolved)
}

fn write_column<'a, S>(mm: &mut MemoryManager, pos: usize, width: usize, values: S) -> Result<()>
where
    S: IntoIterator<Item = &'a Scalar>,
{
    for (i, value) in values.into_iter().enumerate() {
        mm.write_bytes(pos + i * width, &value.to_le_bytes())?;
    }
    Ok(())
}

fn write_offsets(
    mm: &mut MemoryManager,
    header: &Header,
    edges: &[(Lid, Lid, Scalar)],
) -> Result<()> {
    let mut degrees = vec![0usize; header.vertex_num];
    for (src, group) in &edges.iter().group_by(|&&(src, _, _)| src) {
        degrees[src] = group.count();
    }
    let mut offset = 0;
    mm.write_u64(header.offsets_pos, 0)?;
    for (lid, degree) in degrees.into_iter().enumerate() {
        offset += degree;
        mm.write_u64(header.offsets_pos + (lid + 1) * 8, offset as u64)?;
    }
    Ok(())
}

fn write_nbrs(mm: &mut MemoryManager, header: &Header, edges: &[(Lid, Lid, Scalar)]) -> Result<()> {
    for (i, (_, dst, edata)) in edges.iter().enumerate() {
        let pos = header.nbrs_pos + i * header.nbr_stride;
        mm.write_u64(pos, *dst as u64)?;
        mm.write_bytes(pos + 8, &edata.to_le_bytes())?;
    }
    Ok(())
}

/// Writes a columnar fragment built from `vertices` and `edges` into `mm`.
///
/// Vertices receive lids in input order. Edges name their endpoints by oid.
pub fn mm_read_iter<V, E>(
    mm: &mut MemoryManager,
    schema: FragmentSchema,
    vertices: V,
    edges: E,
) -> Result<()>
where
    V: IntoIterator<Item = Vertex>,
    E: IntoIterator<Item = Edge>,
{
    if schema.oid == DataKind::Empty {
        return Err(Error::Corrupted("oid column cannot be empty".to_string()));
    }
    let vertices: Vec<Vertex> = vertices.into_iter().collect();
    let lids = create_lid_map(&schema, &vertices)?;
    let edges = resolve_edges(&schema, &lids, edges)?;
    let header = Header::new(
        vertices.len(),
        edges.len(),
        schema.oid,
        schema.vdata,
        schema.edata,
    )?;
    info!(
        "writing fragment with {} vertices and {} edges",
        header.vertex_num, header.edge_num
    );
    mm.resize(0)?;
    mm.resize(header.total_size())?;
    header.write(mm)?;
    write_column(
        mm,
        header.oids_pos,
        schema.oid.width(),
        vertices.iter().map(|(oid, _)| oid),
    )?;
    write_column(
        mm,
        header.vdata_pos,
        schema.vdata.width(),
        vertices.iter().map(|(_, vdata)| vdata),
    )?;
    write_offsets(mm, &header, &edges)?;
    write_nbrs(mm, &header, &edges)?;
    mm.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> FragmentSchema {
        FragmentSchema::new(DataKind::Int32, DataKind::Empty, DataKind::Float32)
    }

    #[test]
    fn test_resolve_edges_sorted_stable() {
        let lids: HashMap<u64, Lid> = vec![(1, 0), (2, 1), (3, 2)].into_iter().collect();
        let edges = resolve_edges(
            &schema(),
            &lids,
            vec![
                (Scalar::Int32(3), Scalar::Int32(1), Scalar::Float32(0.1)),
                (Scalar::Int32(1), Scalar::Int32(2), Scalar::Float32(0.2)),
                (Scalar::Int32(3), Scalar::Int32(2), Scalar::Float32(0.3)),
            ],
        )
        .unwrap();
        assert_eq!(
            edges,
            vec![
                (0, 1, Scalar::Float32(0.2)),
                (2, 0, Scalar::Float32(0.1)),
                (2, 1, Scalar::Float32(0.3)),
            ]
        );
    }

    #[test]
    fn test_unknown_endpoint() {
        let mut mm = MemoryManager::Mem(vec![]);
        let result = mm_read_iter(
            &mut mm,
            schema(),
            vec![(Scalar::Int32(1), Scalar::Empty)],
            vec![(Scalar::Int32(1), Scalar::Int32(9), Scalar::Float32(1.0))],
        );
        assert!(matches!(result, Err(Error::Corrupted(_))));
    }

    #[test]
    fn test_duplicate_vertex() {
        let mut mm = MemoryManager::Mem(vec![]);
        let result = mm_read_iter(
            &mut mm,
            schema(),
            vec![
                (Scalar::Int32(1), Scalar::Empty),
                (Scalar::Int32(1), Scalar::Empty),
            ],
            vec![],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_kind_checked() {
        let mut mm = MemoryManager::Mem(vec![]);
        let result = mm_read_iter(
            &mut mm,
            schema(),
            vec![(Scalar::Int64(1), Scalar::Empty)],
            vec![],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_offsets() {
        let mut mm = MemoryManager::Mem(vec![]);
        mm_read_iter(
            &mut mm,
            schema(),
            (1..=4).map(|i| (Scalar::Int32(i), Scalar::Empty)),
            vec![
                (Scalar::Int32(4), Scalar::Int32(1), Scalar::Float32(1.0)),
                (Scalar::Int32(2), Scalar::Int32(1), Scalar::Float32(1.0)),
                (Scalar::Int32(4), Scalar::Int32(2), Scalar::Float32(1.0)),
            ],
        )
        .unwrap();
        let header = Header::new(4, 3, DataKind::Int32, DataKind::Empty, DataKind::Float32).unwrap();
        assert_eq!(mm.len(), header.total_size());
        let offsets: Vec<u64> = (0..5)
            .map(|i| mm.read_u64(header.offsets_pos + i * 8))
            .collect();
        assert_eq!(offsets, vec![0, 0, 1, 1, 3]);
    }
}
