//! Per-vertex managers and the vertex handle.

pub use data_manager::VertexDataManager;
pub use handle::{ComputeContext, VertexHandle};
pub use id_manager::VertexIdManager;

use crate::{
    archive::OutArchive,
    error::Result,
    types::{check_kind, decode_column, DataKind, Lid, NativeScalar, Scalar},
};

mod data_manager;
mod handle;
mod id_manager;

/// Drains one fragment column in lid order into a byte stream with the
/// fixed-width encoder of its kind, then decodes it into a managed vector.
fn drain_column<T, R>(column: &'static str, kind: DataKind, vertex_num: usize, read: R) -> Result<Vec<T>>
where
    T: NativeScalar,
    R: Fn(Lid) -> Scalar,
{
    check_kind::<T>(column, kind)?;
    let mut out = OutArchive::with_capacity(vertex_num * kind.width());
    for lid in 0..vertex_num {
        read(lid).encode(&mut out);
    }
    let mut input = out.reader();
    let values = decode_column(&mut input, vertex_num)?;
    input.finish()?;
    Ok(values)
}
