use super::drain_column;
use crate::{
    error::Result,
    fragment::Fragment,
    types::{check_lid, Lid, NativeScalar},
};
use log::info;

/// Holds the mutable value of every lid.
///
/// Writes go straight to the slot, so a read after a write in the same
/// superstep observes the written value.
#[derive(Debug, Clone)]
pub struct VertexDataManager<V> {
    values: Vec<V>,
}

impl<V: NativeScalar> VertexDataManager<V> {
    pub fn new<F: Fragment>(fragment: &F) -> Result<Self> {
        let values = drain_column(
            "vdata",
            fragment.vdata_kind(),
            fragment.vertex_num(),
            |lid| fragment.vdata(lid),
        )?;
        info!("drained {} vertex values of kind {}", values.len(), V::KIND);
        Ok(Self { values })
    }

    pub fn get_vertex_data(&self, lid: Lid) -> V {
        check_lid(lid, self.values.len());
        self.values[lid]
    }

    pub fn set_vertex_data(&mut self, lid: Lid, value: V) {
        check_lid(lid, self.values.len());
        self.values[lid] = value;
    }

    pub fn vertex_num(&self) -> usize {
        self.values.len()
    }

    pub fn values(&self) -> &[V] {
        &self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::Error,
        fragment::{mm_read_iter, ColumnarFragment, FragmentSchema},
        memory_manager::MemoryManager,
        types::{DataKind, Scalar},
    };

    fn create_fragment(vdata_kind: DataKind) -> ColumnarFragment {
        let mut mm = MemoryManager::Mem(vec![]);
        mm_read_iter(
            &mut mm,
            FragmentSchema::new(DataKind::Int64, vdata_kind, DataKind::Empty),
            (0..4).map(|i| {
                (
                    Scalar::Int64(i),
                    match vdata_kind {
                        DataKind::Float64 => Scalar::Float64(i as f64 / 4.0),
                        _ => Scalar::Empty,
                    },
                )
            }),
            vec![],
        )
        .unwrap();
        ColumnarFragment::new(mm).unwrap()
    }

    #[test]
    fn test_initial_values() {
        let data = VertexDataManager::<f64>::new(&create_fragment(DataKind::Float64)).unwrap();
        assert_eq!(data.values(), &[0.0, 0.25, 0.5, 0.75]);
    }

    #[test]
    fn test_read_your_writes() {
        let mut data = VertexDataManager::<f64>::new(&create_fragment(DataKind::Float64)).unwrap();
        data.set_vertex_data(2, 9.5);
        assert_eq!(data.get_vertex_data(2), 9.5);
        data.set_vertex_data(2, -1.0);
        assert_eq!(data.get_vertex_data(2), -1.0);
        assert_eq!(data.get_vertex_data(1), 0.25);
    }

    #[test]
    fn test_empty_column_rejected() {
        assert!(matches!(
            VertexDataManager::<f64>::new(&create_fragment(DataKind::Empty)),
            Err(Error::TypeMismatch {
                column: "vdata",
                found: DataKind::Empty,
                ..
            })
        ));
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_set_out_of_range() {
        let mut data = VertexDataManager::<f64>::new(&create_fragment(DataKind::Float64)).unwrap();
        data.set_vertex_data(4, 0.0);
    }
}
