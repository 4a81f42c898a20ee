use super::drain_column;
use crate::{
    error::Result,
    fragment::Fragment,
    types::{check_lid, Lid, NativeScalar},
};
use log::info;

/// Maps every lid of a fragment to its original vertex id.
///
/// The ids are copied out of the fragment once at construction, so
/// [`get_id`](Self::get_id) is a plain bounds-checked index afterwards.
#[derive(Debug, Clone)]
pub struct VertexIdManager<I> {
    ids: Vec<I>,
}

impl<I: NativeScalar> VertexIdManager<I> {
    pub fn new<F: Fragment>(fragment: &F) -> Result<Self> {
        let ids = drain_column("oid", fragment.oid_kind(), fragment.vertex_num(), |lid| {
            fragment.oid(lid)
        })?;
        info!("drained {} vertex ids of kind {}", ids.len(), I::KIND);
        Ok(Self { ids })
    }

    /// Returns the id of `lid`. Panics if `lid` is out of range.
    pub fn get_id(&self, lid: Lid) -> I {
        check_lid(lid, self.ids.len());
        self.ids[lid]
    }

    pub fn vertex_num(&self) -> usize {
        self.ids.len()
    }

    pub fn ids(&self) -> &[I] {
        &self.ids
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

    fn create_fragment(oids: Vec<Scalar>, oid_kind: DataKind) -> ColumnarFragment {
        let mut mm = MemoryManager::Mem(vec![]);
        mm_read_iter(
            &mut mm,
            FragmentSchema::new(oid_kind, DataKind::Empty, DataKind::Empty),
            oids.into_iter().map(|oid| (oid, Scalar::Empty)),
            vec![],
        )
        .unwrap();
        ColumnarFragment::new(mm).unwrap()
    }

    #[test]
    fn test_ids_match_fragment() {
        let fragment = create_fragment(
            vec![Scalar::Int64(42), Scalar::Int64(-7), Scalar::Int64(0)],
            DataKind::Int64,
        );
        let ids = VertexIdManager::<i64>::new(&fragment).unwrap();
        assert_eq!(ids.vertex_num(), 3);
        for lid in 0..fragment.vertex_num() {
            assert_eq!(Scalar::Int64(ids.get_id(lid)), fragment.oid(lid));
        }
    }

    #[test]
    fn test_float_ids() {
        let fragment = create_fragment(
            vec![Scalar::Float64(1.5), Scalar::Float64(-2.25)],
            DataKind::Float64,
        );
        let ids = VertexIdManager::<f64>::new(&fragment).unwrap();
        assert_eq!(ids.ids(), &[1.5, -2.25]);
    }

    #[test]
    fn test_kind_mismatch() {
        let fragment = create_fragment(vec![Scalar::Int32(1)], DataKind::Int32);
        assert!(matches!(
            VertexIdManager::<i64>::new(&fragment),
            Err(Error::TypeMismatch { column: "oid", .. })
        ));
    }

    #[test]
    #[should_panic(expected = "lid 1 out of range [0, 1)")]
    fn test_out_of_range() {
        let fragment = create_fragment(vec![Scalar::Int32(1)], DataKind::Int32);
        VertexIdManager::<i32>::new(&fragment).unwrap().get_id(1);
    }
}
