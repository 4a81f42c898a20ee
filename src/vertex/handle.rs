use super::{VertexDataManager, VertexIdManager};
use crate::{
    edge::{EdgeCursor, EdgeManager},
    fragment::Fragment,
    types::{check_lid, Lid, NativeScalar},
};

/// The halt state owned by whoever drives the supersteps.
pub trait ComputeContext {
    fn vote_to_halt(&mut self, lid: Lid);

    fn wake_up(&mut self, lid: Lid);

    fn is_halted(&self, lid: Lid) -> bool;
}

/// A view of one vertex through the managers of its fragment.
///
/// The handle holds no vertex state of its own. It can be created once and
/// moved across lids with [`rebind`](Self::rebind).
pub struct VertexHandle<'w, 'f, F: Fragment, I, V, E> {
    lid: Lid,
    ids: &'w VertexIdManager<I>,
    data: &'w mut VertexDataManager<V>,
    edges: &'w EdgeManager<'f, F, I, E>,
    context: &'w mut dyn ComputeContext,
}

impl<'w, 'f, F, I, V, E> VertexHandle<'w, 'f, F, I, V, E>
where
    F: Fragment,
    I: NativeScalar,
    V: NativeScalar,
    E: NativeScalar,
{
    pub fn new(
        lid: Lid,
        ids: &'w VertexIdManager<I>,
        data: &'w mut VertexDataManager<V>,
        edges: &'w EdgeManager<'f, F, I, E>,
        context: &'w mut dyn ComputeContext,
    ) -> Self {
        check_lid(lid, ids.vertex_num());
        Self {
            lid,
            ids,
            data,
            edges,
            context,
        }
    }

    pub fn lid(&self) -> Lid {
        self.lid
    }

    pub fn rebind(&mut self, lid: Lid) {
        check_lid(lid, self.ids.vertex_num());
        self.lid = lid;
    }

    pub fn id(&self) -> I {
        self.ids.get_id(self.lid)
    }

    pub fn value(&self) -> V {
        self.data.get_vertex_data(self.lid)
    }

    pub fn set_value(&mut self, value: V) {
        self.data.set_vertex_data(self.lid, value);
    }

    pub fn edges(&self) -> EdgeCursor<'w, I, E> {
        self.edges.edges(self.lid)
    }

    pub fn num_edges(&self) -> usize {
        self.edges.num_edges(self.lid)
    }

    pub fn vote_to_halt(&mut self) {
        self.context.vote_to_halt(self.lid);
    }

    pub fn wake_up(&mut self) {
        self.context.wake_up(self.lid);
    }

    pub fn is_halted(&self) -> bool {
        self.context.is_halted(self.lid)
    }
}
