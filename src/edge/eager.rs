use super::Edge;
use crate::{
    error::Result,
    fragment::Fragment,
    types::{check_kind, check_lid, expect_scalar, Lid, NativeScalar},
};
use log::info;
use rayon::prelude::*;

/// Adjacency copied into per-vertex lists at construction.
pub struct EagerEdges<I, E> {
    targets: Vec<Vec<I>>,
    values: Vec<Vec<E>>,
    total: usize,
}

fn materialize<F, I, E>(fragment: &F, lid: Lid) -> Result<(Vec<I>, Vec<E>)>
where
    F: Fragment,
    I: NativeScalar,
    E: NativeScalar,
{
    let degree = fragment.degree(lid);
    let (mut targets, mut values) = (Vec::with_capacity(degree), Vec::with_capacity(degree));
    for nbr in fragment.adjacency(lid) {
        targets.push(expect_scalar("oid", fragment.oid(nbr.lid))?);
        values.push(expect_scalar("edata", nbr.data)?);
    }
    Ok((targets, values))
}

impl<I: NativeScalar, E: NativeScalar> EagerEdges<I, E> {
    pub fn new<F: Fragment + Sync>(fragment: &F) -> Result<Self> {
        check_kind::<I>("oid", fragment.oid_kind())?;
        check_kind::<E>("edata", fragment.edata_kind())?;
        let lists = (0..fragment.vertex_num())
            .into_par_iter()
            .map(|lid| materialize(fragment, lid))
            .collect::<Result<Vec<_>>>()?;
        let (targets, values): (Vec<_>, Vec<_>) = lists.into_iter().unzip();
        let total = targets.iter().map(Vec::len).sum();
        info!(
            "materialized {} edges of {} vertices",
            total,
            targets.len()
        );
        Ok(Self {
            targets,
            values,
            total,
        })
    }

    pub fn vertex_num(&self) -> usize {
        self.targets.len()
    }

    pub fn total_edges(&self) -> usize {
        self.total
    }

    pub fn num_edges(&self, lid: Lid) -> usize {
        check_lid(lid, self.targets.len());
        self.targets[lid].len()
    }

    pub fn edges(&self, lid: Lid) -> EagerCursor<'_, I, E> {
        check_lid(lid, self.targets.len());
        EagerCursor {
            targets: &self.targets[lid],
            values: &self.values[lid],
            pos: 0,
            slot: Edge::zero(),
        }
    }
}

pub struct EagerCursor<'a, I, E> {
    targets: &'a [I],
    values: &'a [E],
    pos: usize,
    slot: Edge<I, E>,
}

impl<'a, I: NativeScalar, E: NativeScalar> EagerCursor<'a, I, E> {
    pub fn next_edge(&mut self) -> Option<&Edge<I, E>> {
        if self.pos == self.targets.len() {
            return None;
        }
        self.slot = Edge::new(self.targets[self.pos], self.values[self.pos]);
        self.pos += 1;
        Some(&self.slot)
    }

    pub fn remaining(&self) -> usize {
        self.targets.len() - self.pos
    }
}
