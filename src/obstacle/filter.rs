// Admission filters decide whether an index hit is an obstacle at all.
// A chain is AND-composed: the first veto drops the hit.

use super::index::{IndexEntry, OwnerRef};
use crate::geometry::QueryRect;
use crate::model::{FeatureId, LabelId};
use std::collections::HashSet;
use std::ops::{Deref, DerefMut};

pub trait AdmissionFilter {
    fn is_potential_obstacle(&self, entry: &IndexEntry, buffered: &QueryRect) -> bool;
}

impl<F> AdmissionFilter for F
where
    F: Fn(&IndexEntry, &QueryRect) -> bool,
{
    fn is_potential_obstacle(&self, entry: &IndexEntry, buffered: &QueryRect) -> bool {
        self(entry, buffered)
    }
}

#[derive(Default)]
pub struct FilterChain<'a> {
    filters: Vec<Box<dyn AdmissionFilter + 'a>>,
}

impl<'a> FilterChain<'a> {
    pub fn new() -> Self {
        Self {
            filters: Vec::new(),
        }
    }

    pub fn push(&mut self, filter: impl AdmissionFilter + 'a) {
        self.filters.push(Box::new(filter));
    }

    pub fn with(mut self, filter: impl AdmissionFilter + 'a) -> Self {
        self.push(filter);
        self
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn admits(&self, entry: &IndexEntry, buffered: &QueryRect) -> bool {
        self.filters
            .iter()
            .all(|filter| filter.is_potential_obstacle(entry, buffered))
    }

    /// Appends `filter` for the lifetime of the returned guard only.
    pub fn scoped<'s>(&'s mut self, filter: impl AdmissionFilter + 'a) -> ScopedFilter<'s, 'a> {
        let depth = self.filters.len();
        self.push(filter);
        ScopedFilter { chain: self, depth }
    }
}

pub struct ScopedFilter<'s, 'a> {
    chain: &'s mut FilterChain<'a>,
    depth: usize,
}

impl<'a> Deref for ScopedFilter<'_, 'a> {
    type Target = FilterChain<'a>;

    fn deref(&self) -> &FilterChain<'a> {
        self.chain
    }
}

impl<'a> DerefMut for ScopedFilter<'_, 'a> {
    fn deref_mut(&mut self) -> &mut FilterChain<'a> {
        self.chain
    }
}

impl Drop for ScopedFilter<'_, '_> {
    fn drop(&mut self) {
        self.chain.filters.truncate(self.depth);
    }
}

/// Drops hits on the labeled feature when its rule tolerates self-overlap.
#[derive(Debug, Clone, Copy)]
pub struct SelfOverlapFilter {
    pub feature: FeatureId,
    pub tolerate: bool,
}

impl AdmissionFilter for SelfOverlapFilter {
    fn is_potential_obstacle(&self, entry: &IndexEntry, _buffered: &QueryRect) -> bool {
        !(self.tolerate && entry.owner == OwnerRef::Feature(self.feature))
    }
}

/// Drops the label's own previously placed parts and leaders.
#[derive(Debug, Clone, Copy)]
pub struct OwnLabelFilter(pub LabelId);

impl AdmissionFilter for OwnLabelFilter {
    fn is_potential_obstacle(&self, entry: &IndexEntry, _buffered: &QueryRect) -> bool {
        entry.owner != OwnerRef::Label(self.0)
    }
}

/// Drops entries on layers that are not drawn.
#[derive(Debug, Clone, Default)]
pub struct HiddenLayerFilter {
    pub hidden: HashSet<u32>,
}

impl AdmissionFilter for HiddenLayerFilter {
    fn is_potential_obstacle(&self, entry: &IndexEntry, _buffered: &QueryRect) -> bool {
        !self.hidden.contains(&entry.layer)
    }
}
