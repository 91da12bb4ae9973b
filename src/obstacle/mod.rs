//! Obstacle detection for candidate label footprints.
//!
//! [`ObstacleDetector::get_overlaps`] bounds a query box, asks the spatial
//! index for nearby entries, runs each through an admission [`FilterChain`],
//! and classifies the survivors into an [`ObstacleOverlapSummary`]. Each
//! obstacle category is tested against the query inflated by its own buffer,
//! so the reported shifts clear the clearance as well as the obstacle.

pub mod filter;
pub mod index;
pub mod overlap;
pub mod summary;

pub use filter::{AdmissionFilter, FilterChain, HiddenLayerFilter, OwnLabelFilter, SelfOverlapFilter};
pub use index::{EntryId, GridIndex, IndexEntry, ObstacleIndex, OwnerKind, OwnerRef, Shape};
pub use overlap::{Crossing, Fragment, ObstacleKind, ObstacleOverlap, OverlapGeometry, Shifts};
pub use summary::ObstacleOverlapSummary;

use crate::error::{PlacementError, Result};
use crate::geometry::{Point, QueryRect, Rect};
use crate::model::FeatureId;
use summary::NeatlineAxis;
use tracing::{debug, trace};

bitflags::bitflags! {
    /// Obstacle categories to test, plus query behaviour switches.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ObstacleFlags: u8 {
        const AREA_FEATURES = 1 << 0;
        const LINE_FEATURES = 1 << 1;
        const POINT_FEATURES = 1 << 2;
        /// Placed label text and symbols.
        const PLACED_TEXT = 1 << 3;
        const LEADERS = 1 << 4;
        /// Return after the first admitted obstacle; the summary is marked incomplete.
        const STOP_AT_FIRST = 1 << 5;
        const ALL_OBSTACLES = Self::AREA_FEATURES.bits()
            | Self::LINE_FEATURES.bits()
            | Self::POINT_FEATURES.bits()
            | Self::PLACED_TEXT.bits()
            | Self::LEADERS.bits();
    }
}

impl ObstacleFlags {
    pub fn tests(self, kind: ObstacleKind) -> bool {
        let flag = match kind {
            ObstacleKind::Area => ObstacleFlags::AREA_FEATURES,
            ObstacleKind::Line => ObstacleFlags::LINE_FEATURES,
            ObstacleKind::Point => ObstacleFlags::POINT_FEATURES,
            ObstacleKind::Text => ObstacleFlags::PLACED_TEXT,
            ObstacleKind::Leader => ObstacleFlags::LEADERS,
        };
        self.contains(flag)
    }
}

/// Clearances required between a label and each obstacle category.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Buffers {
    pub feature: f64,
    pub label: f64,
    pub leader: f64,
}

impl Buffers {
    pub fn for_kind(&self, kind: ObstacleKind) -> f64 {
        let buffer = match kind {
            ObstacleKind::Area | ObstacleKind::Line | ObstacleKind::Point => self.feature,
            ObstacleKind::Text => self.label,
            ObstacleKind::Leader => self.leader,
        };
        buffer.max(0.0)
    }

    fn widest(&self) -> f64 {
        self.feature.max(self.label).max(self.leader).max(0.0)
    }
}

/// Everything a query reads besides the footprint itself.
pub struct SpatialContext<'a, I: ObstacleIndex + ?Sized> {
    pub index: &'a I,
    pub neatline: Option<Rect>,
    pub buffers: Buffers,
}

impl<I: ObstacleIndex + ?Sized> Clone for SpatialContext<'_, I> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<I: ObstacleIndex + ?Sized> Copy for SpatialContext<'_, I> {}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DetectorStats {
    pub queries: u64,
    pub index_hits: u64,
    pub vetoed: u64,
    pub overlaps: u64,
}

#[derive(Debug, Default)]
pub struct ObstacleDetector {
    stats: DetectorStats,
}

impl ObstacleDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> DetectorStats {
        self.stats
    }

    /// Collects every obstacle colliding with `query`.
    ///
    /// `labeled` is the feature being labeled; collisions with it are marked so
    /// self-overlap can be tolerated or reported separately. A fully obstructed
    /// candidate is a normal result. Errors only report allocation failure, in
    /// which case no partial summary is returned.
    pub fn get_overlaps<I>(
        &mut self,
        query: &QueryRect,
        labeled: Option<FeatureId>,
        chain: Option<&FilterChain<'_>>,
        ctx: &SpatialContext<'_, I>,
        flags: ObstacleFlags,
    ) -> Result<ObstacleOverlapSummary>
    where
        I: ObstacleIndex + ?Sized,
    {
        self.stats.queries += 1;
        let mut summary = ObstacleOverlapSummary::new(*query);
        let envelope = query.inflate(ctx.buffers.widest()).envelope();

        for (id, entry) in ctx.index.query(&envelope)? {
            self.stats.index_hits += 1;
            let kind = ObstacleKind::from(entry.kind);
            if !flags.tests(kind) {
                continue;
            }
            let buffered = query.inflate(ctx.buffers.for_kind(kind));
            if let Some(chain) = chain {
                if !chain.admits(entry, &buffered) {
                    self.stats.vetoed += 1;
                    trace!(?id, ?kind, "obstacle vetoed by admission filter");
                    continue;
                }
            }
            let fragments = overlap::collide(&entry.shape, &buffered)?;
            if fragments.is_empty() {
                continue;
            }
            let labeled_feature = matches!(
                (entry.owner, labeled),
                (OwnerRef::Feature(owner), Some(feature)) if owner == feature
            );
            let mut hit = ObstacleOverlap::new(kind, entry.owner, id, labeled_feature);
            for fragment in fragments {
                hit.push_geometry(OverlapGeometry::new(fragment, &buffered))?;
            }
            trace!(?id, ?kind, labeled_feature, shifts = ?hit.shifts(), "obstacle admitted");
            summary.add(hit)?;
            self.stats.overlaps += 1;
            if flags.contains(ObstacleFlags::STOP_AT_FIRST) {
                summary.mark_incomplete();
                break;
            }
        }

        if let Some(neatline) = ctx.neatline {
            let (x, y) = neatline_axes(query, &neatline);
            summary.set_neatline(x, y);
        }
        debug!(
            overlapping = summary.is_overlapping(),
            count = summary.overlap_count(),
            complete = summary.is_complete(),
            "obstacle query finished"
        );
        Ok(summary)
    }

    /// Runs one query per part of a multi-part label and merges the results
    /// into a single summary. All parts must share a rotation.
    pub fn get_overlaps_for_parts<I>(
        &mut self,
        parts: &[QueryRect],
        labeled: Option<FeatureId>,
        chain: Option<&FilterChain<'_>>,
        ctx: &SpatialContext<'_, I>,
        flags: ObstacleFlags,
    ) -> Result<ObstacleOverlapSummary>
    where
        I: ObstacleIndex + ?Sized,
    {
        let Some((first, rest)) = parts.split_first() else {
            return Err(PlacementError::IllegalOperation(
                "multi-part query without parts".into(),
            ));
        };
        let mut summary = self.get_overlaps(first, labeled, chain, ctx, flags)?;
        for part in rest {
            if flags.contains(ObstacleFlags::STOP_AT_FIRST) && summary.is_overlapping() {
                summary.mark_incomplete();
                break;
            }
            let child = self.get_overlaps(part, labeled, chain, ctx, flags)?;
            summary.absorb(child)?;
        }
        Ok(summary)
    }
}

const AXIS_EPS: f64 = 1e-12;

/// Feasible travel along each of the box's axes that keeps every corner
/// inside the neatline. Constraints perpendicular to an axis are left to
/// the other axis.
fn neatline_axes(query: &QueryRect, neatline: &Rect) -> (NeatlineAxis, NeatlineAxis) {
    let corners = query.corners();
    (
        neatline_axis(&corners, query.axis_x(), neatline),
        neatline_axis(&corners, query.axis_y(), neatline),
    )
}

fn neatline_axis(corners: &[Point; 4], dir: Point, neatline: &Rect) -> NeatlineAxis {
    let mut lo = f64::NEG_INFINITY;
    let mut hi = f64::INFINITY;
    for c in corners {
        for (d, pos, min, max) in [
            (dir.x, c.x, neatline.min_x, neatline.max_x),
            (dir.y, c.y, neatline.min_y, neatline.max_y),
        ] {
            if d.abs() <= AXIS_EPS {
                continue;
            }
            let t1 = (min - pos) / d;
            let t2 = (max - pos) / d;
            lo = lo.max(t1.min(t2));
            hi = hi.min(t1.max(t2));
        }
    }
    let shift = if lo > 0.0 {
        lo
    } else if hi < 0.0 {
        hi
    } else {
        0.0
    };
    NeatlineAxis {
        shift,
        room_forward: hi,
        room_backward: -lo,
        overflow: lo > hi + 1e-9,
    }
}
