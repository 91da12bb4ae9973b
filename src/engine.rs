// Frame driver: ranks label requests, searches candidate positions through
// the relaxation ladder and records accepted labels as new obstacles.

use crate::config::PlacementConfig;
use crate::error::{PlacementError, Result, try_push};
use crate::geometry::{
    Point, QueryRect, Rect, distance_to_polyline, point_in_polygon, polygon_centroid,
};
use crate::metrics::TextMetrics;
use crate::model::{Feature, FeatureGeometry, LabelId, PlacementRule};
use crate::obstacle::{
    DetectorStats, EntryId, FilterChain, GridIndex, HiddenLayerFilter, IndexEntry,
    ObstacleDetector, ObstacleOverlapSummary, OwnLabelFilter, OwnerKind, OwnerRef,
    SelfOverlapFilter, Shape, SpatialContext,
};
use crate::placement::{
    Anchor, BookmarkKind, CandidateCursor, CandidatePosition, Justification, LabelRequest,
    LeaderCandidate, PlacedLabel, PlacementStatus,
};
use crate::priority_queue::PriorityQueue;
use std::collections::HashSet;
use std::f64::consts::{FRAC_PI_2, PI};
use std::sync::Arc;
use tracing::{debug, debug_span};

/// Fractions along the longest segment of a line tried as anchors, best first.
const LINE_ANCHOR_FRACTIONS: [f64; 5] = [0.5, 0.35, 0.65, 0.2, 0.8];
/// Offsets, as fractions of the area envelope, spreading interior anchors.
const AREA_GRID_STEPS: [f64; 3] = [0.0, -0.25, 0.25];
/// Moves a bumped box strictly past the touching position.
const BUMP_SLACK: f64 = 1e-6;
/// Half thickness of the corridor a leader line must keep clear.
const LEADER_HALF_WIDTH: f64 = 0.5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameReport {
    pub placed: usize,
    pub placed_with_hiding: usize,
    pub forced: usize,
    pub suppressed: usize,
    pub unplaced: usize,
}

impl FrameReport {
    fn record(&mut self, status: PlacementStatus) {
        let slot = match status {
            PlacementStatus::Placed => &mut self.placed,
            PlacementStatus::PlacedWithHiding => &mut self.placed_with_hiding,
            PlacementStatus::Forced => &mut self.forced,
            PlacementStatus::Suppressed => &mut self.suppressed,
            PlacementStatus::UnPlaced => &mut self.unplaced,
        };
        *slot += 1;
    }

    /// Labels that end up drawn this frame.
    pub fn drawn(&self) -> usize {
        self.placed + self.placed_with_hiding + self.forced
    }
}

pub struct LabelEngine<M> {
    config: PlacementConfig,
    metrics: M,
    index: GridIndex,
    detector: ObstacleDetector,
    requests: Vec<LabelRequest>,
    hidden_layers: HashSet<u32>,
}

impl<M: TextMetrics> LabelEngine<M> {
    pub fn new(config: PlacementConfig, metrics: M) -> Self {
        let index = GridIndex::new(config.grid_cell_size);
        Self {
            config,
            metrics,
            index,
            detector: ObstacleDetector::new(),
            requests: Vec::new(),
            hidden_layers: HashSet::new(),
        }
    }

    pub fn config(&self) -> &PlacementConfig {
        &self.config
    }

    /// Frame-level settings such as the neatline and stability policy.
    /// Use [`PlacementConfig::scoped`] on the result for a temporary override.
    pub fn config_mut(&mut self) -> &mut PlacementConfig {
        &mut self.config
    }

    pub fn index(&self) -> &GridIndex {
        &self.index
    }

    pub fn index_mut(&mut self) -> &mut GridIndex {
        &mut self.index
    }

    pub fn detector_stats(&self) -> DetectorStats {
        self.detector.stats()
    }

    /// Registers a map feature as a static obstacle. `symbol_radius` sizes
    /// the drawn symbol of point features.
    pub fn add_feature_obstacle(&mut self, feature: &Feature, symbol_radius: f64) -> Result<EntryId> {
        let (shape, kind) = match &feature.geometry {
            FeatureGeometry::Point(at) => (
                Shape::Point {
                    at: *at,
                    radius: symbol_radius.max(0.0),
                },
                OwnerKind::PointFeature,
            ),
            FeatureGeometry::Line(points) => (Shape::Polyline(points.clone()), OwnerKind::LineFeature),
            FeatureGeometry::Area(points) => (Shape::Polygon(points.clone()), OwnerKind::AreaFeature),
        };
        self.index.insert(IndexEntry {
            shape,
            kind,
            owner: OwnerRef::Feature(feature.id),
            layer: feature.layer,
        })
    }

    pub fn add_request(&mut self, request: LabelRequest) -> Result<()> {
        try_push(&mut self.requests, request, "label request")
    }

    pub fn requests(&self) -> &[LabelRequest] {
        &self.requests
    }

    pub fn request(&self, id: LabelId) -> Option<&LabelRequest> {
        self.requests.iter().find(|r| r.id() == id)
    }

    /// Obstacles on `layer` stop blocking labels from the next frame on.
    pub fn hide_layer(&mut self, layer: u32) {
        self.hidden_layers.insert(layer);
    }

    pub fn show_layer(&mut self, layer: u32) {
        self.hidden_layers.remove(&layer);
    }

    /// One full labeling pass. Labels placed last frame are lifted from the
    /// index and every request is searched again in priority order.
    pub fn run_frame(&mut self) -> Result<FrameReport> {
        let span = debug_span!("frame", requests = self.requests.len());
        let _guard = span.enter();

        for request in &mut self.requests {
            self.index.remove_owner(OwnerRef::Label(request.id()));
            request.begin_frame();
        }

        let policy = self.config.stability_policy;
        let mut ranked: Vec<(f64, usize)> = Vec::new();
        ranked
            .try_reserve_exact(self.requests.len())
            .map_err(PlacementError::exhausted("frame ranking"))?;
        ranked.extend(
            self.requests
                .iter()
                .enumerate()
                .map(|(slot, request)| (request.priority(policy), slot)),
        );
        let mut queue = PriorityQueue::with_capacity(ranked.len())?;
        queue.absorb_all_elements(&mut ranked)?;

        let mut report = FrameReport::default();
        while let Some((_, slot)) = queue.dequeue_best_element() {
            report.record(self.place(slot)?);
        }
        debug!(?report, "frame finished");
        Ok(report)
    }

    fn place(&mut self, slot: usize) -> Result<PlacementStatus> {
        let Self {
            config,
            metrics,
            index,
            detector,
            requests,
            hidden_layers,
        } = self;
        let request = requests
            .get_mut(slot)
            .ok_or_else(|| PlacementError::IllegalOperation(format!("no label request at {slot}")))?;
        let span = debug_span!("request", label = request.id().0);
        let _guard = span.enter();

        match request.validate(&*metrics) {
            Ok(()) => {}
            Err(PlacementError::Validation(failure)) => {
                debug!(%failure, "label suppressed");
                request.suppress();
                return Ok(PlacementStatus::Suppressed);
            }
            Err(other) => return Err(other),
        }

        let rule = Arc::clone(request.rule());
        let feature = Arc::clone(request.feature());
        let label_id = request.id();
        let tolerate_self =
            rule.allow_self_overlap || matches!(feature.geometry, FeatureGeometry::Area(_));
        let mut chain = FilterChain::new()
            .with(OwnLabelFilter(label_id))
            .with(SelfOverlapFilter {
                feature: feature.id,
                tolerate: tolerate_self,
            });
        if !hidden_layers.is_empty() {
            chain.push(HiddenLayerFilter {
                hidden: hidden_layers.clone(),
            });
        }

        let mut fallback: Option<PlacedLabel> = None;
        let accepted = loop {
            let working = request.working_label().clone();
            let (width, height) = working.extent(&*metrics);
            generate_candidates(request, &rule, width, height)?;
            let tolerance = request.state().overhang_tolerance();
            if fallback.is_none() {
                fallback = request.state().candidates().iter().next().map(|position| PlacedLabel {
                    position: *position,
                    footprint: position.footprint(width, height),
                    label: working.clone(),
                    leader: None,
                    tolerance,
                });
            }

            let mut search = Search {
                detector: &mut *detector,
                ctx: SpatialContext {
                    index: &*index,
                    neatline: config.neatline,
                    buffers: request.state().buffers(),
                },
                chain: &mut chain,
                rule: &rule,
                feature: &feature,
                width,
                height,
                tolerance,
            };
            if working.has_visible_text() {
                if let Some(hit) = search.run(request)? {
                    break Some((hit, working, tolerance));
                }
            }
            if let Some(step) = request.state_mut().relax(&rule.relaxation_order) {
                debug!(?step, "no clean candidate, relaxing");
                continue;
            }
            if request.state_mut().advance_overhang() {
                debug!(
                    tolerance = request.state().overhang_tolerance(),
                    "ladder exhausted, loosening overhang tolerance"
                );
                request.state_mut().candidates_mut().clear();
                continue;
            }
            break None;
        };

        let status = match accepted {
            Some((hit, label, tolerance)) => {
                let status = request.accept(PlacedLabel {
                    position: hit.position,
                    footprint: hit.footprint,
                    label,
                    leader: hit.leader,
                    tolerance,
                })?;
                record_obstacles(index, label_id, feature.layer, &hit.footprint, hit.leader.as_ref())?;
                status
            }
            None => match fallback {
                Some(placed) if rule.never_remove => {
                    record_obstacles(index, label_id, feature.layer, &placed.footprint, None)?;
                    request.force(placed);
                    PlacementStatus::Forced
                }
                _ => {
                    debug!("no acceptable position");
                    PlacementStatus::UnPlaced
                }
            },
        };
        Ok(status)
    }
}

/// A position that passed obstacle testing, with the leader reaching it.
struct Hit {
    position: CandidatePosition,
    footprint: QueryRect,
    leader: Option<LeaderCandidate>,
}

/// Everything the candidate loops of one ladder step share.
struct Search<'a> {
    detector: &'a mut ObstacleDetector,
    ctx: SpatialContext<'a, GridIndex>,
    chain: &'a mut FilterChain<'static>,
    rule: &'a PlacementRule,
    feature: &'a Feature,
    width: f64,
    height: f64,
    tolerance: f64,
}

impl Search<'_> {
    fn query(&mut self, footprint: &QueryRect) -> Result<ObstacleOverlapSummary> {
        self.detector.get_overlaps(
            footprint,
            Some(self.feature.id),
            Some(&*self.chain),
            &self.ctx,
            self.rule.avoid,
        )
    }

    fn run(&mut self, request: &mut LabelRequest) -> Result<Option<Hit>> {
        if let Some(hit) = self.offset_pass(request)? {
            return Ok(Some(hit));
        }
        if let Some(hit) = self.overline_pass(request)? {
            return Ok(Some(hit));
        }
        if let Some(hit) = self.bump_pass(request)? {
            return Ok(Some(hit));
        }
        self.leader_pass(request)
    }

    /// Tests candidates generated since the last offset pass as they are.
    fn offset_pass(&mut self, request: &mut LabelRequest) -> Result<Option<Hit>> {
        for (cursor, position) in pending(request, BookmarkKind::Offset) {
            let footprint = position.footprint(self.width, self.height);
            let summary = self.query(&footprint)?;
            request
                .state_mut()
                .candidates_mut()
                .set_bookmark(BookmarkKind::Offset, cursor)?;
            if summary.fits_within(self.tolerance) {
                return Ok(Some(Hit {
                    position,
                    footprint,
                    leader: None,
                }));
            }
        }
        Ok(None)
    }

    /// Line labels that may overlap their own line: try each candidate
    /// moved onto the line.
    fn overline_pass(&mut self, request: &mut LabelRequest) -> Result<Option<Hit>> {
        let feature = self.feature;
        let FeatureGeometry::Line(points) = &feature.geometry else {
            return Ok(None);
        };
        if !self.rule.allow_self_overlap {
            return Ok(None);
        }
        let lift = self.rule.point_offset + self.height / 2.0;
        for (cursor, position) in pending(request, BookmarkKind::Overline) {
            request
                .state_mut()
                .candidates_mut()
                .set_bookmark(BookmarkKind::Overline, cursor)?;
            let footprint = position.footprint(self.width, self.height);
            let over = [
                footprint.translate_local(0.0, -lift),
                footprint.translate_local(0.0, lift),
            ]
            .into_iter()
            .min_by(|a, b| {
                distance_to_polyline(a.center(), points)
                    .total_cmp(&distance_to_polyline(b.center(), points))
            });
            let Some(over) = over else {
                continue;
            };
            if self.query(&over)?.fits_within(self.tolerance) {
                return Ok(Some(Hit {
                    position: moved(&position, &over),
                    footprint: over,
                    leader: None,
                }));
            }
        }
        Ok(None)
    }

    /// Nudges colliding candidates by their cheapest escape shift.
    fn bump_pass(&mut self, request: &mut LabelRequest) -> Result<Option<Hit>> {
        if self.rule.max_bump <= 0.0 {
            return Ok(None);
        }
        for (cursor, position) in pending(request, BookmarkKind::Bump) {
            let footprint = position.footprint(self.width, self.height);
            let summary = self.query(&footprint)?;
            request
                .state_mut()
                .candidates_mut()
                .set_bookmark(BookmarkKind::Bump, cursor)?;
            if !summary.is_complete() {
                continue;
            }
            for (dx, dy) in bump_moves(&summary, self.rule.max_bump) {
                let bumped = footprint.translate_local(dx, dy);
                if self.query(&bumped)?.fits_within(self.tolerance) {
                    return Ok(Some(Hit {
                        position: moved(&position, &bumped),
                        footprint: bumped,
                        leader: None,
                    }));
                }
            }
        }
        Ok(None)
    }

    /// Point labels with a leader allowance: try each slot pushed out to
    /// the leader length, keeping the leader itself clear.
    fn leader_pass(&mut self, request: &mut LabelRequest) -> Result<Option<Hit>> {
        let (rule, feature) = (self.rule, self.feature);
        let (Some(reach), FeatureGeometry::Point(anchor)) = (rule.max_leader_length, &feature.geometry)
        else {
            return Ok(None);
        };
        for slot in &rule.point_positions {
            let lower_left = slot.lower_left(*anchor, self.width, self.height, reach);
            let position = CandidatePosition::new(request.id(), lower_left, 0.0, slot.justification());
            let footprint = position.footprint(self.width, self.height);
            let envelope = footprint.envelope();
            let leader = LeaderCandidate {
                anchor: *anchor,
                attach: Point::new(
                    anchor.x.clamp(envelope.min_x, envelope.max_x),
                    anchor.y.clamp(envelope.min_y, envelope.max_y),
                ),
            };
            request.state_mut().push_leader_candidate(leader)?;
            if !self.query(&footprint)?.fits_within(self.tolerance) {
                continue;
            }
            if self.leader_is_clear(&leader)? {
                return Ok(Some(Hit {
                    position,
                    footprint,
                    leader: Some(leader),
                }));
            }
        }
        Ok(None)
    }

    fn leader_is_clear(&mut self, leader: &LeaderCandidate) -> Result<bool> {
        let length = leader.length();
        if length <= f64::EPSILON {
            return Ok(true);
        }
        let (a, b) = (leader.anchor, leader.attach);
        let corridor = QueryRect::new(
            Point::new((a.x + b.x) * 0.5, (a.y + b.y) * 0.5),
            length * 0.5,
            LEADER_HALF_WIDTH,
            (b.y - a.y).atan2(b.x - a.x),
        );
        let feature = self.feature.id;
        // The leader starts on its own feature.
        let chain = self.chain.scoped(SelfOverlapFilter {
            feature,
            tolerate: true,
        });
        let summary =
            self.detector
                .get_overlaps(&corridor, Some(feature), Some(&*chain), &self.ctx, self.rule.avoid)?;
        Ok(summary.fits_within(self.tolerance))
    }
}

fn pending(request: &LabelRequest, kind: BookmarkKind) -> Vec<(CandidateCursor, CandidatePosition)> {
    request
        .state()
        .candidates()
        .bookmarked(kind)
        .map(|(cursor, position)| (cursor, *position))
        .collect()
}

fn moved(position: &CandidatePosition, footprint: &QueryRect) -> CandidatePosition {
    CandidatePosition::new(
        position.label(),
        footprint.lower_left(),
        position.angle(),
        position.justification(),
    )
}

/// Local-frame moves that clear every collision, cheapest first. Moves
/// contradicted by the neatline or longer than `max` are skipped.
fn bump_moves(summary: &ObstacleOverlapSummary, max: f64) -> Vec<(f64, f64)> {
    let mut moves: Vec<(f64, (f64, f64))> = [
        summary
            .overall_shift_right()
            .map(|d| (d, (d + BUMP_SLACK, 0.0))),
        summary
            .overall_shift_left()
            .map(|d| (d, (-(d + BUMP_SLACK), 0.0))),
        summary.overall_shift_up().map(|d| (d, (0.0, d + BUMP_SLACK))),
        summary
            .overall_shift_down()
            .map(|d| (d, (0.0, -(d + BUMP_SLACK)))),
    ]
    .into_iter()
    .flatten()
    .filter(|(d, _)| *d > 0.0 && *d <= max)
    .collect();
    moves.sort_by(|a, b| a.0.total_cmp(&b.0));
    moves.into_iter().map(|(_, m)| m).collect()
}

fn generate_candidates(
    request: &mut LabelRequest,
    rule: &PlacementRule,
    width: f64,
    height: f64,
) -> Result<()> {
    let feature = Arc::clone(request.feature());
    let label = request.id();
    let anchors = request
        .state_mut()
        .feature_anchors(|| feature_anchors(&feature.geometry))
        .to_vec();

    let mut fresh = Vec::new();
    for anchor in &anchors {
        match &feature.geometry {
            FeatureGeometry::Point(_) => {
                for slot in &rule.point_positions {
                    fresh.push(CandidatePosition::new(
                        label,
                        slot.lower_left(anchor.at, width, height, rule.point_offset),
                        0.0,
                        slot.justification(),
                    ));
                }
            }
            FeatureGeometry::Line(_) => {
                let frame = QueryRect::new(anchor.at, 0.0, 0.0, anchor.angle);
                for local_y in [rule.point_offset, -rule.point_offset - height] {
                    fresh.push(CandidatePosition::new(
                        label,
                        frame.to_world(Point::new(-width / 2.0, local_y)),
                        anchor.angle,
                        Justification::Center,
                    ));
                }
            }
            FeatureGeometry::Area(_) => {
                fresh.push(CandidatePosition::new(
                    label,
                    anchor.at.offset(-width / 2.0, -height / 2.0),
                    0.0,
                    Justification::Center,
                ));
            }
        }
    }

    let candidates = request.state_mut().candidates_mut();
    for position in fresh {
        candidates.push(position)?;
    }
    Ok(())
}

fn feature_anchors(geometry: &FeatureGeometry) -> Vec<Anchor> {
    match geometry {
        FeatureGeometry::Point(at) => vec![Anchor { at: *at, angle: 0.0 }],
        FeatureGeometry::Line(points) => line_anchors(points),
        FeatureGeometry::Area(points) => area_anchors(points),
    }
}

fn line_anchors(points: &[Point]) -> Vec<Anchor> {
    let Some((a, b)) = points
        .windows(2)
        .map(|w| (w[0], w[1]))
        .max_by(|x, y| x.0.distance(x.1).total_cmp(&y.0.distance(y.1)))
    else {
        return Vec::new();
    };
    let angle = upright((b.y - a.y).atan2(b.x - a.x));
    LINE_ANCHOR_FRACTIONS
        .iter()
        .map(|t| Anchor {
            at: Point::new(a.x + (b.x - a.x) * t, a.y + (b.y - a.y) * t),
            angle,
        })
        .collect()
}

/// Keeps text reading left to right.
fn upright(angle: f64) -> f64 {
    if angle > FRAC_PI_2 {
        angle - PI
    } else if angle <= -FRAC_PI_2 {
        angle + PI
    } else {
        angle
    }
}

fn area_anchors(points: &[Point]) -> Vec<Anchor> {
    let Some(envelope) = Rect::from_points(points.iter().copied()) else {
        return Vec::new();
    };
    let center = polygon_centroid(points)
        .filter(|c| point_in_polygon(*c, points))
        .unwrap_or_else(|| envelope.center());
    let mut anchors = Vec::new();
    for fy in AREA_GRID_STEPS {
        for fx in AREA_GRID_STEPS {
            let at = center.offset(fx * envelope.width(), fy * envelope.height());
            if point_in_polygon(at, points) {
                anchors.push(Anchor { at, angle: 0.0 });
            }
        }
    }
    if anchors.is_empty() {
        anchors.push(Anchor {
            at: center,
            angle: 0.0,
        });
    }
    anchors
}

fn record_obstacles(
    index: &mut GridIndex,
    label: LabelId,
    layer: u32,
    footprint: &QueryRect,
    leader: Option<&LeaderCandidate>,
) -> Result<()> {
    index.insert(IndexEntry {
        shape: Shape::Box(*footprint),
        kind: OwnerKind::PlacedText,
        owner: OwnerRef::Label(label),
        layer,
    })?;
    if let Some(leader) = leader {
        index.insert(IndexEntry {
            shape: Shape::Polyline(vec![leader.anchor, leader.attach]),
            kind: OwnerKind::Leader,
            owner: OwnerRef::Label(label),
            layer,
        })?;
    }
    Ok(())
}
