use std::path::Path;
use std::sync::Arc;

use label_placer::geometry::{Point, QueryRect, Rect};
use label_placer::metrics::MonospaceMetrics;
use label_placer::model::{
    Feature, FeatureGeometry, FeatureId, Label, LabelClass, LabelId, PlacementRule, TextObject,
};
use label_placer::obstacle::{
    GridIndex, IndexEntry, ObstacleDetector, ObstacleFlags, ObstacleIndex, OwnerKind, OwnerRef,
    Shape, SpatialContext,
};
use label_placer::placement::{Justification, PointPosition, Relaxation};
use label_placer::{
    LabelEngine, LabelRequest, PlacementConfig, PlacementState, PlacementStatus, StabilityPolicy,
    load_config,
};

// Monospace fixtures: a 10pt glyph is 6 wide and a line is 12 tall.

fn point(id: u64, x: f64, y: f64) -> Arc<Feature> {
    Arc::new(Feature {
        id: FeatureId(id),
        layer: 0,
        geometry: FeatureGeometry::Point(Point::new(x, y)),
    })
}

fn square(id: u64, layer: u32, min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Feature {
    Feature {
        id: FeatureId(id),
        layer,
        geometry: FeatureGeometry::Area(vec![
            Point::new(min_x, min_y),
            Point::new(max_x, min_y),
            Point::new(max_x, max_y),
            Point::new(min_x, max_y),
        ]),
    }
}

/// Only the north-east slot, no bumping and no relaxation unless a test
/// asks for it.
fn strict_rule() -> PlacementRule {
    PlacementRule {
        point_positions: vec![PointPosition::NorthEast],
        max_bump: 0.0,
        relaxation_order: Vec::new(),
        ..PlacementRule::default()
    }
}

fn request(
    label: Label,
    feature: Arc<Feature>,
    priority: f64,
    rule: PlacementRule,
) -> LabelRequest {
    let class = LabelClass::new("test", priority, Arc::new(rule));
    LabelRequest::new(Arc::new(label), feature, Arc::new(class)).expect("request")
}

fn engine() -> LabelEngine<MonospaceMetrics> {
    LabelEngine::new(PlacementConfig::default(), MonospaceMetrics::default())
}

fn status_of(engine: &LabelEngine<MonospaceMetrics>, id: u64) -> PlacementStatus {
    engine.request(LabelId(id)).expect("known label").status()
}

#[test]
fn one_font_step_clears_a_blocked_point_label() {
    let mut engine = engine();
    // The full-size box spans x 2..38; with the feature buffer it reaches 40.
    engine
        .add_feature_obstacle(&square(99, 0, 36.0, 0.0, 50.0, 20.0), 0.0)
        .expect("obstacle");
    let rule = PlacementRule {
        max_font_steps: 2,
        font_step_percent: 20.0,
        relaxation_order: vec![Relaxation::Font],
        ..strict_rule()
    };
    engine
        .add_request(request(
            Label::single(LabelId(1), "Denver", 10.0),
            point(1, 0.0, 0.0),
            1.0,
            rule,
        ))
        .expect("add");

    let report = engine.run_frame().expect("frame");
    assert_eq!(report.placed, 1);
    let request = engine.request(LabelId(1)).expect("request");
    assert_eq!(request.state().ladder().font_step(), 1);
    let placed = request.placed().expect("placed label");
    assert!((placed.label.text_objects[0].font_size - 8.0).abs() < 1e-9);
    assert_eq!(request.label().text_objects[0].font_size, 10.0);
}

#[test]
fn regenerated_candidate_is_clean_after_one_font_step() {
    let metrics = MonospaceMetrics::default();
    let mut index = GridIndex::new(32.0);
    index
        .insert(IndexEntry {
            shape: Shape::Polygon(vec![
                Point::new(36.0, 0.0),
                Point::new(50.0, 0.0),
                Point::new(50.0, 20.0),
                Point::new(36.0, 20.0),
            ]),
            kind: OwnerKind::AreaFeature,
            owner: OwnerRef::Feature(FeatureId(99)),
            layer: 0,
        })
        .expect("obstacle");

    let label = Label::single(LabelId(1), "Denver", 10.0);
    let geometry = FeatureGeometry::Point(Point::new(0.0, 0.0));
    let rule = PlacementRule {
        max_font_steps: 2,
        font_step_percent: 20.0,
        ..strict_rule()
    };
    let mut state = PlacementState::initialize(&label, &rule, &geometry);
    let mut detector = ObstacleDetector::new();

    let mut overlaps_at = |state: &mut PlacementState| {
        let (w, h) = state.working_label(&label).extent(&metrics);
        let ll = PointPosition::NorthEast.lower_left(Point::new(0.0, 0.0), w, h, rule.point_offset);
        let footprint = QueryRect::from_lower_left(ll, w, h, 0.0);
        let ctx = SpatialContext {
            index: &index,
            neatline: None,
            buffers: state.buffers(),
        };
        detector
            .get_overlaps(&footprint, Some(FeatureId(1)), None, &ctx, ObstacleFlags::ALL_OBSTACLES)
            .expect("query")
    };

    assert!(overlaps_at(&mut state).is_overlapping());
    assert_eq!(state.relax(&[Relaxation::Font]), Some(Relaxation::Font));
    assert!(!overlaps_at(&mut state).is_overlapping());
    assert_eq!(state.ladder().font_step(), 1);
}

#[test]
fn hiding_a_part_reports_placed_with_hiding() {
    let mut engine = engine();
    // Two stacked lines reach y 26; one line stops at 14.
    engine
        .add_feature_obstacle(&square(99, 0, 0.0, 20.0, 60.0, 40.0), 0.0)
        .expect("obstacle");
    let label = Label::new(
        LabelId(1),
        vec![
            TextObject::new("Mt Hood", 10.0),
            TextObject::new("3429 m", 10.0).hideable(),
        ],
    );
    let rule = PlacementRule {
        relaxation_order: vec![Relaxation::Hide],
        ..strict_rule()
    };
    engine
        .add_request(request(label, point(1, 0.0, 0.0), 1.0, rule))
        .expect("add");

    let report = engine.run_frame().expect("frame");
    assert_eq!(report.placed_with_hiding, 1);
    let placed = engine.request(LabelId(1)).and_then(|r| r.placed()).expect("placed");
    assert!(placed.label.text_objects[1].hidden);
    assert!(!placed.label.text_objects[0].hidden);
}

#[test]
fn hiding_never_empties_a_fully_blocked_label() {
    let mut engine = engine();
    engine
        .add_feature_obstacle(&square(99, 0, -100.0, -100.0, 100.0, 100.0), 0.0)
        .expect("obstacle");
    let label = Label::new(LabelId(1), vec![TextObject::new("Spring", 10.0).hideable()]);
    let rule = PlacementRule {
        feature_buffer: 0.0,
        relaxation_order: vec![Relaxation::Hide],
        ..strict_rule()
    };
    engine
        .add_request(request(label, point(1, 0.0, 0.0), 1.0, rule))
        .expect("add");

    let report = engine.run_frame().expect("frame");
    assert_eq!(report.placed_with_hiding, 0);
    assert_eq!(report.drawn(), 0);
    assert_eq!(status_of(&engine, 1), PlacementStatus::UnPlaced);
    let request = engine.request(LabelId(1)).expect("request");
    assert_eq!(request.state().hidden_objects(), 0);
    assert!(request.placed().is_none());
    let texts = engine
        .index()
        .query(&Rect::new(-100.0, -100.0, 100.0, 100.0))
        .expect("query")
        .into_iter()
        .filter(|(_, entry)| entry.kind == OwnerKind::PlacedText)
        .count();
    assert_eq!(texts, 0);
}

#[test]
fn exhausted_ladder_leaves_label_unplaced_unless_never_remove() {
    let mut engine = engine();
    engine
        .add_feature_obstacle(&square(99, 0, -100.0, -100.0, 100.0, 100.0), 0.0)
        .expect("obstacle");
    engine
        .add_request(request(
            Label::single(LabelId(1), "Boulder", 10.0),
            point(1, 0.0, 0.0),
            1.0,
            strict_rule(),
        ))
        .expect("add");
    engine
        .add_request(request(
            Label::single(LabelId(2), "Golden", 10.0),
            point(2, 5.0, 5.0),
            1.0,
            PlacementRule {
                never_remove: true,
                ..strict_rule()
            },
        ))
        .expect("add");

    let report = engine.run_frame().expect("frame");
    assert_eq!(report.unplaced, 1);
    assert_eq!(report.forced, 1);
    assert_eq!(status_of(&engine, 1), PlacementStatus::UnPlaced);
    assert_eq!(status_of(&engine, 2), PlacementStatus::Forced);
    assert!(engine.request(LabelId(1)).and_then(|r| r.placed()).is_none());
}

#[test]
fn overhang_tolerance_admits_small_collisions() {
    let mut engine = engine();
    // Buffered box spans x 0..40; the obstacle intrudes by 1.
    engine
        .add_feature_obstacle(&square(99, 0, 39.0, -20.0, 60.0, 40.0), 0.0)
        .expect("obstacle");
    let rule = PlacementRule {
        overhang_tolerances: vec![0.0, 3.0],
        ..strict_rule()
    };
    engine
        .add_request(request(
            Label::single(LabelId(1), "Denver", 10.0),
            point(1, 0.0, 0.0),
            1.0,
            rule,
        ))
        .expect("add");

    engine.run_frame().expect("frame");
    let placed = engine.request(LabelId(1)).and_then(|r| r.placed()).expect("placed");
    assert_eq!(placed.tolerance, 3.0);
}

#[test]
fn bump_moves_candidate_clear_of_obstacle() {
    let mut engine = engine();
    engine
        .add_feature_obstacle(&square(99, 0, 39.0, -20.0, 60.0, 40.0), 0.0)
        .expect("obstacle");
    let rule = PlacementRule {
        max_bump: 4.0,
        ..strict_rule()
    };
    engine
        .add_request(request(
            Label::single(LabelId(1), "Denver", 10.0),
            point(1, 0.0, 0.0),
            1.0,
            rule,
        ))
        .expect("add");

    let report = engine.run_frame().expect("frame");
    assert_eq!(report.placed, 1);
    let placed = engine.request(LabelId(1)).and_then(|r| r.placed()).expect("placed");
    assert!((placed.position.lower_left().x - 1.0).abs() < 1e-4);
    assert_eq!(placed.tolerance, 0.0);
}

#[test]
fn higher_priority_wins_the_shared_slot() {
    let mut engine = engine();
    engine
        .add_request(request(
            Label::single(LabelId(1), "Minor", 10.0),
            point(1, 0.0, 0.0),
            1.0,
            strict_rule(),
        ))
        .expect("add");
    engine
        .add_request(request(
            Label::single(LabelId(2), "Major", 10.0),
            point(2, 0.0, 0.0),
            5.0,
            strict_rule(),
        ))
        .expect("add");

    let report = engine.run_frame().expect("frame");
    assert_eq!(report.placed, 1);
    assert_eq!(report.unplaced, 1);
    assert_eq!(status_of(&engine, 2), PlacementStatus::Placed);
    assert_eq!(status_of(&engine, 1), PlacementStatus::UnPlaced);
}

fn stability_run(policy: StabilityPolicy) -> (PlacementStatus, PlacementStatus) {
    let mut engine = engine();
    engine.config_mut().stability_policy = policy;
    engine
        .add_request(request(
            Label::single(LabelId(1), "Minor", 10.0),
            point(1, 0.0, 0.0),
            1.0,
            strict_rule(),
        ))
        .expect("add");
    engine.run_frame().expect("first frame");
    assert_eq!(status_of(&engine, 1), PlacementStatus::Placed);

    engine
        .add_request(request(
            Label::single(LabelId(2), "Major", 10.0),
            point(2, 0.0, 0.0),
            5.0,
            strict_rule(),
        ))
        .expect("add");
    engine.run_frame().expect("second frame");
    (status_of(&engine, 1), status_of(&engine, 2))
}

#[test]
fn stability_policy_decides_between_incumbent_and_newcomer() {
    assert_eq!(
        stability_run(StabilityPolicy::PriorityLed),
        (PlacementStatus::UnPlaced, PlacementStatus::Placed)
    );
    assert_eq!(
        stability_run(StabilityPolicy::StabilityLed),
        (PlacementStatus::Placed, PlacementStatus::UnPlaced)
    );
}

#[test]
fn line_label_follows_the_line() {
    let mut engine = engine();
    let road = Feature {
        id: FeatureId(1),
        layer: 0,
        geometry: FeatureGeometry::Line(vec![Point::new(0.0, 0.0), Point::new(100.0, 100.0)]),
    };
    engine.add_feature_obstacle(&road, 0.0).expect("obstacle");
    let rule = PlacementRule {
        feature_buffer: 1.0,
        ..PlacementRule::default()
    };
    engine
        .add_request(request(
            Label::single(LabelId(1), "Main Street", 10.0),
            Arc::new(road),
            1.0,
            rule,
        ))
        .expect("add");

    let report = engine.run_frame().expect("frame");
    assert_eq!(report.placed, 1);
    let placed = engine.request(LabelId(1)).and_then(|r| r.placed()).expect("placed");
    assert!((placed.position.angle() - std::f64::consts::FRAC_PI_4).abs() < 1e-9);
    assert_eq!(placed.position.justification(), Justification::Center);
    let center = placed.footprint.center();
    assert!((center.x - 50.0).abs() + (center.y - 50.0).abs() < 30.0);
}

#[test]
fn area_label_sits_inside_its_polygon() {
    let mut engine = engine();
    let lake = square(1, 0, 0.0, 0.0, 100.0, 100.0);
    engine.add_feature_obstacle(&lake, 0.0).expect("obstacle");
    engine
        .add_request(request(
            Label::single(LabelId(1), "Lake", 10.0),
            Arc::new(lake),
            1.0,
            PlacementRule::default(),
        ))
        .expect("add");

    engine.run_frame().expect("frame");
    let placed = engine.request(LabelId(1)).and_then(|r| r.placed()).expect("placed");
    assert!(placed.footprint.center().distance(Point::new(50.0, 50.0)) < 1e-9);
}

#[test]
fn hidden_layers_do_not_block() {
    let mut engine = engine();
    engine
        .add_feature_obstacle(&square(99, 3, -100.0, -100.0, 100.0, 100.0), 0.0)
        .expect("obstacle");
    engine
        .add_request(request(
            Label::single(LabelId(1), "Aspen", 10.0),
            point(1, 0.0, 0.0),
            1.0,
            strict_rule(),
        ))
        .expect("add");

    assert_eq!(engine.run_frame().expect("frame").unplaced, 1);
    engine.hide_layer(3);
    assert_eq!(engine.run_frame().expect("frame").placed, 1);
}

#[test]
fn leader_reaches_a_displaced_label() {
    let mut engine = engine();
    // Blocks the north-east slot but stays clear of the diagonal leader.
    engine
        .add_feature_obstacle(&square(99, 0, 14.0, 0.0, 40.0, 6.0), 0.0)
        .expect("obstacle");
    let rule = PlacementRule {
        max_leader_length: Some(20.0),
        ..strict_rule()
    };
    engine
        .add_request(request(
            Label::single(LabelId(1), "Denver", 10.0),
            point(1, 0.0, 0.0),
            1.0,
            rule,
        ))
        .expect("add");

    assert_eq!(engine.run_frame().expect("frame").placed, 1);
    let request = engine.request(LabelId(1)).expect("request");
    let leader = request.placed().and_then(|p| p.leader).expect("leader");
    assert_eq!(leader.attach, Point::new(20.0, 20.0));
    assert!(!request.state().leader_candidates().is_empty());
    let leaders = engine
        .index()
        .query(&Rect::new(0.0, 0.0, 20.0, 20.0))
        .expect("query")
        .into_iter()
        .filter(|(_, entry)| entry.kind == OwnerKind::Leader)
        .count();
    assert_eq!(leaders, 1);
}

#[test]
fn neatline_pushes_label_to_an_inside_slot() {
    let mut engine = engine();
    engine.config_mut().neatline = Some(Rect::new(-100.0, -100.0, 30.0, 100.0));
    engine
        .add_request(request(
            Label::single(LabelId(1), "Denver", 10.0),
            point(1, 0.0, 0.0),
            1.0,
            PlacementRule {
                max_bump: 0.0,
                ..PlacementRule::default()
            },
        ))
        .expect("add");

    engine.run_frame().expect("frame");
    let placed = engine.request(LabelId(1)).and_then(|r| r.placed()).expect("placed");
    assert_eq!(placed.position.justification(), Justification::Right);
    assert!(placed.footprint.envelope().max_x <= 30.0);
}

#[test]
fn scoped_config_override_applies_for_one_frame() {
    let mut engine = engine();
    engine
        .add_request(request(
            Label::single(LabelId(1), "Denver", 10.0),
            point(1, 0.0, 0.0),
            1.0,
            strict_rule(),
        ))
        .expect("add");
    {
        let config = engine.config_mut();
        let scoped = config.scoped(PlacementConfig {
            neatline: Some(Rect::new(-10.0, -10.0, 10.0, 10.0)),
            ..PlacementConfig::default()
        });
        assert!(scoped.neatline.is_some());
    }
    assert!(engine.config().neatline.is_none());
    assert_eq!(engine.run_frame().expect("frame").placed, 1);
}

#[test]
fn too_long_and_invalid_labels_are_suppressed() {
    let mut engine = engine();
    engine
        .add_request(request(
            Label::single(LabelId(1), "Denver", 10.0),
            point(1, 0.0, 0.0),
            1.0,
            PlacementRule {
                max_label_length: Some(30.0),
                ..strict_rule()
            },
        ))
        .expect("add");
    engine
        .add_request(request(
            Label::single(LabelId(2), "Nowhere", 10.0),
            Arc::new(Feature {
                id: FeatureId(2),
                layer: 0,
                geometry: FeatureGeometry::Area(Vec::new()),
            }),
            1.0,
            strict_rule(),
        ))
        .expect("add");

    let report = engine.run_frame().expect("frame");
    assert_eq!(report.suppressed, 2);
    assert_eq!(report.drawn(), 0);
}

#[test]
fn repeated_frames_do_not_accumulate_index_entries() {
    let mut engine = engine();
    for i in 0..4u64 {
        engine
            .add_request(request(
                Label::single(LabelId(i), "Town", 10.0),
                point(i, i as f64 * 100.0, 0.0),
                1.0,
                PlacementRule::default(),
            ))
            .expect("add");
    }
    let first = engine.run_frame().expect("frame");
    let after_first = engine.index().len();
    let second = engine.run_frame().expect("frame");
    assert_eq!(first, second);
    assert_eq!(engine.index().len(), after_first);
    assert_eq!(after_first, 4);
}

#[test]
fn fixture_config_loads() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("placement.json5");
    let config = load_config(Some(&path)).expect("fixture config");
    assert_eq!(config.stability_policy, StabilityPolicy::StabilityLed);
    assert_eq!(config.overhang_tolerances, vec![0.0, 1.5, 3.0]);
    assert_eq!(config.neatline, Some(Rect::new(0.0, 0.0, 1024.0, 768.0)));
    let rule = PlacementRule::from_config(&config);
    assert_eq!(rule.max_font_steps, 2);
    assert_eq!(rule.overhang_tolerances, config.overhang_tolerances);
}
