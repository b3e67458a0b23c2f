use std::{
    collections::BTreeMap,
    thread::{self, ThreadId},
    time::{Duration, Instant},
};

use rand::{Rng, SeedableRng, rngs::StdRng};
use relief::{
    Bounds, EngineError, Filter, Grid, HeightRule, Interpolator, InterpolatorKind, MapTransformation,
    MergePriority, MeshBuffers, MeshOptions, Polygon, PolygonId, Scene, Settings, TaskScheduler,
    Transformation, error::MapTransformationError,
};

fn settle(scene: &mut Scene) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !scene.is_idle() {
        assert!(Instant::now() < deadline, "scene did not settle");
        scene.update_frame();
        thread::sleep(Duration::from_millis(1));
    }
}

/// Height equality that treats two holes as equal.
fn same_heights(a: &Grid, b: &Grid) -> bool {
    a.x() == b.x()
        && a.y() == b.y()
        && a.z()
            .iter()
            .zip(b.z())
            .all(|(l, r)| (l.is_nan() && r.is_nan()) || l == r)
}

fn random_axis(rng: &mut StdRng, len: usize, start: f64) -> Vec<f64> {
    let mut value = start;
    (0..len)
        .map(|_| {
            value += rng.gen_range(0.5..2.0);
            value
        })
        .collect()
}

fn random_grid(rng: &mut StdRng, hole_ratio: f64) -> Grid {
    let rows = rng.gen_range(2..9);
    let cols = rng.gen_range(2..9);
    let x = random_axis(rng, cols, 0.0);
    let y = random_axis(rng, rows, 0.0);
    let z = (0..rows * cols)
        .map(|_| {
            if rng.gen_bool(hole_ratio) {
                f64::NAN
            } else {
                rng.gen_range(-50.0..50.0)
            }
        })
        .collect();
    Grid::new(x, y, z).expect("random grid")
}

fn random_polygon(rng: &mut StdRng, id: PolygonId, bounds: &Bounds) -> Polygon {
    let count = rng.gen_range(3..8);
    let points: Vec<(f64, f64)> = (0..count)
        .map(|_| {
            (
                rng.gen_range(bounds.left..=bounds.right),
                rng.gen_range(bounds.bottom..=bounds.top),
            )
        })
        .collect();
    Polygon::new(id, "random").with_points(&points)
}

#[test]
fn constant_inside_polygon_above_threshold() {
    let mut scene = Scene::new(Settings {
        frame_delay: 1,
        ..Default::default()
    });
    let model = scene
        .load_surface(
            "scenario",
            vec![0.0, 1.0, 2.0],
            vec![0.0, 1.0],
            vec![vec![10.0, 20.0, 30.0], vec![40.0, 50.0, 60.0]],
            None,
        )
        .expect("load");
    settle(&mut scene);

    let polygon = scene.create_polygon();
    for (x, y) in [(-0.5, -0.5), (0.5, -0.5), (0.5, 1.5), (-0.5, 1.5)] {
        scene.add_vertex(x, y).expect("vertex");
    }
    let transformation = Transformation::new(HeightRule::Constant { height: 0.0 })
        .with_filter(Filter::IsIn(polygon))
        .with_filter(Filter::HeightGreaterThan(5.0));
    scene.apply_transformation(model, transformation).expect("apply");
    assert!(scene.is_loading());
    settle(&mut scene);

    assert!(scene.take_last_error().is_none());
    assert_eq!(
        scene.model(model).expect("model").grid().to_rows(),
        vec![vec![0.0, 20.0, 30.0], vec![0.0, 50.0, 60.0]]
    );
    assert_eq!(scene.height_at(0.0, 1.0), Some(0.0));
}

#[test]
fn interpolate_nan_fills_single_hole() {
    let grid = Grid::from_rows(vec![0.0, 1.0, 2.0], vec![0.0], vec![vec![1.0, f64::NAN, 3.0]])
        .expect("grid");
    let filled = MapTransformation::InterpolateNan {
        kind: InterpolatorKind::Linear,
    }
    .apply(&grid, None)
    .expect("interpolate");
    assert_eq!(filled.to_rows(), vec![vec![1.0, 2.0, 3.0]]);
}

#[derive(Default)]
struct Flag {
    runs: u32,
    thread: Option<ThreadId>,
}

#[test]
fn continuation_waits_for_body_and_runs_once_on_main_thread() {
    let mut scheduler = TaskScheduler::<Flag>::new();
    let mut flag = Flag::default();
    scheduler.spawn(
        || thread::sleep(Duration::from_millis(50)),
        |flag, _, outcome| {
            outcome.expect("body");
            flag.runs += 1;
            flag.thread = Some(thread::current().id());
        },
    );

    scheduler.update(&mut flag);
    assert_eq!(flag.runs, 0);

    thread::sleep(Duration::from_millis(100));
    scheduler.update(&mut flag);
    assert_eq!(flag.runs, 1);
    assert_eq!(flag.thread, Some(thread::current().id()));

    scheduler.update(&mut flag);
    assert_eq!(flag.runs, 1);
    assert!(scheduler.is_idle());
}

#[test]
fn subtract_keeps_only_shared_coordinates() {
    let a = Grid::from_rows(
        vec![0.0, 1.0, 2.0],
        vec![0.0, 1.0],
        vec![vec![5.0, 6.0, 7.0], vec![8.0, 9.0, 10.0]],
    )
    .expect("a");
    let b = Grid::from_rows(vec![1.0, 4.0], vec![0.0, 1.0], vec![vec![1.0, 1.0], vec![2.0, 2.0]])
        .expect("b");
    let diff = MapTransformation::Subtract.apply(&a, Some(&b)).expect("subtract");
    let rows = diff.to_rows();
    assert!(rows[0][0].is_nan() && rows[0][2].is_nan());
    assert!(rows[1][0].is_nan() && rows[1][2].is_nan());
    assert_eq!(rows[0][1], 5.0);
    assert_eq!(rows[1][1], 7.0);

    let far = Grid::from_rows(vec![10.0], vec![0.0], vec![vec![1.0]]).expect("far");
    assert!(matches!(
        MapTransformation::Subtract.apply(&a, Some(&far)),
        Err(EngineError::MapTransformation(MapTransformationError::NoOverlap("x")))
    ));
}

#[test]
fn fill_is_a_noop_without_holes() {
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..20 {
        let grid = random_grid(&mut rng, 0.0);
        for kind in [
            InterpolatorKind::Nearest,
            InterpolatorKind::Linear,
            InterpolatorKind::Cubic,
            InterpolatorKind::Smooth,
        ] {
            let interpolator = Interpolator::new(kind);
            let once = interpolator.fill(&grid).expect("fill");
            assert!(same_heights(&once, &grid), "{kind:?} changed a complete grid");
            let twice = interpolator.fill(&once).expect("fill again");
            assert!(same_heights(&twice, &once));
        }
    }
}

#[test]
fn is_in_and_is_not_in_are_complementary() {
    let mut rng = StdRng::seed_from_u64(11);
    for id in 0..20 {
        let grid = random_grid(&mut rng, 0.2);
        let polygons = vec![random_polygon(&mut rng, id, &grid.bounds())];
        for row in 0..grid.rows() {
            for col in 0..grid.cols() {
                let inside = Filter::IsIn(id)
                    .matches(row, col, &grid, &polygons)
                    .expect("is_in");
                let outside = Filter::IsNotIn(id)
                    .matches(row, col, &grid, &polygons)
                    .expect("is_not_in");
                assert_eq!(inside, !outside);
            }
        }
    }
}

#[test]
fn disjoint_zone_leaves_grid_untouched() {
    let mut rng = StdRng::seed_from_u64(3);
    let polygons: BTreeMap<PolygonId, Polygon> = BTreeMap::new();
    for _ in 0..10 {
        let grid = random_grid(&mut rng, 0.1);
        let zone = Bounds::new(1000.0, 1010.0, -1010.0, -1000.0);
        let result = Transformation::new(HeightRule::Constant { height: 1.0 })
            .with_zone(zone)
            .apply(&grid, &polygons)
            .expect("apply");
        assert!(same_heights(&result, &grid));
    }
}

#[test]
fn merge_is_stable_under_primary_priority() {
    let mut rng = StdRng::seed_from_u64(5);
    let merge = MapTransformation::Merge {
        priority: MergePriority::Primary,
    };
    for _ in 0..20 {
        let a = random_grid(&mut rng, 0.2);
        let b = random_grid(&mut rng, 0.2);
        let merged = merge.apply(&a, Some(&b)).expect("merge");
        let again = merge.apply(&merged, Some(&a)).expect("merge again");
        assert!(same_heights(&merged, &again));
    }
}

#[test]
fn vertex_count_never_grows_with_quality() {
    let mut rng = StdRng::seed_from_u64(13);
    for _ in 0..10 {
        let grid = random_grid(&mut rng, 0.1);
        let mut previous = usize::MAX;
        for quality in 0..6 {
            let buffers = MeshBuffers::build(
                &grid,
                &MeshOptions {
                    quality,
                    ..Default::default()
                },
            )
            .expect("build");
            if quality == 0 {
                assert_eq!(buffers.vertex_count(), grid.len());
            }
            assert!(buffers.vertex_count() <= previous);
            previous = buffers.vertex_count();
        }
    }
}

#[test]
fn undo_restores_random_edits() {
    let mut rng = StdRng::seed_from_u64(17);
    let mut scene = Scene::new(Settings {
        frame_delay: 0,
        ..Default::default()
    });
    let original = random_grid(&mut rng, 0.1);
    let model = scene
        .load_surface(
            "undo",
            original.x().to_vec(),
            original.y().to_vec(),
            original.to_rows(),
            None,
        )
        .expect("load");
    settle(&mut scene);

    for _ in 0..5 {
        let bounds = original.bounds();
        let threshold = rng.gen_range(-50.0..50.0);
        let transformation = Transformation::new(HeightRule::Constant {
            height: rng.gen_range(-10.0..10.0),
        })
        .with_zone(bounds)
        .with_filter(Filter::HeightLessThan(threshold));
        scene.apply_transformation(model, transformation).expect("apply");
        settle(&mut scene);
        scene.undo_last_transformation().expect("undo");
        assert!(same_heights(scene.model(model).expect("model").grid(), &original));
    }
}
