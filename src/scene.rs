use std::{collections::BTreeMap, sync::Arc};

use glam::DVec2;
use tracing::{info, warn};

use crate::{
    error::{EngineError, Result, SceneError},
    grid::Grid,
    interpolation::Interpolator,
    map_transformation::MapTransformation,
    mesh::{GridModel, MAX_QUALITY, MeshBuffers, MeshOptions, ModelId, ViewMode},
    polygon::{ParamValue, Polygon, PolygonId, PolygonRecord},
    settings::Settings,
    tasks::TaskScheduler,
    transformation::{self, EdgeBlend, Transformation},
};

#[derive(Debug)]
struct UndoEntry {
    model: ModelId,
    grid: Arc<Grid>,
}

////////////////////////////////////////////////
/// SceneState
/// * Everything the frame loop and task continuations mutate.
/// * Kept apart from the scheduler so continuations can borrow it mutably
///   while the scheduler is running them.
////////////////////////////////////////////////
#[derive(Debug)]
pub struct SceneState {
    settings: Settings,
    models: BTreeMap<ModelId, GridModel>,
    polygons: BTreeMap<PolygonId, Polygon>,
    active_polygon: Option<PolygonId>,
    undo: Option<UndoEntry>,
    loading: Option<String>,
    jobs: usize,
    last_error: Option<EngineError>,
    next_model: ModelId,
    next_polygon: PolygonId,
}

impl SceneState {
    fn new(settings: Settings) -> Self {
        Self {
            settings,
            models: BTreeMap::new(),
            polygons: BTreeMap::new(),
            active_polygon: None,
            undo: None,
            loading: None,
            jobs: 0,
            last_error: None,
            next_model: 0,
            next_polygon: 0,
        }
    }

    fn begin(&mut self, message: String, jobs: usize) {
        info!(resource = "scene", jobs, "{message}");
        self.loading = Some(message);
        self.jobs += jobs;
    }

    fn finish_job(&mut self) {
        self.jobs = self.jobs.saturating_sub(1);
        if self.jobs == 0 {
            self.loading = None;
        }
    }

    fn fail(&mut self, err: EngineError) {
        warn!(resource = "scene", error = %err, "background edit failed");
        self.last_error = Some(err);
    }

    fn mesh_options(&self) -> MeshOptions {
        MeshOptions {
            quality: self.settings.quality,
            view_mode: self.settings.view_mode,
            ramp: self.settings.color_ramp.clone(),
        }
    }

    fn model(&self, id: ModelId) -> Result<&GridModel> {
        Ok(self.models.get(&id).ok_or(SceneError::UnknownModel(id))?)
    }

    fn polygon_mut(&mut self, id: PolygonId) -> Result<&mut Polygon> {
        Ok(self.polygons.get_mut(&id).ok_or(SceneError::UnknownPolygon(id))?)
    }

    fn active_polygon_mut(&mut self) -> Result<&mut Polygon> {
        let id = self.active_polygon.ok_or(SceneError::NoActivePolygon)?;
        self.polygon_mut(id)
    }
}

////////////////////////////////////////////////
/// Scene
/// * Owns the models, the polygons and the single undo slot.
/// * Edits are validated on the calling thread, computed on a worker a few
///   frames later and installed by a continuation inside `update_frame`.
/// * While an edit is in flight the scene reports a loading message and
///   rejects further edits with `SceneError::Busy`.
////////////////////////////////////////////////
pub struct Scene {
    state: SceneState,
    scheduler: TaskScheduler<SceneState>,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}

impl Scene {
    pub fn new(settings: Settings) -> Self {
        Self {
            state: SceneState::new(settings),
            scheduler: TaskScheduler::new(),
        }
    }

    /// One frame tick. Must be called from the thread that created the scene.
    pub fn update_frame(&mut self) {
        self.scheduler.update(&mut self.state);
    }

    pub fn settings(&self) -> &Settings {
        &self.state.settings
    }

    pub fn is_loading(&self) -> bool {
        self.state.loading.is_some()
    }

    pub fn loading_message(&self) -> Option<&str> {
        self.state.loading.as_deref()
    }

    /// No frame task or continuation left to run.
    pub fn is_idle(&self) -> bool {
        self.scheduler.is_idle()
    }

    /// Error raised by the last background edit that failed, if not yet taken.
    pub fn take_last_error(&mut self) -> Option<EngineError> {
        self.state.last_error.take()
    }

    fn ensure_idle(&self) -> Result<()> {
        match &self.state.loading {
            Some(message) => Err(SceneError::Busy(message.clone()).into()),
            None => Ok(()),
        }
    }

    fn defer<F>(&mut self, job: F)
    where
        F: FnOnce(&mut SceneState, &mut TaskScheduler<SceneState>) + 'static,
    {
        self.scheduler.schedule(self.state.settings.frame_delay, job);
    }

    pub fn model_ids(&self) -> Vec<ModelId> {
        self.state.models.keys().copied().collect()
    }

    pub fn model(&self, id: ModelId) -> Option<&GridModel> {
        self.state.models.get(&id)
    }

    pub fn polygon_ids(&self) -> Vec<PolygonId> {
        self.state.polygons.keys().copied().collect()
    }

    pub fn polygon(&self, id: PolygonId) -> Option<&Polygon> {
        self.state.polygons.get(&id)
    }

    pub fn active_polygon(&self) -> Option<PolygonId> {
        self.state.active_polygon
    }

    // Polygons

    /// Creates an empty polygon and makes it the active one.
    pub fn create_polygon(&mut self) -> PolygonId {
        let id = self.state.next_polygon;
        self.state.next_polygon += 1;
        self.state
            .polygons
            .insert(id, Polygon::new(id, format!("Polygon {id}")));
        self.state.active_polygon = Some(id);
        info!(resource = "scene", polygon = id, "polygon created");
        id
    }

    pub fn remove_polygon(&mut self, id: PolygonId) -> Result<()> {
        self.state
            .polygons
            .remove(&id)
            .ok_or(SceneError::UnknownPolygon(id))?;
        if self.state.active_polygon == Some(id) {
            self.state.active_polygon = None;
        }
        info!(resource = "scene", polygon = id, "polygon removed");
        Ok(())
    }

    pub fn set_active_polygon(&mut self, id: PolygonId) -> Result<()> {
        if !self.state.polygons.contains_key(&id) {
            return Err(SceneError::UnknownPolygon(id).into());
        }
        self.state.active_polygon = Some(id);
        Ok(())
    }

    pub fn add_vertex(&mut self, x: f64, y: f64) -> Result<()> {
        self.state.active_polygon_mut()?.push_point(x, y);
        Ok(())
    }

    pub fn remove_last_vertex(&mut self) -> Result<Option<DVec2>> {
        Ok(self.state.active_polygon_mut()?.pop_point())
    }

    pub fn set_polygon_name(&mut self, id: PolygonId, name: impl Into<String>) -> Result<()> {
        self.state.polygon_mut(id)?.name = name.into();
        Ok(())
    }

    pub fn set_polygon_colors(&mut self, id: PolygonId, color: [f32; 3], dot_color: [f32; 3]) -> Result<()> {
        let polygon = self.state.polygon_mut(id)?;
        polygon.color = color;
        polygon.dot_color = dot_color;
        Ok(())
    }

    /// Sets a parameter, or removes it when `value` is `None`.
    pub fn set_polygon_param(&mut self, id: PolygonId, key: impl Into<String>, value: Option<ParamValue>) -> Result<()> {
        let polygon = self.state.polygon_mut(id)?;
        let key = key.into();
        match value {
            Some(value) => {
                polygon.params.insert(key, value);
            }
            None => {
                polygon.params.remove(&key);
            }
        }
        Ok(())
    }

    pub fn import_polygon(&mut self, record: &PolygonRecord) -> PolygonId {
        let id = self.state.next_polygon;
        self.state.next_polygon += 1;
        self.state.polygons.insert(id, Polygon::from_record(id, record));
        info!(
            resource = "scene",
            polygon = id,
            vertices = record.points.len(),
            "polygon imported"
        );
        id
    }

    pub fn export_polygon(&self, id: PolygonId) -> Result<PolygonRecord> {
        let polygon = self
            .state
            .polygons
            .get(&id)
            .ok_or(SceneError::UnknownPolygon(id))?;
        Ok(polygon.to_record())
    }

    pub fn is_polygon_planar(&self, id: PolygonId) -> Result<bool> {
        let polygon = self
            .state
            .polygons
            .get(&id)
            .ok_or(SceneError::UnknownPolygon(id))?;
        Ok(polygon.is_planar())
    }

    /// `(max, min)` of the defined heights of `model` inside `polygon`.
    pub fn polygon_height_extremes(&self, model: ModelId, polygon: PolygonId) -> Result<Option<(f64, f64)>> {
        let model = self.state.model(model)?;
        let polygon = self
            .state
            .polygons
            .get(&polygon)
            .ok_or(SceneError::UnknownPolygon(polygon))?;
        Ok(transformation::polygon_height_extremes(model.grid(), polygon))
    }

    // Models

    /// Validates the surface now and builds its mesh in the background. The
    /// returned id becomes visible in `model_ids` once the build completes.
    pub fn load_surface(
        &mut self,
        name: impl Into<String>,
        x: Vec<f64>,
        y: Vec<f64>,
        z: Vec<Vec<f64>>,
        no_data: Option<f64>,
    ) -> Result<ModelId> {
        self.ensure_idle()?;
        let name = name.into();
        let grid = Grid::with_no_data(x, y, z, no_data)?;
        let id = self.state.next_model;
        self.state.next_model += 1;

        let options = self.state.mesh_options();
        let lookup = Interpolator::new(self.state.settings.height_lookup)
            .with_smooth_radius(self.state.settings.smooth_radius);
        self.state.begin(format!("loading {name}"), 1);

        self.defer(move |_, scheduler| {
            let build_options = options.clone();
            scheduler.spawn(
                move || -> Result<(Grid, MeshBuffers)> {
                    let buffers = MeshBuffers::build(&grid, &build_options)?;
                    Ok((grid, buffers))
                },
                move |state, _, outcome| {
                    match outcome.map_err(EngineError::from).and_then(|built| built) {
                        Ok((grid, buffers)) => {
                            let mut model =
                                GridModel::from_parts(id, name, Arc::new(grid), Arc::new(buffers), options);
                            model.set_lookup(lookup);
                            state.models.insert(id, model);
                        }
                        Err(err) => state.fail(err),
                    }
                    state.finish_job();
                },
            );
        });
        Ok(id)
    }

    pub fn remove_model(&mut self, id: ModelId) -> Result<()> {
        self.state
            .models
            .remove(&id)
            .ok_or(SceneError::UnknownModel(id))?;
        if self.state.undo.as_ref().is_some_and(|entry| entry.model == id) {
            self.state.undo = None;
        }
        info!(resource = "scene", model = id, "model removed");
        Ok(())
    }

    /// Applies `transformation` to `model`. Scope and polygon references are
    /// checked before anything is dispatched.
    pub fn apply_transformation(&mut self, model: ModelId, transformation: Transformation) -> Result<()> {
        self.ensure_idle()?;
        transformation.validate()?;
        for filter in &transformation.filters {
            filter.prepare(&self.state.polygons)?;
        }
        let polygons = self.state.polygons.clone();
        self.dispatch_edit(model, "applying transformation", move |grid| {
            transformation.apply(grid, &polygons)
        })
    }

    /// Smooths the band of cells just outside a polygon.
    pub fn blend_polygon_border(&mut self, model: ModelId, blend: EdgeBlend) -> Result<()> {
        self.ensure_idle()?;
        let polygon = self
            .state
            .polygons
            .get(&blend.polygon)
            .ok_or(SceneError::UnknownPolygon(blend.polygon))?
            .clone();
        self.dispatch_edit(model, "blending polygon border", move |grid| {
            blend.apply(grid, std::slice::from_ref(&polygon))
        })
    }

    /// Applies a whole-grid operation to `model`, reading `secondary` as the
    /// second operand when the operation needs one.
    pub fn apply_map_transformation(
        &mut self,
        model: ModelId,
        operation: MapTransformation,
        secondary: Option<ModelId>,
    ) -> Result<()> {
        self.ensure_idle()?;
        operation.validate(secondary.is_some())?;
        let other = match secondary {
            Some(id) => Some(self.state.model(id)?.snapshot()),
            None => None,
        };
        let message = format!("applying {}", operation.name());
        self.dispatch_edit(model, &message, move |grid| {
            operation.apply(grid, other.as_deref())
        })
    }

    fn dispatch_edit<F>(&mut self, model_id: ModelId, message: &str, edit: F) -> Result<()>
    where
        F: FnOnce(&Grid) -> Result<Grid> + Send + 'static,
    {
        let model = self.state.model(model_id)?;
        let grid = model.snapshot();
        let previous = model.buffers();
        let options = model.options().clone();
        let record_undo = self.state.settings.undo_enabled;
        self.state.begin(message.to_string(), 1);

        self.defer(move |_, scheduler| {
            let source = Arc::clone(&grid);
            scheduler.spawn(
                move || -> Result<(Grid, MeshBuffers)> {
                    let edited = edit(&source)?;
                    let buffers = GridModel::prepare_buffers(&edited, &previous, &options)?;
                    Ok((edited, buffers))
                },
                move |state, _, outcome| {
                    let installed = outcome
                        .map_err(EngineError::from)
                        .and_then(|edited| edited)
                        .and_then(|(edited, buffers)| {
                            let model = state
                                .models
                                .get_mut(&model_id)
                                .ok_or(SceneError::UnknownModel(model_id))?;
                            model.install(Arc::new(edited), Arc::new(buffers))
                        });
                    match installed {
                        Ok(()) => {
                            if record_undo {
                                state.undo = Some(UndoEntry { model: model_id, grid });
                            }
                            info!(resource = "scene", model = model_id, "edit installed");
                        }
                        Err(err) => state.fail(err),
                    }
                    state.finish_job();
                },
            );
        });
        Ok(())
    }

    /// Rebuilds every model's buffers at `quality`, or at the configured
    /// quality when `None`.
    pub fn reload_meshes(&mut self, quality: Option<u8>) -> Result<()> {
        self.ensure_idle()?;
        let quality = quality
            .unwrap_or(self.state.settings.quality)
            .min(MAX_QUALITY);
        let jobs: Vec<_> = self
            .state
            .models
            .values()
            .map(|model| {
                let options = MeshOptions {
                    quality,
                    ..model.options().clone()
                };
                (model.id(), model.snapshot(), options)
            })
            .collect();
        if jobs.is_empty() {
            return Ok(());
        }
        self.state
            .begin(format!("reloading meshes at quality {quality}"), jobs.len());

        self.defer(move |_, scheduler| {
            for (id, grid, options) in jobs {
                scheduler.spawn(
                    move || -> Result<(Arc<Grid>, MeshBuffers)> {
                        let buffers = MeshBuffers::build(&grid, &options)?;
                        Ok((grid, buffers))
                    },
                    move |state, _, outcome| {
                        let installed = outcome
                            .map_err(EngineError::from)
                            .and_then(|built| built)
                            .and_then(|(grid, buffers)| {
                                let model = state
                                    .models
                                    .get_mut(&id)
                                    .ok_or(SceneError::UnknownModel(id))?;
                                model.install(grid, Arc::new(buffers))
                            });
                        if let Err(err) = installed {
                            state.fail(err);
                        }
                        state.finish_job();
                    },
                );
            }
        });
        Ok(())
    }

    /// Switches every model between the flat map and the relief view.
    pub fn set_view_mode(&mut self, view_mode: ViewMode) -> Result<()> {
        self.ensure_idle()?;
        self.state.settings.view_mode = view_mode;
        for model in self.state.models.values_mut() {
            model.set_view_mode(view_mode)?;
        }
        Ok(())
    }

    /// Replaces every model's grid by the samples its mesh uses. The undo
    /// slot is cleared up front since it refers to a full-resolution grid.
    pub fn optimize_gpu_memory(&mut self) -> Result<()> {
        self.ensure_idle()?;
        self.state.undo = None;
        for model in self.state.models.values_mut() {
            model.optimize_gpu_memory()?;
        }
        Ok(())
    }

    /// Height under `(x, y)` from the most recently loaded model covering it.
    pub fn height_at(&self, x: f64, y: f64) -> Option<f64> {
        self.state
            .models
            .values()
            .rev()
            .find_map(|model| model.height_at(x, y))
    }

    pub fn can_undo(&self) -> bool {
        self.state.undo.is_some()
    }

    /// Restores the grid that preceded the last installed edit.
    pub fn undo_last_transformation(&mut self) -> Result<()> {
        self.ensure_idle()?;
        let entry = self.state.undo.take().ok_or(SceneError::NothingToUndo)?;
        let model = self
            .state
            .models
            .get_mut(&entry.model)
            .ok_or(SceneError::UnknownModel(entry.model))?;

        let current = model.grid();
        if current.x() == entry.grid.x() && current.y() == entry.grid.y() {
            model.update_vertices(entry.grid.z().to_vec())?;
        } else {
            let buffers = GridModel::prepare_buffers(&entry.grid, &model.buffers(), model.options())?;
            model.install(entry.grid, Arc::new(buffers))?;
        }
        info!(resource = "scene", model = entry.model, "last edit undone");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{
        thread,
        time::{Duration, Instant},
    };

    use super::*;
    use crate::{
        error::TransformationError,
        filter::Filter,
        grid::Bounds,
        interpolation::InterpolatorKind,
        map_transformation::MergePriority,
        transformation::HeightRule,
    };

    fn settle(scene: &mut Scene) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while !scene.is_idle() {
            assert!(Instant::now() < deadline, "scene did not settle");
            scene.update_frame();
            thread::sleep(Duration::from_millis(1));
        }
    }

    fn scene_with_surface() -> (Scene, ModelId) {
        let mut scene = Scene::new(Settings {
            frame_delay: 1,
            ..Default::default()
        });
        let id = scene
            .load_surface(
                "base",
                vec![0.0, 1.0, 2.0],
                vec![0.0, 1.0],
                vec![vec![10.0, 20.0, 30.0], vec![40.0, 50.0, 60.0]],
                None,
            )
            .expect("load");
        settle(&mut scene);
        (scene, id)
    }

    #[test]
    fn surfaces_appear_after_the_build_completes() {
        let mut scene = Scene::default();
        let id = scene
            .load_surface("s", vec![0.0, 1.0], vec![0.0], vec![vec![1.0, -9999.0]], Some(-9999.0))
            .expect("load");
        assert!(scene.is_loading());
        assert!(scene.model_ids().is_empty());
        settle(&mut scene);
        assert!(!scene.is_loading());
        assert_eq!(scene.model_ids(), vec![id]);
        assert_eq!(scene.model(id).expect("model").grid().hole_count(), 1);
    }

    #[test]
    fn invalid_surfaces_fail_before_dispatch() {
        let mut scene = Scene::default();
        let err = scene.load_surface("bad", vec![1.0, 0.0], vec![0.0], vec![vec![0.0, 0.0]], None);
        assert!(matches!(err, Err(EngineError::Grid(_))));
        assert!(!scene.is_loading());
        assert!(scene.is_idle());
    }

    #[test]
    fn edits_are_rejected_while_loading() {
        let (mut scene, id) = scene_with_surface();
        let zone = Bounds::new(0.0, 2.0, 0.0, 1.0);
        scene
            .apply_transformation(id, Transformation::new(HeightRule::Constant { height: 1.0 }).with_zone(zone))
            .expect("first edit");
        let second = scene.apply_transformation(
            id,
            Transformation::new(HeightRule::Constant { height: 2.0 }).with_zone(zone),
        );
        assert!(matches!(second, Err(EngineError::Scene(SceneError::Busy(_)))));
        settle(&mut scene);
        assert_eq!(scene.height_at(1.0, 1.0), Some(1.0));
    }

    #[test]
    fn ambiguous_transformation_is_rejected_up_front() {
        let (mut scene, id) = scene_with_surface();
        let err = scene.apply_transformation(id, Transformation::new(HeightRule::FillNan));
        assert!(matches!(
            err,
            Err(EngineError::Transformation(TransformationError::AmbiguousScope))
        ));
        assert!(!scene.is_loading());
    }

    #[test]
    fn undo_restores_previous_heights() {
        let (mut scene, id) = scene_with_surface();
        let polygon = scene.create_polygon();
        for (x, y) in [(-0.5, -0.5), (0.5, -0.5), (0.5, 1.5), (-0.5, 1.5)] {
            scene.add_vertex(x, y).expect("vertex");
        }
        let transformation = Transformation::new(HeightRule::Constant { height: 0.0 })
            .with_filter(Filter::IsIn(polygon))
            .with_filter(Filter::HeightGreaterThan(5.0));
        scene.apply_transformation(id, transformation).expect("apply");
        settle(&mut scene);
        assert_eq!(
            scene.model(id).expect("model").grid().to_rows(),
            vec![vec![0.0, 20.0, 30.0], vec![0.0, 50.0, 60.0]]
        );
        assert_eq!(
            scene.polygon_height_extremes(id, polygon).expect("extremes"),
            Some((0.0, 0.0))
        );

        scene.undo_last_transformation().expect("undo");
        assert_eq!(
            scene.model(id).expect("model").grid().to_rows(),
            vec![vec![10.0, 20.0, 30.0], vec![40.0, 50.0, 60.0]]
        );
        assert!(matches!(
            scene.undo_last_transformation(),
            Err(EngineError::Scene(SceneError::NothingToUndo))
        ));
    }

    #[test]
    fn undo_restores_shape_after_merge() {
        let (mut scene, base) = scene_with_surface();
        let other = scene
            .load_surface("other", vec![3.0], vec![0.0, 1.0], vec![vec![7.0], vec![8.0]], None)
            .expect("load");
        settle(&mut scene);

        scene
            .apply_map_transformation(
                base,
                MapTransformation::Merge {
                    priority: MergePriority::Primary,
                },
                Some(other),
            )
            .expect("merge");
        settle(&mut scene);
        assert_eq!(scene.model(base).expect("model").grid().cols(), 4);

        scene.undo_last_transformation().expect("undo");
        let model = scene.model(base).expect("model");
        assert_eq!(model.grid().cols(), 3);
        assert_eq!(model.buffers().vertex_count(), 6);
    }

    #[test]
    fn missing_secondary_is_rejected() {
        let (mut scene, id) = scene_with_surface();
        let err = scene.apply_map_transformation(id, MapTransformation::Subtract, None);
        assert!(matches!(err, Err(EngineError::MapTransformation(_))));
        let err = scene.apply_map_transformation(id, MapTransformation::Subtract, Some(42));
        assert!(matches!(
            err,
            Err(EngineError::Scene(SceneError::UnknownModel(42)))
        ));
    }

    #[test]
    fn failed_background_edits_are_reported() {
        let (mut scene, id) = scene_with_surface();
        let polygon = scene.create_polygon();
        scene.add_vertex(0.0, 0.0).expect("vertex");
        scene.add_vertex(1.0, 0.0).expect("vertex");
        scene.add_vertex(2.0, 0.0).expect("vertex");
        let before = scene.model(id).expect("model").buffers();

        scene
            .blend_polygon_border(id, EdgeBlend::new(polygon, 1.0, InterpolatorKind::Linear))
            .expect("dispatch");
        settle(&mut scene);

        assert!(matches!(
            scene.take_last_error(),
            Some(EngineError::Interpolation(_))
        ));
        assert!(Arc::ptr_eq(&before, &scene.model(id).expect("model").buffers()));
        assert!(!scene.can_undo());
    }

    #[test]
    fn optimizing_clears_undo() {
        let (mut scene, id) = scene_with_surface();
        let zone = Bounds::new(0.0, 2.0, 0.0, 1.0);
        scene
            .apply_transformation(id, Transformation::new(HeightRule::Constant { height: 3.0 }).with_zone(zone))
            .expect("edit");
        settle(&mut scene);
        assert!(scene.can_undo());

        scene.reload_meshes(Some(1)).expect("reload");
        settle(&mut scene);
        scene.optimize_gpu_memory().expect("optimize");
        assert!(!scene.can_undo());
        let model = scene.model(id).expect("model");
        assert!(model.is_optimized());
        assert_eq!(model.grid().len(), model.buffers().vertex_count());
        assert!(matches!(
            scene.undo_last_transformation(),
            Err(EngineError::Scene(SceneError::NothingToUndo))
        ));
    }

    #[test]
    fn reload_changes_quality_of_every_model() {
        let (mut scene, id) = scene_with_surface();
        scene.reload_meshes(Some(1)).expect("reload");
        assert!(scene.is_loading());
        settle(&mut scene);
        let model = scene.model(id).expect("model");
        assert_eq!(model.quality(), 1);
        assert_eq!(model.buffers().vertex_count(), 4);
        assert!(!scene.is_loading());
    }

    #[test]
    fn polygon_editing_requires_an_active_polygon() {
        let mut scene = Scene::default();
        assert!(matches!(
            scene.add_vertex(0.0, 0.0),
            Err(EngineError::Scene(SceneError::NoActivePolygon))
        ));
        let id = scene.create_polygon();
        scene.add_vertex(0.0, 0.0).expect("vertex");
        scene.add_vertex(1.0, 0.0).expect("vertex");
        assert_eq!(scene.remove_last_vertex().expect("pop"), Some(DVec2::new(1.0, 0.0)));
        scene
            .set_polygon_param(id, "depth", Some(ParamValue::Number(3.0)))
            .expect("param");
        scene.set_polygon_name(id, "pit").expect("name");

        let record = scene.export_polygon(id).expect("export");
        assert_eq!(record.name, "pit");
        let copy = scene.import_polygon(&record);
        assert_ne!(copy, id);
        assert_eq!(scene.polygon(copy).expect("copy").params.len(), 1);

        scene.remove_polygon(id).expect("remove");
        assert_eq!(scene.active_polygon(), None);
        assert_eq!(scene.polygon_ids(), vec![copy]);
    }
}
