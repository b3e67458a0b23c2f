use thiserror::Error;

use crate::polygon::PolygonId;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum GridError {
    #[error("grid axis `{0}` is empty")]
    EmptyAxis(&'static str),
    #[error("grid axis `{axis}` is not non-decreasing at index {index}")]
    NonMonotonicAxis { axis: &'static str, index: usize },
    #[error("grid axis `{axis}` holds a non-finite coordinate at index {index}")]
    NonFiniteAxis { axis: &'static str, index: usize },
    #[error("grid shape mismatch: expected {expected_rows}x{expected_cols}, got {rows} rows (row {row} has {cols} columns)")]
    ShapeMismatch {
        expected_rows: usize,
        expected_cols: usize,
        rows: usize,
        row: usize,
        cols: usize,
    },
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum InterpolationError {
    #[error("no known samples to interpolate from")]
    NoKnownSamples,
    #[error("polygon {0} is degenerate (fewer than 3 vertices or zero area)")]
    DegeneratePolygon(PolygonId),
    #[error("blend distance must be strictly positive, got {0}")]
    InvalidDistance(f64),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum FilterError {
    #[error("polygon {0} does not exist")]
    UnknownPolygon(PolygonId),
    #[error("polygon {id} has {count} vertices, at least 3 are required")]
    NotEnoughVertices { id: PolygonId, count: usize },
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TransformationError {
    #[error("transformation has neither filters nor an explicit zone")]
    AmbiguousScope,
    #[error("invalid height range: min {min} is greater than max {max}")]
    InvalidRange { min: f64, max: f64 },
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum MapTransformationError {
    #[error("{0} requires a secondary grid")]
    MissingSecondary(&'static str),
    #[error("grids share no coordinates along the `{0}` axis")]
    NoOverlap(&'static str),
    #[error("invalid parameter for {operation}: {reason}")]
    InvalidParameter {
        operation: &'static str,
        reason: String,
    },
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum MeshError {
    #[error("color ramp must hold between 1 and {max} entries, got {count}")]
    RampSize { count: usize, max: usize },
    #[error("color ramp thresholds must be non-decreasing (entry {0})")]
    RampOrder(usize),
    #[error("index {index} is out of range for {vertices} vertices")]
    IndexOutOfRange { index: u32, vertices: usize },
    #[error("buffers were built for {built_rows}x{built_cols} samples, grid is {rows}x{cols}")]
    StaleBuffers {
        built_rows: usize,
        built_cols: usize,
        rows: usize,
        cols: usize,
    },
    #[error("height update has {got} values, grid holds {expected}")]
    HeightCount { expected: usize, got: usize },
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SceneError {
    #[error("model {0} does not exist")]
    UnknownModel(u32),
    #[error("polygon {0} does not exist")]
    UnknownPolygon(PolygonId),
    #[error("no polygon is active")]
    NoActivePolygon,
    #[error("scene is busy: {0}")]
    Busy(String),
    #[error("nothing to undo")]
    NothingToUndo,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TaskError {
    #[error("background task panicked: {0}")]
    Panicked(String),
    #[error("failed to start background task: {0}")]
    Spawn(String),
    #[error("background task {0} returned an unexpected payload type")]
    UnexpectedPayload(u64),
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid JSON settings: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid YAML settings: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("unsupported settings extension `{0}`")]
    UnsupportedFormat(String),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Grid(#[from] GridError),
    #[error(transparent)]
    Interpolation(#[from] InterpolationError),
    #[error(transparent)]
    Filter(#[from] FilterError),
    #[error(transparent)]
    Transformation(#[from] TransformationError),
    #[error(transparent)]
    MapTransformation(#[from] MapTransformationError),
    #[error(transparent)]
    Mesh(#[from] MeshError),
    #[error(transparent)]
    Scene(#[from] SceneError),
    #[error(transparent)]
    Task(#[from] TaskError),
    #[error(transparent)]
    Settings(#[from] SettingsError),
}

pub type Result<T> = std::result::Result<T, EngineError>;
