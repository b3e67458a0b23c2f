pub mod error;
pub mod filter;
pub mod grid;
pub mod interpolation;
pub mod map_transformation;
pub mod mesh;
pub mod polygon;
pub mod scene;
pub mod settings;
pub mod tasks;
pub mod transformation;

pub use error::{EngineError, Result};
pub use filter::Filter;
pub use grid::{Bounds, Grid};
pub use interpolation::{Interpolator, InterpolatorKind};
pub use map_transformation::{MapTransformation, MergePriority};
pub use mesh::{ColorRamp, GridModel, MeshBuffers, MeshOptions, ModelId, ViewMode};
pub use polygon::{ParamValue, Polygon, PolygonId, PolygonRecord, PreparedPolygon};
pub use scene::Scene;
pub use settings::Settings;
pub use tasks::{TaskId, TaskScheduler};
pub use transformation::{EdgeBlend, HeightRule, Transformation};
