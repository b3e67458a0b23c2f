use std::{
    env, fs,
    path::{Path, PathBuf},
    process, thread,
    time::Duration,
};

use relief::{EdgeBlend, MapTransformation, ModelId, PolygonRecord, Scene, Settings, Transformation};
use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Deserialize)]
struct Job {
    #[serde(default)]
    settings: Option<PathBuf>,
    surfaces: Vec<Surface>,
    #[serde(default)]
    polygons: Vec<PolygonRecord>,
    #[serde(default)]
    steps: Vec<Step>,
}

/// `null` heights are holes.
#[derive(Serialize, Deserialize)]
struct Surface {
    name: String,
    x: Vec<f64>,
    y: Vec<f64>,
    z: Vec<Vec<Option<f64>>>,
    #[serde(default)]
    no_data: Option<f64>,
}

#[derive(Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Step {
    Transform {
        model: ModelId,
        transformation: Transformation,
    },
    Map {
        model: ModelId,
        operation: MapTransformation,
        #[serde(default)]
        secondary: Option<ModelId>,
    },
    Blend {
        model: ModelId,
        blend: EdgeBlend,
    },
    Reload {
        #[serde(default)]
        quality: Option<u8>,
    },
    Optimize,
    Undo,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let mut args = env::args();
    let program = args.next().unwrap_or_else(|| "relief_batch".to_string());

    let rest: Vec<String> = args.collect();
    if rest.is_empty() {
        print_usage(&program);
        return Err("missing job file path".to_string());
    }

    let mut job_path: Option<PathBuf> = None;
    let mut settings_path: Option<PathBuf> = None;
    let mut output: Option<PathBuf> = None;
    let mut frame_ms: u64 = 16;

    let mut iter = rest.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                print_usage(&program);
                return Ok(());
            }
            "--settings" => {
                let value = iter
                    .next()
                    .ok_or_else(|| "--settings requires a file path".to_string())?;
                settings_path = Some(PathBuf::from(value));
            }
            "--output" => {
                let value = iter
                    .next()
                    .ok_or_else(|| "--output requires a file path".to_string())?;
                output = Some(PathBuf::from(value));
            }
            "--frame-ms" => {
                let value = iter
                    .next()
                    .ok_or_else(|| "--frame-ms requires a duration".to_string())?;
                frame_ms = value
                    .parse::<u64>()
                    .map_err(|_| "--frame-ms expects a positive integer".to_string())?;
            }
            _ => {
                if job_path.is_none() {
                    job_path = Some(PathBuf::from(arg));
                } else {
                    print_usage(&program);
                    return Err(format!("unexpected argument: {arg}"));
                }
            }
        }
    }

    let Some(job_path) = job_path else {
        print_usage(&program);
        return Err("missing job file path".to_string());
    };

    let text = fs::read_to_string(&job_path)
        .map_err(|err| format!("failed to read {}: {err}", job_path.display()))?;
    let job: Job = serde_json::from_str(&text)
        .map_err(|err| format!("invalid job file {}: {err}", job_path.display()))?;

    let settings = match settings_path.or_else(|| job.settings.clone()) {
        Some(path) => Settings::load(&path)
            .map_err(|err| format!("failed to load settings {}: {err}", path.display()))?,
        None => Settings::default(),
    };
    init_logging(&settings);

    let frame = Duration::from_millis(frame_ms);
    let mut scene = Scene::new(settings);

    for record in &job.polygons {
        scene.import_polygon(record);
    }

    for surface in job.surfaces {
        let name = surface.name.clone();
        let z = surface
            .z
            .into_iter()
            .map(|row| row.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
            .collect();
        scene
            .load_surface(surface.name, surface.x, surface.y, z, surface.no_data)
            .map_err(|err| format!("surface '{name}': {err}"))?;
        settle(&mut scene, frame).map_err(|err| format!("surface '{name}': {err}"))?;
    }

    for (index, step) in job.steps.into_iter().enumerate() {
        let dispatched = match step {
            Step::Transform {
                model,
                transformation,
            } => scene.apply_transformation(model, transformation),
            Step::Map {
                model,
                operation,
                secondary,
            } => scene.apply_map_transformation(model, operation, secondary),
            Step::Blend { model, blend } => scene.blend_polygon_border(model, blend),
            Step::Reload { quality } => scene.reload_meshes(quality),
            Step::Optimize => scene.optimize_gpu_memory(),
            Step::Undo => scene.undo_last_transformation(),
        };
        dispatched.map_err(|err| format!("step {index}: {err}"))?;
        settle(&mut scene, frame).map_err(|err| format!("step {index}: {err}"))?;
        info!(step = index, "step completed");
    }

    print_summary(&scene);

    if let Some(path) = output {
        write_surfaces(&scene, &path)?;
        println!("\nWrote {}", path.display());
    }

    Ok(())
}

fn init_logging(settings: &Settings) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.log_filter));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Drives frames until every deferred task and continuation has run.
fn settle(scene: &mut Scene, frame: Duration) -> Result<(), String> {
    while !scene.is_idle() {
        scene.update_frame();
        thread::sleep(frame);
    }
    match scene.take_last_error() {
        Some(err) => Err(err.to_string()),
        None => Ok(()),
    }
}

fn print_summary(scene: &Scene) {
    println!("Models: {}", scene.model_ids().len());
    println!(
        "{:<4} {:<20} {:>11} {:>7} {:>9} {:>9} {:>7}  {}",
        "ID", "Name", "Shape", "Quality", "Vertices", "Triangles", "Holes", "Range"
    );
    for id in scene.model_ids() {
        let Some(model) = scene.model(id) else {
            continue;
        };
        let grid = model.grid();
        let buffers = model.buffers();
        let range = match model.height_range() {
            Some((lo, hi)) => format!("{lo:.3} .. {hi:.3}"),
            None => "-".to_string(),
        };
        println!(
            "{:<4} {:<20} {:>11} {:>7} {:>9} {:>9} {:>7}  {}",
            id,
            truncated_name(model.name(), 20),
            format!("{}x{}", grid.rows(), grid.cols()),
            model.quality(),
            buffers.vertex_count(),
            buffers.triangle_count(),
            grid.hole_count(),
            range
        );
    }
    println!("Polygons: {}", scene.polygon_ids().len());
}

fn write_surfaces(scene: &Scene, path: &Path) -> Result<(), String> {
    let surfaces: Vec<Surface> = scene
        .model_ids()
        .into_iter()
        .filter_map(|id| scene.model(id))
        .map(|model| {
            let grid = model.grid();
            Surface {
                name: model.name().to_string(),
                x: grid.x().to_vec(),
                y: grid.y().to_vec(),
                z: (0..grid.rows())
                    .map(|row| {
                        grid.row(row)
                            .iter()
                            .map(|&v| if v.is_nan() { None } else { Some(v) })
                            .collect()
                    })
                    .collect(),
                no_data: None,
            }
        })
        .collect();
    let text = serde_json::to_string_pretty(&surfaces)
        .map_err(|err| format!("failed to encode surfaces: {err}"))?;
    fs::write(path, text).map_err(|err| format!("failed to write {}: {err}", path.display()))
}

fn print_usage(program: &str) {
    println!("Usage: {program} <JOB_FILE> [--settings <PATH>] [--output <PATH>] [--frame-ms <MS>]");
    println!("\nOptions:");
    println!("  --settings <PATH>  JSON or YAML engine settings (overrides the job's own)");
    println!("  --output <PATH>    Write the resulting surfaces as JSON");
    println!("  --frame-ms <MS>    Sleep between frames while waiting on tasks (default 16)");
    println!("  -h, --help         Show this help message");
}

fn truncated_name(name: &str, width: usize) -> String {
    if name.chars().count() <= width {
        name.to_string()
    } else if width <= 1 {
        "…".to_string()
    } else {
        let mut truncated = name.chars().take(width - 1).collect::<String>();
        truncated.push('…');
        truncated
    }
}
