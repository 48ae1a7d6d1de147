//! End-to-end atlas run: load, normalize, join, filter, classify, render
//! and write, driven by an [`AppConfig`].
//!
//! The three inputs are read concurrently on the blocking pool; every
//! later stage is a pure transformation from the pipeline crate.

use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crime_atlas_cli_utils::{IndicatifProgress, MultiProgress};
use crime_atlas_dataset_models::{AttributeTable, Crs, PointDataset, PolygonDataset};
use crime_atlas_loader::{LoadError, load_points, load_polygons, load_prebuilt, load_table};
use crime_atlas_pipeline::{
    PipelineError, aggregate_category, classify_quadrant, count_points_within, filter_within,
    join_attributes, normalize_field, reproject, reproject_polygons, rename_field,
    select_by_range,
};
use crime_atlas_render::color::hex_to_rgba;
use crime_atlas_render::{
    InteractiveOptions, RenderError, ScatterOptions, StaticMapOptions, render_interactive,
    render_scatter, render_static, save_png,
};
use crime_atlas_spatial::GeoProvider;
use image::RgbaImage;
use thiserror::Error;

use crate::config::{AppConfig, DatasetKind, NormalizeConfig, RenderConfig};

const TOTAL_STAGES: u64 = 7;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("Failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// What a run produced.
#[derive(Debug)]
pub struct RunSummary {
    pub polygons: PolygonDataset,
    pub points_within: PointDataset,
    pub outputs: Vec<PathBuf>,
}

async fn blocking<T, F>(f: F) -> Result<T, CliError>
where
    F: FnOnce() -> Result<T, LoadError> + Send + 'static,
    T: Send + 'static,
{
    Ok(tokio::task::spawn_blocking(f).await??)
}

fn apply_normalization<D: AttributeTable>(
    mut dataset: D,
    kind: DatasetKind,
    config: &NormalizeConfig,
) -> Result<D, PipelineError> {
    for rename in config.renames.iter().filter(|r| r.dataset == kind) {
        dataset = rename_field(dataset, &rename.from, &rename.to);
    }
    for field in config.fields.iter().filter(|f| f.dataset == kind) {
        dataset = normalize_field(dataset, &field.name, field.field_type)?;
    }
    Ok(dataset)
}

fn write_html(html: &str, path: &Path) -> Result<(), CliError> {
    let write_err = |source| CliError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(write_err)?;
    }
    std::fs::write(path, html).map_err(write_err)?;
    log::info!("Wrote {}", path.display());
    Ok(())
}

/// Everything a run writes, held in memory until publishing.
struct Rendered<'a> {
    polygons: &'a PolygonDataset,
    points_within: &'a PointDataset,
    selected: Option<&'a PolygonDataset>,
    static_map: &'a RgbaImage,
    scatter: Option<&'a RgbaImage>,
    html: &'a str,
}

/// Directory beside `out_dir` that outputs are written to before being
/// moved in.
fn staging_dir(out_dir: &Path) -> PathBuf {
    let name = out_dir
        .file_name()
        .map_or_else(|| "atlas".to_string(), |n| n.to_string_lossy().into_owned());
    out_dir.with_file_name(format!(".{name}.partial"))
}

/// Writes every artifact into `dir` and returns their file names in
/// write order.
fn write_artifacts(dir: &Path, rendered: &Rendered<'_>) -> Result<Vec<&'static str>, CliError> {
    let mut names = vec!["joined.geojson", "points_within.geojson"];
    crime_atlas_loader::save_polygons(rendered.polygons, &dir.join(names[0]))?;
    crime_atlas_loader::save_points(rendered.points_within, &dir.join(names[1]))?;

    if let Some(selected) = rendered.selected {
        crime_atlas_loader::save_polygons(selected, &dir.join("selected.geojson"))?;
        names.push("selected.geojson");
    }

    save_png(rendered.static_map, &dir.join("static_map.png"))?;
    names.push("static_map.png");

    if let Some(scatter) = rendered.scatter {
        save_png(scatter, &dir.join("scatter.png"))?;
        names.push("scatter.png");
    }

    write_html(rendered.html, &dir.join("interactive.html"))?;
    names.push("interactive.html");
    Ok(names)
}

/// Writes the artifacts into [`staging_dir`] and renames them into
/// `out_dir` once all of them are on disk. A failed write leaves
/// `out_dir` as it was.
fn publish(out_dir: &Path, rendered: &Rendered<'_>) -> Result<Vec<PathBuf>, CliError> {
    let write_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| CliError::Write { path, source }
    };

    let staging = staging_dir(out_dir);
    if staging.is_dir() {
        log::debug!("Removing stale staging directory {}", staging.display());
        std::fs::remove_dir_all(&staging).map_err(write_err(&staging))?;
    }
    std::fs::create_dir_all(&staging).map_err(write_err(&staging))?;

    let names = match write_artifacts(&staging, rendered) {
        Ok(names) => names,
        Err(e) => {
            if let Err(cleanup) = std::fs::remove_dir_all(&staging) {
                log::warn!("Could not remove {}: {cleanup}", staging.display());
            }
            return Err(e);
        }
    };

    std::fs::create_dir_all(out_dir).map_err(write_err(out_dir))?;
    let mut outputs = Vec::with_capacity(names.len());
    for name in names {
        let target = out_dir.join(name);
        std::fs::rename(staging.join(name), &target).map_err(write_err(&target))?;
        outputs.push(target);
    }
    std::fs::remove_dir(&staging).map_err(write_err(&staging))?;

    log::info!("Published {} outputs to {}", outputs.len(), out_dir.display());
    Ok(outputs)
}

fn static_options(render: &RenderConfig) -> Result<StaticMapOptions, RenderError> {
    Ok(StaticMapOptions {
        width: render.width,
        height: render.height,
        color_field: render.color_field.clone(),
        size_field: render.size_field.clone(),
        low_color: hex_to_rgba(&render.low_color)?,
        high_color: hex_to_rgba(&render.high_color)?,
        ..StaticMapOptions::default()
    })
}

fn scatter_options(render: &RenderConfig) -> Result<ScatterOptions, RenderError> {
    Ok(ScatterOptions {
        x_field: render.scatter_x.clone(),
        y_field: render.scatter_y.clone(),
        color_field: render.scatter_color.clone(),
        size_field: render.scatter_size.clone(),
        low_color: hex_to_rgba(&render.low_color)?,
        high_color: hex_to_rgba(&render.high_color)?,
        ..ScatterOptions::default()
    })
}

fn interactive_options(render: &RenderConfig) -> Result<InteractiveOptions, RenderError> {
    Ok(InteractiveOptions {
        title: render.title.clone(),
        color_field: Some(render.color_field.clone()),
        low_color: hex_to_rgba(&render.low_color)?,
        high_color: hex_to_rgba(&render.high_color)?,
    })
}

/// Runs every stage and writes the outputs into `config.output.dir`.
///
/// # Errors
///
/// Returns the first [`CliError`] raised by any stage. Nothing is written
/// unless every stage up to rendering succeeded, and outputs only replace
/// the contents of `config.output.dir` once every file has been written.
pub async fn run(config: &AppConfig, multi: &MultiProgress) -> Result<RunSummary, CliError> {
    let start = Instant::now();
    let provider = GeoProvider::new();
    let render = &config.render;
    let out_dir = &config.output.dir;

    // Bad colors should fail before any work is done.
    let static_opts = static_options(render)?;
    let scatter_opts = scatter_options(render)?;
    let interactive_opts = interactive_options(render)?;

    let mut stages = IndicatifProgress::stages(multi, TOTAL_STAGES);

    // --- 1. Load ---
    stages.begin("Loading inputs");
    let (polygons_path, points_path, crimes_path) = (
        config.input.polygons.clone(),
        config.input.points.clone(),
        config.input.crimes.clone(),
    );
    let (polygons, points, crimes) = tokio::try_join!(
        blocking(move || load_polygons(&polygons_path)),
        blocking(move || load_points(&points_path)),
        blocking(move || load_table(&crimes_path)),
    )?;

    // --- 2. Normalize ---
    stages.begin("Normalizing attributes");
    let polygons = apply_normalization(polygons, DatasetKind::Polygons, &config.normalize)?;
    let points = apply_normalization(points, DatasetKind::Points, &config.normalize)?;

    // --- 3. Join ---
    stages.begin(&format!("Joining '{}'", config.join.category));
    let counts = aggregate_category(&crimes, &config.join.category)?;
    let polygons = join_attributes(
        polygons,
        &counts,
        &config.join.polygon_key,
        &config.join.output_field,
    )?;

    // --- 4. Filter ---
    stages.begin("Filtering points");
    let points = reproject(points, &polygons.crs, &provider)?;
    let points_within = filter_within(points, &polygons, &provider)?;
    let polygons = match &config.filter.count_field {
        Some(field) => count_points_within(polygons, &points_within, &provider, field)?,
        None => polygons,
    };

    // --- 5. Classify ---
    stages.begin("Classifying quadrants");
    let polygons = classify_quadrant(polygons, &provider);

    // --- 6. Render ---
    // Nothing is written until every artifact has rendered.
    stages.begin("Rendering maps");
    let selected = config.filter.select.as_ref().map(|select| {
        select_by_range(
            polygons.clone(),
            &select.field,
            (Bound::Excluded(select.min), Bound::Excluded(select.max)),
        )
    });
    let static_map = render_static(&polygons, Some(&points_within), &static_opts)?;
    let scatter = match render_scatter(&polygons, &scatter_opts) {
        Ok(image) => Some(image),
        Err(RenderError::EmptyExtent) => {
            log::warn!(
                "No polygon has numeric '{}' and '{}'; skipping scatter plot",
                render.scatter_x,
                render.scatter_y
            );
            None
        }
        Err(e) => return Err(e.into()),
    };
    let html = render_interactive(
        &reproject_polygons(polygons.clone(), &Crs::Wgs84, &provider)?,
        Some(&reproject(points_within.clone(), &Crs::Wgs84, &provider)?),
        &interactive_opts,
    )?;

    // --- 7. Write ---
    stages.begin("Writing outputs");
    let outputs = publish(
        out_dir,
        &Rendered {
            polygons: &polygons,
            points_within: &points_within,
            selected: selected.as_ref(),
            static_map: &static_map,
            scatter: scatter.as_ref(),
            html: &html,
        },
    )?;

    stages.finish(format!(
        "Atlas complete: {} regions, {} points in {:.1}s",
        polygons.len(),
        points_within.len(),
        start.elapsed().as_secs_f64()
    ));

    Ok(RunSummary {
        polygons,
        points_within,
        outputs,
    })
}

/// Renders the interactive page straight from a saved `joined.geojson`,
/// reprojecting it to WGS84 first.
///
/// # Errors
///
/// Returns a [`CliError`] if the dataset cannot be loaded, reprojected,
/// rendered or written.
pub async fn interactive(
    input: PathBuf,
    output: &Path,
    options: InteractiveOptions,
) -> Result<(), CliError> {
    let start = Instant::now();
    let polygons = blocking(move || load_prebuilt(&input)).await?;
    let polygons = reproject_polygons(polygons, &Crs::Wgs84, &GeoProvider::new())?;
    let html = render_interactive(&polygons, None, &options)?;
    write_html(&html, output)?;
    log::info!(
        "Interactive map ready in {:.1}s",
        start.elapsed().as_secs_f64()
    );
    Ok(())
}
