//! TOML run configuration.
//!
//! Relative paths are resolved against the directory holding the config
//! file, so a run behaves the same from any working directory.

use std::path::{Path, PathBuf};

use crime_atlas_crime_models::MajorCategory;
use crime_atlas_dataset_models::FieldType;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    pub input: InputConfig,
    #[serde(default)]
    pub normalize: NormalizeConfig,
    #[serde(default)]
    pub join: JoinConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub render: RenderConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InputConfig {
    /// Borough polygons: shapefile, shapefile directory or `GeoJSON`.
    pub polygons: PathBuf,
    /// Station points, same formats.
    pub points: PathBuf,
    /// Crime table (`.csv` or `.tsv`).
    pub crimes: PathBuf,
}

/// Which dataset a normalization step applies to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetKind {
    #[default]
    Polygons,
    Points,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub dataset: DatasetKind,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RenameSpec {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub dataset: DatasetKind,
}

/// Renames run before type normalization.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NormalizeConfig {
    #[serde(default)]
    pub renames: Vec<RenameSpec>,
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JoinConfig {
    /// Polygon attribute holding the region name.
    pub polygon_key: String,
    /// `CrimeType` value to aggregate.
    pub category: String,
    /// Field receiving the summed count.
    pub output_field: String,
}

impl Default for JoinConfig {
    fn default() -> Self {
        Self {
            polygon_key: "name".to_string(),
            category: MajorCategory::TheftHandling.to_string(),
            output_field: "CrimeCount".to_string(),
        }
    }
}

/// Polygons whose `field` lies strictly between `min` and `max`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SelectConfig {
    pub field: String,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FilterConfig {
    /// Field receiving the number of points inside each polygon.
    pub count_field: Option<String>,
    pub select: Option<SelectConfig>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            count_field: Some("stations".to_string()),
            select: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RenderConfig {
    pub width: u32,
    pub height: u32,
    pub title: String,
    pub color_field: String,
    pub size_field: Option<String>,
    pub low_color: String,
    pub high_color: String,
    pub scatter_x: String,
    pub scatter_y: String,
    pub scatter_color: Option<String>,
    pub scatter_size: Option<String>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 800,
            title: "Crime atlas".to_string(),
            color_field: "CrimeCount".to_string(),
            size_field: None,
            low_color: "#ffffb2".to_string(),
            high_color: "#bd0026".to_string(),
            scatter_x: "Partic_Per".to_string(),
            scatter_y: "Pop_2001".to_string(),
            scatter_color: None,
            scatter_size: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    pub dir: PathBuf,
}

impl AppConfig {
    /// Reads and parses a config file, resolving relative paths.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::parse(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Ok(config.resolve_paths(base))
    }

    /// Parses TOML text. Paths are left as written.
    ///
    /// # Errors
    ///
    /// Returns the TOML error if the text is malformed or has unknown keys.
    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        let config: Self = toml::from_str(content)?;
        if MajorCategory::from_label(&config.join.category).is_none() {
            log::warn!(
                "Category '{}' is not a known major category; joining it anyway",
                config.join.category
            );
        }
        Ok(config)
    }

    #[must_use]
    pub fn resolve_paths(mut self, base: &Path) -> Self {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        resolve(&mut self.input.polygons);
        resolve(&mut self.input.points);
        resolve(&mut self.input.crimes);
        resolve(&mut self.output.dir);
        self
    }
}
