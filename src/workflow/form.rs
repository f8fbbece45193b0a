use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::backend::GenerationRequest;
use crate::error::WizardError;

/// Smallest grid cell, in meters, the trainer accepts.
pub const MIN_CELL_SIZE: u32 = 50;
/// Cell sizes must be a multiple of this.
pub const CELL_SIZE_STEP: u32 = 50;
pub const MIN_TRAJECTORY_COUNT: u32 = 100;
pub const TRAJECTORY_COUNT_STEP: u32 = 100;
pub const MIN_TRAJECTORY_LENGTH: u32 = 100;
pub const TRAJECTORY_LENGTH_STEP: u32 = 100;
/// Largest sample file accepted for upload.
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 500 * 1024 * 1024;

/// File extensions the trainer knows how to read.
const SAMPLE_EXTENSIONS: &[&str] = &["csv", "json"];

/// How the generator builds each synthetic trajectory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMethod {
    /// Walks the model from an origin for a fixed number of points.
    LengthConstrained,
    /// Fills the gap between two anchor points; has no length notion.
    PointToPoint,
}

impl GenerationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationMethod::LengthConstrained => "length_constrained",
            GenerationMethod::PointToPoint => "point_to_point",
        }
    }

    pub fn requires_length(&self) -> bool {
        !matches!(self, GenerationMethod::PointToPoint)
    }
}

impl fmt::Display for GenerationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything the user has entered across the wizard steps.
///
/// The snapshot survives backward navigation untouched; only the cache
/// lifecycle writes to it after a training run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormSnapshot {
    pub sample_file: Option<PathBuf>,
    pub cache_artifact_ref: Option<String>,
    pub cell_size: u32,
    pub trajectory_count: u32,
    pub generation_method: Option<GenerationMethod>,
    pub trajectory_length: Option<u32>,
    pub delete_cache_after_use: bool,
}

impl Default for FormSnapshot {
    fn default() -> Self {
        Self {
            sample_file: None,
            cache_artifact_ref: None,
            cell_size: MIN_CELL_SIZE,
            trajectory_count: MIN_TRAJECTORY_COUNT,
            generation_method: None,
            trajectory_length: None,
            delete_cache_after_use: false,
        }
    }
}

/// Which backend call a model-stage submission maps to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSource<'a> {
    /// Reuse a previously trained model.
    Cache(&'a str),
    /// Train a new model from a sample file.
    Sample { path: &'a Path, cell_size: u32 },
}

impl FormSnapshot {
    /// True when exactly one of sample file / cache artifact is set.
    pub fn has_single_model_source(&self) -> bool {
        self.sample_file.is_some() != self.cache_artifact_ref.is_some()
    }

    /// Guard for the model stage: one model source and, when training, a
    /// positive cell size.
    pub fn model_stage_ready(&self) -> bool {
        self.has_single_model_source()
            && (self.cache_artifact_ref.is_some() || self.cell_size > 0)
    }

    /// Checks the model-stage fields and tells which call to make.
    pub fn validate_model_stage(&self) -> Result<ModelSource<'_>, WizardError> {
        match (&self.sample_file, &self.cache_artifact_ref) {
            (Some(_), Some(_)) => Err(WizardError::Validation(
                "provide either a sample file or a cache artifact, not both".into(),
            )),
            (None, None) => Err(WizardError::Validation(
                "a sample file or a cache artifact is required".into(),
            )),
            (None, Some(name)) => {
                if name.trim().is_empty() {
                    return Err(WizardError::Validation(
                        "cache artifact name must not be empty".into(),
                    ));
                }
                Ok(ModelSource::Cache(name))
            }
            (Some(path), None) => {
                check_stepped("cell size", self.cell_size, MIN_CELL_SIZE, CELL_SIZE_STEP)?;
                Ok(ModelSource::Sample {
                    path,
                    cell_size: self.cell_size,
                })
            }
        }
    }

    /// Checks the generation-stage fields and builds the request body.
    pub fn validate_generation_stage(&self) -> Result<GenerationRequest, WizardError> {
        check_stepped(
            "trajectory count",
            self.trajectory_count,
            MIN_TRAJECTORY_COUNT,
            TRAJECTORY_COUNT_STEP,
        )?;

        let method = self
            .generation_method
            .ok_or_else(|| WizardError::Validation("a generation method is required".into()))?;

        let cache_file = self
            .cache_artifact_ref
            .clone()
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| {
                WizardError::Validation("no trained model is available for generation".into())
            })?;

        let trajectory_len = if method.requires_length() {
            let len = self.trajectory_length.ok_or_else(|| {
                WizardError::Validation(format!("trajectory length is required for {method}"))
            })?;
            check_stepped(
                "trajectory length",
                len,
                MIN_TRAJECTORY_LENGTH,
                TRAJECTORY_LENGTH_STEP,
            )?;
            Some(len)
        } else {
            None
        };

        Ok(GenerationRequest {
            num_trajectories: self.trajectory_count,
            generation_method: method,
            cache_file,
            trajectory_len,
            delete_cache_after: self.delete_cache_after_use,
        })
    }
}

/// Verifies a sample file can be uploaded: it exists, has a known
/// extension and fits within `max_bytes`.
pub fn validate_sample_file(path: &Path, max_bytes: u64) -> Result<(), WizardError> {
    let extension_ok = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| SAMPLE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false);
    if !extension_ok {
        return Err(WizardError::Validation(format!(
            "{} must be a .csv or .json file",
            path.display()
        )));
    }

    let meta = std::fs::metadata(path).map_err(|e| {
        WizardError::Validation(format!("cannot read {}: {e}", path.display()))
    })?;
    if !meta.is_file() {
        return Err(WizardError::Validation(format!(
            "{} is not a file",
            path.display()
        )));
    }
    if meta.len() > max_bytes {
        return Err(WizardError::Validation(format!(
            "{} is too large ({} bytes, limit {max_bytes})",
            path.display(),
            meta.len()
        )));
    }
    Ok(())
}

fn check_stepped(field: &str, value: u32, min: u32, step: u32) -> Result<(), WizardError> {
    if value < min {
        return Err(WizardError::Validation(format!(
            "{field} must be at least {min} (got {value})"
        )));
    }
    if value % step != 0 {
        return Err(WizardError::Validation(format!(
            "{field} must be a multiple of {step} (got {value})"
        )));
    }
    Ok(())
}
