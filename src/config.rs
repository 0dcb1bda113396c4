//! Configuration
//!
//! Explicit configuration passed into the store and pipeline at construction
//! time. Storage roots are plain fields here, never process-wide state; the
//! store creates per-paper directories lazily on first write.

use std::path::PathBuf;

use crate::dedup::DEFAULT_IOU_THRESHOLD;

/// Top-level configuration for the annotation pipeline
#[derive(Debug, Clone)]
pub struct ScribeConfig {
    /// Directory holding the source papers (one PDF per paper id)
    pub papers_root: PathBuf,
    /// Directory holding per-paper annotation logs and their backups
    pub profiles_root: PathBuf,
    /// Pipeline tuning knobs
    pub pipeline: PipelineConfig,
}

impl ScribeConfig {
    pub fn new(papers_root: impl Into<PathBuf>, profiles_root: impl Into<PathBuf>) -> Self {
        Self {
            papers_root: papers_root.into(),
            profiles_root: profiles_root.into(),
            pipeline: PipelineConfig::default(),
        }
    }

    /// Load the storage roots from `PAPERS_ROOT` / `PROFILES_ROOT`
    pub fn from_env() -> Result<Self, std::env::VarError> {
        let papers_root = std::env::var("PAPERS_ROOT")?;
        let profiles_root = std::env::var("PROFILES_ROOT")?;
        Ok(Self::new(papers_root, profiles_root))
    }
}

/// Tuning parameters for candidate generation and cropping
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Raster resolution in pixels per document point
    pub render_scale: f64,
    /// Symmetric crop padding in raster pixels, clamped to image bounds
    pub crop_padding: f64,
    /// Minimum detector confidence for a candidate to be considered
    pub confidence_threshold: f32,
    /// IoU above which a candidate is suppressed as a duplicate
    pub iou_threshold: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            render_scale: 2.0,
            crop_padding: 5.0,
            confidence_threshold: 0.5,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
        }
    }
}
