//! Candidate generation
//!
//! Two heterogeneous candidate sources feed the pipeline: a model-based
//! detector emitting raster-space boxes with confidence, and a layout
//! heuristic emitting document-space boxes with a score. Both are normalized
//! here into one [`Candidate`] shape in document space.
//!
//! The selection policy is model-first with a heuristic fallback: the
//! heuristic is consulted only when the model yields zero candidates for a
//! page. The two detectors are independently tuned, so running them as an
//! ensemble would double-count equations. The policy is a named strategy
//! injected at pipeline construction, not a runtime probe.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::document::{DocumentError, LayoutProvider};
use crate::geometry::{BoundingBox, PageTransform};

pub mod heuristic;

/// Errors from candidate generation
#[derive(Debug, Error)]
pub enum DetectionError {
    /// Model-based detector collaborator failed
    #[error("detector failure: {0}")]
    ModelFailure(String),

    /// Layout collaborator failed while computing heuristic candidates
    #[error("layout failure: {0}")]
    Layout(#[from] DocumentError),
}

/// Raw model detector output: raster-space box, possibly corner-unordered
#[derive(Debug, Clone, Copy)]
pub struct PixelDetection {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
    pub confidence: f32,
}

/// A proposed equation region in document space
///
/// Ephemeral: produced per pipeline run and never persisted directly. A
/// candidate becomes an [`crate::store::EquationRecord`] only after surviving
/// deduplication and recognition.
#[derive(Debug, Clone, Copy)]
pub struct Candidate {
    pub bbox: BoundingBox,
    /// Detector confidence or heuristic score, in `[0, 1]`
    pub score: f32,
}

/// Model-based detector collaborator
#[async_trait]
pub trait EquationDetector: Send + Sync {
    /// Detect equation regions on a rendered page
    ///
    /// Boxes are in the raster space of `page_png`; detections below
    /// `confidence_threshold` are not returned.
    async fn detect(
        &self,
        page_png: &[u8],
        confidence_threshold: f32,
    ) -> Result<Vec<PixelDetection>, DetectionError>;
}

/// Convert raster-space detections to document-space candidates
///
/// Both corners go through `to_document`, then corner order is normalized.
/// Detection order is preserved.
pub fn candidates_from_detections(
    detections: &[PixelDetection],
    transform: &PageTransform,
) -> Vec<Candidate> {
    detections
        .iter()
        .map(|d| {
            let (x0, y0) = transform.to_document(d.x0, d.y0);
            let (x1, y1) = transform.to_document(d.x1, d.y1);
            Candidate {
                bbox: BoundingBox::new(x0, y0, x1, y1),
                score: d.confidence,
            }
        })
        .collect()
}

/// Candidate-source capability injected into the pipeline
#[async_trait]
pub trait CandidateSource: Send + Sync {
    /// Candidates for one page, in document space, in emission order
    ///
    /// `confidence_threshold` comes from the pipeline configuration; sources
    /// backed by a detector pass it straight through.
    async fn page_candidates(
        &self,
        page: usize,
        page_png: &[u8],
        transform: &PageTransform,
        confidence_threshold: f32,
    ) -> Result<Vec<Candidate>, DetectionError>;
}

/// Model-based detection with layout-heuristic fallback
///
/// The heuristic runs only when the model emits nothing for a page; it is a
/// fallback, never an ensemble.
pub struct ModelWithHeuristicFallback {
    detector: Arc<dyn EquationDetector>,
    layout: Arc<dyn LayoutProvider>,
}

impl ModelWithHeuristicFallback {
    pub fn new(detector: Arc<dyn EquationDetector>, layout: Arc<dyn LayoutProvider>) -> Self {
        Self { detector, layout }
    }
}

#[async_trait]
impl CandidateSource for ModelWithHeuristicFallback {
    async fn page_candidates(
        &self,
        page: usize,
        page_png: &[u8],
        transform: &PageTransform,
        confidence_threshold: f32,
    ) -> Result<Vec<Candidate>, DetectionError> {
        let detections = self
            .detector
            .detect(page_png, confidence_threshold)
            .await?;

        if !detections.is_empty() {
            return Ok(candidates_from_detections(&detections, transform));
        }

        tracing::debug!(page = page, "model emitted no candidates, using layout heuristic");
        let spans = self.layout.page_layout(page).await?;
        let (page_width, _) = transform.page_size_points();
        Ok(heuristic::candidates_from_layout(&spans, page_width))
    }
}
