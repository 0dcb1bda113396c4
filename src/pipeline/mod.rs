//! Pipeline orchestrator
//!
//! Sequences candidate generation → crop extraction → recognition →
//! deduplication → persistence for a whole paper, or runs a one-off
//! recognition pass over a caller-supplied region. The pipeline is
//! synchronous per invocation: one caller, one document, one page at a time,
//! awaits in order, no internal parallelism and no cancellation. Partial
//! progress already appended to the store is retained if a later step fails.

use std::io::Cursor;
use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use crate::candidates::{CandidateSource, DetectionError};
use crate::config::PipelineConfig;
use crate::dedup::ExclusionSet;
use crate::document::{DocumentError, PageRenderer};
use crate::geometry::{BoundingBox, PageTransform};
use crate::recognize::{LatexRecognizer, RecognitionError};
use crate::store::{AnnotationStore, EquationBox, EquationRecord, StoreError};

/// Errors surfaced by pipeline entry points
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error(transparent)]
    Detection(#[from] DetectionError),

    #[error(transparent)]
    Recognition(#[from] RecognitionError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("image error: {0}")]
    Image(String),
}

/// Outcome of a whole-document scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanSummary {
    /// Records appended by this run
    pub added: usize,
    /// Pre-existing records plus `added`
    pub total: usize,
}

/// Annotation pipeline for one opened paper
pub struct Pipeline {
    paper_id: String,
    renderer: Arc<dyn PageRenderer>,
    source: Arc<dyn CandidateSource>,
    recognizer: Arc<dyn LatexRecognizer>,
    store: AnnotationStore,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(
        paper_id: &str,
        renderer: Arc<dyn PageRenderer>,
        source: Arc<dyn CandidateSource>,
        recognizer: Arc<dyn LatexRecognizer>,
        store: AnnotationStore,
        config: PipelineConfig,
    ) -> Self {
        Self {
            paper_id: paper_id.to_string(),
            renderer,
            source,
            recognizer,
            store,
            config,
        }
    }

    /// Recognize one caller-supplied document-space region
    ///
    /// Crops with symmetric padding clamped to the page image and calls the
    /// recognizer once. Does not touch the store; collaborator failures
    /// propagate directly.
    pub async fn rescan_region(
        &self,
        page: usize,
        bbox: BoundingBox,
    ) -> Result<String, PipelineError> {
        let transform =
            PageTransform::for_page(self.renderer.as_ref(), page, self.config.render_scale)?;
        let png = self
            .renderer
            .render_page(page, self.config.render_scale)
            .await?;
        let img = image::load_from_memory(&png)
            .map_err(|e| PipelineError::Image(format!("failed to decode page image: {e}")))?;

        let crop = encode_crop(&img, &transform, &bbox, self.config.crop_padding)?;
        let latex = self.recognizer.recognize(&crop).await?;
        Ok(latex)
    }

    /// Scan every page, recognizing and persisting non-duplicate candidates
    ///
    /// The per-page exclusion set is seeded from all currently stored records
    /// for that page, so a repeat run is idempotent with respect to
    /// previously accepted equations. Page and candidate failures are logged
    /// and skipped; already-appended records stand.
    pub async fn autodetect(&self) -> Result<ScanSummary, PipelineError> {
        let stored = self.store.read(&self.paper_id).await?;
        let pre_existing = stored.len();
        let mut added = 0;

        for page in 0..self.renderer.page_count() {
            match self.autodetect_page(page, &stored).await {
                Ok(n) => added += n,
                Err(e) => {
                    tracing::warn!(
                        paper_id = self.paper_id.as_str(),
                        page = page,
                        error = %e,
                        "page scan failed, continuing with next page"
                    );
                }
            }
        }

        let summary = ScanSummary {
            added,
            total: pre_existing + added,
        };
        tracing::info!(
            paper_id = self.paper_id.as_str(),
            added = summary.added,
            total = summary.total,
            "autodetect scan complete"
        );
        Ok(summary)
    }

    async fn autodetect_page(
        &self,
        page: usize,
        stored: &[EquationRecord],
    ) -> Result<usize, PipelineError> {
        let transform =
            PageTransform::for_page(self.renderer.as_ref(), page, self.config.render_scale)?;
        let png = self
            .renderer
            .render_page(page, self.config.render_scale)
            .await?;
        let img = image::load_from_memory(&png)
            .map_err(|e| PipelineError::Image(format!("failed to decode page image: {e}")))?;

        let candidates = self
            .source
            .page_candidates(page, &png, &transform, self.config.confidence_threshold)
            .await?;

        // Fresh per-page exclusion set, seeded from everything already stored
        // for this page, then grown as candidates are accepted.
        let mut exclusion =
            ExclusionSet::for_page(page as u32, stored, self.config.iou_threshold);

        let mut added = 0;
        for candidate in candidates {
            if !exclusion.admit(candidate.bbox) {
                tracing::debug!(
                    page = page,
                    bbox = ?candidate.bbox,
                    "candidate suppressed as duplicate"
                );
                continue;
            }

            let crop = match encode_crop(&img, &transform, &candidate.bbox, self.config.crop_padding)
            {
                Ok(crop) => crop,
                Err(e) => {
                    tracing::warn!(page = page, error = %e, "crop failed, skipping candidate");
                    continue;
                }
            };

            let latex = match self.recognizer.recognize(&crop).await {
                Ok(latex) => latex,
                Err(e) => {
                    tracing::warn!(
                        page = page,
                        error = %e,
                        "recognition failed, skipping candidate"
                    );
                    continue;
                }
            };

            let record = EquationRecord {
                eq_uid: Uuid::new_v4().simple().to_string(),
                paper_id: self.paper_id.clone(),
                latex,
                notes: format!("autodetected (score {:.2})", candidate.score),
                boxes: vec![EquationBox {
                    page: page as u32,
                    bbox: candidate.bbox,
                }],
            };
            record.validate()?;
            self.store.append(&record).await?;
            added += 1;
        }

        Ok(added)
    }
}

/// Padded raster crop rectangle for a document-space box, clamped to the image
///
/// Returns `(x, y, width, height)` in pixels, or `None` when the clamped
/// region is empty.
pub(crate) fn padded_crop_rect(
    transform: &PageTransform,
    bbox: &BoundingBox,
    padding: f64,
    img_width: u32,
    img_height: u32,
) -> Option<(u32, u32, u32, u32)> {
    let pixel = transform.box_to_pixel(bbox);
    let x0 = (pixel.x0 - padding).max(0.0);
    let y0 = (pixel.y0 - padding).max(0.0);
    let x1 = (pixel.x1 + padding).min(img_width as f64);
    let y1 = (pixel.y1 + padding).min(img_height as f64);
    if x1 <= x0 || y1 <= y0 {
        return None;
    }
    Some((
        x0.floor() as u32,
        y0.floor() as u32,
        (x1 - x0).ceil() as u32,
        (y1 - y0).ceil() as u32,
    ))
}

/// Crop the padded region out of a page image and re-encode as PNG
fn encode_crop(
    img: &image::DynamicImage,
    transform: &PageTransform,
    bbox: &BoundingBox,
    padding: f64,
) -> Result<Vec<u8>, PipelineError> {
    let (x, y, w, h) = padded_crop_rect(transform, bbox, padding, img.width(), img.height())
        .ok_or_else(|| PipelineError::Image("crop region is empty".to_string()))?;

    let cropped = img.crop_imm(x, y, w, h);
    let mut buf = Vec::new();
    cropped
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| PipelineError::Image(format!("failed to encode crop: {e}")))?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidates::test_support::{CannedDetector, FailingDetector, RecordingDetector};
    use crate::candidates::{ModelWithHeuristicFallback, PixelDetection};
    use crate::document::test_support::{init_tracing, FixedLayoutProvider, FixedPageRenderer};
    use crate::recognize::test_support::{CannedRecognizer, FailingRecognizer};
    use tempfile::TempDir;

    const PAGE_W: f64 = 600.0;
    const PAGE_H: f64 = 800.0;

    fn pipeline_with(
        dir: &TempDir,
        detections: Vec<PixelDetection>,
        recognizer: Arc<dyn LatexRecognizer>,
    ) -> Pipeline {
        let renderer = Arc::new(FixedPageRenderer::new(1, PAGE_W, PAGE_H));
        let source = Arc::new(ModelWithHeuristicFallback::new(
            Arc::new(CannedDetector { detections }),
            Arc::new(FixedLayoutProvider { spans: vec![] }),
        ));
        Pipeline::new(
            "paper-1",
            renderer,
            source,
            recognizer,
            AnnotationStore::new(dir.path()),
            PipelineConfig::default(),
        )
    }

    /// Raster-space detection for a document-space box at scale 2.0
    fn detection(x0: f64, y0: f64, x1: f64, y1: f64, confidence: f32) -> PixelDetection {
        PixelDetection {
            x0: x0 * 2.0,
            y0: y0 * 2.0,
            x1: x1 * 2.0,
            y1: y1 * 2.0,
            confidence,
        }
    }

    fn stored_record(page: u32, bbox: BoundingBox) -> EquationRecord {
        EquationRecord {
            eq_uid: "seed".to_string(),
            paper_id: "paper-1".to_string(),
            latex: "y = x".to_string(),
            notes: String::new(),
            boxes: vec![EquationBox { page, bbox }],
        }
    }

    #[tokio::test]
    async fn rescan_region_returns_latex_without_touching_store() {
        let dir = TempDir::new().unwrap();
        let recognizer = Arc::new(CannedRecognizer::new("\\frac{a}{b}"));
        let pipeline = pipeline_with(&dir, vec![], recognizer.clone());

        let latex = pipeline
            .rescan_region(0, BoundingBox::new(50.0, 100.0, 200.0, 150.0))
            .await
            .unwrap();

        assert_eq!(latex, "\\frac{a}{b}");
        assert_eq!(recognizer.call_count(), 1);
        let store = AnnotationStore::new(dir.path());
        assert!(store.read("paper-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rescan_region_rejects_bad_page_index() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline_with(&dir, vec![], Arc::new(CannedRecognizer::new("x")));

        let err = pipeline
            .rescan_region(7, BoundingBox::new(0.0, 0.0, 10.0, 10.0))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Document(DocumentError::PageOutOfRange { page: 7, .. })
        ));
    }

    #[tokio::test]
    async fn autodetect_suppresses_overlap_with_stored_record() {
        let dir = TempDir::new().unwrap();
        let detections = vec![
            // IoU against stored (0,0,10,10) is 0.64: rejected
            detection(1.0, 1.0, 9.0, 9.0, 0.9),
            // Disjoint: accepted
            detection(20.0, 20.0, 30.0, 30.0, 0.8),
        ];
        let pipeline = pipeline_with(&dir, detections, Arc::new(CannedRecognizer::new("x^2")));

        let store = AnnotationStore::new(dir.path());
        let seed = stored_record(0, BoundingBox::new(0.0, 0.0, 10.0, 10.0));
        seed.validate().unwrap();
        store.append(&seed).await.unwrap();

        let summary = pipeline.autodetect().await.unwrap();
        assert_eq!(summary.added, 1);
        assert_eq!(summary.total, 2);

        let records = store.read("paper-1").await.unwrap();
        assert_eq!(records.len(), 2);
        let new = &records[1];
        assert_eq!(new.latex, "x^2");
        assert_eq!(new.boxes[0].bbox, BoundingBox::new(20.0, 20.0, 30.0, 30.0));
        assert!(new.notes.contains("0.80"));
    }

    #[tokio::test]
    async fn autodetect_rerun_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let detections = vec![detection(100.0, 100.0, 200.0, 130.0, 0.95)];
        let pipeline = pipeline_with(&dir, detections, Arc::new(CannedRecognizer::new("a+b")));

        let first = pipeline.autodetect().await.unwrap();
        assert_eq!(first.added, 1);
        assert_eq!(first.total, 1);

        let second = pipeline.autodetect().await.unwrap();
        assert_eq!(second.added, 0);
        assert_eq!(second.total, 1);
    }

    #[tokio::test]
    async fn same_run_duplicates_are_first_one_wins() {
        let dir = TempDir::new().unwrap();
        let detections = vec![
            detection(100.0, 100.0, 200.0, 130.0, 0.6),
            // Near-identical re-detection of the same equation
            detection(101.0, 101.0, 200.0, 130.0, 0.9),
        ];
        let pipeline = pipeline_with(&dir, detections, Arc::new(CannedRecognizer::new("z")));

        let summary = pipeline.autodetect().await.unwrap();
        assert_eq!(summary.added, 1);

        let store = AnnotationStore::new(dir.path());
        let records = store.read("paper-1").await.unwrap();
        assert_eq!(records.len(), 1);
        // The earlier, lower-confidence candidate won
        assert!(records[0].notes.contains("0.60"));
    }

    #[tokio::test]
    async fn recognition_failures_leave_best_effort_summary() {
        let dir = TempDir::new().unwrap();
        let detections = vec![detection(100.0, 100.0, 200.0, 130.0, 0.9)];
        let pipeline = pipeline_with(&dir, detections, Arc::new(FailingRecognizer));

        let summary = pipeline.autodetect().await.unwrap();
        assert_eq!(summary.added, 0);
        assert_eq!(summary.total, 0);
    }

    #[tokio::test]
    async fn detector_failure_does_not_fail_the_scan() {
        init_tracing();
        let dir = TempDir::new().unwrap();
        let renderer = Arc::new(FixedPageRenderer::new(2, PAGE_W, PAGE_H));
        let source = Arc::new(ModelWithHeuristicFallback::new(
            Arc::new(FailingDetector),
            Arc::new(FixedLayoutProvider { spans: vec![] }),
        ));
        let pipeline = Pipeline::new(
            "paper-1",
            renderer,
            source,
            Arc::new(CannedRecognizer::new("x")),
            AnnotationStore::new(dir.path()),
            PipelineConfig::default(),
        );

        let summary = pipeline.autodetect().await.unwrap();
        assert_eq!(summary.added, 0);
    }

    #[tokio::test]
    async fn configured_confidence_threshold_reaches_detector() {
        let dir = TempDir::new().unwrap();
        let detector = Arc::new(RecordingDetector::new(vec![]));
        let source = Arc::new(ModelWithHeuristicFallback::new(
            detector.clone(),
            Arc::new(FixedLayoutProvider { spans: vec![] }),
        ));
        let config = PipelineConfig {
            confidence_threshold: 0.7,
            ..PipelineConfig::default()
        };
        let pipeline = Pipeline::new(
            "paper-1",
            Arc::new(FixedPageRenderer::new(1, PAGE_W, PAGE_H)),
            source,
            Arc::new(CannedRecognizer::new("x")),
            AnnotationStore::new(dir.path()),
            config,
        );

        pipeline.autodetect().await.unwrap();
        assert_eq!(detector.last_threshold(), Some(0.7));
    }

    #[tokio::test]
    async fn new_records_get_distinct_uids() {
        let dir = TempDir::new().unwrap();
        let detections = vec![
            detection(10.0, 10.0, 50.0, 30.0, 0.9),
            detection(10.0, 200.0, 50.0, 230.0, 0.9),
        ];
        let pipeline = pipeline_with(&dir, detections, Arc::new(CannedRecognizer::new("q")));
        pipeline.autodetect().await.unwrap();

        let store = AnnotationStore::new(dir.path());
        let records = store.read("paper-1").await.unwrap();
        assert_eq!(records.len(), 2);
        assert_ne!(records[0].eq_uid, records[1].eq_uid);
    }

    #[test]
    fn crop_rect_is_clamped_to_image_bounds() {
        let renderer = FixedPageRenderer::new(1, PAGE_W, PAGE_H);
        let transform = PageTransform::for_page(&renderer, 0, 2.0).unwrap();
        let (img_w, img_h) = (transform.pixel_width(), transform.pixel_height());

        // Box flush with the page origin: padding cannot go negative
        let rect = padded_crop_rect(
            &transform,
            &BoundingBox::new(0.0, 0.0, 20.0, 10.0),
            5.0,
            img_w,
            img_h,
        )
        .unwrap();
        assert_eq!((rect.0, rect.1), (0, 0));

        // Box flush with the far corner: crop stays inside the image
        let rect = padded_crop_rect(
            &transform,
            &BoundingBox::new(PAGE_W - 20.0, PAGE_H - 10.0, PAGE_W, PAGE_H),
            5.0,
            img_w,
            img_h,
        )
        .unwrap();
        assert!(rect.0 + rect.2 <= img_w);
        assert!(rect.1 + rect.3 <= img_h);
    }

    #[test]
    fn degenerate_crop_is_rejected() {
        let renderer = FixedPageRenderer::new(1, PAGE_W, PAGE_H);
        let transform = PageTransform::for_page(&renderer, 0, 2.0).unwrap();

        // Entirely outside the page
        let rect = padded_crop_rect(
            &transform,
            &BoundingBox::new(PAGE_W + 10.0, PAGE_H + 10.0, PAGE_W + 20.0, PAGE_H + 20.0),
            0.0,
            transform.pixel_width(),
            transform.pixel_height(),
        );
        assert!(rect.is_none());
    }
}
