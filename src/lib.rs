//! Equation Scribe
//!
//! Annotation pipeline for equations in scientific papers. An opened paper is
//! scanned page by page: candidate equation regions are proposed by a
//! model-based detector (with a layout-heuristic fallback), cropped out of a
//! rendered page image, sent to an external LaTeX recognition service, and
//! persisted to an append-friendly per-paper annotation log with timestamped
//! backups before every destructive rewrite.
//!
//! # Modules
//!
//! - `document`: collaborator contracts for page rendering and layout
//! - `geometry`: bounding boxes, IoU, and the document ↔ raster transform
//! - `candidates`: candidate sources and the fallback selection strategy
//! - `dedup`: IoU-based duplicate suppression during a scan
//! - `store`: the persistent annotation log (append / upsert / delete)
//! - `recognize`: the LaTeX recognition contract and HTTP client
//! - `pipeline`: orchestration of a whole-document or single-region scan
//!
//! Rendering, detection inference, and recognition are external collaborators
//! behind narrow async traits; the core never owns a PDF engine or a model.

pub mod candidates;
pub mod config;
pub mod dedup;
pub mod document;
pub mod geometry;
pub mod pipeline;
pub mod recognize;
pub mod store;

pub use config::{PipelineConfig, ScribeConfig};
pub use geometry::{BoundingBox, PageTransform};
pub use pipeline::{Pipeline, ScanSummary};
pub use store::{AnnotationStore, EquationBox, EquationRecord};
