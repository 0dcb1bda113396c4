//! Document collaborator contracts
//!
//! The pipeline never opens a PDF itself. An already-opened paper is handed
//! in behind two narrow traits: [`PageRenderer`] for page metadata and
//! rasterization, [`LayoutProvider`] for the positioned text spans the
//! heuristic candidate source consumes. Implementations typically wrap a
//! rendering service or a PDF engine; tests use in-memory fakes.

use async_trait::async_trait;
use thiserror::Error;

use crate::geometry::BoundingBox;

/// Errors from the rendering and layout collaborators
#[derive(Debug, Error)]
pub enum DocumentError {
    /// Page index outside `[0, page_count)`
    #[error("page {page} out of range (document has {page_count} pages)")]
    PageOutOfRange { page: usize, page_count: usize },

    /// Document could not be opened at all; fatal to a whole scan
    #[error("document not found: {0}")]
    NotFound(String),

    /// Failed to rasterize a page
    #[error("render error: {0}")]
    RenderError(String),

    /// Failed to extract page layout
    #[error("layout error: {0}")]
    LayoutError(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Rendering collaborator for one opened paper
///
/// Page metadata is cheap and synchronous; rasterization may hit an external
/// service and is async. `render_page` returns encoded PNG bytes at
/// `scale` pixels per document point.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    /// Number of pages in the document
    fn page_count(&self) -> usize;

    /// Page size in document-space points
    fn page_size_points(&self, page: usize) -> Result<(f64, f64), DocumentError>;

    /// Render a page to PNG at the given scale
    async fn render_page(&self, page: usize, scale: f64) -> Result<Vec<u8>, DocumentError>;
}

/// One positioned text span on a page, in document space
#[derive(Debug, Clone)]
pub struct LayoutSpan {
    pub bbox: BoundingBox,
    pub text: String,
}

/// Layout collaborator, consumed only by the heuristic candidate source
#[async_trait]
pub trait LayoutProvider: Send + Sync {
    /// Ordered text/line spans for a page, in reading order
    async fn page_layout(&self, page: usize) -> Result<Vec<LayoutSpan>, DocumentError>;
}
