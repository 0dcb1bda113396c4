//! Duplicate suppression
//!
//! Candidates that overlap an already-stored annotation, or an earlier
//! candidate accepted in the same run, are dropped when their IoU exceeds the
//! threshold. The exclusion set is an explicit per-page collection: created
//! when a page's processing starts, seeded from stored records, grown as
//! candidates are accepted, and discarded when the page is done. Candidate
//! order is preserved, so ties between overlapping same-run candidates go to
//! whichever came first.

use crate::geometry::BoundingBox;
use crate::store::EquationRecord;

/// Default IoU threshold above which a candidate counts as a duplicate
pub const DEFAULT_IOU_THRESHOLD: f64 = 0.5;

/// Whether `candidate` overlaps any of `existing` above `threshold`
pub fn is_duplicate(candidate: &BoundingBox, existing: &[BoundingBox], threshold: f64) -> bool {
    existing.iter().any(|b| candidate.iou(b) > threshold)
}

/// Per-page exclusion set for one scan
#[derive(Debug)]
pub struct ExclusionSet {
    boxes: Vec<BoundingBox>,
    threshold: f64,
}

impl ExclusionSet {
    pub fn new(threshold: f64) -> Self {
        Self {
            boxes: Vec::new(),
            threshold,
        }
    }

    /// Seed from stored records for one page
    ///
    /// Only a record's primary box is consulted, matching what the store
    /// engine uses for cropping and adjudication.
    pub fn for_page(page: u32, records: &[EquationRecord], threshold: f64) -> Self {
        let boxes = records
            .iter()
            .filter_map(|r| r.primary_box())
            .filter(|b| b.page == page)
            .map(|b| b.bbox)
            .collect();
        Self { boxes, threshold }
    }

    /// Accept a candidate unless it duplicates an existing box
    ///
    /// Accepted boxes immediately join the set, so later candidates on the
    /// same page are checked against them too.
    pub fn admit(&mut self, bbox: BoundingBox) -> bool {
        if is_duplicate(&bbox, &self.boxes, self.threshold) {
            return false;
        }
        self.boxes.push(bbox);
        true
    }

    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }
}
