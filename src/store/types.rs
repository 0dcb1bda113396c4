//! Annotation record types
//!
//! The on-disk unit is one [`EquationRecord`] per JSON line, keyed by
//! `eq_uid`. An equation may span several boxes (multi-line expressions), but
//! crop and adjudication logic only ever looks at `boxes[0]`.

use serde::{Deserialize, Serialize};

use crate::geometry::BoundingBox;

use super::StoreError;

/// One region of an equation's physical extent on a single page
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquationBox {
    /// Zero-based page index
    pub page: u32,
    /// Region in document-space points
    pub bbox: BoundingBox,
}

/// A persisted equation annotation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquationRecord {
    /// Primary key within one paper's log
    pub eq_uid: String,
    pub paper_id: String,
    #[serde(default)]
    pub latex: String,
    #[serde(default)]
    pub notes: String,
    /// Never empty past validation
    pub boxes: Vec<EquationBox>,
}

impl EquationRecord {
    /// Reject records with no boxes
    ///
    /// Callers run this before handing a record to the store; the store
    /// itself does not re-validate.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.boxes.is_empty() {
            return Err(StoreError::EmptyBoxes {
                eq_uid: self.eq_uid.clone(),
            });
        }
        Ok(())
    }

    /// The box used for cropping and adjudication
    pub fn primary_box(&self) -> Option<&EquationBox> {
        self.boxes.first()
    }
}

/// One decoded line of an annotation log
///
/// Reads tolerate unreadable lines by tagging them instead of failing;
/// rewrites carry unreadable lines through verbatim so an update never
/// destroys data it cannot parse.
#[derive(Debug, Clone)]
pub enum LogLine {
    Record(EquationRecord),
    Unreadable(String),
}

impl LogLine {
    pub fn decode(line: &str) -> Self {
        match serde_json::from_str::<EquationRecord>(line) {
            Ok(record) => LogLine::Record(record),
            Err(_) => LogLine::Unreadable(line.to_string()),
        }
    }

    /// Key of the record, if the line parsed
    pub fn eq_uid(&self) -> Option<&str> {
        match self {
            LogLine::Record(r) => Some(&r.eq_uid),
            LogLine::Unreadable(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(eq_uid: &str, boxes: Vec<EquationBox>) -> EquationRecord {
        EquationRecord {
            eq_uid: eq_uid.to_string(),
            paper_id: "paper-1".to_string(),
            latex: "E = mc^2".to_string(),
            notes: String::new(),
            boxes,
        }
    }

    #[test]
    fn empty_boxes_rejected() {
        let rec = record("eq-1", vec![]);
        assert!(matches!(
            rec.validate(),
            Err(StoreError::EmptyBoxes { .. })
        ));
    }

    #[test]
    fn non_empty_boxes_accepted() {
        let rec = record(
            "eq-1",
            vec![EquationBox {
                page: 0,
                bbox: BoundingBox::new(0.0, 0.0, 10.0, 10.0),
            }],
        );
        assert!(rec.validate().is_ok());
        assert_eq!(rec.primary_box().unwrap().page, 0);
    }

    #[test]
    fn record_round_trips_through_json() {
        let rec = record(
            "eq-7",
            vec![EquationBox {
                page: 2,
                bbox: BoundingBox::new(10.0, 20.0, 110.0, 50.0),
            }],
        );
        let line = serde_json::to_string(&rec).unwrap();
        let parsed: EquationRecord = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed, rec);
    }

    #[test]
    fn log_line_tags_garbage() {
        let line = LogLine::decode("{not json");
        assert!(matches!(line, LogLine::Unreadable(_)));
        assert!(line.eq_uid().is_none());
    }
}
