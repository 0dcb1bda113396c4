//! Layout-heuristic candidate source
//!
//! A displayed equation in a typeset paper tends to sit on its own line,
//! horizontally centered, narrower than the text column, and full of
//! operator glyphs. This source scores layout spans on those cues. It is
//! intentionally conservative; it exists as a fallback for pages where the
//! model detector finds nothing, not as a competitor to it.

use crate::document::LayoutSpan;

use super::Candidate;

/// Spans wider than this fraction of the page are treated as prose
const MAX_WIDTH_FRACTION: f64 = 0.7;

/// Allowed offset of the span center from the page center, as a fraction
const CENTER_TOLERANCE_FRACTION: f64 = 0.12;

/// Score assigned to a span matching the layout cues
const BASE_SCORE: f32 = 0.4;

/// Extra score when the span contains an equals sign
const EQUALS_BONUS: f32 = 0.2;

/// Characters that suggest mathematical content
const MATH_GLYPHS: &str = "=+−×·÷/^_∑∏∫√≤≥≠≈±∞∂∇αβγδελμσπθφψω";

fn looks_mathematical(text: &str) -> bool {
    if text.contains('=') || text.contains('\\') {
        return true;
    }
    text.chars().filter(|c| MATH_GLYPHS.contains(*c)).count() >= 2
}

fn score_span(span: &LayoutSpan) -> f32 {
    let mut score = BASE_SCORE;
    if span.text.contains('=') {
        score += EQUALS_BONUS;
    }
    score.min(1.0)
}

/// Derive document-space candidates from a page's layout spans
///
/// Emission order follows span order (reading order), which downstream
/// deduplication relies on for first-one-wins tie-breaking.
pub fn candidates_from_layout(spans: &[LayoutSpan], page_width: f64) -> Vec<Candidate> {
    if page_width <= 0.0 {
        return Vec::new();
    }

    spans
        .iter()
        .filter(|span| {
            let width = span.bbox.width();
            if width <= 0.0 || width > page_width * MAX_WIDTH_FRACTION {
                return false;
            }
            let center = (span.bbox.x0 + span.bbox.x1) / 2.0;
            let offset = (center - page_width / 2.0).abs();
            if offset > page_width * CENTER_TOLERANCE_FRACTION {
                return false;
            }
            looks_mathematical(&span.text)
        })
        .map(|span| Candidate {
            bbox: span.bbox,
            score: score_span(span),
        })
        .collect()
}
