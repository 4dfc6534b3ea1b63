use ndarray::{ArrayView1, ArrayView2, s};
use schema::{BoundingBox, Detection};
use std::str::FromStr;

/// Per-candidate attribute layout of the detector head.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HeadLayout {
    /// `[cx, cy, w, h, objectness, class scores...]` (YOLOv5/v7)
    #[default]
    Objectness,
    /// `[cx, cy, w, h, class scores...]` (anchor-free heads)
    ClassScores,
}

impl HeadLayout {
    /// Attributes that precede the class scores.
    pub fn box_attributes(self) -> usize {
        match self {
            HeadLayout::Objectness => 5,
            HeadLayout::ClassScores => 4,
        }
    }
}

impl FromStr for HeadLayout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "objectness" => Ok(HeadLayout::Objectness),
            "class-scores" | "class_scores" => Ok(HeadLayout::ClassScores),
            other => Err(format!("unknown head layout `{other}`")),
        }
    }
}

/// Which of the two trailing output dimensions indexes candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TensorOrientation {
    /// `(batch, candidates, attributes)`
    #[default]
    CandidatesMajor,
    /// `(batch, attributes, candidates)`
    AttributesMajor,
}

impl FromStr for TensorOrientation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "candidates-major" | "candidates_major" => Ok(TensorOrientation::CandidatesMajor),
            "attributes-major" | "attributes_major" => Ok(TensorOrientation::AttributesMajor),
            other => Err(format!("unknown tensor orientation `{other}`")),
        }
    }
}

/// Unit of the raw box values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BoxCoordinates {
    /// Pixels of the model input
    #[default]
    InputPixels,
    /// Fractions of the model input, 0 to 1
    Normalized,
}

impl FromStr for BoxCoordinates {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pixels" | "input-pixels" | "input_pixels" => Ok(BoxCoordinates::InputPixels),
            "normalized" => Ok(BoxCoordinates::Normalized),
            other => Err(format!("unknown box coordinates `{other}`")),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DecodeParams {
    pub head: HeadLayout,
    pub coordinates: BoxCoordinates,
    pub input_size: (u32, u32),
    pub confidence_threshold: f32,
}

/// Filter and decode candidate rows (`[candidates, attributes]`) into
/// corner-form boxes in model input pixels, preserving candidate order.
pub fn decode_candidates(rows: ArrayView2<f32>, params: &DecodeParams) -> Vec<Detection> {
    let (sx, sy) = match params.coordinates {
        BoxCoordinates::InputPixels => (1.0, 1.0),
        BoxCoordinates::Normalized => (params.input_size.0 as f32, params.input_size.1 as f32),
    };
    let first_class = params.head.box_attributes();

    let mut candidates = Vec::new();

    for row in rows.outer_iter() {
        let objectness = match params.head {
            HeadLayout::Objectness => row[4],
            HeadLayout::ClassScores => 1.0,
        };

        let (class_id, class_score) = best_class(row.slice(s![first_class..]));
        let confidence = objectness * class_score;

        if confidence.is_nan() || confidence < params.confidence_threshold {
            continue;
        }

        candidates.push(Detection {
            bbox: BoundingBox::from_center(row[0] * sx, row[1] * sy, row[2] * sx, row[3] * sy),
            confidence,
            class_id,
        });
    }

    candidates
}

/// Argmax over class scores; ties go to the lowest class index.
#[inline]
fn best_class(scores: ArrayView1<f32>) -> (usize, f32) {
    let mut best = (0, f32::NEG_INFINITY);
    for (class_id, &score) in scores.iter().enumerate() {
        if score > best.1 {
            best = (class_id, score);
        }
    }
    best
}
