use common::span_debug;
use schema::Detection;
use std::str::FromStr;

/// Which detections compete with each other during suppression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NmsPolicy {
    /// Only boxes of the same class suppress each other
    #[default]
    PerClass,
    /// Any overlapping box suppresses regardless of class
    Global,
}

impl FromStr for NmsPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "per-class" | "per_class" | "class" => Ok(NmsPolicy::PerClass),
            "global" => Ok(NmsPolicy::Global),
            other => Err(format!("unknown nms policy `{other}`")),
        }
    }
}

/// Greedy non-maximum suppression.
///
/// Detections are ordered by confidence, highest first; equal scores keep
/// their incoming order. Each kept box removes every later competitor whose
/// IoU with it is strictly above `iou_threshold`. The result is in selection
/// order.
pub fn non_max_suppression(
    mut detections: Vec<Detection>,
    iou_threshold: f32,
    policy: NmsPolicy,
) -> Vec<Detection> {
    let _s = span_debug!("non_max_suppression");

    // sort_by is stable
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept = Vec::new();
    let mut suppressed = vec![false; detections.len()];

    for i in 0..detections.len() {
        if suppressed[i] {
            continue;
        }
        let best = detections[i];
        kept.push(best);

        for j in (i + 1)..detections.len() {
            if suppressed[j] {
                continue;
            }
            let other = &detections[j];
            if policy == NmsPolicy::PerClass && other.class_id != best.class_id {
                continue;
            }
            if best.bbox.iou(&other.bbox) > iou_threshold {
                suppressed[j] = true;
            }
        }
    }

    tracing::trace!(
        candidates = detections.len(),
        kept = kept.len(),
        "Suppression finished"
    );

    kept
}
