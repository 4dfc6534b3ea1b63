use crate::processing::decode::{
    BoxCoordinates, DecodeParams, HeadLayout, TensorOrientation, decode_candidates,
};
use crate::processing::nms::{NmsPolicy, non_max_suppression};
use common::span_debug;
use ndarray::{ArrayView3, Axis};
use schema::{
    ConfigError, Detection, FrameSize, ImageTransform, ModelTensorSpec, RawOutputTensor,
    ResizePolicy,
};
use std::sync::Arc;

/// Decoding and filtering policy for one model head.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PostprocessConfig {
    pub num_classes: usize,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub nms_policy: NmsPolicy,
    pub head: HeadLayout,
    pub orientation: TensorOrientation,
    pub coordinates: BoxCoordinates,
    /// Must match the policy the frames were preprocessed with.
    pub resize_policy: ResizePolicy,
}

impl Default for PostprocessConfig {
    fn default() -> Self {
        Self {
            num_classes: 80,
            confidence_threshold: 0.5,
            iou_threshold: 0.45,
            nms_policy: NmsPolicy::default(),
            head: HeadLayout::default(),
            orientation: TensorOrientation::default(),
            coordinates: BoxCoordinates::default(),
            resize_policy: ResizePolicy::default(),
        }
    }
}

impl PostprocessConfig {
    /// Attributes per candidate the output tensor must carry.
    pub fn attributes(&self) -> usize {
        self.head.box_attributes() + self.num_classes
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_classes == 0 {
            return Err(ConfigError::InvalidSetting {
                name: "num_classes",
                reason: "must be at least 1".to_string(),
            });
        }
        for (name, value) in [
            ("confidence_threshold", self.confidence_threshold),
            ("iou_threshold", self.iou_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidSetting {
                    name,
                    reason: format!("{value} is outside [0, 1]"),
                });
            }
        }
        Ok(())
    }
}

/// Turns raw detector output into detections in original frame pixels.
///
/// Holds only read-only configuration, so one instance can serve any number
/// of frames and threads.
#[derive(Debug, Clone)]
pub struct PostProcessor {
    spec: Arc<ModelTensorSpec>,
    config: PostprocessConfig,
}

impl PostProcessor {
    pub fn new(spec: Arc<ModelTensorSpec>, config: PostprocessConfig) -> Result<Self, ConfigError> {
        spec.validate()?;
        config.validate()?;
        Ok(Self { spec, config })
    }

    pub fn config(&self) -> &PostprocessConfig {
        &self.config
    }

    /// Detections for a single frame, taken from batch item 0.
    pub fn postprocess(
        &self,
        frame_size: FrameSize,
        outputs: &[RawOutputTensor],
    ) -> Result<Vec<Detection>, ConfigError> {
        let mut batch = self.postprocess_batch(&[frame_size], outputs)?;
        Ok(batch.pop().unwrap_or_default())
    }

    /// Detections for every frame of a batched call, in frame order. The
    /// geometry of each frame is rebuilt from its size and the configured
    /// resize policy.
    pub fn postprocess_batch(
        &self,
        frame_sizes: &[FrameSize],
        outputs: &[RawOutputTensor],
    ) -> Result<Vec<Vec<Detection>>, ConfigError> {
        let transforms: Vec<ImageTransform> = frame_sizes
            .iter()
            .map(|&size| {
                ImageTransform::new(self.config.resize_policy, size, self.spec.input_size())
            })
            .collect();
        self.postprocess_transformed(&transforms, outputs)
    }

    /// Like [`Self::postprocess_batch`], but maps boxes back through the
    /// exact transforms preprocessing used for each frame.
    #[tracing::instrument(skip(self, transforms, outputs), fields(frames = transforms.len()))]
    pub fn postprocess_transformed(
        &self,
        transforms: &[ImageTransform],
        outputs: &[RawOutputTensor],
    ) -> Result<Vec<Vec<Detection>>, ConfigError> {
        let input_size = self.spec.input_size();
        if let Some(t) = transforms
            .iter()
            .find(|t| (t.input_width, t.input_height) != input_size)
        {
            return Err(ConfigError::InvalidSetting {
                name: "transform",
                reason: format!(
                    "targets {}x{} but the model input is {}x{}",
                    t.input_width, t.input_height, input_size.0, input_size.1
                ),
            });
        }

        let output = self.primary_output(outputs)?;
        let candidates = self.candidate_view(output)?;

        let available = candidates.len_of(Axis(0));
        if available < transforms.len() {
            return Err(ConfigError::ShapeMismatch {
                name: output.name().to_string(),
                reason: format!(
                    "batch dimension {available} is smaller than {} frame(s)",
                    transforms.len()
                ),
            });
        }

        let params = DecodeParams {
            head: self.config.head,
            coordinates: self.config.coordinates,
            input_size,
            confidence_threshold: self.config.confidence_threshold,
        };

        let results = transforms
            .iter()
            .enumerate()
            .map(|(item, transform)| {
                let rows = candidates.index_axis(Axis(0), item);
                self.finish_frame(decode_candidates(rows, &params), transform)
            })
            .collect();

        Ok(results)
    }

    fn primary_output<'a>(
        &self,
        outputs: &'a [RawOutputTensor],
    ) -> Result<&'a RawOutputTensor, ConfigError> {
        let name = self
            .spec
            .primary_output()
            .ok_or_else(|| ConfigError::InvalidModelSpec("no output names".to_string()))?;

        outputs
            .iter()
            .find(|t| t.name() == name)
            .ok_or_else(|| ConfigError::MissingOutput(name.to_string()))
    }

    /// View the output as `(batch, candidates, attributes)` whatever its
    /// stored orientation.
    fn candidate_view<'a>(
        &self,
        output: &'a RawOutputTensor,
    ) -> Result<ArrayView3<'a, f32>, ConfigError> {
        let mismatch = |reason: String| ConfigError::ShapeMismatch {
            name: output.name().to_string(),
            reason,
        };

        let dims = match *output.shape() {
            [d1, d2] => (1, d1, d2),
            [b, d1, d2] => (b, d1, d2),
            ref other => {
                return Err(mismatch(format!(
                    "expected rank 2 or 3, got shape {other:?}"
                )));
            }
        };

        let view = ArrayView3::from_shape(dims, output.data())
            .map_err(|e| mismatch(e.to_string()))?;
        let view = match self.config.orientation {
            TensorOrientation::CandidatesMajor => view,
            TensorOrientation::AttributesMajor => view.permuted_axes([0, 2, 1]),
        };

        let attributes = view.len_of(Axis(2));
        if attributes != self.config.attributes() {
            return Err(mismatch(format!(
                "expected {} attributes per candidate, got {attributes}",
                self.config.attributes()
            )));
        }

        Ok(view)
    }

    fn finish_frame(&self, decoded: Vec<Detection>, transform: &ImageTransform) -> Vec<Detection> {
        let _s = span_debug!("finish_frame");

        let rescaled = decoded
            .into_iter()
            .map(|d| Detection {
                bbox: transform.box_to_original(&d.bbox),
                ..d
            })
            .collect();

        non_max_suppression(rescaled, self.config.iou_threshold, self.config.nms_policy)
            .into_iter()
            .map(|d| Detection {
                bbox: d.bbox.clamp_to(transform.original),
                ..d
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schema::BoundingBox;

    fn spec(width: u32, height: u32) -> Arc<ModelTensorSpec> {
        let mut spec = ModelTensorSpec::yolov7(1);
        spec.input_width = width;
        spec.input_height = height;
        Arc::new(spec)
    }

    fn config(num_classes: usize) -> PostprocessConfig {
        PostprocessConfig {
            num_classes,
            ..PostprocessConfig::default()
        }
    }

    /// Build one objectness-head row: box, objectness, one-hot class score.
    fn row(bbox: [f32; 4], objectness: f32, class_id: usize, num_classes: usize) -> Vec<f32> {
        let mut row = bbox.to_vec();
        row.push(objectness);
        let mut scores = vec![0.0; num_classes];
        scores[class_id] = 1.0;
        row.extend(scores);
        row
    }

    fn output(rows: Vec<Vec<f32>>, attributes: usize) -> RawOutputTensor {
        let n = rows.len();
        RawOutputTensor::new("output", vec![1, n, attributes], rows.concat()).unwrap()
    }

    fn assert_close(actual: f32, expected: f32) {
        assert!(
            (actual - expected).abs() < 1e-3,
            "expected {expected}, got {actual}"
        );
    }

    /// Test 640x480 frame through a 416 model with normalized box output
    #[test]
    fn test_stretch_scenario_maps_back_to_frame() {
        let post = PostProcessor::new(
            spec(416, 416),
            PostprocessConfig {
                coordinates: BoxCoordinates::Normalized,
                ..config(80)
            },
        )
        .unwrap();
        let out = output(vec![row([0.5, 0.5, 0.2, 0.3], 0.9, 0, 80)], 85);

        let detections = post.postprocess(FrameSize::new(640, 480), &[out]).unwrap();

        assert_eq!(detections.len(), 1);
        let d = detections[0];
        assert_eq!(d.class_id, 0);
        assert_close(d.confidence, 0.9);
        assert_close(d.bbox.width, 128.0);
        assert_close(d.bbox.height, 144.0);
        assert_close(d.bbox.x + d.bbox.width / 2.0, 320.0);
        assert_close(d.bbox.y + d.bbox.height / 2.0, 240.0);
    }

    /// Test letterbox padding is removed before rescaling
    #[test]
    fn test_letterbox_inverse() {
        let post = PostProcessor::new(
            spec(512, 512),
            PostprocessConfig {
                resize_policy: ResizePolicy::Letterbox,
                ..config(2)
            },
        )
        .unwrap();
        // 800x600 -> scale 0.64, offset_y 64
        let out = output(vec![row([256.0, 256.0, 102.4, 102.4], 1.0, 1, 2)], 7);

        let detections = post.postprocess(FrameSize::new(800, 600), &[out]).unwrap();

        assert_eq!(detections.len(), 1);
        let b = detections[0].bbox;
        assert_close(b.x, 320.0);
        assert_close(b.y, 220.0);
        assert_close(b.right(), 480.0);
        assert_close(b.bottom(), 380.0);
    }

    /// Test a box placed with the preprocessing geometry comes back unchanged
    #[test]
    fn test_round_trip_with_preprocessor_geometry() {
        use preprocess::CpuPreProcessor;
        use schema::{PixelFormat, RawFrame};

        for policy in [ResizePolicy::Stretch, ResizePolicy::Letterbox] {
            let spec = spec(416, 416);
            let pre = CpuPreProcessor::new(spec.clone(), policy).unwrap();
            let frame = RawFrame::filled(640, 480, PixelFormat::Rgb, &[0, 0, 0]);
            let forward = pre.preprocess_frame(&frame).unwrap().transform;

            let original = BoundingBox::new(100.0, 50.0, 200.0, 120.0);
            let input = forward.box_to_input(&original);

            let post = PostProcessor::new(
                spec,
                PostprocessConfig {
                    resize_policy: policy,
                    ..config(1)
                },
            )
            .unwrap();
            let out = output(
                vec![row(
                    [
                        input.x + input.width / 2.0,
                        input.y + input.height / 2.0,
                        input.width,
                        input.height,
                    ],
                    1.0,
                    0,
                    1,
                )],
                6,
            );

            let detections = post.postprocess(frame.size(), &[out]).unwrap();
            let b = detections[0].bbox;
            assert_close(b.x, original.x);
            assert_close(b.y, original.y);
            assert_close(b.width, original.width);
            assert_close(b.height, original.height);
        }
    }

    /// Test supplied transforms take precedence over the configured policy
    #[test]
    fn test_supplied_transforms_drive_inverse_mapping() {
        // Configured for stretch, but the frame was letterboxed
        let post = PostProcessor::new(spec(512, 512), config(2)).unwrap();
        let letterbox =
            ImageTransform::new(ResizePolicy::Letterbox, FrameSize::new(800, 600), (512, 512));
        let out = output(vec![row([256.0, 256.0, 102.4, 102.4], 1.0, 1, 2)], 7);

        let results = post
            .postprocess_transformed(&[letterbox], std::slice::from_ref(&out))
            .unwrap();
        let b = results[0][0].bbox;
        assert_close(b.x, 320.0);
        assert_close(b.y, 220.0);
        assert_close(b.right(), 480.0);
        assert_close(b.bottom(), 380.0);

        let rebuilt = post
            .postprocess_batch(&[FrameSize::new(800, 600)], &[out])
            .unwrap();
        assert!((rebuilt[0][0].bbox.y - 220.0).abs() > 1.0);
    }

    #[test]
    fn test_transform_for_other_input_size_rejected() {
        let post = PostProcessor::new(spec(512, 512), config(2)).unwrap();
        let foreign =
            ImageTransform::new(ResizePolicy::Stretch, FrameSize::new(800, 600), (640, 640));
        let out = output(vec![row([256.0, 256.0, 10.0, 10.0], 1.0, 1, 2)], 7);

        assert!(matches!(
            post.postprocess_transformed(&[foreign], &[out]),
            Err(ConfigError::InvalidSetting {
                name: "transform",
                ..
            })
        ));
    }

    /// Test boxes crossing or outside the frame are clamped, not dropped
    #[test]
    fn test_boxes_clamped_to_frame() {
        let post = PostProcessor::new(spec(100, 100), config(1)).unwrap();
        let out = output(
            vec![
                row([0.0, 0.0, 40.0, 40.0], 0.9, 0, 1),
                row([500.0, 500.0, 10.0, 10.0], 0.8, 0, 1),
            ],
            6,
        );

        let detections = post.postprocess(FrameSize::new(100, 100), &[out]).unwrap();

        assert_eq!(detections.len(), 2);
        assert_eq!(detections[0].bbox, BoundingBox::new(0.0, 0.0, 20.0, 20.0));
        assert_eq!(detections[1].bbox, BoundingBox::new(100.0, 100.0, 0.0, 0.0));
    }

    /// Test duplicate candidates collapse to the best one
    #[test]
    fn test_overlapping_candidates_suppressed() {
        let post = PostProcessor::new(spec(640, 640), config(3)).unwrap();
        let out = output(
            vec![
                row([100.0, 100.0, 50.0, 50.0], 0.7, 2, 3),
                row([102.0, 101.0, 50.0, 50.0], 0.95, 2, 3),
                row([400.0, 400.0, 50.0, 50.0], 0.6, 1, 3),
            ],
            8,
        );

        let detections = post.postprocess(FrameSize::new(640, 640), &[out]).unwrap();

        assert_eq!(detections.len(), 2);
        assert_close(detections[0].confidence, 0.95);
        assert_eq!(detections[1].class_id, 1);
    }

    /// Test raising the threshold never adds detections
    #[test]
    fn test_confidence_filter_monotonic() {
        let rows: Vec<Vec<f32>> = (0..10)
            .map(|i| row([30.0 + 60.0 * i as f32, 50.0, 20.0, 20.0], i as f32 / 10.0, 0, 1))
            .collect();
        let out = output(rows, 6);

        let mut previous = usize::MAX;
        for step in 0..=10 {
            let post = PostProcessor::new(
                spec(640, 640),
                PostprocessConfig {
                    confidence_threshold: step as f32 / 10.0,
                    ..config(1)
                },
            )
            .unwrap();
            let count = post
                .postprocess(FrameSize::new(640, 640), std::slice::from_ref(&out))
                .unwrap()
                .len();
            assert!(count <= previous);
            previous = count;
        }
    }

    /// Test anchor-free heads stored attributes-first
    #[test]
    fn test_attributes_major_class_scores_head() {
        let post = PostProcessor::new(
            spec(640, 640),
            PostprocessConfig {
                head: HeadLayout::ClassScores,
                orientation: TensorOrientation::AttributesMajor,
                ..config(2)
            },
        )
        .unwrap();
        // (1, 6 attributes, 2 candidates)
        let data = vec![
            100.0, 300.0, // cx
            100.0, 300.0, // cy
            20.0, 40.0, // w
            20.0, 40.0, // h
            0.9, 0.1, // class 0
            0.2, 0.8, // class 1
        ];
        let out = RawOutputTensor::new("output", vec![1, 6, 2], data).unwrap();

        let detections = post.postprocess(FrameSize::new(640, 640), &[out]).unwrap();

        assert_eq!(detections.len(), 2);
        assert_eq!(detections[0].class_id, 0);
        assert_eq!(detections[0].bbox, BoundingBox::new(90.0, 90.0, 20.0, 20.0));
        assert_eq!(detections[1].class_id, 1);
        assert_eq!(detections[1].bbox, BoundingBox::new(280.0, 280.0, 40.0, 40.0));
    }

    /// Test each batch item is mapped with its own frame size
    #[test]
    fn test_batch_items_use_own_frame_size() {
        let post = PostProcessor::new(spec(100, 100), config(1)).unwrap();
        let data = [
            row([50.0, 50.0, 10.0, 10.0], 0.9, 0, 1),
            row([50.0, 50.0, 10.0, 10.0], 0.9, 0, 1),
        ]
        .concat();
        let out = RawOutputTensor::new("output", vec![2, 1, 6], data).unwrap();

        let results = post
            .postprocess_batch(&[FrameSize::new(100, 100), FrameSize::new(200, 400)], &[out])
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0][0].bbox, BoundingBox::new(45.0, 45.0, 10.0, 10.0));
        assert_eq!(results[1][0].bbox, BoundingBox::new(90.0, 180.0, 20.0, 40.0));
    }

    #[test]
    fn test_rank_two_output_is_single_item() {
        let post = PostProcessor::new(spec(100, 100), config(1)).unwrap();
        let out = RawOutputTensor::new(
            "output",
            vec![1, 6],
            row([50.0, 50.0, 10.0, 10.0], 0.9, 0, 1),
        )
        .unwrap();

        let detections = post.postprocess(FrameSize::new(100, 100), &[out]).unwrap();
        assert_eq!(detections.len(), 1);
    }

    #[test]
    fn test_no_candidates_is_empty_not_error() {
        let post = PostProcessor::new(spec(640, 640), config(80)).unwrap();
        let out = RawOutputTensor::new("output", vec![1, 0, 85], Vec::new()).unwrap();

        let detections = post.postprocess(FrameSize::new(640, 480), &[out]).unwrap();
        assert!(detections.is_empty());
    }

    /// Test structural problems are configuration errors
    #[test]
    fn test_structural_errors() {
        let post = PostProcessor::new(spec(640, 640), config(80)).unwrap();
        let size = FrameSize::new(640, 480);

        let wrong_attrs = RawOutputTensor::new("output", vec![1, 2, 84], vec![0.0; 168]).unwrap();
        assert!(matches!(
            post.postprocess(size, &[wrong_attrs]),
            Err(ConfigError::ShapeMismatch { .. })
        ));

        let wrong_name = RawOutputTensor::new("boxes", vec![1, 1, 85], vec![0.0; 85]).unwrap();
        assert_eq!(
            post.postprocess(size, &[wrong_name]),
            Err(ConfigError::MissingOutput("output".to_string()))
        );

        let rank_four = RawOutputTensor::new("output", vec![1, 1, 1, 85], vec![0.0; 85]).unwrap();
        assert!(matches!(
            post.postprocess(size, &[rank_four]),
            Err(ConfigError::ShapeMismatch { .. })
        ));

        let short_batch = RawOutputTensor::new("output", vec![1, 1, 85], vec![0.0; 85]).unwrap();
        assert!(matches!(
            post.postprocess_batch(&[size, size], &[short_batch]),
            Err(ConfigError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_config_validation() {
        assert!(PostprocessConfig::default().validate().is_ok());

        let bad = PostprocessConfig {
            iou_threshold: 1.5,
            ..PostprocessConfig::default()
        };
        assert!(matches!(
            bad.validate(),
            Err(ConfigError::InvalidSetting {
                name: "iou_threshold",
                ..
            })
        ));

        assert!(config(0).validate().is_err());
    }
}
