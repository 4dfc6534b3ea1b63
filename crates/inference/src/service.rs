use crate::{
    backend::{InferRequest, InferenceTransport},
    config::{InferenceConfig, TransportFailurePolicy},
    errors::PipelineError,
    processing::post::PostProcessor,
};
use anyhow::Context;
use common::span;
use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, Histogram, Meter},
};
use preprocess::CpuPreProcessor;
use schema::{ConfigError, Detection, LabelTable, ModelTensorSpec, RawFrame};
use std::sync::Arc;
use std::time::Instant;

/// Supplies decoded frames; `None` ends the stream.
pub trait FrameSource {
    fn next_frame(&mut self) -> anyhow::Result<Option<RawFrame>>;
}

/// Receives each frame with its detections, e.g. for rendering.
pub trait DetectionSink {
    fn consume(
        &mut self,
        frame: &RawFrame,
        detections: &[Detection],
        labels: &LabelTable,
    ) -> anyhow::Result<()>;
}

/// Totals for one call to [`DetectionPipeline::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub frames_processed: u64,
    pub frames_failed: u64,
    pub total_detections: usize,
}

struct PipelineMetrics {
    duration: Histogram<f64>,
    frames: Counter<u64>,
    failures: Counter<u64>,
    detections: Counter<u64>,
}

fn init_metrics(meter: &Meter) -> PipelineMetrics {
    let latency_buckets = [
        0.001, 0.002, 0.005, 0.007, 0.01, 0.015, 0.02, 0.025, 0.03, 0.04, 0.05, 0.075, 0.1, 0.15,
        0.2, 0.5,
    ];
    let duration = meter
        .f64_histogram("detection_batch_duration_seconds")
        .with_description("Time to process one batch (preprocess + infer + postprocess)")
        .with_unit("s")
        .with_boundaries(latency_buckets.to_vec())
        .build();
    let frames = meter
        .u64_counter("detection_frames_total")
        .with_description("Total frames processed")
        .build();
    let failures = meter
        .u64_counter("detection_frames_failed_total")
        .with_description("Total frames dropped after a transport failure")
        .build();
    let detections = meter
        .u64_counter("detection_detections_total")
        .with_description("Total detections produced")
        .build();

    PipelineMetrics {
        duration,
        frames,
        failures,
        detections,
    }
}

/// Frame loop tying preprocessing, an inference transport and
/// postprocessing together.
pub struct DetectionPipeline<T: InferenceTransport> {
    transport: T,
    spec: Arc<ModelTensorSpec>,
    preprocessor: CpuPreProcessor,
    postprocessor: PostProcessor,
    labels: LabelTable,
    failure_policy: TransportFailurePolicy,
    metrics: PipelineMetrics,
}

impl<T: InferenceTransport> DetectionPipeline<T> {
    pub fn new(
        transport: T,
        config: &InferenceConfig,
        spec: Arc<ModelTensorSpec>,
        labels: LabelTable,
    ) -> Result<Self, ConfigError> {
        labels.ensure_class_count(config.postprocess.num_classes)?;

        let preprocessor = CpuPreProcessor::new(spec.clone(), config.postprocess.resize_policy)?;
        let postprocessor = PostProcessor::new(spec.clone(), config.postprocess)?;

        Ok(Self {
            transport,
            spec,
            preprocessor,
            postprocessor,
            labels,
            failure_policy: config.transport_failure_policy,
            metrics: init_metrics(&global::meter("detection")),
        })
    }

    /// Record metrics on `meter` instead of the global provider's.
    pub fn with_meter(mut self, meter: &Meter) -> Self {
        self.metrics = init_metrics(meter);
        self
    }

    pub fn labels(&self) -> &LabelTable {
        &self.labels
    }

    /// Run one inference call over `frames` and return detections per frame.
    ///
    /// The transport output lives only for the duration of this call.
    #[tracing::instrument(skip(self, frames), fields(frames = frames.len()))]
    pub fn process_batch(
        &mut self,
        frames: &[RawFrame],
    ) -> Result<Vec<Vec<Detection>>, PipelineError> {
        let batch = self.preprocessor.preprocess_frames(frames)?;

        let output = {
            let _s = span!("model_inference");
            let start = Instant::now();
            let output = self.transport.infer(InferRequest {
                model: &self.spec,
                batch_size: batch.batch_size(),
                input: &batch.blob,
            })?;
            tracing::debug!(
                batch = batch.batch_size(),
                elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
                "Infer time"
            );
            output
        };

        let detections = self
            .postprocessor
            .postprocess_transformed(&batch.transforms, output.tensors())?;

        Ok(detections)
    }

    pub fn process_frame(&mut self, frame: &RawFrame) -> Result<Vec<Detection>, PipelineError> {
        let mut results = self.process_batch(std::slice::from_ref(frame))?;
        Ok(results.pop().unwrap_or_default())
    }

    /// Drain `source`, batching up to the model's batch size, and hand every
    /// frame to `sink`. Configuration errors always stop the loop; transport
    /// errors follow the configured [`TransportFailurePolicy`].
    pub fn run<S, K>(&mut self, source: &mut S, sink: &mut K) -> anyhow::Result<RunStats>
    where
        S: FrameSource + ?Sized,
        K: DetectionSink + ?Sized,
    {
        tracing::info!(
            batch_size = self.spec.batch_size,
            policy = ?self.failure_policy,
            "Detection loop starting"
        );

        let mut stats = RunStats::default();
        let mut frames = Vec::with_capacity(self.spec.batch_size);

        loop {
            frames.clear();
            while frames.len() < self.spec.batch_size {
                match source.next_frame().context("Failed to read frame")? {
                    Some(frame) => frames.push(frame),
                    None => break,
                }
            }
            if frames.is_empty() {
                break;
            }

            let start = Instant::now();
            match self.process_batch(&frames) {
                Ok(results) => {
                    self.metrics
                        .duration
                        .record(start.elapsed().as_secs_f64(), &[]);

                    for (frame, detections) in frames.iter().zip(&results) {
                        sink.consume(frame, detections, &self.labels)
                            .context("Detection sink failed")?;

                        stats.frames_processed += 1;
                        stats.total_detections += detections.len();
                        self.metrics.detections.add(detections.len() as u64, &[]);
                    }
                    self.metrics.frames.add(frames.len() as u64, &[]);

                    if stats.frames_processed.is_multiple_of(100) {
                        tracing::debug!(
                            frames_processed = stats.frames_processed,
                            frames_failed = stats.frames_failed,
                            total_detections = stats.total_detections,
                            "Frames processed"
                        );
                    }
                }
                Err(e)
                    if e.is_transport()
                        && self.failure_policy == TransportFailurePolicy::SkipFrame =>
                {
                    tracing::warn!(error = %e, frames = frames.len(), "Skipping frames");
                    stats.frames_failed += frames.len() as u64;
                    self.metrics.failures.add(
                        frames.len() as u64,
                        &[KeyValue::new("reason", "transport")],
                    );
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to process frames");
                    return Err(e).context("Detection loop aborted");
                }
            }
        }

        tracing::info!(
            frames_processed = stats.frames_processed,
            frames_failed = stats.frames_failed,
            total_detections = stats.total_detections,
            "Detection loop finished"
        );

        Ok(stats)
    }
}
