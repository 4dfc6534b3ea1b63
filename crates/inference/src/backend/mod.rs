use crate::errors::TransportError;
use schema::{InputBlob, ModelTensorSpec, RawOutputTensor};

/// Everything a transport needs to issue one inference call.
#[derive(Debug, Clone, Copy)]
pub struct InferRequest<'a> {
    pub model: &'a ModelTensorSpec,
    /// Number of frames packed into `input`
    pub batch_size: usize,
    pub input: &'a InputBlob,
}

impl InferRequest<'_> {
    pub fn input_shape(&self) -> Vec<i64> {
        self.model.input_shape(self.batch_size)
    }
}

/// Output tensors of one inference call, owned by the caller for the
/// duration of a single frame iteration.
#[derive(Debug, Clone, Default)]
pub struct InferenceOutput {
    tensors: Vec<RawOutputTensor>,
}

impl InferenceOutput {
    pub fn new(tensors: Vec<RawOutputTensor>) -> Self {
        Self { tensors }
    }

    pub fn tensors(&self) -> &[RawOutputTensor] {
        &self.tensors
    }

    pub fn get(&self, name: &str) -> Option<&RawOutputTensor> {
        self.tensors.iter().find(|t| t.name() == name)
    }
}

/// Sends a packed input to an inference server and returns its raw outputs.
///
/// Implementations own their connection; errors are returned as-is and the
/// caller decides whether the loop continues.
pub trait InferenceTransport {
    fn infer(&mut self, request: InferRequest<'_>) -> Result<InferenceOutput, TransportError>;
}

impl<T: InferenceTransport + ?Sized> InferenceTransport for Box<T> {
    fn infer(&mut self, request: InferRequest<'_>) -> Result<InferenceOutput, TransportError> {
        (**self).infer(request)
    }
}

impl<T: InferenceTransport + ?Sized> InferenceTransport for &mut T {
    fn infer(&mut self, request: InferRequest<'_>) -> Result<InferenceOutput, TransportError> {
        (**self).infer(request)
    }
}
