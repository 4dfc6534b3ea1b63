use crate::errors::ConfigError;

/// A named output tensor as returned by the inference server, flattened in
/// row-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct RawOutputTensor {
    name: String,
    shape: Vec<usize>,
    data: Vec<f32>,
}

impl RawOutputTensor {
    pub fn new(
        name: impl Into<String>,
        shape: Vec<usize>,
        data: Vec<f32>,
    ) -> Result<Self, ConfigError> {
        let name = name.into();
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(ConfigError::ShapeMismatch {
                name,
                reason: format!(
                    "shape {:?} needs {} values, got {}",
                    shape,
                    expected,
                    data.len()
                ),
            });
        }

        Ok(Self { name, shape, data })
    }

    /// Accepts the signed shape reported by inference servers.
    pub fn from_server_shape(
        name: impl Into<String>,
        shape: &[i64],
        data: Vec<f32>,
    ) -> Result<Self, ConfigError> {
        let name = name.into();
        let dims = shape
            .iter()
            .map(|&d| usize::try_from(d))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| ConfigError::ShapeMismatch {
                name: name.clone(),
                reason: format!("negative dimension in {:?}", shape),
            })?;
        Self::new(name, dims, data)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_must_cover_data() {
        let err = RawOutputTensor::new("output", vec![1, 2, 85], vec![0.0; 85]).unwrap_err();
        assert!(matches!(err, ConfigError::ShapeMismatch { .. }));
        assert!(err.to_string().contains("170"));
    }

    #[test]
    fn test_negative_server_dimension_rejected() {
        let err = RawOutputTensor::from_server_shape("output", &[-1, 85], vec![]).unwrap_err();
        assert!(err.to_string().contains("negative"));
    }

    #[test]
    fn test_server_shape_accepted() {
        let tensor =
            RawOutputTensor::from_server_shape("output", &[1, 2, 3], vec![0.0; 6]).unwrap();
        assert_eq!(tensor.shape(), &[1, 2, 3]);
        assert_eq!(tensor.name(), "output");
    }
}
