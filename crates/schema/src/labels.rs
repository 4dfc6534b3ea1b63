use crate::errors::ConfigError;

/// Class names indexed by class id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelTable {
    names: Vec<String>,
}

impl LabelTable {
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    /// One name per line. Surrounding whitespace is trimmed and trailing
    /// blank lines are dropped.
    pub fn from_lines(text: &str) -> Self {
        let mut names: Vec<String> = text.lines().map(|l| l.trim().to_string()).collect();
        while names.last().is_some_and(|n| n.is_empty()) {
            names.pop();
        }
        Self { names }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn get(&self, class_id: usize) -> Option<&str> {
        self.names.get(class_id).map(String::as_str)
    }

    /// Name for display, falling back to the numeric id.
    pub fn name_or_id(&self, class_id: usize) -> String {
        self.get(class_id)
            .map(str::to_string)
            .unwrap_or_else(|| class_id.to_string())
    }

    pub fn ensure_class_count(&self, expected: usize) -> Result<(), ConfigError> {
        if self.names.len() != expected {
            return Err(ConfigError::LabelCountMismatch {
                expected,
                actual: self.names.len(),
            });
        }
        Ok(())
    }
}
