use anyhow::Context;
use schema::LabelTable;
use std::fs;
use std::path::PathBuf;

/// Where class names come from. Loaded once at startup.
pub trait LabelSource {
    fn load(&self) -> anyhow::Result<LabelTable>;
}

/// Newline-separated names file, one class per line.
#[derive(Debug, Clone)]
pub struct FileLabelSource {
    path: PathBuf,
}

impl FileLabelSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl LabelSource for FileLabelSource {
    fn load(&self) -> anyhow::Result<LabelTable> {
        let text = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read labels from {}", self.path.display()))?;
        Ok(LabelTable::from_lines(&text))
    }
}

impl LabelSource for LabelTable {
    fn load(&self) -> anyhow::Result<LabelTable> {
        Ok(self.clone())
    }
}

/// Load labels and check them against the model's class count.
pub fn load_labels(source: &dyn LabelSource, num_classes: usize) -> anyhow::Result<LabelTable> {
    let labels = source.load()?;
    labels
        .ensure_class_count(num_classes)
        .context("Label table does not match model")?;

    tracing::info!(classes = labels.len(), "Labels loaded");
    Ok(labels)
}
