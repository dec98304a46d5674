//! Ordered class-name table for the classifier's output units.

use crate::error::ModelLoadError;
use std::path::Path;

/// Index `i` names output unit `i` of the classifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelTable {
    names: Vec<String>,
}

impl LabelTable {
    /// Read a newline-delimited label file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ModelLoadError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let table = Self::parse(&text)?;
        tracing::info!(path = %path.display(), classes = table.len(), "loaded label table");
        Ok(table)
    }

    /// Parse label text, one label per line, trailing whitespace stripped.
    ///
    /// Blank lines inside the file are kept so indices stay aligned.
    pub fn parse(text: &str) -> Result<Self, ModelLoadError> {
        let names: Vec<String> = text.lines().map(|l| l.trim_end().to_string()).collect();
        if names.is_empty() {
            return Err(ModelLoadError::EmptyLabels);
        }
        Ok(Self { names })
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }
}
