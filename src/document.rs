//! Requirement document input.
use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Immutable solicitation text plus where it came from.
#[derive(Debug, Clone)]
pub struct RequirementDocument {
    text: String,
    source: Option<PathBuf>,
}

impl RequirementDocument {
    pub fn new(text: impl Into<String>, source: Option<PathBuf>) -> Self {
        Self {
            text: text.into(),
            source,
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(anyhow!("rfp file not found: {}", path.display()));
        }
        let text =
            fs::read_to_string(path).with_context(|| format!("read rfp file {}", path.display()))?;
        if text.trim().is_empty() {
            return Err(anyhow!("rfp file is empty: {}", path.display()));
        }
        Ok(Self::new(text, Some(path.to_path_buf())))
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// File name for display, or `inline` for in-memory documents.
    pub fn label(&self) -> String {
        self.source
            .as_deref()
            .and_then(Path::file_name)
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "inline".to_string())
    }

    /// File stem used to name output files.
    pub fn stem(&self) -> String {
        self.source
            .as_deref()
            .and_then(Path::file_stem)
            .map(|stem| stem.to_string_lossy().into_owned())
            .filter(|stem| !stem.is_empty())
            .unwrap_or_else(|| "rfp".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_has_clear_message() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("absent.txt");
        let err = RequirementDocument::load(&path).unwrap_err();
        assert_eq!(err.to_string(), format!("rfp file not found: {}", path.display()));
    }

    #[test]
    fn loads_text_and_names() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("agency_rfp.txt");
        fs::write(&path, "Statement of work").expect("write rfp");
        let doc = RequirementDocument::load(&path).expect("load");
        assert_eq!(doc.text(), "Statement of work");
        assert_eq!(doc.label(), "agency_rfp.txt");
        assert_eq!(doc.stem(), "agency_rfp");
        assert_eq!(RequirementDocument::new("x", None).stem(), "rfp");
    }
}
