//! The dataset context a session works against

use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{Error, Result};
use crate::frame::DataFrame;

/// Currently loaded dataset plus the columns the operator named for it.
///
/// Not persisted. The orchestrator owns it and hands the frame to the
/// sandbox as the `df` binding.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    frame: Option<DataFrame>,
    pub csv_path: Option<PathBuf>,
    pub target_column: Option<String>,
    pub series_id_column: Option<String>,
    pub data_info: Option<String>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a CSV and record the target and series columns
    pub fn load(
        csv_path: impl AsRef<Path>,
        target_column: impl Into<String>,
        series_id_column: impl Into<String>,
    ) -> Result<Self> {
        let path = csv_path.as_ref();
        let frame = DataFrame::from_csv_path(path).map_err(|e| {
            Error::dataset(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let summary = format!(
            "CSV with {} rows, columns: {}",
            frame.len(),
            frame.column_names().join(", ")
        );
        info!(path = %path.display(), rows = frame.len(), "Dataset loaded");

        Ok(Self {
            frame: Some(frame),
            csv_path: Some(path.to_path_buf()),
            target_column: Some(target_column.into()),
            series_id_column: Some(series_id_column.into()),
            data_info: Some(summary),
        })
    }

    /// Build a context around an in-memory frame
    pub fn with_frame(
        frame: DataFrame,
        target_column: impl Into<String>,
        series_id_column: impl Into<String>,
    ) -> Self {
        let summary = format!(
            "CSV with {} rows, columns: {}",
            frame.len(),
            frame.column_names().join(", ")
        );
        Self {
            frame: Some(frame),
            csv_path: None,
            target_column: Some(target_column.into()),
            series_id_column: Some(series_id_column.into()),
            data_info: Some(summary),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.frame.is_some()
    }

    pub fn frame(&self) -> Option<&DataFrame> {
        self.frame.as_ref()
    }

    pub fn frame_mut(&mut self) -> Option<&mut DataFrame> {
        self.frame.as_mut()
    }

    pub fn summary(&self) -> &str {
        self.data_info.as_deref().unwrap_or("No data loaded")
    }

    /// Frame with its target and series columns, or NoDataset
    pub fn require(&self) -> Result<(&DataFrame, &str, &str)> {
        match (&self.frame, &self.target_column, &self.series_id_column) {
            (Some(frame), Some(target), Some(series)) => Ok((frame, target, series)),
            _ => Err(Error::NoDataset),
        }
    }
}
