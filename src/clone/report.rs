//! Timing records and the Markdown timing report.

use std::time::Duration;

use camino::Utf8Path;
use cap_std::{ambient_authority, fs_utf8::Dir};
use thiserror::Error;

/// Title line written at the top of every report.
pub const REPORT_TITLE: &str = "# Instance Creation Timing";

/// Default file name for the written report.
pub const DEFAULT_REPORT_PATH: &str = "TIMING.md";

/// Time taken to provision one clone.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TimingRecord {
    resource_name: String,
    elapsed: Duration,
}

impl TimingRecord {
    /// Creates a record.
    #[must_use]
    pub fn new(resource_name: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            resource_name: resource_name.into(),
            elapsed,
        }
    }

    /// Name of the provisioned resource.
    #[must_use]
    pub fn resource_name(&self) -> &str {
        &self.resource_name
    }

    /// Wall-clock time from create acceptance to completion.
    #[must_use]
    pub const fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Elapsed time in fractional seconds.
    #[must_use]
    pub fn elapsed_seconds(&self) -> f64 {
        self.elapsed.as_secs_f64()
    }
}

/// Errors raised while writing the report.
#[derive(Debug, Error)]
pub enum ReportError {
    /// Raised when the report path has no file name component.
    #[error("report path {path} has no file name")]
    InvalidPath {
        /// Offending path.
        path: String,
    },
    /// Raised when the file cannot be written.
    #[error("failed to write {path}: {message}")]
    Io {
        /// Target path.
        path: String,
        /// Underlying error message.
        message: String,
    },
}

/// Successful clone timings in provisioning order.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TimingReport {
    records: Vec<TimingRecord>,
}

impl TimingReport {
    /// Creates an empty report.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    /// Appends a record. A later record for the same name replaces the earlier
    /// one in place so the report stays keyed by resource name.
    pub fn push(&mut self, record: TimingRecord) {
        if let Some(existing) = self
            .records
            .iter_mut()
            .find(|existing| existing.resource_name == record.resource_name)
        {
            *existing = record;
            return;
        }
        self.records.push(record);
    }

    /// Looks up the record for a resource.
    #[must_use]
    pub fn get(&self, resource_name: &str) -> Option<&TimingRecord> {
        self.records
            .iter()
            .find(|record| record.resource_name == resource_name)
    }

    /// Records in provisioning order.
    pub fn iter(&self) -> impl Iterator<Item = &TimingRecord> {
        self.records.iter()
    }

    /// Resource names in provisioning order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.records.iter().map(TimingRecord::resource_name).collect()
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the report has no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Renders the Markdown report.
    #[must_use]
    pub fn render(&self) -> String {
        let mut output = format!("{REPORT_TITLE}\n\n");
        for record in &self.records {
            output.push_str(&format!(
                "- {}: {:.2} seconds\n",
                record.resource_name,
                record.elapsed_seconds()
            ));
        }
        output
    }

    /// Writes the rendered report to `path`, replacing any existing file.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError`] when the path is unusable or the write fails.
    pub fn write_to(&self, path: &Utf8Path) -> Result<(), ReportError> {
        let file_name = path.file_name().ok_or_else(|| ReportError::InvalidPath {
            path: path.to_string(),
        })?;
        let parent = match path.parent() {
            Some(dir) if !dir.as_str().is_empty() => dir,
            _ => Utf8Path::new("."),
        };
        let io_error = |err: std::io::Error| ReportError::Io {
            path: path.to_string(),
            message: err.to_string(),
        };
        let dir = Dir::open_ambient_dir(parent, ambient_authority()).map_err(io_error)?;
        dir.write(file_name, self.render()).map_err(io_error)
    }
}

impl<'a> IntoIterator for &'a TimingReport {
    type Item = &'a TimingRecord;
    type IntoIter = std::slice::Iter<'a, TimingRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
