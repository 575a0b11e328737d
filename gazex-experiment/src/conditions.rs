//! Condition files and the randomised trial list built from them.

use std::path::Path;

use rand::Rng;
use rand::seq::SliceRandom;
use tracing::debug;

use crate::error::ExperimentError;

/// One row of a condition file, columns in file order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrialRow {
    /// Zero-based position in the file.
    pub index: usize,
    pub fields: Vec<(String, String)>,
}

impl TrialRow {
    pub fn new(index: usize, fields: Vec<(String, String)>) -> Self {
        Self { index, fields }
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value.as_str())
    }

    pub fn require(&self, column: &str) -> Result<&str, ExperimentError> {
        self.get(column)
            .ok_or_else(|| ExperimentError::MissingColumn(column.to_string()))
    }

    pub fn require_count(&self, column: &str) -> Result<usize, ExperimentError> {
        let value = self.require(column)?;
        value.trim().parse().map_err(|_| ExperimentError::NotANumber {
            column: column.to_string(),
            value: value.to_string(),
        })
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }
}

/// Rows of one block, visited once each in random order.
#[derive(Debug, Clone)]
pub struct TrialList {
    rows: Vec<TrialRow>,
    order: Vec<usize>,
    position: usize,
}

impl TrialList {
    pub fn new(rows: Vec<TrialRow>) -> Self {
        let order = (0..rows.len()).collect();
        Self {
            rows,
            order,
            position: 0,
        }
    }

    pub fn from_path(path: &Path) -> Result<Self, ExperimentError> {
        let wrap = |source| ExperimentError::Conditions {
            path: path.to_path_buf(),
            source,
        };
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(wrap)?;
        let headers = reader.headers().map_err(wrap)?.clone();
        let mut rows = Vec::new();
        for (index, record) in reader.records().enumerate() {
            let record = record.map_err(wrap)?;
            let fields = headers
                .iter()
                .zip(record.iter())
                .map(|(h, v)| (h.to_string(), v.to_string()))
                .collect();
            rows.push(TrialRow::new(index, fields));
        }
        if rows.is_empty() {
            return Err(ExperimentError::NoTrials {
                path: path.to_path_buf(),
            });
        }
        debug!(path = %path.display(), trials = rows.len(), "condition file loaded");
        Ok(Self::new(rows))
    }

    /// Random order without repetition for this pass.
    pub fn shuffle<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.order.shuffle(rng);
        self.position = 0;
    }

    pub fn next_row(&mut self) -> Option<&TrialRow> {
        let index = *self.order.get(self.position)?;
        self.position += 1;
        self.rows.get(index)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.order.len() - self.position
    }

    /// Column names of the file, from its first row.
    pub fn columns(&self) -> Vec<String> {
        self.rows
            .first()
            .map(|row| row.columns().map(str::to_string).collect())
            .unwrap_or_default()
    }
}
