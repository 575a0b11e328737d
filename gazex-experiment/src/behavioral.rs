use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use gazex_core::TrialRecord;
use tracing::{debug, info};

use crate::error::ExperimentError;

/// Path of a participant's behavioral file.
pub fn behavioral_path(dir: &Path, participant: &str) -> PathBuf {
    dir.join(format!("pp_{participant}.csv"))
}

/// Fails when the participant number has been used before.
pub fn check_participant(dir: &Path, participant: &str) -> Result<PathBuf, ExperimentError> {
    let path = behavioral_path(dir, participant);
    if path.exists() {
        return Err(ExperimentError::ParticipantInUse {
            participant: participant.to_string(),
            path,
        });
    }
    Ok(path)
}

/// One CSV row per finished or abandoned trial, flushed as it is written.
#[derive(Debug)]
pub struct BehavioralLog {
    path: PathBuf,
    writer: csv::Writer<File>,
    header: Option<Vec<String>>,
    rows: usize,
}

impl BehavioralLog {
    pub fn create(dir: &Path, participant: &str) -> Result<Self, ExperimentError> {
        let path = check_participant(dir, participant)?;
        std::fs::create_dir_all(dir)?;
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|err| match err.kind() {
                std::io::ErrorKind::AlreadyExists => ExperimentError::ParticipantInUse {
                    participant: participant.to_string(),
                    path: path.clone(),
                },
                _ => ExperimentError::Io(err),
            })?;
        info!(path = %path.display(), "behavioral log created");
        Ok(Self {
            path,
            writer: csv::Writer::from_writer(file),
            header: None,
            rows: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn header(&self) -> Option<&[String]> {
        self.header.as_deref()
    }

    /// Writes the header up front. Does nothing once a header exists.
    pub fn set_header(&mut self, header: Vec<String>) -> Result<(), ExperimentError> {
        if self.header.is_some() {
            return Ok(());
        }
        self.writer.write_record(&header).map_err(|source| ExperimentError::Behavioral {
            path: self.path.clone(),
            source,
        })?;
        self.writer.flush()?;
        debug!(columns = header.len(), "behavioral header written");
        self.header = Some(header);
        Ok(())
    }

    /// Writes `record`. Without a header set beforehand, the first record
    /// fixes it. Rows follow the header order, missing values left empty.
    pub fn write(&mut self, record: &TrialRecord) -> Result<(), ExperimentError> {
        if self.header.is_none() {
            self.set_header(header_for(record))?;
        }
        let wrap = |source| ExperimentError::Behavioral {
            path: self.path.clone(),
            source,
        };
        let header = self.header.as_deref().unwrap_or_default();
        let row: Vec<String> = header.iter().map(|column| value_of(record, column)).collect();
        self.writer.write_record(&row).map_err(wrap)?;
        self.writer.flush()?;
        self.rows += 1;
        debug!(trial = record.trial_id, "behavioral row written");
        Ok(())
    }
}

/// Columns every row starts with.
pub const FIXED_COLUMNS: [&str; 3] = ["trial_id", "block", "outcome"];

/// Header covering every block: fixed columns, the union of the condition
/// columns in first-seen order, then the response columns.
pub fn union_header<'a>(
    conditions: impl IntoIterator<Item = &'a str>,
    responses: &[&str],
) -> Result<Vec<String>, ExperimentError> {
    let mut header: Vec<String> = FIXED_COLUMNS.iter().map(|c| c.to_string()).collect();
    for column in conditions {
        if FIXED_COLUMNS.contains(&column) || responses.contains(&column) {
            return Err(ExperimentError::ReservedColumn(column.to_string()));
        }
        if !header.iter().any(|c| c == column) {
            header.push(column.to_string());
        }
    }
    header.extend(responses.iter().map(|c| c.to_string()));
    Ok(header)
}

fn header_for(record: &TrialRecord) -> Vec<String> {
    FIXED_COLUMNS
        .into_iter()
        .map(str::to_string)
        .chain(record.conditions.iter().map(|(k, _)| k.clone()))
        .chain(record.responses.iter().map(|(k, _)| k.clone()))
        .collect()
}

fn value_of(record: &TrialRecord, column: &str) -> String {
    match column {
        "trial_id" => record.trial_id.to_string(),
        "block" => record.block.clone(),
        "outcome" => record.outcome.label().to_string(),
        _ => record
            .responses
            .iter()
            .chain(record.conditions.iter())
            .find(|(k, _)| k == column)
            .map(|(_, v)| v.clone())
            .unwrap_or_default(),
    }
}
