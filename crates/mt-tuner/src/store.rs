//! Durable trial records for one session.
//!
//! Every scored trial is appended as a JSON line to
//! `<dir>/<session>.trials.jsonl` and synced before the loop continues. When
//! the session ends, the whole history is exported to `<dir>/<session>.csv`.

use mt_optimizer::Trial;
use mt_types::{MemtableVariant, OpKind, TunerError, TunerResult};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Flat, tabular form of a [`Trial`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    pub trial_id: usize,
    pub session: String,
    pub insert: f64,
    pub update: f64,
    pub point_query: f64,
    pub range_query: f64,
    pub point_delete: f64,
    pub range_delete: f64,
    pub variant: MemtableVariant,
    pub size: Option<u64>,
    pub objective: Option<f64>,
    pub abandoned: bool,
}

impl TrialRecord {
    pub fn new(session: &str, trial: &Trial) -> Self {
        let pct = &trial.pinned;
        Self {
            trial_id: trial.number,
            session: session.to_string(),
            insert: pct.get(OpKind::Insert),
            update: pct.get(OpKind::Update),
            point_query: pct.get(OpKind::PointQuery),
            range_query: pct.get(OpKind::RangeQuery),
            point_delete: pct.get(OpKind::PointDelete),
            range_delete: pct.get(OpKind::RangeDelete),
            variant: trial.configuration.variant,
            size: trial.configuration.size,
            objective: trial.objective(),
            abandoned: trial.is_abandoned(),
        }
    }
}

/// Append-only trial log plus end-of-session export.
#[derive(Debug)]
pub struct ResultStore {
    dir: PathBuf,
    session: String,
    log: BufWriter<File>,
    log_path: PathBuf,
}

impl ResultStore {
    pub fn open(dir: impl AsRef<Path>, session: &str) -> TunerResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;

        let log_path = dir.join(format!("{session}.trials.jsonl"));
        let file = OpenOptions::new().create(true).append(true).open(&log_path)?;
        debug!(path = %log_path.display(), "opened trial log");

        Ok(Self {
            dir,
            session: session.to_string(),
            log: BufWriter::new(file),
            log_path,
        })
    }

    /// Append one trial and make it durable.
    pub fn append(&mut self, trial: &Trial) -> TunerResult<()> {
        let record = TrialRecord::new(&self.session, trial);
        serde_json::to_writer(&mut self.log, &record)?;
        self.log.write_all(b"\n")?;
        self.log.flush()?;
        self.log.get_ref().sync_data()?;
        Ok(())
    }

    /// Write every trial of the session to a CSV file named after it.
    ///
    /// The writer is flushed and the file synced and closed before this
    /// returns.
    pub fn export(&mut self, trials: &[Trial]) -> TunerResult<PathBuf> {
        self.log.flush()?;

        let path = self.export_path();
        let file = File::create(&path)?;
        let mut writer = csv::Writer::from_writer(file);
        for trial in trials {
            writer
                .serialize(TrialRecord::new(&self.session, trial))
                .map_err(|e| TunerError::Persistence(format!("{}: {e}", path.display())))?;
        }
        let file = writer
            .into_inner()
            .map_err(|e| TunerError::Persistence(format!("{}: {}", path.display(), e.error())))?;
        file.sync_all()?;

        info!(path = %path.display(), trials = trials.len(), "session exported");
        Ok(path)
    }

    pub fn export_path(&self) -> PathBuf {
        self.dir.join(format!("{}.csv", self.session))
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }
}

/// Read a CSV export back (used by reporting tools and tests).
pub fn read_export(path: impl AsRef<Path>) -> TunerResult<Vec<TrialRecord>> {
    let path = path.as_ref();
    let mut reader =
        csv::Reader::from_path(path).map_err(|e| TunerError::Persistence(format!("{}: {e}", path.display())))?;
    reader
        .deserialize()
        .collect::<Result<Vec<TrialRecord>, _>>()
        .map_err(|e| TunerError::Persistence(format!("{}: {e}", path.display())))
}
