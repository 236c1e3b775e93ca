//! File-backed result store and configuration file.
//!
//! Runs are appended to a JSON-lines file, one self-contained record per
//! line, so a torn write can only ever lose the last record.  The
//! configuration is a single pretty-printed JSON document replaced
//! atomically via write-then-rename.

use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::app::metrics::{RunId, RunMetrics, RunStatus};
use crate::app::ports::{ConfigError, ConfigPort, RunStore};
use crate::config::TestConfig;
use crate::error::{Error, StoreError};

// ───────────────────────────────────────────────────────────────
// Run store
// ───────────────────────────────────────────────────────────────

/// One persisted run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRun {
    pub id: RunId,
    pub created_at: String,
    pub status: RunStatus,
    pub total_time: Option<f64>,
    pub baseline_time: Option<f64>,
    pub analysis_time: Option<f64>,
    pub metrics: RunMetrics,
}

/// Append-only JSON-lines run log.
#[derive(Debug, Clone)]
pub struct JsonlRunStore {
    path: PathBuf,
}

impl JsonlRunStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read back every record.  Unparseable lines are skipped with a warning.
    pub fn load_all(&self) -> Result<Vec<StoredRun>, StoreError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let reader = BufReader::new(fs::File::open(&self.path)?);
        let mut runs = Vec::new();
        for (lineno, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(run) => runs.push(run),
                Err(e) => warn!("{}:{}: skipping record: {e}", self.path.display(), lineno + 1),
            }
        }
        Ok(runs)
    }
}

impl RunStore for JsonlRunStore {
    fn save_run(
        &mut self,
        run_id: &RunId,
        status: RunStatus,
        metrics: &RunMetrics,
    ) -> Result<(), StoreError> {
        let record = StoredRun {
            id: run_id.clone(),
            created_at: chrono::Local::now().to_rfc3339(),
            status,
            total_time: metrics.total_time(),
            baseline_time: metrics.baseline_time(),
            analysis_time: metrics.analysis_time(),
            metrics: metrics.clone(),
        };
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        file.sync_data()?;
        info!("run {} saved to {}", run_id, self.path.display());
        Ok(())
    }
}

// ───────────────────────────────────────────────────────────────
// Config file
// ───────────────────────────────────────────────────────────────

/// JSON configuration file.  Missing file means defaults.
#[derive(Debug, Clone)]
pub struct JsonConfigFile {
    path: PathBuf,
}

impl JsonConfigFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

fn validation(cfg: &TestConfig) -> Result<(), ConfigError> {
    cfg.validate().map_err(|e| match e {
        Error::Config(msg) => ConfigError::ValidationFailed(msg),
        other => ConfigError::Corrupted(other.to_string()),
    })
}

impl ConfigPort for JsonConfigFile {
    fn load(&self) -> Result<TestConfig, ConfigError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("no config at {}, using defaults", self.path.display());
                return Ok(TestConfig::default());
            }
            Err(e) => return Err(ConfigError::Io(e.to_string())),
        };
        let cfg: TestConfig =
            serde_json::from_str(&text).map_err(|e| ConfigError::Corrupted(e.to_string()))?;
        validation(&cfg)?;
        info!("config loaded from {}", self.path.display());
        Ok(cfg)
    }

    fn save(&self, config: &TestConfig) -> Result<(), ConfigError> {
        validation(config)?;
        let text = serde_json::to_string_pretty(config)
            .map_err(|e| ConfigError::Corrupted(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, text).map_err(|e| ConfigError::Io(e.to_string()))?;
        fs::rename(&tmp, &self.path).map_err(|e| ConfigError::Io(e.to_string()))?;
        info!("config saved to {}", self.path.display());
        Ok(())
    }
}
