//! Per-run output directories under `runs/`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

/// Written once to `run_info.json` when a run starts.
#[derive(Debug, Clone, Serialize)]
pub struct RunInfo {
    pub run_id: String,
    pub seed: u64,
    pub content_version: String,
    pub runner: String,
    pub metrics_every: u64,
    pub args: serde_json::Value,
}

/// `YYYYMMDD_HHMMSS_seed<seed>`, UTC.
pub fn generate_run_id(seed: u64) -> String {
    let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
    format!("{timestamp}_seed{seed}")
}

pub fn create_run_dir(root: &Path, run_id: &str) -> Result<PathBuf> {
    let dir = root.join(run_id);
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("creating run directory: {}", dir.display()))?;
    Ok(dir)
}

pub fn write_run_info(dir: &Path, info: &RunInfo) -> Result<()> {
    let path = dir.join("run_info.json");
    let file =
        std::fs::File::create(&path).with_context(|| format!("creating {}", path.display()))?;
    serde_json::to_writer_pretty(file, info)
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_id_ends_with_seed() {
        let id = generate_run_id(42);
        assert!(id.ends_with("_seed42"), "{id}");
        assert_eq!(id.len(), "20260101_000000_seed42".len());
    }

    #[test]
    fn test_run_info_is_written_as_json() {
        let root = tempfile::tempdir().unwrap();
        let dir = create_run_dir(root.path(), "run_a").unwrap();
        let info = RunInfo {
            run_id: "run_a".to_string(),
            seed: 9,
            content_version: "test".to_string(),
            runner: "mars_cli".to_string(),
            metrics_every: 60,
            args: serde_json::json!({ "pulses": 100 }),
        };
        write_run_info(&dir, &info).unwrap();

        let text = std::fs::read_to_string(dir.join("run_info.json")).unwrap();
        let json: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(json["seed"], 9);
        assert_eq!(json["args"]["pulses"], 100);
    }
}
