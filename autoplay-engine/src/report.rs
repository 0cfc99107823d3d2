use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

/// Checkpoint-time summary of a run, written next to the snapshot.
#[derive(Clone, Debug, Serialize)]
pub struct RunReport {
    pub game: String,
    pub rounds: usize,
    pub frames: usize,
    pub watermark: i32,
    pub nfutures: usize,
    pub motif_weight_min: f64,
    pub motif_weight_max: f64,
    pub observed_memories: usize,
    pub backtracks: usize,
    pub improvements: usize,
    pub negative_streak: usize,
}

pub fn write_report(path: &Path, report: &RunReport) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed creating {}", parent.display()))?;
    }
    let json = serde_json::to_vec_pretty(report).context("failed to serialize run report")?;
    fs::write(path, json).with_context(|| format!("failed writing {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_serializes_to_json() {
        let report = RunReport {
            game: "microrig".into(),
            rounds: 12,
            frames: 120,
            watermark: 0,
            nfutures: 40,
            motif_weight_min: 0.5,
            motif_weight_max: 3.0,
            observed_memories: 120,
            backtracks: 1,
            improvements: 0,
            negative_streak: 0,
        };
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"frames\":120"));
        assert!(json.contains("\"nfutures\":40"));
    }
}
