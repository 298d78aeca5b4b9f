//! Run report artifacts with integrity digests.
//!
//! Layout: `<dir>/<run_id>/report.json` plus `<dir>/<run_id>/report.digest`
//! holding the SHA-256 hex digest of the JSON bytes.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::domain::{AutotuneError, Result};
use crate::run::RunReport;

const REPORT_FILE: &str = "report.json";
const DIGEST_FILE: &str = "report.digest";

fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Persist `report` and its digest. Returns the path of the JSON artifact.
pub fn write_run_report(report: &RunReport, dir: &Path) -> Result<PathBuf> {
    let run_dir = dir.join(&report.run_id);
    std::fs::create_dir_all(&run_dir)?;

    let artifact_path = run_dir.join(REPORT_FILE);
    let json = serde_json::to_vec_pretty(report)?;
    std::fs::write(&artifact_path, &json)?;
    std::fs::write(run_dir.join(DIGEST_FILE), sha256_hex(&json).as_bytes())?;

    Ok(artifact_path)
}

/// Read `<dir>/<run_id>/report.json`, verifying it against its digest.
pub fn read_run_report(run_id: &str, dir: &Path) -> Result<RunReport> {
    let run_dir = dir.join(run_id);
    let json = std::fs::read(run_dir.join(REPORT_FILE))?;
    let expected = std::fs::read_to_string(run_dir.join(DIGEST_FILE))?;
    let expected = expected.trim();
    let actual = sha256_hex(&json);
    if expected != actual {
        return Err(AutotuneError::DigestMismatch {
            expected: expected.to_string(),
            actual,
        });
    }
    Ok(serde_json::from_slice(&json)?)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::domain::{BaselineResult, Language, StrategySettings};
    use crate::strategy::{StopReason, StrategyOutcome};

    fn report() -> RunReport {
        RunReport {
            run_id: "run-abc".to_string(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            language: Language::Go,
            settings: StrategySettings::adaptive(2),
            strategy: StrategyOutcome {
                baseline: BaselineResult::from_steps(Vec::new(), None),
                plans: Vec::new(),
                failures: Vec::new(),
                stop_reason: StopReason::Succeeded,
            },
            evaluations: Vec::new(),
            skipped: vec!["opp-9".to_string()],
            cancelled: false,
            tree_dirty: false,
        }
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let original = report();
        let path = write_run_report(&original, dir.path()).unwrap();
        assert!(path.ends_with("run-abc/report.json"));

        let loaded = read_run_report("run-abc", dir.path()).unwrap();
        assert_eq!(loaded, original);
    }

    #[test]
    fn test_tampered_report_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_run_report(&report(), dir.path()).unwrap();
        let tampered = std::fs::read_to_string(&path)
            .unwrap()
            .replace("opp-9", "opp-8");
        std::fs::write(&path, tampered).unwrap();

        let err = read_run_report("run-abc", dir.path()).unwrap_err();
        assert!(matches!(err, AutotuneError::DigestMismatch { .. }));
    }

    #[test]
    fn test_digest_is_sha256_hex() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
