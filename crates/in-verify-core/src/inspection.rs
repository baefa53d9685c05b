// C7: inspection runner adapter. Invokes the external runner, converts its
// result into a Link, and enforces the return-value contract (§4.7).
//
// File hashing and subprocess execution are themselves named non-goals of
// the verification core (§1); `ArtifactRecorder` and `InspectionRunner` are
// the seams the core depends on, each with a concrete default so the crate
// is runnable out of the box.

use std::path::Path;
use std::process::Command;

use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::error::VerifyError;
use crate::model::{ArtifactSet, Byproducts, Inspection, Link, LinkKind};

/// Snapshots the artifacts under a directory into an [`ArtifactSet`].
pub trait ArtifactRecorder {
    fn record(&self, base_dir: &Path) -> Result<ArtifactSet, VerifyError>;
}

/// Default recorder: SHA-256 of every regular file under `base_dir`,
/// relative paths normalized to `/`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Sha256Recorder;

impl ArtifactRecorder for Sha256Recorder {
    fn record(&self, base_dir: &Path) -> Result<ArtifactSet, VerifyError> {
        let mut set = ArtifactSet::new();
        for entry in WalkDir::new(base_dir).into_iter() {
            let entry = entry.map_err(|e| VerifyError::Io {
                path: base_dir.display().to_string(),
                reason: e.to_string(),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let bytes = std::fs::read(entry.path()).map_err(|e| VerifyError::Io {
                path: entry.path().display().to_string(),
                reason: e.to_string(),
            })?;
            let digest = hex::encode(Sha256::digest(&bytes));
            let rel = entry
                .path()
                .strip_prefix(base_dir)
                .unwrap_or(entry.path())
                .to_string_lossy()
                .replace('\\', "/");
            set.insert(rel, std::collections::BTreeMap::from([("sha256".to_string(), digest)]));
        }
        Ok(set)
    }
}

/// Runs one inspection and returns the link it produced.
pub trait InspectionRunner {
    fn run(&self, inspection: &Inspection, base_dir: &Path) -> Result<Link, VerifyError>;
}

/// Default runner: spawns `inspection.run` as a child process with
/// `base_dir` as its working directory, recording materials/products as a
/// before/after snapshot of that directory (§4.7 steps 1-2).
pub struct SubprocessRunner<R: ArtifactRecorder = Sha256Recorder> {
    recorder: R,
}

impl Default for SubprocessRunner<Sha256Recorder> {
    fn default() -> Self {
        Self { recorder: Sha256Recorder }
    }
}

impl<R: ArtifactRecorder> SubprocessRunner<R> {
    pub fn with_recorder(recorder: R) -> Self {
        Self { recorder }
    }
}

impl<R: ArtifactRecorder> InspectionRunner for SubprocessRunner<R> {
    fn run(&self, inspection: &Inspection, base_dir: &Path) -> Result<Link, VerifyError> {
        let materials = self.recorder.record(base_dir)?;

        let [program, args @ ..] = inspection.run.as_slice() else {
            return Err(VerifyError::RuleFormat {
                rule: inspection.name.clone(),
                reason: "inspection 'run' argv is empty".to_string(),
            });
        };
        let output = Command::new(program)
            .args(args)
            .current_dir(base_dir)
            .output()
            .map_err(|e| VerifyError::Io {
                path: program.clone(),
                reason: e.to_string(),
            })?;

        let products = self.recorder.record(base_dir)?;

        let return_value = output.status.code();
        let mut byproducts = Byproducts::new();
        byproducts.insert(
            "return-value".to_string(),
            match return_value {
                Some(code) => serde_json::json!(code),
                None => serde_json::Value::Null,
            },
        );
        byproducts.insert(
            "stdout".to_string(),
            serde_json::json!(String::from_utf8_lossy(&output.stdout)),
        );
        byproducts.insert(
            "stderr".to_string(),
            serde_json::json!(String::from_utf8_lossy(&output.stderr)),
        );

        match return_value {
            Some(0) => {}
            Some(code) => {
                return Err(VerifyError::BadReturn {
                    inspection: inspection.name.clone(),
                    reason: format!("exit code {code}"),
                })
            }
            None => {
                return Err(VerifyError::BadReturn {
                    inspection: inspection.name.clone(),
                    reason: "process terminated by signal, no integer return value".to_string(),
                })
            }
        }

        Ok(Link {
            materials,
            products,
            byproducts,
            command: inspection.run.clone(),
            ..Link::new(&inspection.name, LinkKind::Link)
        })
    }
}

/// Run every inspection in declared order, persisting each produced link
/// for audit (§4.7 step 4; §6 "Persisted state").
pub fn run_all_inspections(
    inspections: &[Inspection],
    runner: &dyn InspectionRunner,
    base_dir: &Path,
    audit_dir: &Path,
) -> Result<std::collections::HashMap<String, Link>, VerifyError> {
    let mut links = std::collections::HashMap::new();
    for inspection in inspections {
        tracing::info!(inspection = inspection.name, "running inspection");
        let link = runner.run(inspection, base_dir)?;
        persist_link(&link, audit_dir)?;
        links.insert(inspection.name.clone(), link);
    }
    Ok(links)
}

fn persist_link(link: &Link, audit_dir: &Path) -> Result<(), VerifyError> {
    if !audit_dir.exists() {
        return Ok(());
    }
    let path = audit_dir.join(format!("{}.link", link.name));
    std::fs::write(&path, link.signable_bytes()).map_err(|e| VerifyError::Io {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    #[test]
    fn bad_return_aborts() {
        let inspection = Inspection {
            name: "check".into(),
            run: vec!["false".into()],
            expected_materials: vec![],
            expected_products: vec![],
        };
        let runner = SubprocessRunner::default();
        let dir = tempfile::tempdir().unwrap();
        let err = runner.run(&inspection, dir.path()).unwrap_err();
        assert!(matches!(err, VerifyError::BadReturn { .. }));
    }

    #[test]
    fn zero_return_succeeds() {
        let inspection = Inspection {
            name: "check".into(),
            run: vec!["true".into()],
            expected_materials: vec![],
            expected_products: vec![],
        };
        let runner = SubprocessRunner::default();
        let dir = tempfile::tempdir().unwrap();
        let link = runner.run(&inspection, dir.path()).unwrap();
        assert_eq!(link.byproducts["return-value"], serde_json::json!(0));
    }
}
