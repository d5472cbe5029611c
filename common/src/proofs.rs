// Proof discovery by directory convention
//
// Proofs live in "proof groups": directories whose path ends with one of the
// configured markers (`cbmc/proofs`, `.cbmc-batch/jobs`). Below a group, every
// directory holding the proof YAML is one proof.

use crate::errors::ProofError;
use crate::git::command::{CommandRunner, Invocation};
use crate::models::{ProofConfig, ProofTask};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};
use walkdir::{DirEntry, WalkDir};

fn is_git_dir(entry: &DirEntry) -> bool {
    entry.file_type().is_dir() && entry.file_name() == ".git"
}

fn walk_dirs(root: &Path) -> impl Iterator<Item = Result<DirEntry, ProofError>> {
    let root_display = root.display().to_string();
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_git_dir(e))
        .filter_map(move |entry| match entry {
            Ok(e) if e.file_type().is_dir() => Some(Ok(e)),
            Ok(_) => None,
            Err(e) => Some(Err(ProofError::Walk {
                path: root_display.clone(),
                reason: e.to_string(),
            })),
        })
}

/// Proof group directories under `root`
pub fn find_proof_groups(markers: &[String], root: &Path) -> Result<Vec<PathBuf>, ProofError> {
    let mut groups = Vec::new();
    for entry in walk_dirs(root) {
        let entry = entry?;
        let path = entry.path();
        if path != root && markers.iter().any(|m| path.ends_with(m)) {
            groups.push(path.to_path_buf());
        }
    }
    Ok(groups)
}

/// Proof directories under `group`, relative to `group`
pub fn find_proof_directories(group: &Path, yaml_name: &str) -> Result<Vec<PathBuf>, ProofError> {
    let mut dirs = Vec::new();
    for entry in walk_dirs(group) {
        let entry = entry?;
        if entry.path().join(yaml_name).is_file() {
            let relative = entry
                .path()
                .strip_prefix(group)
                .map(Path::to_path_buf)
                .unwrap_or_else(|_| entry.path().to_path_buf());
            dirs.push(relative);
        }
    }
    Ok(dirs)
}

/// Every proof under `root` as a (name, directory) task
///
/// The name is the final component of the proof directory. A proof reachable
/// through nested groups is reported once.
#[instrument(skip(markers), fields(root = %root.display()))]
pub fn find_tasks(
    markers: &[String],
    yaml_name: &str,
    root: &Path,
) -> Result<Vec<ProofTask>, ProofError> {
    let mut tasks = BTreeSet::new();
    for group in find_proof_groups(markers, root)? {
        for relative in find_proof_directories(&group, yaml_name)? {
            let dir = group.join(&relative);
            let name = dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            debug!(proof = %name, dir = %dir.display(), "Found proof");
            tasks.insert(ProofTask { name, dir });
        }
    }
    let tasks: Vec<ProofTask> = tasks.into_iter().collect();
    info!("{} tasks found", tasks.len());
    Ok(tasks)
}

/// Run the per-group prepare script (which generates proof Makefiles)
/// in every proof group that has one
#[instrument(skip(runner, markers), fields(root = %root.display()))]
pub async fn run_prepare_scripts(
    runner: &dyn CommandRunner,
    markers: &[String],
    root: &Path,
    script: &str,
    python: &str,
) -> Result<usize, ProofError> {
    let mut ran = 0;
    for group in find_proof_groups(markers, root)? {
        if group.join(script).is_file() {
            runner
                .run_checked(&Invocation::new(python, [script]).current_dir(&group))
                .await?;
            ran += 1;
        }
    }
    Ok(ran)
}

/// Load the proof YAML of `dir`; the directory must also hold a Makefile
pub fn load_proof_config(dir: &Path, yaml_name: &str) -> Result<ProofConfig, ProofError> {
    if !dir.join("Makefile").is_file() {
        return Err(ProofError::MissingMakefile(dir.display().to_string()));
    }
    let yaml_path = dir.join(yaml_name);
    if !yaml_path.is_file() {
        return Err(ProofError::MissingYaml {
            yaml_name: yaml_name.to_string(),
            dir: dir.display().to_string(),
        });
    }

    let content = std::fs::read_to_string(&yaml_path)?;
    if content.trim().is_empty() {
        return Ok(ProofConfig::default());
    }
    serde_yaml::from_str(&content).map_err(|e| ProofError::InvalidYaml {
        path: yaml_path.display().to_string(),
        reason: e.to_string(),
    })
}
