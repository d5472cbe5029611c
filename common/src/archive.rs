// Source tarball naming and creation

use crate::errors::CommandError;
use crate::git::command::{CommandRunner, Invocation};
use crate::git::repository::repository_basename;
use chrono::{DateTime, Utc};
use std::path::Path;

/// `<owner-repo>-YYYYMMDD-HHMMSS[-<sha>].tar.gz`
pub fn make_tarfile_name(repository: &str, sha: Option<&str>, now: DateTime<Utc>) -> String {
    let mut name = format!(
        "{}-{}",
        repository_basename(repository),
        now.format("%Y%m%d-%H%M%S")
    );
    if let Some(sha) = sha.filter(|s| !s.is_empty()) {
        name.push('-');
        name.push_str(&sha.replace('/', "_").to_lowercase());
    }
    name.push_str(".tar.gz");
    name
}

/// Object key for a tarball: `path/name`, or `name` without a path
pub fn tarfile_key(path: Option<&str>, name: &str) -> String {
    match path.map(|p| p.trim_matches('/')).filter(|p| !p.is_empty()) {
        Some(path) => format!("{}/{}", path, name),
        None => name.to_string(),
    }
}

/// `tar fcz TARFILE SRCDIR`, run in `cwd`
pub async fn generate_tarfile(
    runner: &dyn CommandRunner,
    tarfile: &Path,
    srcdir: &str,
    cwd: &Path,
) -> Result<(), CommandError> {
    let tarfile = tarfile.display().to_string();
    runner
        .run_checked(&Invocation::new("tar", ["fcz", tarfile.as_str(), srcdir]).current_dir(cwd))
        .await?;
    Ok(())
}
