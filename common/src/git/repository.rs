// Repository naming and cloning

use crate::errors::GitError;
use crate::git::command::{CommandRunner, Invocation};
use reqwest::Url;
use std::path::Path;
use tracing::{info, instrument};

/// Refspec that makes pull request heads fetchable as `origin/pr/<n>`
pub const PULL_REQUEST_REFSPEC: &str = "+refs/pull/*/head:refs/remotes/origin/pr/*";

/// `owner/repo` for a clone URL
///
/// Handles scp-like `git@host:owner/repo.git`, regular URLs and plain paths.
pub fn repository_name(url: &str) -> String {
    let path = if url.starts_with("git@") {
        url.rsplit(':').next().unwrap_or(url).to_string()
    } else {
        match Url::parse(url) {
            Ok(parsed) => parsed.path().to_string(),
            Err(_) => url.to_string(),
        }
    };
    let path = path.strip_suffix(".git").unwrap_or(&path);
    path.trim_matches('/').to_string()
}

/// Repository name usable as a single path component: `owner-repo`
pub fn repository_basename(url: &str) -> String {
    repository_name(url).replace('/', "-")
}

/// Insert `token` as the userinfo of an https URL; other URLs are unchanged
pub fn authenticated_url(url: &str, token: &str) -> Result<String, GitError> {
    let mut parsed = match Url::parse(url) {
        Ok(parsed) if parsed.scheme() == "https" => parsed,
        _ => return Ok(url.to_string()),
    };
    parsed
        .set_password(None)
        .and_then(|_| parsed.set_username(token))
        .map_err(|_| GitError::InvalidUrl(redact_url(url)))?;
    Ok(parsed.to_string())
}

/// `url` without userinfo; strings that are not URLs are returned as-is
pub fn strip_credentials(url: &str) -> String {
    match Url::parse(url) {
        Ok(mut parsed) if !parsed.username().is_empty() || parsed.password().is_some() => {
            match parsed.set_password(None).and_then(|_| parsed.set_username("")) {
                Ok(()) => parsed.to_string(),
                Err(()) => url.to_string(),
            }
        }
        _ => url.to_string(),
    }
}

/// Hide URL credentials; strings that are not URLs are returned as-is
pub fn redact_url(value: &str) -> String {
    match Url::parse(value) {
        Ok(mut parsed) if !parsed.username().is_empty() || parsed.password().is_some() => {
            let redacted = parsed
                .set_password(None)
                .and_then(|_| parsed.set_username("***"));
            match redacted {
                Ok(()) => parsed.to_string(),
                Err(()) => "<redacted>".to_string(),
            }
        }
        _ => value.to_string(),
    }
}

/// Clone `url` into `dest` and fetch pull request heads as well
#[instrument(skip(runner, url), fields(dest = %dest.display()))]
pub async fn clone_repository(
    runner: &dyn CommandRunner,
    url: &str,
    dest: &Path,
) -> Result<(), GitError> {
    info!(url = %redact_url(url), "Cloning repository");

    let dest_arg = dest.display().to_string();
    runner
        .run_checked(&Invocation::new("git", ["clone", url, dest_arg.as_str()]))
        .await?;

    // Pull request heads are not fetched by a plain clone
    runner
        .run_checked(
            &Invocation::new(
                "git",
                ["config", "--add", "remote.origin.fetch", PULL_REQUEST_REFSPEC],
            )
            .current_dir(dest),
        )
        .await?;
    runner
        .run_checked(&Invocation::new("git", ["fetch", "origin"]).current_dir(dest))
        .await?;

    // The clone is packaged into the source tarball: no token in .git/config
    let plain = strip_credentials(url);
    if plain != url {
        runner
            .run_checked(
                &Invocation::new("git", ["remote", "set-url", "origin", plain.as_str()])
                    .current_dir(dest),
            )
            .await?;
    }

    Ok(())
}
