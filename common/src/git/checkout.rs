// Checkout with recovery
//
// A commit can disappear between the webhook firing and this checkout (the
// branch was force-pushed). Checkout escalates through increasingly forceful
// attempts and, when all of them fail, asks git whether the commit still
// exists. A vanished commit is not an error: there is nothing left to verify.

use crate::errors::{CommandError, GitError};
use crate::git::command::{CommandRunner, Invocation};
use std::path::Path;
use tracing::{error, info, instrument, warn};

const RECURSIVE_CHECKOUT_FAILED_MSG: &str = "Failed to do a git checkout --recurse-submodules. \
     Possible reason: submodule missing from this branch, or commit no longer exists";
const FORCED_CHECKOUT_FAILED_MSG: &str = "Failed to do a git checkout --recurse-submodules with force flag. \
     Possible reason: commit no longer exists";

/// One state of the checkout recovery sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutStep {
    Plain,
    RecurseSubmodules,
    ForceRecurseSubmodules,
    VerifyGone,
}

impl CheckoutStep {
    fn invocation(self, target: &str, dir: &Path) -> Invocation {
        let args: Vec<&str> = match self {
            CheckoutStep::Plain => vec!["checkout", target],
            CheckoutStep::RecurseSubmodules => vec!["checkout", "--recurse-submodules", target],
            CheckoutStep::ForceRecurseSubmodules => {
                vec!["checkout", "--force", "--recurse-submodules", target]
            }
            CheckoutStep::VerifyGone => vec!["cat-file", "-e", target],
        };
        Invocation::new("git", args).current_dir(dir)
    }

    /// Step to try after this one failed
    fn next(self) -> CheckoutStep {
        match self {
            CheckoutStep::Plain => CheckoutStep::RecurseSubmodules,
            CheckoutStep::RecurseSubmodules => CheckoutStep::ForceRecurseSubmodules,
            CheckoutStep::ForceRecurseSubmodules | CheckoutStep::VerifyGone => {
                CheckoutStep::VerifyGone
            }
        }
    }

    fn failure_message(self) -> &'static str {
        match self {
            CheckoutStep::Plain => "Failed to do a plain git checkout",
            CheckoutStep::RecurseSubmodules => RECURSIVE_CHECKOUT_FAILED_MSG,
            CheckoutStep::ForceRecurseSubmodules => FORCED_CHECKOUT_FAILED_MSG,
            CheckoutStep::VerifyGone => "Commit lookup failed",
        }
    }
}

/// Result of `checkout_repository`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutOutcome {
    /// The target is checked out; `step` is the attempt that succeeded
    CheckedOut { step: CheckoutStep },
    /// Neither a sha nor a branch was given
    NoTarget,
    /// Every checkout failed and the commit no longer exists
    CommitGone,
}

async fn update_submodules(runner: &dyn CommandRunner, dir: &Path) -> Result<(), GitError> {
    runner
        .run_checked(
            &Invocation::new("git", ["submodule", "update", "--init", "--recursive"])
                .current_dir(dir),
        )
        .await?;
    Ok(())
}

/// Check out `sha` (or `branch` when no sha is given) in the clone at `dir`
#[instrument(skip(runner), fields(dir = %dir.display()))]
pub async fn checkout_repository(
    runner: &dyn CommandRunner,
    sha: Option<&str>,
    branch: Option<&str>,
    dir: &Path,
) -> Result<CheckoutOutcome, GitError> {
    let target = match sha.or(branch).map(str::trim).filter(|t| !t.is_empty()) {
        Some(target) => target,
        None => {
            warn!("Nothing to check out: neither sha nor branch given");
            return Ok(CheckoutOutcome::NoTarget);
        }
    };

    update_submodules(runner, dir).await?;

    let mut step = CheckoutStep::Plain;
    loop {
        let result = runner.run_checked(&step.invocation(target, dir)).await;
        match (step, result) {
            (_, Err(CommandError::Spawn { command, reason })) => {
                return Err(CommandError::Spawn { command, reason }.into());
            }
            (CheckoutStep::VerifyGone, Ok(_)) => {
                error!(
                    "git cat-file shows checkout {} as existing, but git checkout failed",
                    target
                );
                return Err(GitError::CheckoutFailedButCommitExists(target.to_string()));
            }
            (CheckoutStep::VerifyGone, Err(_)) => {
                error!("No such commit exists in this repository: <{}>", target);
                return Ok(CheckoutOutcome::CommitGone);
            }
            (_, Ok(_)) => break,
            (_, Err(e)) => {
                info!(error = %e, "{}", step.failure_message());
                step = step.next();
            }
        }
    }

    update_submodules(runner, dir).await?;
    info!(target = target, step = ?step, "Checkout complete");
    Ok(CheckoutOutcome::CheckedOut { step })
}
