// GitHub webhook event parsing
//
// Only two deliveries start verification: a pull request from a fork being
// opened or updated, and a push with a head commit.

use crate::errors::EventError;
use crate::models::SourceRequest;
use serde_json::Value;
use std::collections::HashMap;
use tracing::info;

pub const EVENT_HEADER: &str = "x-github-event";
pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";

/// Case-insensitive header lookup
pub fn header_value<'a>(headers: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

fn field<'a>(value: &'a Value, path: &[&str]) -> Result<&'a Value, EventError> {
    path.iter()
        .try_fold(value, |v, key| v.get(key))
        .filter(|v| !v.is_null())
        .ok_or_else(|| EventError::MissingField(path.join(".")))
}

fn string_field(value: &Value, path: &[&str]) -> Result<String, EventError> {
    match field(value, path)? {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err(EventError::MissingField(path.join("."))),
    }
}

fn clone_url(repo: &Value, full_name: &str) -> String {
    repo.get("clone_url")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("https://github.com/{}.git", full_name))
}

/// Parse a pull request delivery
pub fn parse_pull_request(body: &Value) -> Result<Option<SourceRequest>, EventError> {
    let action = string_field(body, &["action"])?;
    if action != "opened" && action != "synchronize" {
        info!("Ignoring pull request with action {}", action);
        return Ok(None);
    }

    let pr = field(body, &["pull_request"])?;
    let head_repo_name = string_field(pr, &["head", "repo", "full_name"])?;
    let head_sha = string_field(pr, &["head", "sha"])?;
    let base_repo = field(pr, &["base", "repo"])?;
    let base_repo_name = string_field(base_repo, &["full_name"])?;
    let base_repo_id = string_field(base_repo, &["id"])?;
    let base_branch = string_field(pr, &["base", "ref"])?;
    let draft = pr.get("draft").and_then(Value::as_bool).unwrap_or(false);

    info!(
        "Pull request: {} {} -> {} (draft: {})",
        action, head_repo_name, base_repo_name, draft
    );
    if head_repo_name == base_repo_name {
        info!("Ignoring pull request action as base repository matches head");
        return Ok(None);
    }

    Ok(Some(SourceRequest {
        clone_url: clone_url(base_repo, &base_repo_name),
        full_name: base_repo_name,
        repo_id: base_repo_id,
        branch: base_branch,
        sha: head_sha,
        is_draft: draft,
    }))
}

/// Parse a push delivery
pub fn parse_push(body: &Value) -> Result<Option<SourceRequest>, EventError> {
    let repo = field(body, &["repository"])?;
    let full_name = string_field(repo, &["full_name"])?;
    let repo_id = string_field(repo, &["id"])?;
    let branch = string_field(body, &["ref"])?;

    let sha = match body.get("head_commit").filter(|c| !c.is_null()) {
        Some(commit) => string_field(commit, &["id"])?,
        None => {
            info!("Ignoring delete-branch push event");
            return Ok(None);
        }
    };
    info!("Push to {}: {}", full_name, branch);

    Ok(Some(SourceRequest {
        clone_url: clone_url(repo, &full_name),
        full_name,
        repo_id,
        branch,
        sha,
        is_draft: false,
    }))
}

/// The commit a delivery asks to verify, or None for deliveries that need no
/// verification
pub fn parse_event(
    headers: &HashMap<String, String>,
    body: &str,
) -> Result<Option<SourceRequest>, EventError> {
    let event_type = header_value(headers, EVENT_HEADER)
        .ok_or_else(|| EventError::MissingField(EVENT_HEADER.to_string()))?;
    let body: Value = serde_json::from_str(body)?;
    match event_type {
        "pull_request" => parse_pull_request(&body),
        "push" => parse_push(&body),
        other => Err(EventError::UnexpectedEventType(other.to_string())),
    }
}
