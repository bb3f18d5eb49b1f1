//! Utility functions for request targets.
//!
//! Targets arrive as command-line arguments or lines of a file. These helpers
//! normalize them into absolute http(s) URLs and expand them into the final
//! list of requests.

use crate::error::BatchGateError;
use std::fs;
use std::path::Path;
use tracing::warn;
use url::Url;

/// Normalize and validate one request target.
///
/// A bare host such as `example.com` gets `https://` prepended. Anything
/// with a scheme must be `http` or `https` and name a host.
///
/// # Returns
///
/// The normalized URL, or `InvalidTarget` describing what is wrong.
pub fn normalize_target(target: &str) -> Result<String, BatchGateError> {
    let target = target.trim();

    if target.is_empty() {
        return Err(BatchGateError::invalid_target(target, "Target cannot be empty"));
    }

    let url = if target.contains("://") {
        target.to_string()
    } else {
        format!("https://{}", target)
    };

    validate_target(&url)?;
    Ok(url)
}

/// Validate an absolute http(s) URL.
pub fn validate_target(url: &str) -> Result<(), BatchGateError> {
    let parsed = Url::parse(url)
        .map_err(|e| BatchGateError::invalid_target(url, format!("Invalid URL: {}", e)))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(BatchGateError::invalid_target(
            url,
            format!("Unsupported scheme '{}', use http or https", parsed.scheme()),
        ));
    }
    if parsed.host().is_none() {
        return Err(BatchGateError::invalid_target(url, "Missing host"));
    }

    Ok(())
}

/// Parse a target list: one target per line, `#` starts a comment line.
///
/// Invalid lines are logged and skipped.
pub fn parse_target_lines(content: &str) -> Vec<String> {
    let mut targets = Vec::new();

    for (line_number, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        match normalize_target(trimmed) {
            Ok(url) => targets.push(url),
            Err(e) => warn!(line = line_number + 1, error = %e, "skipping invalid target"),
        }
    }

    targets
}

/// Read a target list from a file.
///
/// # Errors
///
/// Returns `FileError` if the file cannot be read or holds no valid target.
pub fn read_targets_file<P: AsRef<Path>>(path: P) -> Result<Vec<String>, BatchGateError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| {
        BatchGateError::file_error(path.to_string_lossy(), format!("Failed to read file: {}", e))
    })?;

    let targets = parse_target_lines(&content);
    if targets.is_empty() {
        return Err(BatchGateError::file_error(
            path.to_string_lossy(),
            "No valid targets found in file",
        ));
    }

    Ok(targets)
}

/// Repeat the target list `repeat` times (a repeat of 0 counts as 1).
///
/// `expand_targets(&["https://a".into()], 200)` yields 200 requests to the
/// same host.
pub fn expand_targets(targets: &[String], repeat: usize) -> Vec<String> {
    let repeat = repeat.max(1);
    let mut expanded = Vec::with_capacity(targets.len() * repeat);
    for _ in 0..repeat {
        expanded.extend(targets.iter().cloned());
    }
    expanded
}
