//! Invocation of the external transfer tool for full and partial syncs.

use std::path::Path;

use crate::validate::ValidationOutcome;

pub type TransferOutcome = ValidationOutcome;

/// Runs a full-sync or partial-sync command template through the shell.
///
/// `excludes_file`, when `Some`, is appended as `--exclude-from=<path>`.
/// `files_from`, when `Some`, is appended as `--files-from=<path>`
/// (partial syncs only). Both flags are appended after the templated
/// command rather than interpolated, since the transfer tool's own flag
/// syntax isn't something this crate should assume beyond those two.
pub async fn run(
    template: &str,
    source: &Path,
    destination: &str,
    excludes_file: Option<&Path>,
    files_from: Option<&Path>,
    stderr_file: &Path,
) -> std::io::Result<TransferOutcome> {
    let mut cmd = crate::validate::substitute(template, source, destination);

    if let Some(path) = excludes_file {
        cmd.push_str(&format!(" --exclude-from={}", shell_escape::escape(path.to_string_lossy())));
    }
    if let Some(path) = files_from {
        cmd.push_str(&format!(" --files-from={}", shell_escape::escape(path.to_string_lossy())));
    }

    crate::validate::run(&cmd, stderr_file).await
}
