//! Source/destination reachability checks, run through the shell.

use std::path::Path;

/// Outcome of one validation command. A signal-terminated command is
/// reported distinctly because the supervisor treats it as a request to
/// stop rather than an ordinary transient failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationOutcome {
    Success,
    Failed,
    Signaled,
}

/// Substitutes `{source}`/`{destination}` placeholders with shell-escaped
/// values, so a command template can reference either without the caller
/// hand-quoting paths that may contain spaces or shell metacharacters.
pub fn substitute(template: &str, source: &Path, destination: &str) -> String {
    let source = shell_escape::escape(source.to_string_lossy());
    let destination = shell_escape::escape(destination.into());
    template
        .replace("{source}", &source)
        .replace("{destination}", &destination)
}

/// Runs `cmd` through `sh -c`, capturing stderr to `stderr_file` (appended,
/// matching the log-files-under-advisory-lock discipline used for
/// supervisor logging elsewhere). An empty command is treated as success
/// so a sync set with no configured validation never blocks.
pub async fn run(cmd: &str, stderr_file: &Path) -> std::io::Result<ValidationOutcome> {
    if cmd.trim().is_empty() {
        return Ok(ValidationOutcome::Success);
    }

    let stderr = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(stderr_file)?;

    let status = tokio::process::Command::new("sh")
        .arg("-c")
        .arg(cmd)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(stderr)
        .status()
        .await?;

    Ok(classify(status))
}

fn classify(status: std::process::ExitStatus) -> ValidationOutcome {
    use std::os::unix::process::ExitStatusExt;
    if status.success() {
        ValidationOutcome::Success
    } else if status.signal().is_some() {
        ValidationOutcome::Signaled
    } else {
        ValidationOutcome::Failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitute_escapes_both_placeholders() {
        let out = substitute(
            "rsync {source} {destination}",
            Path::new("/tmp/has space"),
            "user@host:/has space too",
        );
        assert!(out.contains("has space"));
        assert!(!out.contains("{source}"));
        assert!(!out.contains("{destination}"));
    }

    #[tokio::test]
    async fn empty_command_is_success() {
        let stderr = tempfile::NamedTempFile::new().unwrap();
        let outcome = run("", stderr.path()).await.unwrap();
        assert_eq!(outcome, ValidationOutcome::Success);
    }

    #[tokio::test]
    async fn true_command_succeeds_false_command_fails() {
        let stderr = tempfile::NamedTempFile::new().unwrap();
        assert_eq!(run("true", stderr.path()).await.unwrap(), ValidationOutcome::Success);
        assert_eq!(run("false", stderr.path()).await.unwrap(), ValidationOutcome::Failed);
    }
}
