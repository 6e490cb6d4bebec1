use anyhow::{Context, Result, bail};
use declarative::CommandOutput;
use std::path::Path;
use std::process::{Command, Stdio};

/// Run a program and capture output, whatever its exit status
pub fn run_output(cmd: &str, args: &[&str]) -> Result<CommandOutput> {
    let output = Command::new(cmd)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .with_context(|| format!("Failed to execute: {} {}", cmd, args.join(" ")))?;
    Ok(output.into())
}

/// Run a program and capture trimmed stdout, failing on non-zero exit
pub fn run_capture(cmd: &str, args: &[&str]) -> Result<String> {
    let output = run_output(cmd, args)?;
    if output.success {
        Ok(output.stdout_str().trim().to_string())
    } else {
        bail!(
            "{} {} failed: {}",
            cmd,
            args.join(" "),
            output.stderr_str().trim()
        )
    }
}

/// Run a shell command line through `sh -c`
pub fn shell(command: &str, cwd: Option<&Path>) -> Result<CommandOutput> {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command).stdin(Stdio::null());
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    let output = cmd
        .output()
        .with_context(|| format!("Failed to execute: sh -c '{command}'"))?;
    Ok(output.into())
}

/// Run a shell command line silently, returning success/failure
pub fn shell_quiet(command: &str) -> bool {
    Command::new("sh")
        .arg("-c")
        .arg(command)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Check if a command exists
pub fn command_exists(cmd: &str) -> bool {
    shell_quiet(&format!("command -v {cmd}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_captures_output_and_status() {
        let ok = shell("echo horizon", None).unwrap();
        assert!(ok.success);
        assert_eq!(ok.stdout_str().trim(), "horizon");

        let failed = shell("echo oops >&2; exit 3", None).unwrap();
        assert!(!failed.success);
        assert_eq!(failed.code, Some(3));
        assert_eq!(failed.stderr_str().trim(), "oops");
    }

    #[test]
    fn test_shell_honours_cwd() {
        let dir = tempfile::tempdir().unwrap();
        let out = shell("pwd", Some(dir.path())).unwrap();
        let reported = std::fs::canonicalize(out.stdout_str().trim()).unwrap();
        assert_eq!(reported, std::fs::canonicalize(dir.path()).unwrap());
    }

    #[test]
    fn test_run_capture_fails_on_nonzero() {
        assert_eq!(run_capture("sh", &["-c", "echo 1.0"]).unwrap(), "1.0");
        assert!(run_capture("sh", &["-c", "exit 1"]).is_err());
    }

    #[test]
    fn test_shell_quiet_and_command_exists() {
        assert!(shell_quiet("true"));
        assert!(!shell_quiet("false"));
        assert!(command_exists("sh"));
        assert!(!command_exists("definitely-not-a-real-command-xyz"));
    }
}
