//! Subprocess Sandbox
//!
//! Execution environment for dynamic skill files and OS automation shims:
//! - direct argv exec, never a shell
//! - environment cleared to an allow-list
//! - hard wall-clock timeout with kill
//! - stdout/stderr size caps

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tracing::warn;

/// Sandbox configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Maximum execution time in seconds
    pub timeout_secs: u64,
    /// Maximum captured stdout size in bytes (stderr gets a quarter)
    pub max_output_bytes: usize,
    /// Working directory for execution
    pub working_dir: Option<PathBuf>,
    /// Environment variables passed through from the parent
    pub allowed_env_vars: HashSet<String>,
    /// Additional environment variables to set
    pub extra_env: Vec<(String, String)>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_output_bytes: 1024 * 1024,
            working_dir: None,
            allowed_env_vars: default_allowed_env_vars(),
            extra_env: Vec::new(),
        }
    }
}

impl SandboxConfig {
    /// Tight limits for untrusted generated code
    pub fn strict() -> Self {
        Self {
            timeout_secs: 10,
            max_output_bytes: 256 * 1024,
            working_dir: None,
            allowed_env_vars: ["PATH", "HOME", "LANG"].iter().map(|s| s.to_string()).collect(),
            extra_env: Vec::new(),
        }
    }
}

fn default_allowed_env_vars() -> HashSet<String> {
    ["PATH", "HOME", "USER", "LANG", "LC_ALL", "TERM", "TZ"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Outcome of a sandboxed run
#[derive(Debug, Clone)]
pub struct SandboxResult {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
    pub truncated: bool,
    pub timed_out: bool,
    pub duration_ms: u64,
}

/// Sandboxed subprocess runner
pub struct Sandbox {
    config: SandboxConfig,
}

impl Sandbox {
    pub fn new(config: SandboxConfig) -> Self {
        Self { config }
    }

    /// Run a program with arguments, optionally feeding stdin
    pub async fn run(
        &self,
        program: &str,
        args: &[&str],
        stdin_data: Option<&str>,
    ) -> Result<SandboxResult> {
        let start = std::time::Instant::now();
        let timeout = Duration::from_secs(self.config.timeout_secs);

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(if stdin_data.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .env_clear()
            .kill_on_drop(true);

        for var in &self.config.allowed_env_vars {
            if let Ok(value) = std::env::var(var) {
                cmd.env(var, value);
            }
        }
        for (key, value) in &self.config.extra_env {
            cmd.env(key, value);
        }
        if let Some(ref dir) = self.config.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd
            .spawn()
            .with_context(|| format!("failed to spawn '{}'", program))?;

        if let Some(data) = stdin_data {
            if let Some(mut stdin) = child.stdin.take() {
                let _ = stdin.write_all(data.as_bytes()).await;
                // stdin dropped here to signal EOF
            }
        }

        let max_stdout = self.config.max_output_bytes;
        let max_stderr = self.config.max_output_bytes / 4;

        let result = tokio::time::timeout(timeout, async {
            let mut stdout = child.stdout.take().expect("piped stdout");
            let mut stderr = child.stderr.take().expect("piped stderr");

            let mut stdout_buf = Vec::new();
            let mut stderr_buf = Vec::new();
            let mut truncated = false;

            let mut chunk = [0u8; 8192];
            loop {
                match stdout.read(&mut chunk).await {
                    Ok(0) => break,
                    Ok(n) => {
                        if stdout_buf.len() + n <= max_stdout {
                            stdout_buf.extend_from_slice(&chunk[..n]);
                        } else {
                            truncated = true;
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }

            let mut chunk = [0u8; 8192];
            loop {
                match stderr.read(&mut chunk).await {
                    Ok(0) => break,
                    Ok(n) => {
                        if stderr_buf.len() + n <= max_stderr {
                            stderr_buf.extend_from_slice(&chunk[..n]);
                        } else {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }

            let status = child.wait().await?;
            Ok::<_, anyhow::Error>((stdout_buf, stderr_buf, status, truncated))
        })
        .await;

        match result {
            Ok(Ok((stdout_buf, stderr_buf, status, truncated))) => Ok(SandboxResult {
                exit_code: status.code(),
                stdout: String::from_utf8_lossy(&stdout_buf).to_string(),
                stderr: String::from_utf8_lossy(&stderr_buf).to_string(),
                success: status.success(),
                truncated,
                timed_out: false,
                duration_ms: start.elapsed().as_millis() as u64,
            }),
            Ok(Err(e)) => Ok(SandboxResult {
                exit_code: None,
                stdout: String::new(),
                stderr: e.to_string(),
                success: false,
                truncated: false,
                timed_out: false,
                duration_ms: start.elapsed().as_millis() as u64,
            }),
            Err(_) => {
                let _ = child.kill().await;
                warn!(
                    "Sandboxed '{}' timed out after {}s",
                    program, self.config.timeout_secs
                );
                Ok(SandboxResult {
                    exit_code: None,
                    stdout: String::new(),
                    stderr: format!("execution timed out after {} seconds", self.config.timeout_secs),
                    success: false,
                    truncated: false,
                    timed_out: true,
                    duration_ms: start.elapsed().as_millis() as u64,
                })
            }
        }
    }
}

impl Default for Sandbox {
    fn default() -> Self {
        Self::new(SandboxConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_captures_stdout() {
        let sandbox = Sandbox::default();
        let result = sandbox.run("echo", &["hello"], None).await.unwrap();
        assert!(result.success);
        assert_eq!(result.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn test_timeout_kills_process() {
        let sandbox = Sandbox::new(SandboxConfig {
            timeout_secs: 1,
            ..Default::default()
        });
        let result = sandbox.run("sleep", &["10"], None).await.unwrap();
        assert!(!result.success);
        assert!(result.timed_out);
    }

    #[tokio::test]
    async fn test_env_is_sanitized() {
        std::env::set_var("NEO_SANDBOX_SECRET", "leaky");
        let sandbox = Sandbox::default();
        let result = sandbox.run("env", &[], None).await.unwrap();
        assert!(!result.stdout.contains("NEO_SANDBOX_SECRET"));
        std::env::remove_var("NEO_SANDBOX_SECRET");
    }

    #[tokio::test]
    async fn test_stdin_feed() {
        let sandbox = Sandbox::default();
        let result = sandbox.run("cat", &[], Some("piped input")).await.unwrap();
        assert!(result.success);
        assert_eq!(result.stdout, "piped input");
    }

    #[tokio::test]
    async fn test_missing_program_errors() {
        let sandbox = Sandbox::default();
        assert!(sandbox
            .run("definitely_not_a_real_binary_xyz", &[], None)
            .await
            .is_err());
    }
}
