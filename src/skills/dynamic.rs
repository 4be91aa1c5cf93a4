//! Dynamic Skill Host
//!
//! A dynamic skill is a Python file on disk exposing
//! `run(arguments: dict) -> dict` and `get_tool_definition() -> dict`.
//! The host never imports such code into the agent process: both entry
//! points execute through the subprocess sandbox, and the child's stdout
//! carries the JSON result.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::registry::Skill;
use super::sandbox::{Sandbox, SandboxConfig};

const PYTHON: &str = "python3";

/// Harness that loads a skill file and prints its tool definition
const DEFINITION_HARNESS: &str = r#"
import json, runpy, sys
mod = runpy.run_path(sys.argv[1])
print(json.dumps(mod["get_tool_definition"]()))
"#;

/// Harness that loads a skill file and invokes run() with JSON arguments
const RUN_HARNESS: &str = r#"
import json, runpy, sys
mod = runpy.run_path(sys.argv[1])
result = mod["run"](json.loads(sys.argv[2]))
print(json.dumps(result if isinstance(result, dict) else {"result": result}))
"#;

/// Harness that syntax-checks source fed on stdin
const COMPILE_HARNESS: &str = r#"
import sys
compile(sys.stdin.read(), "<skill>", "exec")
"#;

/// A registry-installable skill backed by a Python file
pub struct DynamicSkill {
    path: PathBuf,
    schema: Value,
    sandbox: Sandbox,
}

impl DynamicSkill {
    /// Load a skill file: check the entry-point markers, then probe its
    /// tool definition through the sandbox
    ///
    /// Fails uniformly (no panics, no process-level fallout) when the file
    /// cannot produce a valid schema.
    pub async fn load(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read skill file {}", path.display()))?;
        for marker in ["def run(", "def get_tool_definition("] {
            if !source.contains(marker) {
                bail!("skill file {} is missing `{}`", path.display(), marker);
            }
        }

        let sandbox = Sandbox::new(SandboxConfig::strict());

        let result = sandbox
            .run(
                PYTHON,
                &[
                    "-c",
                    DEFINITION_HARNESS,
                    path.to_str().context("non-UTF-8 skill path")?,
                ],
                None,
            )
            .await?;

        if !result.success {
            bail!(
                "skill file {} failed schema probe: {}",
                path.display(),
                result.stderr.trim()
            );
        }

        let schema: Value = serde_json::from_str(result.stdout.trim())
            .with_context(|| format!("skill file {} returned invalid schema JSON", path.display()))?;

        debug!("Loaded dynamic skill from {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            schema,
            sandbox: Sandbox::new(SandboxConfig::default()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl Skill for DynamicSkill {
    fn definition(&self) -> Value {
        self.schema.clone()
    }

    async fn invoke(&self, args: Value) -> Value {
        let path = match self.path.to_str() {
            Some(p) => p,
            None => {
                return serde_json::json!({"success": false, "error": "non-UTF-8 skill path"})
            }
        };
        let args_json = args.to_string();

        let result = match self
            .sandbox
            .run(PYTHON, &["-c", RUN_HARNESS, path, args_json.as_str()], None)
            .await
        {
            Ok(r) => r,
            Err(e) => {
                return serde_json::json!({"success": false, "error": format!("skill spawn failed: {}", e)})
            }
        };

        if !result.success {
            let reason = if result.timed_out {
                "skill execution timed out".to_string()
            } else {
                format!("skill execution failed: {}", result.stderr.trim())
            };
            return serde_json::json!({"success": false, "error": reason});
        }

        serde_json::from_str(result.stdout.trim()).unwrap_or_else(|_| {
            serde_json::json!({
                "success": false,
                "error": "skill returned non-JSON output",
                "raw": result.stdout.trim(),
            })
        })
    }
}

/// Check whether a python3 interpreter is reachable
pub async fn interpreter_available() -> bool {
    Sandbox::new(SandboxConfig::strict())
        .run(PYTHON, &["--version"], None)
        .await
        .map(|r| r.success)
        .unwrap_or(false)
}

/// Syntax-check skill source; `Ok(None)` means the check ran clean,
/// `Ok(Some(err))` carries the syntax error.
///
/// Returns `Ok(None)` with a warning when no interpreter is available;
/// the textual validation stages still apply.
pub async fn compile_check(code: &str) -> Result<Option<String>> {
    let sandbox = Sandbox::new(SandboxConfig::strict());

    let result = match sandbox.run(PYTHON, &["-c", COMPILE_HARNESS], Some(code)).await {
        Ok(r) => r,
        Err(e) => {
            warn!("python3 unavailable, skipping syntax check: {}", e);
            return Ok(None);
        }
    };

    if result.success {
        Ok(None)
    } else {
        Ok(Some(result.stderr.trim().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const VALID_SKILL: &str = r#"
def get_tool_definition():
    return {
        "type": "function",
        "function": {
            "name": "echo_skill",
            "description": "Echo the input back",
            "parameters": {
                "type": "object",
                "properties": {"text": {"type": "string", "description": "text"}},
                "required": ["text"],
            },
        },
    }

def run(arguments):
    return {"success": True, "echo": arguments.get("text", "")}
"#;

    #[tokio::test]
    async fn test_load_and_invoke() {
        if !interpreter_available().await {
            return;
        }

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("echo_skill.py");
        std::fs::write(&path, VALID_SKILL).unwrap();

        let skill = DynamicSkill::load(&path).await.unwrap();
        assert_eq!(
            crate::skills::schema::function_name(&skill.definition()),
            Some("echo_skill")
        );

        let result = skill.invoke(serde_json::json!({"text": "hi"})).await;
        assert_eq!(result["echo"], "hi");
    }

    #[tokio::test]
    async fn test_load_rejects_broken_file() {
        if !interpreter_available().await {
            return;
        }

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.py");
        std::fs::write(&path, "this is not python ((((").unwrap();

        assert!(DynamicSkill::load(&path).await.is_err());
    }

    #[tokio::test]
    async fn test_compile_check_flags_syntax_errors() {
        if !interpreter_available().await {
            return;
        }

        assert!(compile_check("def run(arguments):\n    return {}")
            .await
            .unwrap()
            .is_none());
        assert!(compile_check("def run(:\n").await.unwrap().is_some());
    }
}
