//! Restricted subprocess execution.
//!
//! Commands run under `bash -r` with a cleared environment and a PATH
//! restricted to a single directory. Command substitution syntax and
//! backticks are escaped out of the command line before it reaches the
//! shell.

use std::process::Command;
use std::sync::OnceLock;

use indexmap::IndexMap;
use regex::Regex;
use tracing::debug;

use recon_core::ProcessSettings;

use crate::error::CommandError;

fn command_substitution_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\$\([^)]+\)+").expect("valid pattern"))
}

/// Runs command lines in a restricted shell and captures their output.
pub struct ProcessRunner {
    restricted_path: String,
}

impl ProcessRunner {
    #[must_use]
    pub fn new(settings: &ProcessSettings) -> Self {
        Self {
            restricted_path: settings.restricted_path.clone(),
        }
    }

    /// Escape command substitution syntax and backticks so rendered values
    /// cannot smuggle subcommands into the shell.
    pub fn escape(command: &str) -> String {
        let escaped =
            command_substitution_pattern().replace_all(command, |caps: &regex::Captures<'_>| {
                caps[0]
                    .replace('$', r"\$")
                    .replace('(', r"\(")
                    .replace(')', r"\)")
            });
        escaped.replace('`', r"\`")
    }

    /// Run a command line, returning the merged stdout and stderr.
    ///
    /// The subprocess sees only PATH and the supplied variables. Output
    /// lines are trimmed and stripped of non-ASCII characters. A non-zero
    /// exit status is an error carrying the captured output.
    pub fn run(
        &self,
        command_line: &str,
        env: &IndexMap<String, String>,
    ) -> Result<String, CommandError> {
        let escaped = Self::escape(command_line);
        debug!(command = %escaped, "running restricted shell command");

        let output = Command::new("bash")
            .arg("-r")
            .arg("-c")
            .arg(&escaped)
            .env_clear()
            .env("PATH", &self.restricted_path)
            .envs(env)
            .output()
            .map_err(|e| {
                CommandError::process_io_with_source(command_line, "failed to spawn process", e)
            })?;

        let merged = Self::merge_output(&output.stdout, &output.stderr);
        if !output.status.success() {
            return Err(CommandError::ProcessFailed {
                command: command_line.to_string(),
                output: merged,
                exit_code: output.status.code().unwrap_or(-1),
            });
        }
        Ok(merged)
    }

    fn merge_output(stdout: &[u8], stderr: &[u8]) -> String {
        let mut lines = Vec::new();
        for stream in [stdout, stderr] {
            let text = String::from_utf8_lossy(stream);
            for line in text.lines() {
                let cleaned: String = line.trim().chars().filter(char::is_ascii).collect();
                if !cleaned.is_empty() {
                    lines.push(cleaned);
                }
            }
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runner() -> ProcessRunner {
        ProcessRunner::new(&ProcessSettings::default())
    }

    #[test]
    fn test_escape_command_substitution() {
        assert_eq!(
            ProcessRunner::escape("echo $(rm -rf /)"),
            r"echo \$\(rm -rf /\)"
        );
    }

    #[test]
    fn test_escape_backticks() {
        assert_eq!(ProcessRunner::escape("echo `whoami`"), r"echo \`whoami\`");
    }

    #[test]
    fn test_escape_leaves_plain_commands_untouched() {
        assert_eq!(ProcessRunner::escape("echo hello"), "echo hello");
    }

    #[test]
    fn test_run_captures_trimmed_output() {
        let output = runner().run("echo '  hello  '", &IndexMap::new()).unwrap();
        assert_eq!(output, "hello");
    }

    #[test]
    fn test_run_env_variable_passed_through() {
        let mut env = IndexMap::new();
        env.insert("GREETING".to_string(), "hi".to_string());
        let output = runner().run("printenv GREETING", &env).unwrap();
        assert_eq!(output, "hi");
    }

    #[test]
    fn test_run_nonzero_exit_is_error() {
        let err = runner().run("false", &IndexMap::new()).unwrap_err();
        match err {
            CommandError::ProcessFailed { exit_code, .. } => assert_eq!(exit_code, 1),
            other => panic!("unexpected error: {other}"),
        }
    }
}
