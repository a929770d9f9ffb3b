//! External command execution.
//!
//! Every system tool mon2cam drives (`pactl`, `xrandr`, `modprobe`, ...) goes
//! through [`CommandRunner`], so the audio and video layers can be exercised
//! against scripted runners in tests.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use regex::Regex;
use std::io;
use std::process::Stdio;
use std::sync::OnceLock;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tracing::debug;
use uuid::Uuid;
use which::which;

/// What to do with a command's standard output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// Run the command and discard its output
    None,
    /// Print the output as it arrives
    StdOut,
    /// Collect the output and return it
    #[default]
    Capture,
    /// Print and collect
    Tee,
}

impl OutputMode {
    fn echoes(self) -> bool {
        matches!(self, OutputMode::StdOut | OutputMode::Tee)
    }

    fn captures(self) -> bool {
        matches!(self, OutputMode::Capture | OutputMode::Tee)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ExecOptions {
    pub output: OutputMode,
    /// Trace the command, its tokens and its result at debug level
    pub verbose: bool,
}

impl ExecOptions {
    pub fn capture(verbose: bool) -> Self {
        Self {
            output: OutputMode::Capture,
            verbose,
        }
    }

    pub fn quiet() -> Self {
        Self {
            output: OutputMode::None,
            verbose: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutput {
    /// Exit code, `None` when the process was killed by a signal
    pub code: Option<i32>,
    pub success: bool,
    /// Captured stdout, trimmed. Empty unless the output mode captures.
    pub output: String,
    pub stderr: String,
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `command` to completion.
    ///
    /// An `Err` means the process could not be started at all; a process that
    /// ran and failed is reported through [`ExecOutput::success`].
    async fn run(&self, command: &str, options: ExecOptions) -> io::Result<ExecOutput>;
}

/// Runs commands as real child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, command: &str, options: ExecOptions) -> io::Result<ExecOutput> {
        let tokens = split_command(command);
        let (program, args) = tokens
            .split_first()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty command"))?;

        let context = options.verbose.then(Uuid::new_v4);
        if let Some(id) = context {
            debug!("Exec context {}: {:?}", id, options);
            debug!("Exec context {}: command `{}`", id, command);
            debug!("Exec context {}: tokens {:?}", id, tokens);
        }

        let mut child = tokio::process::Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let read_stdout = async {
            let mut captured = String::new();
            if let Some(stdout) = stdout {
                // Device descriptions are not guaranteed to be valid UTF-8.
                let mut segments = BufReader::new(stdout).split(b'\n');
                while let Some(segment) = segments.next_segment().await? {
                    let line = String::from_utf8_lossy(&segment);
                    let line = line.strip_suffix('\r').unwrap_or(&line);
                    if options.output.echoes() {
                        println!("{line}");
                    }
                    if options.output.captures() {
                        captured.push_str(&line);
                        captured.push('\n');
                    }
                }
            }
            Ok::<_, io::Error>(captured)
        };

        let read_stderr = async {
            let mut buf = Vec::new();
            if let Some(mut stderr) = stderr {
                stderr.read_to_end(&mut buf).await?;
            }
            Ok::<_, io::Error>(String::from_utf8_lossy(&buf).into_owned())
        };

        let (captured, stderr) = tokio::try_join!(read_stdout, read_stderr)?;
        let status = child.wait().await?;

        let result = ExecOutput {
            code: status.code(),
            success: status.success(),
            output: captured.trim().to_string(),
            stderr: stderr.trim().to_string(),
        };

        if let Some(id) = context {
            debug!(
                "Exec context {}: exit {:?}, {} bytes captured",
                id,
                result.code,
                result.output.len()
            );
            if !result.stderr.is_empty() {
                debug!("Exec context {}: stderr: {}", id, result.stderr);
            }
        }

        Ok(result)
    }
}

fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?:[^\s"]+|"[^"]*")+"#).expect("token pattern is valid")
    })
}

/// Split a command line on whitespace, keeping double-quoted segments intact.
///
/// A token that is entirely quoted loses its quotes; quotes embedded in a
/// token (`key="a b"`) are kept for the receiving tool to interpret.
pub fn split_command(command: &str) -> Vec<String> {
    token_pattern()
        .find_iter(command)
        .map(|m| {
            let token = m.as_str();
            if token.len() >= 2
                && token.starts_with('"')
                && token.ends_with('"')
                && token[1..token.len() - 1].find('"').is_none()
            {
                token[1..token.len() - 1].to_string()
            } else {
                token.to_string()
            }
        })
        .collect()
}

/// Fail with "<tool> not installed" for the first tool missing from `PATH`.
pub fn ensure_tools(tools: &[&str]) -> Result<()> {
    for tool in tools {
        if which(tool).is_err() {
            return Err(anyhow!("{} not installed", tool));
        }
        debug!("Found required tool: {}", tool);
    }
    Ok(())
}

#[cfg(test)]
pub mod testing {
    //! Scripted runner shared by the unit tests of the audio and video layers.

    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replies to commands by prefix and records every command it was given.
    #[derive(Default)]
    pub struct FakeRunner {
        replies: Mutex<Vec<(String, VecDeque<ExecOutput>)>>,
        calls: Mutex<Vec<String>>,
    }

    pub fn ok(output: &str) -> ExecOutput {
        ExecOutput {
            code: Some(0),
            success: true,
            output: output.trim().to_string(),
            stderr: String::new(),
        }
    }

    pub fn failed(code: i32) -> ExecOutput {
        ExecOutput {
            code: Some(code),
            success: false,
            output: String::new(),
            stderr: "Failure: No such entity".to_string(),
        }
    }

    impl FakeRunner {
        pub fn new() -> Self {
            Self::default()
        }

        /// Queue a reply for the next command starting with `prefix`.
        /// The last queued reply for a prefix is repeated once the queue runs dry.
        pub fn reply(&self, prefix: &str, output: ExecOutput) -> &Self {
            let mut replies = self.replies.lock().unwrap();
            match replies.iter_mut().find(|(p, _)| p == prefix) {
                Some((_, queue)) => queue.push_back(output),
                None => replies.push((prefix.to_string(), VecDeque::from([output]))),
            }
            self
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        pub fn calls_starting_with(&self, prefix: &str) -> Vec<String> {
            self.calls()
                .into_iter()
                .filter(|c| c.starts_with(prefix))
                .collect()
        }
    }

    #[async_trait]
    impl CommandRunner for FakeRunner {
        async fn run(&self, command: &str, _options: ExecOptions) -> io::Result<ExecOutput> {
            self.calls.lock().unwrap().push(command.to_string());

            let mut replies = self.replies.lock().unwrap();
            let entry = replies
                .iter_mut()
                .filter(|(prefix, _)| command.starts_with(prefix.as_str()))
                .max_by_key(|(prefix, _)| prefix.len());

            match entry {
                Some((_, queue)) if queue.len() > 1 => Ok(queue.pop_front().unwrap()),
                Some((_, queue)) => Ok(queue.front().cloned().unwrap()),
                None => Err(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no scripted reply for `{command}`"),
                )),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_plain_command() {
        assert_eq!(
            split_command("pactl list   sinks"),
            vec!["pactl", "list", "sinks"]
        );
    }

    #[test]
    fn test_split_keeps_embedded_quotes() {
        assert_eq!(
            split_command(r#"pactl load-module module-null-sink sink_name="VirtualSinkMIC""#),
            vec![
                "pactl",
                "load-module",
                "module-null-sink",
                r#"sink_name="VirtualSinkMIC""#
            ]
        );
    }

    #[test]
    fn test_split_strips_fully_quoted_token() {
        assert_eq!(
            split_command(r#"modprobe v4l2loopback "card_label=Mon 2 Cam""#),
            vec!["modprobe", "v4l2loopback", "card_label=Mon 2 Cam"]
        );
    }

    #[test]
    fn test_split_empty() {
        assert!(split_command("   ").is_empty());
    }

    #[test]
    fn test_output_mode_flags() {
        assert!(OutputMode::Tee.echoes() && OutputMode::Tee.captures());
        assert!(!OutputMode::None.echoes() && !OutputMode::None.captures());
        assert!(OutputMode::Capture.captures() && !OutputMode::Capture.echoes());
        assert_eq!(OutputMode::default(), OutputMode::Capture);
    }

    #[tokio::test]
    async fn test_system_runner_captures_output() {
        let result = SystemRunner
            .run("echo hello", ExecOptions::capture(false))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.code, Some(0));
        assert_eq!(result.output, "hello");
    }

    #[tokio::test]
    async fn test_system_runner_replaces_invalid_utf8() {
        let result = SystemRunner
            .run(r"printf \377ok\nnext", ExecOptions::capture(false))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.output, "\u{FFFD}ok\nnext");
    }

    #[tokio::test]
    async fn test_system_runner_reports_failure() {
        let result = SystemRunner
            .run("false", ExecOptions::capture(true))
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.code, Some(1));
    }

    #[tokio::test]
    async fn test_system_runner_missing_binary() {
        let err = SystemRunner
            .run("mon2cam-definitely-missing-binary", ExecOptions::quiet())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_ensure_tools_reports_missing() {
        let err = ensure_tools(&["mon2cam-definitely-missing-binary"]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "mon2cam-definitely-missing-binary not installed"
        );
    }
}
