//! Local process execution backend.
//!
//! Treats the route's image reference as a command line (or looks it up in
//! an explicit image → command table), runs it with the built environment,
//! streams stdout into the bounded buffer and stderr into the log sink.

use crate::runner::backend::{ExecutionBackend, ExecutionError, ExecutionRequest, ExecutionResult};
use crate::runner::output::OutputBuffer;
use async_trait::async_trait;
use std::collections::HashMap;
use std::io::{self, Write};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{ChildStderr, ChildStdout, Command};
use tracing::{debug, warn};

/// Runs each invocation as a child process.
///
/// The child is killed when the invocation future is dropped, when it runs
/// past the request timeout, or when its output exceeds the buffer limit.
#[derive(Debug, Clone)]
pub struct CommandBackend {
    commands: HashMap<String, Vec<String>>,
    inherit_env: Vec<String>,
}

impl Default for CommandBackend {
    fn default() -> Self {
        Self {
            commands: HashMap::new(),
            inherit_env: vec!["PATH".to_string()],
        }
    }
}

impl CommandBackend {
    /// Create a backend that runs image references as command lines.
    pub fn new() -> Self {
        Self::default()
    }

    /// Map an image reference to an explicit argv.
    pub fn command(mut self, image: impl Into<String>, argv: Vec<String>) -> Self {
        self.commands.insert(image.into(), argv);
        self
    }

    /// Pass a variable of the gateway's own environment through to functions.
    pub fn inherit_env(mut self, name: impl Into<String>) -> Self {
        self.inherit_env.push(name.into());
        self
    }

    fn argv(&self, image: &str) -> Result<Vec<String>, ExecutionError> {
        let argv = match self.commands.get(image) {
            Some(argv) => argv.clone(),
            None => image.split_whitespace().map(str::to_string).collect(),
        };
        if argv.is_empty() {
            return Err(ExecutionError::new(format!(
                "no command for image '{}'",
                image
            )));
        }
        Ok(argv)
    }
}

#[async_trait]
impl ExecutionBackend for CommandBackend {
    async fn run(&self, request: ExecutionRequest) -> Result<ExecutionResult, ExecutionError> {
        let argv = self.argv(&request.image)?;

        let mut command = Command::new(&argv[0]);
        command
            .args(&argv[1..])
            .env_clear()
            .envs(
                self.inherit_env
                    .iter()
                    .filter_map(|name| std::env::var(name).ok().map(|v| (name.clone(), v))),
            )
            .envs(&request.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(
            request_id = %request.id,
            app = %request.app_name,
            image = %request.image,
            memory = request.memory,
            "Spawning function process"
        );
        let mut child = command.spawn()?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ExecutionError::new("child stdout was not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ExecutionError::new("child stderr was not captured"))?;

        let logs = tokio::spawn(forward_lines(stderr, request.stderr));
        let output = request.stdout;

        let finished = tokio::time::timeout(request.timeout, async {
            let within_limit = copy_output(stdout, &output).await?;
            if !within_limit {
                warn!(request_id = %request.id, limit = output.limit(), "Function output too large, killing process");
                child.start_kill()?;
            }
            let status = child.wait().await?;
            Ok::<_, io::Error>((within_limit, status))
        })
        .await;

        match finished {
            Err(_) => {
                warn!(request_id = %request.id, timeout = ?request.timeout, "Function process timed out");
                let _ = child.start_kill();
                Ok(ExecutionResult::timeout())
            }
            Ok(Err(err)) => {
                let _ = child.start_kill();
                Err(err.into())
            }
            Ok(Ok((within_limit, status))) => {
                // stderr closes once the process is gone.
                let _ = logs.await;
                if within_limit && status.success() {
                    Ok(ExecutionResult::success())
                } else {
                    Ok(ExecutionResult::error(status.code()))
                }
            }
        }
    }
}

/// Copy stdout into `sink`. Returns `false` once the sink refuses a chunk.
async fn copy_output(mut stdout: ChildStdout, sink: &OutputBuffer) -> io::Result<bool> {
    let mut buf = [0u8; 8192];
    loop {
        let n = stdout.read(&mut buf).await?;
        if n == 0 {
            return Ok(true);
        }
        if sink.append(&buf[..n]).is_err() {
            return Ok(false);
        }
    }
}

async fn forward_lines(stderr: ChildStderr, mut log: Box<dyn Write + Send>) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if writeln!(log, "{}", line).is_err() {
            break;
        }
    }
    let _ = log.flush();
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::runner::backend::RunStatus;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn request(image: &str, limit: usize, timeout: Duration) -> (ExecutionRequest, OutputBuffer, Captured) {
        let stdout = OutputBuffer::new(limit);
        let stderr = Captured::default();
        let mut env = HashMap::new();
        env.insert("GREETING".to_string(), "hi".to_string());
        let request = ExecutionRequest {
            image: image.to_string(),
            timeout,
            id: "req-1".to_string(),
            app_name: "demo".to_string(),
            memory: 128,
            env,
            stdout: stdout.clone(),
            stderr: Box::new(stderr.clone()),
        };
        (request, stdout, stderr)
    }

    fn sh(script: &str) -> CommandBackend {
        CommandBackend::new().command(
            "img",
            vec!["sh".to_string(), "-c".to_string(), script.to_string()],
        )
    }

    #[tokio::test]
    async fn test_captures_stdout_and_env() {
        let backend = sh("printf '%s' \"$GREETING\"; echo oops >&2");
        let (req, stdout, stderr) = request("img", 1024, Duration::from_secs(10));

        let result = backend.run(req).await.unwrap();
        assert!(result.is_success());
        assert_eq!(&stdout.take()[..], b"hi");
        assert_eq!(&stderr.0.lock().unwrap()[..], b"oops\n");
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_error() {
        let backend = sh("exit 3");
        let (req, _, _) = request("img", 1024, Duration::from_secs(10));

        let result = backend.run(req).await.unwrap();
        assert_eq!(result.status, RunStatus::Error);
        assert_eq!(result.exit_code, Some(3));
    }

    #[tokio::test]
    async fn test_output_limit_kills_process() {
        let backend = sh("while true; do echo xxxxxxxxxxxxxxxx; done");
        let (req, stdout, _) = request("img", 64, Duration::from_secs(10));

        let result = backend.run(req).await.unwrap();
        assert!(!result.is_success());
        assert!(stdout.overflowed());
        assert!(stdout.len() <= 64);
    }

    #[tokio::test]
    async fn test_timeout() {
        let backend = sh("sleep 5");
        let (req, _, _) = request("img", 64, Duration::from_millis(100));

        let result = backend.run(req).await.unwrap();
        assert_eq!(result.status, RunStatus::Timeout);
    }

    #[tokio::test]
    async fn test_image_as_command_line() {
        let backend = CommandBackend::new();
        let (req, stdout, _) = request("echo hello world", 64, Duration::from_secs(10));

        let result = backend.run(req).await.unwrap();
        assert!(result.is_success());
        assert_eq!(&stdout.take()[..], b"hello world\n");
    }

    #[tokio::test]
    async fn test_empty_image_rejected() {
        let backend = CommandBackend::new();
        let (req, _, _) = request("   ", 64, Duration::from_secs(1));

        assert!(backend.run(req).await.is_err());
    }
}
