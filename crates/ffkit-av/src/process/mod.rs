//! Process orchestration for engine invocations.
//!
//! An [`Invocation`] spawns one executable, feeds an optional input stream
//! into its stdin, routes stdout to a sink or a line buffer, turns stderr
//! into lines for telemetry, and resolves to a single outcome once the
//! process has exited and its pipes have drained.

mod completion;
mod decode;

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{Error, ProcessFailure, Result};
use crate::session::{BoxedReader, BoxedWriter, PipeOptions};
use crate::telemetry::{extract_error, LineCallback, TelemetryRing};

use completion::{Barrier, Latch};
use decode::Utf8Decoder;

/// Default number of output lines kept in memory.
pub const DEFAULT_STDOUT_LINES: usize = 100;

const CHUNK_SIZE: usize = 8192;

/// Options applied to every process a session launches.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOptions {
    /// Scheduling priority passed to `nice` on unix (0 leaves it alone).
    pub niceness: i32,
    pub timeout: Option<Duration>,
    /// Lines of stdout and stderr kept in memory (0 keeps everything).
    pub stdout_lines: usize,
    pub cwd: Option<PathBuf>,
    pub envs: Vec<(String, String)>,
    /// Check formats and codecs against the engine before spawning.
    pub validate_capabilities: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            niceness: 0,
            timeout: None,
            stdout_lines: DEFAULT_STDOUT_LINES,
            cwd: None,
            envs: Vec::new(),
            validate_capabilities: true,
        }
    }
}

/// Text captured from a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Captured {
    /// Captured stdout; empty when stdout went to a sink.
    pub stdout: String,
    pub stderr: String,
}

/// A single process launch.
///
/// # Example
///
/// ```no_run
/// use ffkit_av::process::Invocation;
///
/// # async fn example() -> ffkit_av::Result<()> {
/// let captured = Invocation::new("ffmpeg", "/usr/bin/ffmpeg")
///     .arg("-formats")
///     .capture_stdout(true)
///     .stdout_lines(0)
///     .execute()
///     .await?;
/// println!("{}", captured.stdout);
/// # Ok(())
/// # }
/// ```
pub struct Invocation {
    tool: String,
    program: PathBuf,
    args: Vec<String>,
    options: RunOptions,
    capture_stdout: bool,
    input: Option<BoxedReader>,
    output: Option<(BoxedWriter, PipeOptions)>,
    stderr_subscribers: Vec<LineCallback>,
    cancel: Option<CancellationToken>,
}

impl std::fmt::Debug for Invocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Invocation")
            .field("tool", &self.tool)
            .field("program", &self.program)
            .field("args", &self.args)
            .field("options", &self.options)
            .field("capture_stdout", &self.capture_stdout)
            .field("input", &self.input.is_some())
            .field("output", &self.output.is_some())
            .finish_non_exhaustive()
    }
}

impl Invocation {
    /// Create an invocation of `program`, reported as `tool` in errors.
    pub fn new(tool: impl Into<String>, program: impl Into<PathBuf>) -> Self {
        Self {
            tool: tool.into(),
            program: program.into(),
            args: Vec::new(),
            options: RunOptions::default(),
            capture_stdout: false,
            input: None,
            output: None,
            stderr_subscribers: Vec::new(),
            cancel: None,
        }
    }

    pub fn arg(&mut self, arg: impl Into<String>) -> &mut Self {
        self.args.push(arg.into());
        self
    }

    pub fn args(&mut self, args: impl IntoIterator<Item = impl Into<String>>) -> &mut Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Apply niceness, timeout, line limit, working directory and
    /// environment from `options`.
    pub fn options(&mut self, options: &RunOptions) -> &mut Self {
        self.options = options.clone();
        self
    }

    pub fn timeout(&mut self, timeout: Duration) -> &mut Self {
        self.options.timeout = Some(timeout);
        self
    }

    pub fn stdout_lines(&mut self, lines: usize) -> &mut Self {
        self.options.stdout_lines = lines;
        self
    }

    /// Keep stdout text in the returned [`Captured`].
    pub fn capture_stdout(&mut self, capture: bool) -> &mut Self {
        self.capture_stdout = capture;
        self
    }

    /// Pump `reader` into the process's stdin.
    pub fn input(&mut self, reader: impl AsyncRead + Send + Unpin + 'static) -> &mut Self {
        self.input = Some(Box::new(reader));
        self
    }

    pub(crate) fn input_boxed(&mut self, reader: BoxedReader) -> &mut Self {
        self.input = Some(reader);
        self
    }

    /// Pump the process's stdout into `writer` instead of capturing it.
    pub fn output(&mut self, writer: BoxedWriter, pipe: PipeOptions) -> &mut Self {
        self.output = Some((writer, pipe));
        self
    }

    /// Receive every stderr line as it completes.
    pub fn on_stderr_line(&mut self, callback: impl FnMut(&str) + Send + 'static) -> &mut Self {
        self.stderr_subscribers.push(Box::new(callback));
        self
    }

    /// Kill the process when `token` is cancelled.
    pub fn cancel_token(&mut self, token: CancellationToken) -> &mut Self {
        self.cancel = Some(token);
        self
    }

    /// The program and arguments as they will be spawned.
    pub fn command_line(&self) -> Vec<String> {
        let mut line = Vec::with_capacity(self.args.len() + 4);
        if cfg!(unix) && self.options.niceness != 0 {
            line.push("nice".to_string());
            line.push("-n".to_string());
            line.push(self.options.niceness.to_string());
        }
        line.push(self.program.display().to_string());
        line.extend(self.args.iter().cloned());
        line
    }

    fn command(&self) -> Command {
        let line = self.command_line();
        let mut cmd = Command::new(&line[0]);
        cmd.args(&line[1..]);
        if let Some(cwd) = &self.options.cwd {
            cmd.current_dir(cwd);
        }
        cmd.envs(self.options.envs.iter().map(|(k, v)| (k, v)));
        cmd.stdin(if self.input.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });
        cmd.stdout(if self.capture_stdout || self.output.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);
        cmd
    }

    /// Run the process to completion.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Process`] carrying the captured output when the
    /// process cannot be spawned, exits unsuccessfully, times out, is killed,
    /// or one of its streams fails.
    pub async fn execute(&mut self) -> Result<Captured> {
        let mut cmd = self.command();
        debug!("spawning {}", self.command_line().join(" "));

        let mut child = cmd.spawn().map_err(|source| {
            Error::process(
                ProcessFailure::Spawn {
                    tool: self.tool.clone(),
                    source,
                },
                String::new(),
                String::new(),
            )
        })?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let mut stdout_ring = TelemetryRing::new(self.options.stdout_lines);
        let mut stderr_ring = TelemetryRing::new(self.options.stdout_lines);
        for callback in self.stderr_subscribers.drain(..) {
            stderr_ring.subscribe(callback);
        }

        let kill = match &self.cancel {
            Some(token) => token.child_token(),
            None => CancellationToken::new(),
        };
        let latch = Latch::default();
        let timeout = self.options.timeout;
        let input = self.input.take();
        let sink = self.output.take();
        let has_stdout = stdout.is_some();

        let status = {
            let exit = wait_child(&mut child, &kill);
            let stdin_pump = pump_stdin(input, stdin, &latch, &kill);
            let stdout_pump = pump_stdout(stdout, sink, &mut stdout_ring, &latch, &kill);
            let stderr_pump = pump_lines(stderr, &mut stderr_ring);
            let deadline = tokio::time::sleep(timeout.unwrap_or_default());
            tokio::pin!(exit, stdin_pump, stdout_pump, stderr_pump, deadline);

            let mut barrier = Barrier::new(if has_stdout { 3 } else { 2 });
            let mut status = None;
            let mut exited = false;
            let mut stdout_done = !has_stdout;
            let mut stderr_done = false;
            let mut stdin_done = false;
            let mut timer_armed = timeout.is_some();

            while !barrier.is_complete() {
                tokio::select! {
                    result = &mut exit, if !exited => {
                        exited = true;
                        status = Some(result);
                        barrier.signal();
                    }
                    _ = &mut stderr_pump, if !stderr_done => {
                        stderr_done = true;
                        barrier.signal();
                    }
                    _ = &mut stdout_pump, if !stdout_done => {
                        stdout_done = true;
                        barrier.signal();
                    }
                    _ = &mut stdin_pump, if !stdin_done => {
                        stdin_done = true;
                    }
                    _ = &mut deadline, if timer_armed && !exited => {
                        timer_armed = false;
                        if let Some(limit) = timeout {
                            warn!("{} ran into a timeout after {:?}", self.tool, limit);
                            latch.fire(ProcessFailure::Timeout(limit));
                        }
                        kill.cancel();
                    }
                }
            }
            status
        };

        let captured = Captured {
            stdout: if self.capture_stdout {
                stdout_ring.get()
            } else {
                String::new()
            },
            stderr: stderr_ring.get(),
        };

        if let Some(failure) = latch.take() {
            return Err(Error::process(failure, captured.stdout, captured.stderr));
        }

        let status = match status {
            Some(Ok(status)) => status,
            Some(Err(err)) => return Err(Error::Io(err)),
            None => return Err(Error::Io(std::io::Error::other("process status lost"))),
        };

        if status.success() {
            debug!("{} finished successfully", self.tool);
            return Ok(captured);
        }

        let failure = exit_failure(&self.tool, status, &captured.stderr);
        Err(Error::process(failure, captured.stdout, captured.stderr))
    }
}

fn exit_failure(tool: &str, status: ExitStatus, stderr: &str) -> ProcessFailure {
    if let Some(code) = status.code() {
        return ProcessFailure::ExitCode {
            tool: tool.to_string(),
            code,
            message: extract_error(stderr),
        };
    }

    #[cfg(unix)]
    let signal = {
        use std::os::unix::process::ExitStatusExt;
        status.signal().unwrap_or_default()
    };
    #[cfg(not(unix))]
    let signal = 0;

    ProcessFailure::Signal {
        tool: tool.to_string(),
        signal,
    }
}

async fn wait_child(child: &mut Child, kill: &CancellationToken) -> std::io::Result<ExitStatus> {
    tokio::select! {
        status = child.wait() => status,
        _ = kill.cancelled() => {
            if let Err(err) = child.start_kill() {
                debug!("kill failed: {err}");
            }
            child.wait().await
        }
    }
}

fn is_benign_pipe_error(err: &std::io::Error) -> bool {
    use std::io::ErrorKind;
    matches!(
        err.kind(),
        ErrorKind::BrokenPipe | ErrorKind::ConnectionReset | ErrorKind::UnexpectedEof
    )
}

async fn pump_stdin(
    input: Option<BoxedReader>,
    stdin: Option<ChildStdin>,
    latch: &Latch,
    kill: &CancellationToken,
) {
    let (Some(mut input), Some(mut stdin)) = (input, stdin) else {
        return;
    };
    let mut buf = vec![0u8; CHUNK_SIZE];

    loop {
        let n = match input.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) => {
                latch.fire(ProcessFailure::InputStream(err));
                kill.cancel();
                return;
            }
        };
        if let Err(err) = stdin.write_all(&buf[..n]).await {
            if is_benign_pipe_error(&err) {
                debug!("process closed stdin: {err}");
            } else {
                warn!("stopped feeding stdin: {err}");
            }
            return;
        }
    }

    if let Err(err) = stdin.shutdown().await {
        debug!("closing stdin: {err}");
    }
}

async fn pump_stdout(
    stdout: Option<ChildStdout>,
    sink: Option<(BoxedWriter, PipeOptions)>,
    ring: &mut TelemetryRing,
    latch: &Latch,
    kill: &CancellationToken,
) {
    let Some(mut stdout) = stdout else {
        return;
    };
    let Some((mut sink, pipe)) = sink else {
        pump_lines(Some(stdout), ring).await;
        return;
    };

    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = match stdout.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) => {
                warn!("reading stdout: {err}");
                break;
            }
        };
        if let Err(err) = sink.write_all(&buf[..n]).await {
            latch.fire(ProcessFailure::OutputStream(err));
            kill.cancel();
            return;
        }
    }

    let finished = if pipe.end {
        sink.shutdown().await
    } else {
        sink.flush().await
    };
    if let Err(err) = finished {
        latch.fire(ProcessFailure::OutputStream(err));
        kill.cancel();
    }
}

/// Decode a pipe into `ring` line by line, closing it at end of stream.
async fn pump_lines<R: AsyncRead + Unpin>(reader: Option<R>, ring: &mut TelemetryRing) {
    if let Some(mut reader) = reader {
        let mut decoder = Utf8Decoder::default();
        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            match reader.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => ring.append(&decoder.decode(&buf[..n])),
                Err(err) => {
                    warn!("reading process output: {err}");
                    break;
                }
            }
        }
        ring.append(&decoder.finish());
    }
    ring.close();
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn sh(script: &str) -> Invocation {
        let mut inv = Invocation::new("sh", "/bin/sh");
        inv.args(["-c", script]);
        inv
    }

    #[tokio::test]
    async fn captures_stdout_and_stderr() {
        let captured = sh("echo out; echo err >&2")
            .capture_stdout(true)
            .execute()
            .await
            .unwrap();
        assert_eq!(captured.stdout, "out");
        assert_eq!(captured.stderr, "err");
    }

    #[tokio::test]
    async fn stdout_line_limit() {
        let captured = sh("printf '1\\n2\\n3\\n'")
            .capture_stdout(true)
            .stdout_lines(2)
            .execute()
            .await
            .unwrap();
        assert_eq!(captured.stdout, "2\n3");
    }

    #[tokio::test]
    async fn exit_code_carries_error_tail() {
        let err = sh("echo '  noise' >&2; echo 'Unknown encoder' >&2; exit 3")
            .execute()
            .await
            .unwrap_err();
        match err.failure() {
            Some(ProcessFailure::ExitCode { code, message, .. }) => {
                assert_eq!(*code, 3);
                assert_eq!(message, "Unknown encoder");
            }
            other => panic!("unexpected failure: {other:?}"),
        }
        assert!(err.stderr().unwrap().contains("noise"));
    }

    #[tokio::test]
    async fn spawn_failure() {
        let err = Invocation::new("missing", "/nonexistent/tool_xyz_12345")
            .execute()
            .await
            .unwrap_err();
        assert!(matches!(err.failure(), Some(ProcessFailure::Spawn { .. })));
    }

    #[tokio::test]
    async fn timeout_kills_process() {
        let err = sh("exec sleep 10")
            .timeout(Duration::from_millis(100))
            .execute()
            .await
            .unwrap_err();
        assert!(matches!(err.failure(), Some(ProcessFailure::Timeout(_))));
        assert!(err.to_string().contains("timeout"));
    }

    #[tokio::test]
    async fn cancel_token_reports_signal() {
        let token = CancellationToken::new();
        let remote = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            remote.cancel();
        });
        let err = sh("exec sleep 10")
            .cancel_token(token)
            .execute()
            .await
            .unwrap_err();
        assert!(matches!(
            err.failure(),
            Some(ProcessFailure::Signal { signal: 9, .. })
        ));
    }

    #[tokio::test]
    async fn stdin_pumped_to_sink() {
        let (writer, mut reader) = tokio::io::duplex(64 * 1024);
        let captured = sh("cat")
            .input(&b"hello through the pipe"[..])
            .output(Box::new(writer), PipeOptions::default())
            .execute()
            .await
            .unwrap();
        assert_eq!(captured.stdout, "");

        let mut out = String::new();
        reader.read_to_string(&mut out).await.unwrap();
        assert_eq!(out, "hello through the pipe");
    }

    #[tokio::test]
    async fn input_read_error_fails_run() {
        struct Broken;
        impl AsyncRead for Broken {
            fn poll_read(
                self: std::pin::Pin<&mut Self>,
                _: &mut std::task::Context<'_>,
                _: &mut tokio::io::ReadBuf<'_>,
            ) -> std::task::Poll<std::io::Result<()>> {
                std::task::Poll::Ready(Err(std::io::Error::other("source broke")))
            }
        }

        let err = sh("cat").input(Broken).execute().await.unwrap_err();
        assert!(matches!(err.failure(), Some(ProcessFailure::InputStream(_))));
    }

    #[tokio::test]
    async fn sink_write_error_wins_over_exit_code() {
        struct BrokenSink;
        impl tokio::io::AsyncWrite for BrokenSink {
            fn poll_write(
                self: std::pin::Pin<&mut Self>,
                _: &mut std::task::Context<'_>,
                _: &[u8],
            ) -> std::task::Poll<std::io::Result<usize>> {
                std::task::Poll::Ready(Err(std::io::Error::other("sink broke")))
            }

            fn poll_flush(
                self: std::pin::Pin<&mut Self>,
                _: &mut std::task::Context<'_>,
            ) -> std::task::Poll<std::io::Result<()>> {
                std::task::Poll::Ready(Ok(()))
            }

            fn poll_shutdown(
                self: std::pin::Pin<&mut Self>,
                _: &mut std::task::Context<'_>,
            ) -> std::task::Poll<std::io::Result<()>> {
                std::task::Poll::Ready(Ok(()))
            }
        }

        let err = sh("printf data; sleep 0.2; exit 1")
            .output(Box::new(BrokenSink), PipeOptions::default())
            .execute()
            .await
            .unwrap_err();
        match err.failure() {
            Some(ProcessFailure::OutputStream(source)) => {
                assert_eq!(source.to_string(), "sink broke")
            }
            other => panic!("unexpected failure {other:?}"),
        }
    }

    #[tokio::test]
    async fn process_ignoring_stdin_still_succeeds() {
        let big = vec![b'x'; 1024 * 1024];
        let captured = sh("exit 0")
            .input(std::io::Cursor::new(big))
            .execute()
            .await
            .unwrap();
        assert_eq!(captured.stderr, "");
    }

    #[tokio::test]
    async fn stderr_lines_reach_subscribers() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        sh("printf 'a\\rb\\nc' >&2")
            .on_stderr_line(move |line| sink.lock().unwrap().push(line.to_string()))
            .execute()
            .await
            .unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn niceness_wraps_command_line() {
        let mut inv = Invocation::new("ffmpeg", "/usr/bin/ffmpeg");
        inv.options(&RunOptions {
            niceness: 10,
            ..Default::default()
        })
        .arg("-version");
        assert_eq!(
            inv.command_line(),
            vec!["nice", "-n", "10", "/usr/bin/ffmpeg", "-version"]
        );
    }
}
