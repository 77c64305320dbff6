use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{ChildStdout, Command};
use tokio::sync::{oneshot, Notify};
use tracing::{debug, info, warn};

use crate::cancel::CancellationRegistry;
use crate::stream::StreamNormalizer;
use crate::types::{
    ExecutionOptions, NormalizedStreamEvent, OutputFormat, ProgressSink, ProviderDefinition,
    ResolvedInvocation,
};
use crate::{ReviewAgentError, Result};

/// How long to keep draining stdout/stderr after the process itself exited.
/// Bounds the wait when a grandchild inherited the pipes.
const DRAIN_GRACE: Duration = Duration::from_secs(5);

// ─── ProcessHandle ────────────────────────────────────────────────────────

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

/// A cloneable reference to one running provider process.
///
/// `terminate()` asks the supervising executor to kill the process. The
/// request is remembered, so terminating before the executor starts waiting
/// is not lost.
#[derive(Clone, Debug)]
pub struct ProcessHandle {
    id: u64,
    pid: Option<u32>,
    kill: Arc<Notify>,
}

impl ProcessHandle {
    pub fn new(pid: Option<u32>) -> Self {
        Self {
            id: NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed),
            pid,
            kill: Arc::new(Notify::new()),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// OS process id, if the platform reported one.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn terminate(&self) {
        self.kill.notify_one();
    }

    /// Resolves once `terminate()` has been called.
    pub async fn terminated(&self) {
        self.kill.notified().await;
    }
}

// ─── Settlement ───────────────────────────────────────────────────────────

/// Single-assignment result cell. The first `settle` wins; later calls are
/// no-ops that return `false`.
pub(crate) struct Settlement<T> {
    settled: AtomicBool,
    tx: Mutex<Option<oneshot::Sender<T>>>,
}

impl<T> Settlement<T> {
    pub(crate) fn new() -> (Arc<Self>, oneshot::Receiver<T>) {
        let (tx, rx) = oneshot::channel();
        let cell = Arc::new(Self {
            settled: AtomicBool::new(false),
            tx: Mutex::new(Some(tx)),
        });
        (cell, rx)
    }

    pub(crate) fn settle(&self, value: T) -> bool {
        if self.settled.swap(true, Ordering::AcqRel) {
            return false;
        }
        if let Some(tx) = self.tx.lock().unwrap_or_else(PoisonError::into_inner).take() {
            let _ = tx.send(value);
        }
        true
    }

    pub(crate) fn is_settled(&self) -> bool {
        self.settled.load(Ordering::Acquire)
    }
}

// ─── CapturedOutput ───────────────────────────────────────────────────────

/// Everything a successful (exit 0) run wrote.
#[derive(Debug, Clone, Default)]
pub struct CapturedOutput {
    pub stdout: String,
    pub stderr: String,
}

// ─── ProcessExecutor ──────────────────────────────────────────────────────

/// Runs one [`ResolvedInvocation`]: spawns it, writes the prompt on stdin,
/// supervises timeout and cancellation, and settles exactly once.
pub struct ProcessExecutor {
    provider: String,
    install_instructions: String,
    format: OutputFormat,
    invocation: ResolvedInvocation,
    bin_dir: Option<PathBuf>,
    cancellations: Option<Arc<CancellationRegistry>>,
}

impl ProcessExecutor {
    pub fn new(definition: &ProviderDefinition, invocation: ResolvedInvocation) -> Self {
        Self {
            provider: definition.id.clone(),
            install_instructions: definition.install_instructions.clone(),
            format: definition.format,
            invocation,
            bin_dir: None,
            cancellations: None,
        }
    }

    pub fn with_bin_dir(mut self, bin_dir: Option<PathBuf>) -> Self {
        self.bin_dir = bin_dir;
        self
    }

    pub fn with_cancellations(mut self, registry: Option<Arc<CancellationRegistry>>) -> Self {
        self.cancellations = registry;
        self
    }

    pub fn invocation(&self) -> &ResolvedInvocation {
        &self.invocation
    }

    /// Run the provider to completion.
    ///
    /// Resolves with captured output on exit 0. Rejects with `NotInstalled`,
    /// `TimedOut`, `Cancelled`, or `ProcessFailed`.
    pub async fn run(&self, prompt: &str, opts: &ExecutionOptions) -> Result<CapturedOutput> {
        let tag = opts.tag().to_string();
        let mut cmd = self.build_command(opts.cwd.as_deref());

        info!(
            provider = %self.provider,
            tag = %tag,
            command = %self.invocation.display_command(),
            "spawning provider"
        );
        let mut child = cmd.spawn().map_err(|e| self.spawn_error(e))?;

        let handle = ProcessHandle::new(child.id());
        if let (Some(registry), Some(id)) = (&self.cancellations, &opts.analysis_id) {
            registry.register_process(id, handle.clone());
        }
        if let Some(on_process) = &opts.on_process {
            on_process(&handle);
        }

        let (settlement, outcome) = Settlement::<Result<CapturedOutput>>::new();

        // The prompt only ever travels over stdin, which is always closed
        // afterwards so the provider sees EOF.
        let stdin_task = child.stdin.take().map(|mut stdin| {
            let prompt = prompt.to_owned();
            let settlement = Arc::clone(&settlement);
            let handle = handle.clone();
            let provider = self.provider.clone();
            tokio::spawn(async move {
                let written: std::io::Result<()> = async {
                    stdin.write_all(prompt.as_bytes()).await?;
                    stdin.flush().await
                }
                .await;
                drop(stdin);
                match written {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                        debug!(provider = %provider, "provider closed stdin before reading the full prompt");
                    }
                    Err(e) => {
                        warn!(provider = %provider, error = %e, "failed to write prompt to stdin");
                        if settlement.settle(Err(ReviewAgentError::Io(e))) {
                            handle.terminate();
                        }
                    }
                }
            })
        });

        let stdout_task = child.stdout.take().map(|stdout| {
            let tee = StdoutTee::new(self.format, opts, &self.provider);
            tokio::spawn(read_stdout(stdout, tee))
        });
        let stderr_task = child.stderr.take().map(|stderr| tokio::spawn(read_lossy(stderr)));

        let timer = {
            let settlement = Arc::clone(&settlement);
            let handle = handle.clone();
            let provider = self.provider.clone();
            let timeout = opts.timeout;
            let tag = tag.clone();
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                let err = ReviewAgentError::TimedOut {
                    provider: provider.clone(),
                    timeout,
                };
                if settlement.settle(Err(err)) {
                    warn!(provider = %provider, tag = %tag, ?timeout, "provider timed out; killing process");
                    handle.terminate();
                }
            })
        };

        let status = tokio::select! {
            status = child.wait() => status,
            _ = handle.terminated() => {
                debug!(provider = %self.provider, pid = ?handle.pid(), "terminating provider process");
                if let Err(e) = child.start_kill() {
                    debug!(provider = %self.provider, error = %e, "kill failed; process may have exited");
                }
                child.wait().await
            }
        };
        timer.abort();

        let (stdout, stderr) = if settlement.is_settled() {
            // Timed out or stdin failed: the output no longer matters.
            abort_all([stdout_task, stderr_task]);
            (String::new(), String::new())
        } else {
            (drain(stdout_task).await, drain(stderr_task).await)
        };
        if let Some(task) = stdin_task {
            task.abort();
        }

        let result = match status {
            Ok(status) => self.classify(status, CapturedOutput { stdout, stderr }, opts),
            Err(e) => Err(ReviewAgentError::Io(e)),
        };
        settlement.settle(result);

        if let (Some(registry), Some(id)) = (&self.cancellations, &opts.analysis_id) {
            registry.unregister_process(id, &handle);
        }

        outcome
            .await
            .unwrap_or_else(|_| Err(ReviewAgentError::Io(std::io::Error::other("process outcome lost"))))
    }

    fn classify(
        &self,
        status: ExitStatus,
        output: CapturedOutput,
        opts: &ExecutionOptions,
    ) -> Result<CapturedOutput> {
        if status.success() {
            debug!(provider = %self.provider, tag = %opts.tag(), bytes = output.stdout.len(), "provider finished");
            return Ok(output);
        }

        if is_signal_exit(&status) {
            if let Some(id) = &opts.analysis_id {
                let cancelled = self
                    .cancellations
                    .as_ref()
                    .is_some_and(|r| r.is_analysis_cancelled(id));
                if cancelled {
                    info!(provider = %self.provider, analysis_id = %id, "provider stopped by cancellation");
                    return Err(ReviewAgentError::Cancelled {
                        analysis_id: id.clone(),
                    });
                }
            }
        }

        // `sh -c` reports a missing program as 127 rather than a spawn error.
        if self.invocation.use_shell() && status.code() == Some(127) {
            return Err(self.not_installed());
        }

        warn!(
            provider = %self.provider,
            tag = %opts.tag(),
            code = ?status.code(),
            stderr = %output.stderr.trim(),
            "provider exited with failure"
        );
        Err(ReviewAgentError::ProcessFailed {
            provider: self.provider.clone(),
            code: status.code(),
            stderr: output.stderr,
        })
    }

    fn spawn_error(&self, e: std::io::Error) -> ReviewAgentError {
        if e.kind() == std::io::ErrorKind::NotFound {
            self.not_installed()
        } else {
            ReviewAgentError::Io(e)
        }
    }

    fn not_installed(&self) -> ReviewAgentError {
        ReviewAgentError::NotInstalled {
            provider: self.provider.clone(),
            install_instructions: self.install_instructions.clone(),
        }
    }

    /// Cheap liveness probe: the binary resolves on `PATH` (direct commands
    /// only) and `<command> --version` exits 0 within `timeout`.
    pub async fn probe_version(&self, timeout: Duration) -> bool {
        let inv = &self.invocation;
        if !inv.use_shell() {
            let path = self.augmented_path().or_else(|| std::env::var_os("PATH"));
            let cwd = std::env::current_dir().unwrap_or_default();
            if let Err(e) = which::which_in(inv.command(), path, cwd) {
                debug!(provider = %self.provider, command = %inv.command(), error = %e, "provider binary not found");
                return false;
            }
        }

        let mut cmd = self.command_with(&["--version".to_string()]);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        match tokio::time::timeout(timeout, cmd.status()).await {
            Ok(Ok(status)) => status.success(),
            Ok(Err(e)) => {
                debug!(provider = %self.provider, error = %e, "version probe failed to start");
                false
            }
            Err(_) => {
                debug!(provider = %self.provider, ?timeout, "version probe timed out");
                false
            }
        }
    }

    fn build_command(&self, cwd: Option<&Path>) -> Command {
        let mut cmd = self.command_with(self.invocation.args());
        if let Some(cwd) = cwd {
            cmd.current_dir(cwd);
        }
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    fn command_with(&self, args: &[String]) -> Command {
        let inv = &self.invocation;
        let mut cmd = if inv.use_shell() {
            shell_command(&shell_line(inv.command(), args))
        } else {
            let mut cmd = Command::new(inv.command());
            cmd.args(args);
            cmd
        };
        cmd.envs(inv.env());
        if let Some(path) = self.augmented_path() {
            cmd.env("PATH", path);
        }
        cmd
    }

    /// `PATH` with the bin-scripts directory in front, so provider wrappers
    /// and helper scripts resolve first.
    fn augmented_path(&self) -> Option<std::ffi::OsString> {
        let bin_dir = self.bin_dir.as_ref()?;
        let base = self
            .invocation
            .env()
            .get("PATH")
            .map(std::ffi::OsString::from)
            .or_else(|| std::env::var_os("PATH"))
            .unwrap_or_default();
        let mut paths = vec![bin_dir.clone()];
        paths.extend(std::env::split_paths(&base));
        std::env::join_paths(paths).ok()
    }
}

fn shell_line(command: &str, args: &[String]) -> String {
    let mut line = command.to_string();
    for arg in args {
        line.push(' ');
        match shlex::try_quote(arg) {
            Ok(quoted) => line.push_str(&quoted),
            Err(_) => line.push_str(arg),
        }
    }
    line
}

#[cfg(unix)]
fn shell_command(line: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(line);
    cmd
}

#[cfg(windows)]
fn shell_command(line: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(line);
    cmd
}

/// Killed by a signal, or a shell-style `128 + n` code for SIGINT, SIGKILL
/// or SIGTERM.
fn is_signal_exit(status: &ExitStatus) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if status.signal().is_some() {
            return true;
        }
    }
    matches!(status.code(), Some(130 | 137 | 143))
}

async fn drain(task: Option<tokio::task::JoinHandle<String>>) -> String {
    let Some(mut task) = task else {
        return String::new();
    };
    match tokio::time::timeout(DRAIN_GRACE, &mut task).await {
        Ok(Ok(out)) => out,
        Ok(Err(e)) => {
            warn!(error = %e, "output reader task failed");
            String::new()
        }
        Err(_) => {
            warn!("output pipe still open after exit; giving up on the remainder");
            task.abort();
            String::new()
        }
    }
}

fn abort_all<const N: usize>(tasks: [Option<tokio::task::JoinHandle<String>>; N]) {
    for task in tasks.into_iter().flatten() {
        task.abort();
    }
}

async fn read_lossy(mut reader: impl AsyncRead + Unpin) -> String {
    let mut buf = Vec::new();
    if let Err(e) = reader.read_to_end(&mut buf).await {
        debug!(error = %e, "stderr read interrupted");
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Reads stdout to EOF, teeing every decoded chunk into the accumulation
/// buffer and, independently, into the live-progress side channel.
async fn read_stdout(mut stdout: ChildStdout, mut tee: StdoutTee) -> String {
    let mut buf = vec![0u8; 8192];
    let mut decoder = Utf8Decoder::default();
    let mut accumulated = String::new();

    loop {
        match stdout.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let chunk = decoder.decode(&buf[..n]);
                accumulated.push_str(&chunk);
                tee.feed(&chunk);
            }
            Err(e) => {
                warn!(error = %e, "stdout read interrupted");
                break;
            }
        }
    }

    let tail = decoder.finish();
    accumulated.push_str(&tail);
    tee.feed(&tail);
    tee.flush();
    accumulated
}

// ─── StdoutTee ────────────────────────────────────────────────────────────

/// The progress half of the stdout tee. Only built when a sink exists; sink
/// failures are logged here and never reach the accumulation buffer.
struct StdoutTee {
    side: Option<(StreamNormalizer, Arc<dyn ProgressSink>)>,
    provider: String,
}

impl StdoutTee {
    fn new(format: OutputFormat, opts: &ExecutionOptions, provider: &str) -> Self {
        let side = opts
            .progress
            .clone()
            .map(|sink| (StreamNormalizer::new(format, opts.cwd.clone()), sink));
        Self {
            side,
            provider: provider.to_string(),
        }
    }

    fn feed(&mut self, chunk: &str) {
        if chunk.is_empty() {
            return;
        }
        if let Some((normalizer, sink)) = &mut self.side {
            for event in normalizer.feed(chunk) {
                deliver(sink.as_ref(), &event, &self.provider);
            }
        }
    }

    fn flush(&mut self) {
        if let Some((normalizer, sink)) = &mut self.side {
            for event in normalizer.flush() {
                deliver(sink.as_ref(), &event, &self.provider);
            }
        }
    }
}

fn deliver(sink: &dyn ProgressSink, event: &NormalizedStreamEvent, provider: &str) {
    match catch_unwind(AssertUnwindSafe(|| sink.on_stream_event(event))) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            let err = ReviewAgentError::Callback(e.to_string());
            warn!(provider, error = %err, "progress sink failed; continuing");
        }
        Err(_) => {
            let err = ReviewAgentError::Callback("sink panicked".into());
            warn!(provider, error = %err, "progress sink failed; continuing");
        }
    }
}

// ─── Utf8Decoder ──────────────────────────────────────────────────────────

/// Decodes a byte stream as UTF-8, holding back a multi-byte sequence split
/// across reads until the rest arrives.
#[derive(Default)]
struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let split = self.pending.len() - incomplete_tail(&self.pending);
        let out = String::from_utf8_lossy(&self.pending[..split]).into_owned();
        self.pending.drain(..split);
        out
    }

    fn finish(&mut self) -> String {
        let out = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        out
    }
}

/// Length of a truncated-but-so-far-valid sequence at the end of `bytes`.
fn incomplete_tail(bytes: &[u8]) -> usize {
    let mut start = 0;
    loop {
        match std::str::from_utf8(&bytes[start..]) {
            Ok(_) => return 0,
            Err(e) => match e.error_len() {
                None => return bytes.len() - start - e.valid_up_to(),
                Some(bad) => start += e.valid_up_to() + bad,
            },
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────
