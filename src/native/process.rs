use std::io;
use std::os::fd::AsRawFd;
use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::native::orphans::{kill_pipe_holders, pipe_identity};

/// How long to keep draining pipes after the process group is gone. Only
/// matters when a descendant escaped the group and still holds a pipe open.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

const READ_CHUNK: usize = 8192;

#[derive(Clone, Debug)]
pub struct ProcessLimits {
    pub wall_time: Duration,
    pub cpu_time: Option<Duration>,
    pub memory_bytes: Option<u64>,
    /// `RLIMIT_NPROC` for the child's user; `Some(1)` forbids forking.
    /// Privileged users are exempt, so escaped descendants are also hunted
    /// down through their pipes.
    pub pids_count: Option<u64>,
    pub stdout_bytes: usize,
    pub stderr_bytes: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

impl Stream {
    pub fn name(&self) -> &'static str {
        match self {
            Stream::Stdout => "stdout",
            Stream::Stderr => "stderr",
        }
    }
}

#[derive(Debug)]
pub enum Termination {
    Exited(ExitStatus),
    TimedOut,
    OutputLimitExceeded(Stream),
    /// The leader exited, but a descendant outside the process group kept
    /// the output pipes open.
    Escaped,
}

#[derive(Debug)]
pub struct ProcessOutcome {
    pub termination: Termination,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub elapsed: Duration,
}

/// SIGKILLs the whole process group when dropped, so a cancelled caller
/// never leaves descendants behind.
struct GroupGuard {
    pgid: Option<Pid>,
}

impl GroupGuard {
    fn kill(&mut self) {
        if let Some(pgid) = self.pgid.take() {
            match killpg(pgid, Signal::SIGKILL) {
                Ok(()) => tracing::debug!("Killed process group {}", pgid),
                Err(nix::errno::Errno::ESRCH) => {}
                Err(e) => tracing::warn!("Failed to kill process group {}: {}", pgid, e),
            }
        }
    }
}

impl Drop for GroupGuard {
    fn drop(&mut self) {
        self.kill();
    }
}

/// Spawns `cmd` in its own process group and waits for it, racing the exit
/// against the wall-clock deadline and the output ceilings.
///
/// Stdout and stderr are always piped and captured; the caller decides what
/// the child's stdin is. Whatever the outcome, the process group is killed
/// and the child reaped before this returns.
pub async fn supervise(cmd: &mut Command, limits: &ProcessLimits) -> io::Result<ProcessOutcome> {
    cmd.stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    isolate_child(cmd, limits);

    let started = Instant::now();
    let mut child = cmd.spawn()?;
    let mut group = GroupGuard {
        pgid: child.id().map(|id| Pid::from_raw(id as i32)),
    };

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| io::Error::other("child stdout was not captured"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| io::Error::other("child stderr was not captured"))?;

    let (overflow_tx, mut overflow_rx) = mpsc::channel::<Stream>(2);
    let mut stdout = Reader::spawn(
        stdout,
        limits.stdout_bytes,
        Stream::Stdout,
        overflow_tx.clone(),
    );
    let mut stderr = Reader::spawn(stderr, limits.stderr_bytes, Stream::Stderr, overflow_tx);

    let termination = tokio::select! {
        status = child.wait() => Termination::Exited(status?),
        _ = tokio::time::sleep(limits.wall_time) => Termination::TimedOut,
        Some(stream) = overflow_rx.recv() => Termination::OutputLimitExceeded(stream),
    };
    let elapsed = started.elapsed();

    // The leader may be gone already; its descendants may not.
    group.kill();
    reap(&mut child).await;

    // Pipes still open after the group kill mean some descendant left the
    // group and holds them.
    let escaped = !(stdout.settle(DRAIN_GRACE).await && stderr.settle(DRAIN_GRACE).await);
    if escaped {
        let pipes: Vec<PathBuf> = [&stdout, &stderr]
            .iter()
            .filter_map(|reader| reader.pipe.clone())
            .collect();
        let killed = tokio::task::spawn_blocking(move || kill_pipe_holders(&pipes))
            .await
            .unwrap_or(0);
        tracing::warn!(
            "Output pipes outlived the process group; killed {} escaped process(es)",
            killed
        );
    }

    let stdout = stdout.finish().await;
    let stderr = stderr.finish().await;

    // A reader that hit its ceiling closes the pipe, which may let the child
    // die from SIGPIPE before the overflow is observed above.
    let termination = match termination {
        Termination::Exited(_) if stdout.truncated => {
            Termination::OutputLimitExceeded(Stream::Stdout)
        }
        Termination::Exited(_) if stderr.truncated => {
            Termination::OutputLimitExceeded(Stream::Stderr)
        }
        Termination::Exited(_) if escaped => Termination::Escaped,
        other => other,
    };

    Ok(ProcessOutcome {
        termination,
        stdout: stdout.bytes,
        stderr: stderr.bytes,
        elapsed,
    })
}

/// `exited with status N`, `terminated by signal SIGFPE`: how a process
/// ended, for callers that have no diagnostics of their own to show.
pub fn describe_exit(status: ExitStatus) -> String {
    if let Some(code) = status.code() {
        return format!("exited with status {}", code);
    }

    match status.signal() {
        Some(signal) => match Signal::try_from(signal) {
            Ok(signal) => format!("terminated by signal {}", signal.as_str()),
            Err(_) => format!("terminated by signal {}", signal),
        },
        None => "terminated abnormally".to_string(),
    }
}

/// Puts the child into a process group of its own and applies the
/// kernel-enforced resource ceilings.
fn isolate_child(cmd: &mut Command, limits: &ProcessLimits) {
    let memory = limits.memory_bytes;
    let pids_count = limits.pids_count;
    let cpu_seconds = limits
        .cpu_time
        .map(|cpu| cpu.as_millis().div_ceil(1000).max(1) as u64);

    // SAFETY: the closure runs between fork and exec and only calls
    // setpgid and setrlimit, both async-signal-safe.
    unsafe {
        cmd.pre_exec(move || {
            use nix::sys::resource::{Resource, setrlimit};

            nix::unistd::setpgid(Pid::from_raw(0), Pid::from_raw(0))?;
            setrlimit(Resource::RLIMIT_CORE, 0, 0)?;
            if let Some(bytes) = memory {
                setrlimit(Resource::RLIMIT_AS, bytes, bytes)?;
            }
            if let Some(seconds) = cpu_seconds {
                // Soft limit delivers SIGXCPU, the hard one a second later SIGKILL.
                setrlimit(Resource::RLIMIT_CPU, seconds, seconds + 1)?;
            }
            if let Some(count) = pids_count {
                setrlimit(Resource::RLIMIT_NPROC, count, count)?;
            }
            Ok(())
        });
    }
}

async fn reap(child: &mut Child) {
    // Already reaped children make kill() fail; that is fine.
    let _ = child.start_kill();
    if let Err(e) = child.wait().await {
        tracing::warn!("Failed to reap child process: {}", e);
    }
}

#[derive(Debug, Default)]
struct Capture {
    bytes: Vec<u8>,
    truncated: bool,
}

/// Background task draining one output pipe of the child.
struct Reader {
    task: JoinHandle<io::Result<Capture>>,
    stop: Option<oneshot::Sender<()>>,
    pipe: Option<PathBuf>,
    done: Option<Capture>,
}

impl Reader {
    fn spawn<R>(pipe: R, cap: usize, stream: Stream, overflow: mpsc::Sender<Stream>) -> Self
    where
        R: AsyncRead + AsRawFd + Unpin + Send + 'static,
    {
        let identity = pipe_identity(pipe.as_raw_fd());
        let (stop_tx, stop_rx) = oneshot::channel();

        Reader {
            task: tokio::spawn(read_capped(pipe, cap, stream, overflow, stop_rx)),
            stop: Some(stop_tx),
            pipe: identity,
            done: None,
        }
    }

    /// Waits up to `grace` for the pipe to reach EOF.
    async fn settle(&mut self, grace: Duration) -> bool {
        if self.done.is_some() {
            return true;
        }

        match tokio::time::timeout(grace, &mut self.task).await {
            Ok(Ok(Ok(capture))) => self.done = Some(capture),
            Ok(Ok(Err(e))) => {
                tracing::warn!("Failed to read child output: {}", e);
                self.done = Some(Capture::default());
            }
            Ok(Err(e)) => {
                tracing::warn!("Output reader task failed: {}", e);
                self.done = Some(Capture::default());
            }
            Err(_) => return false,
        }
        true
    }

    /// Collects what was read. A pipe that is still open is abandoned, but
    /// the bytes read from it so far are kept.
    async fn finish(mut self) -> Capture {
        if !self.settle(DRAIN_GRACE).await {
            if let Some(stop) = self.stop.take() {
                let _ = stop.send(());
            }
            if !self.settle(DRAIN_GRACE).await {
                tracing::warn!("Output reader did not stop; dropping its capture");
                self.task.abort();
            }
        }
        self.done.take().unwrap_or_default()
    }
}

/// Reads until EOF, until more than `cap` bytes arrive, or until told to
/// stop. On overflow the first `cap` bytes are kept, the overflow is
/// reported and reading stops.
async fn read_capped<R>(
    mut reader: R,
    cap: usize,
    stream: Stream,
    overflow: mpsc::Sender<Stream>,
    mut stop: oneshot::Receiver<()>,
) -> io::Result<Capture>
where
    R: AsyncRead + Unpin,
{
    let mut capture = Capture::default();
    let mut chunk = [0u8; READ_CHUNK];

    loop {
        let n = tokio::select! {
            read = reader.read(&mut chunk) => read?,
            _ = &mut stop => return Ok(capture),
        };
        if n == 0 {
            return Ok(capture);
        }

        let room = cap - capture.bytes.len();
        if n > room {
            capture.bytes.extend_from_slice(&chunk[..room]);
            capture.truncated = true;
            let _ = overflow.send(stream).await;
            return Ok(capture);
        }
        capture.bytes.extend_from_slice(&chunk[..n]);
    }
}
