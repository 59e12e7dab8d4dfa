//! Child process execution with a deadline and bounded output capture.

use std::io::Read;
use std::process::{Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// Lines of stderr quoted in a failure message.
const STDERR_TAIL_LINES: usize = 20;

/// How long to wait for the output readers once the child has exited.
const READER_GRACE: Duration = Duration::from_secs(2);

/// Deadline and capture bound for one command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandLimits {
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.status.success()
    }

    /// Last lines of stderr, for error messages.
    pub fn stderr_tail(&self) -> String {
        let text = String::from_utf8_lossy(&self.stderr);
        let lines: Vec<&str> = text.trim_end().lines().collect();
        let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
        lines[start..].join("\n")
    }

    /// Turn a failed or timed-out run into an error naming `label`.
    pub fn ensure_success(&self, label: &str, timeout: Duration) -> Result<()> {
        if self.timed_out {
            return Err(anyhow!("{label} timed out after {}s", timeout.as_secs()));
        }
        if !self.status.success() {
            let code = self
                .status
                .code()
                .map_or_else(|| "signal".to_string(), |c| c.to_string());
            let tail = self.stderr_tail();
            if tail.is_empty() {
                return Err(anyhow!("{label} failed (exit {code})"));
            }
            return Err(anyhow!("{label} failed (exit {code}):\n{tail}"));
        }
        Ok(())
    }
}

/// Run a command with a timeout and capture stdout/stderr without risking pipe deadlocks.
///
/// Output is read concurrently while the child runs. `output_limit_bytes` bounds the amount of
/// stdout/stderr stored in memory (bytes beyond this are discarded while still draining the pipe).
/// Only the direct child is killed on timeout; readers blocked by its leftover descendants are
/// given up after a short grace period.
#[instrument(skip_all, fields(program = ?cmd.get_program(), timeout_secs = limits.timeout.as_secs()))]
pub fn run_command(mut cmd: Command, limits: CommandLimits) -> Result<CommandOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    debug!("spawning child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).with_context(|| format!("spawn {:?}", cmd.get_program()));
        }
    };

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let limit = limits.output_limit_bytes;
    let (done_tx, done_rx) = mpsc::channel();
    let stdout_capture = spawn_reader(stdout, limit, done_tx.clone());
    let stderr_capture = spawn_reader(stderr, limit, done_tx);

    let mut timed_out = false;
    let status = match child
        .wait_timeout(limits.timeout)
        .context("wait for command")?
    {
        Some(status) => status,
        None => {
            warn!(
                timeout_secs = limits.timeout.as_secs(),
                "command timed out, killing"
            );
            timed_out = true;
            child.kill().context("kill command")?;
            child.wait().context("wait command after kill")?
        }
    };

    wait_for_readers(&done_rx, 2, READER_GRACE)?;
    let (stdout, stdout_truncated) = take_capture(&stdout_capture);
    let (stderr, stderr_truncated) = take_capture(&stderr_capture);

    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out,
    })
}

#[derive(Debug, Default)]
struct Captured {
    buf: Vec<u8>,
    truncated: usize,
}

type SharedCapture = Arc<Mutex<Captured>>;

fn spawn_reader<R: Read + Send + 'static>(
    reader: R,
    limit: usize,
    done: mpsc::Sender<Result<()>>,
) -> SharedCapture {
    let capture = SharedCapture::default();
    let sink = Arc::clone(&capture);
    thread::spawn(move || {
        let result = read_stream_limited(reader, limit, &sink);
        // The receiver is gone once the caller stopped waiting.
        let _ = done.send(result);
    });
    capture
}

/// Wait up to `grace` for `count` readers to hit end of file.
///
/// A process the child left behind can hold the pipes open long after the
/// child exited. Past the grace period the readers are detached and whatever
/// was captured so far is used.
fn wait_for_readers(
    done: &mpsc::Receiver<Result<()>>,
    count: usize,
    grace: Duration,
) -> Result<()> {
    let deadline = Instant::now() + grace;
    for finished in 0..count {
        match done.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
            Ok(result) => result?,
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    open_pipes = count - finished,
                    grace_ms = grace.as_millis() as u64,
                    "output pipes still open after exit, detaching readers"
                );
                return Ok(());
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err(anyhow!("output reader thread panicked"));
            }
        }
    }
    Ok(())
}

fn take_capture(capture: &SharedCapture) -> (Vec<u8>, usize) {
    let mut guard = capture.lock().unwrap_or_else(PoisonError::into_inner);
    let captured = std::mem::take(&mut *guard);
    (captured.buf, captured.truncated)
}

fn read_stream_limited<R: Read>(
    mut reader: R,
    limit: usize,
    sink: &Mutex<Captured>,
) -> Result<()> {
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let mut captured = sink.lock().unwrap_or_else(PoisonError::into_inner);
        let remaining = limit.saturating_sub(captured.buf.len());
        let keep = n.min(remaining);
        captured.buf.extend_from_slice(&chunk[..keep]);
        captured.truncated += n - keep;
    }

    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn limits() -> CommandLimits {
        CommandLimits {
            timeout: Duration::from_secs(10),
            output_limit_bytes: 1024,
        }
    }

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[test]
    fn captures_stdout_and_stderr() {
        let out = run_command(sh("echo out; echo err >&2"), limits()).expect("run");
        assert!(out.success());
        assert_eq!(String::from_utf8_lossy(&out.stdout), "out\n");
        assert_eq!(String::from_utf8_lossy(&out.stderr), "err\n");
    }

    #[test]
    fn truncates_beyond_limit() {
        let limits = CommandLimits {
            output_limit_bytes: 4,
            ..limits()
        };
        let out = run_command(sh("printf 0123456789"), limits).expect("run");
        assert_eq!(out.stdout, b"0123");
        assert_eq!(out.stdout_truncated, 6);
    }

    #[test]
    fn failure_message_quotes_stderr() {
        let out = run_command(sh("echo broken >&2; exit 3"), limits()).expect("run");
        assert!(!out.success());
        let err = out
            .ensure_success("build", limits().timeout)
            .expect_err("should fail");
        let msg = err.to_string();
        assert!(msg.contains("build failed (exit 3)"), "{msg}");
        assert!(msg.contains("broken"), "{msg}");
    }

    #[test]
    fn kills_on_timeout() {
        let limits = CommandLimits {
            timeout: Duration::from_millis(200),
            ..limits()
        };
        let out = run_command(sh("exec sleep 5"), limits).expect("run");
        assert!(out.timed_out);
        let err = out.ensure_success("clone", limits.timeout).expect_err("timeout");
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn timeout_is_bounded_when_a_descendant_holds_the_pipes() {
        let limits = CommandLimits {
            timeout: Duration::from_millis(200),
            ..limits()
        };
        let started = Instant::now();
        let out = run_command(sh("sleep 10 & exec sleep 10"), limits).expect("run");
        assert!(out.timed_out);
        assert!(started.elapsed() < Duration::from_secs(6), "{:?}", started.elapsed());
    }

    #[test]
    fn output_written_before_exit_survives_detached_readers() {
        let started = Instant::now();
        let out = run_command(sh("echo started; sleep 10 &"), limits()).expect("run");
        assert!(out.success());
        assert_eq!(String::from_utf8_lossy(&out.stdout), "started\n");
        assert!(started.elapsed() < Duration::from_secs(6), "{:?}", started.elapsed());
    }

    #[test]
    fn stderr_tail_keeps_last_lines() {
        let out = run_command(
            sh("i=0; while [ $i -lt 30 ]; do echo line$i >&2; i=$((i+1)); done; exit 1"),
            limits(),
        )
        .expect("run");
        let tail = out.stderr_tail();
        assert_eq!(tail.lines().count(), STDERR_TAIL_LINES);
        assert!(tail.ends_with("line29"));
        assert!(!tail.contains("line9\n"));
    }

    #[test]
    fn missing_program_is_spawn_error() {
        let err = run_command(Command::new("definitely-not-a-real-program-xyz"), limits())
            .expect_err("spawn should fail");
        assert!(format!("{err:#}").contains("spawn"));
    }
}
