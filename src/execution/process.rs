// Runs one benchmark invocation with a wall clock limit.

use std::fmt;
use std::io::{self, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

const MAX_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// How an invocation ended. Only a successful run keeps its output.
#[derive(Debug)]
pub enum Outcome {
    Success { output: Vec<u8> },
    TimedOut,
    Failed { status: ExitStatus },
    Errored { error: io::Error },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }

    pub fn output(&self) -> &[u8] {
        match self {
            Outcome::Success { output } => output,
            _ => &[],
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Success { .. } => f.write_str("ok"),
            Outcome::TimedOut => f.write_str("timed out"),
            Outcome::Failed { status } => write!(f, "exited with {status}"),
            Outcome::Errored { error } => write!(f, "failed to run: {error}"),
        }
    }
}

#[derive(Debug)]
pub struct Execution {
    pub outcome: Outcome,
    pub elapsed: Duration,
}

/// Starts `argv[0]` with the remaining arguments, captures its stdout and
/// waits at most `timeout` for it, output included. At the deadline the
/// child's whole process group is killed. A timeout too large to represent
/// means no deadline. Never fails: problems are reported through the outcome.
pub fn execute(argv: &[String], timeout: Duration) -> Execution {
    let start = Instant::now();
    let deadline = start.checked_add(timeout);
    let outcome = match argv.split_first() {
        Some((program, args)) => spawn_and_wait(program, args, deadline),
        None => Outcome::Errored {
            error: io::Error::new(io::ErrorKind::InvalidInput, "empty command line"),
        },
    };

    Execution {
        outcome,
        elapsed: start.elapsed(),
    }
}

fn spawn_and_wait(program: &str, args: &[String], deadline: Option<Instant>) -> Outcome {
    let mut command = Command::new(program);
    command.args(args).stdout(Stdio::piped());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        // Own group, so anything the program leaves behind can be killed with it.
        command.process_group(0);
    }

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(error) => return Outcome::Errored { error },
    };

    // Drain stdout on the side so a chatty child never blocks on a full pipe.
    let output = child.stdout.take().map(|mut stdout| {
        let (sender, receiver) = mpsc::channel();
        thread::spawn(move || {
            let mut output = Vec::new();
            if let Err(error) = stdout.read_to_end(&mut output) {
                debug!(%error, "reading child output");
            }
            // The receiver is gone when the case was already given up on.
            let _ = sender.send(output);
        });
        receiver
    });

    let status = match wait(&mut child, deadline) {
        Ok(Some(status)) => status,
        Ok(None) => {
            stop(&mut child);
            return Outcome::TimedOut;
        }
        Err(error) => {
            stop(&mut child);
            return Outcome::Errored { error };
        }
    };

    if !status.success() {
        kill_group(&child);
        return Outcome::Failed { status };
    }

    // Leftover background processes may still hold stdout open.
    let outcome = match collect(output, deadline) {
        Some(output) => Outcome::Success { output },
        None => Outcome::TimedOut,
    };
    kill_group(&child);
    outcome
}

/// Polls the child until it exits. `Ok(None)` means the deadline passed first.
fn wait(child: &mut Child, deadline: Option<Instant>) -> io::Result<Option<ExitStatus>> {
    let mut interval = Duration::from_millis(1);
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }

        let pause = match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    return Ok(None);
                }
                interval.min(deadline - now)
            }
            None => interval,
        };
        thread::sleep(pause);
        interval = (interval * 2).min(MAX_POLL_INTERVAL);
    }
}

/// Waits for the reader to reach end of file. `None` means the deadline
/// passed first.
fn collect(output: Option<Receiver<Vec<u8>>>, deadline: Option<Instant>) -> Option<Vec<u8>> {
    let Some(receiver) = output else {
        return Some(Vec::new());
    };

    match deadline {
        Some(deadline) => {
            match receiver.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
                Ok(output) => Some(output),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => Some(Vec::new()),
            }
        }
        None => Some(receiver.recv().unwrap_or_default()),
    }
}

fn stop(child: &mut Child) {
    kill_group(child);
    if let Err(error) = child.kill() {
        warn!(%error, pid = child.id(), "cannot kill child");
    }
    if let Err(error) = child.wait() {
        warn!(%error, pid = child.id(), "cannot reap child");
    }
}

/// Kills every process left in the child's process group. This also ends
/// the output reader, whose pipe closes once the last writer is gone.
#[cfg(unix)]
fn kill_group(child: &Child) {
    let Ok(pgid) = libc::pid_t::try_from(child.id()) else {
        return;
    };

    // SAFETY: No safety requirements beyond passing valid arguments.
    let result = unsafe { libc::killpg(pgid, libc::SIGKILL) };
    if result != 0 {
        let error = io::Error::last_os_error();
        // ESRCH: the group is already empty.
        if error.raw_os_error() != Some(libc::ESRCH) {
            warn!(%error, pgid, "cannot kill process group");
        }
    }
}

#[cfg(not(unix))]
fn kill_group(_child: &Child) {}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn argv(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn success_captures_stdout() {
        let execution = execute(&argv(&["echo", "hello"]), Duration::from_secs(10));
        assert!(execution.outcome.is_success());
        assert_eq!(execution.outcome.output(), b"hello\n");
    }

    #[test]
    fn non_zero_exit_is_failure_without_output() {
        let execution = execute(
            &argv(&["sh", "-c", "echo partial; exit 3"]),
            Duration::from_secs(10),
        );
        match &execution.outcome {
            Outcome::Failed { status } => assert_eq!(status.code(), Some(3)),
            other => panic!("unexpected outcome: {other}"),
        }
        assert!(execution.outcome.output().is_empty());
    }

    #[test]
    fn timeout_kills_child_after_bound() {
        let timeout = Duration::from_millis(200);
        let execution = execute(&argv(&["sleep", "5"]), timeout);
        assert!(matches!(execution.outcome, Outcome::TimedOut));
        assert!(execution.elapsed >= timeout);
        assert!(execution.elapsed < Duration::from_secs(4));
        assert!(execution.outcome.output().is_empty());
    }

    #[test]
    fn background_process_holding_stdout_cannot_outlive_timeout() {
        let timeout = Duration::from_millis(500);
        let execution = execute(&argv(&["sh", "-c", "sleep 4 & exit 0"]), timeout);
        assert!(matches!(execution.outcome, Outcome::TimedOut));
        assert!(execution.elapsed >= timeout);
        assert!(execution.elapsed < timeout + Duration::from_secs(1));
    }

    /// Alive and not merely waiting to be reaped.
    #[cfg(target_os = "linux")]
    fn is_running(pid: &str) -> bool {
        match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
            Ok(stat) => {
                let state = stat
                    .rsplit(')')
                    .next()
                    .and_then(|rest| rest.split_whitespace().next());
                state != Some("Z")
            }
            Err(_) => false,
        }
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn leftover_processes_are_killed_with_the_group() {
        let execution = execute(
            &argv(&["sh", "-c", "sleep 30 > /dev/null 2>&1 & echo $!"]),
            Duration::from_secs(10),
        );
        assert!(execution.outcome.is_success());
        let pid = String::from_utf8_lossy(execution.outcome.output())
            .trim()
            .to_string();
        assert!(pid.parse::<u32>().is_ok());

        let gone = (0..200).any(|_| {
            let running = is_running(&pid);
            if running {
                thread::sleep(Duration::from_millis(10));
            }
            !running
        });
        assert!(gone, "process {pid} survived its case");
    }

    #[test]
    fn failed_case_returns_despite_background_writer() {
        let timeout = Duration::from_secs(10);
        let execution = execute(&argv(&["sh", "-c", "sleep 4 & exit 1"]), timeout);
        assert!(matches!(execution.outcome, Outcome::Failed { .. }));
        assert!(execution.elapsed < Duration::from_secs(2));
    }

    #[test]
    fn unrepresentable_timeout_means_no_deadline() {
        let execution = execute(&argv(&["true"]), Duration::from_secs(u64::MAX));
        assert!(execution.outcome.is_success());

        let execution = execute(&argv(&["echo", "done"]), Duration::MAX);
        assert_eq!(execution.outcome.output(), b"done\n");
    }

    #[test]
    fn missing_program_is_reported() {
        let execution = execute(
            &argv(&["./definitely-not-a-benchmark"]),
            Duration::from_secs(1),
        );
        assert!(matches!(execution.outcome, Outcome::Errored { .. }));
        assert_eq!(execution.outcome.to_string().split(':').next(), Some("failed to run"));
    }

    #[test]
    fn empty_command_is_reported() {
        let execution = execute(&[], Duration::from_secs(1));
        assert!(matches!(execution.outcome, Outcome::Errored { .. }));
    }
}
