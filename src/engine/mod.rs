//! Child-process lifecycle for the external converter.
//!
//! stdout and stderr share one OS pipe so the merged stream keeps the child's
//! emission order. A reader thread splits it into lines; the async side pulls
//! them with [`RunningProcess::next_line`] and reaps the child with
//! [`RunningProcess::wait`].

use crate::error::{JobError, Result};
use std::io::{self, BufRead, BufReader, PipeReader};
use std::process::Stdio;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Lines buffered between the reader thread and the consumer.
const LINE_CHANNEL_CAPACITY: usize = 256;

/// A spawned converter process and its merged output.
pub struct RunningProcess {
    child: Child,
    lines: mpsc::Receiver<io::Result<String>>,
    terminator: Terminator,
}

/// Cloneable handle that can ask the child to stop from another context.
#[derive(Debug, Clone)]
pub struct Terminator {
    pid: Option<u32>,
    exited: Arc<AtomicBool>,
}

/// Spawn `argv[0]` with the remaining elements as arguments.
pub fn start(argv: &[String]) -> Result<RunningProcess> {
    let (program, args) = argv.split_first().ok_or_else(|| {
        JobError::launch("", io::Error::new(io::ErrorKind::InvalidInput, "empty command"))
    })?;

    let (reader, writer) = io::pipe().map_err(|e| JobError::launch(program, e))?;
    let child = {
        let stderr_writer = writer.try_clone().map_err(|e| JobError::launch(program, e))?;
        let mut command = std::process::Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(writer)
            .stderr(stderr_writer);
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }
        // `command` drops at the end of this block, closing the parent's copies
        // of the write end so the reader sees EOF when the child exits.
        Command::from(command)
            .spawn()
            .map_err(|e| JobError::launch(program, e))?
    };

    let pid = child.id();
    debug!("Spawned {} (pid {:?})", program, pid);

    let (tx, rx) = mpsc::channel(LINE_CHANNEL_CAPACITY);
    spawn_line_reader(reader, tx).map_err(|e| JobError::launch(program, e))?;

    Ok(RunningProcess {
        child,
        lines: rx,
        terminator: Terminator {
            pid,
            exited: Arc::new(AtomicBool::new(false)),
        },
    })
}

fn spawn_line_reader(reader: PipeReader, tx: mpsc::Sender<io::Result<String>>) -> io::Result<()> {
    std::thread::Builder::new()
        .name("converter-output".into())
        .spawn(move || {
            let mut reader = BufReader::new(reader);
            let mut buf = Vec::new();
            loop {
                buf.clear();
                match reader.read_until(b'\n', &mut buf) {
                    Ok(0) => break,
                    Ok(_) => {
                        if tx.blocking_send(Ok(decode_line(&buf))).is_err() {
                            break;
                        }
                    }
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        let _ = tx.blocking_send(Err(e));
                        break;
                    }
                }
            }
        })?;
    Ok(())
}

/// Strip the line terminator (`\n` or `\r\n`) and decode lossily.
fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

impl RunningProcess {
    pub fn pid(&self) -> Option<u32> {
        self.terminator.pid
    }

    pub fn terminator(&self) -> Terminator {
        self.terminator.clone()
    }

    /// Next line of merged output. `None` once every writer closed the pipe;
    /// the sequence cannot be restarted.
    pub async fn next_line(&mut self) -> Option<io::Result<String>> {
        self.lines.recv().await
    }

    /// Wait for the child to exit and return its code. A child killed by a
    /// signal reports the negated signal number.
    pub async fn wait(&mut self) -> io::Result<i32> {
        let status = self.child.wait().await;
        self.terminator.exited.store(true, Ordering::SeqCst);
        Ok(exit_code(status?))
    }
}

#[cfg(unix)]
fn exit_code(status: std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|sig| -sig))
        .unwrap_or(-1)
}

#[cfg(not(unix))]
fn exit_code(status: std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

impl Terminator {
    pub fn has_exited(&self) -> bool {
        self.exited.load(Ordering::SeqCst)
    }

    /// Ask the child (and the helpers it spawned) to shut down gracefully.
    /// Returns `false` without doing anything once the child has been reaped.
    pub fn terminate(&self) -> bool {
        if self.has_exited() {
            return false;
        }
        let Some(pid) = self.pid else {
            return false;
        };
        debug!("Sending termination request to pid {}", pid);
        signal_group(pid, false)
    }

    /// Forcefully kill the child. Only used when the application is shutting
    /// down and a terminated child refuses to exit.
    pub fn kill(&self) -> bool {
        if self.has_exited() {
            return false;
        }
        let Some(pid) = self.pid else {
            return false;
        };
        warn!("Force-killing pid {}", pid);
        signal_group(pid, true)
    }
}

#[cfg(unix)]
fn signal_group(pid: u32, force: bool) -> bool {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let signal = if force { Signal::SIGKILL } else { Signal::SIGTERM };
    match killpg(Pid::from_raw(pid as i32), signal) {
        Ok(()) => true,
        Err(e) => {
            debug!("killpg({}, {:?}) failed: {}", pid, signal, e);
            false
        }
    }
}

#[cfg(windows)]
fn signal_group(pid: u32, force: bool) -> bool {
    let mut cmd = std::process::Command::new("taskkill");
    cmd.args(["/PID", &pid.to_string(), "/T"]);
    if force {
        cmd.arg("/F");
    }
    cmd.stdout(Stdio::null()).stderr(Stdio::null()).spawn().is_ok()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".into(), "-c".into(), script.into()]
    }

    async fn collect_lines(process: &mut RunningProcess) -> Vec<String> {
        let mut out = Vec::new();
        while let Some(line) = process.next_line().await {
            out.push(line.expect("read line"));
        }
        out
    }

    #[test]
    fn decode_strips_terminators() {
        assert_eq!(decode_line(b"Found: a.mp4\n"), "Found: a.mp4");
        assert_eq!(decode_line(b"done\r\n"), "done");
        assert_eq!(decode_line(b"no newline"), "no newline");
        assert_eq!(decode_line(b"bad \xff byte\n"), "bad \u{fffd} byte");
    }

    #[tokio::test]
    async fn merges_stdout_and_stderr_in_emission_order() {
        let mut process =
            start(&sh("echo one; echo two >&2; echo three; echo four >&2")).expect("spawn");
        let lines = collect_lines(&mut process).await;
        assert_eq!(lines, ["one", "two", "three", "four"]);
        assert_eq!(process.wait().await.expect("wait"), 0);
    }

    #[tokio::test]
    async fn reports_exit_code() {
        let mut process = start(&sh("echo bye; exit 3")).expect("spawn");
        let lines = collect_lines(&mut process).await;
        assert_eq!(lines, ["bye"]);
        assert_eq!(process.wait().await.expect("wait"), 3);
    }

    #[tokio::test]
    async fn missing_program_is_a_launch_error() {
        let err = start(&["/definitely/not/here/converter".to_string()])
            .err()
            .expect("launch should fail");
        assert!(matches!(err, JobError::Launch { .. }), "{err:?}");
    }

    #[test]
    fn empty_argv_is_a_launch_error() {
        let err = start(&[]).err().expect("launch should fail");
        assert!(matches!(err, JobError::Launch { .. }));
    }

    #[tokio::test]
    async fn terminate_stops_a_running_child() {
        let mut process = start(&sh("echo ready; exec sleep 30")).expect("spawn");
        let first = process.next_line().await.expect("line").expect("ok");
        assert_eq!(first, "ready");

        assert!(process.terminator().terminate());
        assert!(process.next_line().await.is_none());
        assert_eq!(process.wait().await.expect("wait"), -15);
    }

    #[tokio::test]
    async fn terminate_after_exit_is_a_noop() {
        let mut process = start(&sh("exit 0")).expect("spawn");
        let terminator = process.terminator();
        collect_lines(&mut process).await;
        process.wait().await.expect("wait");

        assert!(terminator.has_exited());
        assert!(!terminator.terminate());
        assert!(!terminator.terminate());
        assert!(!terminator.kill());
    }
}
