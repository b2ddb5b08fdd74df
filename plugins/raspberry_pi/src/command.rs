use std::error;
use std::fmt;
use std::io::{self, Read};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use wait_timeout::ChildExt;

#[derive(Debug)]
pub enum CommandError {
    /// The executable could not be started
    Spawn(io::Error),

    /// Waiting on or reading from the child failed
    Io(io::Error),

    /// The child did not exit in time and was killed
    Timeout(Duration),

    /// The child exited unsuccessfully
    Status {
        status: ExitStatus,
        stdout: String,
        stderr: String,
    },
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            CommandError::Spawn(ref e) => write!(f, "unable to start process: {}", e),
            CommandError::Io(ref e) => write!(f, "unable to communicate with process: {}", e),
            CommandError::Timeout(d) => {
                write!(f, "process timed out after {} seconds", d.as_secs())
            }
            CommandError::Status {
                status,
                ref stdout,
                ref stderr,
            } => write!(
                f,
                "process exited with {}: stdout={},stderr={}",
                status, stdout, stderr
            ),
        }
    }
}

impl error::Error for CommandError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            CommandError::Spawn(ref e) | CommandError::Io(ref e) => Some(e),
            _ => None,
        }
    }
}

/// Drains a pipe on its own thread so a chatty child can't fill the pipe buffer and stall
/// before it exits.
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<io::Result<String>> {
    thread::spawn(move || {
        let mut out = String::new();
        if let Some(mut pipe) = pipe {
            pipe.read_to_string(&mut out)?;
        }
        Ok(out)
    })
}

fn collect(reader: JoinHandle<io::Result<String>>) -> Result<String, CommandError> {
    match reader.join() {
        Ok(out) => out.map_err(CommandError::Io),
        Err(_) => Err(CommandError::Io(io::Error::new(
            io::ErrorKind::Other,
            "pipe reader panicked",
        ))),
    }
}

fn kill(child: &mut Child) {
    if let Err(e) = child.kill() {
        log::debug!("unable to kill timed out process: {}", e);
    }

    // reap so the child doesn't linger as a zombie
    let _ = child.wait();
}

/// Runs `program` with `args` and returns its trimmed stdout. The child is killed if it hasn't
/// exited within `timeout`.
pub fn run_with_timeout(
    program: &Path,
    args: &[&str],
    timeout: Duration,
) -> Result<String, CommandError> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(CommandError::Spawn)?;

    // Readers of a killed child are left detached: a grandchild may still hold the pipes open.
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let status = match child.wait_timeout(timeout) {
        Ok(Some(status)) => status,
        Ok(None) => {
            kill(&mut child);
            return Err(CommandError::Timeout(timeout));
        }
        Err(e) => {
            kill(&mut child);
            return Err(CommandError::Io(e));
        }
    };

    let stdout = collect(stdout)?;
    if !status.success() {
        let stderr = collect(stderr)?;
        return Err(CommandError::Status {
            status,
            stdout: stdout.trim().to_owned(),
            stderr: stderr.trim().to_owned(),
        });
    }

    Ok(stdout.trim().to_owned())
}
