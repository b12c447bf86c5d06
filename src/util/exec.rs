use std::ffi::OsString;
use std::fs::OpenOptions;
use std::io;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use wait_timeout::ChildExt;

/// Structured command execution with timeouts and output capture.
///
/// Spawn failures keep their `io::Error` reachable through `downcast_ref`, so callers can
/// tell an OS refusal (argument list too long) apart from a non-zero exit.
#[derive(Debug, Clone)]
pub struct ExecService {
    default_timeout: Duration,
}

impl ExecService {
    /// `Duration::ZERO` waits without a deadline.
    pub fn new(default_timeout: Duration) -> Self {
        Self { default_timeout }
    }

    pub fn run(&self, request: ExecRequest) -> Result<ExecOutput> {
        let mut cmd = Command::new(&request.program);
        for arg in &request.args {
            cmd.arg(arg);
        }
        if let Some(ref cwd) = request.cwd {
            cmd.current_dir(cwd);
        }

        let capture = request.output_file.is_none();
        if let Some(ref path) = request.output_file {
            let out = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open output file {}", path.display()))?;
            let err = out.try_clone().context("failed to clone output file handle")?;
            cmd.stdout(Stdio::from(out)).stderr(Stdio::from(err));
        } else {
            cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        }
        cmd.stdin(Stdio::null());

        let mut child = cmd.spawn().with_context(|| {
            format!(
                "failed to spawn {:?} with {} argument(s)",
                request.program,
                request.args.len()
            )
        })?;

        // Drain pipes on helper threads so a chatty child cannot block on a full pipe.
        let stdout_reader = child.stdout.take().map(spawn_reader);
        let stderr_reader = child.stderr.take().map(spawn_reader);

        let timeout = self.default_timeout;
        let started = Instant::now();
        let status = if timeout.is_zero() {
            child.wait().context("failed to wait for process")?
        } else {
            match child
                .wait_timeout(timeout)
                .context("failed to wait with timeout")?
            {
                Some(status) => status,
                None => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(anyhow!(
                        "command {:?} timed out after {:?}",
                        request.program,
                        timeout
                    ));
                }
            }
        };

        let duration = started.elapsed();
        let (stdout, stderr) = if capture {
            (join_reader(stdout_reader)?, join_reader(stderr_reader)?)
        } else {
            (String::new(), String::new())
        };

        Ok(ExecOutput {
            status,
            duration,
            stdout,
            stderr,
        })
    }
}

type Reader = std::thread::JoinHandle<io::Result<String>>;

fn spawn_reader<R: io::Read + Send + 'static>(mut r: R) -> Reader {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        r.read_to_end(&mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    })
}

fn join_reader(handle: Option<Reader>) -> Result<String> {
    match handle {
        Some(h) => h
            .join()
            .map_err(|_| anyhow!("output reader thread panicked"))?
            .context("failed to read process output"),
        None => Ok(String::new()),
    }
}

impl Default for ExecService {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

#[derive(Debug, Default, Clone)]
pub struct ExecRequest {
    program: OsString,
    args: Vec<OsString>,
    cwd: Option<PathBuf>,
    output_file: Option<PathBuf>,
}

impl ExecRequest {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Append stdout and stderr to this file instead of capturing them.
    pub fn output_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_file = Some(path.into());
        self
    }

    /// Words of the command line, lossily converted, for logging.
    pub fn argv_lossy(&self) -> Vec<String> {
        std::iter::once(&self.program)
            .chain(self.args.iter())
            .map(|s| s.to_string_lossy().into_owned())
            .collect()
    }

    pub fn working_dir(&self) -> Option<&PathBuf> {
        self.cwd.as_ref()
    }
}

#[derive(Debug)]
pub struct ExecOutput {
    pub status: std::process::ExitStatus,
    pub duration: Duration,
    pub stdout: String,
    pub stderr: String,
}

/// True when the OS refused to start the process because the command line was too large
/// (E2BIG) or a path component was too long (ENAMETOOLONG, 36 on Linux, 63 on macOS).
pub fn is_command_too_long(err: &anyhow::Error) -> bool {
    let Some(ioe) = err.downcast_ref::<io::Error>() else {
        return false;
    };
    match ioe.raw_os_error() {
        Some(7) => true,
        Some(36) => cfg!(target_os = "linux"),
        Some(63) => cfg!(target_os = "macos"),
        _ => false,
    }
}
