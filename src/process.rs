//! Host command execution.
//!
//! Every external tool the image build drives goes through [`Cmd`], so failures
//! all carry the program name, exit code and captured stderr. [`Pipeline`]
//! connects two commands stdout-to-stdin for the archiver/compressor chain.

use std::ffi::{OsStr, OsString};
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Output, Stdio};
use std::thread;

use log::debug;
use thiserror::Error;

/// Failure of a host command.
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{message} (`{program}` exit={}){}", exit_label(.code), stderr_tail(.stderr))]
    Failed {
        program: String,
        message: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("I/O error talking to `{program}`: {source}")]
    Io {
        program: String,
        #[source]
        source: io::Error,
    },
}

impl CommandError {
    /// Name of the program that failed.
    pub fn program(&self) -> &str {
        match self {
            Self::Spawn { program, .. } | Self::Failed { program, .. } | Self::Io { program, .. } => {
                program
            }
        }
    }
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "signal".to_string(),
    }
}

fn stderr_tail(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("\n  stderr: {}", trimmed)
    }
}

/// Captured result of a finished command.
#[derive(Debug)]
pub struct CommandResult {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    fn from_output(output: Output) -> Self {
        Self {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }
}

/// Builder for a single host command.
///
/// ```rust,ignore
/// Cmd::new("mkfs.vfat")
///     .args(["-n", "EFI"])
///     .arg_path(&image)
///     .error_msg("mkfs.vfat failed. Install dosfstools.")
///     .run()?;
/// ```
#[derive(Debug, Clone)]
pub struct Cmd {
    program: String,
    args: Vec<OsString>,
    dir: Option<PathBuf>,
    stdin: Option<Vec<u8>>,
    error_msg: Option<String>,
}

impl Cmd {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            dir: None,
            stdin: None,
            error_msg: None,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    pub fn arg_path(self, path: &Path) -> Self {
        self.arg(path.as_os_str())
    }

    /// Working directory for the child.
    pub fn dir(mut self, dir: &Path) -> Self {
        self.dir = Some(dir.to_path_buf());
        self
    }

    /// Bytes fed to the child's stdin, which is closed afterwards.
    pub fn stdin(mut self, input: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    pub fn error_msg(mut self, msg: impl Into<String>) -> Self {
        self.error_msg = Some(msg.into());
        self
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(dir) = &self.dir {
            cmd.current_dir(dir);
        }
        cmd
    }

    fn describe(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(&arg.to_string_lossy());
        }
        line
    }

    fn failure(&self, code: Option<i32>, stderr: String) -> CommandError {
        CommandError::Failed {
            program: self.program.clone(),
            message: self
                .error_msg
                .clone()
                .unwrap_or_else(|| format!("{} failed", self.program)),
            code,
            stderr,
        }
    }

    fn spawn_error(&self, source: io::Error) -> CommandError {
        CommandError::Spawn {
            program: self.program.clone(),
            source,
        }
    }

    /// Run to completion, capturing stdout and stderr.
    pub fn run(self) -> Result<CommandResult, CommandError> {
        debug!("$ {}", self.describe());

        let mut cmd = self.command();
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        cmd.stdin(if self.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });

        let mut child = cmd.spawn().map_err(|e| self.spawn_error(e))?;
        let feeder = feed_stdin(&mut child, self.stdin.clone());
        let output = child.wait_with_output().map_err(|e| CommandError::Io {
            program: self.program.clone(),
            source: e,
        })?;
        let fed = join_feeder(feeder);

        let result = CommandResult::from_output(output);
        if !result.success() {
            return Err(self.failure(result.status.code(), result.stderr));
        }
        // A child that exits cleanly without reading all of its input is fine.
        if let Err(e) = fed {
            if e.kind() != io::ErrorKind::BrokenPipe {
                return Err(CommandError::Io {
                    program: self.program,
                    source: e,
                });
            }
        }
        Ok(result)
    }

    /// Run with inherited stdout/stderr so the user sees progress.
    pub fn run_interactive(self) -> Result<ExitStatus, CommandError> {
        debug!("$ {}", self.describe());

        let mut cmd = self.command();
        cmd.stdin(Stdio::null());
        let status = cmd.status().map_err(|e| self.spawn_error(e))?;
        if !status.success() {
            return Err(self.failure(status.code(), String::new()));
        }
        Ok(status)
    }
}

type Feeder = Option<thread::JoinHandle<io::Result<()>>>;

fn feed_stdin(child: &mut Child, input: Option<Vec<u8>>) -> Feeder {
    let (Some(mut stdin), Some(input)) = (child.stdin.take(), input) else {
        return None;
    };
    Some(thread::spawn(move || {
        stdin.write_all(&input)?;
        // Dropping stdin closes the pipe and signals EOF.
        Ok(())
    }))
}

fn join_feeder(feeder: Feeder) -> io::Result<()> {
    match feeder {
        None => Ok(()),
        Some(handle) => handle
            .join()
            .unwrap_or_else(|_| Err(io::Error::new(io::ErrorKind::Other, "stdin writer panicked"))),
    }
}

/// Two commands connected stdout → stdin, with the second writing to a file.
///
/// The connection is a plain OS pipe between the children. The input for the
/// first command is written from a dedicated thread and each child is reaped
/// on its own thread, so neither a full pipe nor chatty stderr can stall the
/// chain.
#[derive(Debug)]
pub struct Pipeline {
    first: Cmd,
    second: Cmd,
}

impl Pipeline {
    pub fn new(first: Cmd, second: Cmd) -> Self {
        Self { first, second }
    }

    /// Feed `input` to the first command and send the second command's stdout to `output`.
    ///
    /// Both children are always reaped. The first command's failure takes
    /// precedence, then the second's, then any error writing the input. When
    /// the first command only died because the second stopped reading, the
    /// second command's failure is reported instead.
    pub fn run(self, input: Vec<u8>, output: File) -> Result<(), CommandError> {
        debug!("$ {} | {}", self.first.describe(), self.second.describe());

        let mut first = self.first.command();
        first
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        let mut first_child = first.spawn().map_err(|e| self.first.spawn_error(e))?;

        let Some(link) = first_child.stdout.take() else {
            reap(&mut first_child);
            return Err(CommandError::Io {
                program: self.first.program.clone(),
                source: io::Error::new(io::ErrorKind::BrokenPipe, "stdout not captured"),
            });
        };

        let mut second = self.second.command();
        second
            .stdin(Stdio::from(link))
            .stdout(Stdio::from(output))
            .stderr(Stdio::piped());
        let second_child = match second.spawn() {
            Ok(child) => child,
            Err(e) => {
                reap(&mut first_child);
                return Err(self.second.spawn_error(e));
            }
        };
        // Release the parent's handles on the link and the output file.
        drop(second);

        let feeder = feed_stdin(&mut first_child, Some(input));
        let second_waiter = thread::spawn(move || second_child.wait_with_output());

        let first_output = first_child.wait_with_output();
        let second_output = second_waiter
            .join()
            .unwrap_or_else(|_| Err(io::Error::new(io::ErrorKind::Other, "waiter panicked")));
        let fed = join_feeder(feeder);

        let first_output = first_output.map_err(|e| CommandError::Io {
            program: self.first.program.clone(),
            source: e,
        })?;
        let second_output = second_output.map_err(|e| CommandError::Io {
            program: self.second.program.clone(),
            source: e,
        })?;

        let first_failed = !first_output.status.success();
        let second_failed = !second_output.status.success();
        let first_stderr = String::from_utf8_lossy(&first_output.stderr).into_owned();

        // A reader that exits early takes the writer down with SIGPIPE/EPIPE.
        if first_failed && !(second_failed && lost_reader(&first_output.status, &first_stderr)) {
            return Err(self.first.failure(first_output.status.code(), first_stderr));
        }
        if second_failed {
            return Err(self.second.failure(
                second_output.status.code(),
                String::from_utf8_lossy(&second_output.stderr).into_owned(),
            ));
        }
        fed.map_err(|e| CommandError::Io {
            program: self.first.program,
            source: e,
        })
    }
}

/// Killed by a signal, or reported a broken pipe on stderr.
fn lost_reader(status: &ExitStatus, stderr: &str) -> bool {
    status.code().is_none() || stderr.contains("Broken pipe")
}

fn reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

/// Check whether a program is on `PATH`.
pub fn exists(program: &str) -> bool {
    which::which(program).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, OpenOptions};
    use tempfile::TempDir;

    #[test]
    fn test_run_captures_stdout() {
        let result = Cmd::new("echo").arg("hello").run().unwrap();
        assert!(result.success());
        assert_eq!(result.stdout.trim(), "hello");
    }

    #[test]
    fn test_run_feeds_stdin() {
        let result = Cmd::new("cat").stdin("label: dos\n").run().unwrap();
        assert_eq!(result.stdout, "label: dos\n");
    }

    #[test]
    fn test_failure_carries_message_and_code() {
        let err = Cmd::new("false")
            .error_msg("expected failure")
            .run()
            .unwrap_err();
        match &err {
            CommandError::Failed { program, code, .. } => {
                assert_eq!(program, "false");
                assert_eq!(*code, Some(1));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().starts_with("expected failure"));
    }

    #[test]
    fn test_missing_program_is_spawn_error() {
        let err = Cmd::new("definitely_not_a_real_command_12345")
            .run()
            .unwrap_err();
        assert!(matches!(err, CommandError::Spawn { .. }));
        assert_eq!(err.program(), "definitely_not_a_real_command_12345");
    }

    #[test]
    fn test_dir_sets_working_directory() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("marker"), "x").unwrap();
        let result = Cmd::new("ls").dir(temp.path()).run().unwrap();
        assert!(result.stdout.contains("marker"));
    }

    #[test]
    fn test_pipeline_appends_to_output() {
        let temp = TempDir::new().unwrap();
        let out = temp.path().join("out");
        fs::write(&out, "head\n").unwrap();

        let file = OpenOptions::new().append(true).open(&out).unwrap();
        Pipeline::new(Cmd::new("cat"), Cmd::new("cat"))
            .run(b"tail\n".to_vec(), file)
            .unwrap();

        assert_eq!(fs::read_to_string(&out).unwrap(), "head\ntail\n");
    }

    #[test]
    fn test_pipeline_handles_large_input() {
        let temp = TempDir::new().unwrap();
        let out = temp.path().join("out");
        let input = vec![b'a'; 4 * 1024 * 1024];

        let file = File::create(&out).unwrap();
        Pipeline::new(Cmd::new("cat"), Cmd::new("cat"))
            .run(input.clone(), file)
            .unwrap();

        assert_eq!(fs::read(&out).unwrap().len(), input.len());
    }

    #[test]
    fn test_pipeline_reports_failing_stage() {
        let temp = TempDir::new().unwrap();

        let file = File::create(temp.path().join("a")).unwrap();
        let err = Pipeline::new(Cmd::new("false"), Cmd::new("cat"))
            .run(b"x".to_vec(), file)
            .unwrap_err();
        assert_eq!(err.program(), "false");

        let file = File::create(temp.path().join("b")).unwrap();
        let err = Pipeline::new(
            Cmd::new("cat"),
            Cmd::new("sh").args(["-c", "cat >/dev/null; exit 3"]),
        )
        .run(b"x".to_vec(), file)
        .unwrap_err();
        assert_eq!(err.program(), "sh");

        // The reader quits first; the writer dies on the broken pipe.
        let file = File::create(temp.path().join("c")).unwrap();
        let err = Pipeline::new(
            Cmd::new("cat"),
            Cmd::new("sh").args(["-c", "echo 'gzip: bad' >&2; exit 3"]),
        )
        .run(vec![b'a'; 8 * 1024 * 1024], file)
        .unwrap_err();
        assert_eq!(err.program(), "sh");
        match err {
            CommandError::Failed { code, stderr, .. } => {
                assert_eq!(code, Some(3));
                assert!(stderr.contains("gzip: bad"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_exists() {
        assert!(exists("sh"));
        assert!(!exists("definitely_not_a_real_command_12345"));
    }
}
