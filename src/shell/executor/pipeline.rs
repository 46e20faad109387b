use std::ffi::CString;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::os::fd::{AsRawFd, IntoRawFd, OwnedFd, RawFd};
use std::os::unix::fs::OpenOptionsExt;

use log::{debug, warn};
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{close, dup2, execvp, fork, getpid, pipe, setpgid, ForkResult, Pid};

use crate::shell::error::{ChildError, ParseError, ShellError};
use crate::shell::parser::ast::{Pipeline, RedirectTarget, Redirection, Stream};
use crate::shell::signals;
use crate::shell::terminal::Terminal;

/// Where the processes of a pipeline are placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupMode {
    /// The first stage leads a fresh process group that later stages join.
    NewGroup,
    /// Stages stay in the caller's group (used inside a background job).
    Inherit,
}

struct Stage<'p> {
    name: &'p str,
    argv: Vec<CString>,
    redirections: &'p [Redirection],
    stdin: Option<RawFd>,
    stdout: Option<RawFd>,
}

/// Everything decided before the first fork: argv as C strings, every pipe,
/// and which pipe end each stage reads and writes. Children only read it.
struct Plan<'p> {
    stages: Vec<Stage<'p>>,
    pipes: Vec<(OwnedFd, OwnedFd)>,
}

impl<'p> Plan<'p> {
    fn new(pipeline: &'p Pipeline) -> Result<Self, ShellError> {
        let count = pipeline.commands.len();
        if count == 0 {
            return Err(ParseError::MissingCommand.into());
        }

        let mut stages = Vec::with_capacity(count);
        for command in &pipeline.commands {
            let name = command.program().ok_or(ParseError::MissingCommand)?;
            let argv = command
                .argv
                .iter()
                .map(|arg| {
                    CString::new(arg.as_str()).map_err(|_| ShellError::InvalidArgument(arg.clone()))
                })
                .collect::<Result<Vec<_>, _>>()?;
            stages.push(Stage {
                name,
                argv,
                redirections: &command.redirections,
                stdin: None,
                stdout: None,
            });
        }

        let pipes = (1..count)
            .map(|_| pipe().map_err(ShellError::resource("pipe")))
            .collect::<Result<Vec<_>, _>>()?;
        for (i, (read, write)) in pipes.iter().enumerate() {
            stages[i].stdout = Some(write.as_raw_fd());
            stages[i + 1].stdin = Some(read.as_raw_fd());
        }

        Ok(Plan { stages, pipes })
    }

    fn pipe_fds(&self) -> impl Iterator<Item = RawFd> + '_ {
        self.pipes
            .iter()
            .flat_map(|(read, write)| [read.as_raw_fd(), write.as_raw_fd()])
    }
}

/// Processes of a launched pipeline, in stage order.
#[derive(Debug, Clone)]
pub struct RunningPipeline {
    pub pgid: Option<Pid>,
    pub pids: Vec<Pid>,
}

impl RunningPipeline {
    /// Group id to report for the job: the group leader, or the first stage.
    pub fn job_id(&self) -> Pid {
        self.pgid
            .or_else(|| self.pids.first().copied())
            .unwrap_or(Pid::from_raw(0))
    }

    /// Waits for every stage. The status is the last stage's exit code, or
    /// 128 plus the signal number if it was killed. With `report_stops`, a
    /// stopped stage ends the wait and hands back the still-live processes.
    pub fn wait(self, report_stops: bool) -> Result<Outcome, ShellError> {
        let flags = if report_stops {
            Some(WaitPidFlag::WUNTRACED)
        } else {
            None
        };
        let last = self.pids.len().saturating_sub(1);
        let mut status = 0;

        for (i, &pid) in self.pids.iter().enumerate() {
            let code = loop {
                match waitpid(pid, flags) {
                    Ok(WaitStatus::Exited(_, code)) => break code,
                    Ok(WaitStatus::Signaled(_, sig, _)) => break 128 + sig as i32,
                    Ok(WaitStatus::Stopped(_, sig)) => {
                        debug!("process {} stopped by {}", pid, sig);
                        return Ok(Outcome::Stopped {
                            status: 128 + sig as i32,
                            running: RunningPipeline {
                                pgid: self.pgid,
                                pids: self.pids[i..].to_vec(),
                            },
                        });
                    }
                    Ok(_) | Err(Errno::EINTR) => continue,
                    Err(e) => return Err(ShellError::resource("waitpid")(e)),
                }
            };
            debug!("process {} finished with {}", pid, code);
            if i == last {
                status = code;
            }
        }
        Ok(Outcome::Exited(status))
    }

    /// Kills and reaps whatever was started before a launch failed.
    fn abandon(self) {
        for &pid in &self.pids {
            if let Err(e) = kill(pid, Signal::SIGKILL) {
                warn!("could not kill process {}: {}", pid, e);
            }
        }
        for &pid in &self.pids {
            while let Err(Errno::EINTR) = waitpid(pid, None) {}
        }
    }
}

#[derive(Debug)]
pub enum Outcome {
    Exited(i32),
    Stopped {
        status: i32,
        running: RunningPipeline,
    },
}

pub(crate) fn flush_stdout() {
    if let Err(e) = io::stdout().flush() {
        warn!("could not flush stdout: {}", e);
    }
}

/// Forks every stage of `pipeline` and returns without waiting. With a
/// `foreground` terminal each stage also gives it to the new group before
/// exec, so nothing runs while the group is still in the background.
pub fn spawn(
    pipeline: &Pipeline,
    mode: GroupMode,
    foreground: Option<&Terminal>,
) -> Result<RunningPipeline, ShellError> {
    let plan = Plan::new(pipeline)?;
    let mut running = RunningPipeline {
        pgid: None,
        pids: Vec::with_capacity(plan.stages.len()),
    };
    let mut failure = None;
    flush_stdout();

    for (index, stage) in plan.stages.iter().enumerate() {
        // Stage 0 asks for a new group (pgid 0); later stages join the leader.
        let group = match mode {
            GroupMode::NewGroup => Some(running.pgid.unwrap_or(Pid::from_raw(0))),
            GroupMode::Inherit => None,
        };

        // SAFETY: the shell is single-threaded; the child only wires
        // descriptors and execs, or exits.
        match unsafe { fork() } {
            Ok(ForkResult::Child) => exec_stage(&plan, stage, group, foreground),
            Ok(ForkResult::Parent { child }) => {
                if group.is_some() {
                    let pgid = running.pgid.unwrap_or(child);
                    // The child does the same; whichever runs first wins.
                    if let Err(e) = setpgid(child, pgid) {
                        debug!("setpgid({}, {}) in parent: {}", child, pgid, e);
                    }
                    running.pgid = Some(pgid);
                }
                debug!("stage {} `{}` started as {}", index, stage.name, child);
                running.pids.push(child);
            }
            Err(e) => {
                failure = Some(e);
                break;
            }
        }
    }

    // Closes the parent's copies of every pipe end.
    drop(plan);
    if let Some(e) = failure {
        running.abandon();
        return Err(ShellError::resource("fork")(e));
    }
    Ok(running)
}

/// Runs `pipeline` while its group owns the terminal, then takes the
/// terminal back.
pub fn run_foreground(
    pipeline: &Pipeline,
    mode: GroupMode,
    terminal: &Terminal,
) -> Result<Outcome, ShellError> {
    let running = spawn(pipeline, mode, Some(terminal))?;
    let pgid = running.pgid;
    if pgid.is_some() {
        terminal.hand_over(pgid);
    }
    let outcome = running.wait(mode == GroupMode::NewGroup);
    if pgid.is_some() {
        terminal.hand_over(None);
    }
    outcome
}

fn exec_stage(
    plan: &Plan,
    stage: &Stage,
    group: Option<Pid>,
    foreground: Option<&Terminal>,
) -> ! {
    if let Some(group) = group {
        // Pid 0 asks for a new group led by this stage.
        let pgid = if group == Pid::from_raw(0) { getpid() } else { group };
        let _ = setpgid(Pid::from_raw(0), pgid);
        if let Some(terminal) = foreground {
            // SIGTTOU is still ignored here, so this works from the background.
            let _ = terminal.set_foreground(Some(pgid));
        }
    }
    signals::restore_default_signals();

    let err = match wire_stage(plan, stage) {
        Ok(()) => exec_program(stage),
        Err(e) => e,
    };
    eprintln!("shell: {}", err);
    // SAFETY: leaves the forked child without running any of the parent's
    // exit handlers or destructors.
    unsafe { libc::_exit(err.exit_code()) }
}

fn wire_stage(plan: &Plan, stage: &Stage) -> Result<(), ChildError> {
    let wiring = |source| ChildError::Wiring { op: "dup2", source };
    if let Some(fd) = stage.stdin {
        dup2(fd, libc::STDIN_FILENO).map_err(wiring)?;
    }
    if let Some(fd) = stage.stdout {
        dup2(fd, libc::STDOUT_FILENO).map_err(wiring)?;
    }
    for fd in plan.pipe_fds() {
        if fd > libc::STDERR_FILENO {
            let _ = close(fd);
        }
    }
    // Applied after the pipe wiring so explicit redirections win.
    for redirection in stage.redirections {
        apply_redirection(redirection)?;
    }
    Ok(())
}

fn apply_redirection(redirection: &Redirection) -> Result<(), ChildError> {
    let wiring = |source| ChildError::Wiring { op: "dup2", source };
    let target_fd = redirection.stream.fd();

    match &redirection.target {
        RedirectTarget::Descriptor(fd) => {
            dup2(*fd, target_fd).map_err(wiring)?;
        }
        RedirectTarget::File { path, append } => {
            let mut options = OpenOptions::new();
            match redirection.stream {
                Stream::Stdin => options.read(true),
                Stream::Stdout | Stream::Stderr => options
                    .write(true)
                    .create(true)
                    .append(*append)
                    .truncate(!*append)
                    .mode(0o666),
            };
            let file = options.open(path).map_err(|source| ChildError::Redirect {
                path: path.clone(),
                source,
            })?;
            let fd = file.into_raw_fd();
            if fd != target_fd {
                dup2(fd, target_fd).map_err(wiring)?;
                let _ = close(fd);
            }
        }
    }
    Ok(())
}

fn exec_program(stage: &Stage) -> ChildError {
    match execvp(&stage.argv[0], &stage.argv) {
        Err(Errno::ENOENT) if !stage.name.contains('/') => ChildError::NotFound {
            program: stage.name.to_string(),
        },
        Err(source) => ChildError::Exec {
            program: stage.name.to_string(),
            source,
        },
        Ok(never) => match never {},
    }
}
