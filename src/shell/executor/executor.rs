use log::{debug, error, info};
use nix::unistd::{fork, setpgid, ForkResult, Pid};

use super::builtin::Builtin;
use super::pipeline::{flush_stdout, run_foreground, spawn, GroupMode, Outcome, RunningPipeline};
use crate::shell::error::ShellError;
use crate::shell::job_manager::{Job, JobManager, JobStatus};
use crate::shell::parser::ast::{Combinator, Conditional, Pipeline, Program};
use crate::shell::signals;
use crate::shell::terminal::Terminal;
use crate::utils::theme::Theme;

/// Walks a parsed line: `;` and `&` between conditionals, `&&` and `||`
/// between pipelines.
pub struct Executor<'a> {
    terminal: &'a Terminal,
    jobs: JobManager,
    mode: GroupMode,
    interactive: bool,
    theme: Theme,
}

/// Whether a pipeline joined by `gate` runs after one that ended with `status`.
pub fn should_run(gate: Option<Combinator>, status: i32) -> bool {
    match gate {
        None => true,
        Some(Combinator::And) => status == 0,
        Some(Combinator::Or) => status != 0,
    }
}

impl<'a> Executor<'a> {
    pub fn new(terminal: &'a Terminal, interactive: bool, theme: Theme) -> Self {
        Self {
            terminal,
            jobs: JobManager::new(),
            mode: GroupMode::NewGroup,
            interactive,
            theme,
        }
    }

    /// Runs a program and returns the status of its last foreground conditional.
    /// A resource failure aborts the rest of the program.
    pub fn execute(&mut self, program: &mut Program) -> Result<i32, ShellError> {
        let mut status = 0;
        for conditional in program.conditionals.iter_mut() {
            if conditional.background {
                self.launch_background(conditional)?;
                status = 0;
            } else {
                status = self.run_conditional(conditional)?;
            }
        }
        Ok(status)
    }

    pub fn run_conditional(&mut self, conditional: &mut Conditional) -> Result<i32, ShellError> {
        let mut status = 0;
        let mut gate = None;
        for pipeline in conditional.pipelines.iter_mut() {
            if should_run(gate, status) {
                status = self.run_pipeline(pipeline)?;
                pipeline.status = Some(status);
            } else {
                debug!("skipped `{}` after status {}", pipeline, status);
            }
            gate = pipeline.combinator;
        }
        Ok(status)
    }

    fn run_pipeline(&mut self, pipeline: &Pipeline) -> Result<i32, ShellError> {
        if let Some((builtin, argv)) = Builtin::lookup(pipeline) {
            return Ok(match builtin.run(argv) {
                Ok(()) => 0,
                Err(e) => {
                    self.report(&e);
                    1
                }
            });
        }

        debug!("running `{}`", pipeline);
        match run_foreground(pipeline, self.mode, self.terminal)? {
            Outcome::Exited(status) => Ok(status),
            Outcome::Stopped { status, running } => {
                let index = self.jobs.add_job(
                    running.job_id(),
                    running.pids,
                    pipeline.to_string(),
                    JobStatus::Stopped,
                );
                if self.interactive {
                    println!();
                    if let Some(job) = self.jobs.get_jobs().iter().find(|j| j.index == index) {
                        println!("{}", self.theme.job(job.to_string()));
                    }
                }
                Ok(status)
            }
        }
    }

    /// Starts a background conditional and records it as a job. A lone
    /// pipeline is spawned directly; a chain runs in a forked copy of the
    /// shell that leads its own process group.
    fn launch_background(&mut self, conditional: &mut Conditional) -> Result<(), ShellError> {
        let command = conditional.to_string();
        let direct = matches!(
            conditional.pipelines.as_slice(),
            [only] if Builtin::lookup(only).is_none()
        );
        let running = if direct {
            spawn(&conditional.pipelines[0], GroupMode::NewGroup, None)?
        } else {
            self.fork_chain(conditional)?
        };

        let pgid = running.job_id();
        let index = self
            .jobs
            .add_job(pgid, running.pids, command, JobStatus::Running);
        if self.interactive {
            println!("{}", self.theme.job(format!("[{}] {}", index, pgid)));
        }
        Ok(())
    }

    fn fork_chain(&self, conditional: &mut Conditional) -> Result<RunningPipeline, ShellError> {
        flush_stdout();
        // SAFETY: the shell is single-threaded; the child runs the chain and
        // leaves through `_exit`.
        match unsafe { fork() }.map_err(ShellError::resource("fork"))? {
            ForkResult::Child => {
                let _ = setpgid(Pid::from_raw(0), Pid::from_raw(0));
                signals::restore_default_signals();
                let terminal = Terminal::detached();
                let mut executor = Executor {
                    terminal: &terminal,
                    jobs: JobManager::new(),
                    mode: GroupMode::Inherit,
                    interactive: false,
                    theme: Theme::plain(),
                };
                let status = executor.run_conditional(conditional).unwrap_or_else(|e| {
                    executor.report(&e);
                    1
                });
                flush_stdout();
                // SAFETY: ends the forked copy without running the parent's
                // exit handlers.
                unsafe { libc::_exit(status & 0xff) }
            }
            ForkResult::Parent { child } => {
                if let Err(e) = setpgid(child, child) {
                    debug!("setpgid({}) in parent: {}", child, e);
                }
                Ok(RunningPipeline {
                    pgid: Some(child),
                    pids: vec![child],
                })
            }
        }
    }

    /// Reaps finished background jobs without blocking.
    pub fn reap_jobs(&mut self) -> Vec<Job> {
        let finished = self.jobs.reap();
        for job in &finished {
            info!("job [{}] finished: {:?} {}", job.index, job.status, job.command);
        }
        finished
    }

    pub fn jobs(&self) -> &JobManager {
        &self.jobs
    }

    pub fn report(&self, err: &ShellError) {
        error!("{}", err);
        eprintln!("{}", self.theme.error(format!("shell: {}", err)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_run() {
        assert!(should_run(None, 0));
        assert!(should_run(None, 1));
        assert!(should_run(Some(Combinator::And), 0));
        assert!(!should_run(Some(Combinator::And), 1));
        assert!(!should_run(Some(Combinator::Or), 0));
        assert!(should_run(Some(Combinator::Or), 127));
    }

    #[test]
    fn test_empty_program_is_a_no_op() {
        let terminal = Terminal::detached();
        let mut executor = Executor::new(&terminal, false, Theme::plain());
        let mut program = Program::default();
        assert!(matches!(executor.execute(&mut program), Ok(0)));
        assert!(executor.jobs().get_jobs().is_empty());
    }

    #[test]
    fn test_builtin_failure_sets_status_without_forking() {
        let terminal = Terminal::detached();
        let mut executor = Executor::new(&terminal, false, Theme::plain());
        let before = std::env::current_dir().ok();
        let mut program = match crate::shell::parser::parse_line("cd /no/such/dir/here") {
            Ok(program) => program,
            Err(e) => panic!("parse failed: {}", e),
        };
        assert!(matches!(executor.execute(&mut program), Ok(1)));
        assert_eq!(program.conditionals[0].pipelines[0].status, Some(1));
        assert_eq!(std::env::current_dir().ok(), before);
    }
}
