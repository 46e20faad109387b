use std::error::Error;
use std::io::{self, Write};
use std::process;

use log::{debug, error, info};

use crate::shell::executor::Executor;
use crate::shell::input::LineReader;
use crate::shell::parser::parse_line;
use crate::shell::signals;
use crate::shell::terminal::Terminal;
use crate::utils::config::Config;
use crate::utils::theme::{load_theme, Theme};

pub struct Shell<'a> {
    theme: Theme,
    terminal: &'a Terminal,
    input: LineReader,
    executor: Executor<'a>,
    prompting: bool,
}

impl<'a> Shell<'a> {
    /// `prompting` is off for `-q` and for script files; it also decides
    /// whether job notices are printed and whether diagnostics are colored.
    pub fn new(config: &Config, terminal: &'a Terminal, input: LineReader, prompting: bool) -> Self {
        let color = config.color.enabled(prompting);
        Self {
            theme: load_theme(color),
            terminal,
            input,
            executor: Executor::new(terminal, prompting, load_theme(color)),
            prompting,
        }
    }

    pub fn run(&mut self) -> Result<(), Box<dyn Error>> {
        debug!(
            "starting shell (pid {}, pgid {})",
            process::id(),
            self.terminal.shell_pgid()
        );

        signals::ignore_block_signals(self.terminal.owns_foreground());
        signals::setup_sigchld_handler();
        // Claim the terminal for our own group in case we were started from
        // a pipeline that left it elsewhere.
        self.terminal.hand_over(None);

        self.run_loop()?;

        let left = self.executor.jobs().get_jobs().len();
        if left > 0 {
            info!("leaving {} background job(s) running", left);
        }
        debug!("end of input, leaving shell");
        Ok(())
    }

    fn run_loop(&mut self) -> Result<(), Box<dyn Error>> {
        loop {
            self.report_jobs();
            if self.prompting {
                print!("shell[{}]$ ", process::id());
                io::stdout().flush()?;
            }

            match self.input.read_line() {
                Ok(Some(line)) => self.handle_input(&line),
                Ok(None) => break,
                Err(e) => {
                    error!("failed to read input: {}", e);
                    eprintln!("{}", self.theme.error(format!("shell: {}", e)));
                    return Err(e.into());
                }
            }
        }
        if self.prompting {
            println!();
        }
        Ok(())
    }

    fn handle_input(&mut self, line: &str) {
        let mut program = match parse_line(line) {
            Ok(program) => program,
            Err(e) => {
                info!("rejected line {:?}: {}", line, e);
                eprintln!("{}", self.theme.error(format!("shell: {}", e)));
                return;
            }
        };
        if program.is_empty() {
            return;
        }

        debug!("parsed: {}", program);
        match self.executor.execute(&mut program) {
            Ok(status) => debug!("line finished with status {}", status),
            Err(e) => self.executor.report(&e),
        }
    }

    fn report_jobs(&mut self) {
        if !signals::take_child_state_changed() {
            return;
        }
        for job in self.executor.reap_jobs() {
            if self.prompting {
                println!("{}", self.theme.job(job.to_string()));
            }
        }
    }
}
