use std::fmt;

use shell_words::quote;

/// The standard stream a redirection replaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdin,
    Stdout,
    Stderr,
}

impl Stream {
    pub fn fd(self) -> i32 {
        match self {
            Stream::Stdin => libc::STDIN_FILENO,
            Stream::Stdout => libc::STDOUT_FILENO,
            Stream::Stderr => libc::STDERR_FILENO,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectTarget {
    File { path: String, append: bool },
    /// Duplicate another standard descriptor, as in `2>&1`.
    Descriptor(i32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirection {
    pub stream: Stream,
    pub target: RedirectTarget,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Command {
    pub argv: Vec<String>,
    /// In source order, at most one per stream.
    pub redirections: Vec<Redirection>,
    pub pipes_to_next: bool,
    pub pipe_head: bool,
}

impl Command {
    pub fn program(&self) -> Option<&str> {
        self.argv.first().map(String::as_str)
    }

    /// Records a redirection; a later one for the same stream replaces the earlier.
    pub fn redirect(&mut self, redirection: Redirection) {
        self.redirections.retain(|r| r.stream != redirection.stream);
        self.redirections.push(redirection);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combinator {
    And,
    Or,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pipeline {
    pub commands: Vec<Command>,
    /// Joins this pipeline to the next one in its conditional.
    pub combinator: Option<Combinator>,
    /// Exit status of the last stage, set once the pipeline has run in the foreground.
    pub status: Option<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Separator {
    Sequence,
    Background,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Conditional {
    pub pipelines: Vec<Pipeline>,
    pub separator: Option<Separator>,
    pub background: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Program {
    pub conditionals: Vec<Conditional>,
}

impl Program {
    pub fn is_empty(&self) -> bool {
        self.conditionals.is_empty()
    }
}

impl fmt::Display for Redirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.stream {
            Stream::Stdin => "<",
            Stream::Stdout => ">",
            Stream::Stderr => "2>",
        };
        match &self.target {
            RedirectTarget::File { path, append } => {
                let op = if *append { ">" } else { "" };
                write!(f, "{}{} {}", prefix, op, quote(path))
            }
            RedirectTarget::Descriptor(fd) => write!(f, "{}&{}", prefix, fd),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let words: Vec<_> = self.argv.iter().map(|arg| quote(arg)).collect();
        write!(f, "{}", words.join(" "))?;
        for redirection in &self.redirections {
            write!(f, " {}", redirection)?;
        }
        Ok(())
    }
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, command) in self.commands.iter().enumerate() {
            if i > 0 {
                write!(f, " | ")?;
            }
            write!(f, "{}", command)?;
        }
        Ok(())
    }
}

impl fmt::Display for Conditional {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for pipeline in &self.pipelines {
            write!(f, "{}", pipeline)?;
            match pipeline.combinator {
                Some(Combinator::And) => write!(f, " && ")?,
                Some(Combinator::Or) => write!(f, " || ")?,
                None => {}
            }
        }
        Ok(())
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let last = self.conditionals.len().saturating_sub(1);
        for (i, conditional) in self.conditionals.iter().enumerate() {
            write!(f, "{}", conditional)?;
            match conditional.separator {
                Some(Separator::Background) => write!(f, " &")?,
                Some(Separator::Sequence) if i < last => write!(f, " ;")?,
                _ => {}
            }
            if i < last {
                write!(f, " ")?;
            }
        }
        Ok(())
    }
}
