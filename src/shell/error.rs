use std::io;

use nix::errno::Errno;
use thiserror::Error;

/// Malformed input line. The line is discarded and the shell keeps reading.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("syntax error near unexpected token `{0}'")]
    UnexpectedToken(String),
    #[error("syntax error: expected a file name after `{0}'")]
    MissingRedirectTarget(String),
    #[error("syntax error: unsupported redirection `{0}'")]
    UnsupportedRedirect(String),
    #[error("syntax error: redirection without a command")]
    MissingCommand,
    #[error("syntax error: unexpected end of line after `{0}'")]
    TrailingOperator(String),
}

/// Failures seen by the interpreter process while running a line.
#[derive(Error, Debug)]
pub enum ShellError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("{op} failed: {source}")]
    Resource {
        op: &'static str,
        #[source]
        source: Errno,
    },
    #[error("cd: {path}: {source}")]
    Builtin {
        path: String,
        #[source]
        source: Errno,
    },
    #[error("cd: too many arguments")]
    BuiltinUsage,
    #[error("argument contains a NUL byte: {0:?}")]
    InvalidArgument(String),
}

impl ShellError {
    pub fn resource(op: &'static str) -> impl FnOnce(Errno) -> ShellError {
        move |source| ShellError::Resource { op, source }
    }
}

/// Failures inside a forked child, between `fork` and `exec`. They are printed
/// on the child's stderr and turned into its exit status.
#[derive(Error, Debug)]
pub enum ChildError {
    #[error("{program}: command not found")]
    NotFound { program: String },
    #[error("{program}: {source}")]
    Exec {
        program: String,
        #[source]
        source: Errno,
    },
    #[error("{path}: {source}")]
    Redirect {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("{op} failed: {source}")]
    Wiring {
        op: &'static str,
        #[source]
        source: Errno,
    },
}

impl ChildError {
    pub fn exit_code(&self) -> i32 {
        match self {
            ChildError::NotFound { .. } => 127,
            ChildError::Exec {
                source: Errno::ENOENT,
                ..
            } => 127,
            ChildError::Exec { .. } => 126,
            ChildError::Redirect { .. } | ChildError::Wiring { .. } => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_exit_codes() {
        let not_found = ChildError::NotFound {
            program: "nope".to_string(),
        };
        assert_eq!(not_found.exit_code(), 127);
        assert_eq!(not_found.to_string(), "nope: command not found");

        let denied = ChildError::Exec {
            program: "/etc".to_string(),
            source: Errno::EACCES,
        };
        assert_eq!(denied.exit_code(), 126);

        let redirect = ChildError::Redirect {
            path: "/missing/out".to_string(),
            source: io::Error::from(io::ErrorKind::NotFound),
        };
        assert_eq!(redirect.exit_code(), 1);
    }

    #[test]
    fn test_parse_error_messages() {
        assert_eq!(
            ParseError::TrailingOperator("|".to_string()).to_string(),
            "syntax error: unexpected end of line after `|'"
        );
        let err: ShellError = ParseError::UnexpectedToken("(".to_string()).into();
        assert_eq!(err.to_string(), "syntax error near unexpected token `('");
    }
}
