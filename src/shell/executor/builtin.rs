use log::debug;
use nix::unistd::chdir;

use crate::shell::error::ShellError;
use crate::shell::parser::ast::Pipeline;

pub const CD: &str = "cd";

/// Commands the shell runs in its own process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    ChangeDirectory,
}

impl Builtin {
    /// Only a pipeline made of a single builtin command runs in-process; a
    /// builtin name inside a longer pipeline is exec'd like any other program.
    pub fn lookup(pipeline: &Pipeline) -> Option<(Builtin, &[String])> {
        match pipeline.commands.as_slice() {
            [command] if command.program() == Some(CD) => {
                Some((Builtin::ChangeDirectory, &command.argv))
            }
            _ => None,
        }
    }

    pub fn run(self, argv: &[String]) -> Result<(), ShellError> {
        match self {
            Builtin::ChangeDirectory => builtin_cd(argv),
        }
    }
}

fn builtin_cd(argv: &[String]) -> Result<(), ShellError> {
    let path = match argv {
        [_] => "~",
        [_, path] => path.as_str(),
        _ => return Err(ShellError::BuiltinUsage),
    };
    let path = shellexpand::tilde(path);
    debug!("cd {}", path);
    chdir(&*path).map_err(|source| ShellError::Builtin {
        path: path.into_owned(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::parser::parse_line;
    use nix::errno::Errno;

    #[allow(clippy::unwrap_used)]
    fn first_pipeline(line: &str) -> Pipeline {
        parse_line(line).unwrap().conditionals[0].pipelines[0].clone()
    }

    #[test]
    fn test_lookup() {
        let pipeline = first_pipeline("cd /tmp");
        let (builtin, argv) = Builtin::lookup(&pipeline).unwrap_or_else(|| panic!("not found"));
        assert_eq!(builtin, Builtin::ChangeDirectory);
        assert_eq!(argv, ["cd".to_string(), "/tmp".to_string()]);

        assert!(Builtin::lookup(&first_pipeline("cd /tmp | cat")).is_none());
        assert!(Builtin::lookup(&first_pipeline("echo cd")).is_none());
        assert!(Builtin::lookup(&first_pipeline("cdx")).is_none());
    }

    #[test]
    fn test_too_many_arguments() {
        let argv = vec!["cd".to_string(), "a".to_string(), "b".to_string()];
        assert!(matches!(
            Builtin::ChangeDirectory.run(&argv),
            Err(ShellError::BuiltinUsage)
        ));
    }

    #[test]
    fn test_missing_directory_leaves_cwd_alone() {
        let before = std::env::current_dir().ok();
        let argv = vec!["cd".to_string(), "/definitely/not/a/dir".to_string()];
        match Builtin::ChangeDirectory.run(&argv) {
            Err(ShellError::Builtin { path, source }) => {
                assert_eq!(path, "/definitely/not/a/dir");
                assert_eq!(source, Errno::ENOENT);
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(std::env::current_dir().ok(), before);
    }
}
