use std::fs::OpenOptions;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

use log::{debug, warn};
use nix::errno::Errno;
use nix::fcntl::{fcntl, FcntlArg};
use nix::unistd::{getpgrp, Pid};

/// Descriptors below this stay free for pipes and redirections.
const TTY_FD_FLOOR: RawFd = 10;

/// Arbitrates which process group owns the controlling terminal.
///
/// Created once at startup and passed by reference to whoever launches
/// foreground work. A shell without a terminal (or not in the terminal's
/// foreground group) gets a controller whose calls are successful no-ops.
#[derive(Debug)]
pub struct Terminal {
    tty: Option<OwnedFd>,
    shell_pgid: Pid,
    owns_foreground: bool,
}

impl Terminal {
    pub fn acquire() -> Self {
        let shell_pgid = getpgrp();
        let tty = match open_tty() {
            Ok(fd) => Some(fd),
            Err(e) => {
                debug!("no controlling terminal: {}", e);
                None
            }
        };
        let owns_foreground = match &tty {
            Some(fd) => match Errno::result(unsafe { libc::tcgetpgrp(fd.as_raw_fd()) }) {
                Ok(pgid) => Pid::from_raw(pgid) == shell_pgid,
                Err(e) => {
                    debug!("tcgetpgrp failed: {}", e);
                    false
                }
            },
            None => false,
        };
        debug!(
            "terminal: pgid={} owns_foreground={}",
            shell_pgid, owns_foreground
        );
        Self {
            tty,
            shell_pgid,
            owns_foreground,
        }
    }

    /// A controller that never touches the terminal, for background jobs.
    pub fn detached() -> Self {
        Self {
            tty: None,
            shell_pgid: getpgrp(),
            owns_foreground: false,
        }
    }

    pub fn owns_foreground(&self) -> bool {
        self.owns_foreground
    }

    pub fn shell_pgid(&self) -> Pid {
        self.shell_pgid
    }

    /// Gives the terminal to `group`, or back to the shell for `None`.
    pub fn set_foreground(&self, group: Option<Pid>) -> nix::Result<()> {
        let tty = match (&self.tty, self.owns_foreground) {
            (Some(tty), true) => tty,
            _ => return Ok(()),
        };
        let pgid = group.unwrap_or(self.shell_pgid);
        Errno::result(unsafe { libc::tcsetpgrp(tty.as_raw_fd(), pgid.as_raw()) }).map(drop)
    }

    /// Like `set_foreground`, but failures are only logged.
    pub fn hand_over(&self, group: Option<Pid>) {
        if let Err(e) = self.set_foreground(group) {
            warn!(
                "could not give the terminal to group {}: {}",
                group.unwrap_or(self.shell_pgid),
                e
            );
        }
    }
}

fn open_tty() -> std::io::Result<OwnedFd> {
    let file = OpenOptions::new().read(true).write(true).open("/dev/tty")?;
    let fd = fcntl(file.as_raw_fd(), FcntlArg::F_DUPFD_CLOEXEC(TTY_FD_FLOOR))?;
    // SAFETY: `fd` was just returned by fcntl and is owned by nobody else.
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}
