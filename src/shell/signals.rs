use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, warn};
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};

static CHILD_STATE_CHANGED: AtomicBool = AtomicBool::new(false);

/// Signals the shell shields itself from while it owns the terminal.
const INTERACTIVE_SIGNALS: [Signal; 4] = [
    Signal::SIGINT,
    Signal::SIGQUIT,
    Signal::SIGTSTP,
    Signal::SIGTTIN,
];

extern "C" fn on_sigchld(_: libc::c_int) {
    CHILD_STATE_CHANGED.store(true, Ordering::SeqCst);
}

fn set_handler(sig: Signal, handler: SigHandler) {
    let action = SigAction::new(handler, SaFlags::SA_RESTART, SigSet::empty());
    // SAFETY: the only custom handler installed here touches a single atomic.
    if let Err(e) = unsafe { signal::sigaction(sig, &action) } {
        warn!("sigaction({}) failed: {}", sig, e);
    }
}

/// `SIGTTOU` is always ignored so the shell can take the terminal back from
/// a background group; keyboard signals only when the shell is interactive.
pub fn ignore_block_signals(interactive: bool) {
    set_handler(Signal::SIGTTOU, SigHandler::SigIgn);
    if interactive {
        for sig in INTERACTIVE_SIGNALS {
            set_handler(sig, SigHandler::SigIgn);
        }
    }
    debug!("job control signals ignored (interactive={})", interactive);
}

pub fn setup_sigchld_handler() {
    set_handler(Signal::SIGCHLD, SigHandler::Handler(on_sigchld));
}

/// Returns whether any child changed state since the last call.
pub fn take_child_state_changed() -> bool {
    CHILD_STATE_CHANGED.swap(false, Ordering::SeqCst)
}

/// Puts every disposition the shell changed back to default. Called in forked
/// children before they exec or start running a background job.
pub fn restore_default_signals() {
    let action = SigAction::new(SigHandler::SigDfl, SaFlags::empty(), SigSet::empty());
    for sig in INTERACTIVE_SIGNALS
        .into_iter()
        .chain([Signal::SIGTTOU, Signal::SIGCHLD])
    {
        // SAFETY: restoring the default disposition.
        let _ = unsafe { signal::sigaction(sig, &action) };
    }
}
