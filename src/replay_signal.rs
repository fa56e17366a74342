//! Signal policy across the replay/debugger process pair.
//!
//! Two separate concerns live here. The classifier says which signals are
//! meaningless to a replaying process and can be ignored outright. The
//! SIGINT bridge covers the interactive attach: the gdb client running in
//! the parent blocks SIGINT for its own control purposes, so a terminal
//! Ctrl-C aimed at the pair has to be translated into a SIGTERM sent to the
//! debug-server child, which does forward it into replay as a termination
//! request.

use crate::{
    kernel_metadata::signal_name,
    sig::{self, Sig},
};
use libc::pid_t;
use nix::sys::signal::{sigaction, sigprocmask, SaFlags, SigAction, SigHandler, SigSet, SigmaskHow};
use std::sync::atomic::{AtomicI32, Ordering};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SignalDisposition {
    /// Safe to drop on the floor while replaying.
    Ignorable,
    /// This layer has no policy for it; the caller must deal with it.
    Unhandled,
}

/// Classify `sig` for a process that is replaying a recorded execution.
///
/// SIGCHLD can arrive after tasks die during replay. We don't care about
/// SIGCHLD unless it was recorded, in which case its delivery is emulated by
/// the engine. SIGWINCH arrives when the user resizes the terminal window;
/// not relevant to replay.
pub fn classify_replay_signal(sig: Sig) -> SignalDisposition {
    match sig {
        sig::SIGCHLD | sig::SIGWINCH => SignalDisposition::Ignorable,
        _ => SignalDisposition::Unhandled,
    }
}

/// The pid of the debug-server child the parent is currently waiting on, or
/// 0 when there is none. A single word because the signal handler may run
/// nested inside arbitrary other code; it is only ever read, compared and
/// passed to kill(2) from that context.
static WAITING_FOR_CHILD: AtomicI32 = AtomicI32::new(0);

pub fn set_waiting_for_child(pid: pid_t) {
    WAITING_FOR_CHILD.store(pid, Ordering::SeqCst);
}

pub fn waiting_for_child() -> pid_t {
    WAITING_FOR_CHILD.load(Ordering::SeqCst)
}

extern "C" fn handle_signal(sig: libc::c_int) {
    match sig {
        libc::SIGINT => {
            // Translate the SIGINT into SIGTERM for the debugger server,
            // because it's blocking SIGINT. We don't use SIGINT for
            // anything, so all it's meant to do is kill us, and SIGTERM
            // works just as well for that.
            let pid = WAITING_FOR_CHILD.load(Ordering::SeqCst);
            if pid > 0 {
                unsafe {
                    libc::kill(pid, libc::SIGTERM);
                }
            }
        }
        _ => fatal!("Unhandled signal {}", signal_name(sig)),
    }
}

/// Install the SIGINT-to-SIGTERM translation handler. Armed only while an
/// interactive debugger session is being attached.
pub fn arm_sigint_translation() {
    let sa = SigAction::new(
        SigHandler::Handler(handle_signal),
        SaFlags::empty(),
        SigSet::empty(),
    );
    if unsafe { sigaction(sig::SIGINT.as_nix_signal(), &sa) }.is_err() {
        fatal!("Couldn't set sigaction for SIGINT.");
    }
}

/// Set the blocked-ness of `sig` in the calling process's signal mask.
pub fn set_sig_blockedness(sig: Sig, blockedness: SigmaskHow) {
    let mut sset = SigSet::empty();
    sset.add(sig.as_nix_signal());
    if sigprocmask(blockedness, Some(&sset), None).is_err() {
        fatal!("Didn't change sigmask.");
    }
}
