//! Drives a recorded execution forward and, when asked, stands up the
//! two-process interactive debugger session: a forked debug-server child and
//! a gdb client that replaces the parent's process image once connection
//! parameters arrive over the one-shot parameter pipe.

use crate::{
    gdb_server::{
        debugger_launch_args, exec_debugger, write_macros_file, DebugServer, DebuggerParams,
    },
    log::{LogDebug, LogError, LogInfo},
    replay_signal::{arm_sigint_translation, set_sig_blockedness, set_waiting_for_child},
    scoped_fd::ScopedFd,
    session::{BreakReason, FrameTime, ReplaySession, ReplayStatus, RunCommand},
    sig,
};
use nix::{
    errno::Errno,
    fcntl::OFlag,
    sys::{
        signal::SigmaskHow,
        wait::{waitpid, WaitStatus},
    },
    unistd::{close, fork, getpid, pipe2, ForkResult, Pid},
};
use std::{
    ffi::OsString,
    io::{self, ErrorKind},
    os::unix::io::RawFd,
    path::PathBuf,
};

/// Configuration values for one replay run. Flag parsing happens elsewhere;
/// the orchestration state machine only ever sees this struct.
#[derive(Clone, Debug)]
pub struct ReplayFlags {
    /// Only open a debug socket, don't launch the debugger too.
    pub dont_launch_debugger: bool,

    /// Replay up to this event, then start a debug server for the task
    /// scheduled there. `FrameTime::MAX` means no target was requested.
    pub goto_event: FrameTime,

    /// Specify a custom gdb binary
    pub gdb_binary_file_path: PathBuf,

    /// Pass these options to gdb
    pub gdb_options: Vec<OsString>,
}

impl Default for ReplayFlags {
    fn default() -> Self {
        ReplayFlags {
            dont_launch_debugger: false,
            goto_event: FrameTime::MAX,
            gdb_binary_file_path: "gdb".into(),
            gdb_options: vec![],
        }
    }
}

/// Replay the whole trace headlessly: no debugger, no user interaction, no
/// forked processes.
///
/// While the engine reports `ReplayContinue`, the only break reasons it may
/// legally hand us are `BreakNone` and `BreakSignal`; anything else means
/// the engine entered a state this loop is not prepared to handle and
/// continuing could mask replay divergence, so the error is unrecoverable.
pub fn serve_replay_no_debugger(session: &mut dyn ReplaySession) -> io::Result<()> {
    loop {
        let result = session.replay_step(RunCommand::RunContinue);

        if result.status == ReplayStatus::ReplayExited {
            break;
        }
        debug_assert_eq!(result.status, ReplayStatus::ReplayContinue);
        match result.break_reason {
            BreakReason::BreakNone | BreakReason::BreakSignal => (),
            other => {
                return Err(io::Error::new(
                    ErrorKind::InvalidData,
                    format!(
                        "replay stopped for {:?} during headless replay; cannot continue",
                        other
                    ),
                ));
            }
        }
    }

    log!(LogInfo, "Replayer successfully finished");
    Ok(())
}

/// Top-level entry point of the attach state machine. The returned value is
/// the exit status the calling process must propagate, so supervisors see
/// the child's outcome even when the parent never managed to exec a
/// debugger.
pub fn replay<S: DebugServer>(
    flags: &ReplayFlags,
    create_session: impl FnOnce() -> Box<dyn ReplaySession>,
    server: &mut S,
) -> io::Result<i32> {
    // If we're not going to autolaunch the debugger, don't go through the
    // rigamarole to set that up. All it does is complicate the process tree
    // and confuse users.
    if flags.dont_launch_debugger {
        if flags.goto_event == FrameTime::MAX {
            let mut session = create_session();
            serve_replay_no_debugger(&mut *session)?;
        } else {
            server.serve_replay_with_debugger(None)?;
        }
        return Ok(0);
    }

    interactive_attach(flags, server)
}

/// Stand up the full two-process session: fork a debug-server child, then in
/// the parent wait for connection parameters and exec the gdb client over
/// ourselves.
pub fn interactive_attach<S: DebugServer>(flags: &ReplayFlags, server: &mut S) -> io::Result<i32> {
    arm_sigint_translation();

    let (params_read_fd, params_write_fd) = match pipe2(OFlag::O_CLOEXEC) {
        Ok(fds) => fds,
        Err(_) => fatal!("Couldn't open debugger params pipe."),
    };

    match unsafe { fork() } {
        Ok(ForkResult::Child) => run_server_child(server, params_read_fd, params_write_fd),
        Ok(ForkResult::Parent { child }) => {
            // Ensure only the child has the write end of the pipe open. Then
            // if the child dies, our reads from the pipe will return EOF.
            close(params_write_fd).unwrap_or(());
            set_waiting_for_child(child.as_raw());
            run_client_parent(flags, child, ScopedFd::from_raw(params_read_fd))
        }
        Err(_) => fatal!("Couldn't fork debugger server."),
    }
}

/// The debug-server side of the fork. Never returns; process exit is the
/// real termination signal to the parent, not any return value.
fn run_server_child<S: DebugServer>(
    server: &mut S,
    params_read_fd: RawFd,
    params_write_fd: RawFd,
) -> ! {
    // Ensure only the parent has the read end of the pipe open. Then if the
    // parent dies, our writes to the pipe will error out.
    close(params_read_fd).unwrap_or(());
    let mut params_write_pipe = ScopedFd::from_raw(params_write_fd);

    // The parent process (gdb) must be able to receive SIGINTs to interrupt
    // non-stopped tracees. But the debugger server isn't set up to handle
    // SIGINT, so block it; the parent's handler translates Ctrl-C into a
    // SIGTERM aimed at us instead.
    set_sig_blockedness(sig::SIGINT, SigmaskHow::SIG_BLOCK);

    let status = match server.serve_replay_with_debugger(Some(&mut params_write_pipe)) {
        Ok(()) => 0,
        Err(e) => {
            log!(LogError, "Debugger server failed: {:?}", e);
            1
        }
    };
    // process::exit runs no destructors; close the write end by hand so the
    // parent observes EOF before our exit handlers run.
    drop(params_write_pipe);
    std::process::exit(status);
}

/// The client-launching side of the fork. Either execs gdb (and so never
/// actually returns) or, if the child died before sending parameters,
/// supervises it and returns the exit status to propagate.
fn run_client_parent(
    flags: &ReplayFlags,
    child: Pid,
    params_pipe_read_fd: ScopedFd,
) -> io::Result<i32> {
    log!(LogDebug, "{}: forked debugger server {}", getpid(), child);

    let maybe_params = DebuggerParams::read_from(&params_pipe_read_fd)?;
    drop(params_pipe_read_fd);

    if let Some(params) = maybe_params {
        let macros_file = write_macros_file()?;
        let args = debugger_launch_args(
            &flags.gdb_binary_file_path,
            &flags.gdb_options,
            &macros_file,
            &params,
        );
        let err = exec_debugger(&args);
        fatal!(
            "Couldn't exec debugger {:?}: {:?}",
            flags.gdb_binary_file_path,
            err
        );
    }

    // Child must have died before we were able to get debugger parameters
    // and exec gdb. Exit with the exit status of the child.
    loop {
        match waitpid(child, None) {
            Err(Errno::EINTR) => continue,
            Err(e) => fatal!("waitpid({}) failed: {:?}", child, e),
            Ok(status) => {
                log!(LogDebug, "{}: waitpid({}) returned {:?}", getpid(), child, status);
                match status {
                    WaitStatus::Exited(_, code) => {
                        log!(LogInfo, "Debugger server died.  Exiting.");
                        return Ok(code);
                    }
                    WaitStatus::Signaled(_, _, _) => {
                        log!(LogInfo, "Debugger server died.  Exiting.");
                        return Ok(1);
                    }
                    _ => continue,
                }
            }
        }
    }
}
