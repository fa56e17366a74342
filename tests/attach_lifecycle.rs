//! Exercises the real fork/pipe lifecycle of the interactive attach: each
//! test forks an actual debug-server child (a scripted fake) and checks what
//! the client-launching parent does when the child dies before sending
//! connection parameters.

use rdb::gdb_server::DebugServer;
use rdb::replayer::{interactive_attach, ReplayFlags};
use rdb::scoped_fd::ScopedFd;
use rdb::session::Task;
use std::io;

/// Dies with a fixed exit status before writing anything to the params pipe.
struct ExitingServer {
    code: i32,
}

impl DebugServer for ExitingServer {
    type Connection = ();

    fn serve_replay_with_debugger(
        &mut self,
        _params_write_pipe: Option<&mut ScopedFd>,
    ) -> io::Result<()> {
        unsafe { libc::_exit(self.code) }
    }

    fn await_client_connection(&mut self, _t: &dyn Task) -> io::Result<Self::Connection> {
        unreachable!()
    }

    fn serve_debugger_requests(
        &mut self,
        _conn: &mut Self::Connection,
        _t: &mut dyn Task,
    ) -> io::Result<()> {
        unreachable!()
    }
}

/// Kills itself before writing anything to the params pipe.
struct SignaledServer;

impl DebugServer for SignaledServer {
    type Connection = ();

    fn serve_replay_with_debugger(
        &mut self,
        _params_write_pipe: Option<&mut ScopedFd>,
    ) -> io::Result<()> {
        unsafe {
            libc::kill(libc::getpid(), libc::SIGKILL);
        }
        unreachable!()
    }

    fn await_client_connection(&mut self, _t: &dyn Task) -> io::Result<Self::Connection> {
        unreachable!()
    }

    fn serve_debugger_requests(
        &mut self,
        _conn: &mut Self::Connection,
        _t: &mut dyn Task,
    ) -> io::Result<()> {
        unreachable!()
    }
}

/// Completes normally without ever writing connection parameters.
struct QuietServer;

impl DebugServer for QuietServer {
    type Connection = ();

    fn serve_replay_with_debugger(
        &mut self,
        _params_write_pipe: Option<&mut ScopedFd>,
    ) -> io::Result<()> {
        Ok(())
    }

    fn await_client_connection(&mut self, _t: &dyn Task) -> io::Result<Self::Connection> {
        unreachable!()
    }

    fn serve_debugger_requests(
        &mut self,
        _conn: &mut Self::Connection,
        _t: &mut dyn Task,
    ) -> io::Result<()> {
        unreachable!()
    }
}

#[test]
fn forwards_child_exit_status() {
    let mut server = ExitingServer { code: 7 };
    let code = interactive_attach(&ReplayFlags::default(), &mut server).unwrap();
    assert_eq!(code, 7);
}

#[test]
fn signal_terminated_child_yields_status_1() {
    let mut server = SignaledServer;
    let code = interactive_attach(&ReplayFlags::default(), &mut server).unwrap();
    assert_eq!(code, 1);
}

#[test]
fn eof_on_params_pipe_falls_through_to_supervision() {
    // The child exits 0 without writing parameters. If the parent tried to
    // launch a debugger anyway it would exec over this test process; getting
    // back here with the child's status proves it fell through to
    // supervision instead.
    let mut server = QuietServer;
    let code = interactive_attach(&ReplayFlags::default(), &mut server).unwrap();
    assert_eq!(code, 0);
}
