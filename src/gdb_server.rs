//! The seam to the debugger wire-protocol server, the parameter-pipe
//! handoff format, and the gdb client launch.
//!
//! The wire protocol itself (request dispatch, packet framing) is an
//! external collaborator consumed through [`DebugServer`]. What is owned
//! here: the one-shot `DebuggerParams` record a server writes through the
//! parameter pipe once it is ready to accept a client, the reading side of
//! that handshake with its EOF-means-child-died semantics, and replacing the
//! current process image with a gdb client configured with the checkpoint
//! macro set.

use crate::{
    gdb_macros::gdb_rdb_macros,
    log::LogDebug,
    scoped_fd::ScopedFd,
    session::Task,
};
use nix::{
    errno::Errno,
    unistd::{execvp, mkstemp, read, write},
};
use serde::{Deserialize, Serialize};
use std::{
    ffi::{CString, OsString},
    io::{self, ErrorKind},
    os::unix::ffi::OsStrExt,
    path::{Path, PathBuf},
};

/// How a launched gdb client finds the debug server: written by the server
/// through the parameter pipe, read by the client-launching parent.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct DebuggerParams {
    /// The image of the process being debugged.
    pub exe_image: PathBuf,
    pub host: String,
    pub port: u16,
}

impl DebuggerParams {
    /// Serialize one record into the pipe. The server calls this exactly
    /// once, then keeps serving; closing the write end without calling it is
    /// how a dying server signals the parent.
    pub fn write_to(&self, pipe: &ScopedFd) -> io::Result<()> {
        let buf = serde_json::to_vec(self)?;
        let mut written = 0;
        while written < buf.len() {
            match write(pipe.as_raw(), &buf[written..]) {
                Ok(n) => written += n,
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(nix_to_io(e)),
            }
        }
        Ok(())
    }

    /// Read connection parameters, blocking until the writing side has
    /// written them and closed its end. `Ok(None)` means the child died
    /// before parameters arrived (EOF or a short/corrupt record); the caller
    /// must fall through to child supervision instead of launching a
    /// half-configured debugger.
    pub fn read_from(pipe: &ScopedFd) -> io::Result<Option<DebuggerParams>> {
        let mut data: Vec<u8> = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            match read(pipe.as_raw(), &mut buf) {
                Ok(0) => break,
                Ok(n) => data.extend_from_slice(&buf[..n]),
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(nix_to_io(e)),
            }
        }
        if data.is_empty() {
            return Ok(None);
        }
        match serde_json::from_slice(&data) {
            Ok(params) => Ok(Some(params)),
            Err(e) => {
                log!(LogDebug, "Short or corrupt debugger params: {:?}", e);
                Ok(None)
            }
        }
    }
}

/// The debug-server collaborator: serves the gdb wire protocol against a
/// replay of the trace it was constructed for.
pub trait DebugServer {
    type Connection;

    /// Replay up to the configured target event, open the debug socket and
    /// serve the session until completion. If `params_write_pipe` is given,
    /// write a [`DebuggerParams`] record through it once ready to accept a
    /// client; `None` means no client process will be launched for us.
    fn serve_replay_with_debugger(
        &mut self,
        params_write_pipe: Option<&mut ScopedFd>,
    ) -> io::Result<()>;

    /// Block until a gdb client connects on a discoverable port scoped to
    /// `t`'s tid and thread-group id.
    fn await_client_connection(&mut self, t: &dyn Task) -> io::Result<Self::Connection>;

    /// Serve debugger requests against the single stopped task `t` until the
    /// session ends.
    fn serve_debugger_requests(
        &mut self,
        conn: &mut Self::Connection,
        t: &mut dyn Task,
    ) -> io::Result<()>;
}

/// Inline debugger attach for when replay hits an internal condition it
/// cannot recover from. The user is most likely already running a debugger
/// and wouldn't be able to control a second, forked one, so no fork/exec
/// handoff here: just open the socket and wait.
pub fn emergency_debug<S: DebugServer>(server: &mut S, t: &mut dyn Task) -> io::Result<()> {
    // We don't know whether `t` overshot a tool-internal breakpoint. If it
    // did, cover that breakpoint up before the user's debugger can see it.
    t.destroy_all_breakpoints();

    let mut conn = server.await_client_connection(t)?;
    server.serve_debugger_requests(&mut conn, t)
}

/// Write the checkpoint macro set to a fresh file gdb can source with `-x`.
pub fn write_macros_file() -> io::Result<PathBuf> {
    let (fd, path) = mkstemp("/tmp/rdb-gdb-macros-XXXXXX").map_err(nix_to_io)?;
    let file = ScopedFd::from_raw(fd);
    let text = gdb_rdb_macros().as_bytes();
    let mut written = 0;
    while written < text.len() {
        match write(file.as_raw(), &text[written..]) {
            Ok(n) => written += n,
            Err(Errno::EINTR) => continue,
            Err(e) => return Err(nix_to_io(e)),
        }
    }
    Ok(path)
}

/// Build the argv (argv[0] included) for the gdb client, configured with the
/// macro set and the connection parameters received over the pipe.
pub fn debugger_launch_args(
    gdb_binary_file_path: &Path,
    gdb_options: &[OsString],
    macros_file: &Path,
    params: &DebuggerParams,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = Vec::new();
    args.push(gdb_binary_file_path.as_os_str().to_os_string());
    // Don't let a hung remote target block gdb's startup forever.
    args.push("-l".into());
    args.push("10000".into());
    args.push("-x".into());
    args.push(macros_file.as_os_str().to_os_string());
    args.extend(gdb_options.iter().cloned());
    args.push("-ex".into());
    args.push(format!("target extended-remote {}:{}", params.host, params.port).into());
    args.push(params.exe_image.clone().into());
    args
}

/// Replace the current process image with the debugger client. Returns only
/// the error when the replacement failed.
pub fn exec_debugger(args: &[OsString]) -> io::Error {
    let mut cargs: Vec<CString> = Vec::with_capacity(args.len());
    for a in args {
        match CString::new(a.as_bytes()) {
            Ok(c) => cargs.push(c),
            Err(e) => return io::Error::new(ErrorKind::InvalidInput, e),
        }
    }
    let carg_refs: Vec<&CString> = cargs.iter().collect();
    match execvp(&cargs[0], &carg_refs) {
        Ok(_) => unreachable!(),
        Err(e) => nix_to_io(e),
    }
}

fn nix_to_io(e: nix::Error) -> io::Error {
    match e.as_errno() {
        Some(errno) => io::Error::from_raw_os_error(errno as i32),
        None => io::Error::new(ErrorKind::Other, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use libc::pid_t;
    use nix::fcntl::OFlag;
    use nix::unistd::pipe2;
    use std::{cell::RefCell, fs, rc::Rc};

    fn params() -> DebuggerParams {
        DebuggerParams {
            exe_image: PathBuf::from("/bin/true"),
            host: "127.0.0.1".into(),
            port: 12345,
        }
    }

    #[test]
    fn params_roundtrip_test() {
        let (read_fd, write_fd) = pipe2(OFlag::O_CLOEXEC).unwrap();
        let read_end = ScopedFd::from_raw(read_fd);
        let mut write_end = ScopedFd::from_raw(write_fd);

        params().write_to(&write_end).unwrap();
        write_end.close();

        let got = DebuggerParams::read_from(&read_end).unwrap();
        assert_eq!(got, Some(params()));
    }

    #[test]
    fn params_eof_means_no_params_test() {
        let (read_fd, write_fd) = pipe2(OFlag::O_CLOEXEC).unwrap();
        let read_end = ScopedFd::from_raw(read_fd);
        let mut write_end = ScopedFd::from_raw(write_fd);

        // Writer dies without writing anything
        write_end.close();

        let got = DebuggerParams::read_from(&read_end).unwrap();
        assert_eq!(got, None);
    }

    #[test]
    fn params_short_write_means_no_params_test() {
        let (read_fd, write_fd) = pipe2(OFlag::O_CLOEXEC).unwrap();
        let read_end = ScopedFd::from_raw(read_fd);
        let mut write_end = ScopedFd::from_raw(write_fd);

        // Writer dies partway through the record
        write(write_end.as_raw(), b"{\"exe_image\":\"/bin").unwrap();
        write_end.close();

        let got = DebuggerParams::read_from(&read_end).unwrap();
        assert_eq!(got, None);
    }

    #[test]
    fn launch_args_test() {
        let p = params();
        let args = debugger_launch_args(
            Path::new("gdb"),
            &["--fullname".into()],
            Path::new("/tmp/macros"),
            &p,
        );
        assert_eq!(args[0], OsString::from("gdb"));
        assert!(args.contains(&OsString::from("-x")));
        assert!(args.contains(&OsString::from("/tmp/macros")));
        assert!(args.contains(&OsString::from("--fullname")));
        assert!(args.contains(&OsString::from("target extended-remote 127.0.0.1:12345")));
        assert_eq!(*args.last().unwrap(), OsString::from("/bin/true"));
    }

    struct FakeTask {
        events: Rc<RefCell<Vec<&'static str>>>,
    }

    impl Task for FakeTask {
        fn tid(&self) -> pid_t {
            100
        }
        fn tgid(&self) -> pid_t {
            100
        }
        fn destroy_all_breakpoints(&mut self) {
            self.events.borrow_mut().push("destroy_breakpoints");
        }
    }

    struct FakeServer {
        events: Rc<RefCell<Vec<&'static str>>>,
    }

    impl DebugServer for FakeServer {
        type Connection = ();

        fn serve_replay_with_debugger(
            &mut self,
            _params_write_pipe: Option<&mut ScopedFd>,
        ) -> io::Result<()> {
            Ok(())
        }

        fn await_client_connection(&mut self, t: &dyn Task) -> io::Result<Self::Connection> {
            assert_eq!(t.tgid(), 100);
            self.events.borrow_mut().push("await_connection");
            Ok(())
        }

        fn serve_debugger_requests(
            &mut self,
            _conn: &mut Self::Connection,
            _t: &mut dyn Task,
        ) -> io::Result<()> {
            self.events.borrow_mut().push("serve_requests");
            Ok(())
        }
    }

    #[test]
    fn emergency_debug_removes_breakpoints_first_test() {
        let events = Rc::new(RefCell::new(Vec::new()));
        let mut t = FakeTask {
            events: events.clone(),
        };
        let mut server = FakeServer {
            events: events.clone(),
        };
        emergency_debug(&mut server, &mut t).unwrap();
        assert_eq!(
            *events.borrow(),
            vec!["destroy_breakpoints", "await_connection", "serve_requests"]
        );
    }

    #[test]
    fn macros_file_test() {
        let path = write_macros_file().unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("define checkpoint"));
        assert!(text.contains("handle SIGURG stop"));
        fs::remove_file(&path).unwrap();
    }
}
