//! Control layer of a deterministic execution replay tool.
//!
//! The replay engine (instruction stepping, register/memory reconstruction)
//! and the gdb wire-protocol server are external collaborators reached
//! through the seams in [`session`] and [`gdb_server`]. What lives here is
//! the orchestration around them: the headless replay-driving loop, the
//! two-process debugger-attach lifecycle with its parameter-pipe handshake,
//! the signal translation/blocking policy across that process pair, and the
//! checkpoint command channel injected into the debugger's own command
//! language.

#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate static_assertions;

#[macro_use]
pub mod log;
pub mod gdb_macros;
pub mod gdb_server;
pub mod kernel_metadata;
pub mod replay_signal;
pub mod replayer;
pub mod scoped_fd;
pub mod session;
pub mod sig;
pub mod trace_window;
