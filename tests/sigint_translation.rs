//! Lives in its own test binary: it delivers a real SIGINT to itself, and no
//! other test's child process should be around to absorb a stray SIGTERM.

use nix::sys::signal::{raise, Signal};
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{fork, ForkResult};
use rdb::replay_signal::{arm_sigint_translation, set_waiting_for_child};
use std::{thread::sleep, time::Duration};

#[test]
fn sigint_is_translated_to_sigterm_for_the_waiting_child() {
    arm_sigint_translation();

    // A child that would outlive the test unless SIGTERM reaches it.
    let waited_child = match unsafe { fork() }.unwrap() {
        ForkResult::Child => loop {
            sleep(Duration::from_secs(10));
        },
        ForkResult::Parent { child } => child,
    };
    set_waiting_for_child(waited_child.as_raw());
    raise(Signal::SIGINT).unwrap();
    let status = waitpid(waited_child, None).unwrap();
    assert_eq!(
        status,
        WaitStatus::Signaled(waited_child, Signal::SIGTERM, false)
    );

    // With the slot back at the unset sentinel, SIGINT must not touch any
    // process: this child exits normally on its own.
    set_waiting_for_child(0);
    let unwaited_child = match unsafe { fork() }.unwrap() {
        ForkResult::Child => {
            sleep(Duration::from_millis(100));
            unsafe { libc::_exit(0) }
        }
        ForkResult::Parent { child } => child,
    };
    raise(Signal::SIGINT).unwrap();
    let status = waitpid(unwaited_child, None).unwrap();
    assert_eq!(status, WaitStatus::Exited(unwaited_child, 0));
}
