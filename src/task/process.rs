//! OS process helpers for background tasks.

use std::fs::File;
use std::io::{self, Write};
use std::os::unix::io::AsRawFd;
use std::time::{Duration, Instant};
use sysinfo::{Pid, System};
use tracing::debug;

const REAP_POLL: Duration = Duration::from_millis(20);

/// Whether a forked child has been collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reap {
    Alive,
    Exited,
}

/// Fork and run `child` in the new process, which exits when it returns.
///
/// Returns the child's pid in the parent.
///
/// Only the calling thread exists in the child. Any lock another thread held
/// at fork time (the stdout lock, a tracing subscriber, a user mutex) stays
/// held forever there, so `child` must not wait on locks shared with other
/// threads. Start tasks from a single-threaded context where possible.
pub fn spawn_forked<F: FnOnce()>(child: F) -> io::Result<u32> {
    // Anything still buffered would otherwise be written twice
    let _ = io::stdout().flush();

    match unsafe { libc::fork() } {
        -1 => Err(io::Error::last_os_error()),
        0 => {
            child();
            let _ = io::stdout().flush();
            unsafe { libc::_exit(0) }
        }
        pid => Ok(pid as u32),
    }
}

/// Restore default SIGINT/SIGTERM handling in a forked child.
pub fn reset_signals() {
    unsafe {
        libc::signal(libc::SIGINT, libc::SIG_DFL);
        libc::signal(libc::SIGTERM, libc::SIG_DFL);
    }
}

/// Point file descriptor 1 at `file`.
pub fn redirect_stdout(file: &File) -> io::Result<()> {
    if unsafe { libc::dup2(file.as_raw_fd(), libc::STDOUT_FILENO) } == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

pub fn is_alive(pid: u32) -> bool {
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}

pub fn send_signal(pid: u32, signal: libc::c_int) -> bool {
    unsafe { libc::kill(pid as libc::pid_t, signal) == 0 }
}

/// Collect `pid` without blocking.
pub fn try_reap(pid: u32) -> Reap {
    let mut status: libc::c_int = 0;
    match unsafe { libc::waitpid(pid as libc::pid_t, &mut status, libc::WNOHANG) } {
        0 => Reap::Alive,
        // -1 means it is not our child or it was collected already
        _ => Reap::Exited,
    }
}

/// Every process below `pid`, children before grandchildren.
pub fn descendants(pid: u32) -> Vec<u32> {
    let mut system = System::new();
    system.refresh_processes();

    let mut found = Vec::new();
    let mut frontier = vec![Pid::from_u32(pid)];
    while let Some(parent) = frontier.pop() {
        for (child, process) in system.processes() {
            if process.parent() == Some(parent) {
                found.push(child.as_u32());
                frontier.push(*child);
            }
        }
    }
    found
}

/// SIGTERM `pid`, wait up to `grace` for it to exit, then SIGKILL and reap.
pub fn terminate(pid: u32, grace: Duration) {
    send_signal(pid, libc::SIGTERM);

    let deadline = Instant::now() + grace;
    while Instant::now() < deadline {
        if try_reap(pid) == Reap::Exited {
            return;
        }
        std::thread::sleep(REAP_POLL);
    }

    debug!(pid, "Process ignored SIGTERM, killing");
    send_signal(pid, libc::SIGKILL);
    let mut status: libc::c_int = 0;
    unsafe {
        libc::waitpid(pid as libc::pid_t, &mut status, 0);
    }
}
