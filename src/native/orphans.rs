use std::fs;
use std::os::fd::RawFd;
use std::path::PathBuf;

use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;

/// Kernel name of an open pipe (`pipe:[inode]`), shared by every process
/// holding either end of it.
pub(super) fn pipe_identity(fd: RawFd) -> Option<PathBuf> {
    fs::read_link(format!("/proc/self/fd/{}", fd)).ok()
}

/// SIGKILLs every process except this one that holds any of `pipes` open.
/// Catches descendants that left the process group (setsid) and so
/// survived the group kill. Returns the number of processes signalled.
pub(super) fn kill_pipe_holders(pipes: &[PathBuf]) -> usize {
    if pipes.is_empty() {
        return 0;
    }

    let Ok(entries) = fs::read_dir("/proc") else {
        tracing::warn!("Cannot scan /proc for escaped processes");
        return 0;
    };

    let own = std::process::id();
    let mut killed = 0;
    for pid in entries
        .flatten()
        .filter_map(|entry| entry.file_name().into_string().ok()?.parse::<u32>().ok())
    {
        if pid == own || !holds_any(pid, pipes) {
            continue;
        }

        match kill(Pid::from_raw(pid as i32), Signal::SIGKILL) {
            Ok(()) => {
                tracing::warn!("Killed process {} that escaped its process group", pid);
                killed += 1;
            }
            Err(nix::errno::Errno::ESRCH) => {}
            Err(e) => tracing::warn!("Failed to kill escaped process {}: {}", pid, e),
        }
    }
    killed
}

fn holds_any(pid: u32, pipes: &[PathBuf]) -> bool {
    let Ok(fds) = fs::read_dir(format!("/proc/{}/fd", pid)) else {
        return false;
    };

    fds.flatten()
        .any(|fd| fs::read_link(fd.path()).is_ok_and(|target| pipes.contains(&target)))
}
