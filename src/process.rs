//! Process liveness checks for `--pid` style termination.

/// Answers whether a process is still running.
pub trait ProcessAlive: Send + Sync {
    /// False if the process has exited or cannot be queried.
    fn is_alive(&self, pid: u32) -> bool;
}

/// Liveness as reported by the operating system.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProcess;

impl ProcessAlive for SystemProcess {
    fn is_alive(&self, pid: u32) -> bool {
        if pid == 0 {
            return false;
        }
        is_pid_running(pid)
    }
}

#[cfg(target_os = "linux")]
fn is_pid_running(pid: u32) -> bool {
    std::path::Path::new(&format!("/proc/{}", pid)).exists()
}

#[cfg(all(unix, not(target_os = "linux")))]
fn is_pid_running(pid: u32) -> bool {
    let Ok(pid) = i32::try_from(pid) else {
        return false;
    };
    // SAFETY: signal 0 performs only the existence and permission check.
    // EPERM means the process exists but belongs to someone else.
    unsafe {
        libc::kill(pid, 0) == 0
            || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
    }
}

#[cfg(not(unix))]
fn is_pid_running(_pid: u32) -> bool {
    false
}
