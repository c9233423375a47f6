//! Child process helpers: console-less spawning and interrupt delivery.

use std::ffi::OsStr;
use std::io;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Apply the Windows `CREATE_NO_WINDOW` flag to child processes.
///
/// On non-Windows targets this is a no-op.
pub trait NoWindowExt {
    fn no_window(&mut self);
}

#[cfg(feature = "tokio")]
impl NoWindowExt for tokio::process::Command {
    fn no_window(&mut self) {
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            self.as_std_mut().creation_flags(CREATE_NO_WINDOW);
        }
    }
}

/// Create a `tokio::process::Command` with `CREATE_NO_WINDOW` applied on Windows.
///
/// The child is killed when its handle is dropped so an abandoned monitor
/// task never leaks a transcoder.
#[cfg(feature = "tokio")]
pub fn tokio_command(program: impl AsRef<OsStr>) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new(program);
    cmd.no_window();
    cmd.kill_on_drop(true);
    cmd
}

/// Ask a process to stop the way a terminal Ctrl-C would.
///
/// On unix this delivers `SIGINT`, which lets ffmpeg flush and close its
/// output. Elsewhere there is no interrupt equivalent, so the process is
/// killed outright.
#[cfg(all(feature = "tokio", unix))]
pub fn interrupt(child: &mut tokio::process::Child) -> io::Result<()> {
    match child.id() {
        Some(pid) => send_sigint(pid),
        // Already reaped; nothing to signal.
        None => Ok(()),
    }
}

/// Ask a process to stop; without `SIGINT` this is a plain kill.
#[cfg(all(feature = "tokio", not(unix)))]
pub fn interrupt(child: &mut tokio::process::Child) -> io::Result<()> {
    child.start_kill()
}

/// Deliver `SIGINT` to a process id.
#[cfg(unix)]
pub fn send_sigint(pid: u32) -> io::Result<()> {
    let pid = libc::pid_t::try_from(pid)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
    // SAFETY: kill(2) has no memory-safety preconditions.
    let rc = unsafe { libc::kill(pid, libc::SIGINT) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}
