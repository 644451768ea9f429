//! Terminal mode snapshot, restored when Ctrl+C ends the process while the
//! password prompt has echo turned off.

use std::fs::{File, OpenOptions};
use std::os::fd::AsRawFd;

pub struct TerminalMode {
    tty: File,
    saved: libc::termios,
}

impl TerminalMode {
    /// The controlling terminal, which is where the password prompt reads.
    pub fn controlling() -> Option<Self> {
        let tty = OpenOptions::new()
            .read(true)
            .write(true)
            .open("/dev/tty")
            .ok()?;
        Self::capture(tty)
    }

    /// Attributes of `tty`, or `None` when it is not a terminal.
    pub fn capture(tty: File) -> Option<Self> {
        let fd = tty.as_raw_fd();
        if unsafe { libc::isatty(fd) } != 1 {
            return None;
        }
        let mut saved: libc::termios = unsafe { std::mem::zeroed() };
        if unsafe { libc::tcgetattr(fd, &mut saved) } != 0 {
            return None;
        }
        Some(Self { tty, saved })
    }

    pub fn restore(&self) {
        if unsafe { libc::tcsetattr(self.tty.as_raw_fd(), libc::TCSANOW, &self.saved) } != 0 {
            log::warn!(
                "Failed to restore terminal mode: {}",
                std::io::Error::last_os_error()
            );
        }
    }
}
