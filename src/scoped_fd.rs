use nix::unistd::close;
use std::os::unix::io::RawFd;

/// Owns one end of a pipe (or any other fd) and guarantees it is closed on
/// every exit path of the owning scope. The two-process attach handshake
/// relies on this: each side must drop the pipe end it does not own promptly
/// so the other side's death is observable as EOF or a write error.
///
/// We DON'T want this to be Copy or Clone because of the Drop.
pub struct ScopedFd {
    fd: RawFd,
}

impl ScopedFd {
    pub fn new() -> Self {
        ScopedFd { fd: -1 }
    }

    pub fn from_raw(fd: RawFd) -> Self {
        ScopedFd { fd }
    }

    pub fn close(&mut self) {
        if self.fd >= 0 {
            // We swallow any error on close
            close(self.fd).unwrap_or(());
        }

        self.fd = -1;
    }

    pub fn is_open(&self) -> bool {
        self.fd >= 0
    }

    pub fn as_raw(&self) -> RawFd {
        self.fd
    }

    /// Give up ownership without closing.
    pub fn extract(&mut self) -> RawFd {
        let result = self.fd;
        self.fd = -1;
        result
    }

    pub fn unwrap(&self) -> RawFd {
        if self.fd < 0 {
            panic!("fd is closed");
        } else {
            self.fd
        }
    }
}

impl Default for ScopedFd {
    fn default() -> Self {
        ScopedFd::new()
    }
}

impl Drop for ScopedFd {
    fn drop(&mut self) {
        self.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::fcntl::OFlag;
    use nix::unistd::{pipe2, write};

    #[test]
    fn drop_closes_test() {
        let (read_fd, write_fd) = pipe2(OFlag::O_CLOEXEC).unwrap();
        let raw = write_fd;
        {
            let fd = ScopedFd::from_raw(write_fd);
            assert!(fd.is_open());
        }
        // A write to the closed end must now fail
        assert!(write(raw, b"x").is_err());
        let _ = ScopedFd::from_raw(read_fd);
    }

    #[test]
    fn extract_test() {
        let (read_fd, write_fd) = pipe2(OFlag::O_CLOEXEC).unwrap();
        let mut fd = ScopedFd::from_raw(write_fd);
        let raw = fd.extract();
        assert!(!fd.is_open());
        assert_eq!(raw, write_fd);
        close(raw).unwrap();
        close(read_fd).unwrap();
    }
}
