//! Spawns the child process with its stdout and stderr merged into a single
//! non-blocking pipe, stdin closed, and (best-effort) an enlarged pipe
//! buffer, the way a supervisor that must read without ever stalling the
//! 1-second tick needs to.
use std::{
    io,
    os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd},
    process::{Child, Command, Stdio},
};

use tracing::warn;

/// Pipe buffer size requested via `F_SETPIPE_SZ`. Linux-specific; failure to
/// set it is logged and otherwise ignored.
const PIPE_SIZE: libc::c_int = 1 << 20;

/// A spawned child plus the read end of its merged stdout/stderr pipe, in
/// non-blocking mode.
#[derive(Debug)]
pub struct ChildIo {
    pub child: Child,
    read_fd: OwnedFd,
}

impl ChildIo {
    /// Spawn `program` with `args`, stdin closed, stdout and stderr
    /// redirected to the read end of a pipe we create ourselves (so both
    /// streams interleave in write order), and `key`/`value` injected into
    /// the child's environment.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the pipe cannot be created or the child
    /// cannot be spawned.
    pub fn spawn(
        program: &str,
        args: &[String],
        env: impl IntoIterator<Item = (String, String)>,
    ) -> io::Result<Self> {
        let (read_fd, write_fd) = pipe()?;

        set_nonblocking(&read_fd)?;

        if let Err(e) = set_pipe_size(&write_fd, PIPE_SIZE) {
            warn!(error = %e, "failed to enlarge pipe buffer, continuing with the default size");
        }

        let stdout = dup_stdio(&write_fd)?;
        let stderr = dup_stdio(&write_fd)?;

        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .envs(env);

        let child = command.spawn()?;

        // the parent's copy of the write end must close so the read end
        // observes EOF once the child's own copies close on exit.
        drop(write_fd);

        Ok(Self { child, read_fd })
    }

    /// Attempt a single non-blocking read of up to `buf.len()` bytes.
    /// `EAGAIN`/`EWOULDBLOCK` is treated as "no data available" and yields
    /// `Ok(0)` rather than an error; a real EOF (pipe fully closed) also
    /// yields `Ok(0)`, indistinguishable from "nothing to read right now"
    /// at this layer -- callers rely on [`Child::try_wait`] to know the
    /// child has actually exited.
    pub fn try_read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let n = unsafe {
            libc::read(
                self.read_fd.as_raw_fd(),
                buf.as_mut_ptr().cast(),
                buf.len(),
            )
        };

        if n >= 0 {
            return Ok(n as usize);
        }

        let err = io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::EAGAIN) => Ok(0),
            _ => Err(err),
        }
    }
}

fn pipe() -> io::Result<(OwnedFd, OwnedFd)> {
    let mut fds: [RawFd; 2] = [0; 2];
    let rc = unsafe { libc::pipe(fds.as_mut_ptr()) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: `pipe(2)` just handed us two freshly-opened, uniquely-owned
    // file descriptors.
    unsafe { Ok((OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1]))) }
}

fn set_nonblocking(fd: &OwnedFd) -> io::Result<()> {
    let flags = unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    let rc = unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_SETFL, flags | libc::O_NONBLOCK) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn set_pipe_size(fd: &OwnedFd, size: libc::c_int) -> io::Result<()> {
    let rc = unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_SETPIPE_SZ, size) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Duplicate `fd` into a `Stdio` the child process can own a copy of.
fn dup_stdio(fd: &OwnedFd) -> io::Result<Stdio> {
    let dup = unsafe { libc::dup(fd.as_raw_fd()) };
    if dup < 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: `dup(2)` returned a freshly-opened, uniquely-owned descriptor.
    let owned = unsafe { OwnedFd::from_raw_fd(dup) };
    Ok(Stdio::from(owned))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{thread, time::Duration};

    #[test]
    fn try_read_returns_zero_when_nothing_is_pending() {
        let io = ChildIo::spawn("sleep", &["0.2".to_string()], std::iter::empty()).unwrap();
        let mut buf = [0u8; 64];
        assert_eq!(io.try_read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn try_read_sees_child_output() {
        let mut io = ChildIo::spawn(
            "sh",
            &["-c".to_string(), "echo hello".to_string()],
            std::iter::empty(),
        )
        .unwrap();
        io.child.wait().unwrap();

        thread::sleep(Duration::from_millis(50));

        let mut buf = [0u8; 64];
        let n = io.try_read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"hello\n");
    }

    #[test]
    fn spawn_injects_environment_variables() {
        let mut io = ChildIo::spawn(
            "sh",
            &["-c".to_string(), "echo $STREAMUP_ATTACHMENTS_DIR".to_string()],
            [("STREAMUP_ATTACHMENTS_DIR".to_string(), "/tmp/att".to_string())],
        )
        .unwrap();
        io.child.wait().unwrap();
        thread::sleep(Duration::from_millis(50));

        let mut buf = [0u8; 64];
        let n = io.try_read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"/tmp/att\n");
    }
}
