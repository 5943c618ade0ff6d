use crate::error::DeviceError;
use crate::hw::PcmHandle;
use nix::libc;
use nix::poll::PollFlags;
use std::io::{Error, ErrorKind};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Ready,
    Cancelled,
}

/// Write side of the cancellation pipe. Cloneable, usable from any thread.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    fd: Arc<OwnedFd>,
    // Keeps the pipe readable so a late cancel never hits a closed reader.
    _rx: Arc<OwnedFd>,
}

impl CancelHandle {
    /// Wakes the waiter. Cancellation is sticky: every later wait returns
    /// `Cancelled` as well.
    pub fn cancel(&self) -> std::io::Result<()> {
        let byte = 1_u8;
        let n = unsafe {
            libc::write(
                self.fd.as_raw_fd(),
                &byte as *const u8 as *const libc::c_void,
                1,
            )
        };
        if n >= 0 {
            return Ok(());
        }
        let e = Error::last_os_error();
        // A full pipe is already signalled.
        if e.kind() == ErrorKind::WouldBlock {
            return Ok(());
        }
        Err(e)
    }
}

#[derive(Debug)]
pub struct CancelReceiver {
    fd: Arc<OwnedFd>,
}

pub fn cancel_pair() -> std::io::Result<(CancelHandle, CancelReceiver)> {
    let mut fds = [0 as libc::c_int; 2];
    if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
        return Err(Error::last_os_error());
    }
    let (rx, tx) = unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };
    for fd in [&rx, &tx] {
        set_nonblock_cloexec(fd)?;
    }
    let rx = Arc::new(rx);
    Ok((
        CancelHandle {
            fd: Arc::new(tx),
            _rx: rx.clone(),
        },
        CancelReceiver { fd: rx },
    ))
}

fn set_nonblock_cloexec(fd: &OwnedFd) -> std::io::Result<()> {
    let raw = fd.as_raw_fd();
    unsafe {
        let flags = libc::fcntl(raw, libc::F_GETFL);
        if flags < 0 || libc::fcntl(raw, libc::F_SETFL, flags | libc::O_NONBLOCK) < 0 {
            return Err(Error::last_os_error());
        }
        if libc::fcntl(raw, libc::F_SETFD, libc::FD_CLOEXEC) < 0 {
            return Err(Error::last_os_error());
        }
    }
    Ok(())
}

/// Blocks until the hardware wants data or the stream is being stopped.
///
/// Polls the hardware descriptors plus one cancellation descriptor, which is
/// always the last entry, with no timeout.
#[derive(Debug)]
pub struct Waiter {
    fds: Vec<libc::pollfd>,
    hw_count: usize,
    _cancel: CancelReceiver,
}

impl Waiter {
    pub fn new<H: PcmHandle>(handle: &H, cancel: CancelReceiver) -> Result<Self, DeviceError> {
        let mut fds = handle.poll_descriptors().map_err(DeviceError::Hardware)?;
        let hw_count = fds.len();
        fds.push(libc::pollfd {
            fd: cancel.fd.as_raw_fd(),
            events: PollFlags::POLLIN.bits(),
            revents: 0,
        });
        Ok(Self {
            fds,
            hw_count,
            _cancel: cancel,
        })
    }

    pub fn hw_descriptor_count(&self) -> usize {
        self.hw_count
    }

    pub fn wait<H: PcmHandle>(&mut self, handle: &H) -> Result<WaitOutcome, DeviceError> {
        let wake = PollFlags::POLLOUT | PollFlags::POLLIN | PollFlags::POLLERR | PollFlags::POLLHUP;
        loop {
            for fd in self.fds.iter_mut() {
                fd.revents = 0;
            }
            let rc = unsafe {
                libc::poll(
                    self.fds.as_mut_ptr(),
                    self.fds.len() as libc::nfds_t,
                    -1,
                )
            };
            if rc < 0 {
                let e = Error::last_os_error();
                if e.kind() == ErrorKind::Interrupted {
                    continue;
                }
                return Err(DeviceError::Wait(e.to_string()));
            }

            if self.fds[self.hw_count].revents != 0 {
                return Ok(WaitOutcome::Cancelled);
            }

            let revents = handle
                .poll_revents(&mut self.fds[..self.hw_count])
                .map_err(|e| DeviceError::Wait(e.to_string()))?;
            if PollFlags::from_bits_truncate(revents).intersects(wake) {
                return Ok(WaitOutcome::Ready);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn readable(rx: &CancelReceiver) -> bool {
        let mut pfd = libc::pollfd {
            fd: rx.fd.as_raw_fd(),
            events: PollFlags::POLLIN.bits(),
            revents: 0,
        };
        unsafe { libc::poll(&mut pfd, 1, 0) == 1 }
    }

    #[test]
    fn cancel_makes_receiver_readable() {
        let (tx, rx) = cancel_pair().unwrap();
        assert!(!readable(&rx));
        tx.cancel().unwrap();
        assert!(readable(&rx));
    }

    #[test]
    fn cancel_is_repeatable_from_clones() {
        let (tx, rx) = cancel_pair().unwrap();
        let other = tx.clone();
        tx.cancel().unwrap();
        other.cancel().unwrap();
        assert!(readable(&rx));
    }
}
