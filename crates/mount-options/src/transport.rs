// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! File descriptor passing over connected Unix sockets
//!
//! The channel drives these calls from tokio readiness callbacks, so an
//! implementation must be non-blocking and report `WouldBlock` when the
//! socket is not ready.

use std::fmt;
use std::io;
use std::mem::size_of;
use std::os::fd::{AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};

/// Result of a single receive call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Received {
    /// Payload bytes read; zero means the peer closed the connection.
    pub bytes: usize,
    /// The kernel dropped control data that did not fit the rights buffer.
    pub control_truncated: bool,
}

/// Moves payload bytes plus open descriptors across a connected socket
pub trait DescriptorTransport: Send + Sync + fmt::Debug {
    /// Write `payload` with `fd` attached as ancillary data. Returns payload bytes written.
    fn send(&self, socket: BorrowedFd<'_>, payload: &[u8], fd: BorrowedFd<'_>) -> io::Result<usize>;

    /// Read up to `buf.len()` payload bytes, appending any received descriptors to `fds`.
    fn recv(
        &self,
        socket: BorrowedFd<'_>,
        buf: &mut [u8],
        fds: &mut Vec<OwnedFd>,
    ) -> io::Result<Received>;
}

/// `SCM_RIGHTS` control messages via `sendmsg(2)`/`recvmsg(2)`
///
/// The receive side sizes its control buffer for exactly one descriptor and
/// asks for close-on-exec descriptors.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScmRightsTransport;

impl DescriptorTransport for ScmRightsTransport {
    fn send(&self, socket: BorrowedFd<'_>, payload: &[u8], fd: BorrowedFd<'_>) -> io::Result<usize> {
        let mut iov = libc::iovec {
            iov_base: payload.as_ptr() as *mut libc::c_void,
            iov_len: payload.len(),
        };

        let mut control = ControlBuffer::for_one_fd();
        let mut msg: libc::msghdr = unsafe { std::mem::zeroed() };
        msg.msg_iov = &mut iov;
        msg.msg_iovlen = 1;
        msg.msg_control = control.as_mut_ptr();
        msg.msg_controllen = control.len() as _;

        let cmsg = unsafe { libc::CMSG_FIRSTHDR(&msg) };
        if cmsg.is_null() {
            return Err(io::Error::other("failed to get control message header"));
        }

        unsafe {
            (*cmsg).cmsg_len = libc::CMSG_LEN(size_of::<RawFd>() as libc::c_uint) as _;
            (*cmsg).cmsg_level = libc::SOL_SOCKET;
            (*cmsg).cmsg_type = libc::SCM_RIGHTS;
            std::ptr::write_unaligned(libc::CMSG_DATA(cmsg) as *mut RawFd, fd.as_raw_fd());
        }

        let written = unsafe { libc::sendmsg(socket.as_raw_fd(), &msg, libc::MSG_NOSIGNAL) };
        if written < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(written as usize)
    }

    fn recv(
        &self,
        socket: BorrowedFd<'_>,
        buf: &mut [u8],
        fds: &mut Vec<OwnedFd>,
    ) -> io::Result<Received> {
        let mut iov = libc::iovec {
            iov_base: buf.as_mut_ptr() as *mut libc::c_void,
            iov_len: buf.len(),
        };

        let mut control = ControlBuffer::for_one_fd();
        let mut msg: libc::msghdr = unsafe { std::mem::zeroed() };
        msg.msg_iov = &mut iov;
        msg.msg_iovlen = 1;
        msg.msg_control = control.as_mut_ptr();
        msg.msg_controllen = control.len() as _;

        let read = unsafe { libc::recvmsg(socket.as_raw_fd(), &mut msg, libc::MSG_CMSG_CLOEXEC) };
        if read < 0 {
            return Err(io::Error::last_os_error());
        }

        let header_len = unsafe { libc::CMSG_LEN(0) } as usize;
        let mut cmsg = unsafe { libc::CMSG_FIRSTHDR(&msg) };
        while !cmsg.is_null() {
            let (level, kind, len) = unsafe { ((*cmsg).cmsg_level, (*cmsg).cmsg_type, (*cmsg).cmsg_len as usize) };
            if level == libc::SOL_SOCKET && kind == libc::SCM_RIGHTS {
                let data = unsafe { libc::CMSG_DATA(cmsg) } as *const RawFd;
                let count = len.saturating_sub(header_len) / size_of::<RawFd>();
                for i in 0..count {
                    // The kernel installed these descriptors in our table; we own them now.
                    let raw = unsafe { std::ptr::read_unaligned(data.add(i)) };
                    fds.push(unsafe { OwnedFd::from_raw_fd(raw) });
                }
            }
            cmsg = unsafe { libc::CMSG_NXTHDR(&msg, cmsg) };
        }

        Ok(Received {
            bytes: read as usize,
            control_truncated: msg.msg_flags & libc::MSG_CTRUNC != 0,
        })
    }
}

/// `cmsghdr`-aligned storage for one `SCM_RIGHTS` message carrying a single descriptor
struct ControlBuffer {
    words: Vec<u64>,
    len: usize,
}

impl ControlBuffer {
    fn for_one_fd() -> Self {
        let len = unsafe { libc::CMSG_SPACE(size_of::<RawFd>() as libc::c_uint) } as usize;
        Self {
            words: vec![0u64; len.div_ceil(size_of::<u64>())],
            len,
        }
    }

    fn as_mut_ptr(&mut self) -> *mut libc::c_void {
        self.words.as_mut_ptr() as *mut libc::c_void
    }

    fn len(&self) -> usize {
        self.len
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use csi_test_utils::{assert_same_file, open_dev_null};
    use std::os::fd::AsFd;
    use std::os::unix::net::UnixStream;

    #[test]
    fn passes_descriptor_between_socket_pair() {
        let (left, right) = UnixStream::pair().unwrap();
        let dev_null = open_dev_null();

        let transport = ScmRightsTransport;
        let written = transport
            .send(left.as_fd(), b"{\"bucketName\":\"b\"}", dev_null.as_fd())
            .unwrap();
        assert_eq!(written, 18);
        drop(left);

        let mut buf = [0u8; 1024];
        let mut fds = Vec::new();
        let received = transport.recv(right.as_fd(), &mut buf, &mut fds).unwrap();
        assert_eq!(received.bytes, 18);
        assert!(!received.control_truncated);
        assert_eq!(&buf[..received.bytes], b"{\"bucketName\":\"b\"}");
        assert_eq!(fds.len(), 1);
        assert_ne!(fds[0].as_raw_fd(), dev_null.as_raw_fd());
        assert_same_file(&fds[0], &dev_null);

        let eof = transport.recv(right.as_fd(), &mut buf, &mut fds).unwrap();
        assert_eq!(eof.bytes, 0);
        assert_eq!(fds.len(), 1);
    }

    #[test]
    fn received_descriptor_is_close_on_exec() {
        let (left, right) = UnixStream::pair().unwrap();
        let dev_null = open_dev_null();

        ScmRightsTransport
            .send(left.as_fd(), b"x", dev_null.as_fd())
            .unwrap();

        let mut buf = [0u8; 8];
        let mut fds = Vec::new();
        ScmRightsTransport
            .recv(right.as_fd(), &mut buf, &mut fds)
            .unwrap();

        let flags = unsafe { libc::fcntl(fds[0].as_raw_fd(), libc::F_GETFD) };
        assert!(flags >= 0);
        assert_ne!(flags & libc::FD_CLOEXEC, 0);
    }

    #[test]
    fn short_buffer_splits_payload_across_reads() {
        let (left, right) = UnixStream::pair().unwrap();
        let dev_null = open_dev_null();

        ScmRightsTransport
            .send(left.as_fd(), b"0123456789", dev_null.as_fd())
            .unwrap();
        drop(left);

        let mut payload = Vec::new();
        let mut fds = Vec::new();
        let mut buf = [0u8; 4];
        loop {
            let received = ScmRightsTransport
                .recv(right.as_fd(), &mut buf, &mut fds)
                .unwrap();
            if received.bytes == 0 {
                break;
            }
            payload.extend_from_slice(&buf[..received.bytes]);
        }

        assert_eq!(payload, b"0123456789");
        assert_eq!(fds.len(), 1);
    }
}
