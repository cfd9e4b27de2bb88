//! Blocking netlink socket operations.
//!
//! The descriptor lives behind `RwLock<Option<Socket>>`: `close()` takes the
//! write guard and drops the socket, so a concurrent send or receive either
//! finishes first or observes [`Error::SocketClosed`]. The descriptor number
//! can never be silently recycled through this handle.

use std::fs::File;
use std::io;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::Path;
use std::sync::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bytes::BytesMut;
use netlink_sys::{Socket, SocketAddr, protocols};

use super::error::{Error, Result};
use super::message::NLMSG_HDRLEN;

/// Default send/receive timeout on newly created sockets.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Default receive buffer capacity. Larger than the kernel's 4k page
/// default so verbose dumps (ports with nested function attributes)
/// arrive in one datagram.
pub const RECEIVE_BUFFER_SIZE: usize = 65536;

/// Port id the kernel sends from.
pub const PID_KERNEL: u32 = 0;

/// Netlink protocol families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// Routing/device hook (unused by the devlink layer, kept for the
    /// protocol-generic socket primitives).
    Route,
    /// Generic netlink.
    Generic,
    /// Netfilter.
    Netfilter,
}

impl Protocol {
    fn as_isize(self) -> isize {
        match self {
            Protocol::Route => protocols::NETLINK_ROUTE,
            Protocol::Generic => protocols::NETLINK_GENERIC,
            Protocol::Netfilter => protocols::NETLINK_NETFILTER,
        }
    }
}

/// Blocking netlink socket.
pub struct NetlinkSocket {
    inner: RwLock<Option<Socket>>,
    /// Local port ID (assigned by kernel at bind).
    pid: u32,
    /// Protocol this socket uses.
    protocol: Protocol,
    /// Capacity of the buffer handed to each receive call.
    recv_capacity: AtomicUsize,
}

impl NetlinkSocket {
    /// Create a new netlink socket for the given protocol.
    ///
    /// The socket is blocking with [`DEFAULT_TIMEOUT`] applied to both send
    /// and receive; extended-ack reporting is enabled best-effort.
    pub fn new(protocol: Protocol) -> Result<Self> {
        let mut socket = Socket::new(protocol.as_isize())?;

        // Bind to get a kernel-assigned port ID.
        let mut addr = SocketAddr::new(0, 0);
        socket.bind(&addr)?;
        socket.get_address(&mut addr)?;
        let pid = addr.port_number();

        set_timeval(socket.as_raw_fd(), libc::SO_SNDTIMEO, DEFAULT_TIMEOUT)?;
        set_timeval(socket.as_raw_fd(), libc::SO_RCVTIMEO, DEFAULT_TIMEOUT)?;

        // Extended ACK for better error messages; ignore if unsupported.
        socket.set_ext_ack(true).ok();

        Ok(Self {
            inner: RwLock::new(Some(socket)),
            pid,
            protocol,
            recv_capacity: AtomicUsize::new(RECEIVE_BUFFER_SIZE),
        })
    }

    /// Create a netlink socket that operates in a specific network
    /// namespace.
    ///
    /// The namespace is specified by an open file descriptor to a namespace
    /// file (e.g. `/proc/<pid>/ns/net` or `/var/run/netns/<name>`).
    ///
    /// The calling thread switches into the target namespace, creates the
    /// socket, and is moved back to its original namespace before this
    /// function returns, on success and on every error path. `setns`
    /// affects only the calling OS thread, and no other work runs on it
    /// between switch and restore.
    pub fn new_in_namespace(protocol: Protocol, ns_fd: RawFd) -> Result<Self> {
        let _restore = NetnsRestore::enter(ns_fd, None)?;
        Self::new(protocol)
    }

    /// Like [`new_in_namespace`](Self::new_in_namespace), but restores into
    /// an explicit namespace instead of the one current at call time.
    pub fn new_in_namespace_with_restore(
        protocol: Protocol,
        ns_fd: RawFd,
        restore_fd: RawFd,
    ) -> Result<Self> {
        let _restore = NetnsRestore::enter(ns_fd, Some(restore_fd))?;
        Self::new(protocol)
    }

    /// Create a netlink socket in the network namespace at `ns_path`.
    pub fn new_in_namespace_path<P: AsRef<Path>>(protocol: Protocol, ns_path: P) -> Result<Self> {
        let ns_file = File::open(ns_path.as_ref()).map_err(|e| {
            Error::InvalidMessage(format!(
                "cannot open namespace '{}': {}",
                ns_path.as_ref().display(),
                e
            ))
        })?;
        Self::new_in_namespace(protocol, ns_file.as_raw_fd())
    }

    /// Get the local port ID.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Get the protocol.
    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    fn with_socket<T>(&self, f: impl FnOnce(&Socket) -> Result<T>) -> Result<T> {
        let guard = self.inner.read().unwrap();
        match guard.as_ref() {
            Some(socket) => f(socket),
            None => Err(Error::SocketClosed),
        }
    }

    /// Send a serialized message to the kernel.
    pub fn send(&self, msg: &[u8]) -> Result<()> {
        self.with_socket(|socket| {
            let sent = socket.send(msg, 0)?;
            if sent != msg.len() {
                return Err(Error::Io(io::Error::new(
                    io::ErrorKind::WriteZero,
                    format!("partial netlink send: {} of {} bytes", sent, msg.len()),
                )));
            }
            Ok(())
        })
    }

    /// Receive one datagram, blocking up to the configured receive timeout.
    ///
    /// Returns the raw bytes (possibly several concatenated netlink
    /// messages) and the sender's port id. Fails with [`Error::ShortRead`]
    /// if fewer bytes than one netlink header arrive.
    pub fn receive(&self) -> Result<(Vec<u8>, u32)> {
        let capacity = self.recv_capacity.load(Ordering::Relaxed);
        self.with_socket(|socket| {
            let mut buf = BytesMut::with_capacity(capacity);
            let (n, addr) = socket.recv_from(&mut buf, 0)?;
            if n < NLMSG_HDRLEN {
                return Err(Error::ShortRead { len: n });
            }
            Ok((buf.to_vec(), addr.port_number()))
        })
    }

    /// Set the send timeout.
    pub fn set_send_timeout(&self, timeout: Duration) -> Result<()> {
        self.with_socket(|socket| set_timeval(socket.as_raw_fd(), libc::SO_SNDTIMEO, timeout))
    }

    /// Set the receive timeout.
    pub fn set_receive_timeout(&self, timeout: Duration) -> Result<()> {
        self.with_socket(|socket| set_timeval(socket.as_raw_fd(), libc::SO_RCVTIMEO, timeout))
    }

    /// Set the kernel-side receive buffer size (SO_RCVBUF, or
    /// SO_RCVBUFFORCE with `force`, which may exceed rmem_max but requires
    /// CAP_NET_ADMIN).
    pub fn set_receive_buffer_size(&self, size: usize, force: bool) -> Result<()> {
        let opt = if force {
            libc::SO_RCVBUFFORCE
        } else {
            libc::SO_RCVBUF
        };
        self.with_socket(|socket| {
            let value = size as libc::c_int;
            // SAFETY: fd is a live descriptor held open by the read guard;
            // value outlives the call.
            let ret = unsafe {
                libc::setsockopt(
                    socket.as_raw_fd(),
                    libc::SOL_SOCKET,
                    opt,
                    &value as *const _ as *const libc::c_void,
                    std::mem::size_of::<libc::c_int>() as libc::socklen_t,
                )
            };
            if ret < 0 {
                return Err(Error::Io(io::Error::last_os_error()));
            }
            Ok(())
        })
    }

    /// Set the capacity of the user-space buffer handed to each receive.
    pub fn set_receive_capacity(&self, capacity: usize) {
        self.recv_capacity.store(capacity, Ordering::Relaxed);
    }

    /// Enable or disable extended ACK error reporting.
    pub fn set_ext_ack(&self, enable: bool) -> Result<()> {
        self.with_socket(|socket| {
            socket.set_ext_ack(enable)?;
            Ok(())
        })
    }

    /// Subscribe to a multicast group.
    pub fn add_membership(&self, group: u32) -> Result<()> {
        let mut guard = self.inner.write().unwrap();
        match guard.as_mut() {
            Some(socket) => {
                socket.add_membership(group)?;
                Ok(())
            }
            None => Err(Error::SocketClosed),
        }
    }

    /// Unsubscribe from a multicast group.
    pub fn drop_membership(&self, group: u32) -> Result<()> {
        let mut guard = self.inner.write().unwrap();
        match guard.as_mut() {
            Some(socket) => {
                socket.drop_membership(group)?;
                Ok(())
            }
            None => Err(Error::SocketClosed),
        }
    }

    /// Close the socket. Idempotent; later send/receive calls fail with
    /// [`Error::SocketClosed`].
    pub fn close(&self) {
        self.inner.write().unwrap().take();
    }

    /// Check whether the socket has been closed.
    pub fn is_closed(&self) -> bool {
        self.inner.read().unwrap().is_none()
    }
}

fn set_timeval(fd: RawFd, opt: libc::c_int, timeout: Duration) -> Result<()> {
    let tv = libc::timeval {
        tv_sec: timeout.as_secs() as libc::time_t,
        tv_usec: timeout.subsec_micros() as libc::suseconds_t,
    };
    // SAFETY: tv is a valid timeval for the duration of the call.
    let ret = unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            opt,
            &tv as *const _ as *const libc::c_void,
            std::mem::size_of::<libc::timeval>() as libc::socklen_t,
        )
    };
    if ret < 0 {
        return Err(Error::Io(io::Error::last_os_error()));
    }
    Ok(())
}

/// Guard that moves the calling thread into a target network namespace and
/// restores the previous one when dropped, on every exit path.
struct NetnsRestore {
    restore: RestoreNs,
}

enum RestoreNs {
    /// Namespace file we opened ourselves (closed on drop).
    Owned(File),
    /// Caller-supplied descriptor; the caller keeps ownership.
    Borrowed(RawFd),
}

impl NetnsRestore {
    fn enter(target_fd: RawFd, restore_fd: Option<RawFd>) -> Result<Self> {
        let restore = match restore_fd {
            Some(fd) => RestoreNs::Borrowed(fd),
            None => {
                let original = File::open("/proc/self/ns/net").map_err(|e| {
                    Error::InvalidMessage(format!("cannot open current namespace: {}", e))
                })?;
                RestoreNs::Owned(original)
            }
        };

        // SAFETY: setns switches the calling thread to the namespace behind
        // target_fd, a descriptor the caller opened.
        let ret = unsafe { libc::setns(target_fd, libc::CLONE_NEWNET) };
        if ret < 0 {
            return Err(Error::Io(io::Error::last_os_error()));
        }

        Ok(Self { restore })
    }

    fn restore_fd(&self) -> RawFd {
        match &self.restore {
            RestoreNs::Owned(file) => file.as_raw_fd(),
            RestoreNs::Borrowed(fd) => *fd,
        }
    }
}

impl Drop for NetnsRestore {
    fn drop(&mut self) {
        // SAFETY: the restore descriptor is still open (owned file, or
        // borrowed from the caller for the duration of the call).
        let ret = unsafe { libc::setns(self.restore_fd(), libc::CLONE_NEWNET) };
        if ret < 0 {
            tracing::warn!(
                error = %io::Error::last_os_error(),
                "failed to restore original network namespace"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Creating an AF_NETLINK socket needs no privileges, but skip cleanly
    // on build environments that forbid it.
    fn open_generic() -> Option<NetlinkSocket> {
        NetlinkSocket::new(Protocol::Generic).ok()
    }

    #[test]
    fn test_close_is_idempotent() {
        let Some(socket) = open_generic() else { return };
        assert!(!socket.is_closed());
        socket.close();
        assert!(socket.is_closed());
        socket.close();
        assert!(socket.is_closed());
    }

    #[test]
    fn test_send_on_closed_socket() {
        let Some(socket) = open_generic() else { return };
        socket.close();
        assert!(matches!(socket.send(&[0u8; 16]), Err(Error::SocketClosed)));
        assert!(matches!(socket.receive(), Err(Error::SocketClosed)));
        assert!(matches!(
            socket.set_receive_timeout(Duration::from_secs(1)),
            Err(Error::SocketClosed)
        ));
    }

    #[test]
    fn test_receive_capacity_tunable() {
        let Some(socket) = open_generic() else { return };
        assert_eq!(socket.recv_capacity.load(Ordering::Relaxed), RECEIVE_BUFFER_SIZE);
        socket.set_receive_capacity(4096);
        assert_eq!(socket.recv_capacity.load(Ordering::Relaxed), 4096);
    }
}
