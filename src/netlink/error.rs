//! Error types for netlink and devlink operations.

use std::io;

/// Result type for netlink operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during netlink and devlink operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error from socket or sysfs operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Kernel returned an error code in an ACK message.
    #[error("kernel error: {message} (errno {errno})")]
    Kernel {
        /// The errno value reported by the kernel (positive).
        errno: i32,
        /// Human-readable error message, extended-ack text appended when present.
        message: String,
    },

    /// A fixed-size structure was shorter than its declared layout.
    #[error("message truncated: expected {expected} bytes, got {actual}")]
    Truncated {
        /// Expected length.
        expected: usize,
        /// Actual bytes available.
        actual: usize,
    },

    /// An attribute's declared length reads past the end of its buffer.
    #[error("truncated attribute: declared {declared} bytes, {remaining} remaining")]
    TruncatedAttribute {
        /// Declared TLV length (header + value).
        declared: usize,
        /// Bytes remaining in the enclosing buffer.
        remaining: usize,
    },

    /// Invalid message format.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// Invalid attribute payload.
    #[error("invalid attribute: {0}")]
    InvalidAttribute(String),

    /// A receive returned fewer bytes than one netlink header.
    #[error("short read from netlink socket: {len} bytes")]
    ShortRead {
        /// Number of bytes actually received.
        len: usize,
    },

    /// The socket was closed before or during the operation.
    #[error("operation on closed netlink socket")]
    SocketClosed,

    /// A reply datagram did not originate from the kernel.
    #[error("wrong sender port id {pid}, expected 0 (kernel)")]
    WrongSender {
        /// Port id of the actual sender.
        pid: u32,
    },

    /// Reply sequence number did not match the request (private socket).
    #[error("sequence mismatch: expected {expected}, got {actual}")]
    SequenceMismatch {
        /// Sequence number of the request.
        expected: u32,
        /// Sequence number observed in the reply.
        actual: u32,
    },

    /// The kernel signalled an interrupted dump; the caller must restart it.
    #[error("dump interrupted, restart the request")]
    DumpInterrupted,

    /// The generic netlink controller knows no family by this name.
    #[error("generic netlink family not found: {name}")]
    FamilyNotFound {
        /// The family name that was queried.
        name: String,
    },

    /// The selector was neither "devlink" nor "mlxdevm".
    #[error("invalid socket name {name:?}, expected \"devlink\" or \"mlxdevm\"")]
    InvalidSocketName {
        /// The rejected selector.
        name: String,
    },

    /// E-switch mode string other than "legacy" or "switchdev".
    #[error("invalid eswitch mode {mode:?}, expected \"legacy\" or \"switchdev\"")]
    InvalidEswitchMode {
        /// The rejected mode string.
        mode: String,
    },

    /// Unrecognized parameter configuration-mode string.
    #[error("invalid configuration mode {cmode:?}, expected \"runtime\" or \"driverinit\"")]
    InvalidConfigMode {
        /// The rejected cmode string.
        cmode: String,
    },

    /// Parameter value does not fit the parameter's declared type.
    #[error("invalid value {value:?} for {expected} parameter")]
    InvalidParamValue {
        /// The rejected textual value.
        value: String,
        /// Description of the expected value form.
        expected: &'static str,
    },

    /// No auxiliary device directory carries the requested sfnum.
    #[error("no auxiliary device found for SF {sfnum}")]
    AuxDevNotFound {
        /// The sub-function number that was searched for.
        sfnum: u32,
    },
}

impl Error {
    /// Create a kernel error from a negative errno value.
    pub fn from_errno(errno: i32) -> Self {
        let message = io::Error::from_raw_os_error(-errno).to_string();
        Self::Kernel {
            errno: -errno,
            message,
        }
    }

    /// Check if this is a "not found" error (ENOENT, ENODEV).
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Kernel { errno, .. } => matches!(*errno, libc::ENOENT | libc::ENODEV),
            Self::FamilyNotFound { .. } | Self::AuxDevNotFound { .. } => true,
            _ => false,
        }
    }

    /// Check if this is a permission error (EPERM, EACCES).
    pub fn is_permission_denied(&self) -> bool {
        match self {
            Self::Kernel { errno, .. } => matches!(*errno, libc::EPERM | libc::EACCES),
            _ => false,
        }
    }

    /// Check if this error is worth retrying at the caller's discretion
    /// (receive timeout or interrupted dump). The transport itself never
    /// retries.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::DumpInterrupted => true,
            Self::Io(e) => matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut),
            _ => false,
        }
    }

    /// Get the errno value if this is a kernel error.
    pub fn errno(&self) -> Option<i32> {
        match self {
            Self::Kernel { errno, .. } => Some(*errno),
            _ => None,
        }
    }
}
