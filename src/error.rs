use thiserror::Error;

/// Reserved signal the driver uses when a privileged operation is refused by policy.
pub const SANDBOX_REJECTION: i32 = -libc::EACCES;
/// Transient unavailability of the requested kernel resource.
pub const RESOURCE_BUSY: i32 = -libc::EAGAIN;

#[derive(Error, Debug)]
pub enum NvError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid state: {0}")]
    InvalidState(&'static str),

    #[error("Device context is not initialized")]
    NotInitialized,

    #[error("{op} blocked by sandbox policy")]
    SandboxBlocked { op: &'static str },

    #[error("{op} rejected by the driver (code {code})")]
    UnexpectedDriverRejection { op: &'static str, code: i32 },

    #[error("{op}: resource busy")]
    ResourceBusy { op: &'static str },

    #[error("{op}: allocation failed (code {code})")]
    AllocationFailed { op: &'static str, code: i32 },

    #[error("{op}: driver error (code {code})")]
    Driver { op: &'static str, code: i32 },
}

impl NvError {
    /// Classifies a negative errno returned by the kernel boundary.
    ///
    /// `sandboxed` decides whether a policy rejection is expected (`SandboxBlocked`)
    /// or a real fault (`UnexpectedDriverRejection`).
    #[must_use]
    pub fn from_driver(op: &'static str, code: i32, sandboxed: bool) -> Self {
        match code {
            SANDBOX_REJECTION if sandboxed => Self::SandboxBlocked { op },
            SANDBOX_REJECTION => Self::UnexpectedDriverRejection { op, code },
            RESOURCE_BUSY => Self::ResourceBusy { op },
            c if c == -libc::ENOMEM || c == -libc::ENOSPC => Self::AllocationFailed { op, code },
            _ => Self::Driver { op, code },
        }
    }

    /// Whether the caller should treat this as a hard fault.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !matches!(self, Self::SandboxBlocked { .. } | Self::ResourceBusy { .. })
    }

    /// Whether retrying later (with backoff) may succeed. Nothing in this crate retries.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::ResourceBusy { .. })
    }
}

pub type NvResult<T> = Result<T, NvError>;
