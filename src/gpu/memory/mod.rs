pub mod layout;
pub mod manager;

use std::os::fd::RawFd;

/// An exported video-memory region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuMemory {
    pub fd: RawFd,
    pub size: u64,
    pub page_size: u64,
}

/// A single-surface image allocation and its exportable handles.
///
/// Geometry is always computed from the owning context's architecture profile. The buffer is
/// only meaningful while that context remains initialized.
#[derive(Debug, PartialEq, Eq)]
pub struct ImageBuffer {
    /// Handle retained by the allocating driver session.
    pub nv_fd: RawFd,
    /// Duplicate for cross-process export; yielded at most once.
    export_fd: Option<RawFd>,
    /// The context's display handle (not owned).
    pub drm_fd: RawFd,
    pub width: u32,
    pub height: u32,
    pub modifier: u64,
    pub memory_size: u64,
    pub offset: u32,
    pub pitch: u32,
    pub fourcc: u32,
}

impl ImageBuffer {
    /// Hands the cross-process duplicate to the caller, who then owns it.
    /// Returns `None` once it has been taken.
    pub fn take_export_handle(&mut self) -> Option<RawFd> {
        self.export_fd.take()
    }

    #[must_use]
    pub const fn is_exported(&self) -> bool {
        self.export_fd.is_none()
    }
}

pub use manager::MemoryAllocator;
