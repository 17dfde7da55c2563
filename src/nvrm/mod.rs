//! Kernel-facing layer: raw RM/nvidia-drm parameter blocks and the [`RmDriver`] boundary.

pub mod device;
pub mod drm;
pub mod ioctl;

use std::os::fd::RawFd;

/// Result of a kernel call: payload, or a negative errno.
pub type DriverResult<T> = Result<T, i32>;

/// A root client object together with the control handle it was allocated on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RmClient {
    pub ctl_fd: RawFd,
    pub handle: u32,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct DriverVersion {
    pub major: u32,
    pub minor: u32,
}

impl DriverVersion {
    /// Parses `"550.54.14"`-style build strings; only major and minor are kept.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let mut parts = text.trim().split('.');
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next().map_or(Some(0), |m| m.parse().ok())?;
        Some(Self { major, minor })
    }
}

/// What nvidia-drm reports about the GPU behind a display/render handle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DevInfo {
    pub gpu_id: u32,
    pub primary_index: u32,
    pub generic_page_kind: u32,
    pub page_kind_generation: u32,
    pub sector_layout: u32,
    pub supports_sync_fd: bool,
}

/// A video-memory allocation request, already rounded to the architecture's rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryRequest {
    pub size: u64,
    pub alignment: u64,
    pub page_size: u64,
    /// Page kind for block-linear surfaces; `None` allocates pitch-linear memory.
    pub block_linear_kind: Option<u32>,
}

/// The synchronous command set of the vendor kernel driver.
///
/// Every call either succeeds with a payload or reports a negative errno. RM status words
/// are folded into errno values by the implementation (see [`ioctl::status_to_errno`]).
pub trait RmDriver {
    /// Opens a new control handle (`/dev/nvidiactl`).
    fn open_control(&self) -> DriverResult<RawFd>;

    /// Opens the per-GPU device handle and registers it with `ctl_fd`.
    fn open_device(&self, ctl_fd: RawFd, instance: u32) -> DriverResult<RawFd>;

    /// Allocates a root client object on `ctl_fd`.
    fn alloc_client(&self, ctl_fd: RawFd) -> DriverResult<u32>;

    fn query_driver_version(&self, client: RmClient) -> DriverResult<DriverVersion>;

    /// Reads GPU identity through the caller's display handle. The parameter layout depends
    /// on `version`.
    fn query_dev_info(&self, display_fd: RawFd, version: DriverVersion) -> DriverResult<DevInfo>;

    /// Maps a GPU id to the device instance used for device-object allocation.
    fn query_device_instance(&self, client: RmClient, gpu_id: u32) -> DriverResult<u32>;

    fn alloc_device(&self, client: RmClient, device: u32, instance: u32) -> DriverResult<()>;

    fn alloc_subdevice(&self, client: RmClient, device: u32, subdevice: u32) -> DriverResult<()>;

    /// Returns the raw architecture id of the GPU behind `subdevice`.
    fn query_architecture(&self, client: RmClient, subdevice: u32) -> DriverResult<u32>;

    fn query_gpu_uuid(&self, client: RmClient, subdevice: u32) -> DriverResult<[u8; 16]>;

    /// Allocates video memory as object `memory` under `device`.
    fn alloc_memory(
        &self,
        client: RmClient,
        device: u32,
        memory: u32,
        request: &MemoryRequest,
    ) -> DriverResult<()>;

    /// Exports `object` to a fresh, cross-process transferable file descriptor.
    fn export_object(&self, client: RmClient, device: u32, object: u32) -> DriverResult<RawFd>;

    fn duplicate(&self, fd: RawFd) -> DriverResult<RawFd>;

    fn free_object(&self, client: RmClient, parent: u32, object: u32) -> DriverResult<()>;

    fn close(&self, fd: RawFd) -> DriverResult<()>;
}
