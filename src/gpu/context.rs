//! Device context lifecycle: acquisition, classification and ordered release of the control
//! handle, the device handle, and the RM client/device/subdevice objects.

use crate::config::DriverConfig;
use crate::error::{NvError, NvResult};
use crate::gpu::arch::{self, ArchProfile, GpuArch};
use crate::nvrm::device::NvKernelDriver;
use crate::nvrm::{DevInfo, DriverResult, DriverVersion, RmClient, RmDriver};
use log::{debug, trace};
use std::os::fd::RawFd;

/// Client-chosen handle space for objects allocated under the root client.
const OBJECT_HANDLE_BASE: u32 = 0x4E56_0000;
const DEVICE_HANDLE: u32 = OBJECT_HANDLE_BASE | 0x01;
const SUBDEVICE_HANDLE: u32 = OBJECT_HANDLE_BASE | 0x02;
const FIRST_MEMORY_HANDLE: u32 = OBJECT_HANDLE_BASE | 0x100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    Uninitialized,
    Initialized,
    TornDown,
}

/// Kernel handles and object ids of an initialized context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceHandles {
    pub ctl_fd: RawFd,
    pub nv0_fd: RawFd,
    /// Borrowed from the caller; never closed here.
    pub display_fd: RawFd,
    pub client: u32,
    pub device: u32,
    pub subdevice: u32,
}

impl DeviceHandles {
    #[must_use]
    pub const fn rm_client(&self) -> RmClient {
        RmClient {
            ctl_fd: self.ctl_fd,
            handle: self.client,
        }
    }
}

/// Identity and layout parameters discovered during initialization. Immutable afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceInfo {
    pub driver_version: DriverVersion,
    pub gpu_id: u32,
    pub arch_id: u32,
    pub generic_page_kind: u32,
    pub page_kind_generation: u32,
    pub sector_layout: u32,
    pub supports_sync_fd: bool,
    pub profile: ArchProfile,
}

#[derive(Debug)]
pub(crate) struct LiveDevice {
    pub(crate) handles: DeviceHandles,
    pub(crate) info: DeviceInfo,
    next_memory_handle: u32,
}

impl LiveDevice {
    pub(crate) fn next_memory_handle(&mut self) -> u32 {
        let handle = self.next_memory_handle;
        self.next_memory_handle = self.next_memory_handle.wrapping_add(1);
        handle
    }
}

#[derive(Debug)]
enum Lifecycle {
    Uninitialized,
    Initialized(LiveDevice),
    TornDown,
}

/// Resources acquired so far, released in reverse acquisition order.
#[derive(Debug, Default)]
struct Acquired {
    ctl_fd: Option<RawFd>,
    client: Option<u32>,
    nv0_fd: Option<RawFd>,
    device: Option<u32>,
    subdevice: Option<u32>,
}

impl Acquired {
    fn from_handles(h: &DeviceHandles) -> Self {
        Self {
            ctl_fd: Some(h.ctl_fd),
            client: Some(h.client),
            nv0_fd: Some(h.nv0_fd),
            device: Some(h.device),
            subdevice: Some(h.subdevice),
        }
    }

    /// Best effort: every step runs; the first failure is reported.
    fn release<D: RmDriver>(&mut self, driver: &D) -> Option<(&'static str, i32)> {
        let mut first: Option<(&'static str, i32)> = None;
        let mut note = |op: &'static str, r: DriverResult<()>| {
            if let Err(code) = r {
                first.get_or_insert((op, code));
            }
        };

        if let (Some(ctl_fd), Some(handle)) = (self.ctl_fd, self.client) {
            let client = RmClient { ctl_fd, handle };
            if let (Some(device), Some(subdevice)) = (self.device, self.subdevice.take()) {
                note("free_subdevice", driver.free_object(client, device, subdevice));
            }
            if let Some(device) = self.device.take() {
                note("free_device", driver.free_object(client, handle, device));
            }
        }
        if let Some(fd) = self.nv0_fd.take() {
            note("close_device", driver.close(fd));
        }
        if let (Some(ctl_fd), Some(handle)) = (self.ctl_fd, self.client.take()) {
            note("free_client", driver.free_object(RmClient { ctl_fd, handle }, 0, handle));
        }
        if let Some(fd) = self.ctl_fd.take() {
            note("close_control", driver.close(fd));
        }

        first
    }
}

/// Exclusive owner of one GPU's kernel handles.
///
/// `Uninitialized → Initialized → TornDown`. Initialization either completes or leaves the
/// context `Uninitialized` with nothing held; teardown is explicit and releases objects in
/// reverse acquisition order. Not internally synchronized.
#[derive(Debug)]
pub struct DeviceContext<D: RmDriver = NvKernelDriver> {
    driver: D,
    config: DriverConfig,
    sandboxed: bool,
    lifecycle: Lifecycle,
}

impl DeviceContext<NvKernelDriver> {
    /// A context talking to the real driver through the configured device nodes.
    #[must_use]
    pub fn new(config: DriverConfig) -> Self {
        let driver = config.kernel_driver();
        Self::with_driver(driver, config)
    }
}

impl<D: RmDriver> DeviceContext<D> {
    #[must_use]
    pub fn with_driver(driver: D, config: DriverConfig) -> Self {
        let sandboxed = config.is_sandbox_host();
        Self {
            driver,
            config,
            sandboxed,
            lifecycle: Lifecycle::Uninitialized,
        }
    }

    #[must_use]
    pub const fn state(&self) -> ContextState {
        match self.lifecycle {
            Lifecycle::Uninitialized => ContextState::Uninitialized,
            Lifecycle::Initialized(_) => ContextState::Initialized,
            Lifecycle::TornDown => ContextState::TornDown,
        }
    }

    #[must_use]
    pub const fn is_sandboxed(&self) -> bool {
        self.sandboxed
    }

    #[must_use]
    pub const fn config(&self) -> &DriverConfig {
        &self.config
    }

    #[must_use]
    pub const fn driver(&self) -> &D {
        &self.driver
    }

    #[must_use]
    pub const fn handles(&self) -> Option<&DeviceHandles> {
        match &self.lifecycle {
            Lifecycle::Initialized(live) => Some(&live.handles),
            _ => None,
        }
    }

    #[must_use]
    pub const fn info(&self) -> Option<&DeviceInfo> {
        match &self.lifecycle {
            Lifecycle::Initialized(live) => Some(&live.info),
            _ => None,
        }
    }

    #[must_use]
    pub fn arch(&self) -> Option<GpuArch> {
        self.info().map(|i| i.profile.arch)
    }

    #[must_use]
    pub fn is_blackwell(&self) -> bool {
        self.arch() == Some(GpuArch::Blackwell)
    }

    fn driver_err(&self, op: &'static str) -> impl Fn(i32) -> NvError {
        let sandboxed = self.sandboxed;
        move |code| NvError::from_driver(op, code, sandboxed)
    }

    /// Acquires every kernel object needed to allocate on the GPU behind `display_fd`.
    ///
    /// `display_fd` is an open nvidia-drm handle owned by the caller.
    ///
    /// # Errors
    /// `InvalidState` if the context was already initialized or torn down. Driver failures are
    /// classified per [`NvError::from_driver`]; everything acquired up to that point has been
    /// released when the error is returned.
    pub fn initialize(&mut self, display_fd: RawFd) -> NvResult<()> {
        match self.lifecycle {
            Lifecycle::Uninitialized => {}
            Lifecycle::Initialized(_) => return Err(NvError::InvalidState("already initialized")),
            Lifecycle::TornDown => return Err(NvError::InvalidState("context was torn down")),
        }

        let mut acquired = Acquired::default();
        match self.acquire(display_fd, &mut acquired) {
            Ok(live) => {
                debug!(
                    "nvrm: initialized gpu {:#x} ({}, arch {:#x}) on driver {}.{}",
                    live.info.gpu_id,
                    live.info.profile.arch.name(),
                    live.info.arch_id,
                    live.info.driver_version.major,
                    live.info.driver_version.minor
                );
                self.lifecycle = Lifecycle::Initialized(live);
                Ok(())
            }
            Err(e) => {
                // Rollback errors are dropped; the acquisition failure is returned.
                let _ = acquired.release(&self.driver);
                Err(e)
            }
        }
    }

    fn acquire(&self, display_fd: RawFd, acquired: &mut Acquired) -> NvResult<LiveDevice> {
        let ctl_fd = self
            .driver
            .open_control()
            .map_err(self.driver_err("open_control"))?;
        acquired.ctl_fd = Some(ctl_fd);

        let client_handle = self
            .driver
            .alloc_client(ctl_fd)
            .map_err(self.driver_err("alloc_client"))?;
        acquired.client = Some(client_handle);
        let client = RmClient {
            ctl_fd,
            handle: client_handle,
        };

        let driver_version = self
            .driver
            .query_driver_version(client)
            .map_err(self.driver_err("query_driver_version"))?;

        let dev: DevInfo = self
            .driver
            .query_dev_info(display_fd, driver_version)
            .map_err(self.driver_err("query_dev_info"))?;

        let instance = self
            .driver
            .query_device_instance(client, dev.gpu_id)
            .map_err(self.driver_err("query_device_instance"))?;

        let nv0_fd = self
            .driver
            .open_device(ctl_fd, instance)
            .map_err(self.driver_err("open_device"))?;
        acquired.nv0_fd = Some(nv0_fd);

        self.driver
            .alloc_device(client, DEVICE_HANDLE, instance)
            .map_err(self.driver_err("alloc_device"))?;
        acquired.device = Some(DEVICE_HANDLE);

        self.driver
            .alloc_subdevice(client, DEVICE_HANDLE, SUBDEVICE_HANDLE)
            .map_err(self.driver_err("alloc_subdevice"))?;
        acquired.subdevice = Some(SUBDEVICE_HANDLE);

        let arch_id = self
            .driver
            .query_architecture(client, SUBDEVICE_HANDLE)
            .map_err(self.driver_err("query_architecture"))?;
        let profile = arch::classify(arch_id);
        trace!("nvrm: arch id {arch_id:#x} classified as {profile:?}");

        self.config.validate(&profile)?;

        Ok(LiveDevice {
            handles: DeviceHandles {
                ctl_fd,
                nv0_fd,
                display_fd,
                client: client_handle,
                device: DEVICE_HANDLE,
                subdevice: SUBDEVICE_HANDLE,
            },
            info: DeviceInfo {
                driver_version,
                gpu_id: dev.gpu_id,
                arch_id,
                generic_page_kind: dev.generic_page_kind,
                page_kind_generation: dev.page_kind_generation,
                sector_layout: dev.sector_layout,
                supports_sync_fd: dev.supports_sync_fd,
                profile,
            },
            next_memory_handle: FIRST_MEMORY_HANDLE,
        })
    }

    /// Releases subdevice, device, device handle, client and control handle, in that order.
    ///
    /// A no-op on a context that is not initialized. The context ends `TornDown` even when a
    /// release step fails; the first failure is returned.
    ///
    /// # Errors
    /// The classified driver error of the first release step that failed.
    pub fn teardown(&mut self) -> NvResult<()> {
        let live = match std::mem::replace(&mut self.lifecycle, Lifecycle::TornDown) {
            Lifecycle::Initialized(live) => live,
            other => {
                self.lifecycle = other;
                return Ok(());
            }
        };

        let failure = Acquired::from_handles(&live.handles).release(&self.driver);
        debug!("nvrm: torn down gpu {:#x}", live.info.gpu_id);

        match failure {
            Some((op, code)) => Err(NvError::from_driver(op, code, self.sandboxed)),
            None => Ok(()),
        }
    }

    /// Stable 16-byte identifier of the GPU.
    ///
    /// # Errors
    /// `NotInitialized` outside the `Initialized` state, otherwise the classified driver error.
    pub fn device_uuid(&self) -> NvResult<[u8; 16]> {
        let Lifecycle::Initialized(live) = &self.lifecycle else {
            return Err(NvError::NotInitialized);
        };
        self.driver
            .query_gpu_uuid(live.handles.rm_client(), live.handles.subdevice)
            .map_err(self.driver_err("query_gpu_uuid"))
    }

    /// Live state for allocation paths; refuses without touching the driver otherwise.
    pub(crate) fn live_mut(&mut self) -> NvResult<(&D, &DriverConfig, bool, &mut LiveDevice)> {
        match &mut self.lifecycle {
            Lifecycle::Initialized(live) => Ok((&self.driver, &self.config, self.sandboxed, live)),
            Lifecycle::Uninitialized => Err(NvError::InvalidState("context is not initialized")),
            Lifecycle::TornDown => Err(NvError::NotInitialized),
        }
    }
}

impl<D: RmDriver> Drop for DeviceContext<D> {
    fn drop(&mut self) {
        // Nothing can observe a failure here; call `teardown` first to see it.
        let _ = self.teardown();
    }
}
