#![allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]

use crate::nvrm::drm::{
    DEV_INFO_V545_MAJOR, DRM_IOCTL_NVIDIA_GET_DEV_INFO, DRM_IOCTL_NVIDIA_GET_DEV_INFO_545,
    DevInfoParams, DevInfoParams545,
};
use crate::nvrm::ioctl::{
    ArchInfoParams, BuildVersionV2Params, DeviceAllocParams, ExportObjectToFdParams,
    ExportRmObject, GidInfoParams, GpuIdInfoV2Params, MemoryAllocParams,
    NV0000_CTRL_CMD_GPU_GET_ID_INFO_V2, NV0000_CTRL_CMD_OS_UNIX_EXPORT_OBJECT_TO_FD,
    NV0000_CTRL_CMD_SYSTEM_GET_BUILD_VERSION_V2, NV0000_CTRL_OS_UNIX_EXPORT_OBJECT_TYPE_RM,
    NV01_DEVICE_0, NV01_MEMORY_LOCAL_USER, NV01_ROOT_CLIENT, NV20_SUBDEVICE_0,
    NV2080_CTRL_CMD_GPU_GET_GID_INFO, NV2080_CTRL_CMD_MC_GET_ARCH_INFO,
    NV2080_GPU_CMD_GPU_GET_GID_FLAGS_FORMAT_BINARY, NV_IOC_REGISTER_FD, NV_IOC_RM_ALLOC,
    NV_IOC_RM_CONTROL, NV_IOC_RM_FREE, NVOS32_ALLOC_FLAGS_ALIGNMENT_FORCE,
    NVOS32_ATTR_FORMAT_BLOCK_LINEAR, NVOS32_ATTR_FORMAT_PITCH, NVOS32_ATTR_FORMAT_SHIFT,
    NVOS32_ATTR_PAGE_SIZE_4KB, NVOS32_ATTR_PAGE_SIZE_BIG, NVOS32_ATTR_PAGE_SIZE_HUGE,
    NVOS32_ATTR_PAGE_SIZE_SHIFT, NVOS32_TYPE_IMAGE, RegisterFdArgs, RmAllocArgs, RmControlArgs,
    RmFreeArgs, SubdeviceAllocParams, status_to_errno,
};
use crate::nvrm::{DevInfo, DriverResult, DriverVersion, MemoryRequest, RmClient, RmDriver};
use std::fs::OpenOptions;
use std::io;
use std::os::fd::{IntoRawFd, RawFd};
use std::path::{Path, PathBuf};

pub const NV_CONTROL_PATH: &str = "/dev/nvidiactl";
pub const NV_DEVICE_PATH_PREFIX: &str = "/dev/nvidia";

const STANDARD_PAGE: u64 = 4096;
const BIG_PAGE: u64 = 64 * 1024;

fn last_errno() -> i32 {
    -io::Error::last_os_error().raw_os_error().unwrap_or(libc::EIO)
}

fn open_node(path: &Path) -> DriverResult<RawFd> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map_err(|e| -e.raw_os_error().unwrap_or(libc::ENODEV))?;
    Ok(file.into_raw_fd())
}

/// Issues RM and nvidia-drm ioctls against the real character devices.
///
/// Holds no kernel resources itself: every handle it opens is returned to the caller,
/// which owns closing it.
#[derive(Clone, Debug)]
pub struct NvKernelDriver {
    control_path: PathBuf,
    device_path_prefix: String,
}

impl Default for NvKernelDriver {
    fn default() -> Self {
        Self::new(NV_CONTROL_PATH, NV_DEVICE_PATH_PREFIX)
    }
}

impl NvKernelDriver {
    #[must_use]
    pub fn new(control_path: impl Into<PathBuf>, device_path_prefix: impl Into<String>) -> Self {
        Self {
            control_path: control_path.into(),
            device_path_prefix: device_path_prefix.into(),
        }
    }

    /// Generic unsafe helper to execute an IOCTL, restarting on `EINTR`.
    ///
    /// # Safety
    /// The caller must ensure that `arg` points to valid memory appropriate for the specific `cmd`.
    unsafe fn ioctl<T>(fd: RawFd, cmd: u32, arg: &mut T) -> DriverResult<()> {
        loop {
            let ret = unsafe { libc::ioctl(fd, cmd as _, arg as *mut T) };
            if ret >= 0 {
                return Ok(());
            }
            let errno = last_errno();
            if errno != -libc::EINTR {
                return Err(errno);
            }
        }
    }

    fn rm_alloc<P>(
        ctl_fd: RawFd,
        root: u32,
        parent: u32,
        new: u32,
        class: u32,
        params: Option<&mut P>,
    ) -> DriverResult<u32> {
        let (ptr, size) = match params {
            Some(p) => (p as *mut P as u64, std::mem::size_of::<P>() as u32),
            None => (0, 0),
        };
        let mut args = RmAllocArgs {
            h_root: root,
            h_object_parent: parent,
            h_object_new: new,
            h_class: class,
            p_alloc_parms: ptr,
            params_size: size,
            status: 0,
        };
        unsafe { Self::ioctl(ctl_fd, NV_IOC_RM_ALLOC, &mut args)? };
        match status_to_errno(args.status) {
            0 => Ok(args.h_object_new),
            errno => Err(errno),
        }
    }

    fn rm_control<P>(client: RmClient, object: u32, cmd: u32, params: &mut P) -> DriverResult<()> {
        let mut args = RmControlArgs {
            h_client: client.handle,
            h_object: object,
            cmd,
            flags: 0,
            params: params as *mut P as u64,
            params_size: std::mem::size_of::<P>() as u32,
            status: 0,
        };
        unsafe { Self::ioctl(client.ctl_fd, NV_IOC_RM_CONTROL, &mut args)? };
        match status_to_errno(args.status) {
            0 => Ok(()),
            errno => Err(errno),
        }
    }

    const fn page_size_attr(page_size: u64) -> u32 {
        let field = if page_size <= STANDARD_PAGE {
            NVOS32_ATTR_PAGE_SIZE_4KB
        } else if page_size <= BIG_PAGE {
            NVOS32_ATTR_PAGE_SIZE_BIG
        } else {
            NVOS32_ATTR_PAGE_SIZE_HUGE
        };
        field << NVOS32_ATTR_PAGE_SIZE_SHIFT
    }
}

impl RmDriver for NvKernelDriver {
    fn open_control(&self) -> DriverResult<RawFd> {
        open_node(&self.control_path)
    }

    fn open_device(&self, ctl_fd: RawFd, instance: u32) -> DriverResult<RawFd> {
        let path = PathBuf::from(format!("{}{instance}", self.device_path_prefix));
        let fd = open_node(&path)?;

        let mut args = RegisterFdArgs { ctl_fd };
        if let Err(e) = unsafe { Self::ioctl(fd, NV_IOC_REGISTER_FD, &mut args) } {
            unsafe { libc::close(fd) };
            return Err(e);
        }
        Ok(fd)
    }

    fn alloc_client(&self, ctl_fd: RawFd) -> DriverResult<u32> {
        Self::rm_alloc::<()>(ctl_fd, 0, 0, 0, NV01_ROOT_CLIENT, None)
    }

    fn query_driver_version(&self, client: RmClient) -> DriverResult<DriverVersion> {
        let mut params = BuildVersionV2Params::default();
        Self::rm_control(
            client,
            client.handle,
            NV0000_CTRL_CMD_SYSTEM_GET_BUILD_VERSION_V2,
            &mut params,
        )?;

        let buf = &params.driver_version_buffer;
        let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
        std::str::from_utf8(&buf[..end])
            .ok()
            .and_then(DriverVersion::parse)
            .ok_or(-libc::EPROTO)
    }

    fn query_dev_info(&self, display_fd: RawFd, version: DriverVersion) -> DriverResult<DevInfo> {
        if version.major >= DEV_INFO_V545_MAJOR {
            let mut params = DevInfoParams545::default();
            unsafe { Self::ioctl(display_fd, DRM_IOCTL_NVIDIA_GET_DEV_INFO_545, &mut params)? };
            Ok(DevInfo {
                gpu_id: params.gpu_id,
                primary_index: params.primary_index,
                generic_page_kind: params.generic_page_kind,
                page_kind_generation: params.page_kind_generation,
                sector_layout: params.sector_layout,
                supports_sync_fd: params.supports_sync_fd != 0,
            })
        } else {
            let mut params = DevInfoParams::default();
            unsafe { Self::ioctl(display_fd, DRM_IOCTL_NVIDIA_GET_DEV_INFO, &mut params)? };
            Ok(DevInfo {
                gpu_id: params.gpu_id,
                primary_index: params.primary_index,
                generic_page_kind: params.generic_page_kind,
                page_kind_generation: params.page_kind_generation,
                sector_layout: params.sector_layout,
                supports_sync_fd: false,
            })
        }
    }

    fn query_device_instance(&self, client: RmClient, gpu_id: u32) -> DriverResult<u32> {
        let mut params = GpuIdInfoV2Params {
            gpu_id,
            ..Default::default()
        };
        Self::rm_control(
            client,
            client.handle,
            NV0000_CTRL_CMD_GPU_GET_ID_INFO_V2,
            &mut params,
        )?;
        Ok(params.device_instance)
    }

    fn alloc_device(&self, client: RmClient, device: u32, instance: u32) -> DriverResult<()> {
        let mut params = DeviceAllocParams {
            device_id: instance,
            h_client_share: client.handle,
            ..Default::default()
        };
        Self::rm_alloc(
            client.ctl_fd,
            client.handle,
            client.handle,
            device,
            NV01_DEVICE_0,
            Some(&mut params),
        )
        .map(|_| ())
    }

    fn alloc_subdevice(&self, client: RmClient, device: u32, subdevice: u32) -> DriverResult<()> {
        let mut params = SubdeviceAllocParams { sub_device_id: 0 };
        Self::rm_alloc(
            client.ctl_fd,
            client.handle,
            device,
            subdevice,
            NV20_SUBDEVICE_0,
            Some(&mut params),
        )
        .map(|_| ())
    }

    fn query_architecture(&self, client: RmClient, subdevice: u32) -> DriverResult<u32> {
        let mut params = ArchInfoParams::default();
        Self::rm_control(client, subdevice, NV2080_CTRL_CMD_MC_GET_ARCH_INFO, &mut params)?;
        Ok(params.architecture)
    }

    fn query_gpu_uuid(&self, client: RmClient, subdevice: u32) -> DriverResult<[u8; 16]> {
        let mut params = GidInfoParams {
            flags: NV2080_GPU_CMD_GPU_GET_GID_FLAGS_FORMAT_BINARY,
            ..Default::default()
        };
        Self::rm_control(client, subdevice, NV2080_CTRL_CMD_GPU_GET_GID_INFO, &mut params)?;

        if (params.length as usize) < 16 {
            return Err(-libc::EPROTO);
        }
        let mut uuid = [0u8; 16];
        uuid.copy_from_slice(&params.data[..16]);
        Ok(uuid)
    }

    fn alloc_memory(
        &self,
        client: RmClient,
        device: u32,
        memory: u32,
        request: &MemoryRequest,
    ) -> DriverResult<()> {
        let (format, kind) = match request.block_linear_kind {
            Some(kind) => (NVOS32_ATTR_FORMAT_BLOCK_LINEAR, kind),
            None => (NVOS32_ATTR_FORMAT_PITCH, 0),
        };
        let mut params = MemoryAllocParams {
            owner: client.handle,
            type_: NVOS32_TYPE_IMAGE,
            flags: NVOS32_ALLOC_FLAGS_ALIGNMENT_FORCE,
            attr: (format << NVOS32_ATTR_FORMAT_SHIFT) | Self::page_size_attr(request.page_size),
            format: kind,
            size: request.size,
            alignment: request.alignment,
            numa_node: -1,
            ..Default::default()
        };
        Self::rm_alloc(
            client.ctl_fd,
            client.handle,
            device,
            memory,
            NV01_MEMORY_LOCAL_USER,
            Some(&mut params),
        )
        .map(|_| ())
    }

    fn export_object(&self, client: RmClient, device: u32, object: u32) -> DriverResult<RawFd> {
        // The export target is itself a control-node handle; the object is bound to it.
        let fd = self.open_control()?;
        let mut params = ExportObjectToFdParams {
            object_type: NV0000_CTRL_OS_UNIX_EXPORT_OBJECT_TYPE_RM,
            object: ExportRmObject {
                h_device: device,
                h_parent: device,
                h_object: object,
            },
            fd,
            flags: 0,
        };
        if let Err(e) = Self::rm_control(
            client,
            client.handle,
            NV0000_CTRL_CMD_OS_UNIX_EXPORT_OBJECT_TO_FD,
            &mut params,
        ) {
            unsafe { libc::close(fd) };
            return Err(e);
        }
        Ok(fd)
    }

    fn duplicate(&self, fd: RawFd) -> DriverResult<RawFd> {
        let dup = unsafe { libc::fcntl(fd, libc::F_DUPFD_CLOEXEC, 0) };
        if dup < 0 {
            return Err(last_errno());
        }
        Ok(dup)
    }

    fn free_object(&self, client: RmClient, parent: u32, object: u32) -> DriverResult<()> {
        let mut args = RmFreeArgs {
            h_root: client.handle,
            h_object_parent: parent,
            h_object_old: object,
            status: 0,
        };
        unsafe { Self::ioctl(client.ctl_fd, NV_IOC_RM_FREE, &mut args)? };
        match status_to_errno(args.status) {
            0 => Ok(()),
            errno => Err(errno),
        }
    }

    fn close(&self, fd: RawFd) -> DriverResult<()> {
        if unsafe { libc::close(fd) } < 0 {
            return Err(last_errno());
        }
        Ok(())
    }
}
