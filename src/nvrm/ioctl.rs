//! Resource Manager (RM) escape codes, object classes, control commands and their
//! parameter blocks as consumed by `nvidia.ko` through `/dev/nvidiactl` and `/dev/nvidiaN`.

use crate::utils::iowr;

// ===============================================================================================
// Escape Codes
// ===============================================================================================

pub const NV_IOCTL_MAGIC: u32 = 0x46; // 'F'

pub const NV_ESC_RM_FREE: u32 = 0x29;
pub const NV_ESC_RM_CONTROL: u32 = 0x2A;
pub const NV_ESC_RM_ALLOC: u32 = 0x2B;
pub const NV_ESC_REGISTER_FD: u32 = 0xC9;

pub const NV_IOC_RM_FREE: u32 = iowr::<RmFreeArgs>(NV_IOCTL_MAGIC, NV_ESC_RM_FREE);
pub const NV_IOC_RM_CONTROL: u32 = iowr::<RmControlArgs>(NV_IOCTL_MAGIC, NV_ESC_RM_CONTROL);
pub const NV_IOC_RM_ALLOC: u32 = iowr::<RmAllocArgs>(NV_IOCTL_MAGIC, NV_ESC_RM_ALLOC);
pub const NV_IOC_REGISTER_FD: u32 = iowr::<RegisterFdArgs>(NV_IOCTL_MAGIC, NV_ESC_REGISTER_FD);

// ===============================================================================================
// RM Status Codes
// ===============================================================================================

pub const NV_OK: u32 = 0x00;
pub const NV_ERR_BUSY_RETRY: u32 = 0x03;
pub const NV_ERR_INSUFFICIENT_PERMISSIONS: u32 = 0x1B;
pub const NV_ERR_INSUFFICIENT_RESOURCES: u32 = 0x1A;
pub const NV_ERR_NO_MEMORY: u32 = 0x51;
pub const NV_ERR_STATE_IN_USE: u32 = 0x63;

/// Folds an RM status word into the negative errno convention of the driver boundary.
#[must_use]
pub const fn status_to_errno(status: u32) -> i32 {
    match status {
        NV_OK => 0,
        NV_ERR_INSUFFICIENT_PERMISSIONS => -libc::EACCES,
        NV_ERR_BUSY_RETRY | NV_ERR_STATE_IN_USE => -libc::EAGAIN,
        NV_ERR_NO_MEMORY | NV_ERR_INSUFFICIENT_RESOURCES => -libc::ENOMEM,
        _ => -libc::EIO,
    }
}

// ===============================================================================================
// Object Classes
// ===============================================================================================

pub const NV01_ROOT_CLIENT: u32 = 0x0041;
pub const NV01_MEMORY_LOCAL_USER: u32 = 0x0040;
pub const NV01_DEVICE_0: u32 = 0x0080;
pub const NV20_SUBDEVICE_0: u32 = 0x2080;

// ===============================================================================================
// Generic Alloc / Free / Control
// ===============================================================================================

/// `NVOS21_PARAMETERS`
#[repr(C)]
#[derive(Debug, Default, Copy, Clone)]
pub struct RmAllocArgs {
    pub h_root: u32,
    pub h_object_parent: u32,
    pub h_object_new: u32,
    pub h_class: u32,
    pub p_alloc_parms: u64,
    pub params_size: u32,
    pub status: u32,
}

/// `NVOS00_PARAMETERS`
#[repr(C)]
#[derive(Debug, Default, Copy, Clone)]
pub struct RmFreeArgs {
    pub h_root: u32,
    pub h_object_parent: u32,
    pub h_object_old: u32,
    pub status: u32,
}

/// `NVOS54_PARAMETERS`
#[repr(C)]
#[derive(Debug, Default, Copy, Clone)]
pub struct RmControlArgs {
    pub h_client: u32,
    pub h_object: u32,
    pub cmd: u32,
    pub flags: u32,
    pub params: u64,
    pub params_size: u32,
    pub status: u32,
}

#[repr(C)]
#[derive(Debug, Default, Copy, Clone)]
pub struct RegisterFdArgs {
    pub ctl_fd: i32,
}

// ===============================================================================================
// Allocation Parameters
// ===============================================================================================

/// `NV0080_ALLOC_PARAMETERS`
#[repr(C)]
#[derive(Debug, Default, Copy, Clone)]
pub struct DeviceAllocParams {
    pub device_id: u32,
    pub h_client_share: u32,
    pub h_target_client: u32,
    pub h_target_device: u32,
    pub flags: u32,
    pub va_space_size: u64,
    pub va_start_internal: u64,
    pub va_limit_internal: u64,
    pub va_mode: u32,
}

/// `NV2080_ALLOC_PARAMETERS`
#[repr(C)]
#[derive(Debug, Default, Copy, Clone)]
pub struct SubdeviceAllocParams {
    pub sub_device_id: u32,
}

pub const NVOS32_TYPE_IMAGE: u32 = 0;
pub const NVOS32_ALLOC_FLAGS_ALIGNMENT_FORCE: u32 = 0x0000_0100;

pub const NVOS32_ATTR_FORMAT_SHIFT: u32 = 8;
pub const NVOS32_ATTR_FORMAT_PITCH: u32 = 0;
pub const NVOS32_ATTR_FORMAT_BLOCK_LINEAR: u32 = 2;
pub const NVOS32_ATTR_PAGE_SIZE_SHIFT: u32 = 23;
pub const NVOS32_ATTR_PAGE_SIZE_4KB: u32 = 1;
pub const NVOS32_ATTR_PAGE_SIZE_BIG: u32 = 2;
pub const NVOS32_ATTR_PAGE_SIZE_HUGE: u32 = 3;

/// `NV_MEMORY_ALLOCATION_PARAMS`
#[repr(C)]
#[derive(Debug, Default, Copy, Clone)]
pub struct MemoryAllocParams {
    pub owner: u32,
    pub type_: u32,
    pub flags: u32,
    pub width: u32,
    pub height: u32,
    pub pitch: i32,
    pub attr: u32,
    pub attr2: u32,
    pub format: u32,
    pub compr_covg: u32,
    pub zcull_covg: u32,
    pub range_lo: u64,
    pub range_hi: u64,
    pub size: u64,
    pub alignment: u64,
    pub offset: u64,
    pub limit: u64,
    pub address: u64,
    pub ctag_offset: u32,
    pub h_va_space: u32,
    pub internal_flags: u32,
    pub tag: u32,
    pub numa_node: i32,
}

// ===============================================================================================
// Control Commands (NV0000: client, NV2080: subdevice)
// ===============================================================================================

pub const NV0000_CTRL_CMD_SYSTEM_GET_BUILD_VERSION_V2: u32 = 0x0000_013E;
pub const NV0000_CTRL_CMD_GPU_GET_ID_INFO_V2: u32 = 0x0000_0205;
pub const NV0000_CTRL_CMD_OS_UNIX_EXPORT_OBJECT_TO_FD: u32 = 0x0000_3D05;
pub const NV2080_CTRL_CMD_GPU_GET_GID_INFO: u32 = 0x2080_014A;
pub const NV2080_CTRL_CMD_MC_GET_ARCH_INFO: u32 = 0x2080_1701;

pub const NV_BUILD_VERSION_BUFFER_SIZE: usize = 256;

#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct BuildVersionV2Params {
    pub driver_version_buffer: [u8; NV_BUILD_VERSION_BUFFER_SIZE],
    pub version_buffer: [u8; NV_BUILD_VERSION_BUFFER_SIZE],
    pub title_buffer: [u8; NV_BUILD_VERSION_BUFFER_SIZE],
    pub changelist_number: u32,
    pub official_changelist_number: u32,
}

impl Default for BuildVersionV2Params {
    fn default() -> Self {
        Self {
            driver_version_buffer: [0; NV_BUILD_VERSION_BUFFER_SIZE],
            version_buffer: [0; NV_BUILD_VERSION_BUFFER_SIZE],
            title_buffer: [0; NV_BUILD_VERSION_BUFFER_SIZE],
            changelist_number: 0,
            official_changelist_number: 0,
        }
    }
}

#[repr(C)]
#[derive(Debug, Default, Copy, Clone)]
pub struct GpuIdInfoV2Params {
    pub gpu_id: u32,
    pub gpu_flags: u32,
    pub device_instance: u32,
    pub sub_device_instance: u32,
    pub sli_status: u32,
    pub board_id: u32,
    pub gpu_instance: u32,
    pub numa_id: i32,
}

pub const NV0000_CTRL_OS_UNIX_EXPORT_OBJECT_TYPE_RM: u32 = 1;

#[repr(C)]
#[derive(Debug, Default, Copy, Clone)]
pub struct ExportRmObject {
    pub h_device: u32,
    pub h_parent: u32,
    pub h_object: u32,
}

#[repr(C)]
#[derive(Debug, Default, Copy, Clone)]
pub struct ExportObjectToFdParams {
    pub object_type: u32,
    pub object: ExportRmObject,
    pub fd: i32,
    pub flags: u32,
}

pub const NV2080_GPU_CMD_GPU_GET_GID_FLAGS_FORMAT_BINARY: u32 = 0x2;
pub const NV2080_GPU_MAX_GID_LENGTH: usize = 0x100;

#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct GidInfoParams {
    pub index: u32,
    pub flags: u32,
    pub length: u32,
    pub data: [u8; NV2080_GPU_MAX_GID_LENGTH],
}

impl Default for GidInfoParams {
    fn default() -> Self {
        Self {
            index: 0,
            flags: 0,
            length: 0,
            data: [0; NV2080_GPU_MAX_GID_LENGTH],
        }
    }
}

#[repr(C)]
#[derive(Debug, Default, Copy, Clone)]
pub struct ArchInfoParams {
    pub architecture: u32,
    pub implementation: u32,
    pub revision: u32,
    pub sub_revision: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::size_of;

    #[test]
    fn parameter_blocks_match_kernel_layout() {
        assert_eq!(size_of::<RmAllocArgs>(), 32);
        assert_eq!(size_of::<RmFreeArgs>(), 16);
        assert_eq!(size_of::<RmControlArgs>(), 32);
        assert_eq!(size_of::<ExportObjectToFdParams>(), 24);
        assert_eq!(size_of::<DeviceAllocParams>(), 56);
    }

    #[test]
    fn rm_status_maps_to_errno() {
        assert_eq!(status_to_errno(NV_OK), 0);
        assert_eq!(status_to_errno(NV_ERR_INSUFFICIENT_PERMISSIONS), -libc::EACCES);
        assert_eq!(status_to_errno(NV_ERR_BUSY_RETRY), -libc::EAGAIN);
        assert_eq!(status_to_errno(NV_ERR_NO_MEMORY), -libc::ENOMEM);
        assert_eq!(status_to_errno(0x1F), -libc::EIO);
    }
}
