//! Device and memory management directly over the NVIDIA kernel driver's ioctl interface:
//! acquire a GPU through an nvidia-drm handle, classify its generation, and allocate
//! architecture-aligned image buffers exportable to other processes as file descriptors.

pub mod config;
pub mod error;
pub mod gpu;
pub mod nvrm;
pub mod utils;

pub use config::DriverConfig;
pub use error::{NvError, NvResult};
pub use gpu::arch::{ArchProfile, GpuArch, classify};
pub use gpu::context::{ContextState, DeviceContext, DeviceHandles, DeviceInfo};
pub use gpu::memory::{GpuMemory, ImageBuffer, MemoryAllocator};
pub use gpu::sandbox::{SandboxProbe, is_sandbox_host};
pub use nvrm::{DevInfo, DriverResult, DriverVersion, MemoryRequest, RmClient, RmDriver};
