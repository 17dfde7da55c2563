use crate::error::{NvError, NvResult};
use crate::gpu::arch::ArchProfile;
use crate::gpu::sandbox::SandboxProbe;
use crate::nvrm::device::{NV_CONTROL_PATH, NV_DEVICE_PATH_PREFIX, NvKernelDriver};
use std::path::PathBuf;

/// Settings applied when a [`DeviceContext`](crate::gpu::context::DeviceContext) is created.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    pub control_path: PathBuf,
    pub device_path_prefix: String,
    /// Allocations strictly larger than this use the large-page tier, when the generation has
    /// one. `None` keeps every allocation on standard pages.
    pub large_page_threshold: Option<u64>,
    /// Substitute environment for sandbox classification; `None` probes the running process.
    pub sandbox_probe: Option<SandboxProbe>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            control_path: PathBuf::from(NV_CONTROL_PATH),
            device_path_prefix: NV_DEVICE_PATH_PREFIX.to_string(),
            large_page_threshold: None,
            sandbox_probe: None,
        }
    }
}

impl DriverConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn control_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.control_path = path.into();
        self
    }

    #[must_use]
    pub fn device_path_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.device_path_prefix = prefix.into();
        self
    }

    #[must_use]
    pub fn large_page_threshold(mut self, bytes: u64) -> Self {
        self.large_page_threshold = Some(bytes);
        self
    }

    #[must_use]
    pub fn sandbox_probe(mut self, probe: SandboxProbe) -> Self {
        self.sandbox_probe = Some(probe);
        self
    }

    /// Builds the ioctl driver for the configured device nodes.
    #[must_use]
    pub fn kernel_driver(&self) -> NvKernelDriver {
        NvKernelDriver::new(self.control_path.clone(), self.device_path_prefix.clone())
    }

    /// Resolves the sandbox classification, probing the process when nothing was injected.
    #[must_use]
    pub fn is_sandbox_host(&self) -> bool {
        self.sandbox_probe
            .as_ref()
            .map_or_else(crate::gpu::sandbox::is_sandbox_host, SandboxProbe::is_sandbox_host)
    }

    /// Checks the settings against the profile the context was classified into.
    pub(crate) fn validate(&self, profile: &ArchProfile) -> NvResult<()> {
        match self.large_page_threshold {
            Some(t) if t < profile.page_size_standard => Err(NvError::InvalidArgument(format!(
                "large page threshold {t} is below the {} byte standard page",
                profile.page_size_standard
            ))),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::arch::classify;

    #[test]
    fn defaults_point_at_real_nodes() {
        let cfg = DriverConfig::new();
        assert_eq!(cfg.control_path, PathBuf::from("/dev/nvidiactl"));
        assert_eq!(cfg.device_path_prefix, "/dev/nvidia");
        assert!(cfg.large_page_threshold.is_none());
    }

    #[test]
    fn injected_probe_is_used() {
        let cfg = DriverConfig::new().sandbox_probe(SandboxProbe::new(true, None));
        assert!(cfg.is_sandbox_host());
        let cfg = DriverConfig::new().sandbox_probe(SandboxProbe::new(false, None));
        assert!(!cfg.is_sandbox_host());
    }

    #[test]
    fn threshold_below_standard_page_is_rejected() {
        let blackwell = classify(0x1B0);
        assert!(DriverConfig::new().validate(&blackwell).is_ok());
        assert!(DriverConfig::new()
            .large_page_threshold(1 << 20)
            .validate(&blackwell)
            .is_ok());
        assert!(matches!(
            DriverConfig::new().large_page_threshold(4096).validate(&blackwell),
            Err(NvError::InvalidArgument(_))
        ));
    }
}
