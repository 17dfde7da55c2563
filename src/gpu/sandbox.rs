//! Detection of sandboxed browser hosts.
//!
//! Inside such hosts the driver's permission rejections are expected policy outcomes rather
//! than device faults, so the context uses this to classify `-EACCES`.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Presence (any value) forces the sandboxed classification.
pub const SANDBOX_OVERRIDE_VAR: &str = "FORCENVDEC";

/// Case-sensitive substrings of executable paths belonging to sandboxed browser hosts.
pub const SANDBOX_HOST_MARKERS: &[&str] = &["chrome", "chromium", "thorium"];

const SELF_EXE_LINK: &str = "/proc/self/exe";

/// The two inputs of the classification, captured explicitly so they can be substituted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SandboxProbe {
    override_set: bool,
    exe_path: Option<PathBuf>,
}

impl SandboxProbe {
    #[must_use]
    pub fn new(override_set: bool, exe_path: Option<PathBuf>) -> Self {
        Self {
            override_set,
            exe_path,
        }
    }

    /// Captures the running process. An unresolvable executable path is recorded as `None`.
    #[must_use]
    pub fn from_process() -> Self {
        Self {
            override_set: env::var_os(SANDBOX_OVERRIDE_VAR).is_some(),
            exe_path: fs::read_link(SELF_EXE_LINK).ok(),
        }
    }

    #[must_use]
    pub fn exe_path(&self) -> Option<&Path> {
        self.exe_path.as_deref()
    }

    #[must_use]
    pub fn is_sandbox_host(&self) -> bool {
        if self.override_set {
            return true;
        }
        let Some(path) = &self.exe_path else {
            return false;
        };
        let path = path.to_string_lossy();
        SANDBOX_HOST_MARKERS.iter().any(|marker| path.contains(marker))
    }
}

/// Classifies the current process. Cheap enough to call repeatedly; callers may cache it.
#[must_use]
pub fn is_sandbox_host() -> bool {
    SandboxProbe::from_process().is_sandbox_host()
}
