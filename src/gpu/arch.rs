//! Architecture classification: raw architecture id to generation and layout constants.

/// GPU generations, declared in boundary order so `Ord` follows the table below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GpuArch {
    Unknown,
    Kepler,
    Maxwell,
    Pascal,
    Volta,
    Turing,
    Ampere,
    Hopper,
    Ada,
    Blackwell,
}

/// Minimum architecture id of each generation, sorted ascending.
pub const ARCH_BOUNDARIES: &[(u32, GpuArch)] = &[
    (0x0E0, GpuArch::Kepler),
    (0x110, GpuArch::Maxwell),
    (0x130, GpuArch::Pascal),
    (0x140, GpuArch::Volta),
    (0x160, GpuArch::Turing),
    (0x170, GpuArch::Ampere),
    (0x180, GpuArch::Hopper),
    (0x190, GpuArch::Ada),
    (0x1B0, GpuArch::Blackwell),
];

pub const GOB_WIDTH: u32 = 64;
pub const GOB_HEIGHT: u32 = 8;

pub const BLACKWELL_SURFACE_ALIGNMENT: u64 = 512;
pub const BLACKWELL_PITCH_ALIGNMENT: u64 = 256;
pub const BLACKWELL_PAGE_SIZE_STANDARD: u64 = 64 * 1024;
pub const BLACKWELL_PAGE_SIZE_LARGE: u64 = 256 * 1024;
pub const BLACKWELL_MAX_LOG2_GOBS_Y: u32 = 5;

/// Layout constants of one generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchProfile {
    pub arch: GpuArch,
    pub surface_alignment: u64,
    pub pitch_alignment: u64,
    pub page_size_standard: u64,
    /// `None` when the generation has no large-page tier.
    pub page_size_large: Option<u64>,
    pub gob_width: u32,
    pub gob_height: u32,
    pub max_log2_gobs_y: u32,
    /// Informational capability bits for callers; no operation in this crate branches on them.
    pub supports_dmabuf_v2: bool,
    pub supports_low_latency_decode: bool,
}

// Pre-Blackwell values are provisional pending vendor documentation; they only need to be
// no stricter than the next generation up.
const LEGACY_PROFILE: ArchProfile = ArchProfile {
    arch: GpuArch::Unknown,
    surface_alignment: 256,
    pitch_alignment: 64,
    page_size_standard: 4096,
    page_size_large: None,
    gob_width: GOB_WIDTH,
    gob_height: GOB_HEIGHT,
    max_log2_gobs_y: 4,
    supports_dmabuf_v2: false,
    supports_low_latency_decode: false,
};

const TURING_PROFILE: ArchProfile = ArchProfile {
    arch: GpuArch::Turing,
    surface_alignment: 512,
    pitch_alignment: 128,
    page_size_standard: 64 * 1024,
    page_size_large: None,
    gob_width: GOB_WIDTH,
    gob_height: GOB_HEIGHT,
    max_log2_gobs_y: 4,
    supports_dmabuf_v2: true,
    supports_low_latency_decode: false,
};

const BLACKWELL_PROFILE: ArchProfile = ArchProfile {
    arch: GpuArch::Blackwell,
    surface_alignment: BLACKWELL_SURFACE_ALIGNMENT,
    pitch_alignment: BLACKWELL_PITCH_ALIGNMENT,
    page_size_standard: BLACKWELL_PAGE_SIZE_STANDARD,
    page_size_large: Some(BLACKWELL_PAGE_SIZE_LARGE),
    gob_width: GOB_WIDTH,
    gob_height: GOB_HEIGHT,
    max_log2_gobs_y: BLACKWELL_MAX_LOG2_GOBS_Y,
    supports_dmabuf_v2: true,
    supports_low_latency_decode: true,
};

impl GpuArch {
    /// Floor lookup: the last boundary not above `arch_id`, or `Unknown` below all of them.
    #[must_use]
    pub fn from_arch_id(arch_id: u32) -> Self {
        let idx = ARCH_BOUNDARIES.partition_point(|&(min, _)| min <= arch_id);
        idx.checked_sub(1)
            .map_or(Self::Unknown, |i| ARCH_BOUNDARIES[i].1)
    }

    #[must_use]
    pub const fn profile(self) -> ArchProfile {
        let base = match self {
            Self::Unknown | Self::Kepler | Self::Maxwell | Self::Pascal | Self::Volta => {
                LEGACY_PROFILE
            }
            Self::Turing | Self::Ampere | Self::Hopper | Self::Ada => TURING_PROFILE,
            Self::Blackwell => BLACKWELL_PROFILE,
        };
        ArchProfile { arch: self, ..base }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Kepler => "Kepler",
            Self::Maxwell => "Maxwell",
            Self::Pascal => "Pascal",
            Self::Volta => "Volta",
            Self::Turing => "Turing",
            Self::Ampere => "Ampere",
            Self::Hopper => "Hopper",
            Self::Ada => "Ada",
            Self::Blackwell => "Blackwell",
        }
    }
}

/// Maps a raw architecture id to its generation profile.
#[must_use]
pub fn classify(arch_id: u32) -> ArchProfile {
    GpuArch::from_arch_id(arch_id).profile()
}
