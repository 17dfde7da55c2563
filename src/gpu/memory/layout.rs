//! Pure surface geometry: pitch, total size, page tier and block height.

use crate::error::{NvError, NvResult};
use crate::gpu::arch::ArchProfile;
use crate::utils::align_up;

pub const MAX_CHANNELS: u8 = 4;
pub const MAX_BYTES_PER_CHANNEL: u8 = 2;

/// Geometry of a single-surface image allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageLayout {
    pub pitch: u32,
    pub size: u64,
    pub page_size: u64,
    pub log2_gobs_y: u32,
}

/// Chooses the page tier for an allocation of `size` bytes.
///
/// The large tier is only used when the generation has one and a threshold is configured.
#[must_use]
pub fn page_size_for(profile: &ArchProfile, large_page_threshold: Option<u64>, size: u64) -> u64 {
    match (profile.page_size_large, large_page_threshold) {
        (Some(large), Some(threshold)) if size > threshold => large,
        _ => profile.page_size_standard,
    }
}

/// Rounds a raw allocation request to its page tier. Returns `(size, page_size)`.
///
/// # Errors
/// `InvalidArgument` for a zero size, or one that cannot be rounded to its page tier.
pub fn raw_allocation(
    profile: &ArchProfile,
    large_page_threshold: Option<u64>,
    size: u64,
) -> NvResult<(u64, u64)> {
    if size == 0 {
        return Err(NvError::InvalidArgument("allocation size must be non-zero".into()));
    }
    let page = page_size_for(profile, large_page_threshold, size);
    let rounded = align_up(size, page).ok_or_else(|| {
        NvError::InvalidArgument(format!("allocation size {size} overflows when page-aligned"))
    })?;
    Ok((rounded, page))
}

fn aligned(value: u64, step: u64, what: &str) -> NvResult<u64> {
    align_up(value, step)
        .ok_or_else(|| NvError::InvalidArgument(format!("{what} {value} overflows when aligned")))
}

/// Smallest block height (log2 GOBs) covering `height` rows, capped at the profile maximum.
#[must_use]
pub fn log2_block_height(profile: &ArchProfile, height: u32) -> u32 {
    let gobs = height.div_ceil(profile.gob_height);
    let log2 = if gobs <= 1 {
        0
    } else {
        u32::BITS - (gobs - 1).leading_zeros()
    };
    log2.min(profile.max_log2_gobs_y)
}

/// Validates image parameters and computes their layout.
///
/// # Errors
/// `InvalidArgument` for zero dimensions, `channels` outside `1..=4`, `bytes_per_channel`
/// outside `1..=2`, or a pitch that does not fit 32 bits.
pub fn image_layout(
    profile: &ArchProfile,
    large_page_threshold: Option<u64>,
    width: u32,
    height: u32,
    channels: u8,
    bytes_per_channel: u8,
) -> NvResult<ImageLayout> {
    if width == 0 || height == 0 {
        return Err(NvError::InvalidArgument(format!(
            "image dimensions must be non-zero, got {width}x{height}"
        )));
    }
    if !(1..=MAX_CHANNELS).contains(&channels) {
        return Err(NvError::InvalidArgument(format!(
            "channels must be 1..={MAX_CHANNELS}, got {channels}"
        )));
    }
    if !(1..=MAX_BYTES_PER_CHANNEL).contains(&bytes_per_channel) {
        return Err(NvError::InvalidArgument(format!(
            "bytes per channel must be 1..={MAX_BYTES_PER_CHANNEL}, got {bytes_per_channel}"
        )));
    }

    let row_bytes = u64::from(width) * u64::from(channels) * u64::from(bytes_per_channel);
    let pitch = aligned(row_bytes, profile.pitch_alignment, "pitch")?;
    let pitch = u32::try_from(pitch)
        .map_err(|_| NvError::InvalidArgument(format!("pitch {pitch} exceeds 32 bits")))?;

    let surface = aligned(
        u64::from(pitch) * u64::from(height),
        profile.surface_alignment,
        "surface",
    )?;
    let page_size = page_size_for(profile, large_page_threshold, surface);

    Ok(ImageLayout {
        pitch,
        size: aligned(surface, page_size, "image size")?,
        page_size,
        log2_gobs_y: log2_block_height(profile, height),
    })
}
