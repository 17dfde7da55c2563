use nvrm_rs::nvrm::drm::DRM_FORMAT_R8;
use nvrm_rs::{DeviceContext, DriverConfig, MemoryAllocator, is_sandbox_host};
use std::env;
use std::fs::OpenOptions;
use std::os::fd::AsRawFd;

fn format_uuid(uuid: &[u8; 16]) -> String {
    uuid.iter().map(|b| format!("{b:02x}")).collect()
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let node = env::args()
        .nth(1)
        .unwrap_or_else(|| "/dev/dri/renderD128".to_string());

    println!("--- NVIDIA Direct Device Info ---");
    println!("Render node:  {node}");
    println!("Sandbox host: {}", is_sandbox_host());

    // The display handle stays owned by us for the lifetime of the context.
    let display = OpenOptions::new().read(true).write(true).open(&node)?;

    let mut ctx = DeviceContext::new(DriverConfig::new());
    if let Err(e) = ctx.initialize(display.as_raw_fd()) {
        eprintln!("Failed to initialize device context (is nvidia-drm loaded?): {e}");
        return Err(e.into());
    }

    if let Some(info) = ctx.info() {
        let p = &info.profile;
        println!("Driver:       {}.{}", info.driver_version.major, info.driver_version.minor);
        println!("GPU id:       {:#x}", info.gpu_id);
        println!("Architecture: {} ({:#x})", p.arch.name(), info.arch_id);
        println!("Page kind:    {:#x} (gen {})", info.generic_page_kind, info.page_kind_generation);
        println!("Alignment:    surface {} / pitch {}", p.surface_alignment, p.pitch_alignment);
        println!("Pages:        {} / {:?}", p.page_size_standard, p.page_size_large);
        println!("dma-buf v2:   {}", p.supports_dmabuf_v2);
        println!("LL decode:    {}", p.supports_low_latency_decode);
    }

    match ctx.device_uuid() {
        Ok(uuid) => println!("UUID:         GPU-{}", format_uuid(&uuid)),
        Err(e) => println!("UUID:         unavailable ({e})"),
    }

    println!("\n--- Test Allocation (1920x1080 R8) ---");
    match ctx.alloc_image(1920, 1080, 1, 1, DRM_FORMAT_R8) {
        Ok(image) => {
            println!("  pitch:    {}", image.pitch);
            println!("  size:     {}", image.memory_size);
            println!("  modifier: {:#018x}", image.modifier);
            ctx.release_image(image)?;
        }
        Err(e) => println!("  failed: {e} (fatal: {})", e.is_fatal()),
    }

    println!("\n--- Test Allocation (1 MiB raw) ---");
    match ctx.alloc_memory(1 << 20) {
        Ok(memory) => {
            println!("  size:     {}", memory.size);
            println!("  page:     {}", memory.page_size);
            ctx.release_memory(memory)?;
        }
        Err(e) => println!("  failed: {e} (fatal: {})", e.is_fatal()),
    }

    ctx.teardown()?;
    Ok(())
}
