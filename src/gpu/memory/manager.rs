use crate::error::{NvError, NvResult};
use crate::gpu::context::DeviceContext;
use crate::gpu::memory::layout::{image_layout, raw_allocation};
use crate::gpu::memory::{GpuMemory, ImageBuffer};
use crate::nvrm::drm::block_linear_2d_modifier;
use crate::nvrm::{MemoryRequest, RmDriver};
use log::trace;

/// Allocation operations on an initialized [`DeviceContext`].
///
/// Every call checks the context state before issuing any kernel command.
pub trait MemoryAllocator {
    /// Allocates at least `size` bytes of video memory and exports it.
    ///
    /// # Errors
    /// `InvalidState`/`NotInitialized` on a context that is not live, `InvalidArgument` for a
    /// zero size or one too large to page-align, and the classified driver error (typically
    /// `AllocationFailed`) otherwise.
    fn alloc_memory(&mut self, size: u64) -> NvResult<GpuMemory>;

    /// Closes the exported handle of a raw allocation, releasing its video memory.
    ///
    /// # Errors
    /// The classified driver error of the close.
    fn release_memory(&self, memory: GpuMemory) -> NvResult<()>;

    /// Allocates a block-linear image surface.
    ///
    /// # Errors
    /// As [`MemoryAllocator::alloc_memory`], plus `InvalidArgument` for parameter violations.
    fn alloc_image(
        &mut self,
        width: u32,
        height: u32,
        channels: u8,
        bytes_per_channel: u8,
        fourcc: u32,
    ) -> NvResult<ImageBuffer>;

    /// Closes whichever handles of `image` were not exported.
    ///
    /// # Errors
    /// The classified driver error of the first failing close.
    fn release_image(&self, image: ImageBuffer) -> NvResult<()>;
}

impl<D: RmDriver> DeviceContext<D> {
    fn alloc_exported(
        &mut self,
        size: u64,
        alignment: u64,
        page_size: u64,
        block_linear_kind: Option<u32>,
    ) -> NvResult<GpuMemory> {
        let (driver, _, sandboxed, live) = self.live_mut()?;
        let client = live.handles.rm_client();
        let device = live.handles.device;
        let memory = live.next_memory_handle();
        let err = |op: &'static str| move |code: i32| NvError::from_driver(op, code, sandboxed);

        let request = MemoryRequest {
            size,
            alignment,
            page_size,
            block_linear_kind,
        };
        driver
            .alloc_memory(client, device, memory, &request)
            .map_err(err("alloc_memory"))?;

        let fd = match driver.export_object(client, device, memory) {
            Ok(fd) => fd,
            Err(code) => {
                let _ = driver.free_object(client, device, memory);
                return Err(err("export_object")(code));
            }
        };

        // The exported handle keeps the memory alive; the RM object is no longer needed.
        if let Err(code) = driver.free_object(client, device, memory) {
            let _ = driver.close(fd);
            return Err(err("free_memory_object")(code));
        }

        trace!("nvrm: allocated {size} bytes (page {page_size}) as fd {fd}");
        Ok(GpuMemory {
            fd,
            size,
            page_size,
        })
    }
}

impl<D: RmDriver> MemoryAllocator for DeviceContext<D> {
    fn alloc_memory(&mut self, size: u64) -> NvResult<GpuMemory> {
        let (_, config, _, live) = self.live_mut()?;
        let profile = live.info.profile;
        let (size, page_size) = raw_allocation(&profile, config.large_page_threshold, size)?;
        self.alloc_exported(size, page_size, page_size, None)
    }

    fn release_memory(&self, memory: GpuMemory) -> NvResult<()> {
        self.driver()
            .close(memory.fd)
            .map_err(|code| NvError::from_driver("close_memory", code, self.is_sandboxed()))?;
        trace!("nvrm: released {} bytes from fd {}", memory.size, memory.fd);
        Ok(())
    }

    fn alloc_image(
        &mut self,
        width: u32,
        height: u32,
        channels: u8,
        bytes_per_channel: u8,
        fourcc: u32,
    ) -> NvResult<ImageBuffer> {
        let (_, config, _, live) = self.live_mut()?;
        let info = live.info;
        let drm_fd = live.handles.display_fd;
        let layout = image_layout(
            &info.profile,
            config.large_page_threshold,
            width,
            height,
            channels,
            bytes_per_channel,
        )?;
        trace!("nvrm: image {width}x{height} c{channels} b{bytes_per_channel}: {layout:?}");

        let memory = self.alloc_exported(
            layout.size,
            info.profile.surface_alignment,
            layout.page_size,
            Some(info.generic_page_kind),
        )?;

        let (driver, _, sandboxed, _) = self.live_mut()?;
        let export_fd = match driver.duplicate(memory.fd) {
            Ok(fd) => fd,
            Err(code) => {
                let _ = driver.close(memory.fd);
                return Err(NvError::from_driver("duplicate", code, sandboxed));
            }
        };

        Ok(ImageBuffer {
            nv_fd: memory.fd,
            export_fd: Some(export_fd),
            drm_fd,
            width,
            height,
            modifier: block_linear_2d_modifier(
                0,
                info.sector_layout,
                info.page_kind_generation,
                info.generic_page_kind,
                layout.log2_gobs_y,
            ),
            memory_size: memory.size,
            offset: 0,
            pitch: layout.pitch,
            fourcc,
        })
    }

    fn release_image(&self, mut image: ImageBuffer) -> NvResult<()> {
        let mut first = self.driver().close(image.nv_fd).err();
        if let Some(fd) = image.take_export_handle() {
            if let Err(code) = self.driver().close(fd) {
                first.get_or_insert(code);
            }
        }
        match first {
            Some(code) => Err(NvError::from_driver("close_image", code, self.is_sandboxed())),
            None => Ok(()),
        }
    }
}
