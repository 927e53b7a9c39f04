//! One pooled dma-buf: kernel memory plus the GPU objects imported from it.
//!
//! Each sub-resource sits in its own `Option` and is taken exactly once on
//! release, so a buffer whose construction stopped half-way tears down only
//! what it acquired. Release runs in reverse creation order: framebuffer,
//! texture, image, CPU mapping, then the dma-buf handle.

use std::fmt;
use std::os::fd::{AsFd, BorrowedFd};
use std::rc::Rc;

use tracing::{debug, info};

use crate::error::{BufferError, ImportError};
use crate::format::{BufferLayout, PixelFormat};
use crate::frame::FrameTarget;
use crate::gpu::{DmabufPlane, GpuImporter};
use crate::ion::{select_heap, AllocationRequest, HeapDevice, HeapSelection, HeapType};
use crate::memory::{self, CpuMapping, MemoryAllocation};

/// Parameters shared by every buffer of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferRequest {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub heap: HeapType,
    /// Map the allocation into the address space as well.
    pub map_cpu: bool,
}

/// A sub-resource released by [`DmaBuffer::release_resources`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleasedResource {
    Framebuffer,
    Texture,
    Image,
    Mapping,
    Handle,
}

pub struct DmaBuffer<G: GpuImporter> {
    gpu: Rc<G>,
    layout: BufferLayout,
    format: PixelFormat,
    heap: HeapSelection,
    framebuffer: Option<G::Framebuffer>,
    texture: Option<G::Texture>,
    image: Option<G::Image>,
    mapping: Option<CpuMapping>,
    memory: Option<MemoryAllocation>,
}

impl<G: GpuImporter> DmaBuffer<G> {
    /// Allocates and imports one buffer.
    ///
    /// Steps: heap selection, allocation, optional CPU mapping, image import,
    /// texture, framebuffer, completeness check. Whatever was acquired before
    /// a failing step is released before the error is returned.
    pub fn create<D: HeapDevice + ?Sized>(
        device: &D,
        gpu: Rc<G>,
        request: &BufferRequest,
    ) -> Result<Self, BufferError> {
        let heap = select_heap(device, request.heap)?;
        let layout = BufferLayout::new(request.width, request.height, request.format)?;

        let memory = memory::allocate(
            device,
            &AllocationRequest {
                len: layout.len,
                heap_id_mask: heap.mask,
                flags: 0,
            },
        )?;
        let mapping = if request.map_cpu {
            let mapping = CpuMapping::new(&memory)?;
            debug!("buffer address {:p}", mapping.as_ptr());
            Some(mapping)
        } else {
            None
        };

        // Until `buffer` exists, `mapping` and `memory` are plain locals and drop
        // in reverse declaration order: unmap, then close.
        let image = gpu.create_image(&DmabufPlane {
            fd: memory.as_fd(),
            width: layout.width,
            height: layout.height,
            fourcc: request.format.fourcc(),
            offset: 0,
            stride: layout.stride,
        })?;

        let mut buffer = Self {
            gpu,
            layout,
            format: request.format,
            heap,
            framebuffer: None,
            texture: None,
            image: Some(image),
            mapping,
            memory: Some(memory),
        };

        let texture = buffer.gpu.create_texture(image)?;
        buffer.texture = Some(texture);
        let framebuffer = buffer.gpu.create_framebuffer(texture)?;
        buffer.framebuffer = Some(framebuffer);
        buffer.gpu.check_framebuffer(framebuffer)?;

        info!(
            width = layout.width,
            height = layout.height,
            stride = layout.stride,
            len = layout.len,
            format = %buffer.format,
            heap_mask = buffer.heap.mask,
            "Created dma-buf buffer"
        );
        Ok(buffer)
    }

    pub fn layout(&self) -> BufferLayout {
        self.layout
    }

    pub fn width(&self) -> u32 {
        self.layout.width
    }

    pub fn height(&self) -> u32 {
        self.layout.height
    }

    pub fn stride(&self) -> u32 {
        self.layout.stride
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn heap(&self) -> &HeapSelection {
        &self.heap
    }

    /// The dma-buf handle, `None` once released.
    pub fn fd(&self) -> Option<BorrowedFd<'_>> {
        self.memory.as_ref().map(AsFd::as_fd)
    }

    pub fn framebuffer(&self) -> Option<G::Framebuffer> {
        self.framebuffer
    }

    /// Start of the CPU mapping, if the buffer was mapped.
    pub fn mapped_address(&self) -> Option<*const u8> {
        self.mapping.as_ref().map(CpuMapping::as_ptr)
    }

    /// Releases every sub-resource still held, in reverse creation order.
    ///
    /// Returns what was actually released. A second call returns an empty list.
    pub fn release_resources(&mut self) -> Vec<ReleasedResource> {
        let mut released = Vec::with_capacity(5);

        if let Some(framebuffer) = self.framebuffer.take() {
            self.gpu.destroy_framebuffer(framebuffer);
            released.push(ReleasedResource::Framebuffer);
        }
        if let Some(texture) = self.texture.take() {
            self.gpu.destroy_texture(texture);
            released.push(ReleasedResource::Texture);
        }
        if let Some(image) = self.image.take() {
            self.gpu.destroy_image(image);
            released.push(ReleasedResource::Image);
        }
        if let Some(mapping) = self.mapping.take() {
            drop(mapping);
            released.push(ReleasedResource::Mapping);
        }
        if let Some(memory) = self.memory.take() {
            drop(memory);
            released.push(ReleasedResource::Handle);
        }

        if !released.is_empty() {
            debug!(?released, "Released dma-buf resources");
        }
        released
    }
}

impl<G: GpuImporter> FrameTarget for DmaBuffer<G> {
    fn fill(&mut self, rgba: [f32; 4]) -> Result<(), ImportError> {
        let framebuffer = self
            .framebuffer
            .ok_or_else(|| ImportError::Render("buffer has no framebuffer".to_string()))?;
        self.gpu.fill(framebuffer, rgba)
    }
}

impl<G: GpuImporter> fmt::Debug for DmaBuffer<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DmaBuffer")
            .field("layout", &self.layout)
            .field("format", &self.format)
            .field("heap_mask", &self.heap.mask)
            .field("framebuffer", &self.framebuffer)
            .field("texture", &self.texture)
            .field("image", &self.image)
            .field("mapped_address", &self.mapped_address())
            .field("memory", &self.memory)
            .finish()
    }
}

impl<G: GpuImporter> Drop for DmaBuffer<G> {
    fn drop(&mut self) {
        self.release_resources();
    }
}
