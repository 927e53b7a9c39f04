//! In-process stand-ins for the kernel allocator and the GPU, used by unit tests.

use std::cell::{Cell, RefCell};
use std::os::fd::IntoRawFd;

use nix::errno::Errno;

use crate::error::{ImportError, IonError};
use crate::gpu::{DmabufPlane, GpuImporter};
use crate::ion::{AllocationRequest, HeapDescriptor, HeapDevice, RawAllocation};

/// A fresh descriptor for an anonymous temp file of `len` bytes.
///
/// Stands in for a dma-buf: it can be mapped and it is closed by whoever adopts it.
pub fn backing_fd(len: u64) -> u32 {
    let file = tempfile::tempfile().expect("temp file");
    file.set_len(len).expect("set_len");
    file.into_raw_fd() as u32
}

/// What [`StubHeapDevice::allocate`] should answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationBehavior {
    /// A real temp-file descriptor of the requested size.
    Succeed,
    /// The ioctl itself fails with the given errno.
    Fail(Errno),
    /// The ioctl "succeeds" but hands back the placeholder fd 0.
    PlaceholderFd,
}

#[derive(Debug)]
pub struct StubHeapDevice {
    heaps: Option<Vec<HeapDescriptor>>,
    behavior: Cell<AllocationBehavior>,
    requests: RefCell<Vec<AllocationRequest>>,
}

impl StubHeapDevice {
    pub fn with_heaps(heaps: Vec<HeapDescriptor>) -> Self {
        Self {
            heaps: Some(heaps),
            behavior: Cell::new(AllocationBehavior::Succeed),
            requests: RefCell::new(Vec::new()),
        }
    }

    pub fn failing_query() -> Self {
        Self {
            heaps: None,
            behavior: Cell::new(AllocationBehavior::Succeed),
            requests: RefCell::new(Vec::new()),
        }
    }

    pub fn set_behavior(&self, behavior: AllocationBehavior) {
        self.behavior.set(behavior);
    }

    pub fn allocation_requests(&self) -> Vec<AllocationRequest> {
        self.requests.borrow().clone()
    }
}

impl HeapDevice for StubHeapDevice {
    fn query_heaps(&self) -> Result<Vec<HeapDescriptor>, IonError> {
        self.heaps.clone().ok_or(IonError::HeapQuery(Errno::ENOTTY))
    }

    fn allocate(&self, request: &AllocationRequest) -> Result<RawAllocation, IonError> {
        self.requests.borrow_mut().push(*request);
        match self.behavior.get() {
            AllocationBehavior::Succeed => Ok(RawAllocation {
                len: request.len,
                fd: backing_fd(request.len),
            }),
            AllocationBehavior::Fail(errno) => Err(IonError::Allocation {
                len: request.len,
                heap_mask: request.heap_id_mask,
                source: errno,
            }),
            AllocationBehavior::PlaceholderFd => Ok(RawAllocation {
                len: request.len,
                fd: 0,
            }),
        }
    }
}

/// One call made against [`StubGpu`], with the handle it concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpuCall {
    CreateImage(u32),
    CreateTexture(u32),
    CreateFramebuffer(u32),
    CheckFramebuffer(u32),
    Fill(u32),
    DestroyFramebuffer(u32),
    DestroyTexture(u32),
    DestroyImage(u32),
}

/// The step at which [`StubGpu`] is told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpuFailure {
    Image,
    Texture,
    Framebuffer,
    IncompleteFramebuffer,
    Fill,
}

/// Hands out increasing integer handles and records every call.
#[derive(Debug, Default)]
pub struct StubGpu {
    next_handle: Cell<u32>,
    failure: Cell<Option<GpuFailure>>,
    calls: RefCell<Vec<GpuCall>>,
    planes: RefCell<Vec<(u32, u32, u32, u32)>>,
    colors: RefCell<Vec<[f32; 4]>>,
}

impl StubGpu {
    pub fn failing_at(failure: GpuFailure) -> Self {
        let gpu = Self::default();
        gpu.failure.set(Some(failure));
        gpu
    }

    pub fn calls(&self) -> Vec<GpuCall> {
        self.calls.borrow().clone()
    }

    pub fn destroy_calls(&self) -> Vec<GpuCall> {
        self.calls
            .borrow()
            .iter()
            .copied()
            .filter(|call| {
                matches!(
                    call,
                    GpuCall::DestroyFramebuffer(_) | GpuCall::DestroyTexture(_) | GpuCall::DestroyImage(_)
                )
            })
            .collect()
    }

    /// `(width, height, fourcc, stride)` of every imported plane.
    pub fn planes(&self) -> Vec<(u32, u32, u32, u32)> {
        self.planes.borrow().clone()
    }

    pub fn colors(&self) -> Vec<[f32; 4]> {
        self.colors.borrow().clone()
    }

    fn record(&self, call: GpuCall) {
        self.calls.borrow_mut().push(call);
    }

    fn handle(&self) -> u32 {
        let handle = self.next_handle.get() + 1;
        self.next_handle.set(handle);
        handle
    }

    fn fails_at(&self, step: GpuFailure) -> bool {
        self.failure.get() == Some(step)
    }
}

impl GpuImporter for StubGpu {
    type Image = u32;
    type Texture = u32;
    type Framebuffer = u32;

    fn create_image(&self, plane: &DmabufPlane<'_>) -> Result<u32, ImportError> {
        if self.fails_at(GpuFailure::Image) {
            return Err(ImportError::NoImage {
                width: plane.width,
                height: plane.height,
                fourcc: plane.fourcc,
                stride: plane.stride,
            });
        }
        self.planes
            .borrow_mut()
            .push((plane.width, plane.height, plane.fourcc, plane.stride));
        let image = self.handle();
        self.record(GpuCall::CreateImage(image));
        Ok(image)
    }

    fn create_texture(&self, _image: u32) -> Result<u32, ImportError> {
        if self.fails_at(GpuFailure::Texture) {
            return Err(ImportError::TextureCreation("stub".to_string()));
        }
        let texture = self.handle();
        self.record(GpuCall::CreateTexture(texture));
        Ok(texture)
    }

    fn create_framebuffer(&self, _texture: u32) -> Result<u32, ImportError> {
        if self.fails_at(GpuFailure::Framebuffer) {
            return Err(ImportError::FramebufferCreation("stub".to_string()));
        }
        let framebuffer = self.handle();
        self.record(GpuCall::CreateFramebuffer(framebuffer));
        Ok(framebuffer)
    }

    fn check_framebuffer(&self, framebuffer: u32) -> Result<(), ImportError> {
        self.record(GpuCall::CheckFramebuffer(framebuffer));
        if self.fails_at(GpuFailure::IncompleteFramebuffer) {
            // GL_FRAMEBUFFER_INCOMPLETE_ATTACHMENT
            return Err(ImportError::IncompleteFramebuffer(0x8CD6));
        }
        Ok(())
    }

    fn fill(&self, framebuffer: u32, rgba: [f32; 4]) -> Result<(), ImportError> {
        if self.fails_at(GpuFailure::Fill) {
            return Err(ImportError::Render("stub".to_string()));
        }
        self.record(GpuCall::Fill(framebuffer));
        self.colors.borrow_mut().push(rgba);
        Ok(())
    }

    fn destroy_framebuffer(&self, framebuffer: u32) {
        self.record(GpuCall::DestroyFramebuffer(framebuffer));
    }

    fn destroy_texture(&self, texture: u32) {
        self.record(GpuCall::DestroyTexture(texture));
    }

    fn destroy_image(&self, image: u32) {
        self.record(GpuCall::DestroyImage(image));
    }
}
