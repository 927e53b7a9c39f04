//! Drives a full pool of dma-buf buffers through simulated frames.

use std::cell::RefCell;
use std::os::fd::IntoRawFd;
use std::rc::Rc;

use novade_dmabuf_ion::error::{FrameError, ImportError, IonError, PoolError};
use novade_dmabuf_ion::gpu::{DmabufPlane, GpuImporter};
use novade_dmabuf_ion::ion::{AllocationRequest, HeapDescriptor, HeapDevice, HeapType, RawAllocation};
use novade_dmabuf_ion::{
    render_next_frame, BufferRequest, DmaBuffer, PixelFormat, PresentationRing, Ramp, SlotState, POOL_SIZE,
};
use pretty_assertions::assert_eq;

struct TempFileHeaps {
    allocations: RefCell<u32>,
}

impl HeapDevice for TempFileHeaps {
    fn query_heaps(&self) -> Result<Vec<HeapDescriptor>, IonError> {
        Ok(vec![
            HeapDescriptor {
                name: "ion_system_heap".to_string(),
                heap_type: HeapType::System,
                id: 25,
            },
            HeapDescriptor {
                name: "ion_carveout_heap".to_string(),
                heap_type: HeapType::Carveout,
                id: 2,
            },
        ])
    }

    fn allocate(&self, request: &AllocationRequest) -> Result<RawAllocation, IonError> {
        *self.allocations.borrow_mut() += 1;
        let file = tempfile::tempfile().map_err(IonError::Map)?;
        file.set_len(request.len).map_err(IonError::Map)?;
        Ok(RawAllocation {
            len: request.len,
            fd: file.into_raw_fd() as u32,
        })
    }
}

#[derive(Default)]
struct RecordingGpu {
    next: RefCell<u32>,
    fills: RefCell<Vec<(u32, [f32; 4])>>,
    destroyed: RefCell<Vec<&'static str>>,
}

impl RecordingGpu {
    fn handle(&self) -> u32 {
        let mut next = self.next.borrow_mut();
        *next += 1;
        *next
    }
}

impl GpuImporter for RecordingGpu {
    type Image = u32;
    type Texture = u32;
    type Framebuffer = u32;

    fn create_image(&self, _plane: &DmabufPlane<'_>) -> Result<u32, ImportError> {
        Ok(self.handle())
    }

    fn create_texture(&self, _image: u32) -> Result<u32, ImportError> {
        Ok(self.handle())
    }

    fn create_framebuffer(&self, _texture: u32) -> Result<u32, ImportError> {
        Ok(self.handle())
    }

    fn check_framebuffer(&self, _framebuffer: u32) -> Result<(), ImportError> {
        Ok(())
    }

    fn fill(&self, framebuffer: u32, rgba: [f32; 4]) -> Result<(), ImportError> {
        self.fills.borrow_mut().push((framebuffer, rgba));
        Ok(())
    }

    fn destroy_framebuffer(&self, _framebuffer: u32) {
        self.destroyed.borrow_mut().push("framebuffer");
    }

    fn destroy_texture(&self, _texture: u32) {
        self.destroyed.borrow_mut().push("texture");
    }

    fn destroy_image(&self, _image: u32) {
        self.destroyed.borrow_mut().push("image");
    }
}

fn request() -> BufferRequest {
    BufferRequest {
        width: 256,
        height: 256,
        format: PixelFormat::Argb8888,
        heap: HeapType::System,
        map_cpu: true,
    }
}

fn pool(gpu: &Rc<RecordingGpu>) -> (TempFileHeaps, PresentationRing<DmaBuffer<RecordingGpu>>) {
    let device = TempFileHeaps {
        allocations: RefCell::new(0),
    };
    let ring = PresentationRing::try_new(|_| DmaBuffer::create(&device, Rc::clone(gpu), &request()))
        .expect("pool construction");
    (device, ring)
}

#[test]
fn five_frames_with_immediate_release_never_exhaust_the_pool() {
    let gpu = Rc::new(RecordingGpu::default());
    let (device, mut ring) = pool(&gpu);
    assert_eq!(*device.allocations.borrow(), POOL_SIZE as u32);
    assert_eq!(ring.free_count(), POOL_SIZE);
    for buffer in ring.iter() {
        assert_eq!(buffer.stride(), 1024);
        assert_eq!(buffer.heap().mask, 1 << 25);
    }

    let mut ramp = Ramp::default();
    for frame in 0..5 {
        let slot = render_next_frame(&mut ring, &mut ramp, frame == 0).expect("free slot");
        assert_eq!(slot, 0, "an immediately released slot is reused first");
        assert_eq!(ring.state(slot), Some(SlotState::Posted));
        assert_eq!(ring.posted_count(), 1);

        assert!(ring.release(slot));
        assert_eq!(ring.state(slot), Some(SlotState::Free));
        assert_eq!(ring.free_count(), POOL_SIZE);
    }

    assert_eq!(ramp.step(), 5);
    let fills = gpu.fills.borrow();
    assert_eq!(fills.len(), 5);
    let framebuffer = ring.buffer(0).and_then(|b| b.framebuffer());
    assert!(fills.iter().all(|(fb, _)| Some(*fb) == framebuffer));
    assert_eq!(fills[4].1, [0.0, 5.0 / 180.0, 1.0 - 5.0 / 180.0, 1.0]);
}

#[test]
fn unreleased_pool_fails_on_the_fourth_frame() {
    let gpu = Rc::new(RecordingGpu::default());
    let (_device, mut ring) = pool(&gpu);
    let mut ramp = Ramp::default();

    let slots: Vec<usize> = (0..POOL_SIZE)
        .map(|i| render_next_frame(&mut ring, &mut ramp, i == 0).unwrap())
        .collect();
    assert_eq!(slots, vec![0, 1, 2]);
    assert_eq!(ring.posted_count(), POOL_SIZE);

    let err = render_next_frame(&mut ring, &mut ramp, false).unwrap_err();
    assert!(matches!(err, FrameError::Pool(PoolError::Exhausted { first_frame: false })));
    assert_eq!(err.to_string(), "All buffers busy at redraw(). Server bug?");

    // A late release makes the released slot available again.
    assert!(ring.release(1));
    assert_eq!(render_next_frame(&mut ring, &mut ramp, false).unwrap(), 1);
}

#[test]
fn dropping_the_pool_releases_every_gpu_object_in_reverse_order() {
    let gpu = Rc::new(RecordingGpu::default());
    let (_device, ring) = pool(&gpu);
    drop(ring);

    let destroyed = gpu.destroyed.borrow();
    assert_eq!(destroyed.len(), 3 * POOL_SIZE);
    for chunk in destroyed.chunks(3) {
        assert_eq!(chunk, ["framebuffer", "texture", "image"]);
    }
}
