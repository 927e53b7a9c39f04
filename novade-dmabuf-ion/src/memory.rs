//! Kernel memory owned by a buffer: the dma-buf handle and its optional CPU mapping.

use std::os::fd::{AsFd, BorrowedFd, FromRawFd, OwnedFd};

use memmap2::{MmapMut, MmapOptions};
use tracing::{debug, error};

use crate::error::IonError;
use crate::ion::{AllocationRequest, HeapDevice, RawAllocation};

/// A dma-buf handed out by the allocator. Closing happens on drop.
#[derive(Debug)]
pub struct MemoryAllocation {
    fd: OwnedFd,
    len: u64,
    heap_mask: u32,
    flags: u32,
}

impl MemoryAllocation {
    /// Takes ownership of a raw allocation after checking its handle is usable.
    ///
    /// An fd of 0 is the allocator's placeholder for "no buffer" and is never
    /// adopted, so it is not closed either. The same goes for values outside
    /// the `RawFd` range.
    pub fn adopt(raw: RawAllocation, request: &AllocationRequest) -> Result<Self, IonError> {
        if raw.fd == 0 || raw.fd > i32::MAX as u32 {
            error!("error: get dmabuf_fd failed");
            return Err(IonError::InvalidHandle(raw.fd));
        }
        // SAFETY: the allocator just created this descriptor for us and nothing else
        // owns it.
        let fd = unsafe { OwnedFd::from_raw_fd(raw.fd as i32) };
        if raw.len < request.len {
            // `fd` is dropped and closed here.
            return Err(IonError::ShortAllocation {
                requested: request.len,
                actual: raw.len,
            });
        }
        Ok(Self {
            fd,
            len: raw.len,
            heap_mask: request.heap_id_mask,
            flags: request.flags,
        })
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn heap_mask(&self) -> u32 {
        self.heap_mask
    }

    pub fn flags(&self) -> u32 {
        self.flags
    }
}

impl AsFd for MemoryAllocation {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

/// Requests `request.len` bytes from `device` and adopts the returned handle.
pub fn allocate<D: HeapDevice + ?Sized>(
    device: &D,
    request: &AllocationRequest,
) -> Result<MemoryAllocation, IonError> {
    let raw = device.allocate(request)?;
    let allocation = MemoryAllocation::adopt(raw, request)?;
    debug!(
        len = allocation.len(),
        heap_mask = allocation.heap_mask(),
        flags = allocation.flags(),
        "Allocated dma-buf"
    );
    Ok(allocation)
}

/// A shared read-write mapping of a dma-buf. Unmapped on drop.
#[derive(Debug)]
pub struct CpuMapping {
    map: MmapMut,
}

impl CpuMapping {
    pub fn new(allocation: &MemoryAllocation) -> Result<Self, IonError> {
        let len = usize::try_from(allocation.len()).map_err(|_| {
            IonError::Map(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "allocation larger than the address space",
            ))
        })?;
        // SAFETY: the mapping is shared with the GPU and the compositor; the CPU side
        // only touches it while the owning buffer is not posted.
        let map = unsafe { MmapOptions::new().len(len).map_mut(&allocation.fd) }.map_err(|e| {
            error!("error: mmap failed");
            IonError::Map(e)
        })?;
        Ok(Self { map })
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.map.as_ptr()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
