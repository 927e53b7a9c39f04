//! The ION allocator device and the trait the rest of the crate allocates through.

use std::fs::{File, OpenOptions};
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};

use tracing::{debug, error};

use super::abi::{self, IonAllocationData, IonHeapData, IonHeapQuery};
use super::heap::HeapDescriptor;
use crate::error::IonError;

/// Default allocator device node.
pub const ION_DEVICE: &str = "/dev/ion";

/// Input of an allocation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocationRequest {
    pub len: u64,
    pub heap_id_mask: u32,
    pub flags: u32,
}

/// Output of an allocation call.
///
/// `fd` is the raw dma-buf descriptor exactly as the kernel wrote it. It has not
/// been validated yet; ownership passes to whoever adopts it
/// (see [`crate::memory::MemoryAllocation::adopt`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawAllocation {
    pub len: u64,
    pub fd: u32,
}

/// The kernel allocator surface: heap enumeration and allocation.
pub trait HeapDevice {
    /// Lists every heap the kernel reports, in kernel order.
    fn query_heaps(&self) -> Result<Vec<HeapDescriptor>, IonError>;

    /// Allocates `request.len` bytes from the heaps in `request.heap_id_mask`.
    fn allocate(&self, request: &AllocationRequest) -> Result<RawAllocation, IonError>;
}

/// An open `/dev/ion` node.
#[derive(Debug)]
pub struct IonDevice {
    file: File,
    path: PathBuf,
}

impl IonDevice {
    /// Opens the allocator device read-write.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, IonError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|source| {
                error!("Failed to open ion device node {}", path.display());
                IonError::OpenDevice {
                    path: path.clone(),
                    source,
                }
            })?;
        debug!("Opened ion device {}", path.display());
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn heap_count(&self) -> Result<u32, IonError> {
        let mut query = IonHeapQuery::default();
        // SAFETY: `query` is a valid, exclusively borrowed ion_heap_query; heaps == 0
        // asks the kernel only for the count.
        unsafe { abi::ion_ioc_heap_query(self.file.as_raw_fd(), &mut query) }
            .map_err(|errno| {
                error!("error: ION_IOC_HEAP_QUERY failed");
                IonError::HeapQuery(errno)
            })?;
        Ok(query.cnt)
    }
}

impl HeapDevice for IonDevice {
    fn query_heaps(&self) -> Result<Vec<HeapDescriptor>, IonError> {
        let count = self.heap_count()?;
        if count == 0 {
            return Ok(Vec::new());
        }

        let mut heaps = vec![IonHeapData::default(); count as usize];
        let mut query = IonHeapQuery {
            cnt: count,
            heaps: heaps.as_mut_ptr() as u64,
            ..IonHeapQuery::default()
        };
        // SAFETY: `heaps` holds `count` entries and outlives the call; the kernel
        // writes at most `cnt` entries.
        unsafe { abi::ion_ioc_heap_query(self.file.as_raw_fd(), &mut query) }
            .map_err(|errno| {
                error!("error: ION_IOC_HEAP_QUERY failed");
                IonError::HeapQuery(errno)
            })?;

        let reported = (query.cnt as usize).min(heaps.len());
        Ok(heaps[..reported].iter().map(HeapDescriptor::from).collect())
    }

    fn allocate(&self, request: &AllocationRequest) -> Result<RawAllocation, IonError> {
        let mut data = IonAllocationData {
            len: request.len,
            heap_id_mask: request.heap_id_mask,
            flags: request.flags,
            ..IonAllocationData::default()
        };
        // SAFETY: `data` is a valid, exclusively borrowed ion_allocation_data.
        unsafe { abi::ion_ioc_alloc(self.file.as_raw_fd(), &mut data) }.map_err(|source| {
            error!("error: ION_IOC_ALLOC failed");
            IonError::Allocation {
                len: request.len,
                heap_mask: request.heap_id_mask,
                source,
            }
        })?;
        Ok(RawAllocation {
            len: data.len,
            fd: data.fd,
        })
    }
}
