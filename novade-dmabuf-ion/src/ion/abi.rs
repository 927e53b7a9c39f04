//! Fixed-layout request/response structures of the ION uapi (kernel v4.14+).
//!
//! Layouts follow `drivers/staging/android/uapi/ion.h` exactly, reserved fields
//! included. The size assertions at the bottom of the file guard the ABI.

use std::mem::size_of;

/// Maximum heap name length, including the trailing NUL.
pub const MAX_HEAP_NAME: usize = 32;

/// Number of heap ids representable in `heap_id_mask`.
pub const ION_NUM_HEAP_IDS: u32 = u32::BITS;

const ION_IOC_MAGIC: u8 = b'I';

/// `struct ion_allocation_data`
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IonAllocationData {
    pub len: u64,
    pub heap_id_mask: u32,
    pub flags: u32,
    pub fd: u32,
    pub unused: u32,
}

/// `struct ion_heap_data`
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IonHeapData {
    pub name: [u8; MAX_HEAP_NAME],
    pub heap_type: u32,
    pub heap_id: u32,
    pub reserved0: u32,
    pub reserved1: u32,
    pub reserved2: u32,
}

impl Default for IonHeapData {
    fn default() -> Self {
        Self {
            name: [0; MAX_HEAP_NAME],
            heap_type: 0,
            heap_id: 0,
            reserved0: 0,
            reserved1: 0,
            reserved2: 0,
        }
    }
}

impl IonHeapData {
    /// Heap name up to the first NUL byte.
    pub fn name_lossy(&self) -> String {
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(MAX_HEAP_NAME);
        String::from_utf8_lossy(&self.name[..end]).into_owned()
    }
}

/// `struct ion_heap_query`
///
/// With `heaps == 0` the kernel only reports the heap count in `cnt`.
/// Otherwise it copies up to `cnt` entries to the user pointer in `heaps`
/// and writes back the number copied.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IonHeapQuery {
    pub cnt: u32,
    pub reserved0: u32,
    pub heaps: u64,
    pub reserved1: u32,
    pub reserved2: u32,
}

nix::ioctl_readwrite!(ion_ioc_alloc, ION_IOC_MAGIC, 0, IonAllocationData);
nix::ioctl_readwrite!(ion_ioc_heap_query, ION_IOC_MAGIC, 8, IonHeapQuery);

const _: () = assert!(size_of::<IonAllocationData>() == 24);
const _: () = assert!(size_of::<IonHeapData>() == 52);
const _: () = assert!(size_of::<IonHeapQuery>() == 24);

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::align_of;
    use std::ptr::addr_of;

    #[test]
    fn test_structs_are_eight_byte_aligned_where_the_kernel_expects() {
        assert_eq!(align_of::<IonAllocationData>(), 8);
        assert_eq!(align_of::<IonHeapQuery>(), 8);
        assert_eq!(align_of::<IonHeapData>(), 4);
    }

    #[test]
    fn test_heap_data_field_offsets() {
        let data = IonHeapData::default();
        let base = addr_of!(data) as usize;
        assert_eq!(addr_of!(data.heap_type) as usize - base, 32);
        assert_eq!(addr_of!(data.heap_id) as usize - base, 36);
        assert_eq!(addr_of!(data.reserved2) as usize - base, 48);
        assert_eq!(size_of::<IonHeapData>(), 52);
    }

    #[test]
    fn test_heap_name_stops_at_nul() {
        let mut data = IonHeapData::default();
        data.name[..11].copy_from_slice(b"ion_system\0");
        assert_eq!(data.name_lossy(), "ion_system");
    }

    #[test]
    fn test_heap_name_without_nul_uses_full_buffer() {
        let data = IonHeapData {
            name: [b'x'; MAX_HEAP_NAME],
            ..IonHeapData::default()
        };
        assert_eq!(data.name_lossy().len(), MAX_HEAP_NAME);
    }
}
