//! ION kernel allocator: uapi, device access and heap selection.

pub mod abi;
pub mod device;
pub mod heap;

pub use device::{AllocationRequest, HeapDevice, IonDevice, RawAllocation, ION_DEVICE};
pub use heap::{select_heap, HeapDescriptor, HeapSelection, HeapType};
