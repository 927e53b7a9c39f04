//! Heap classes and heap selection.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use tracing::info;

use super::abi::{IonHeapData, ION_NUM_HEAP_IDS};
use super::device::HeapDevice;
use crate::error::IonError;

/// ION heap type as reported in `ion_heap_data.type`.
///
/// Numbering follows the vendor kernel the client targets, which inserts
/// `CarveoutCam` between `Carveout` and `Chunk`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub enum HeapType {
    System,
    SystemContig,
    Carveout,
    CarveoutCam,
    Chunk,
    Dma,
    Custom,
    /// A type code this client does not know by name.
    Other(u32),
}

impl HeapType {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            0 => HeapType::System,
            1 => HeapType::SystemContig,
            2 => HeapType::Carveout,
            3 => HeapType::CarveoutCam,
            4 => HeapType::Chunk,
            5 => HeapType::Dma,
            6 => HeapType::Custom,
            other => HeapType::Other(other),
        }
    }

    pub fn as_raw(self) -> u32 {
        match self {
            HeapType::System => 0,
            HeapType::SystemContig => 1,
            HeapType::Carveout => 2,
            HeapType::CarveoutCam => 3,
            HeapType::Chunk => 4,
            HeapType::Dma => 5,
            HeapType::Custom => 6,
            HeapType::Other(raw) => raw,
        }
    }

    /// Interprets the numeric heap argument given on the command line.
    ///
    /// `1` selects carve-out memory. Everything else, including text that is not
    /// a number, selects system memory. Only the leading integer is considered,
    /// so `"1x"` still selects carve-out.
    pub fn from_cli_code(arg: &str) -> Self {
        match leading_integer(arg) {
            Some(1) => HeapType::Carveout,
            _ => HeapType::System,
        }
    }
}

impl Default for HeapType {
    fn default() -> Self {
        HeapType::System
    }
}

impl fmt::Display for HeapType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeapType::System => f.write_str("system"),
            HeapType::SystemContig => f.write_str("system-contig"),
            HeapType::Carveout => f.write_str("carveout"),
            HeapType::CarveoutCam => f.write_str("carveout-cam"),
            HeapType::Chunk => f.write_str("chunk"),
            HeapType::Dma => f.write_str("dma"),
            HeapType::Custom => f.write_str("custom"),
            HeapType::Other(raw) => write!(f, "type-{}", raw),
        }
    }
}

impl FromStr for HeapType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "system" => Ok(HeapType::System),
            "system-contig" | "system_contig" => Ok(HeapType::SystemContig),
            "carveout" => Ok(HeapType::Carveout),
            "carveout-cam" | "carveout_cam" => Ok(HeapType::CarveoutCam),
            "chunk" => Ok(HeapType::Chunk),
            "dma" => Ok(HeapType::Dma),
            "custom" => Ok(HeapType::Custom),
            other => Err(format!("unknown heap type '{}'", other)),
        }
    }
}

impl TryFrom<String> for HeapType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// `atoi`-style parse: optional sign followed by digits, trailing text ignored.
fn leading_integer(arg: &str) -> Option<i64> {
    let trimmed = arg.trim_start();
    let (sign, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    let end = digits.find(|c: char| !c.is_ascii_digit()).unwrap_or(digits.len());
    digits[..end].parse::<i64>().ok().map(|v| sign * v)
}

/// One entry of the kernel's heap list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeapDescriptor {
    pub name: String,
    pub heap_type: HeapType,
    pub id: u32,
}

impl From<&IonHeapData> for HeapDescriptor {
    fn from(data: &IonHeapData) -> Self {
        Self {
            name: data.name_lossy(),
            heap_type: HeapType::from_raw(data.heap_type),
            id: data.heap_id,
        }
    }
}

/// The heap chosen for an allocation and the mask that addresses it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeapSelection {
    pub descriptor: HeapDescriptor,
    pub mask: u32,
}

impl HeapSelection {
    pub fn id(&self) -> u32 {
        self.descriptor.id
    }
}

/// Finds the first heap of type `wanted` and returns it with its heap mask (`1 << id`).
///
/// Performs no allocation. Fails if the heap query fails, if no heap of that
/// type is listed, or if the heap id does not fit in a 32-bit mask.
pub fn select_heap<D: HeapDevice + ?Sized>(
    device: &D,
    wanted: HeapType,
) -> Result<HeapSelection, IonError> {
    let heaps = device.query_heaps()?;
    let descriptor = heaps
        .into_iter()
        .find(|heap| heap.heap_type == wanted)
        .ok_or(IonError::HeapNotFound(wanted))?;

    if descriptor.id >= ION_NUM_HEAP_IDS {
        return Err(IonError::HeapIdOutOfRange(descriptor.id));
    }
    let mask = 1u32 << descriptor.id;

    info!(
        heap_type = %descriptor.heap_type,
        heap_id = descriptor.id,
        heap_name = %descriptor.name,
        "Selected ION heap"
    );
    Ok(HeapSelection { descriptor, mask })
}
