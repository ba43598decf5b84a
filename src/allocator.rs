use anyhow::{Result, anyhow};
use std::collections::HashMap;

use crate::stat::Device;

/// Source of the runtime's "currently allocated bytes" counter for a device.
pub trait AllocatorQuery {
    fn memory_allocated(&self, device: &Device) -> Result<u64>;
}

/// Allocator counters recorded alongside a stats snapshot.
#[derive(Debug, Clone, Default)]
pub struct SnapshotAllocator {
    allocated: HashMap<Device, u64>,
}

impl SnapshotAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, device: Device, bytes: u64) {
        self.allocated.insert(device, bytes);
    }

    pub fn extend(&mut self, other: SnapshotAllocator) {
        self.allocated.extend(other.allocated);
    }
}

impl AllocatorQuery for SnapshotAllocator {
    fn memory_allocated(&self, device: &Device) -> Result<u64> {
        self.allocated
            .get(device)
            .copied()
            .ok_or_else(|| anyhow!("No allocator counter recorded for device {device}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_allocator_lookup() {
        let mut alloc = SnapshotAllocator::new();
        alloc.record(Device::Cuda(0), 4096);
        assert_eq!(alloc.memory_allocated(&Device::Cuda(0)).unwrap(), 4096);

        let err = alloc.memory_allocated(&Device::Cuda(1)).unwrap_err();
        assert!(err.to_string().contains("cuda:1"));
    }

    #[test]
    fn test_snapshot_allocator_extend_overrides() {
        let mut first = SnapshotAllocator::new();
        first.record(Device::Cuda(0), 1);
        let mut second = SnapshotAllocator::new();
        second.record(Device::Cuda(0), 2);
        first.extend(second);
        assert_eq!(first.memory_allocated(&Device::Cuda(0)).unwrap(), 2);
    }
}
