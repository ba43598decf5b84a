pub mod allocator;
pub mod report;
pub mod source;
pub mod stat;
pub mod utils;

pub use allocator::{AllocatorQuery, SnapshotAllocator};
pub use report::{ReportOptions, make_report};
pub use stat::{Device, DeviceStatTable, TensorStat};
