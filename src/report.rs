use anyhow::{Context, Result};
use log::debug;

use crate::allocator::AllocatorQuery;
use crate::stat::{Device, DeviceStatTable, TensorStat};
use crate::utils::readable_size;

const LINE_WIDTH: usize = 79;

/// Options controlling what `make_report` includes.
#[derive(Debug, Clone, Default)]
pub struct ReportOptions {
    /// Show full tensor names instead of stripping `(...)` suffixes. Default `false`.
    pub verbose: bool,
    /// Only report this device. Default `None` reports every device.
    pub target_device: Option<Device>,
}

fn row(name: &str, size: &str, mem: &str) -> String {
    format!("{name:<40}{size:>20}{mem:>10}")
}

fn separator() -> String {
    "-".repeat(LINE_WIDTH)
}

/// Render the per-device memory usage report for `table`.
///
/// Non-CPU devices are cross-checked against `allocator`; a failed query aborts the report.
pub fn make_report(
    table: &DeviceStatTable,
    options: &ReportOptions,
    allocator: &dyn AllocatorQuery,
) -> Result<String> {
    let mut lines = vec![row("Element type", "Size", "Used MEM")];

    for (device, stats) in table.iter() {
        if let Some(target) = &options.target_device {
            if device != target {
                debug!("Skipping device {device}, report restricted to {target}");
                continue;
            }
        }

        lines.push(separator());
        lines.push(format!("Storage on {device}"));

        // u128 so summed element counts cannot overflow
        let mut total_numel: u128 = 0;
        let mut total_mem: f64 = 0.0;
        for stat in stats {
            lines.push(format_stat(stat, options.verbose));
            total_numel += u128::from(stat.numel);
            total_mem += stat.mem_bytes;
        }

        lines.push(separator());
        lines.push(format!(
            "Total Tensors: {}  Used Memory: {}",
            total_numel,
            readable_size(total_mem)
        ));

        if !device.is_cpu() {
            let allocated = allocator
                .memory_allocated(device)
                .with_context(|| format!("Failed to query allocated memory on {device}"))?;
            lines.push(format!(
                "The allocated memory on {}: {}",
                device,
                readable_size(allocated as f64)
            ));
            if allocated as f64 != total_mem {
                lines.push(
                    "Memory differs due to the matrix alignment or invisible gradient buffer tensors"
                        .to_string(),
                );
            }
        }

        lines.push(separator());
    }

    Ok(lines.join("\n"))
}

fn format_stat(stat: &TensorStat, verbose: bool) -> String {
    let name = if verbose { stat.name.as_str() } else { stat.base_name() };
    row(name, &stat.size, &readable_size(stat.mem_bytes))
}
