use anyhow::{Result, anyhow};
use std::fmt;
use std::str::FromStr;

/// Compute device a tensor's storage lives on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Device {
    Cpu,
    Cuda(usize),
    /// Any other runtime device (`mps`, `xpu:1`, ...), kept as its lowercase name.
    Other(String),
}

impl Device {
    pub fn is_cpu(&self) -> bool {
        matches!(self, Device::Cpu)
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Cuda(index) => write!(f, "cuda:{index}"),
            Device::Other(name) => write!(f, "{name}"),
        }
    }
}

impl FromStr for Device {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_ascii_lowercase();
        match lower.split_once(':') {
            None if lower == "cpu" => Ok(Device::Cpu),
            None if lower == "cuda" => Ok(Device::Cuda(0)),
            Some(("cuda", index)) => index
                .parse::<usize>()
                .map(Device::Cuda)
                .map_err(|_| anyhow!("Invalid cuda device index in '{s}'")),
            Some(("cpu", _)) => Err(anyhow!("The cpu device takes no index: '{s}'")),
            _ if is_device_name(&lower) => Ok(Device::Other(lower.clone())),
            _ => Err(anyhow!("Invalid device: '{s}' (expected cpu, cuda:N or <type>[:N])")),
        }
    }
}

/// `<type>` or `<type>:<index>` with an alphanumeric type.
fn is_device_name(name: &str) -> bool {
    let (kind, index) = match name.split_once(':') {
        Some((kind, index)) => (kind, Some(index)),
        None => (name, None),
    };
    let kind_ok = !kind.is_empty()
        && kind.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    let index_ok = index.is_none_or(|i| !i.is_empty() && i.chars().all(|c| c.is_ascii_digit()));
    kind_ok && index_ok
}

/// Memory statistics of a single tensor.
#[derive(Debug, Clone, PartialEq)]
pub struct TensorStat {
    pub name: String,
    /// Pre-formatted shape, e.g. `(32, 128)`.
    pub size: String,
    pub numel: u64,
    /// May be fractional or NaN.
    pub mem_bytes: f64,
}

impl TensorStat {
    pub fn new(name: impl Into<String>, size: impl Into<String>, numel: u64, mem_bytes: f64) -> Self {
        Self {
            name: name.into(),
            size: size.into(),
            numel,
            mem_bytes,
        }
    }

    /// Name with any parenthesised suffix (`weight(reused)`) removed.
    pub fn base_name(&self) -> &str {
        self.name.split('(').next().unwrap_or(&self.name)
    }
}

/// Tensor stats grouped by device, kept in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceStatTable {
    entries: Vec<(Device, Vec<TensorStat>)>,
}

impl DeviceStatTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records for `device`, registering the device if it is new.
    pub fn device_mut(&mut self, device: Device) -> &mut Vec<TensorStat> {
        let idx = match self.entries.iter().position(|(d, _)| *d == device) {
            Some(idx) => idx,
            None => {
                self.entries.push((device, Vec::new()));
                self.entries.len() - 1
            }
        };
        &mut self.entries[idx].1
    }

    pub fn push(&mut self, device: Device, stat: TensorStat) {
        self.device_mut(device).push(stat);
    }

    pub fn extend(&mut self, other: DeviceStatTable) {
        for (device, stats) in other.entries {
            self.device_mut(device).extend(stats);
        }
    }

    pub fn get(&self, device: &Device) -> Option<&[TensorStat]> {
        self.entries
            .iter()
            .find(|(d, _)| d == device)
            .map(|(_, stats)| stats.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Device, &[TensorStat])> {
        self.entries
            .iter()
            .map(|(device, stats)| (device, stats.as_slice()))
    }

    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        self.entries.iter().map(|(device, _)| device)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_display_and_parse() {
        assert_eq!(Device::Cpu.to_string(), "cpu");
        assert_eq!(Device::Cuda(1).to_string(), "cuda:1");
        assert_eq!("cpu".parse::<Device>().unwrap(), Device::Cpu);
        assert_eq!("CUDA".parse::<Device>().unwrap(), Device::Cuda(0));
        assert_eq!("cuda:3".parse::<Device>().unwrap(), Device::Cuda(3));
    }

    #[test]
    fn test_device_parse_rejects_malformed() {
        assert!("".parse::<Device>().is_err());
        assert!("cuda:x".parse::<Device>().is_err());
        assert!("cpu:0".parse::<Device>().is_err());
        assert!("xpu:".parse::<Device>().is_err());
        assert!("my gpu".parse::<Device>().is_err());
    }

    #[test]
    fn test_device_parse_other_runtimes() {
        assert_eq!("MPS".parse::<Device>().unwrap(), Device::Other("mps".to_string()));
        let xpu = "xpu:1".parse::<Device>().unwrap();
        assert_eq!(xpu, Device::Other("xpu:1".to_string()));
        assert_eq!(xpu.to_string(), "xpu:1");
        assert!(!xpu.is_cpu());
    }

    #[test]
    fn test_base_name_strips_suffix() {
        let stat = TensorStat::new("Tensor(reused)", "(1)", 1, 4.0);
        assert_eq!(stat.base_name(), "Tensor");
        let plain = TensorStat::new("bias", "(1)", 1, 4.0);
        assert_eq!(plain.base_name(), "bias");
    }

    #[test]
    fn test_table_preserves_insertion_order() {
        let mut table = DeviceStatTable::new();
        table.push(Device::Cuda(1), TensorStat::new("a", "(1)", 1, 4.0));
        table.push(Device::Cpu, TensorStat::new("b", "(1)", 1, 4.0));
        table.push(Device::Cuda(1), TensorStat::new("c", "(1)", 1, 4.0));

        let devices: Vec<_> = table.devices().cloned().collect();
        assert_eq!(devices, vec![Device::Cuda(1), Device::Cpu]);

        let names: Vec<_> = table
            .get(&Device::Cuda(1))
            .unwrap()
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(names, vec!["a", "c"]);
    }

    #[test]
    fn test_table_allows_empty_device() {
        let mut table = DeviceStatTable::new();
        table.device_mut(Device::Cuda(0));
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(&Device::Cuda(0)).unwrap().len(), 0);
    }
}
