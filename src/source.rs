use anyhow::{Context, Result, bail};
use log::{debug, warn};
use safetensors::SafeTensors;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::allocator::SnapshotAllocator;
use crate::stat::{Device, DeviceStatTable, TensorStat};
use crate::utils::{format_shape, natural_sort_key};

const SHARD_INDEX_SUFFIX: &str = ".safetensors.index.json";

#[derive(Debug, Deserialize)]
struct SnapshotFile {
    devices: Vec<SnapshotDevice>,
}

#[derive(Debug, Deserialize)]
struct SnapshotDevice {
    device: String,
    allocated: Option<u64>,
    #[serde(default)]
    tensors: Vec<SnapshotTensor>,
}

#[derive(Debug, Deserialize)]
struct SnapshotTensor {
    name: String,
    size: String,
    numel: u64,
    /// `null` means the size could not be measured.
    mem: Option<f64>,
}

/// Stats and allocator counters gathered from one or more input files.
#[derive(Debug, Default)]
pub struct LoadedInputs {
    pub table: DeviceStatTable,
    pub allocator: SnapshotAllocator,
}

impl LoadedInputs {
    /// Accelerator devices may only come from one snapshot, since the
    /// allocator counter of a snapshot covers only that snapshot's tensors.
    fn merge(&mut self, other: LoadedInputs) -> Result<()> {
        if let Some(device) = other
            .table
            .devices()
            .find(|d| !d.is_cpu() && self.table.get(d).is_some())
        {
            bail!("Device {device} appears in more than one snapshot");
        }
        self.table.extend(other.table);
        self.allocator.extend(other.allocator);
        Ok(())
    }
}

/// Parse a JSON stats snapshot.
pub fn parse_snapshot(content: &str) -> Result<LoadedInputs> {
    let snapshot: SnapshotFile =
        serde_json::from_str(content).context("Failed to parse stats snapshot")?;

    let mut loaded = LoadedInputs::default();
    for entry in snapshot.devices {
        let device: Device = entry.device.parse()?;
        if loaded.table.get(&device).is_some() {
            bail!("Device {device} is listed more than once");
        }
        let stats = loaded.table.device_mut(device.clone());
        for tensor in entry.tensors {
            stats.push(TensorStat {
                name: tensor.name,
                size: tensor.size,
                numel: tensor.numel,
                mem_bytes: tensor.mem.unwrap_or(f64::NAN),
            });
        }
        if let Some(bytes) = entry.allocated {
            loaded.allocator.record(device, bytes);
        }
    }

    Ok(loaded)
}

pub fn load_snapshot(path: &Path) -> Result<LoadedInputs> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read snapshot file: {}", path.display()))?;
    parse_snapshot(&content)
        .with_context(|| format!("Invalid snapshot file: {}", path.display()))
}

/// Read tensor stats out of a SafeTensors file. Everything is reported on the CPU.
pub fn load_safetensors(path: &Path) -> Result<DeviceStatTable> {
    let buffer =
        fs::read(path).with_context(|| format!("Failed to read file: {}", path.display()))?;

    let tensors = SafeTensors::deserialize(&buffer)
        .with_context(|| format!("Failed to parse SafeTensors file: {}", path.display()))?;

    let mut stats: Vec<TensorStat> = tensors
        .tensors()
        .into_iter()
        .map(|(name, tensor)| {
            let shape = tensor.shape();
            TensorStat {
                size: format_shape(shape),
                numel: shape.iter().map(|&d| d as u64).product(),
                mem_bytes: tensor.data().len() as f64,
                name,
            }
        })
        .collect();
    stats.sort_by_key(|s| natural_sort_key(&s.name));

    let mut table = DeviceStatTable::new();
    table.device_mut(Device::Cpu).extend(stats);
    Ok(table)
}

/// Load each file in order and merge the results.
pub fn load_inputs(files: &[PathBuf]) -> Result<LoadedInputs> {
    let mut loaded = LoadedInputs::default();

    for file in files {
        match file.extension().and_then(|s| s.to_str()) {
            Some("safetensors") => {
                let table = load_safetensors(file)?;
                debug!("Loaded {} device(s) from {}", table.len(), file.display());
                loaded.table.extend(table);
            }
            Some("json") => {
                let snapshot = load_snapshot(file)?;
                debug!(
                    "Loaded {} device(s) from {}",
                    snapshot.table.len(),
                    file.display()
                );
                loaded
                    .merge(snapshot)
                    .with_context(|| format!("Cannot merge snapshot: {}", file.display()))?;
            }
            _ => warn!("Unsupported file format: {}", file.display()),
        }
    }

    Ok(loaded)
}

fn is_shard_index(path: &Path) -> bool {
    path.file_name()
        .and_then(|s| s.to_str())
        .is_some_and(|name| name.ends_with(SHARD_INDEX_SUFFIX))
}

fn is_json(path: &Path) -> bool {
    path.extension().and_then(|s| s.to_str()) == Some("json")
}

/// Whether a JSON file found by a directory scan holds a stats snapshot
/// (a top-level object with a `devices` key) rather than e.g. `config.json`.
fn is_stats_snapshot(path: &Path) -> bool {
    fs::read_to_string(path)
        .ok()
        .and_then(|content| serde_json::from_str::<serde_json::Value>(&content).ok())
        .is_some_and(|value| value.get("devices").is_some())
}

/// Expand paths, globs and directories into the list of stat inputs.
pub fn collect_input_files(paths: &[PathBuf], recursive: bool) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for path in paths {
        let expanded_paths: Vec<PathBuf> = match glob::glob(&path.to_string_lossy()) {
            Ok(paths) => paths.filter_map(Result::ok).collect(),
            Err(_) => vec![path.clone()], // not a pattern, use as-is
        };
        if expanded_paths.is_empty() {
            warn!("Path does not exist: {}", path.display());
        }

        for expanded_path in expanded_paths {
            if !expanded_path.exists() {
                warn!("Path does not exist: {}", expanded_path.display());
                continue;
            }

            if expanded_path.is_file() {
                if is_shard_index(&expanded_path) {
                    files.extend(resolve_shard_index(&expanded_path)?);
                    continue;
                }
                let ext = expanded_path.extension().and_then(|s| s.to_str());
                if ext == Some("safetensors") || ext == Some("json") {
                    files.push(expanded_path);
                } else {
                    warn!("Skipping unsupported file: {}", expanded_path.display());
                }
            } else if expanded_path.is_dir() {
                files.extend(scan_directory(&expanded_path, recursive)?);
            }
        }
    }

    files.sort();
    files.dedup();
    Ok(files)
}

fn scan_directory(dir: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
    let index_path = dir.join("model.safetensors.index.json");
    if index_path.exists() {
        return resolve_shard_index(&index_path);
    }

    let depth = if recursive { "**/" } else { "" };
    let patterns = [
        format!("{}/{depth}*.safetensors", dir.display()),
        format!("{}/{depth}*.json", dir.display()),
    ];

    let mut files = Vec::new();
    for pattern in patterns {
        for entry in glob::glob(&pattern).context("Failed to read glob pattern")? {
            match entry {
                Ok(file_path) if is_shard_index(&file_path) => {
                    debug!("Ignoring shard index {}", file_path.display());
                }
                Ok(file_path) if is_json(&file_path) && !is_stats_snapshot(&file_path) => {
                    warn!("Skipping non-snapshot JSON file: {}", file_path.display());
                }
                Ok(file_path) => files.push(file_path),
                Err(e) => warn!("Error reading file: {e}"),
            }
        }
    }
    Ok(files)
}

/// Shard files listed in a `*.safetensors.index.json`, relative to its directory.
fn resolve_shard_index(index_path: &Path) -> Result<Vec<PathBuf>> {
    let content = fs::read_to_string(index_path)
        .with_context(|| format!("Failed to read index file: {}", index_path.display()))?;

    let index: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse index file: {}", index_path.display()))?;

    let base = index_path.parent().unwrap_or_else(|| Path::new("."));
    let mut shards: Vec<&str> = index
        .get("weight_map")
        .and_then(|v| v.as_object())
        .map(|map| map.values().filter_map(|v| v.as_str()).collect())
        .unwrap_or_default();
    shards.sort();
    shards.dedup();

    let mut files = Vec::new();
    for shard in shards {
        let full_path = base.join(shard);
        if full_path.exists() {
            files.push(full_path);
        } else {
            warn!("Shard listed in index is missing: {}", full_path.display());
        }
    }
    Ok(files)
}
