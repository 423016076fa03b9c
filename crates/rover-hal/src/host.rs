//! 操作系统指标提供者
//!
//! 使用 `sysinfo` crate 实现跨平台 CPU/内存读取，温度读取 sysfs 风格的
//! 热区文件（内容为毫摄氏度整数，如 `/sys/class/thermal/thermal_zone0/temp`）。

use crate::{DeviceError, DeviceErrorKind, HalError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use sysinfo::{CpuRefreshKind, MemoryRefreshKind, RefreshKind, System};
use tracing::warn;

/// 默认热区路径（树莓派）
pub const DEFAULT_THERMAL_PATH: &str = "/sys/class/thermal/thermal_zone0/temp";

/// 内存详情（字节）
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryInfo {
    pub total: u64,
    pub available: u64,
    pub used: u64,
    pub free: u64,
    /// 使用率（0-100）
    pub percent: f32,
}

impl MemoryInfo {
    /// 由总量与可用量推导使用率
    pub fn from_bytes(total: u64, available: u64, used: u64, free: u64) -> Self {
        let percent = if total == 0 {
            0.0
        } else {
            ((total.saturating_sub(available)) as f64 / total as f64 * 100.0) as f32
        };
        Self {
            total,
            available,
            used,
            free,
            percent,
        }
    }
}

/// CPU 静态信息
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CpuInfo {
    /// 物理核心数
    pub cores: usize,
    /// 逻辑线程数
    pub threads: usize,
    /// 当前频率（MHz）
    pub frequency_mhz: u64,
}

/// 操作系统指标提供者
pub trait MetricsProvider: Send {
    /// CPU 使用率（0-100）
    fn cpu_percent(&mut self) -> Result<f32, HalError>;

    /// 内存详情
    fn memory(&mut self) -> Result<MemoryInfo, HalError>;

    /// 核心温度（摄氏度）
    fn temperature_c(&mut self) -> Result<f32, HalError>;

    /// CPU 核心/线程/频率
    fn cpu_info(&mut self) -> CpuInfo;
}

/// 基于 `sysinfo` 的指标提供者
pub struct SysinfoProvider {
    sys: System,
    thermal_path: PathBuf,
}

impl SysinfoProvider {
    pub fn new() -> Self {
        Self::with_thermal_path(DEFAULT_THERMAL_PATH)
    }

    pub fn with_thermal_path(path: impl Into<PathBuf>) -> Self {
        let sys = System::new_with_specifics(
            RefreshKind::nothing()
                .with_cpu(CpuRefreshKind::everything())
                .with_memory(MemoryRefreshKind::everything()),
        );
        Self {
            sys,
            thermal_path: path.into(),
        }
    }

    pub fn thermal_path(&self) -> &Path {
        &self.thermal_path
    }
}

impl Default for SysinfoProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsProvider for SysinfoProvider {
    fn cpu_percent(&mut self) -> Result<f32, HalError> {
        self.sys.refresh_cpu_usage();
        let usage = self.sys.global_cpu_usage();
        if !usage.is_finite() {
            return Err(HalError::Device(DeviceError::new(
                DeviceErrorKind::InvalidResponse,
                "non-finite CPU usage",
            )));
        }
        Ok(usage.clamp(0.0, 100.0))
    }

    fn memory(&mut self) -> Result<MemoryInfo, HalError> {
        self.sys.refresh_memory();
        let total = self.sys.total_memory();
        if total == 0 {
            return Err(HalError::Unsupported("memory totals unavailable".into()));
        }
        Ok(MemoryInfo::from_bytes(
            total,
            self.sys.available_memory(),
            self.sys.used_memory(),
            self.sys.free_memory(),
        ))
    }

    fn temperature_c(&mut self) -> Result<f32, HalError> {
        read_thermal_zone(&self.thermal_path)
    }

    fn cpu_info(&mut self) -> CpuInfo {
        self.sys.refresh_cpu_frequency();
        let threads = self.sys.cpus().len();
        CpuInfo {
            cores: System::physical_core_count().unwrap_or(0),
            threads,
            frequency_mhz: self.sys.cpus().first().map(|c| c.frequency()).unwrap_or(0),
        }
    }
}

/// 读取 sysfs 热区文件（毫摄氏度 → 摄氏度，保留 1 位小数）
pub fn read_thermal_zone(path: &Path) -> Result<f32, HalError> {
    let raw = std::fs::read_to_string(path)?;
    let millidegrees: f64 = raw.trim().parse().map_err(|_| {
        warn!("Unparsable thermal value {:?} in {}", raw.trim(), path.display());
        HalError::Device(DeviceError::new(
            DeviceErrorKind::InvalidResponse,
            format!("unparsable thermal value {:?} in {}", raw.trim(), path.display()),
        ))
    })?;
    Ok(((millidegrees / 1000.0) * 10.0).round() as f32 / 10.0)
}
