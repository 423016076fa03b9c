//! 遥测采样器
//!
//! 每个指标一个 [`ThrottledRing`]（各自独立加锁），外加测距传感器的最新读数。
//! 写入方（主机指标线程、传感器轮询线程）随意频率调用 `record`，
//! 历史按节流间隔采样，`latest` 始终是最新读数。

use crate::config::TelemetryConfig;
use crate::ring_buffer::ThrottledRing;
use arc_swap::{ArcSwap, ArcSwapOption};
use parking_lot::RwLock;
use rover_hal::{CpuInfo, MemoryInfo};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// 指标名
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Metric {
    Cpu,
    Memory,
    Temperature,
    /// 以传感器名命名的测距指标
    Sensor(String),
}

impl Metric {
    pub fn sensor(name: impl Into<String>) -> Self {
        Metric::Sensor(name.into())
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Metric::Cpu => write!(f, "cpu"),
            Metric::Memory => write!(f, "memory"),
            Metric::Temperature => write!(f, "temperature"),
            Metric::Sensor(name) => write!(f, "{}", name),
        }
    }
}

/// 测距结果
///
/// 超出量程与读取失败都显式标记，不用 0 或旧值代替。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "cm", rename_all = "snake_case")]
pub enum Distance {
    Valid(f32),
    OutOfRange,
    Error,
}

impl Distance {
    /// 按量程分类（闭区间）
    pub fn classify(cm: f32, range: (f32, f32)) -> Self {
        if cm.is_finite() && cm >= range.0 && cm <= range.1 {
            Distance::Valid(cm)
        } else {
            Distance::OutOfRange
        }
    }

    pub fn centimeters(&self) -> Option<f32> {
        match self {
            Distance::Valid(cm) => Some(*cm),
            _ => None,
        }
    }
}

/// 带时间戳的测距读数
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub distance: Distance,
    /// UNIX 时间（秒）
    pub timestamp: f64,
}

impl SensorReading {
    pub fn new(distance: Distance, timestamp: f64) -> Self {
        Self {
            distance,
            timestamp,
        }
    }

    /// 使用当前墙钟时间
    pub fn now(distance: Distance) -> Self {
        Self::new(distance, unix_now())
    }
}

/// 当前 UNIX 时间（秒）
pub fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

struct SensorChannel {
    latest: ArcSwapOption<SensorReading>,
    history: ThrottledRing<f32>,
}

/// 遥测采样器
pub struct TelemetrySampler {
    capacity: usize,
    throttle: Duration,
    critical_temperature_c: f32,
    cpu: ThrottledRing<f32>,
    memory: ThrottledRing<f32>,
    temperature: ThrottledRing<f32>,
    memory_details: ArcSwap<MemoryInfo>,
    cpu_info: ArcSwap<CpuInfo>,
    sensors: RwLock<HashMap<String, Arc<SensorChannel>>>,
}

impl TelemetrySampler {
    pub fn new(capacity: usize, throttle: Duration, critical_temperature_c: f32) -> Self {
        Self {
            capacity,
            throttle,
            critical_temperature_c,
            cpu: ThrottledRing::new(capacity, throttle),
            memory: ThrottledRing::new(capacity, throttle),
            temperature: ThrottledRing::new(capacity, throttle),
            memory_details: ArcSwap::from_pointee(MemoryInfo::default()),
            cpu_info: ArcSwap::from_pointee(CpuInfo::default()),
            sensors: RwLock::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &TelemetryConfig) -> Self {
        Self::new(
            config.history_capacity,
            config.throttle(),
            config.critical_temperature_c,
        )
    }

    /// 写入一个样本，返回是否进入历史
    pub fn record(&self, metric: &Metric, value: f32) -> bool {
        match metric {
            Metric::Cpu => self.cpu.record(value),
            Metric::Memory => self.memory.record(value),
            Metric::Temperature => self.temperature.record(value),
            Metric::Sensor(name) => self.sensor_channel(name).history.record(value),
        }
    }

    /// 历史拷贝（最旧在前）；未知传感器返回空
    pub fn snapshot(&self, metric: &Metric) -> Vec<f32> {
        match metric {
            Metric::Cpu => self.cpu.snapshot(),
            Metric::Memory => self.memory.snapshot(),
            Metric::Temperature => self.temperature.snapshot(),
            Metric::Sensor(name) => self
                .existing_channel(name)
                .map(|c| c.history.snapshot())
                .unwrap_or_default(),
        }
    }

    /// 最新读数（不受节流影响）
    pub fn latest(&self, metric: &Metric) -> Option<f32> {
        match metric {
            Metric::Cpu => self.cpu.latest(),
            Metric::Memory => self.memory.latest(),
            Metric::Temperature => self.temperature.latest(),
            Metric::Sensor(name) => self.existing_channel(name).and_then(|c| c.history.latest()),
        }
    }

    /// 清空某个指标的历史与最新值
    pub fn clear(&self, metric: &Metric) {
        match metric {
            Metric::Cpu => self.cpu.clear(),
            Metric::Memory => self.memory.clear(),
            Metric::Temperature => self.temperature.clear(),
            Metric::Sensor(name) => {
                if let Some(channel) = self.existing_channel(name) {
                    channel.history.clear();
                    channel.latest.store(None);
                }
            },
        }
    }

    /// 覆盖传感器最新读数
    pub fn record_sensor(&self, name: &str, reading: SensorReading) {
        self.sensor_channel(name).latest.store(Some(Arc::new(reading)));
    }

    pub fn latest_sensor(&self, name: &str) -> Option<SensorReading> {
        self.existing_channel(name)
            .and_then(|c| c.latest.load_full())
            .map(|r| *r)
    }

    /// 已知传感器名（排序）
    pub fn sensor_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.sensors.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn set_memory_details(&self, info: MemoryInfo) {
        self.memory_details.store(Arc::new(info));
    }

    pub fn set_cpu_info(&self, info: CpuInfo) {
        self.cpu_info.store(Arc::new(info));
    }

    pub fn memory_details(&self) -> MemoryInfo {
        **self.memory_details.load()
    }

    pub fn cpu_info(&self) -> CpuInfo {
        **self.cpu_info.load()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn throttle(&self) -> Duration {
        self.throttle
    }

    /// 完整统计（最新值 + 历史），一次调用取全
    pub fn get_stats(&self) -> SystemStats {
        let temperature = self.temperature.latest();
        let sensors = self
            .sensors
            .read()
            .iter()
            .filter_map(|(name, c)| c.latest.load_full().map(|r| (name.clone(), *r)))
            .collect();

        SystemStats {
            cpu: CpuStats {
                usage: self.cpu.latest(),
                history: self.cpu.snapshot(),
            },
            memory: MemoryStats {
                usage: self.memory.latest(),
                details: self.memory_details(),
                history: self.memory.snapshot(),
            },
            temperature: TemperatureStats {
                value: temperature,
                is_critical: temperature.is_some_and(|t| t > self.critical_temperature_c),
                history: self.temperature.snapshot(),
            },
            sensors,
            timestamp: unix_now(),
        }
    }

    /// 精简统计（只有最新标量），用于高频推送
    pub fn get_minimal_stats(&self) -> MinimalStats {
        let cpu_info = self.cpu_info();
        let memory = self.memory_details();
        MinimalStats {
            cpu: MinimalCpu {
                usage: self.cpu.latest(),
                cores: cpu_info.cores,
                threads: cpu_info.threads,
                frequency_mhz: cpu_info.frequency_mhz,
            },
            memory: MinimalMemory {
                percent: self.memory.latest(),
                total_mb: bytes_to_mb(memory.total),
                used_mb: bytes_to_mb(memory.used),
                free_mb: bytes_to_mb(memory.free),
            },
            temperature: self.temperature.latest(),
        }
    }

    fn existing_channel(&self, name: &str) -> Option<Arc<SensorChannel>> {
        self.sensors.read().get(name).cloned()
    }

    fn sensor_channel(&self, name: &str) -> Arc<SensorChannel> {
        if let Some(channel) = self.existing_channel(name) {
            return channel;
        }
        self.sensors
            .write()
            .entry(name.to_string())
            .or_insert_with(|| {
                Arc::new(SensorChannel {
                    latest: ArcSwapOption::empty(),
                    history: ThrottledRing::new(self.capacity, self.throttle),
                })
            })
            .clone()
    }
}

impl Default for TelemetrySampler {
    fn default() -> Self {
        Self::from_config(&TelemetryConfig::default())
    }
}

impl fmt::Debug for TelemetrySampler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelemetrySampler")
            .field("capacity", &self.capacity)
            .field("throttle", &self.throttle)
            .field("sensors", &self.sensor_names())
            .finish()
    }
}

fn bytes_to_mb(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}

/// 格式化内存大小（输入单位 MB）
///
/// 不小于 1024 MB 时显示为 GB。
pub fn format_memory_size(mb: f64) -> String {
    if mb >= 1024.0 {
        format!("{:.2} GB", mb / 1024.0)
    } else {
        format!("{:.2} MB", mb)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CpuStats {
    pub usage: Option<f32>,
    pub history: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemoryStats {
    pub usage: Option<f32>,
    pub details: MemoryInfo,
    pub history: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemperatureStats {
    pub value: Option<f32>,
    pub is_critical: bool,
    pub history: Vec<f32>,
}

/// 完整系统统计
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemStats {
    pub cpu: CpuStats,
    pub memory: MemoryStats,
    pub temperature: TemperatureStats,
    /// 各传感器最新读数
    pub sensors: BTreeMap<String, SensorReading>,
    pub timestamp: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MinimalCpu {
    pub usage: Option<f32>,
    pub cores: usize,
    pub threads: usize,
    pub frequency_mhz: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MinimalMemory {
    pub percent: Option<f32>,
    pub total_mb: f64,
    pub used_mb: f64,
    pub free_mb: f64,
}

/// 精简系统统计
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MinimalStats {
    pub cpu: MinimalCpu,
    pub memory: MinimalMemory,
    pub temperature: Option<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sampler() -> TelemetrySampler {
        TelemetrySampler::new(60, Duration::from_millis(500), 80.0)
    }

    #[test]
    fn test_record_throttles_history_not_latest() {
        let telemetry = sampler();
        assert!(telemetry.record(&Metric::Cpu, 12.0));
        assert!(!telemetry.record(&Metric::Cpu, 34.0));
        assert_eq!(telemetry.snapshot(&Metric::Cpu), vec![12.0]);
        assert_eq!(telemetry.latest(&Metric::Cpu), Some(34.0));
        assert_eq!(telemetry.latest(&Metric::Memory), None);
    }

    #[test]
    fn test_metrics_are_independent() {
        let telemetry = sampler();
        assert!(telemetry.record(&Metric::Cpu, 1.0));
        assert!(telemetry.record(&Metric::Memory, 2.0));
        assert!(telemetry.record(&Metric::sensor("lidar"), 150.0));
        assert_eq!(telemetry.snapshot(&Metric::sensor("lidar")), vec![150.0]);
        assert!(telemetry.snapshot(&Metric::sensor("sonar")).is_empty());
    }

    #[test]
    fn test_sensor_latest_and_markers() {
        let telemetry = sampler();
        assert_eq!(telemetry.latest_sensor("ultrasonic"), None);

        telemetry.record_sensor("ultrasonic", SensorReading::new(Distance::Valid(42.0), 1.0));
        telemetry.record_sensor("ultrasonic", SensorReading::new(Distance::OutOfRange, 2.0));
        let reading = telemetry.latest_sensor("ultrasonic").unwrap();
        assert_eq!(reading.distance, Distance::OutOfRange);
        assert_eq!(reading.timestamp, 2.0);
        assert_eq!(telemetry.sensor_names(), vec!["ultrasonic".to_string()]);
    }

    #[test]
    fn test_distance_classify() {
        assert_eq!(Distance::classify(2.0, (2.0, 400.0)), Distance::Valid(2.0));
        assert_eq!(Distance::classify(1.9, (2.0, 400.0)), Distance::OutOfRange);
        assert_eq!(Distance::classify(f32::NAN, (2.0, 400.0)), Distance::OutOfRange);
        assert_eq!(Distance::Valid(5.0).centimeters(), Some(5.0));
        assert_eq!(Distance::Error.centimeters(), None);
    }

    #[test]
    fn test_get_stats_critical_temperature() {
        let telemetry = sampler();
        telemetry.record(&Metric::Temperature, 85.5);
        telemetry.set_memory_details(MemoryInfo::from_bytes(1000, 250, 700, 100));
        let stats = telemetry.get_stats();
        assert!(stats.temperature.is_critical);
        assert_eq!(stats.temperature.history, vec![85.5]);
        assert_eq!(stats.memory.details.total, 1000);
        assert!(stats.timestamp > 0.0);

        telemetry.clear(&Metric::Temperature);
        assert!(!telemetry.get_stats().temperature.is_critical);
    }

    #[test]
    fn test_minimal_stats_serialize() {
        let telemetry = sampler();
        telemetry.record(&Metric::Cpu, 20.0);
        telemetry.set_memory_details(MemoryInfo::from_bytes(
            2048 * 1024 * 1024,
            1024 * 1024 * 1024,
            1024 * 1024 * 1024,
            512 * 1024 * 1024,
        ));
        telemetry.set_cpu_info(CpuInfo {
            cores: 4,
            threads: 4,
            frequency_mhz: 1500,
        });

        let minimal = telemetry.get_minimal_stats();
        assert_eq!(minimal.memory.total_mb, 2048.0);
        assert_eq!(minimal.temperature, None);

        let json = serde_json::to_value(minimal).unwrap();
        assert_eq!(json["cpu"]["usage"], 20.0);
        assert_eq!(json["cpu"]["cores"], 4);
        assert!(json["temperature"].is_null());
    }

    #[test]
    fn test_sensor_reading_json_shape() {
        let reading = SensorReading::new(Distance::Valid(12.5), 3.0);
        let json = serde_json::to_value(reading).unwrap();
        assert_eq!(json["distance"]["status"], "valid");
        assert_eq!(json["distance"]["cm"], 12.5);

        let json = serde_json::to_value(SensorReading::new(Distance::OutOfRange, 3.0)).unwrap();
        assert_eq!(json["distance"]["status"], "out_of_range");
    }

    #[test]
    fn test_format_memory_size() {
        assert_eq!(format_memory_size(512.0), "512.00 MB");
        assert_eq!(format_memory_size(2048.0), "2.00 GB");
    }
}
