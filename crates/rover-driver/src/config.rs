//! 运行时配置
//!
//! 所有字段都有默认值，TOML 文件中只需写出需要覆盖的项：
//!
//! ```toml
//! [stream]
//! target_fps = 15
//! jpeg_quality = 70
//!
//! [odometry]
//! wheel_diameter_m = 0.065
//! max_path_len = 5000
//! ```

use crate::error::DriverError;
use rover_hal::CameraSpec;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// 完整配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoverConfig {
    pub stream: StreamConfig,
    pub odometry: OdometryConfig,
    pub telemetry: TelemetryConfig,
    pub sensors: SensorConfig,
}

impl RoverConfig {
    /// 从 TOML 字符串解析并校验
    pub fn from_toml_str(text: &str) -> Result<Self, DriverError> {
        let config: RoverConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// 从 TOML 文件加载并校验
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DriverError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| DriverError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&text)
    }

    /// 校验所有子配置
    pub fn validate(&self) -> Result<(), DriverError> {
        self.stream.validate()?;
        self.odometry.validate()?;
        self.telemetry.validate()?;
        self.sensors.validate()
    }
}

/// 视频流配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// 目标帧率（尽力而为）
    pub target_fps: u32,
    /// JPEG 质量（1-100）
    pub jpeg_quality: u8,
    /// 帧队列容量
    pub queue_capacity: usize,
    /// 消费者等待超时（毫秒）
    pub consumer_timeout_ms: u64,
    /// 统计窗口（毫秒）
    pub metrics_window_ms: u64,
    /// 是否水平镜像
    pub mirror: bool,
    /// 启动时是否开启叠加层
    pub annotate: bool,
    /// 启动时是否推流
    pub streaming: bool,
    /// 摄像头偏好列表（按顺序尝试）
    pub camera_preference: Vec<CameraSpec>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            target_fps: 30,
            jpeg_quality: 80,
            queue_capacity: 5,
            consumer_timeout_ms: 1000,
            metrics_window_ms: 1000,
            mirror: true,
            annotate: false,
            streaming: true,
            camera_preference: CameraSpec::default_preference(),
        }
    }
}

impl StreamConfig {
    pub fn validate(&self) -> Result<(), DriverError> {
        if self.target_fps == 0 {
            return Err(DriverError::Config("stream.target_fps must be > 0".into()));
        }
        if self.queue_capacity == 0 {
            return Err(DriverError::Config(
                "stream.queue_capacity must be > 0".into(),
            ));
        }
        if self.metrics_window_ms == 0 {
            return Err(DriverError::Config(
                "stream.metrics_window_ms must be > 0".into(),
            ));
        }
        if self.camera_preference.is_empty() {
            return Err(DriverError::Config(
                "stream.camera_preference must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// 钳制到 1-100 的 JPEG 质量
    pub fn quality(&self) -> u8 {
        self.jpeg_quality.clamp(1, 100)
    }

    pub fn frame_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.target_fps.max(1) as f64)
    }

    pub fn consumer_timeout(&self) -> Duration {
        Duration::from_millis(self.consumer_timeout_ms)
    }

    pub fn metrics_window(&self) -> Duration {
        Duration::from_millis(self.metrics_window_ms)
    }
}

/// 里程计配置（差速驱动几何参数）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OdometryConfig {
    /// 轮径（米）
    pub wheel_diameter_m: f64,
    /// 编码器每圈脉冲数
    pub ticks_per_revolution: u32,
    /// 轮距（米）
    pub wheel_separation_m: f64,
    /// 初始航向（弧度）
    pub initial_heading_rad: f64,
    /// 边沿去抖动窗口（毫秒）
    pub debounce_ms: u64,
    /// 保留的最大轨迹长度（0 表示不限）
    pub max_path_len: usize,
    /// 左轮编码器引脚
    pub left_pin: u8,
    /// 右轮编码器引脚
    pub right_pin: u8,
    /// 轨迹更新周期（毫秒）
    pub update_interval_ms: u64,
}

impl Default for OdometryConfig {
    fn default() -> Self {
        Self {
            wheel_diameter_m: 0.065,
            ticks_per_revolution: 20,
            wheel_separation_m: 0.15,
            initial_heading_rad: std::f64::consts::FRAC_PI_2,
            debounce_ms: 1,
            max_path_len: 10_000,
            left_pin: 5,
            right_pin: 6,
            update_interval_ms: 100,
        }
    }
}

impl OdometryConfig {
    pub fn validate(&self) -> Result<(), DriverError> {
        if !(self.wheel_diameter_m.is_finite() && self.wheel_diameter_m > 0.0) {
            return Err(DriverError::Config(
                "odometry.wheel_diameter_m must be > 0".into(),
            ));
        }
        if !(self.wheel_separation_m.is_finite() && self.wheel_separation_m > 0.0) {
            return Err(DriverError::Config(
                "odometry.wheel_separation_m must be > 0".into(),
            ));
        }
        if self.ticks_per_revolution == 0 {
            return Err(DriverError::Config(
                "odometry.ticks_per_revolution must be > 0".into(),
            ));
        }
        if self.update_interval_ms == 0 {
            return Err(DriverError::Config(
                "odometry.update_interval_ms must be > 0".into(),
            ));
        }
        Ok(())
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms)
    }
}

/// 遥测配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// 每个指标的历史容量
    pub history_capacity: usize,
    /// 历史写入节流间隔（毫秒）
    pub throttle_ms: u64,
    /// 主机指标采样周期（毫秒）
    pub sample_interval_ms: u64,
    /// 温度文件路径
    pub thermal_path: String,
    /// 过热阈值（摄氏度）
    pub critical_temperature_c: f32,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            history_capacity: 60,
            throttle_ms: 500,
            sample_interval_ms: 250,
            thermal_path: rover_hal::host::DEFAULT_THERMAL_PATH.to_string(),
            critical_temperature_c: 80.0,
        }
    }
}

impl TelemetryConfig {
    pub fn validate(&self) -> Result<(), DriverError> {
        if self.history_capacity == 0 {
            return Err(DriverError::Config(
                "telemetry.history_capacity must be > 0".into(),
            ));
        }
        if self.sample_interval_ms == 0 {
            return Err(DriverError::Config(
                "telemetry.sample_interval_ms must be > 0".into(),
            ));
        }
        Ok(())
    }

    pub fn throttle(&self) -> Duration {
        Duration::from_millis(self.throttle_ms)
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }
}

/// 单个测距传感器的量程
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeSpec {
    pub name: String,
    pub min_cm: f32,
    pub max_cm: f32,
}

/// 测距传感器轮询配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    /// 轮询周期（毫秒）
    pub poll_interval_ms: u64,
    /// 短距传感器（超声波）
    pub short_range: RangeSpec,
    /// 长距传感器（激光雷达）
    pub long_range: RangeSpec,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
            short_range: RangeSpec {
                name: "ultrasonic".to_string(),
                min_cm: 2.0,
                max_cm: 400.0,
            },
            long_range: RangeSpec {
                name: "lidar".to_string(),
                min_cm: 10.0,
                max_cm: 1200.0,
            },
        }
    }
}

impl SensorConfig {
    pub fn validate(&self) -> Result<(), DriverError> {
        if self.poll_interval_ms == 0 {
            return Err(DriverError::Config(
                "sensors.poll_interval_ms must be > 0".into(),
            ));
        }
        for spec in [&self.short_range, &self.long_range] {
            if !(spec.min_cm >= 0.0 && spec.max_cm > spec.min_cm) {
                return Err(DriverError::Config(format!(
                    "sensors.{}: invalid range {}..{}",
                    spec.name, spec.min_cm, spec.max_cm
                )));
            }
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = RoverConfig::default();
        assert_eq!(config.stream.target_fps, 30);
        assert_eq!(config.stream.jpeg_quality, 80);
        assert_eq!(config.stream.queue_capacity, 5);
        assert_eq!(config.stream.consumer_timeout(), Duration::from_secs(1));
        assert_eq!(config.telemetry.history_capacity, 60);
        assert_eq!(config.telemetry.throttle(), Duration::from_millis(500));
        assert_eq!(config.sensors.poll_interval(), Duration::from_millis(500));
        assert_eq!(config.odometry.ticks_per_revolution, 20);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_override() {
        let config = RoverConfig::from_toml_str(
            r#"
            [stream]
            target_fps = 15
            jpeg_quality = 70
            camera_preference = [{ type = "external", index = 2 }]

            [odometry]
            max_path_len = 0
            "#,
        )
        .unwrap();

        assert_eq!(config.stream.target_fps, 15);
        assert_eq!(config.stream.jpeg_quality, 70);
        assert_eq!(config.stream.queue_capacity, 5);
        assert_eq!(config.stream.camera_preference, vec![CameraSpec::External(2)]);
        assert_eq!(config.odometry.max_path_len, 0);
        assert_eq!(config.odometry.wheel_separation_m, 0.15);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = RoverConfig::from_toml_str("[stream]\ntarget_fps = 0\n").unwrap_err();
        assert!(matches!(err, DriverError::Config(_)));

        let err = RoverConfig::from_toml_str("[odometry]\nwheel_diameter_m = -1.0\n").unwrap_err();
        assert!(matches!(err, DriverError::Config(_)));

        let err = RoverConfig::from_toml_str("[telemetry]\nhistory_capacity = 0\n").unwrap_err();
        assert!(matches!(err, DriverError::Config(_)));

        let err = RoverConfig::from_toml_str("[stream]\ntarget_fps = \"fast\"\n").unwrap_err();
        assert!(matches!(err, DriverError::Config(_)));
    }

    #[test]
    fn test_quality_clamped() {
        let mut stream = StreamConfig::default();
        stream.jpeg_quality = 0;
        assert_eq!(stream.quality(), 1);
        stream.jpeg_quality = 255;
        assert_eq!(stream.quality(), 100);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[sensors]\npoll_interval_ms = 250").unwrap();
        let config = RoverConfig::load(file.path()).unwrap();
        assert_eq!(config.sensors.poll_interval_ms, 250);
        assert_eq!(config.sensors.short_range.name, "ultrasonic");

        assert!(RoverConfig::load("/definitely/not/here.toml").is_err());
    }
}
