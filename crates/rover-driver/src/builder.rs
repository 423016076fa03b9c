//! Builder 模式实现
//!
//! 提供链式构造 `Rover` 实例的便捷方式。未提供的外设使用默认实现或直接跳过：
//!
//! - 摄像头打开器：未设置时不启动帧采集
//! - 主机指标：未设置时使用 [`SysinfoProvider`]（温度路径取配置）
//! - 测距传感器：为空时不启动轮询线程
//! - 驱动方向：未设置时按"只前进"处理
//! - 编码器输入：未设置时计数器只能由外部直接驱动

use crate::annotation::FrameAnnotator;
use crate::config::RoverConfig;
use crate::error::DriverError;
use crate::frame_pipeline::{CpuProbe, FramePipeline};
use crate::host_monitor::{HostMonitor, spawn_host_monitor};
use crate::odometry::{EncoderInputs, OdometryIntegrator, spawn_updater};
use crate::rover::Rover;
use crate::sensor_poller::spawn_sensor_poller;
use crate::telemetry::{Metric, TelemetrySampler};
use parking_lot::Mutex;
use rover_hal::{
    CameraOpener, DriveDirection, EdgeInput, MetricsProvider, RangeSensor, SysinfoProvider,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// CPU 静态信息刷新周期
const CPU_INFO_REFRESH: Duration = Duration::from_secs(10);

/// Rover Builder（链式构造）
///
/// # Example
///
/// ```no_run
/// use rover_driver::RoverBuilder;
/// use rover_hal::sim::SyntheticCameraOpener;
///
/// let rover = RoverBuilder::new()
///     .camera_opener(SyntheticCameraOpener::any())
///     .build()
///     .unwrap();
/// let (x, y) = rover.get_position();
/// ```
pub struct RoverBuilder {
    config: Option<RoverConfig>,
    camera_opener: Option<Box<dyn CameraOpener>>,
    annotator: Option<Box<dyn FrameAnnotator>>,
    metrics_provider: Option<Box<dyn MetricsProvider>>,
    host_metrics: bool,
    range_sensors: Vec<Box<dyn RangeSensor>>,
    drive_direction: Option<Arc<dyn DriveDirection>>,
    encoder_inputs: Option<(Box<dyn EdgeInput>, Box<dyn EdgeInput>)>,
    require_camera: bool,
    odometry_updater: bool,
}

impl RoverBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            camera_opener: None,
            annotator: None,
            metrics_provider: None,
            host_metrics: true,
            range_sensors: Vec::new(),
            drive_direction: None,
            encoder_inputs: None,
            require_camera: false,
            odometry_updater: true,
        }
    }

    /// 设置完整配置（可选，默认 [`RoverConfig::default`]）
    pub fn config(mut self, config: RoverConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// 设置摄像头打开器
    pub fn camera_opener(mut self, opener: impl CameraOpener + 'static) -> Self {
        self.camera_opener = Some(Box::new(opener));
        self
    }

    /// 设置叠加层（由 `toggle_annotation()` 开关）
    pub fn annotator(mut self, annotator: impl FrameAnnotator + 'static) -> Self {
        self.annotator = Some(Box::new(annotator));
        self
    }

    /// 设置主机指标提供者
    pub fn metrics_provider(mut self, provider: impl MetricsProvider + 'static) -> Self {
        self.metrics_provider = Some(Box::new(provider));
        self
    }

    /// 不启动主机指标采样线程
    pub fn without_host_metrics(mut self) -> Self {
        self.host_metrics = false;
        self
    }

    /// 添加一个测距传感器
    pub fn range_sensor(mut self, sensor: impl RangeSensor + 'static) -> Self {
        self.range_sensors.push(Box::new(sensor));
        self
    }

    /// 设置执行器方向查询
    pub fn drive_direction(mut self, direction: Arc<dyn DriveDirection>) -> Self {
        self.drive_direction = Some(direction);
        self
    }

    /// 设置左右轮编码器输入
    pub fn encoder_inputs(
        mut self,
        left: impl EdgeInput + 'static,
        right: impl EdgeInput + 'static,
    ) -> Self {
        self.encoder_inputs = Some((Box::new(left), Box::new(right)));
        self
    }

    /// 没有可用摄像头时让 `build()` 失败（默认只告警）
    pub fn require_camera(mut self, require: bool) -> Self {
        self.require_camera = require;
        self
    }

    /// 是否启动轨迹更新线程（默认启动，周期取 `odometry.update_interval_ms`）
    pub fn odometry_updater(mut self, enabled: bool) -> Self {
        self.odometry_updater = enabled;
        self
    }

    /// 构建 `Rover`
    ///
    /// 中途失败时，已启动的线程和已注册的输入都会在返回错误前释放。
    pub fn build(self) -> Result<Rover, DriverError> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let telemetry = Arc::new(TelemetrySampler::from_config(&config.telemetry));

        let frames = match &self.camera_opener {
            Some(opener) => {
                let cpu_source = telemetry.clone();
                let probe: CpuProbe = Box::new(move || cpu_source.latest(&Metric::Cpu));
                match FramePipeline::start(
                    opener.as_ref(),
                    &config.stream,
                    self.annotator,
                    Some(probe),
                ) {
                    Ok(frames) => Some(frames),
                    Err(e @ DriverError::NoCameraAvailable { .. }) if !self.require_camera => {
                        warn!("{}, continuing without video", e);
                        None
                    },
                    Err(e) => return Err(e),
                }
            },
            None => None,
        };

        let mut rover = Rover {
            frames,
            odometry: Arc::new(OdometryIntegrator::from_config(
                &config.odometry,
                self.drive_direction,
            )),
            telemetry,
            encoders: Mutex::new(None),
            workers: Vec::new(),
            shut_down: false,
        };

        // 之后任何一步失败，rover 的 Drop 负责回收已经启动的部分
        if let Some((left, right)) = self.encoder_inputs {
            *rover.encoders.get_mut() = Some(EncoderInputs::attach(
                left,
                right,
                rover.odometry.counts(),
                config.odometry.debounce(),
            )?);
        }

        if self.odometry_updater {
            rover.workers.push(spawn_updater(
                rover.odometry.clone(),
                config.odometry.update_interval(),
            )?);
        }

        if self.host_metrics {
            let provider = self.metrics_provider.unwrap_or_else(|| {
                Box::new(SysinfoProvider::with_thermal_path(
                    config.telemetry.thermal_path.clone(),
                ))
            });
            rover.workers.push(spawn_host_monitor(
                HostMonitor::new(provider, rover.telemetry.clone()),
                config.telemetry.sample_interval(),
                CPU_INFO_REFRESH,
            )?);
        }

        if !self.range_sensors.is_empty() {
            rover.workers.push(spawn_sensor_poller(
                self.range_sensors,
                rover.telemetry.clone(),
                config.sensors.poll_interval(),
            )?);
        }

        info!(
            "Rover started (camera: {}, threads: {:?})",
            rover.has_camera(),
            rover.running_threads()
        );
        Ok(rover)
    }
}

impl Default for RoverBuilder {
    fn default() -> Self {
        Self::new()
    }
}
