//! 运行时核心
//!
//! 本 crate 提供机器人的三个并行子系统：
//! - 帧采集管线（摄像头回退链、镜像/叠加/JPEG 编码、有界队列、每秒统计）
//! - 里程计（编码器脉冲原子计数、差速驱动积分、轨迹历史）
//! - 遥测采样（主机指标与测距传感器、限速环形缓冲区）
//!
//! 三者互不共享状态，统一由 [`Rover`] 持有并以"后台生产线程 + 无锁快照"的方式对外提供。
//!
//! # 使用场景
//!
//! 请求处理层（HTTP/WebSocket 等）持有一个 [`Rover`]，在各自的线程中调用
//! `next_frame()`、`get_position()`、`get_minimal_stats()` 等查询方法。

pub mod annotation;
mod builder;
pub mod camera_state;
pub mod config;
pub mod encoding;
mod error;
pub mod frame_pipeline;
pub mod host_monitor;
pub mod odometry;
pub mod ring_buffer;
mod rover;
pub mod sensor_poller;
pub mod stream_stats;
pub mod telemetry;
mod worker;

pub use annotation::{AnnotationContext, CrosshairAnnotator, FrameAnnotator};
pub use builder::RoverBuilder;
pub use camera_state::AtomicCameraKind;
pub use config::{
    OdometryConfig, RangeSpec, RoverConfig, SensorConfig, StreamConfig, TelemetryConfig,
};
pub use encoding::{MJPEG_BOUNDARY, mjpeg_part};
pub use error::DriverError;
pub use frame_pipeline::{CpuProbe, Frame, FramePipeline, FrameResult};
pub use odometry::{EncoderCounts, EncoderInputs, OdometryIntegrator, Pose, WheelGeometry};
pub use ring_buffer::ThrottledRing;
pub use rover::Rover;
pub use stream_stats::{MetricsSnapshot, PipelineMetrics, StreamStats};
pub use telemetry::{
    Distance, Metric, MinimalStats, SensorReading, SystemStats, TelemetrySampler,
    format_memory_size,
};
pub use worker::{JOIN_TIMEOUT, Worker};
