//! 运行时聚合对象
//!
//! [`Rover`] 显式持有三个子系统和所有后台线程，交给请求处理层按引用使用。
//! 关闭顺序固定：先停止所有生产者线程，再释放硬件句柄（编码器输入）。

use crate::error::DriverError;
use crate::frame_pipeline::{FramePipeline, FrameResult};
use crate::odometry::{EncoderInputs, OdometryIntegrator, Pose};
use crate::stream_stats::StreamStats;
use crate::telemetry::{MinimalStats, SensorReading, SystemStats, TelemetrySampler};
use crate::worker::Worker;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// 机器人运行时
pub struct Rover {
    pub(crate) frames: Option<FramePipeline>,
    pub(crate) odometry: Arc<OdometryIntegrator>,
    pub(crate) telemetry: Arc<TelemetrySampler>,
    /// 输入句柄只在关闭时访问，加锁只为让 `Rover` 可以跨线程共享
    pub(crate) encoders: Mutex<Option<EncoderInputs>>,
    pub(crate) workers: Vec<Worker>,
    pub(crate) shut_down: bool,
}

impl Rover {
    // ---- 帧采集 ----

    /// 取下一帧；没有摄像头时立即返回 `Unavailable`
    pub fn next_frame(&self) -> FrameResult {
        match &self.frames {
            Some(frames) => frames.next_frame(),
            None => FrameResult::Unavailable,
        }
    }

    pub fn next_frame_timeout(&self, timeout: Duration) -> FrameResult {
        match &self.frames {
            Some(frames) => frames.next_frame_timeout(timeout),
            None => FrameResult::Unavailable,
        }
    }

    /// 切换推流，返回切换后的状态
    pub fn toggle_streaming(&self) -> Result<bool, DriverError> {
        Ok(self.frame_pipeline()?.toggle_streaming())
    }

    /// 切换叠加层，返回切换后的状态
    pub fn toggle_annotation(&self) -> Result<bool, DriverError> {
        Ok(self.frame_pipeline()?.toggle_annotation())
    }

    /// 视频流统计；没有摄像头时返回 `camera_kind == None` 的默认快照
    pub fn get_stream_stats(&self) -> StreamStats {
        self.frames
            .as_ref()
            .map(|frames| StreamStats::clone(&frames.get_stats()))
            .unwrap_or_default()
    }

    pub fn frame_pipeline(&self) -> Result<&FramePipeline, DriverError> {
        self.frames
            .as_ref()
            .ok_or(DriverError::Unavailable("frame pipeline"))
    }

    pub fn has_camera(&self) -> bool {
        self.frames.as_ref().is_some_and(|f| !f.is_terminal())
    }

    // ---- 里程计 ----

    pub fn integrate(&self) -> Pose {
        self.odometry.integrate()
    }

    pub fn get_position(&self) -> (f64, f64) {
        self.odometry.get_position()
    }

    pub fn get_path(&self) -> Vec<Pose> {
        self.odometry.path()
    }

    pub fn odometry(&self) -> &Arc<OdometryIntegrator> {
        &self.odometry
    }

    // ---- 遥测 ----

    pub fn get_stats(&self) -> SystemStats {
        self.telemetry.get_stats()
    }

    pub fn get_minimal_stats(&self) -> MinimalStats {
        self.telemetry.get_minimal_stats()
    }

    pub fn record_sensor(&self, name: &str, reading: SensorReading) {
        self.telemetry.record_sensor(name, reading);
    }

    pub fn latest_sensor(&self, name: &str) -> Option<SensorReading> {
        self.telemetry.latest_sensor(name)
    }

    pub fn telemetry(&self) -> &Arc<TelemetrySampler> {
        &self.telemetry
    }

    // ---- 生命周期 ----

    /// 后台线程名（仍在运行的）
    pub fn running_threads(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .workers
            .iter()
            .filter(|w| w.is_running())
            .map(|w| w.name().to_string())
            .collect();
        if let Some(frames) = &self.frames
            && frames.is_running()
        {
            names.push("frame-capture".to_string());
        }
        names
    }

    /// 停止所有后台线程并释放硬件（可重复调用）
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;

        if let Some(frames) = self.frames.as_mut() {
            frames.stop();
        }
        for worker in self.workers.iter_mut() {
            worker.stop();
        }
        // 生产者全部停止后再关闭输入
        self.encoders.get_mut().take();
        info!("Rover shut down");
    }
}

impl Drop for Rover {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Rover {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rover")
            .field("has_camera", &self.has_camera())
            .field("odometry", &self.odometry)
            .field("telemetry", &self.telemetry)
            .field("threads", &self.running_threads())
            .finish()
    }
}
