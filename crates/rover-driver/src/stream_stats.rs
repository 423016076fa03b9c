//! 视频流统计
//!
//! - [`StreamStats`]: 对外快照，由采集线程每个统计窗口（默认 1 秒）更新一次
//! - [`StatsAccumulator`]: 采集线程私有的窗口累加器
//! - [`PipelineMetrics`]: 原子计数器，任何线程都可以无锁读取

use rover_hal::CameraKind;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// 视频流统计快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamStats {
    /// 最近一个窗口的帧率
    pub fps: f64,
    pub width: u32,
    pub height: u32,
    /// JPEG 质量（1-100）
    pub quality: u8,
    /// 近似码率（kbps）
    pub bitrate_kbps: f64,
    /// 主机 CPU 使用率（0-100）
    pub cpu_percent: f32,
    pub camera_kind: CameraKind,
    /// 摄像头显示名称（如 "Pi-Cam"、"USB-0"）
    pub display_name: String,
    /// 因队列满被丢弃的帧数（累计）
    pub frames_dropped: u64,
}

impl StreamStats {
    /// 初始快照（摄像头已打开，尚无帧）
    pub fn initial(
        kind: CameraKind,
        display_name: impl Into<String>,
        resolution: (u32, u32),
        quality: u8,
    ) -> Self {
        Self {
            fps: 0.0,
            width: resolution.0,
            height: resolution.1,
            quality,
            bitrate_kbps: 0.0,
            cpu_percent: 0.0,
            camera_kind: kind,
            display_name: display_name.into(),
            frames_dropped: 0,
        }
    }

    /// 分辨率字符串（"WxH"）
    pub fn resolution(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }
}

impl Default for StreamStats {
    fn default() -> Self {
        Self::initial(CameraKind::None, "none", (0, 0), 0)
    }
}

/// 一个统计窗口的结算结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowSample {
    pub fps: f64,
    pub bitrate_kbps: f64,
    pub frames: u64,
    pub elapsed: Duration,
}

/// 统计窗口累加器
///
/// 每产出一帧调用一次 [`StatsAccumulator::record`]；
/// 窗口到期时返回结算结果并重新开始计数。
#[derive(Debug)]
pub struct StatsAccumulator {
    window: Duration,
    window_start: Instant,
    frames: u64,
}

impl StatsAccumulator {
    pub fn new(window: Duration) -> Self {
        Self::starting_at(window, Instant::now())
    }

    pub fn starting_at(window: Duration, start: Instant) -> Self {
        Self {
            window,
            window_start: start,
            frames: 0,
        }
    }

    /// 记录一帧
    ///
    /// 码率按最后一帧大小估算：`bytes * fps * 8 / 1024`。
    pub fn record(&mut self, frame_bytes: usize, now: Instant) -> Option<WindowSample> {
        self.frames += 1;
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < self.window {
            return None;
        }

        // 避免除零（至少 1ms）
        let secs = elapsed.as_secs_f64().max(0.001);
        let fps = self.frames as f64 / secs;
        let sample = WindowSample {
            fps,
            bitrate_kbps: frame_bytes as f64 * fps * 8.0 / 1024.0,
            frames: self.frames,
            elapsed,
        };

        self.frames = 0;
        self.window_start = now;
        Some(sample)
    }

    /// 当前窗口内已计数的帧
    pub fn pending_frames(&self) -> u64 {
        self.frames
    }
}

/// 采集链路计数器
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    /// 成功采集并编码的帧数
    pub frames_captured: AtomicU64,
    /// 成功入队的帧数
    pub frames_enqueued: AtomicU64,
    /// 队列满被丢弃的帧数
    pub frames_dropped: AtomicU64,
    /// 瞬时读帧失败次数
    pub read_errors: AtomicU64,
    /// 编码失败次数
    pub encode_errors: AtomicU64,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            frames_captured: self.frames_captured.load(Ordering::Relaxed),
            frames_enqueued: self.frames_enqueued.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            read_errors: self.read_errors.load(Ordering::Relaxed),
            encode_errors: self.encode_errors.load(Ordering::Relaxed),
        }
    }
}

/// 计数器快照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct MetricsSnapshot {
    pub frames_captured: u64,
    pub frames_enqueued: u64,
    pub frames_dropped: u64,
    pub read_errors: u64,
    pub encode_errors: u64,
}

impl MetricsSnapshot {
    /// 丢帧率（百分比）
    ///
    /// 返回 0.0 到 100.0 之间的值。如果 `frames_captured` 为 0，返回 0.0。
    pub fn drop_rate(&self) -> f64 {
        if self.frames_captured == 0 {
            return 0.0;
        }
        (self.frames_dropped as f64 / self.frames_captured as f64) * 100.0
    }
}
