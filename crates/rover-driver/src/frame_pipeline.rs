//! 帧采集管线
//!
//! 单个采集线程独占摄像头：读帧 → 镜像 → （可选）叠加 → JPEG 编码 → 入队。
//! 队列有界，满时丢弃新帧而不阻塞生产者；消费者通过 [`FramePipeline::next_frame`]
//! 带超时取帧。
//!
//! # 生命周期
//!
//! ```text
//! start() ──打开成功──▶ Primary / Fallback ──设备消失 / stop()──▶ None（终止）
//!    └──全部失败──▶ Err(NoCameraAvailable)，不创建线程
//! ```
//!
//! 进入 `None` 后采集线程退出并释放摄像头，之后所有 `next_frame()` 调用
//! 在队列排空后立即返回 [`FrameResult::Unavailable`]。

use crate::annotation::{AnnotationContext, FrameAnnotator};
use crate::camera_state::AtomicCameraKind;
use crate::config::StreamConfig;
use crate::encoding::{encode_jpeg, prepare_image};
use crate::error::DriverError;
use crate::stream_stats::{MetricsSnapshot, PipelineMetrics, StatsAccumulator, StreamStats};
use crate::worker::{Worker, sleep_while_running};
use arc_swap::ArcSwap;
use bytes::Bytes;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError, bounded};
use rover_hal::{CameraKind, CameraOpener, CameraSource, CameraSpec};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

/// 编码后的帧
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// 帧序号（按产出顺序递增，被丢弃的帧也占用序号）
    pub sequence: u64,
    /// JPEG 数据
    pub data: Bytes,
}

/// `next_frame()` 的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameResult {
    Frame(Frame),
    /// 等待超时（管线仍在运行）
    Timeout,
    /// 管线已终止，不会再有新帧
    Unavailable,
}

impl FrameResult {
    pub fn into_frame(self) -> Option<Frame> {
        match self {
            FrameResult::Frame(frame) => Some(frame),
            _ => None,
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, FrameResult::Unavailable)
    }
}

/// CPU 使用率探针，每个统计窗口结束时调用一次
///
/// 返回 `None` 表示本次不可用，统计沿用上一次的值。
pub type CpuProbe = Box<dyn FnMut() -> Option<f32> + Send>;

/// 采集线程与请求线程共享的状态
struct PipelineShared {
    streaming: AtomicBool,
    annotating: AtomicBool,
    camera_kind: AtomicCameraKind,
    stats: ArcSwap<StreamStats>,
    metrics: PipelineMetrics,
}

impl PipelineShared {
    /// 进入终止状态：摄像头类型置为 `None`，统计快照归零
    fn enter_terminal(&self) {
        self.camera_kind.set(CameraKind::None, Ordering::Release);
        let previous = self.stats.load();
        self.stats.store(Arc::new(StreamStats {
            fps: 0.0,
            bitrate_kbps: 0.0,
            camera_kind: CameraKind::None,
            ..StreamStats::clone(&previous)
        }));
    }
}

/// 帧采集管线句柄
pub struct FramePipeline {
    frame_rx: Receiver<Frame>,
    shared: Arc<PipelineShared>,
    worker: Worker,
    camera: CameraSpec,
    consumer_timeout: Duration,
    capacity: usize,
}

impl FramePipeline {
    /// 按偏好顺序打开摄像头并启动采集线程
    ///
    /// 所有候选都打不开时返回 [`DriverError::NoCameraAvailable`]，此时不会创建线程。
    pub fn start(
        opener: &dyn CameraOpener,
        config: &StreamConfig,
        annotator: Option<Box<dyn FrameAnnotator>>,
        cpu_probe: Option<CpuProbe>,
    ) -> Result<Self, DriverError> {
        config.validate()?;
        let (spec, camera) = open_first_camera(opener, &config.camera_preference)?;

        let kind = spec.kind();
        let resolution = camera.resolution();
        let shared = Arc::new(PipelineShared {
            streaming: AtomicBool::new(config.streaming),
            annotating: AtomicBool::new(config.annotate),
            camera_kind: AtomicCameraKind::new(kind),
            stats: ArcSwap::from_pointee(StreamStats::initial(
                kind,
                spec.display_name(),
                resolution,
                config.quality(),
            )),
            metrics: PipelineMetrics::new(),
        });

        let (frame_tx, frame_rx) = bounded(config.queue_capacity);
        let capture = CaptureLoop {
            camera,
            frame_tx,
            shared: shared.clone(),
            annotator,
            cpu_probe,
            mirror: config.mirror,
            quality: config.quality(),
            period: config.frame_period(),
            accumulator: StatsAccumulator::new(config.metrics_window()),
            sequence: 0,
            last_fps: 0.0,
            last_cpu: 0.0,
        };

        // 线程创建失败时闭包连同摄像头一起被释放
        let worker = Worker::spawn("frame-capture", move |running| capture.run(&running))?;

        info!(
            "Frame pipeline started on {} ({}x{}, {} fps target, quality {})",
            spec,
            resolution.0,
            resolution.1,
            config.target_fps,
            config.quality()
        );

        Ok(Self {
            frame_rx,
            shared,
            worker,
            camera: spec,
            consumer_timeout: config.consumer_timeout(),
            capacity: config.queue_capacity,
        })
    }

    /// 取下一帧（默认超时，1 秒）
    pub fn next_frame(&self) -> FrameResult {
        self.next_frame_timeout(self.consumer_timeout)
    }

    /// 取下一帧（指定超时）
    ///
    /// 多个消费者共享同一个队列，每帧只会交给其中一个。
    /// 推流关闭期间取到的帧（切换瞬间晚到的一帧）被丢弃，不会交付。
    pub fn next_frame_timeout(&self, timeout: Duration) -> FrameResult {
        if self.is_terminal() && self.frame_rx.is_empty() {
            return FrameResult::Unavailable;
        }
        let deadline = Instant::now() + timeout;
        loop {
            match self.frame_rx.recv_deadline(deadline) {
                Ok(frame) if !self.is_streaming() => {
                    debug!("Streaming paused, discarded late frame #{}", frame.sequence);
                },
                Ok(frame) => return FrameResult::Frame(frame),
                Err(RecvTimeoutError::Timeout) => {
                    return if self.is_terminal() {
                        FrameResult::Unavailable
                    } else {
                        FrameResult::Timeout
                    };
                },
                Err(RecvTimeoutError::Disconnected) => return FrameResult::Unavailable,
            }
        }
    }

    /// 切换推流开关，返回切换后的状态
    ///
    /// 关闭推流时清空队列中的旧帧，等待中的消费者随后只会超时。
    pub fn toggle_streaming(&self) -> bool {
        let enabled = !self.shared.streaming.fetch_xor(true, Ordering::AcqRel);
        if !enabled {
            let mut drained = 0usize;
            while self.frame_rx.try_recv().is_ok() {
                drained += 1;
            }
            debug!("Streaming paused, discarded {} queued frames", drained);
        }
        info!("Streaming {}", if enabled { "enabled" } else { "disabled" });
        enabled
    }

    /// 切换叠加层开关，返回切换后的状态
    pub fn toggle_annotation(&self) -> bool {
        let enabled = !self.shared.annotating.fetch_xor(true, Ordering::AcqRel);
        info!("Annotation {}", if enabled { "enabled" } else { "disabled" });
        enabled
    }

    pub fn is_streaming(&self) -> bool {
        self.shared.streaming.load(Ordering::Acquire)
    }

    pub fn is_annotating(&self) -> bool {
        self.shared.annotating.load(Ordering::Acquire)
    }

    pub fn camera_kind(&self) -> CameraKind {
        self.shared.camera_kind.get(Ordering::Acquire)
    }

    /// 启动时选中的设备
    pub fn camera(&self) -> CameraSpec {
        self.camera
    }

    /// 管线是否已终止
    pub fn is_terminal(&self) -> bool {
        self.shared.camera_kind.is_terminal(Ordering::Acquire)
    }

    /// 最近一次统计快照（无锁）
    pub fn get_stats(&self) -> Arc<StreamStats> {
        self.shared.stats.load_full()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    /// 当前排队帧数
    pub fn queue_len(&self) -> usize {
        self.frame_rx.len()
    }

    pub fn queue_capacity(&self) -> usize {
        self.capacity
    }

    /// 采集线程是否仍在运行
    pub fn is_running(&self) -> bool {
        self.worker.is_running()
    }

    /// 停止采集线程并释放摄像头（可重复调用）
    ///
    /// 队列中尚未取走的帧一并丢弃。
    pub fn stop(&mut self) {
        self.worker.stop();
        self.shared.enter_terminal();
        while self.frame_rx.try_recv().is_ok() {}
    }
}

impl Drop for FramePipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

/// 依次尝试偏好列表中的设备
fn open_first_camera(
    opener: &dyn CameraOpener,
    preference: &[CameraSpec],
) -> Result<(CameraSpec, Box<dyn CameraSource + Send>), DriverError> {
    for spec in preference {
        match opener.open(spec) {
            Ok(camera) => {
                info!("Camera {} opened ({})", spec, spec.display_name());
                return Ok((*spec, camera));
            },
            Err(e) => warn!("Failed to open camera {}: {}", spec, e),
        }
    }
    error!("No camera available, frame pipeline not started");
    Err(DriverError::NoCameraAvailable {
        tried: preference.to_vec(),
    })
}

/// 采集线程私有状态（摄像头、叠加层只在这里被访问）
struct CaptureLoop {
    camera: Box<dyn CameraSource + Send>,
    frame_tx: Sender<Frame>,
    shared: Arc<PipelineShared>,
    annotator: Option<Box<dyn FrameAnnotator>>,
    cpu_probe: Option<CpuProbe>,
    mirror: bool,
    quality: u8,
    period: Duration,
    accumulator: StatsAccumulator,
    sequence: u64,
    last_fps: f64,
    last_cpu: f32,
}

impl CaptureLoop {
    fn run(mut self, running: &AtomicBool) {
        while running.load(Ordering::Acquire) {
            let cycle_start = Instant::now();

            let raw = match self.camera.read_frame() {
                Ok(raw) => raw,
                Err(e) if e.is_device_gone() => {
                    error!("Camera disappeared: {}, stopping frame capture", e);
                    self.shared.enter_terminal();
                    break;
                },
                Err(e) => {
                    warn!("Failed to read frame: {}", e);
                    self.shared.metrics.read_errors.fetch_add(1, Ordering::Relaxed);
                    sleep_while_running(running, self.period);
                    continue;
                },
            };

            match self.process(raw) {
                Ok(jpeg) => self.publish(jpeg, cycle_start),
                Err(e) => {
                    warn!("Failed to encode frame: {}", e);
                    self.shared.metrics.encode_errors.fetch_add(1, Ordering::Relaxed);
                },
            }

            let spent = cycle_start.elapsed();
            if spent < self.period {
                sleep_while_running(running, self.period - spent);
            }
        }

        // 摄像头随 self 一起在采集线程内释放
        trace!("Frame capture loop exited");
    }

    fn process(&mut self, raw: rover_hal::RawFrame) -> Result<Vec<u8>, DriverError> {
        let mut image = prepare_image(raw, self.mirror)?;
        if self.shared.annotating.load(Ordering::Acquire)
            && let Some(annotator) = self.annotator.as_mut()
        {
            annotator.annotate(
                &mut image,
                &AnnotationContext {
                    sequence: self.sequence,
                    fps: self.last_fps,
                },
            );
        }
        encode_jpeg(&image, self.quality)
    }

    fn publish(&mut self, jpeg: Vec<u8>, now: Instant) {
        let metrics = &self.shared.metrics;
        metrics.frames_captured.fetch_add(1, Ordering::Relaxed);
        let frame_bytes = jpeg.len();
        let frame = Frame {
            sequence: self.sequence,
            data: Bytes::from(jpeg),
        };
        self.sequence += 1;

        if self.shared.streaming.load(Ordering::Acquire) {
            match self.frame_tx.try_send(frame) {
                Ok(()) => {
                    metrics.frames_enqueued.fetch_add(1, Ordering::Relaxed);
                },
                Err(TrySendError::Full(dropped)) => {
                    metrics.frames_dropped.fetch_add(1, Ordering::Relaxed);
                    debug!("Frame queue full, dropped frame #{}", dropped.sequence);
                },
                Err(TrySendError::Disconnected(_)) => {
                    trace!("Frame queue disconnected");
                },
            }
        }

        if let Some(sample) = self.accumulator.record(frame_bytes, now) {
            self.last_fps = sample.fps;
            if let Some(cpu) = self.cpu_probe.as_mut().and_then(|probe| probe()) {
                self.last_cpu = cpu;
            }

            let previous = self.shared.stats.load();
            let stats = StreamStats {
                fps: sample.fps,
                bitrate_kbps: sample.bitrate_kbps,
                cpu_percent: self.last_cpu,
                frames_dropped: metrics.frames_dropped.load(Ordering::Relaxed),
                ..StreamStats::clone(&previous)
            };
            info!(
                "Video Stats - FPS: {:.1}, Resolution: {}, Quality: {}%, Bitrate: {:.1} kbps, CPU: {:.1}%, Camera: {}",
                stats.fps,
                stats.resolution(),
                stats.quality,
                stats.bitrate_kbps,
                stats.cpu_percent,
                stats.display_name
            );
            self.shared.stats.store(Arc::new(stats));
        }
    }

}
