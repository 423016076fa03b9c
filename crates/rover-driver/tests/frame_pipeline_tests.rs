//! 帧采集管线集成测试
//!
//! 使用 `rover-hal` 的脚本化摄像头验证回退链、有界队列、推流开关和设备消失处理。

use rover_driver::{AnnotationContext, DriverError, FramePipeline, FrameResult, StreamConfig};
use rover_hal::mock::{MockCameraOpener, MockRead};
use rover_hal::{CameraKind, CameraSpec, RawFrame};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

fn fast_config() -> StreamConfig {
    StreamConfig {
        target_fps: 200,
        consumer_timeout_ms: 500,
        metrics_window_ms: 50,
        ..StreamConfig::default()
    }
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// 没有任何设备可打开：构造失败，不启动线程，不泄漏句柄
#[test]
fn test_no_camera_fails_without_thread() {
    let opener = MockCameraOpener::none();
    let stats = opener.stats();

    let result = FramePipeline::start(&opener, &fast_config(), None, None);
    match result {
        Err(DriverError::NoCameraAvailable { tried }) => {
            assert_eq!(tried, CameraSpec::default_preference());
        },
        Err(e) => panic!("unexpected error: {}", e),
        Ok(_) => panic!("pipeline started without a camera"),
    }
    assert_eq!(stats.opens.load(Ordering::SeqCst), 0);
    assert_eq!(stats.reads.load(Ordering::SeqCst), 0);
}

/// 板载摄像头不可用时回退到外接设备
#[test]
fn test_fallback_chain() {
    let opener = MockCameraOpener::new(vec![CameraSpec::External(0)], 32, 24);
    let pipeline = FramePipeline::start(&opener, &fast_config(), None, None).unwrap();

    assert_eq!(pipeline.camera_kind(), CameraKind::Fallback);
    let stats = pipeline.get_stats();
    assert_eq!(stats.display_name, "USB-0");
    assert_eq!(stats.resolution(), "32x24");
    assert_eq!(stats.quality, 80);
}

/// 消费者不取帧时队列长度不超过容量，多余的帧被丢弃
#[test]
fn test_queue_is_bounded_and_drops_new_frames() {
    let opener = MockCameraOpener::new(vec![CameraSpec::Primary], 32, 24);
    let pipeline = FramePipeline::start(&opener, &fast_config(), None, None).unwrap();

    assert!(wait_until(Duration::from_secs(3), || {
        pipeline.metrics().frames_dropped > 0
    }));
    assert_eq!(pipeline.queue_len(), 5);
    assert_eq!(pipeline.queue_capacity(), 5);

    // 丢弃的是新帧：队首仍是最早产出的帧
    let first = pipeline.next_frame().into_frame().unwrap();
    assert_eq!(first.sequence, 0);
    let metrics = pipeline.metrics();
    assert!(metrics.frames_enqueued + metrics.frames_dropped <= metrics.frames_captured);
}

/// 帧按 FIFO 顺序交付
#[test]
fn test_frames_delivered_in_order() {
    let opener = MockCameraOpener::new(vec![CameraSpec::Primary], 16, 16);
    let pipeline = FramePipeline::start(&opener, &fast_config(), None, None).unwrap();

    let mut last = None;
    for _ in 0..10 {
        let frame = pipeline.next_frame().into_frame().unwrap();
        assert_eq!(&frame.data[..2], &[0xFF, 0xD8]);
        if let Some(prev) = last {
            assert!(frame.sequence > prev);
        }
        last = Some(frame.sequence);
    }
}

/// 推流关闭时采集继续，但消费者只会超时
#[test]
fn test_streaming_toggle_round_trip() {
    let opener = MockCameraOpener::new(vec![CameraSpec::Primary], 16, 16);
    let pipeline = FramePipeline::start(&opener, &fast_config(), None, None).unwrap();
    let original = pipeline.is_streaming();

    assert!(!pipeline.toggle_streaming());
    assert_eq!(
        pipeline.next_frame_timeout(Duration::from_millis(100)),
        FrameResult::Timeout
    );
    let captured = pipeline.metrics().frames_captured;
    assert!(wait_until(Duration::from_secs(2), || {
        pipeline.metrics().frames_captured > captured
    }));
    assert_eq!(
        pipeline.next_frame_timeout(Duration::from_millis(50)),
        FrameResult::Timeout
    );

    assert!(pipeline.toggle_streaming());
    assert_eq!(pipeline.is_streaming(), original);
    assert!(pipeline.next_frame().into_frame().is_some());
}

/// 叠加层只在开关打开时执行
#[test]
fn test_annotation_gated_by_flag() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let annotator = move |_image: &mut image::RgbImage, _ctx: &AnnotationContext| {
        counter.fetch_add(1, Ordering::SeqCst);
    };

    let opener = MockCameraOpener::new(vec![CameraSpec::Primary], 16, 16);
    let pipeline =
        FramePipeline::start(&opener, &fast_config(), Some(Box::new(annotator)), None).unwrap();

    thread::sleep(Duration::from_millis(50));
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    assert!(pipeline.toggle_annotation());
    assert!(wait_until(Duration::from_secs(2), || calls.load(Ordering::SeqCst) > 0));

    assert!(!pipeline.toggle_annotation());
    let settled = calls.load(Ordering::SeqCst);
    thread::sleep(Duration::from_millis(50));
    // 关闭前最多还有一帧正在处理
    assert!(calls.load(Ordering::SeqCst) <= settled + 1);
}

/// 瞬时读帧失败被记录后继续采集
#[test]
fn test_transient_errors_are_tolerated() {
    let opener = MockCameraOpener::new(vec![CameraSpec::Primary], 16, 16);
    for _ in 0..3 {
        opener.push(MockRead::Transient);
    }
    opener.push(MockRead::Frame(RawFrame::filled(16, 16, [255, 0, 0])));

    let pipeline = FramePipeline::start(&opener, &fast_config(), None, None).unwrap();
    let frame = pipeline.next_frame().into_frame().unwrap();
    assert_eq!(frame.sequence, 0);
    assert_eq!(pipeline.metrics().read_errors, 3);
    assert_eq!(pipeline.camera_kind(), CameraKind::Primary);
}

/// 设备消失：进入终止状态，之后立即返回 Unavailable，摄像头只释放一次
#[test]
fn test_device_gone_is_terminal() {
    let opener = MockCameraOpener::new(vec![CameraSpec::Primary], 16, 16);
    let stats = opener.stats();
    opener.push(MockRead::Frame(RawFrame::filled(16, 16, [0, 0, 255])));
    opener.push(MockRead::Gone);

    let mut pipeline = FramePipeline::start(&opener, &fast_config(), None, None).unwrap();

    // 设备消失前产出的帧仍可取走
    assert!(matches!(pipeline.next_frame(), FrameResult::Frame(_)));
    assert!(wait_until(Duration::from_secs(2), || !pipeline.is_running()));

    assert_eq!(pipeline.camera_kind(), CameraKind::None);
    assert_eq!(pipeline.get_stats().camera_kind, CameraKind::None);

    let start = Instant::now();
    assert_eq!(pipeline.next_frame(), FrameResult::Unavailable);
    assert!(start.elapsed() < Duration::from_millis(100));

    pipeline.stop();
    assert_eq!(stats.opens.load(Ordering::SeqCst), 1);
    assert_eq!(stats.releases.load(Ordering::SeqCst), 1);
}

/// 统计窗口结束后 fps / 码率被更新
#[test]
fn test_stats_refresh() {
    let opener = MockCameraOpener::new(vec![CameraSpec::Primary], 32, 32);
    let cpu_calls = Arc::new(AtomicUsize::new(0));
    let counter = cpu_calls.clone();
    let probe = Box::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Some(42.0)
    });
    let pipeline = FramePipeline::start(&opener, &fast_config(), None, Some(probe)).unwrap();

    assert!(wait_until(Duration::from_secs(3), || pipeline.get_stats().fps > 0.0));
    let stats = pipeline.get_stats();
    assert!(stats.bitrate_kbps > 0.0);
    assert_eq!(stats.cpu_percent, 42.0);
    assert_eq!(stats.camera_kind, CameraKind::Primary);
    assert!(cpu_calls.load(Ordering::SeqCst) >= 1);
}

/// 停止后摄像头被释放，查询返回 Unavailable
#[test]
fn test_stop_releases_camera() {
    let opener = MockCameraOpener::new(vec![CameraSpec::Primary], 16, 16);
    let stats = opener.stats();
    {
        let mut pipeline = FramePipeline::start(&opener, &fast_config(), None, None).unwrap();
        pipeline.stop();
        pipeline.stop();
        assert!(pipeline.is_terminal());
    }
    assert_eq!(stats.opens.load(Ordering::SeqCst), 1);
    assert_eq!(stats.releases.load(Ordering::SeqCst), 1);
}
