//! Rover 运行时宿主进程
//!
//! 用模拟外设（测试图案摄像头、扫描式测距、软件编码器）驱动完整的运行时核心，
//! 并按固定周期把精简统计以 JSON 形式输出（代替 WebSocket 推送）。
//!
//! ```bash
//! RUST_LOG=debug roverd --config rover.toml --fps 15 --annotate
//! ```

mod wheel_sim;

use anyhow::{Context, Result};
use clap::Parser;
use rover_driver::{CrosshairAnnotator, FrameResult, RoverBuilder, RoverConfig, mjpeg_part};
use rover_hal::sim::{SimulatedRangeSensor, SyntheticCameraOpener};
use rover_hal::{CameraSpec, SharedDirection, SoftwareEdgeInput, SysinfoProvider};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use wheel_sim::WheelSimulator;

/// Rover 运行时宿主
#[derive(Parser, Debug)]
#[command(name = "roverd")]
#[command(about = "Rover runtime host with simulated peripherals", long_about = None)]
#[command(version)]
struct Args {
    /// TOML 配置文件（缺省时使用内置默认值）
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 覆盖目标帧率
    #[arg(long)]
    fps: Option<u32>,

    /// 覆盖 JPEG 质量（1-100）
    #[arg(long)]
    quality: Option<u8>,

    /// 启动时开启叠加层
    #[arg(long)]
    annotate: bool,

    /// 模拟摄像头分辨率（宽）
    #[arg(long, default_value_t = 640)]
    width: u32,

    /// 模拟摄像头分辨率（高）
    #[arg(long, default_value_t = 480)]
    height: u32,

    /// 只提供外接摄像头（演练回退链）
    #[arg(long)]
    external_only: bool,

    /// 统计推送周期（毫秒）
    #[arg(long, default_value_t = 1000)]
    push_interval_ms: u64,

    /// 模拟车轮脉冲频率（Hz）
    #[arg(long, default_value_t = 40)]
    tick_rate: u32,

    /// 运行时长（秒），缺省时运行到 Ctrl+C
    #[arg(long)]
    duration: Option<u64>,
}

fn load_config(args: &Args) -> Result<RoverConfig> {
    let mut config = match &args.config {
        Some(path) => RoverConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => RoverConfig::default(),
    };
    if let Some(fps) = args.fps {
        config.stream.target_fps = fps;
    }
    if let Some(quality) = args.quality {
        config.stream.jpeg_quality = quality;
    }
    if args.annotate {
        config.stream.annotate = true;
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;

    let running = Arc::new(AtomicBool::new(true));
    let flag = running.clone();
    ctrlc::set_handler(move || {
        info!("Received interrupt signal, shutting down");
        flag.store(false, Ordering::Release);
    })
    .context("failed to set signal handler")?;

    let cameras = if args.external_only {
        vec![CameraSpec::External(0), CameraSpec::External(1)]
    } else {
        CameraSpec::default_preference()
    };
    let sensors = &config.sensors;
    let direction = Arc::new(SharedDirection::new());
    let left = SoftwareEdgeInput::new(config.odometry.left_pin);
    let right = SoftwareEdgeInput::new(config.odometry.right_pin);

    let rover = RoverBuilder::new()
        .config(config.clone())
        .camera_opener(SyntheticCameraOpener::new(cameras, args.width, args.height))
        .annotator(CrosshairAnnotator::new())
        .metrics_provider(SysinfoProvider::with_thermal_path(
            config.telemetry.thermal_path.clone(),
        ))
        .range_sensor(
            SimulatedRangeSensor::new(
                sensors.short_range.name.clone(),
                sensors.short_range.min_cm,
                sensors.short_range.max_cm,
            )
            .with_dropout(0.05),
        )
        .range_sensor(SimulatedRangeSensor::new(
            sensors.long_range.name.clone(),
            sensors.long_range.min_cm,
            sensors.long_range.max_cm,
        ))
        .drive_direction(direction.clone())
        .encoder_inputs(left.clone(), right.clone())
        .build()
        .context("failed to start rover runtime")?;

    let mut wheels = WheelSimulator::spawn(direction, left, right, args.tick_rate)
        .context("failed to start wheel simulator")?;

    // 模拟传输层：持续取帧并封装成 MJPEG 分段
    let rover = Arc::new(rover);
    let stream_bytes = Arc::new(AtomicU64::new(0));
    let consumer = {
        let rover = rover.clone();
        let running = running.clone();
        let stream_bytes = stream_bytes.clone();
        thread::Builder::new()
            .name("stream-consumer".into())
            .spawn(move || {
                while running.load(Ordering::Acquire) {
                    match rover.next_frame() {
                        FrameResult::Frame(frame) => {
                            let part = mjpeg_part(&frame.data);
                            stream_bytes.fetch_add(part.len() as u64, Ordering::Relaxed);
                        },
                        FrameResult::Timeout => {},
                        FrameResult::Unavailable => {
                            warn!("Video stream unavailable, consumer exiting");
                            break;
                        },
                    }
                }
            })
            .context("failed to spawn stream consumer")?
    };

    let started = Instant::now();
    let push_interval = Duration::from_millis(args.push_interval_ms.max(1));
    let deadline = args.duration.map(Duration::from_secs);
    while running.load(Ordering::Acquire) {
        thread::sleep(push_interval);

        let minimal = rover.get_minimal_stats();
        let (x, y) = rover.get_position();
        let stream = rover.get_stream_stats();
        match serde_json::to_string(&minimal) {
            Ok(json) => info!("stats {}", json),
            Err(e) => warn!("Failed to serialize stats: {}", e),
        }
        info!(
            "position ({:.3}, {:.3}) | stream {:.1} fps {} | sent {} KiB",
            x,
            y,
            stream.fps,
            stream.resolution(),
            stream_bytes.load(Ordering::Relaxed) / 1024
        );
        for name in rover.telemetry().sensor_names() {
            if let Some(reading) = rover.latest_sensor(&name) {
                info!("sensor {} {:?}", name, reading.distance);
            }
        }

        if deadline.is_some_and(|d| started.elapsed() >= d) {
            running.store(false, Ordering::Release);
        }
    }

    wheels.stop();
    if consumer.join().is_err() {
        warn!("Stream consumer panicked");
    }
    match Arc::try_unwrap(rover) {
        Ok(mut rover) => rover.shutdown(),
        Err(_) => warn!("Rover still shared at exit, relying on drop"),
    }
    info!("roverd stopped");
    Ok(())
}
