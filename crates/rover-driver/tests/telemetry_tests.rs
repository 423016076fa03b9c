//! 遥测采样集成测试
//!
//! 环形缓冲区的 FIFO 淘汰 / 节流性质，以及多读者并发访问。

use rover_driver::{Distance, Metric, SensorReading, TelemetrySampler, ThrottledRing};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// 间隔不小于节流周期的 N 次写入：只保留最近 capacity 个
#[test]
fn test_fifo_eviction_law() {
    let ring = ThrottledRing::new(60, Duration::from_millis(500));
    let t0 = Instant::now();
    for i in 0..150u32 {
        assert!(ring.record_at(i, t0 + Duration::from_millis(500 * i as u64)));
    }
    let snapshot = ring.snapshot();
    assert_eq!(snapshot.len(), 60);
    assert_eq!(snapshot, (90..150).collect::<Vec<_>>());
    assert_eq!(ring.latest(), Some(149));
}

/// 500 ms 内的两次写入：历史只有第一次，latest 是第二次
#[test]
fn test_throttle_vs_latest() {
    let telemetry = TelemetrySampler::default();
    assert!(telemetry.record(&Metric::Temperature, 51.0));
    assert!(!telemetry.record(&Metric::Temperature, 52.5));
    assert_eq!(telemetry.snapshot(&Metric::Temperature), vec![51.0]);
    assert_eq!(telemetry.latest(&Metric::Temperature), Some(52.5));

    let minimal = telemetry.get_minimal_stats();
    assert_eq!(minimal.temperature, Some(52.5));
}

/// 多个请求线程并发读取，同时一个写入线程高频写入
#[test]
fn test_concurrent_readers_and_writer() {
    let telemetry = Arc::new(TelemetrySampler::new(10, Duration::ZERO, 80.0));
    let writer = {
        let telemetry = telemetry.clone();
        thread::spawn(move || {
            for i in 0..5_000 {
                telemetry.record(&Metric::Cpu, (i % 100) as f32);
                telemetry.record_sensor(
                    "lidar",
                    SensorReading::new(Distance::Valid(i as f32), i as f64),
                );
            }
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let telemetry = telemetry.clone();
            thread::spawn(move || {
                for _ in 0..1_000 {
                    let stats = telemetry.get_stats();
                    assert!(stats.cpu.history.len() <= 10);
                    let _ = telemetry.get_minimal_stats();
                    let _ = telemetry.latest_sensor("lidar");
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for r in readers {
        r.join().unwrap();
    }

    assert_eq!(telemetry.snapshot(&Metric::Cpu).len(), 10);
    assert_eq!(
        telemetry.latest_sensor("lidar").unwrap().distance,
        Distance::Valid(4_999.0)
    );
}

/// JSON 推送格式：完整统计包含各传感器最新读数
#[test]
fn test_system_stats_json() {
    let telemetry = TelemetrySampler::default();
    telemetry.record(&Metric::Cpu, 10.0);
    telemetry.record_sensor("ultrasonic", SensorReading::new(Distance::Error, 1.5));

    let json = serde_json::to_value(telemetry.get_stats()).unwrap();
    assert_eq!(json["cpu"]["usage"], 10.0);
    assert_eq!(json["cpu"]["history"].as_array().unwrap().len(), 1);
    assert_eq!(json["sensors"]["ultrasonic"]["distance"]["status"], "error");
    assert_eq!(json["temperature"]["is_critical"], false);
}
