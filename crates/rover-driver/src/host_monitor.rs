//! 主机指标采样线程
//!
//! 周期性读取 CPU / 内存 / 温度写入 [`TelemetrySampler`]。
//! 读取失败保留上一次的值，只在"正常 → 失败"切换时告警一次。

use crate::error::DriverError;
use crate::telemetry::{Metric, TelemetrySampler};
use crate::worker::{Worker, sleep_while_running};
use rover_hal::MetricsProvider;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// 主机指标采样器（单次采样逻辑，线程外也可直接调用）
pub struct HostMonitor {
    provider: Box<dyn MetricsProvider>,
    telemetry: Arc<TelemetrySampler>,
    last_cpu: Option<f32>,
    failing: [bool; 3],
}

impl HostMonitor {
    pub fn new(provider: Box<dyn MetricsProvider>, telemetry: Arc<TelemetrySampler>) -> Self {
        Self {
            provider,
            telemetry,
            last_cpu: None,
            failing: [false; 3],
        }
    }

    /// 采样一次
    ///
    /// CPU 读数恰好为 0.0 时沿用上一个值（操作系统计数器首次采样通常为 0）。
    pub fn sample_once(&mut self) {
        match self.provider.cpu_percent() {
            Ok(cpu) => {
                self.recovered(0, &Metric::Cpu);
                let value = if cpu == 0.0 {
                    self.last_cpu.unwrap_or(0.0)
                } else {
                    cpu
                };
                self.last_cpu = Some(value);
                self.telemetry.record(&Metric::Cpu, value);
            },
            Err(e) => self.failed(0, &Metric::Cpu, &e),
        }

        match self.provider.memory() {
            Ok(memory) => {
                self.recovered(1, &Metric::Memory);
                self.telemetry.set_memory_details(memory);
                self.telemetry.record(&Metric::Memory, memory.percent);
            },
            Err(e) => self.failed(1, &Metric::Memory, &e),
        }

        match self.provider.temperature_c() {
            Ok(celsius) => {
                self.recovered(2, &Metric::Temperature);
                self.telemetry.record(&Metric::Temperature, celsius);
            },
            Err(e) => self.failed(2, &Metric::Temperature, &e),
        }
    }

    /// 刷新 CPU 静态信息（核心数 / 频率）
    pub fn refresh_cpu_info(&mut self) {
        let info = self.provider.cpu_info();
        debug!(
            "CPU info: {} cores, {} threads, {} MHz",
            info.cores, info.threads, info.frequency_mhz
        );
        self.telemetry.set_cpu_info(info);
    }

    fn failed(&mut self, slot: usize, metric: &Metric, err: &rover_hal::HalError) {
        if !self.failing[slot] {
            warn!("Failed to read {} metric: {}, keeping last value", metric, err);
            self.failing[slot] = true;
        } else {
            trace!("{} metric still unavailable: {}", metric, err);
        }
    }

    fn recovered(&mut self, slot: usize, metric: &Metric) {
        if self.failing[slot] {
            info!("{} metric readable again", metric);
            self.failing[slot] = false;
        }
    }
}

/// 启动主机指标采样线程
///
/// CPU 静态信息（频率会变化）每 `cpu_info_every` 刷新一次。
pub fn spawn_host_monitor(
    mut monitor: HostMonitor,
    interval: Duration,
    cpu_info_every: Duration,
) -> Result<Worker, DriverError> {
    Worker::spawn("host-monitor", move |running| {
        monitor.refresh_cpu_info();
        let mut last_info = Instant::now();

        while running.load(Ordering::Acquire) {
            let cycle_start = Instant::now();
            monitor.sample_once();
            if last_info.elapsed() >= cpu_info_every {
                monitor.refresh_cpu_info();
                last_info = Instant::now();
            }
            let spent = cycle_start.elapsed();
            sleep_while_running(&running, interval.saturating_sub(spent));
        }
        trace!("Host monitor loop exited");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rover_hal::{CpuInfo, HalError, MemoryInfo};

    /// 逐次返回脚本值的提供者
    struct SequenceProvider {
        cpu: Vec<Result<f32, ()>>,
    }

    impl MetricsProvider for SequenceProvider {
        fn cpu_percent(&mut self) -> Result<f32, HalError> {
            if self.cpu.is_empty() {
                return Err(HalError::Timeout);
            }
            self.cpu.remove(0).map_err(|_| HalError::Timeout)
        }

        fn memory(&mut self) -> Result<MemoryInfo, HalError> {
            Ok(MemoryInfo::from_bytes(100, 40, 60, 40))
        }

        fn temperature_c(&mut self) -> Result<f32, HalError> {
            Err(HalError::Unsupported("no thermal zone".into()))
        }

        fn cpu_info(&mut self) -> CpuInfo {
            CpuInfo {
                cores: 4,
                threads: 8,
                frequency_mhz: 1800,
            }
        }
    }

    #[test]
    fn test_zero_cpu_keeps_previous_value() {
        let telemetry = Arc::new(TelemetrySampler::default());
        let provider = SequenceProvider {
            cpu: vec![Ok(25.0), Ok(0.0), Err(()), Ok(40.0)],
        };
        let mut monitor = HostMonitor::new(Box::new(provider), telemetry.clone());

        monitor.sample_once();
        assert_eq!(telemetry.latest(&Metric::Cpu), Some(25.0));
        monitor.sample_once();
        assert_eq!(telemetry.latest(&Metric::Cpu), Some(25.0));
        monitor.sample_once();
        assert_eq!(telemetry.latest(&Metric::Cpu), Some(25.0));
        monitor.sample_once();
        assert_eq!(telemetry.latest(&Metric::Cpu), Some(40.0));
    }

    #[test]
    fn test_memory_and_missing_temperature() {
        let telemetry = Arc::new(TelemetrySampler::default());
        let mut monitor = HostMonitor::new(
            Box::new(SequenceProvider { cpu: vec![] }),
            telemetry.clone(),
        );
        monitor.sample_once();
        monitor.refresh_cpu_info();

        assert_eq!(telemetry.latest(&Metric::Memory), Some(60.0));
        assert_eq!(telemetry.memory_details().total, 100);
        assert_eq!(telemetry.latest(&Metric::Temperature), None);
        assert_eq!(telemetry.latest(&Metric::Cpu), None);
        assert_eq!(telemetry.cpu_info().threads, 8);
    }
}
