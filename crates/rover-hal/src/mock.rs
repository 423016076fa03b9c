//! Mock 硬件接口
//!
//! 用于测试的脚本化摄像头、指标提供者和测距传感器。
//! 所有替身都通过 `Arc` 共享内部状态，测试代码可以在对象被移动到
//! 采集线程之后继续观察/注入行为。

use crate::camera::{CameraOpener, CameraSource, CameraSpec, RawFrame};
use crate::host::{CpuInfo, MemoryInfo, MetricsProvider};
use crate::range::RangeSensor;
use crate::{DeviceError, DeviceErrorKind, HalError};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// 单次读帧的脚本化结果
#[derive(Debug, Clone)]
pub enum MockRead {
    /// 正常帧
    Frame(RawFrame),
    /// 瞬时失败（采集循环应记录日志并继续）
    Transient,
    /// 设备消失（采集循环应终止）
    Gone,
}

/// 摄像头打开/释放计数
#[derive(Debug, Default)]
pub struct MockCameraStats {
    pub opens: AtomicUsize,
    pub releases: AtomicUsize,
    pub reads: AtomicUsize,
}

/// 脚本化摄像头打开器
#[derive(Clone)]
pub struct MockCameraOpener {
    available: Vec<CameraSpec>,
    width: u32,
    height: u32,
    script: Arc<Mutex<VecDeque<MockRead>>>,
    stats: Arc<MockCameraStats>,
}

impl MockCameraOpener {
    /// 创建打开器：`available` 中的设备可以打开，帧尺寸为 `width x height`
    ///
    /// 脚本耗尽后，摄像头持续返回纯灰色帧。
    pub fn new(available: Vec<CameraSpec>, width: u32, height: u32) -> Self {
        Self {
            available,
            width,
            height,
            script: Arc::new(Mutex::new(VecDeque::new())),
            stats: Arc::new(MockCameraStats::default()),
        }
    }

    /// 没有任何可打开设备
    pub fn none() -> Self {
        Self::new(Vec::new(), 0, 0)
    }

    /// 追加脚本化的读帧结果
    pub fn push(&self, read: MockRead) {
        self.script.lock().push_back(read);
    }

    pub fn stats(&self) -> Arc<MockCameraStats> {
        self.stats.clone()
    }
}

impl CameraOpener for MockCameraOpener {
    fn open(&self, spec: &CameraSpec) -> Result<Box<dyn CameraSource + Send>, HalError> {
        if !self.available.contains(spec) {
            return Err(HalError::Device(DeviceError::new(
                DeviceErrorKind::NotFound,
                format!("mock device {} not present", spec),
            )));
        }
        self.stats.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockCamera {
            width: self.width,
            height: self.height,
            script: self.script.clone(),
            stats: self.stats.clone(),
        }))
    }
}

/// 脚本化摄像头
pub struct MockCamera {
    width: u32,
    height: u32,
    script: Arc<Mutex<VecDeque<MockRead>>>,
    stats: Arc<MockCameraStats>,
}

impl CameraSource for MockCamera {
    fn read_frame(&mut self) -> Result<RawFrame, HalError> {
        self.stats.reads.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().pop_front();
        match next {
            Some(MockRead::Frame(frame)) => Ok(frame),
            Some(MockRead::Transient) => Err(HalError::Timeout),
            Some(MockRead::Gone) => Err(HalError::Device(DeviceError::new(
                DeviceErrorKind::NoDevice,
                "mock camera unplugged",
            ))),
            None => Ok(RawFrame::filled(self.width, self.height, [128, 128, 128])),
        }
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl Drop for MockCamera {
    fn drop(&mut self) {
        self.stats.releases.fetch_add(1, Ordering::SeqCst);
    }
}

/// 可注入数值与故障的指标提供者
#[derive(Clone, Default)]
pub struct MockMetrics {
    inner: Arc<Mutex<MockMetricsState>>,
}

#[derive(Default)]
struct MockMetricsState {
    cpu: f32,
    memory: MemoryInfo,
    temperature: f32,
    cpu_info: CpuInfo,
    failing: bool,
}

impl MockMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_cpu(&self, value: f32) {
        self.inner.lock().cpu = value;
    }

    pub fn set_memory(&self, info: MemoryInfo) {
        self.inner.lock().memory = info;
    }

    pub fn set_temperature(&self, value: f32) {
        self.inner.lock().temperature = value;
    }

    pub fn set_cpu_info(&self, info: CpuInfo) {
        self.inner.lock().cpu_info = info;
    }

    /// 之后的所有读取都返回错误
    pub fn set_failing(&self, failing: bool) {
        self.inner.lock().failing = failing;
    }
}

impl MetricsProvider for MockMetrics {
    fn cpu_percent(&mut self) -> Result<f32, HalError> {
        let state = self.inner.lock();
        if state.failing {
            return Err(HalError::Timeout);
        }
        Ok(state.cpu)
    }

    fn memory(&mut self) -> Result<MemoryInfo, HalError> {
        let state = self.inner.lock();
        if state.failing {
            return Err(HalError::Timeout);
        }
        Ok(state.memory)
    }

    fn temperature_c(&mut self) -> Result<f32, HalError> {
        let state = self.inner.lock();
        if state.failing {
            return Err(HalError::Timeout);
        }
        Ok(state.temperature)
    }

    fn cpu_info(&mut self) -> CpuInfo {
        self.inner.lock().cpu_info
    }
}

/// 脚本化测距传感器
///
/// 脚本耗尽后返回 `Timeout`。
#[derive(Clone)]
pub struct ScriptedRangeSensor {
    name: String,
    range: (f32, f32),
    script: Arc<Mutex<VecDeque<Result<f32, ()>>>>,
}

impl ScriptedRangeSensor {
    pub fn new(name: impl Into<String>, min_cm: f32, max_cm: f32) -> Self {
        Self {
            name: name.into(),
            range: (min_cm, max_cm),
            script: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    pub fn push_distance(&self, cm: f32) {
        self.script.lock().push_back(Ok(cm));
    }

    pub fn push_failure(&self) {
        self.script.lock().push_back(Err(()));
    }
}

impl RangeSensor for ScriptedRangeSensor {
    fn name(&self) -> &str {
        &self.name
    }

    fn valid_range_cm(&self) -> (f32, f32) {
        self.range
    }

    fn read_cm(&mut self) -> Result<f32, HalError> {
        match self.script.lock().pop_front() {
            Some(Ok(cm)) => Ok(cm),
            Some(Err(())) => Err(HalError::Device(DeviceError::new(
                DeviceErrorKind::Backend,
                "scripted sensor failure",
            ))),
            None => Err(HalError::Timeout),
        }
    }
}
