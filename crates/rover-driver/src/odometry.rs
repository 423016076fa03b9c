//! 里程计（差速驱动航迹推算）
//!
//! 边沿回调只做一次原子自增；[`OdometryIntegrator::integrate`] 每次调用时
//! 原子地读取并清零两个计数器，再做一步运动学更新：
//!
//! ```text
//! distance_per_tick = π · wheel_diameter / ticks_per_revolution
//! dL = left_ticks  · distance_per_tick · left_sign
//! dR = right_ticks · distance_per_tick · right_sign
//! d  = (dL + dR) / 2
//! dθ = (dR - dL) / wheel_separation
//! x' = x + d · cos(θ + dθ/2)
//! y' = y + d · sin(θ + dθ/2)
//! θ' = θ + dθ
//! ```
//!
//! 两个计数都为 0 时不做任何事，也不追加轨迹点。

use crate::config::OdometryConfig;
use crate::error::DriverError;
use crate::worker::{Worker, sleep_while_running};
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use rover_hal::{DriveDirection, EdgeInput, ForwardOnly};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// 差速驱动几何参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WheelGeometry {
    pub wheel_diameter_m: f64,
    pub ticks_per_revolution: u32,
    pub wheel_separation_m: f64,
}

impl WheelGeometry {
    /// 每个脉冲对应的轮缘行程（米）
    pub fn distance_per_tick(&self) -> f64 {
        std::f64::consts::PI * self.wheel_diameter_m / self.ticks_per_revolution as f64
    }
}

impl From<&OdometryConfig> for WheelGeometry {
    fn from(config: &OdometryConfig) -> Self {
        Self {
            wheel_diameter_m: config.wheel_diameter_m,
            ticks_per_revolution: config.ticks_per_revolution,
            wheel_separation_m: config.wheel_separation_m,
        }
    }
}

/// 平面位姿（航向单位为弧度，不做归一化）
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub heading: f64,
}

impl Pose {
    pub fn new(x: f64, y: f64, heading: f64) -> Self {
        Self { x, y, heading }
    }

    /// 一步运动学更新
    ///
    /// `directions` 为左右轮方向（+1 / -1 / 0）。
    pub fn step(&self, ticks: (u64, u64), directions: (i8, i8), geometry: &WheelGeometry) -> Pose {
        let per_tick = geometry.distance_per_tick();
        let d_left = ticks.0 as f64 * per_tick * directions.0 as f64;
        let d_right = ticks.1 as f64 * per_tick * directions.1 as f64;
        let distance = (d_left + d_right) / 2.0;
        let d_heading = (d_right - d_left) / geometry.wheel_separation_m;
        let mid_heading = self.heading + d_heading / 2.0;

        Pose {
            x: self.x + distance * mid_heading.cos(),
            y: self.y + distance * mid_heading.sin(),
            heading: self.heading + d_heading,
        }
    }

    pub fn position(&self) -> (f64, f64) {
        (self.x, self.y)
    }
}

/// 左右轮脉冲计数器
///
/// 边沿回调只调用 `increment_*`（单条原子指令，不阻塞）。
#[derive(Debug, Default)]
pub struct EncoderCounts {
    left: AtomicU64,
    right: AtomicU64,
}

impl EncoderCounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_left(&self) {
        self.left.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_right(&self) {
        self.right.fetch_add(1, Ordering::Relaxed);
    }

    /// 读取并清零
    ///
    /// 每个计数器用一次 `swap(0)`，与并发自增之间不会丢失或重复计数：
    /// 交换之后到达的脉冲留给下一次调用。
    pub fn take(&self) -> (u64, u64) {
        (
            self.left.swap(0, Ordering::AcqRel),
            self.right.swap(0, Ordering::AcqRel),
        )
    }

    /// 只读查看（不清零）
    pub fn peek(&self) -> (u64, u64) {
        (
            self.left.load(Ordering::Acquire),
            self.right.load(Ordering::Acquire),
        )
    }
}

#[derive(Debug)]
struct PathHistory {
    poses: VecDeque<Pose>,
    /// 0 表示不限
    max_len: usize,
    /// 累计追加过的位姿数（含被淘汰的）
    total: u64,
}

impl PathHistory {
    fn new(origin: Pose, max_len: usize) -> Self {
        let mut poses = VecDeque::new();
        poses.push_back(origin);
        Self {
            poses,
            max_len,
            total: 1,
        }
    }

    fn push(&mut self, pose: Pose) {
        if self.max_len > 0 && self.poses.len() >= self.max_len {
            self.poses.pop_front();
        }
        self.poses.push_back(pose);
        self.total += 1;
    }
}

/// 里程计积分器
///
/// `integrate()` 只应由一个"轨迹更新"上下文调用；
/// 查询方法可以在任意线程随时调用。
pub struct OdometryIntegrator {
    geometry: WheelGeometry,
    counts: Arc<EncoderCounts>,
    direction: Arc<dyn DriveDirection>,
    path: Mutex<PathHistory>,
    latest: ArcSwap<Pose>,
}

impl OdometryIntegrator {
    /// 创建积分器
    ///
    /// `direction` 为 `None` 时按"只前进"处理（两轮方向都是 +1）。
    pub fn new(
        geometry: WheelGeometry,
        origin: Pose,
        max_path_len: usize,
        direction: Option<Arc<dyn DriveDirection>>,
    ) -> Self {
        let direction = direction.unwrap_or_else(|| {
            debug!("No drive direction source, assuming forward-only motion");
            Arc::new(ForwardOnly)
        });
        Self {
            geometry,
            counts: Arc::new(EncoderCounts::new()),
            direction,
            path: Mutex::new(PathHistory::new(origin, max_path_len)),
            latest: ArcSwap::from_pointee(origin),
        }
    }

    /// 按配置创建（原点 (0, 0)，初始航向取配置值）
    pub fn from_config(
        config: &OdometryConfig,
        direction: Option<Arc<dyn DriveDirection>>,
    ) -> Self {
        Self::new(
            WheelGeometry::from(config),
            Pose::new(0.0, 0.0, config.initial_heading_rad),
            config.max_path_len,
            direction,
        )
    }

    /// 共享计数器（交给边沿回调）
    pub fn counts(&self) -> Arc<EncoderCounts> {
        self.counts.clone()
    }

    pub fn geometry(&self) -> &WheelGeometry {
        &self.geometry
    }

    /// 执行一步积分，返回最新位姿
    pub fn integrate(&self) -> Pose {
        let ticks = self.counts.take();
        if ticks == (0, 0) {
            return **self.latest.load();
        }

        let directions = self.direction.current_directions();
        let mut path = self.path.lock();
        let previous = path.poses.back().copied().unwrap_or_default();
        let next = previous.step(ticks, directions, &self.geometry);
        path.push(next);
        self.latest.store(Arc::new(next));
        drop(path);

        trace!(
            "Odometry step: ticks=({}, {}) dirs=({}, {}) -> ({:.4}, {:.4}, {:.4})",
            ticks.0, ticks.1, directions.0, directions.1, next.x, next.y, next.heading
        );
        next
    }

    /// 最新位置 (x, y)（无锁）
    pub fn get_position(&self) -> (f64, f64) {
        self.latest.load().position()
    }

    /// 最新完整位姿（无锁）
    pub fn pose(&self) -> Pose {
        **self.latest.load()
    }

    /// 保留的轨迹拷贝（最旧在前）
    pub fn path(&self) -> Vec<Pose> {
        self.path.lock().poses.iter().copied().collect()
    }

    /// 累计追加过的位姿数（单调不减）
    pub fn total_poses(&self) -> u64 {
        self.path.lock().total
    }

    /// 尚未积分的脉冲数
    pub fn pending_ticks(&self) -> (u64, u64) {
        self.counts.peek()
    }

    /// 清空轨迹，从 `origin` 重新开始；未积分的脉冲一并丢弃
    pub fn reset(&self, origin: Pose) {
        let mut path = self.path.lock();
        self.counts.take();
        *path = PathHistory::new(origin, path.max_len);
        self.latest.store(Arc::new(origin));
        info!(
            "Odometry reset to ({:.3}, {:.3}, {:.3})",
            origin.x, origin.y, origin.heading
        );
    }
}

impl std::fmt::Debug for OdometryIntegrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OdometryIntegrator")
            .field("geometry", &self.geometry)
            .field("pose", &self.pose())
            .finish()
    }
}

/// 已注册回调的左右轮编码器输入
///
/// `Drop` 时关闭两路输入，之后的边沿不再计数。
pub struct EncoderInputs {
    left: Box<dyn EdgeInput>,
    right: Box<dyn EdgeInput>,
}

impl EncoderInputs {
    /// 配置去抖动并注册计数回调
    ///
    /// 右轮注册失败时，已注册的左轮会在返回错误前被关闭。
    pub fn attach(
        mut left: Box<dyn EdgeInput>,
        mut right: Box<dyn EdgeInput>,
        counts: Arc<EncoderCounts>,
        debounce: Duration,
    ) -> Result<Self, DriverError> {
        left.set_debounce(debounce);
        right.set_debounce(debounce);

        let left_counts = counts.clone();
        left.on_edge(Arc::new(move || left_counts.increment_left()))?;

        let right_counts = counts;
        if let Err(e) = right.on_edge(Arc::new(move || right_counts.increment_right())) {
            warn!(
                "Failed to register encoder callback on pin {}: {}",
                right.pin(),
                e
            );
            left.close();
            right.close();
            return Err(e.into());
        }

        info!(
            "Wheel encoders attached (left pin {}, right pin {}, debounce {:?})",
            left.pin(),
            right.pin(),
            debounce
        );
        Ok(Self { left, right })
    }

    pub fn pins(&self) -> (u8, u8) {
        (self.left.pin(), self.right.pin())
    }
}

impl Drop for EncoderInputs {
    fn drop(&mut self) {
        self.left.close();
        self.right.close();
        debug!("Wheel encoder inputs released");
    }
}

/// 启动轨迹更新线程：每 `interval` 调用一次 `integrate()`
pub fn spawn_updater(
    odometry: Arc<OdometryIntegrator>,
    interval: Duration,
) -> Result<Worker, DriverError> {
    Worker::spawn("odometry-updater", move |running| {
        while running.load(Ordering::Acquire) {
            odometry.integrate();
            sleep_while_running(&running, interval);
        }
        trace!("Odometry updater loop exited");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;
    use rover_hal::{SharedDirection, SoftwareEdgeInput};

    fn geometry() -> WheelGeometry {
        WheelGeometry {
            wheel_diameter_m: 0.065,
            ticks_per_revolution: 20,
            wheel_separation_m: 0.15,
        }
    }

    fn integrator(direction: Option<Arc<dyn DriveDirection>>) -> OdometryIntegrator {
        OdometryIntegrator::new(geometry(), Pose::new(0.0, 0.0, 0.0), 10_000, direction)
    }

    fn add_ticks(counts: &EncoderCounts, left: u64, right: u64) {
        for _ in 0..left {
            counts.increment_left();
        }
        for _ in 0..right {
            counts.increment_right();
        }
    }

    #[test]
    fn test_one_revolution_straight_ahead() {
        let odo = integrator(None);
        add_ticks(&odo.counts(), 20, 20);

        let pose = odo.integrate();
        assert_relative_eq!(pose.x, 0.204_203_5, epsilon = 1e-6);
        assert_relative_eq!(pose.y, 0.0, epsilon = 1e-12);
        assert_eq!(pose.heading, 0.0);
        assert_eq!(odo.get_position(), (pose.x, pose.y));
    }

    #[test]
    fn test_zero_ticks_is_noop() {
        let odo = integrator(None);
        add_ticks(&odo.counts(), 3, 5);
        let first = odo.integrate();
        let len = odo.path().len();

        let again = odo.integrate();
        assert_eq!(again, first);
        assert_eq!(odo.path().len(), len);
        assert_eq!(odo.total_poses(), 2);
    }

    #[test]
    fn test_turn_in_place() {
        let direction = Arc::new(SharedDirection::new());
        direction.turn_right();
        let odo = integrator(Some(direction));
        add_ticks(&odo.counts(), 10, 10);

        let pose = odo.integrate();
        assert_relative_eq!(pose.x, 0.0, epsilon = 1e-12);
        assert_relative_eq!(pose.y, 0.0, epsilon = 1e-12);
        // 左轮前进、右轮后退：顺时针
        let expected = -2.0 * 10.0 * geometry().distance_per_tick() / 0.15;
        assert_relative_eq!(pose.heading, expected, epsilon = 1e-12);
    }

    #[test]
    fn test_stopped_direction_consumes_ticks() {
        let direction = Arc::new(SharedDirection::new());
        let odo = integrator(Some(direction));
        add_ticks(&odo.counts(), 4, 4);

        let pose = odo.integrate();
        assert_eq!(pose, Pose::new(0.0, 0.0, 0.0));
        assert_eq!(odo.pending_ticks(), (0, 0));
        assert_eq!(odo.total_poses(), 2);
    }

    #[test]
    fn test_path_cap_drops_oldest() {
        let odo = OdometryIntegrator::new(geometry(), Pose::default(), 3, None);
        for _ in 0..5 {
            odo.counts().increment_left();
            odo.integrate();
        }
        let path = odo.path();
        assert_eq!(path.len(), 3);
        assert_eq!(odo.total_poses(), 6);
        assert_eq!(*path.last().unwrap(), odo.pose());
    }

    #[test]
    fn test_reset_clears_path_and_pending() {
        let odo = integrator(None);
        add_ticks(&odo.counts(), 7, 7);
        odo.integrate();
        odo.counts().increment_left();

        let origin = Pose::new(1.0, 2.0, 0.5);
        odo.reset(origin);
        assert_eq!(odo.path(), vec![origin]);
        assert_eq!(odo.pending_ticks(), (0, 0));
        assert_eq!(odo.integrate(), origin);
    }

    #[test]
    fn test_from_config_initial_heading() {
        let odo = OdometryIntegrator::from_config(&OdometryConfig::default(), None);
        add_ticks(&odo.counts(), 20, 20);
        let pose = odo.integrate();
        // 初始航向 π/2：沿 +y 前进
        assert_relative_eq!(pose.x, 0.0, epsilon = 1e-9);
        assert_relative_eq!(pose.y, 0.204_203_5, epsilon = 1e-6);
    }

    #[test]
    fn test_encoder_inputs_count_edges() {
        let counts = Arc::new(EncoderCounts::new());
        let left = SoftwareEdgeInput::new(5);
        let right = SoftwareEdgeInput::new(6);
        let inputs = EncoderInputs::attach(
            Box::new(left.clone()),
            Box::new(right.clone()),
            counts.clone(),
            Duration::ZERO,
        )
        .unwrap();
        assert_eq!(inputs.pins(), (5, 6));

        left.trigger();
        left.trigger();
        right.trigger();
        assert_eq!(counts.peek(), (2, 1));

        drop(inputs);
        left.trigger();
        assert_eq!(counts.take(), (2, 1));
        assert_eq!(counts.peek(), (0, 0));
    }

    #[test]
    fn test_updater_thread_integrates() {
        let odo = Arc::new(integrator(None));
        add_ticks(&odo.counts(), 20, 20);
        let mut worker = spawn_updater(odo.clone(), Duration::from_millis(5)).unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while odo.pending_ticks() != (0, 0) && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        worker.stop();
        assert_relative_eq!(odo.pose().x, 0.204_203_5, epsilon = 1e-6);
    }

    proptest! {
        #[test]
        fn prop_equal_ticks_keep_heading(ticks in 1u64..10_000, heading in -10.0f64..10.0) {
            let start = Pose::new(0.0, 0.0, heading);
            let next = start.step((ticks, ticks), (1, 1), &geometry());
            prop_assert_eq!(next.heading, heading);
        }

        #[test]
        fn prop_no_ticks_lost_across_take(bursts in proptest::collection::vec((0u64..50, 0u64..50), 1..20)) {
            let counts = EncoderCounts::new();
            let mut total = (0u64, 0u64);
            for (l, r) in &bursts {
                add_ticks(&counts, *l, *r);
                let (tl, tr) = counts.take();
                total.0 += tl;
                total.1 += tr;
            }
            let expected = bursts.iter().fold((0, 0), |acc, (l, r)| (acc.0 + l, acc.1 + r));
            prop_assert_eq!(total, expected);
        }
    }
}
