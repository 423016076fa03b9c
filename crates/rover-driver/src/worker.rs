//! 后台线程句柄
//!
//! 每个采集循环都是一个具名线程，通过共享的 `AtomicBool` 协作式停止，
//! 并在 `Drop` 时带超时 join。

use crate::error::DriverError;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{error, info};

/// 默认 join 超时
pub const JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Extension trait for timeout-capable thread joins
pub(crate) trait JoinTimeout {
    fn join_timeout(self, timeout: Duration) -> thread::Result<()>;
}

impl<T: Send + 'static> JoinTimeout for JoinHandle<T> {
    fn join_timeout(self, timeout: Duration) -> thread::Result<()> {
        use std::sync::mpsc;

        let (tx, rx) = mpsc::channel();

        // watchdog 线程负责真正的 join，超时后由它继续等待
        thread::spawn(move || {
            let result = self.join();
            let _ = tx.send(result);
        });

        match rx.recv_timeout(timeout) {
            Ok(join_result) => join_result.map(|_| ()),
            Err(mpsc::RecvTimeoutError::Timeout) => Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "Thread join timeout",
            ))),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "Thread panicked during join",
            ))),
        }
    }
}

/// 后台循环句柄
pub struct Worker {
    name: String,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    /// 启动具名线程
    ///
    /// 循环体收到运行标志，每轮检查一次；标志为 false 时应尽快返回。
    /// 线程创建失败时闭包（以及它捕获的硬件句柄）会被直接释放。
    pub fn spawn<F>(name: impl Into<String>, body: F) -> Result<Self, DriverError>
    where
        F: FnOnce(Arc<AtomicBool>) + Send + 'static,
    {
        let name = name.into();
        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || body(flag))
            .map_err(DriverError::ThreadSpawn)?;
        info!("{} thread started", name);

        Ok(Self {
            name,
            running,
            handle: Some(handle),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 线程仍在运行（未被要求停止，且没有自行退出）
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
            && self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// 请求停止并等待退出（可重复调用）
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);

        if let Some(handle) = self.handle.take() {
            if let Err(_e) = handle.join_timeout(JOIN_TIMEOUT) {
                error!(
                    "{} thread panicked or failed to shut down within {:?}",
                    self.name, JOIN_TIMEOUT
                );
            } else {
                info!("{} thread stopped", self.name);
            }
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("name", &self.name)
            .field("running", &self.is_running())
            .finish()
    }
}

/// 按固定周期睡眠，可被停止标志提前打断
///
/// 长睡眠拆成小片，保证 `stop()` 的响应时间不超过一个切片。
pub(crate) fn sleep_while_running(running: &AtomicBool, total: Duration) {
    const SLICE: Duration = Duration::from_millis(20);
    let mut remaining = total;
    while remaining > Duration::ZERO && running.load(Ordering::Acquire) {
        let step = remaining.min(SLICE);
        spin_sleep::sleep(step);
        remaining = remaining.saturating_sub(step);
    }
}
