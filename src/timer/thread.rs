//! 后台定时器线程
//!
//! 驱动环境里槽定时器在软中断上下文触发；这里用一个独立线程模拟：
//! 睡到最近的截止时间，然后调用 [`TcpAckSup::run_timers`]，它自己获取模块锁。

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::debug;

use crate::sup::TcpAckSup;

/// 周期驱动 [`TcpAckSup::run_timers`] 的线程句柄；drop 时停止并 join。
#[derive(Debug)]
pub struct TimerThread {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl TimerThread {
    /// 启动线程。`poll` 是没有布防定时器时的最长睡眠间隔；
    /// 睡眠期间新布防的定时器会立即唤醒线程。
    pub fn spawn(sup: Arc<TcpAckSup>, poll: Duration) -> io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name("tcpack-timer".into())
            .spawn(move || {
                debug!("定时器线程启动");
                // 先登记再读截止时间：之后布防的定时器都会唤醒本线程
                sup.set_timer_waker(Some(thread::current()));
                while !stop_flag.load(Ordering::Acquire) {
                    let fired = sup.run_timers();
                    if fired > 0 {
                        debug!(fired, "槽定时器到期");
                    }
                    let wait = sup
                        .next_timer_in()
                        .map(Duration::from_millis)
                        .map_or(poll, |d| d.min(poll));
                    thread::park_timeout(wait.max(Duration::from_millis(1)));
                }
                sup.set_timer_waker(None);
                debug!("定时器线程退出");
            })?;
        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    /// 停止线程并等待其退出。
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            handle.thread().unpark();
            let _ = handle.join();
        }
    }
}

impl Drop for TimerThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}
