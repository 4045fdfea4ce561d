//! 并发准入控制
//!
//! 用 crossbeam 的有界通道充当计数信号量：通道只用于准入，不传递数据。
//! 发送一个 `()` 即占用一个名额，[`Permit`] 析构时取回。

use crossbeam_channel::{Receiver, Sender, bounded};
use std::sync::atomic::{AtomicUsize, Ordering};

/// 有界准入闸门
#[derive(Debug)]
pub struct Admission {
    name: &'static str,
    slots: Sender<()>,
    returns: Receiver<()>,
    limit: usize,
    peak: AtomicUsize,
}

/// 一个已占用的名额，析构时归还
#[derive(Debug)]
#[must_use = "名额在 Permit 析构时立即归还"]
pub struct Permit<'a> {
    gate: &'a Admission,
}

impl Admission {
    /// 创建闸门，`limit` 为 0 时按 1 处理
    pub fn new(name: &'static str, limit: usize) -> Self {
        let limit = limit.max(1);
        let (slots, returns) = bounded(limit);
        Self { name, slots, returns, limit, peak: AtomicUsize::new(0) }
    }

    /// 阻塞直到获得一个名额
    pub fn acquire(&self) -> Permit<'_> {
        // 闸门自身持有接收端，通道不会断开
        let _ = self.slots.send(());
        self.record_peak();
        Permit { gate: self }
    }

    /// 尝试获得一个名额，闸门已满时返回 `None`
    pub fn try_acquire(&self) -> Option<Permit<'_>> {
        self.slots.try_send(()).ok()?;
        self.record_peak();
        Some(Permit { gate: self })
    }

    fn record_peak(&self) {
        let in_flight = self.slots.len();
        self.peak.fetch_max(in_flight, Ordering::Relaxed);
        tracing::trace!(gate = self.name, in_flight, limit = self.limit, "获得名额");
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// 当前占用的名额数
    pub fn in_flight(&self) -> usize {
        self.slots.len()
    }

    /// 运行期间观察到的最大占用数
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::Relaxed)
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        let _ = self.gate.returns.try_recv();
    }
}
