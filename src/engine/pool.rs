//! 缓冲区对象池
//!
//! 读块用的字节缓冲和转换用的字符串都从池中租借。租约 [`Lease`] 在
//! [`Lease::release`] 或析构时把对象清空后放回池中，归还之后借用检查器
//! 保证不会再被读取。

use std::ops::{Deref, DerefMut};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// 可以放回池中复用的对象
pub trait Recycle: Default + Send {
    fn with_capacity(capacity: usize) -> Self;
    fn clear(&mut self);
    fn capacity(&self) -> usize;
}

impl Recycle for Vec<u8> {
    fn with_capacity(capacity: usize) -> Self {
        Vec::with_capacity(capacity)
    }

    fn clear(&mut self) {
        Vec::clear(self)
    }

    fn capacity(&self) -> usize {
        Vec::capacity(self)
    }
}

impl Recycle for String {
    fn with_capacity(capacity: usize) -> Self {
        String::with_capacity(capacity)
    }

    fn clear(&mut self) {
        String::clear(self)
    }

    fn capacity(&self) -> usize {
        String::capacity(self)
    }
}

/// 对象池
#[derive(Debug)]
pub struct Pool<T: Recycle> {
    free: Mutex<Vec<T>>,
    initial_capacity: usize,
    max_retained: usize,
    max_capacity: usize,
    created: AtomicUsize,
}

impl<T: Recycle> Pool<T> {
    /// 创建对象池
    ///
    /// * `initial_capacity` - 新建对象的初始容量
    /// * `max_retained` - 池中最多保留的空闲对象数
    ///
    /// 容量超过 `initial_capacity` 四倍的对象归还时直接丢弃。
    pub fn new(initial_capacity: usize, max_retained: usize) -> Self {
        Self {
            free: Mutex::new(Vec::new()),
            initial_capacity,
            max_retained,
            max_capacity: initial_capacity.saturating_mul(4),
            created: AtomicUsize::new(0),
        }
    }

    /// 租借一个空对象
    pub fn lease(&self) -> Lease<'_, T> {
        let reused = self.free.lock().ok().and_then(|mut free| free.pop());
        let item = reused.unwrap_or_else(|| {
            self.created.fetch_add(1, Ordering::Relaxed);
            T::with_capacity(self.initial_capacity)
        });
        Lease { item, pool: self }
    }

    fn put_back(&self, mut item: T) {
        if item.capacity() > self.max_capacity {
            return;
        }
        item.clear();
        if let Ok(mut free) = self.free.lock() {
            if free.len() < self.max_retained {
                free.push(item);
            }
        }
    }

    /// 累计新建的对象数
    pub fn created(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }

    /// 当前空闲的对象数
    pub fn idle(&self) -> usize {
        self.free.lock().map(|free| free.len()).unwrap_or(0)
    }
}

/// 池对象的租约
#[derive(Debug)]
pub struct Lease<'p, T: Recycle> {
    item: T,
    pool: &'p Pool<T>,
}

impl<T: Recycle> Lease<'_, T> {
    /// 显式归还
    pub fn release(self) {}
}

impl<T: Recycle> Deref for Lease<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.item
    }
}

impl<T: Recycle> DerefMut for Lease<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.item
    }
}

impl<T: Recycle> Drop for Lease<'_, T> {
    fn drop(&mut self) {
        self.pool.put_back(std::mem::take(&mut self.item));
    }
}
