//! 数据块处理
//!
//! 块内的字节先转换成池中的字符串，随即归还字节缓冲；再按换行切分并把
//! 制表符开头的行并入前一行，最后按固定大小的子批次分发给工作线程。

use super::pool::{Lease, Pool};
use super::types::{CancelToken, LineCounters, LineSink};
use crate::error::AnalysisError;
use crate::error_writer::ErrorWriter;
use std::borrow::Cow;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

/// 每个块内并行处理子批次的最大线程数
const MAX_BATCH_WORKERS: usize = 4;

/// 把续行并入前一行
///
/// 续行直接拼接（保留开头的制表符），不插入换行。第一行之前没有可并入
/// 的行，以制表符开头时原样保留，由后续处理跳过。
pub fn merge_continuations(text: &str) -> Vec<Cow<'_, str>> {
    let mut merged: Vec<Cow<'_, str>> = Vec::new();
    for line in text.split('\n') {
        let line = line.strip_suffix('\r').unwrap_or(line);
        match merged.last_mut() {
            Some(previous) if line.starts_with('\t') => {
                previous.to_mut().push_str(line);
            }
            _ => merged.push(Cow::Borrowed(line)),
        }
    }
    merged
}

/// 单个块的处理上下文
pub struct ChunkProcessor<'a> {
    pub path: &'a Path,
    pub strings: &'a Pool<String>,
    pub sinks: &'a [&'a dyn LineSink],
    pub counters: &'a LineCounters,
    pub batch_lines: usize,
    pub cancel: &'a CancelToken,
    /// 设置后，处理失败的行写入错误文件
    pub errors: Option<&'a ErrorWriter>,
}

impl ChunkProcessor<'_> {
    /// 处理一个块；子批次中的 panic 在批次内恢复
    pub fn process(&self, chunk: Lease<'_, Vec<u8>>) {
        let mut text = self.strings.lease();
        text.push_str(&String::from_utf8_lossy(&chunk));
        chunk.release();

        let lines = merge_continuations(&text);
        let batch = self.batch_lines.max(1);
        let batches = lines.len().div_ceil(batch);
        let workers = batches.min(MAX_BATCH_WORKERS);
        let cursor = AtomicUsize::new(0);

        thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| {
                    loop {
                        if self.cancel.is_cancelled() {
                            return;
                        }
                        let index = cursor.fetch_add(1, Ordering::Relaxed);
                        if index >= batches {
                            return;
                        }
                        let start = index * batch;
                        let end = (start + batch).min(lines.len());
                        self.run_batch(&lines[start..end]);
                    }
                });
            }
        });

        drop(lines);
        text.release();
    }

    fn run_batch(&self, batch: &[Cow<'_, str>]) {
        let mut failures = Vec::new();
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            for line in batch {
                if self.cancel.is_cancelled() {
                    return;
                }
                if let Some(error) = self.dispatch(line) {
                    if self.errors.is_some() {
                        failures.push((line.to_string(), error));
                    }
                }
            }
        }));

        if let Some(writer) = self.errors {
            writer.write_line_errors(self.path, &failures);
        }

        if let Err(payload) = outcome {
            let fault = AnalysisError::fault(payload);
            tracing::error!(
                file = %self.path.display(),
                error = %fault,
                "子批次处理异常，已恢复"
            );
        }
    }

    /// 分发一行，返回第一个失败的消费者给出的错误
    fn dispatch(&self, line: &str) -> Option<AnalysisError> {
        if line.is_empty() {
            return None;
        }
        if line.starts_with('\t') {
            tracing::warn!(
                file = %self.path.display(),
                line,
                "续行未能合并，跳过"
            );
            return None;
        }

        self.counters.add_total();
        let mut first_error = None;
        for (index, sink) in self.sinks.iter().enumerate() {
            match sink.feed(line) {
                Ok(()) => self.counters.add_success(index),
                Err(e) => {
                    tracing::debug!(
                        file = %self.path.display(),
                        sink = index,
                        error = %e,
                        line,
                        "行处理失败"
                    );
                    first_error.get_or_insert(e);
                }
            }
        }
        first_error
    }
}
