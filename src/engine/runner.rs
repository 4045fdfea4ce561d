//! 摄取引擎
//!
//! 架构：
//! 1. 文件级闸门限制同时处理的文件数，每个文件一个线程
//! 2. 每个文件先过校验闸门，再按块读取
//! 3. 块级闸门在所有文件之间共享，限制同时处理的块数
//! 4. 文件、块、子批次三级都在本级恢复 panic，不影响兄弟任务

use super::admission::Admission;
use super::chunk::ChunkProcessor;
use super::pool::Pool;
use super::reader::ChunkReader;
use super::types::{
    CancelToken, EngineLimits, FileReport, LineCounters, LineSink, RunReport,
};
use super::validate::validate_sample;
use crate::error::{AnalysisError, Result};
use crate::error_writer::ErrorWriter;
use std::fs::File;
use std::io::{BufReader, Seek, SeekFrom};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Instant;

/// 池中最多保留的空闲对象数（相对块并发数的倍数）
const POOL_RETAIN_FACTOR: usize = 2;

/// 并发日志摄取引擎
///
/// 每次运行构建一个实例，准入闸门和对象池都属于该实例，运行之间互不干扰。
pub struct IngestionEngine {
    limits: EngineLimits,
    files: Admission,
    chunks: Admission,
    buffers: Pool<Vec<u8>>,
    strings: Pool<String>,
    cancel: CancelToken,
    error_writer: Option<Arc<ErrorWriter>>,
}

impl IngestionEngine {
    pub fn new(limits: EngineLimits) -> Self {
        let chunk_workers = if limits.chunk_workers == 0 {
            EngineLimits::default_chunk_workers()
        } else {
            limits.chunk_workers
        };
        let retained = chunk_workers * POOL_RETAIN_FACTOR;
        // 块末尾补齐行和吸收续行会超出块大小，预留一些余量
        let buffer_capacity = limits.chunk_size_bytes + limits.chunk_size_bytes / 4;

        Self {
            files: Admission::new("files", limits.max_concurrent_files),
            chunks: Admission::new("chunks", chunk_workers),
            buffers: Pool::new(buffer_capacity, retained),
            strings: Pool::new(buffer_capacity, retained),
            cancel: CancelToken::new(),
            error_writer: None,
            limits,
        }
    }

    /// 使用外部的取消标志
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// 把被拒绝的文件、处理失败的行和处理异常写入 JSONL
    pub fn with_error_writer(mut self, writer: Arc<ErrorWriter>) -> Self {
        self.error_writer = Some(writer);
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn limits(&self) -> &EngineLimits {
        &self.limits
    }

    /// 文件级闸门观察到的最大并发数
    pub fn peak_files(&self) -> usize {
        self.files.peak()
    }

    /// 块级闸门观察到的最大并发数
    pub fn peak_chunks(&self) -> usize {
        self.chunks.peak()
    }

    /// 处理一组文件
    ///
    /// 每一行依次交给 `sinks` 中的每个消费者，成功数按消费者分别统计。
    /// 单个文件的失败只记录在报告里，不会中断运行。
    pub fn run<P>(
        &self,
        files: &[P],
        sinks: &[&dyn LineSink],
        validator: &dyn LineSink,
    ) -> RunReport
    where
        P: AsRef<Path> + Sync,
    {
        let start = Instant::now();
        tracing::info!(
            files = files.len(),
            sinks = sinks.len(),
            max_files = self.files.limit(),
            max_chunks = self.chunks.limit(),
            "开始处理日志文件"
        );

        let reports: Mutex<Vec<(usize, FileReport)>> =
            Mutex::new(Vec::with_capacity(files.len()));

        thread::scope(|scope| {
            for (index, path) in files.iter().enumerate() {
                if self.cancel.is_cancelled() {
                    tracing::info!("收到取消信号，不再派发新文件");
                    break;
                }

                let permit = self.files.acquire();
                let reports = &reports;
                scope.spawn(move || {
                    let _permit = permit;
                    let report =
                        self.process_file(path.as_ref(), sinks, validator);
                    if let Ok(mut reports) = reports.lock() {
                        reports.push((index, report));
                    }
                });
            }
        });

        let mut reports = reports.into_inner().unwrap_or_default();
        reports.sort_by_key(|(index, _)| *index);
        let files = reports.into_iter().map(|(_, report)| report).collect();

        let report = RunReport::from_files(
            sinks.len(),
            files,
            start.elapsed(),
            self.cancel.is_cancelled(),
        );
        tracing::info!(
            total_lines = report.total_lines,
            success_lines = ?report.success_lines,
            failed_files = report.file_errors.len(),
            elapsed = ?report.elapsed,
            "日志文件处理完成"
        );
        report
    }

    fn process_file(
        &self,
        path: &Path,
        sinks: &[&dyn LineSink],
        validator: &dyn LineSink,
    ) -> FileReport {
        let counters = LineCounters::new(sinks.len());
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            self.ingest_file(path, sinks, validator, &counters)
        }));

        let error = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(e)) => {
                tracing::warn!(file = %path.display(), error = %e, "文件处理失败");
                Some(e)
            }
            Err(payload) => {
                let fault = AnalysisError::fault(payload);
                tracing::error!(file = %path.display(), error = %fault, "文件处理异常，已恢复");
                Some(fault)
            }
        };

        if let (Some(e), Some(writer)) = (&error, &self.error_writer) {
            writer.write_file_error(path, e);
        }

        FileReport {
            path: path.to_path_buf(),
            total_lines: counters.total(),
            success_lines: counters.success(),
            error: error.map(|e| e.to_string()),
        }
    }

    fn ingest_file(
        &self,
        path: &Path,
        sinks: &[&dyn LineSink],
        validator: &dyn LineSink,
        counters: &LineCounters,
    ) -> Result<()> {
        let file = File::open(path)
            .map_err(|e| AnalysisError::file_rejected(path, e.to_string()))?;
        let metadata = file.metadata()?;
        if !metadata.is_file() {
            return Err(AnalysisError::file_rejected(path, "not a regular file"));
        }
        if metadata.len() > self.limits.max_file_size_bytes {
            return Err(AnalysisError::file_rejected(
                path,
                format!(
                    "size of this file is {} bytes, files larger than {} bytes are not supported",
                    metadata.len(),
                    self.limits.max_file_size_bytes
                ),
            ));
        }
        if metadata.len() == 0 {
            tracing::debug!(file = %path.display(), "空文件，跳过");
            return Ok(());
        }

        let mut reader =
            BufReader::with_capacity(self.limits.chunk_size_bytes.max(8 * 1024), file);
        validate_sample(
            &mut reader,
            path,
            validator,
            self.limits.validation_sample_lines,
            self.limits.validation_failure_percent,
            &self.cancel,
        )?;
        reader.seek(SeekFrom::Start(0)).map_err(|e| {
            AnalysisError::file_rejected(path, format!("seek failed: {e}"))
        })?;

        let mut chunks =
            ChunkReader::new(reader, &self.buffers, self.limits.chunk_size_bytes);
        let processor = ChunkProcessor {
            path,
            strings: &self.strings,
            sinks,
            counters,
            batch_lines: self.limits.batch_lines,
            cancel: &self.cancel,
            errors: self.error_writer.as_deref(),
        };

        let read_result = thread::scope(|scope| -> Result<()> {
            loop {
                if self.cancel.is_cancelled() {
                    tracing::info!(file = %path.display(), "收到取消信号，停止读取");
                    return Ok(());
                }
                let Some(chunk) = chunks.next_chunk()? else {
                    return Ok(());
                };

                let permit = self.chunks.acquire();
                let processor = &processor;
                scope.spawn(move || {
                    let _permit = permit;
                    let outcome =
                        catch_unwind(AssertUnwindSafe(|| processor.process(chunk)));
                    if let Err(payload) = outcome {
                        let fault = AnalysisError::fault(payload);
                        tracing::error!(file = %path.display(), error = %fault, "数据块处理异常，已恢复");
                        if let Some(writer) = &self.error_writer {
                            writer.write_file_error(path, &fault);
                        }
                    }
                });
            }
        });

        tracing::debug!(
            file = %path.display(),
            chunks = chunks.chunks_read(),
            total = counters.total(),
            "文件处理完成"
        );
        read_result
    }
}
