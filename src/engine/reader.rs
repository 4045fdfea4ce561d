//! 分块读取
//!
//! 每次从文件读取固定大小的原始字节，然后补齐当前物理行，再吸收紧随其后
//! 的所有以制表符开头的续行。读到的第一个非续行留作下一块的开头。
//! 因此每个块都在逻辑行边界结束，续行永远不会与它的首行分处两个块。

use super::pool::{Lease, Pool};
use std::io::{self, BufRead, Read};

/// 按逻辑行边界切块的读取器
pub struct ChunkReader<'p, R> {
    reader: R,
    pool: &'p Pool<Vec<u8>>,
    chunk_size: usize,
    carry: Vec<u8>,
    chunks: usize,
}

impl<'p, R: BufRead> ChunkReader<'p, R> {
    pub fn new(reader: R, pool: &'p Pool<Vec<u8>>, chunk_size: usize) -> Self {
        Self {
            reader,
            pool,
            chunk_size: chunk_size.max(1),
            carry: Vec::new(),
            chunks: 0,
        }
    }

    /// 读取下一个块，文件结束时返回 `None`
    pub fn next_chunk(&mut self) -> io::Result<Option<Lease<'p, Vec<u8>>>> {
        let mut buf = self.pool.lease();
        buf.extend_from_slice(&self.carry);
        self.carry.clear();

        let read = (&mut self.reader)
            .take(self.chunk_size as u64)
            .read_to_end(&mut buf)?;

        if buf.is_empty() {
            return Ok(None);
        }

        if read > 0 && buf.last() != Some(&b'\n') {
            self.reader.read_until(b'\n', &mut buf)?;
        }

        loop {
            let n = self.reader.read_until(b'\n', &mut self.carry)?;
            if n == 0 {
                break;
            }
            if self.carry.first() == Some(&b'\t') {
                buf.extend_from_slice(&self.carry);
                self.carry.clear();
                continue;
            }
            break;
        }

        self.chunks += 1;
        tracing::trace!(
            chunk = self.chunks,
            bytes = buf.len(),
            carry = self.carry.len(),
            "读取数据块"
        );
        Ok(Some(buf))
    }

    /// 已经产出的块数
    pub fn chunks_read(&self) -> usize {
        self.chunks
    }
}
