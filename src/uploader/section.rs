//! 区间读取器
//!
//! 在文件或内存来源上开一个半开区间 `[start, end)` 的字节窗口：
//! 游标相对区间起点计、读取永不越过 end、seek 以区间为参照。
//! 文件变体独占持有句柄，每次读取前重新定位到绝对偏移，
//! 因此多个读取器可以并发读同一个文件的不同区间。

use md5::Context as Md5Context;
use std::io::SeekFrom;
use std::ops::Range;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::error::{ClientError, Result};
use crate::uploader::CancelCtx;

/// 区间 MD5 计算的读块大小
const HASH_CHUNK_SIZE: usize = 1024 * 1024;

/// 上传数据来源
///
/// 克隆只复制路径或引用计数，worker 间直接传值。
#[derive(Debug, Clone)]
pub enum UploadSource {
    /// 本地文件
    File(PathBuf),
    /// 内存缓冲
    Memory(Arc<Vec<u8>>),
}

impl UploadSource {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self::File(path.into())
    }

    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self::Memory(Arc::new(data))
    }
}

/// 半开区间 `[start, end)` 上的读取器
#[derive(Debug)]
pub struct SectionReader {
    backing: Backing,
    limit: Range<u64>,
    /// 相对区间起点的游标，始终落在 `[0, end-start]` 内
    pos: u64,
    ctx: Option<CancelCtx>,
}

#[derive(Debug)]
enum Backing {
    /// 文件句柄，close 之后为 None
    File(Option<File>),
    Memory(Arc<Vec<u8>>),
}

impl SectionReader {
    /// 在上传来源上打开一个区间
    ///
    /// # 参数
    /// * `limit` - 绝对字节区间，要求 `start < end`；内存来源还要求 `end` 不超过缓冲长度
    /// * `ctx` - 关联的取消上下文，已取消时读取会立即失败
    ///
    /// # 错误
    /// 区间非法报 `InvalidRange`；文件打不开报 `SourceUnavailable`。
    pub async fn open(source: &UploadSource, limit: Range<u64>, ctx: Option<CancelCtx>) -> Result<Self> {
        if limit.start >= limit.end {
            return Err(ClientError::InvalidRange {
                start: limit.start,
                end: limit.end,
            });
        }
        let backing = match source {
            UploadSource::File(path) => {
                let file = File::open(path).await.map_err(|e| ClientError::SourceUnavailable {
                    path: path.clone(),
                    source: e,
                })?;
                Backing::File(Some(file))
            }
            UploadSource::Memory(data) => {
                if limit.end > data.len() as u64 {
                    return Err(ClientError::InvalidRange {
                        start: limit.start,
                        end: limit.end,
                    });
                }
                Backing::Memory(Arc::clone(data))
            }
        };
        Ok(Self {
            backing,
            limit,
            pos: 0,
            ctx,
        })
    }

    /// 区间长度
    pub fn len(&self) -> u64 {
        self.limit.end - self.limit.start
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 当前游标（相对区间起点）
    pub fn tell(&self) -> u64 {
        self.pos
    }

    /// 区间内定位，返回新游标
    ///
    /// 三种模式都以区间为参照；结果为负报错，越过末尾则收到末尾。
    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let len = self.len() as i128;
        let next = match pos {
            SeekFrom::Start(offset) => offset as i128,
            SeekFrom::Current(delta) => self.pos as i128 + delta as i128,
            SeekFrom::End(delta) => len + delta as i128,
        };
        if next < 0 {
            return Err(ClientError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "seek 目标为负",
            )));
        }
        self.pos = (next as u64).min(self.len());
        Ok(self.pos)
    }

    /// 读取至多 `max_bytes` 字节，区间末尾返回空
    ///
    /// 关联的取消上下文已触发时立即报 `Aborted`，
    /// 不再为注定丢弃的数据做 I/O。
    pub async fn read(&mut self, max_bytes: usize) -> Result<Vec<u8>> {
        if let Some(ref ctx) = self.ctx {
            if ctx.is_aborted() {
                return Err(ClientError::Aborted);
            }
        }
        let remaining = (self.len() - self.pos) as usize;
        let want = max_bytes.min(remaining);
        if want == 0 {
            return Ok(Vec::new());
        }

        let absolute = self.limit.start + self.pos;
        let data = match &mut self.backing {
            Backing::File(handle) => {
                let file = handle.as_mut().ok_or_else(reader_closed)?;
                // 每次读取都重新定位，句柄上的绝对位置不作假设
                file.seek(SeekFrom::Start(absolute)).await?;
                let mut buffer = vec![0u8; want];
                file.read_exact(&mut buffer).await?;
                buffer
            }
            Backing::Memory(data) => {
                let start = absolute as usize;
                data[start..start + want].to_vec()
            }
        };
        self.pos += want as u64;
        Ok(data)
    }

    /// 读完剩余的全部字节
    pub async fn read_to_end(&mut self) -> Result<Vec<u8>> {
        let remaining = (self.len() - self.pos) as usize;
        self.read(remaining).await
    }

    /// 计算整个区间的 MD5（十六进制小写）
    ///
    /// 游标在计算前后保持不变，可以在读到一半时安插调用。
    pub async fn content_md5(&mut self) -> Result<String> {
        let saved = self.pos;
        self.pos = 0;
        let result = self.hash_remaining().await;
        self.pos = saved;
        result
    }

    async fn hash_remaining(&mut self) -> Result<String> {
        let mut hasher = Md5Context::new();
        loop {
            let chunk = self.read(HASH_CHUNK_SIZE).await?;
            if chunk.is_empty() {
                break;
            }
            hasher.consume(&chunk);
        }
        Ok(format!("{:x}", hasher.compute()))
    }

    /// 关闭读取器并释放底层资源，可重复调用
    pub fn close(&mut self) {
        if let Backing::File(handle) = &mut self.backing {
            handle.take();
        }
    }
}

fn reader_closed() -> ClientError {
    ClientError::Io(std::io::Error::new(std::io::ErrorKind::Other, "读取器已关闭"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Write;

    fn sample_data(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    async fn open_mem(data: Vec<u8>, range: Range<u64>) -> Result<SectionReader> {
        SectionReader::open(&UploadSource::from_bytes(data), range, None).await
    }

    #[tokio::test]
    async fn test_memory_read_exact_range() {
        let data = sample_data(100);
        let mut reader = open_mem(data.clone(), 10..60).await.unwrap();
        assert_eq!(reader.len(), 50);

        let first = reader.read(20).await.unwrap();
        assert_eq!(first, &data[10..30]);
        assert_eq!(reader.tell(), 20);

        let rest = reader.read_to_end().await.unwrap();
        assert_eq!(rest, &data[30..60]);
        // 区间末尾之后只会读到空
        assert!(reader.read(16).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_range_rejected() {
        let data = sample_data(10);
        let source = UploadSource::from_bytes(data);
        // start >= end
        let err = SectionReader::open(&source, 5..5, None).await.unwrap_err();
        assert!(matches!(err, ClientError::InvalidRange { start: 5, end: 5 }));
        let err = SectionReader::open(&source, 7..3, None).await.unwrap_err();
        assert!(matches!(err, ClientError::InvalidRange { .. }));
        // 内存来源越过缓冲末尾
        let err = SectionReader::open(&source, 0..11, None).await.unwrap_err();
        assert!(matches!(err, ClientError::InvalidRange { start: 0, end: 11 }));
    }

    #[tokio::test]
    async fn test_missing_file_is_source_unavailable() {
        let source = UploadSource::from_path("/不存在的路径/数据.bin");
        let err = SectionReader::open(&source, 0..4, None).await.unwrap_err();
        assert!(matches!(err, ClientError::SourceUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_seek_modes() {
        let data = sample_data(100);
        let mut reader = open_mem(data.clone(), 20..70).await.unwrap();

        assert_eq!(reader.seek(SeekFrom::Start(10)).unwrap(), 10);
        assert_eq!(reader.read(5).await.unwrap(), &data[30..35]);

        assert_eq!(reader.seek(SeekFrom::Current(-15)).unwrap(), 0);
        assert_eq!(reader.seek(SeekFrom::End(-10)).unwrap(), 40);
        assert_eq!(reader.read(100).await.unwrap(), &data[60..70]);

        // 结果为负的定位被拒绝，游标不动
        assert!(reader.seek(SeekFrom::Current(-51)).is_err());
        assert_eq!(reader.tell(), 50);
        // 越过末尾收到末尾
        assert_eq!(reader.seek(SeekFrom::Start(999)).unwrap(), 50);
    }

    #[tokio::test]
    async fn test_md5_preserves_cursor() {
        let data = sample_data(300);
        let mut reader = open_mem(data.clone(), 50..250).await.unwrap();

        let _ = reader.read(70).await.unwrap();
        assert_eq!(reader.tell(), 70);

        let hash = reader.content_md5().await.unwrap();
        let expected = format!("{:x}", md5::compute(&data[50..250]));
        assert_eq!(hash, expected);
        // 游标不受摘要计算影响
        assert_eq!(reader.tell(), 70);
        assert_eq!(reader.read(10).await.unwrap(), &data[120..130]);

        // 重复计算结果一致
        assert_eq!(reader.content_md5().await.unwrap(), expected);
    }

    #[tokio::test]
    async fn test_file_backed_section() {
        let data = sample_data(4096);
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&data).unwrap();
        tmp.flush().unwrap();

        let source = UploadSource::from_path(tmp.path());
        let mut reader = SectionReader::open(&source, 1000..3000, None).await.unwrap();
        assert_eq!(reader.len(), 2000);

        let hash = reader.content_md5().await.unwrap();
        assert_eq!(hash, format!("{:x}", md5::compute(&data[1000..3000])));

        let all = reader.read_to_end().await.unwrap();
        assert_eq!(all, &data[1000..3000]);
    }

    #[tokio::test]
    async fn test_two_readers_same_file() {
        let data = sample_data(1024);
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&data).unwrap();
        tmp.flush().unwrap();
        let source = UploadSource::from_path(tmp.path());

        // 两个读取器各自持有句柄，互不干扰
        let mut first = SectionReader::open(&source, 0..512, None).await.unwrap();
        let mut second = SectionReader::open(&source, 512..1024, None).await.unwrap();
        let a = first.read_to_end().await.unwrap();
        let b = second.read_to_end().await.unwrap();
        assert_eq!(a, &data[..512]);
        assert_eq!(b, &data[512..]);
    }

    #[tokio::test]
    async fn test_close_idempotent_and_read_fails_after() {
        let data = sample_data(64);
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&data).unwrap();
        tmp.flush().unwrap();

        let source = UploadSource::from_path(tmp.path());
        let mut reader = SectionReader::open(&source, 0..64, None).await.unwrap();
        reader.close();
        reader.close();

        let err = reader.read(8).await.unwrap_err();
        assert!(matches!(err, ClientError::Io(_)));
    }

    #[tokio::test]
    async fn test_aborted_ctx_fails_fast() {
        let ctx = CancelCtx::new();
        let mut reader = SectionReader::open(
            &UploadSource::from_bytes(sample_data(32)),
            0..32,
            Some(ctx.clone()),
        )
        .await
        .unwrap();

        assert_eq!(reader.read(8).await.unwrap().len(), 8);
        ctx.record_failure(ClientError::ApiRejected {
            code: 9,
            message: "兄弟分片失败".to_string(),
        });
        let err = reader.read(8).await.unwrap_err();
        assert!(matches!(err, ClientError::Aborted));
        // 摘要计算同样走读路径，也会立即失败
        assert!(matches!(reader.content_md5().await.unwrap_err(), ClientError::Aborted));
    }

    proptest! {
        /// 任意合法区间：读出的总字节与逐段内容都与直接切片一致
        #[test]
        fn prop_section_reads_match_slice(
            data in proptest::collection::vec(any::<u8>(), 2..600),
            a in any::<u64>(),
            b in any::<u64>(),
        ) {
            let len = data.len() as u64;
            let start = a % len;
            let end = start + 1 + b % (len - start);

            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            rt.block_on(async {
                let mut reader = SectionReader::open(
                    &UploadSource::from_bytes(data.clone()),
                    start..end,
                    None,
                )
                .await
                .unwrap();

                let mut collected = Vec::new();
                loop {
                    let chunk = reader.read(7).await.unwrap();
                    if chunk.is_empty() {
                        break;
                    }
                    collected.extend_from_slice(&chunk);
                }
                let expected = &data[start as usize..end as usize];
                prop_assert_eq!(collected.len() as u64, end - start);
                prop_assert_eq!(&collected[..], expected);

                let hash = reader.content_md5().await.unwrap();
                prop_assert_eq!(hash, format!("{:x}", md5::compute(expected)));
                Ok(())
            })?;
        }
    }
}
