//! 整体摘要计算
//!
//! create 步骤需要整个对象的大小与 MD5（服务端称 etag）。
//! 文件摘要在阻塞线程池里算，避免大文件读取占住运行时。

use md5::Context as Md5Context;
use std::io::Read;
use std::path::Path;
use tracing::debug;

use crate::error::{ClientError, Result};
use crate::uploader::UploadSource;

/// 读缓冲大小
const READ_BUF_SIZE: usize = 64 * 1024;

/// 上传来源的整体摘要
#[derive(Debug, Clone)]
pub struct SourceDigest {
    pub size: u64,
    /// 内容 MD5，十六进制小写
    pub etag: String,
}

impl SourceDigest {
    /// 计算来源的整体大小与 MD5
    pub async fn compute(source: &UploadSource) -> Result<Self> {
        match source {
            UploadSource::File(path) => {
                let path = path.clone();
                tokio::task::spawn_blocking(move || Self::compute_file(&path))
                    .await
                    .map_err(|e| {
                        ClientError::HashComputationFailed(std::io::Error::new(
                            std::io::ErrorKind::Other,
                            e,
                        ))
                    })?
            }
            UploadSource::Memory(data) => Ok(Self {
                size: data.len() as u64,
                etag: format!("{:x}", md5::compute(data.as_slice())),
            }),
        }
    }

    fn compute_file(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|e| ClientError::SourceUnavailable {
            path: path.to_path_buf(),
            source: e,
        })?;
        let mut reader = std::io::BufReader::with_capacity(1024 * 1024, file);
        let mut hasher = Md5Context::new();
        let mut buffer = [0u8; READ_BUF_SIZE];
        let mut size = 0u64;
        loop {
            let n = reader.read(&mut buffer).map_err(ClientError::HashComputationFailed)?;
            if n == 0 {
                break;
            }
            hasher.consume(&buffer[..n]);
            size += n as u64;
        }
        let etag = format!("{:x}", hasher.compute());
        debug!("摘要计算完成: path={:?}, size={}, etag={}", path, size, etag);
        Ok(Self { size, etag })
    }
}
