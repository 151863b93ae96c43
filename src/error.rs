//! 统一错误类型
//!
//! 区分可恢复与不可恢复两类失败：连接抖动、限流、凭证过期都在
//! 请求层内部消化，能走到这里的都是需要调用方处理的终态错误。

use std::path::PathBuf;
use thiserror::Error;

/// 客户端错误
#[derive(Debug, Error)]
pub enum ClientError {
    /// 服务端业务拒绝（响应码非 0），code 与 message 原样保留
    #[error("[接口响应失败|code:{code}]: {message}")]
    ApiRejected { code: i64, message: String },

    /// HTTP 层不可恢复的失败（如请求构造错误）
    #[error("HTTP请求失败: {0}")]
    Http(#[from] reqwest::Error),

    /// 读取区间非法（start >= end 或越过数据末尾）
    #[error("无效的读取区间: [{start}, {end})")]
    InvalidRange { start: u64, end: u64 },

    /// 源文件无法打开
    #[error("无法打开源文件 {path:?}: {source}")]
    SourceUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 整体摘要计算失败（源数据无法完整读取）
    #[error("摘要计算失败: {0}")]
    HashComputationFailed(#[source] std::io::Error),

    /// 服务端响应形状无法解释
    #[error("协议不一致: {0}")]
    ProtocolViolation(String),

    /// 单个分片用尽重试预算后仍然失败
    #[error("分片 {slice_no} 上传失败(已尝试{attempts}次): {source}")]
    SliceUploadFailed {
        slice_no: u64,
        attempts: u32,
        #[source]
        source: Box<ClientError>,
    },

    /// 操作已被协作式取消（兄弟任务先失败）
    #[error("操作已取消")]
    Aborted,

    /// 本地 I/O 失败
    #[error("I/O错误: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// 若为业务拒绝错误则返回其 code
    pub fn api_code(&self) -> Option<i64> {
        match self {
            ClientError::ApiRejected { code, .. } => Some(*code),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
