// 123Pan Open Platform Rust Library
// 123 云盘开放平台 Rust 客户端核心库

// 错误类型
pub mod error;

// 端点表与限速闸门
pub mod endpoint;

// 响应信封与数据模型
pub mod types;

// 客户端配置
pub mod config;

// HTTP 客户端与请求分发
pub mod client;

// 开放平台接口封装
pub mod api;

// 分片上传引擎
pub mod uploader;

// 路径与批量操作便捷封装
pub mod util;

// 导出常用类型
pub use client::Pan123Client;
pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use types::{
    DuplicatePolicy, FileDetail, FileListItem, FileListPage, FileListPageV2, OfflineProgress,
    UploadCompleted, UploadCreated, UploadedPart, UserInfo,
};
pub use uploader::{
    CancelCtx, SectionReader, SourceDigest, UploadEngine, UploadProtocol, UploadRequest,
    UploadSource,
};
