//! 分片上传子系统
//!
//! 组成（由底向上）：
//! - `cancel`：一次上传内共享的首错闩锁
//! - `section`：文件/内存来源上的有界区间读取器
//! - `digest`：整体大小与 MD5 摘要
//! - `slice`：把源划分成定长分片任务
//! - `transport`：两代协议的分片落地方式（预签名 PUT / 服务器直传）
//! - `engine`：create → 分片并发 → complete 的完整编排

mod cancel;
mod digest;
mod engine;
mod section;
mod slice;
mod transport;

pub use cancel::CancelCtx;
pub use digest::SourceDigest;
pub use engine::{UploadEngine, UploadProtocol, UploadRequest, SLICE_MAX_ATTEMPTS, SLICE_WORKERS};
pub use section::{SectionReader, UploadSource};
pub use slice::{plan_slices, SliceTask};
pub(crate) use transport::{PresignedTransport, ServerTransport, SliceTransport};
