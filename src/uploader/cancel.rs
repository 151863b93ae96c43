//! 协作式取消上下文
//!
//! 一次上传的所有 worker 共享同一个 `CancelCtx`。首个失败者写入
//! 原因并点亮取消标记，之后的失败记录被丢弃；取消是协作式的，
//! 在途的网络调用会自然跑完，只是不再开始新工作。

use parking_lot::Mutex;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::ClientError;

/// 首错闩锁
#[derive(Debug, Clone)]
pub struct CancelCtx {
    inner: Arc<CancelInner>,
}

#[derive(Debug)]
struct CancelInner {
    cause: Mutex<Option<ClientError>>,
    token: CancellationToken,
}

impl CancelCtx {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(CancelInner {
                cause: Mutex::new(None),
                token: CancellationToken::new(),
            }),
        }
    }

    /// 记录首个失败原因，后续写入被丢弃
    ///
    /// 先写原因再置位标记：观察到 `is_aborted()` 为 true 时原因必然可取。
    pub fn record_failure(&self, err: ClientError) {
        {
            let mut cause = self.inner.cause.lock();
            if cause.is_some() {
                debug!("已有失败记录, 忽略后续失败: {}", err);
                return;
            }
            *cause = Some(err);
        }
        self.inner.token.cancel();
    }

    /// 是否已触发取消
    pub fn is_aborted(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    /// 取走记录的失败原因（只能取走一次）
    pub fn take_cause(&self) -> Option<ClientError> {
        self.inner.cause.lock().take()
    }
}

impl Default for CancelCtx {
    fn default() -> Self {
        Self::new()
    }
}
