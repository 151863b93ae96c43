//! 上传编排器
//!
//! 把一次上传串成完整协议流程：
//! 1. create 探测秒传，命中则直接返回 fileID
//! 2. 按 create 给出的分片大小切分，固定宽度的工作池并发上传
//! 3. complete 收尾，必要时以 100ms 间隔轮询异步合并结果
//!
//! 任一分片耗尽尝试次数后整次上传快速失败：
//! 首个失败原因被记入 [`CancelCtx`]，其余在途分片随即自行退出。

use std::sync::Arc;
use std::time::Duration;

use rand::seq::SliceRandom;
use tokio::task::JoinSet;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::client::Pan123Client;
use crate::endpoint::ApiEndpoints;
use crate::error::{ClientError, Result};
use crate::types::{DuplicatePolicy, UploadCompleted};
use crate::uploader::cancel::CancelCtx;
use crate::uploader::digest::SourceDigest;
use crate::uploader::section::{SectionReader, UploadSource};
use crate::uploader::slice::{plan_slices, SliceTask};
use crate::uploader::transport::{PresignedTransport, ServerTransport, SliceTransport};

/// 同时在途的分片数
pub const SLICE_WORKERS: usize = 3;
/// 单个分片的尝试次数上限
pub const SLICE_MAX_ATTEMPTS: u32 = 3;

/// 收尾轮询间隔
const POLL_INTERVAL: Duration = Duration::from_millis(100);
/// V2 complete 表示合并尚未就绪的业务码
const CODE_RESULT_PENDING: i64 = 20103;

/// 分片上传协议代别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadProtocol {
    /// 逐片获取预签名地址后 PUT
    V1,
    /// multipart 直传 create 选出的服务器
    V2,
}

/// 一次上传的目标描述
#[derive(Debug, Clone)]
pub struct UploadRequest {
    /// 目标目录 ID，根目录为 0
    pub parent_id: u64,
    /// 落盘名；containDir 模式下可携带相对路径
    pub name: String,
    /// 重名处理策略，None 交给服务端默认行为
    pub duplicate: Option<DuplicatePolicy>,
    /// 允许名字携带路径，服务端按需补建目录
    pub contain_dir: bool,
}

impl UploadRequest {
    pub fn new(parent_id: u64, name: impl Into<String>) -> Self {
        Self {
            parent_id,
            name: name.into(),
            duplicate: None,
            contain_dir: false,
        }
    }

    /// 指定重名处理策略
    pub fn duplicate(mut self, policy: DuplicatePolicy) -> Self {
        self.duplicate = Some(policy);
        self
    }

    /// 开启路径模式，服务端按名字中的分隔符补建目录
    pub fn contain_dir(mut self) -> Self {
        self.contain_dir = true;
        self
    }

    /// 上送服务端的名字，路径模式下把反斜杠归一成正斜杠
    pub(crate) fn wire_name(&self) -> String {
        if self.contain_dir {
            self.name.replace('\\', "/")
        } else {
            self.name.clone()
        }
    }
}

/// 分片上传编排器
///
/// 持有一份客户端句柄与上传描述，`run` 消耗自身走完整个流程。
pub struct UploadEngine {
    client: Pan123Client,
    source: UploadSource,
    request: UploadRequest,
    protocol: UploadProtocol,
}

impl UploadEngine {
    pub fn new(
        client: Pan123Client,
        source: UploadSource,
        request: UploadRequest,
        protocol: UploadProtocol,
    ) -> Self {
        Self {
            client,
            source,
            request,
            protocol,
        }
    }

    /// 执行上传，返回服务端分配的 fileID
    pub async fn run(self) -> Result<u64> {
        let name = self.request.wire_name();
        let digest = SourceDigest::compute(&self.source).await?;
        info!(
            "开始上传: name={}, size={}, etag={}",
            name, digest.size, digest.etag
        );

        let created = match self.protocol {
            UploadProtocol::V1 => {
                self.client
                    .upload_create(
                        self.request.parent_id,
                        &name,
                        &digest.etag,
                        digest.size,
                        self.request.duplicate,
                        self.request.contain_dir,
                    )
                    .await?
            }
            UploadProtocol::V2 => {
                self.client
                    .upload_create_v2(
                        self.request.parent_id,
                        &name,
                        &digest.etag,
                        digest.size,
                        self.request.duplicate,
                        self.request.contain_dir,
                    )
                    .await?
            }
        };

        if created.reuse {
            if created.file_id == 0 {
                return Err(ClientError::ProtocolViolation(
                    "秒传响应缺少 fileID".to_string(),
                ));
            }
            info!("命中秒传: fileID={}", created.file_id);
            return Ok(created.file_id);
        }

        if created.preupload_id.is_empty() {
            return Err(ClientError::ProtocolViolation(
                "create 响应缺少 preuploadID".to_string(),
            ));
        }
        if created.slice_size == 0 {
            return Err(ClientError::ProtocolViolation(
                "create 响应缺少 sliceSize".to_string(),
            ));
        }

        let transport: Arc<dyn SliceTransport> = match self.protocol {
            UploadProtocol::V1 => Arc::new(PresignedTransport {
                client: self.client.clone(),
                preupload_id: created.preupload_id.clone(),
            }),
            UploadProtocol::V2 => {
                let server = created
                    .servers
                    .choose(&mut rand::thread_rng())
                    .cloned()
                    .ok_or_else(|| {
                        ClientError::ProtocolViolation("create 响应缺少可用上传服务器".to_string())
                    })?;
                Arc::new(ServerTransport {
                    client: self.client.clone(),
                    endpoint: ApiEndpoints::slice_endpoint(&server),
                    preupload_id: created.preupload_id.clone(),
                    file_name: name.clone(),
                })
            }
        };

        let tasks = plan_slices(digest.size, created.slice_size);
        info!(
            "分片规划完成: 共 {} 片, 每片 {} 字节",
            tasks.len(),
            created.slice_size
        );
        self.upload_slices(transport, tasks).await?;

        match self.protocol {
            UploadProtocol::V1 => self.finish_v1(&created.preupload_id).await,
            UploadProtocol::V2 => self.finish_v2(&created.preupload_id).await,
        }
    }

    /// 固定宽度的工作池：有空位且未中止就补位，直到任务耗尽
    async fn upload_slices(
        &self,
        transport: Arc<dyn SliceTransport>,
        tasks: Vec<SliceTask>,
    ) -> Result<()> {
        let ctx = CancelCtx::new();
        let mut pending = tasks.into_iter();
        let mut workers: JoinSet<()> = JoinSet::new();

        loop {
            while workers.len() < SLICE_WORKERS && !ctx.is_aborted() {
                let Some(task) = pending.next() else { break };
                let source = self.source.clone();
                let transport = Arc::clone(&transport);
                let worker_ctx = ctx.clone();
                workers.spawn(async move {
                    upload_slice_worker(source, transport, task, worker_ctx).await;
                });
            }
            match workers.join_next().await {
                Some(Ok(())) => {}
                Some(Err(err)) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
                Some(Err(_)) => {}
                None => break,
            }
        }

        if let Some(cause) = ctx.take_cause() {
            warn!("分片上传中止: {}", cause);
            return Err(cause);
        }
        Ok(())
    }

    /// V1 收尾：complete 未完成则按 async 标记轮询 async_result
    async fn finish_v1(&self, preupload_id: &str) -> Result<u64> {
        let done = self.client.upload_complete(preupload_id).await?;
        if done.completed {
            return confirm_file_id(&done);
        }
        if !done.is_async {
            return Err(ClientError::ProtocolViolation(
                "complete 既未完成也未转入异步收尾".to_string(),
            ));
        }
        debug!("服务端转入异步收尾, 开始轮询");
        loop {
            let done = self.client.upload_async_result(preupload_id).await?;
            if done.completed {
                return confirm_file_id(&done);
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    /// V2 收尾：20103 表示合并中，按间隔重试到出结果为止
    async fn finish_v2(&self, preupload_id: &str) -> Result<u64> {
        loop {
            match self.client.upload_complete_v2(preupload_id).await {
                Ok(done) if done.completed => return confirm_file_id(&done),
                Ok(_) => {}
                Err(ClientError::ApiRejected { code, .. }) if code == CODE_RESULT_PENDING => {
                    debug!("合并尚未就绪, 继续轮询");
                }
                Err(err) => return Err(err),
            }
            sleep(POLL_INTERVAL).await;
        }
    }
}

/// 完成响应里必须带回 fileID
fn confirm_file_id(done: &UploadCompleted) -> Result<u64> {
    if done.file_id == 0 {
        return Err(ClientError::ProtocolViolation(
            "完成响应缺少 fileID".to_string(),
        ));
    }
    Ok(done.file_id)
}

/// 单分片工作者：限次重试，对取消保持敏感
///
/// 失败原因只在尝试耗尽后记入上下文；
/// 因中止而放弃的尝试不算失败，避免覆盖真正的首因。
async fn upload_slice_worker(
    source: UploadSource,
    transport: Arc<dyn SliceTransport>,
    task: SliceTask,
    ctx: CancelCtx,
) {
    let mut last_error = None;
    for attempt in 1..=SLICE_MAX_ATTEMPTS {
        if ctx.is_aborted() {
            return;
        }
        match send_slice_once(&source, transport.as_ref(), &task, &ctx).await {
            Ok(()) => {
                debug!("分片 #{} 上传成功 (第 {} 次尝试)", task.slice_no, attempt);
                return;
            }
            Err(ClientError::Aborted) => return,
            Err(err) => {
                warn!("分片 #{} 第 {} 次尝试失败: {}", task.slice_no, attempt, err);
                last_error = Some(err);
            }
        }
    }
    let Some(cause) = last_error else { return };
    ctx.record_failure(ClientError::SliceUploadFailed {
        slice_no: task.slice_no,
        attempts: SLICE_MAX_ATTEMPTS,
        source: Box::new(cause),
    });
}

/// 一次完整的分片发送：开区间读取器、算摘要、读数据、送达
async fn send_slice_once(
    source: &UploadSource,
    transport: &dyn SliceTransport,
    task: &SliceTask,
    ctx: &CancelCtx,
) -> Result<()> {
    let mut reader = SectionReader::open(source, task.range.clone(), Some(ctx.clone())).await?;
    let outcome = async {
        let slice_md5 = reader.content_md5().await?;
        let data = reader.read_to_end().await?;
        transport.send_slice(task, &slice_md5, data).await
    }
    .await;
    reader.close();
    outcome
}
