//! 路径与批量操作的便捷封装
//!
//! 这一层把多次协议调用拼成常用动作（建路径、还原路径、目录复制、
//! 全量列表、离线下载等待），用 `anyhow` 承接跨调用的失败上下文；
//! 单次协议调用的错误语义仍由 [`crate::error::ClientError`] 表达。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_recursion::async_recursion;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::client::Pan123Client;
use crate::types::{DuplicatePolicy, FileListItem};

/// 空内容的 md5，秒传探测 0 字节文件用
const ZERO_CONTENT_ETAG: &str = "d41d8cd98f00b204e9800998ecf8427e";
/// 建路径用的占位文件名
const ZERO_PLACEHOLDER_NAME: &str = "0字节占位文件.zero";
/// V1 列表并发拉取的页数上限
const LIST_FANOUT: usize = 10;
/// V1 列表单页大小
const LIST_PAGE_SIZE: u32 = 100;
/// 离线任务轮询间隔
const OFFLINE_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// 把文件名中的保留字符替换成全角形态
pub fn format_name(name: &str) -> String {
    name.replace('\\', "＼")
        .replace('/', "／")
        .replace(':', "：")
        .replace('*', "＊")
        .replace('?', "？")
        .replace('"', "＂")
        .replace('<', "＜")
        .replace('>', "＞")
        .replace('|', "｜")
}

/// 按路径逐级补建目录，返回最深一级的目录 ID
///
/// 借道 containDir 上传一个 0 字节占位文件让服务端建好整条路径，
/// 再从占位文件详情反查目录 ID 并把占位文件移入回收站。
pub async fn create_path(client: &Pan123Client, path: &str) -> Result<u64> {
    let normalized = path.replace('\\', "/");
    let normalized = normalized.trim_matches('/');
    let placeholder = if normalized.is_empty() {
        ZERO_PLACEHOLDER_NAME.to_string()
    } else {
        format!("{}/{}", normalized, ZERO_PLACEHOLDER_NAME)
    };

    let created = client
        .upload_create(
            0,
            &placeholder,
            ZERO_CONTENT_ETAG,
            0,
            Some(DuplicatePolicy::Overwrite),
            true,
        )
        .await
        .context("创建占位文件失败")?;
    if !created.reuse || created.file_id == 0 {
        bail!("0 字节占位文件未命中秒传");
    }

    let detail = client
        .file_detail(created.file_id)
        .await
        .context("查询占位文件详情失败")?;
    client
        .trash(&[created.file_id])
        .await
        .context("清理占位文件失败")?;
    info!("路径 {} 就绪: dirID={}", path, detail.parent_file_id);
    Ok(detail.parent_file_id)
}

/// 沿 parentFileID 链还原完整路径，根目录返回 `/`
pub async fn get_path(client: &Pan123Client, file_id: u64) -> Result<String> {
    let mut segments = Vec::new();
    let mut current = file_id;
    while current != 0 {
        let detail = client
            .file_detail(current)
            .await
            .with_context(|| format!("查询文件 {} 详情失败", current))?;
        segments.push(detail.filename);
        current = detail.parent_file_id;
    }
    segments.reverse();
    Ok(format!("/{}", segments.join("/")))
}

/// 把一个目录的内容复制到另一个目录
///
/// 文件靠秒传复制，目录递归处理；`check` 为 true 时先读目标目录，
/// 同名同 etag 的文件跳过，同名目录合并。新建出来的目录不再回查。
#[async_recursion]
pub async fn copy(
    client: &Pan123Client,
    source_id: u64,
    dest_id: u64,
    check: bool,
) -> Result<()> {
    let entries = client
        .file_list_v2_all(source_id, false)
        .await
        .context("读取源目录失败")?;
    let existing: HashMap<String, FileListItem> = if check {
        client
            .file_list_v2_all(dest_id, false)
            .await
            .context("读取目标目录失败")?
            .into_iter()
            .map(|item| (item.filename.clone(), item))
            .collect()
    } else {
        HashMap::new()
    };

    for entry in entries {
        let matched = existing.get(&entry.filename);
        match entry.file_type {
            0 => {
                if let Some(found) = matched {
                    if found.etag == entry.etag {
                        continue;
                    }
                }
                let created = client
                    .upload_create(dest_id, &entry.filename, &entry.etag, entry.size, None, false)
                    .await?;
                if !created.reuse {
                    warn!("复制 {} 未命中秒传, 服务端没有该内容的副本", entry.filename);
                }
            }
            1 => {
                let next_id = match matched {
                    Some(found) => found.file_id,
                    None => client.mkdir(dest_id, &entry.filename).await?,
                };
                copy(client, entry.file_id, next_id, matched.is_some()).await?;
            }
            other => bail!("未知的文件类型: {}", other),
        }
    }
    Ok(())
}

/// 并发拉取一个目录的全部 V1 列表页
///
/// 先取第一页拿 total，余下页按并发上限一起拉。
/// 各页结果按完成顺序合并，条目顺序不保证与单页遍历一致。
pub async fn list_all(
    client: &Pan123Client,
    parent_id: u64,
    trashed: bool,
    search_data: Option<&str>,
) -> Result<Vec<FileListItem>> {
    let first = client
        .file_list(parent_id, 1, LIST_PAGE_SIZE, trashed, search_data)
        .await
        .context("读取列表首页失败")?;
    let mut items = first.file_list;
    let pages = first.total.div_ceil(u64::from(LIST_PAGE_SIZE));
    if pages <= 1 {
        return Ok(items);
    }

    let search: Option<String> = search_data.map(str::to_owned);
    let semaphore = Arc::new(Semaphore::new(LIST_FANOUT));
    let mut fetches: JoinSet<crate::error::Result<Vec<FileListItem>>> = JoinSet::new();
    for page in 2..=pages {
        let permit = Arc::clone(&semaphore)
            .acquire_owned()
            .await
            .context("获取并发许可失败")?;
        let client = client.clone();
        let search = search.clone();
        fetches.spawn(async move {
            let _permit = permit;
            let page_data = client
                .file_list(parent_id, page as u32, LIST_PAGE_SIZE, trashed, search.as_deref())
                .await?;
            Ok(page_data.file_list)
        });
    }
    while let Some(joined) = fetches.join_next().await {
        let page_items = joined.context("列表页任务失败")??;
        items.extend(page_items);
    }
    Ok(items)
}

/// 创建离线下载任务并等到终态
///
/// 失败与未知状态报错，运行中每 500ms 查一次进度。
pub async fn offline_wait(
    client: &Pan123Client,
    url: &str,
    file_name: &str,
    dir_id: u64,
) -> Result<()> {
    let task_id = client
        .offline_download(url, Some(file_name), Some(dir_id), None)
        .await
        .context("创建离线下载任务失败")?;
    info!("离线下载任务已创建: taskID={}", task_id);
    loop {
        let progress = client
            .offline_download_process(task_id)
            .await
            .context("查询离线任务进度失败")?;
        if progress.is_failed() {
            bail!("离线下载失败");
        }
        if progress.is_done() {
            info!("离线下载完成: taskID={}", task_id);
            return Ok(());
        }
        if !progress.is_running() {
            bail!("未知的离线任务状态: {}", progress.status);
        }
        sleep(OFFLINE_POLL_INTERVAL).await;
    }
}
