//! 文件管理接口
//!
//! 批量接口（infos/trash/delete/recover/move）单次最多 100 个 ID、
//! 批量改名单次最多 30 条，超出部分自动拆分成多次调用。

use serde_json::json;
use tracing::debug;

use crate::client::{Pan123Client, Payload};
use crate::error::Result;
use crate::types::{
    parse_data, DownloadInfoData, FileDetail, FileInfosData, FileListItem, FileListPage,
    FileListPageV2, MkdirData,
};

/// ID 类批量接口的单次上限
const ID_BATCH_SIZE: usize = 100;
/// 批量改名的单次上限
const RENAME_BATCH_SIZE: usize = 30;
/// V2 列表单页大小
const LIST_V2_PAGE_SIZE: u32 = 100;

impl Pan123Client {
    /// 查询单个文件详情
    pub async fn file_detail(&self, file_id: u64) -> Result<FileDetail> {
        let data = self
            .request(
                &self.endpoints().file_detail,
                Payload::Json(json!({ "fileID": file_id })),
                None,
            )
            .await?;
        parse_data(data)
    }

    /// 批量查询文件详情，自动按单次上限拆分
    pub async fn file_infos(&self, file_ids: &[u64]) -> Result<Vec<FileDetail>> {
        let mut details = Vec::with_capacity(file_ids.len());
        for batch in file_ids.chunks(ID_BATCH_SIZE) {
            let data = self
                .request(
                    &self.endpoints().file_infos,
                    Payload::Json(json!({ "fileIds": batch })),
                    None,
                )
                .await?;
            let page: FileInfosData = parse_data(data)?;
            details.extend(page.file_list);
        }
        Ok(details)
    }

    /// 获取文件列表（V1 页码分页，按文件名升序）
    pub async fn file_list(
        &self,
        parent_id: u64,
        page: u32,
        limit: u32,
        trashed: bool,
        search_data: Option<&str>,
    ) -> Result<FileListPage> {
        let payload = json!({
            "parentFileId": parent_id,
            "page": page,
            "limit": limit,
            "orderBy": "file_name",
            "orderDirection": "asc",
            "trashed": trashed,
            "searchData": search_data,
        });
        let data = self
            .request(&self.endpoints().file_list, Payload::Json(payload), None)
            .await?;
        parse_data(data)
    }

    /// 获取文件列表（V2 游标分页，单页原始数据）
    pub async fn file_list_v2(
        &self,
        parent_id: u64,
        limit: u32,
        last_file_id: i64,
        search_data: Option<&str>,
        search_mode: Option<i32>,
    ) -> Result<FileListPageV2> {
        let payload = json!({
            "parentFileId": parent_id,
            "limit": limit,
            "searchData": search_data,
            "searchMode": search_mode,
            "lastFileId": last_file_id,
        });
        let data = self
            .request(&self.endpoints().file_list_v2, Payload::Json(payload), None)
            .await?;
        parse_data(data)
    }

    /// 沿游标取完一个目录下的全部条目
    ///
    /// 回收站中的条目默认剔除，`include_trashed` 为 true 时保留。
    pub async fn file_list_v2_all(
        &self,
        parent_id: u64,
        include_trashed: bool,
    ) -> Result<Vec<FileListItem>> {
        let mut items = Vec::new();
        let mut last_file_id = 0i64;
        loop {
            let page = self
                .file_list_v2(parent_id, LIST_V2_PAGE_SIZE, last_file_id, None, None)
                .await?;
            for item in page.file_list {
                if item.trashed == 0 || include_trashed {
                    items.push(item);
                }
            }
            if page.last_file_id == -1 {
                break;
            }
            last_file_id = page.last_file_id;
        }
        debug!("目录 {} 共 {} 个条目", parent_id, items.len());
        Ok(items)
    }

    /// 移入回收站
    pub async fn trash(&self, file_ids: &[u64]) -> Result<()> {
        for batch in file_ids.chunks(ID_BATCH_SIZE) {
            self.request(
                &self.endpoints().file_trash,
                Payload::Json(json!({ "fileIDs": batch })),
                None,
            )
            .await?;
        }
        Ok(())
    }

    /// 彻底删除（仅对回收站中的文件有效）
    pub async fn delete(&self, file_ids: &[u64]) -> Result<()> {
        for batch in file_ids.chunks(ID_BATCH_SIZE) {
            self.request(
                &self.endpoints().file_delete,
                Payload::Json(json!({ "fileIDs": batch })),
                None,
            )
            .await?;
        }
        Ok(())
    }

    /// 从回收站恢复
    pub async fn recover(&self, file_ids: &[u64]) -> Result<()> {
        for batch in file_ids.chunks(ID_BATCH_SIZE) {
            self.request(
                &self.endpoints().file_recover,
                Payload::Json(json!({ "fileIDs": batch })),
                None,
            )
            .await?;
        }
        Ok(())
    }

    /// 移动到指定目录
    pub async fn move_files(&self, file_ids: &[u64], to_parent_id: u64) -> Result<()> {
        for batch in file_ids.chunks(ID_BATCH_SIZE) {
            self.request(
                &self.endpoints().file_move,
                Payload::Json(json!({ "fileIDs": batch, "toParentFileID": to_parent_id })),
                None,
            )
            .await?;
        }
        Ok(())
    }

    /// 重命名单个文件（PUT 接口）
    pub async fn rename_one(&self, file_id: u64, new_name: &str) -> Result<()> {
        self.request(
            &self.endpoints().file_name,
            Payload::Json(json!({ "fileId": file_id, "fileName": new_name })),
            None,
        )
        .await?;
        Ok(())
    }

    /// 批量重命名，条目在线路上编码为 `"文件ID|新名称"`
    pub async fn rename(&self, renames: &[(u64, &str)]) -> Result<()> {
        for batch in renames.chunks(RENAME_BATCH_SIZE) {
            let rename_list: Vec<String> = batch
                .iter()
                .map(|(file_id, name)| format!("{}|{}", file_id, name))
                .collect();
            self.request(
                &self.endpoints().file_rename,
                Payload::Json(json!({ "renameList": rename_list })),
                None,
            )
            .await?;
        }
        Ok(())
    }

    /// 创建目录，返回目录 ID
    pub async fn mkdir(&self, parent_id: u64, name: &str) -> Result<u64> {
        let data = self
            .request(
                &self.endpoints().mkdir,
                Payload::Json(json!({ "name": name, "parentID": parent_id })),
                None,
            )
            .await?;
        let created: MkdirData = parse_data(data)?;
        Ok(created.dir_id)
    }

    /// 获取下载地址
    ///
    /// `resolve_redirect` 为 true 时跟随跳转取最终直链。
    pub async fn download_url(&self, file_id: u64, resolve_redirect: bool) -> Result<String> {
        let data = self
            .request(
                &self.endpoints().download_info,
                Payload::Json(json!({ "fileId": file_id })),
                None,
            )
            .await?;
        let info: DownloadInfoData = parse_data(data)?;
        if resolve_redirect {
            self.resolve_final_url(&info.download_url).await
        } else {
            Ok(info.download_url)
        }
    }
}
