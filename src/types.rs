//! 开放平台数据类型
//!
//! 响应负载统一为 `{data, code, message, x-traceID}` 包装；
//! 各字段名与服务端保持完全一致（`fileID` 与 `fileId` 混用是服务端现状）。

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{ClientError, Result};

/// 统一响应包装
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse {
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default, rename = "x-traceID")]
    pub trace_id: String,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        self.code == 0
    }
}

/// 把 data 字段解析成具体类型，形状不符时报协议错误
pub(crate) fn parse_data<T: DeserializeOwned>(data: Value) -> Result<T> {
    serde_json::from_value(data).map_err(|e| ClientError::ProtocolViolation(format!("响应数据解析失败: {}", e)))
}

/// 重名文件处理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicatePolicy {
    /// 保留两者，新文件名自动加后缀
    KeepBoth = 1,
    /// 覆盖原文件
    Overwrite = 2,
}

impl DuplicatePolicy {
    pub fn as_code(self) -> u8 {
        self as u8
    }
}

/// 用户信息
#[derive(Debug, Clone, Deserialize)]
pub struct UserInfo {
    #[serde(default)]
    pub uid: u64,
    #[serde(default)]
    pub nickname: String,
    #[serde(default, rename = "headImage")]
    pub head_image: String,
    #[serde(default)]
    pub passport: String,
    #[serde(default)]
    pub mail: String,
    #[serde(default, rename = "spaceUsed")]
    pub space_used: u64,
    #[serde(default, rename = "spacePermanent")]
    pub space_permanent: u64,
    #[serde(default, rename = "spaceTemp")]
    pub space_temp: u64,
    #[serde(default, rename = "spaceTempExpr")]
    pub space_temp_expr: String,
    #[serde(default)]
    pub vip: bool,
}

/// 文件详情（detail / infos 接口）
#[derive(Debug, Clone, Deserialize)]
pub struct FileDetail {
    #[serde(default, rename = "fileID")]
    pub file_id: u64,
    #[serde(default)]
    pub filename: String,
    #[serde(default, rename = "type")]
    pub file_type: i32,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub etag: String,
    #[serde(default)]
    pub status: i32,
    #[serde(default, rename = "parentFileID")]
    pub parent_file_id: u64,
    #[serde(default)]
    pub trashed: i32,
    #[serde(default, rename = "createAt")]
    pub create_at: String,
}

impl FileDetail {
    pub fn is_dir(&self) -> bool {
        self.file_type == 1
    }
}

/// infos 接口的返回体
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct FileInfosData {
    #[serde(default, rename = "fileList")]
    pub file_list: Vec<FileDetail>,
}

/// 文件列表条目（list / list_v2 接口，字段为小写 Id 风格）
#[derive(Debug, Clone, Deserialize)]
pub struct FileListItem {
    #[serde(default, rename = "fileId")]
    pub file_id: u64,
    #[serde(default)]
    pub filename: String,
    #[serde(default, rename = "type")]
    pub file_type: i32,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub etag: String,
    #[serde(default)]
    pub status: i32,
    #[serde(default, rename = "parentFileId")]
    pub parent_file_id: u64,
    #[serde(default)]
    pub category: i32,
    #[serde(default)]
    pub trashed: i32,
}

impl FileListItem {
    pub fn is_dir(&self) -> bool {
        self.file_type == 1
    }
}

/// V1 文件列表分页
#[derive(Debug, Clone, Deserialize)]
pub struct FileListPage {
    #[serde(default, rename = "fileList")]
    pub file_list: Vec<FileListItem>,
    #[serde(default)]
    pub total: u64,
}

/// V2 文件列表游标分页，`last_file_id == -1` 表示已到末尾
#[derive(Debug, Clone, Deserialize)]
pub struct FileListPageV2 {
    #[serde(default, rename = "lastFileId")]
    pub last_file_id: i64,
    #[serde(default, rename = "fileList")]
    pub file_list: Vec<FileListItem>,
}

impl FileListPageV2 {
    pub fn is_last(&self) -> bool {
        self.last_file_id == -1
    }
}

/// mkdir 接口的返回体
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct MkdirData {
    #[serde(default, rename = "dirID")]
    pub dir_id: u64,
}

/// download_info 接口的返回体
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct DownloadInfoData {
    #[serde(default, rename = "downloadUrl")]
    pub download_url: String,
}

/// create 步骤的响应
///
/// `reuse` 命中时仅 `file_id` 有效；未命中时服务端下发
/// `preupload_id` 与 `slice_size`（V2 额外带候选服务器）。
#[derive(Debug, Clone, Deserialize)]
pub struct UploadCreated {
    #[serde(default)]
    pub reuse: bool,
    #[serde(default, rename = "fileID")]
    pub file_id: u64,
    #[serde(default, rename = "preuploadID")]
    pub preupload_id: String,
    #[serde(default, rename = "sliceSize")]
    pub slice_size: u64,
    #[serde(default)]
    pub servers: Vec<String>,
}

/// get_upload_url 接口的返回体
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct UploadUrlData {
    #[serde(default, rename = "presignedURL")]
    pub presigned_url: String,
}

/// complete / async_result 步骤的响应
#[derive(Debug, Clone, Deserialize)]
pub struct UploadCompleted {
    #[serde(default)]
    pub completed: bool,
    #[serde(default, rename = "fileID")]
    pub file_id: u64,
    /// 服务端转入异步收尾，需要轮询 async_result
    #[serde(default, rename = "async")]
    pub is_async: bool,
}

/// 已上传分片清单中的一项
#[derive(Debug, Clone, Deserialize)]
pub struct UploadedPart {
    #[serde(default, rename = "partNumber")]
    pub part_number: u64,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub etag: String,
}

/// list_upload_parts 接口的返回体
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct UploadPartsData {
    #[serde(default)]
    pub parts: Vec<UploadedPart>,
}

/// offline_download 接口的返回体
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct OfflineTaskData {
    #[serde(default, rename = "taskID")]
    pub task_id: i64,
}

/// 离线下载任务状态
#[derive(Debug, Clone, Deserialize)]
pub struct OfflineProgress {
    #[serde(default)]
    pub status: i32,
    /// 完成百分比
    #[serde(default)]
    pub process: f64,
}

impl OfflineProgress {
    /// 状态 1 = 失败
    pub fn is_failed(&self) -> bool {
        self.status == 1
    }

    /// 状态 2 = 成功
    pub fn is_done(&self) -> bool {
        self.status == 2
    }

    /// 状态 0/3/13 = 进行中
    pub fn is_running(&self) -> bool {
        matches!(self.status, 0 | 3 | 13)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_parsing() {
        let raw = json!({
            "data": {"fileID": 123},
            "code": 0,
            "message": "ok",
            "x-traceID": "abc-def"
        });
        let resp: ApiResponse = serde_json::from_value(raw).unwrap();
        assert!(resp.is_success());
        assert_eq!(resp.trace_id, "abc-def");
        assert_eq!(resp.data["fileID"], 123);
    }

    #[test]
    fn test_envelope_defaults() {
        // 服务端偶尔省略字段，全部走默认值
        let resp: ApiResponse = serde_json::from_value(json!({"code": 401})).unwrap();
        assert!(!resp.is_success());
        assert_eq!(resp.message, "");
        assert!(resp.data.is_null());
    }

    #[test]
    fn test_upload_created_reuse() {
        let created: UploadCreated =
            serde_json::from_value(json!({"reuse": true, "fileID": 9981})).unwrap();
        assert!(created.reuse);
        assert_eq!(created.file_id, 9981);
        assert!(created.preupload_id.is_empty());
    }

    #[test]
    fn test_upload_created_sliced() {
        let created: UploadCreated = serde_json::from_value(json!({
            "reuse": false,
            "preuploadID": "pre-1",
            "sliceSize": 16777216,
            "servers": ["http://openapi-upload.123242.com"]
        }))
        .unwrap();
        assert!(!created.reuse);
        assert_eq!(created.slice_size, 16 * 1024 * 1024);
        assert_eq!(created.servers.len(), 1);
    }

    #[test]
    fn test_upload_completed_async_flag() {
        let done: UploadCompleted =
            serde_json::from_value(json!({"completed": false, "async": true})).unwrap();
        assert!(done.is_async);
        assert!(!done.completed);
    }

    #[test]
    fn test_list_page_v2_end_marker() {
        let page: FileListPageV2 =
            serde_json::from_value(json!({"lastFileId": -1, "fileList": []})).unwrap();
        assert!(page.is_last());
    }

    #[test]
    fn test_file_detail_casing() {
        let detail: FileDetail = serde_json::from_value(json!({
            "fileID": 7,
            "filename": "说明.txt",
            "type": 0,
            "size": 42,
            "etag": "0cc175b9c0f1b6a831c399e269772661",
            "parentFileID": 3
        }))
        .unwrap();
        assert_eq!(detail.file_id, 7);
        assert_eq!(detail.parent_file_id, 3);
        assert!(!detail.is_dir());
    }

    #[test]
    fn test_offline_progress_states() {
        for status in [0, 3, 13] {
            let p: OfflineProgress = serde_json::from_value(json!({"status": status})).unwrap();
            assert!(p.is_running());
            assert!(!p.is_done());
        }
        let failed: OfflineProgress = serde_json::from_value(json!({"status": 1})).unwrap();
        assert!(failed.is_failed());
    }
}
