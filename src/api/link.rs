//! 离线下载接口

use serde_json::json;

use crate::client::{Pan123Client, Payload};
use crate::error::Result;
use crate::types::{parse_data, OfflineProgress, OfflineTaskData};

impl Pan123Client {
    /// 创建离线下载任务，返回任务 ID
    ///
    /// `file_name` 与 `dir_id` 留空时由服务端决定落地位置；
    /// `callback_url` 用于任务结束后的服务端回调。
    pub async fn offline_download(
        &self,
        url: &str,
        file_name: Option<&str>,
        dir_id: Option<u64>,
        callback_url: Option<&str>,
    ) -> Result<i64> {
        let payload = json!({
            "url": url,
            "fileName": file_name,
            "dirID": dir_id,
            "callBackUrl": callback_url,
        });
        let data = self
            .request(&self.endpoints().offline_download, Payload::Json(payload), None)
            .await?;
        let task: OfflineTaskData = parse_data(data)?;
        Ok(task.task_id)
    }

    /// 查询离线下载任务进度
    pub async fn offline_download_process(&self, task_id: i64) -> Result<OfflineProgress> {
        let data = self
            .request(
                &self.endpoints().offline_process,
                Payload::Json(json!({ "taskID": task_id })),
                None,
            )
            .await?;
        parse_data(data)
    }
}
