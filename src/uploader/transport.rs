//! 分片传输通道
//!
//! 两代协议的差别只在分片如何落地：
//! - V1 先按分片号取预签名地址，再把原始字节 PUT 上去
//! - V2 把分片连同摘要打成 multipart，直传 create 选出的服务器
//!
//! 编排逻辑对通道无感知，一次上传会话选定一个通道后不再更换。

use async_trait::async_trait;
use tracing::debug;

use crate::client::{FilePart, FormFields, Pan123Client, Payload};
use crate::endpoint::ApiEndpoint;
use crate::error::Result;
use crate::uploader::SliceTask;

/// 分片落地方式
#[async_trait]
pub(crate) trait SliceTransport: Send + Sync {
    /// 把一个分片的数据送达服务端
    async fn send_slice(&self, task: &SliceTask, slice_md5: &str, data: Vec<u8>) -> Result<()>;
}

/// V1 通道：get_upload_url + 预签名 PUT
pub(crate) struct PresignedTransport {
    pub client: Pan123Client,
    pub preupload_id: String,
}

#[async_trait]
impl SliceTransport for PresignedTransport {
    async fn send_slice(&self, task: &SliceTask, slice_md5: &str, data: Vec<u8>) -> Result<()> {
        let url = self.client.get_upload_url(&self.preupload_id, task.slice_no).await?;
        debug!("分片 #{} 取得预签名地址, md5={}", task.slice_no, slice_md5);
        self.client.put_presigned(&url, data).await
    }
}

/// V2 通道：multipart 直传选定服务器
pub(crate) struct ServerTransport {
    pub client: Pan123Client,
    /// create 响应选出的服务器上的分片端点
    pub endpoint: ApiEndpoint,
    pub preupload_id: String,
    pub file_name: String,
}

#[async_trait]
impl SliceTransport for ServerTransport {
    async fn send_slice(&self, task: &SliceTask, slice_md5: &str, data: Vec<u8>) -> Result<()> {
        let fields = FormFields {
            texts: vec![
                ("preuploadID", self.preupload_id.clone()),
                ("sliceNo", task.slice_no.to_string()),
                ("sliceMD5", slice_md5.to_string()),
            ],
            file: Some(FilePart {
                field: "slice",
                file_name: self.file_name.clone(),
                data,
            }),
        };
        self.client
            .request(&self.endpoint, Payload::Multipart(fields), None)
            .await?;
        Ok(())
    }
}
