//! 上传协议接口
//!
//! 这里只做单次协议调用的封装与小对象单步上传；
//! 分片并发、重试与收尾轮询由 `uploader::UploadEngine` 编排。

use std::path::PathBuf;

use serde_json::json;
use tracing::info;

use crate::client::{FilePart, FormFields, Pan123Client, Payload};
use crate::error::{ClientError, Result};
use crate::types::{
    parse_data, DuplicatePolicy, UploadCompleted, UploadCreated, UploadPartsData, UploadUrlData,
    UploadedPart,
};
use crate::uploader::{
    SectionReader, SourceDigest, UploadEngine, UploadProtocol, UploadRequest, UploadSource,
};

impl Pan123Client {
    /// 上传任意来源，走完整的 create → 分片 → complete 协议
    pub async fn upload(
        &self,
        source: UploadSource,
        request: UploadRequest,
        protocol: UploadProtocol,
    ) -> Result<u64> {
        UploadEngine::new(self.clone(), source, request, protocol).run().await
    }

    /// 上传本地文件（V2 分片协议）
    pub async fn upload_file(&self, path: impl Into<PathBuf>, request: UploadRequest) -> Result<u64> {
        self.upload(UploadSource::from_path(path), request, UploadProtocol::V2).await
    }

    /// 上传内存数据（V2 分片协议）
    pub async fn upload_bytes(&self, data: Vec<u8>, request: UploadRequest) -> Result<u64> {
        self.upload(UploadSource::from_bytes(data), request, UploadProtocol::V2).await
    }

    /// V2 单步上传，适合不超过一个分片大小的小对象
    ///
    /// 整个对象连同摘要在一次 multipart 调用里送达专用上传域名。
    pub async fn upload_single(&self, source: UploadSource, request: UploadRequest) -> Result<u64> {
        let name = request.wire_name();
        let digest = SourceDigest::compute(&source).await?;
        let data = if digest.size == 0 {
            Vec::new()
        } else {
            let mut reader = SectionReader::open(&source, 0..digest.size, None).await?;
            let outcome = reader.read_to_end().await;
            reader.close();
            outcome?
        };

        let mut texts = vec![
            ("parentFileID", request.parent_id.to_string()),
            ("filename", name.clone()),
            ("etag", digest.etag.clone()),
            ("size", digest.size.to_string()),
        ];
        if let Some(policy) = request.duplicate {
            texts.push(("duplicate", policy.as_code().to_string()));
        }
        if request.contain_dir {
            texts.push(("containDir", "true".to_string()));
        }
        let fields = FormFields {
            texts,
            file: Some(FilePart {
                field: "file",
                file_name: name.clone(),
                data,
            }),
        };

        let data = self
            .request(&self.endpoints().single_create, Payload::Multipart(fields), None)
            .await?;
        let done: UploadCompleted = parse_data(data)?;
        if !done.completed || done.file_id == 0 {
            return Err(ClientError::ProtocolViolation("单步上传未确认完成".to_string()));
        }
        info!("单步上传完成: name={}, fileID={}", name, done.file_id);
        Ok(done.file_id)
    }

    /// V1 创建上传任务（同时探测秒传）
    pub async fn upload_create(
        &self,
        parent_id: u64,
        filename: &str,
        etag: &str,
        size: u64,
        duplicate: Option<DuplicatePolicy>,
        contain_dir: bool,
    ) -> Result<UploadCreated> {
        let data = self
            .request(
                &self.endpoints().upload_create,
                Payload::Json(create_payload(parent_id, filename, etag, size, duplicate, contain_dir)),
                None,
            )
            .await?;
        parse_data(data)
    }

    /// V2 创建上传任务（同时探测秒传，响应额外携带候选服务器）
    pub async fn upload_create_v2(
        &self,
        parent_id: u64,
        filename: &str,
        etag: &str,
        size: u64,
        duplicate: Option<DuplicatePolicy>,
        contain_dir: bool,
    ) -> Result<UploadCreated> {
        let data = self
            .request(
                &self.endpoints().upload_create_v2,
                Payload::Json(create_payload(parent_id, filename, etag, size, duplicate, contain_dir)),
                None,
            )
            .await?;
        parse_data(data)
    }

    /// V1 获取某个分片的预签名上传地址
    pub async fn get_upload_url(&self, preupload_id: &str, slice_no: u64) -> Result<String> {
        let data = self
            .request(
                &self.endpoints().get_upload_url,
                Payload::Json(json!({ "preuploadID": preupload_id, "sliceNo": slice_no })),
                None,
            )
            .await?;
        let url: UploadUrlData = parse_data(data)?;
        Ok(url.presigned_url)
    }

    /// V1 列出已上传的分片
    pub async fn list_upload_parts(&self, preupload_id: &str) -> Result<Vec<UploadedPart>> {
        let data = self
            .request(
                &self.endpoints().list_upload_parts,
                Payload::Json(json!({ "preuploadID": preupload_id })),
                None,
            )
            .await?;
        let parts: UploadPartsData = parse_data(data)?;
        Ok(parts.parts)
    }

    /// V1 完成上传
    pub async fn upload_complete(&self, preupload_id: &str) -> Result<UploadCompleted> {
        let data = self
            .request(
                &self.endpoints().upload_complete,
                Payload::Json(json!({ "preuploadID": preupload_id })),
                None,
            )
            .await?;
        parse_data(data)
    }

    /// V1 查询异步收尾结果
    pub async fn upload_async_result(&self, preupload_id: &str) -> Result<UploadCompleted> {
        let data = self
            .request(
                &self.endpoints().upload_async_result,
                Payload::Json(json!({ "preuploadID": preupload_id })),
                None,
            )
            .await?;
        parse_data(data)
    }

    /// V2 完成上传（服务端可能回 20103 表示合并尚未就绪）
    pub async fn upload_complete_v2(&self, preupload_id: &str) -> Result<UploadCompleted> {
        let data = self
            .request(
                &self.endpoints().upload_complete_v2,
                Payload::Json(json!({ "preuploadID": preupload_id })),
                None,
            )
            .await?;
        parse_data(data)
    }

    /// 获取 V2 上传候选域名列表
    pub async fn upload_domain(&self) -> Result<Vec<String>> {
        let data = self
            .request(&self.endpoints().upload_domain, Payload::Empty, None)
            .await?;
        parse_data(data)
    }
}

/// create 步骤的请求体（V1/V2 同构）
fn create_payload(
    parent_id: u64,
    filename: &str,
    etag: &str,
    size: u64,
    duplicate: Option<DuplicatePolicy>,
    contain_dir: bool,
) -> serde_json::Value {
    json!({
        "parentFileID": parent_id,
        "filename": filename,
        "etag": etag,
        "size": size,
        "duplicate": duplicate.map(DuplicatePolicy::as_code),
        "containDir": contain_dir,
    })
}
