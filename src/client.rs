//! 客户端与请求调度
//!
//! 所有开放接口调用都经过 `request`：
//! - 先取端点闸门的准入许可（许可覆盖整次尝试，释放后冷却 1 秒）
//! - 连接失败、响应体不可解析视为瞬时故障，固定间隔无限重试
//! - 业务码 401/400 触发一次 access_token 刷新后重放，仅一次
//! - 业务码 429 短暂退避后重放，不限次数
//! - 其余非零业务码立即以 ApiRejected 终止
//!
//! access_token 是客户端的显式会话状态，刷新对所有后续调用生效。

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_recursion::async_recursion;
use chrono::{DateTime, FixedOffset};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::multipart;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::endpoint::{ApiEndpoint, ApiEndpoints, PLATFORM};
use crate::error::{ClientError, Result};
use crate::types::ApiResponse;

/// 瞬时传输故障的重试间隔
const TRANSPORT_RETRY_DELAY: Duration = Duration::from_secs(3);
/// 触发限流（429）后的重试间隔
const RATE_LIMIT_RETRY_DELAY: Duration = Duration::from_millis(500);
/// 连接超时
const CONNECT_TIMEOUT: Duration = Duration::from_secs(4);
/// 单次请求总超时
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// 123 云盘开放平台客户端
///
/// 内部全部为共享状态，Clone 开销极小，可在任务间自由传递。
#[derive(Debug, Clone)]
pub struct Pan123Client {
    http: reqwest::Client,
    config: Arc<ClientConfig>,
    endpoints: Arc<ApiEndpoints>,
    token: Arc<RwLock<TokenState>>,
}

/// 会话凭证状态
#[derive(Debug, Default, Clone)]
struct TokenState {
    access_token: String,
    expires_at: Option<DateTime<FixedOffset>>,
}

/// 请求负载
pub(crate) enum Payload {
    /// 无负载（GET 无参数等）
    Empty,
    /// JSON 负载；GET 请求转为查询参数（null 字段跳过）
    Json(Value),
    /// multipart 表单负载
    Multipart(FormFields),
}

/// multipart 表单字段
///
/// reqwest 的 `Form` 不可复用，这里保留原始字段，每次尝试重新构造。
pub(crate) struct FormFields {
    pub texts: Vec<(&'static str, String)>,
    pub file: Option<FilePart>,
}

/// multipart 中携带的文件块
pub(crate) struct FilePart {
    pub field: &'static str,
    pub file_name: String,
    pub data: Vec<u8>,
}

impl FormFields {
    fn build(&self) -> Result<multipart::Form> {
        let mut form = multipart::Form::new();
        for (name, value) in &self.texts {
            form = form.text(*name, value.clone());
        }
        if let Some(ref part) = self.file {
            let block = multipart::Part::bytes(part.data.clone())
                .file_name(part.file_name.clone())
                .mime_str("application/octet-stream")?;
            form = form.part(part.field, block);
        }
        Ok(form)
    }
}

/// 单次发送的结果分类
enum SendOutcome {
    /// 结构完整的响应包装
    Envelope(ApiResponse),
    /// 瞬时故障：连接失败、超时、响应体不是合法 JSON
    Transient(String),
}

impl Pan123Client {
    /// 使用应用凭证创建客户端
    pub async fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Result<Self> {
        Self::with_config(ClientConfig::new(client_id, client_secret)).await
    }

    /// 使用完整配置创建客户端
    ///
    /// HTTP 连接池、代理与 TLS 选项在此一次性固定，之后不可变更。
    pub async fn with_config(config: ClientConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .redirect(reqwest::redirect::Policy::limited(10));
        if let Some(ref proxy) = config.proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy)?);
            info!("使用代理: {}", proxy);
        }
        if config.accept_invalid_certs {
            warn!("已跳过 TLS 证书校验");
            builder = builder.danger_accept_invalid_certs(true);
        }
        let http = builder.build()?;

        let access_token = match config.token_file {
            Some(ref path) => load_or_seed_token(path, &config.access_token).await?,
            None => config.access_token.clone(),
        };

        let endpoints = ApiEndpoints::new(&config.base_url, &config.upload_base_url);
        debug!("客户端初始化完成: base_url={}", config.base_url);
        Ok(Self {
            http,
            config: Arc::new(config),
            endpoints: Arc::new(endpoints),
            token: Arc::new(RwLock::new(TokenState {
                access_token,
                expires_at: None,
            })),
        })
    }

    /// 当前持有的 access_token（可能为空串）
    pub async fn access_token(&self) -> String {
        self.token.read().await.access_token.clone()
    }

    /// 当前 access_token 的到期时间（仅在刷新过之后已知）
    pub async fn token_expires_at(&self) -> Option<DateTime<FixedOffset>> {
        self.token.read().await.expires_at
    }

    pub(crate) fn endpoints(&self) -> &ApiEndpoints {
        &self.endpoints
    }

    /// 执行一次逻辑调用，返回响应包装中的 data 字段
    pub(crate) async fn request(
        &self,
        api: &ApiEndpoint,
        payload: Payload,
        extra_headers: Option<HeaderMap>,
    ) -> Result<Value> {
        self.request_inner(api, payload, extra_headers, true).await
    }

    /// 调度循环本体
    ///
    /// `allow_refresh` 控制本次逻辑调用是否还允许刷新凭证；
    /// 刷新内部的 access_token 调用以 false 进入，保证递归有界。
    #[async_recursion]
    async fn request_inner(
        &self,
        api: &ApiEndpoint,
        payload: Payload,
        extra_headers: Option<HeaderMap>,
        mut allow_refresh: bool,
    ) -> Result<Value> {
        loop {
            let headers = self.build_headers(extra_headers.as_ref()).await?;
            let outcome = {
                // 许可覆盖整次尝试，作用域结束即进入冷却
                let _permit = api.gate().acquire().await;
                self.send_once(api, &payload, headers).await?
            };

            let envelope = match outcome {
                SendOutcome::Envelope(envelope) => envelope,
                SendOutcome::Transient(reason) => {
                    warn!(
                        "请求瞬时失败, {}秒后重试: url={}, 原因: {}",
                        TRANSPORT_RETRY_DELAY.as_secs(),
                        api.url,
                        reason
                    );
                    tokio::time::sleep(TRANSPORT_RETRY_DELAY).await;
                    continue;
                }
            };

            debug!(
                "响应: url={}, code={}, message={}, traceID={}",
                api.url, envelope.code, envelope.message, envelope.trace_id
            );
            if envelope.is_success() {
                return Ok(envelope.data);
            }
            match envelope.code {
                401 | 400 if allow_refresh => {
                    info!("凭证失效(code={}), 刷新 access_token 后重放", envelope.code);
                    allow_refresh = false;
                    self.refresh_access_token().await?;
                }
                429 => {
                    warn!("触发限流: url={}, {}ms 后重试", api.url, RATE_LIMIT_RETRY_DELAY.as_millis());
                    tokio::time::sleep(RATE_LIMIT_RETRY_DELAY).await;
                }
                code => {
                    return Err(ClientError::ApiRejected {
                        code,
                        message: envelope.message,
                    });
                }
            }
        }
    }

    /// 发送一次请求并把结果分类
    ///
    /// 返回 Err 仅代表不可恢复的构造类失败；网络层故障归入 Transient。
    async fn send_once(
        &self,
        api: &ApiEndpoint,
        payload: &Payload,
        headers: HeaderMap,
    ) -> Result<SendOutcome> {
        let mut builder = self.http.request(api.method.clone(), &api.url).headers(headers);
        builder = match payload {
            Payload::Empty => builder,
            Payload::Json(body) => {
                if api.method == reqwest::Method::GET {
                    builder.query(&query_pairs(body))
                } else {
                    builder.json(body)
                }
            }
            Payload::Multipart(fields) => builder.multipart(fields.build()?),
        };

        let response = match builder.send().await {
            Ok(response) => response,
            // 请求本身构造失败无法靠重试恢复
            Err(e) if e.is_builder() => return Err(ClientError::Http(e)),
            Err(e) => return Ok(SendOutcome::Transient(e.to_string())),
        };

        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => return Ok(SendOutcome::Transient(format!("读取响应体失败: {}", e))),
        };
        debug!("HTTP {} {} -> {} ({}字节)", api.method, api.url, status, body.len());

        match serde_json::from_str::<ApiResponse>(&body) {
            Ok(envelope) => Ok(SendOutcome::Envelope(envelope)),
            Err(e) => Ok(SendOutcome::Transient(format!("响应体不是合法JSON: {}", e))),
        }
    }

    /// 组装固定请求头，再叠加调用方自定义头
    async fn build_headers(&self, extra: Option<&HeaderMap>) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        let token = self.token.read().await.access_token.clone();
        if !token.is_empty() {
            let bearer = format!("Bearer {}", token);
            let value = HeaderValue::from_str(&bearer)
                .map_err(|e| ClientError::ProtocolViolation(format!("access_token 含非法字符: {}", e)))?;
            headers.insert(AUTHORIZATION, value);
        }
        headers.insert("Platform", HeaderValue::from_static(PLATFORM));
        if let Some(extra) = extra {
            for (name, value) in extra {
                headers.insert(name.clone(), value.clone());
            }
        }
        Ok(headers)
    }

    /// 用应用凭证换取新的 access_token
    ///
    /// 成功后覆盖会话凭证；配置了 token 文件时同步回写。
    pub async fn refresh_access_token(&self) -> Result<String> {
        let payload = serde_json::json!({
            "clientID": self.config.client_id,
            "clientSecret": self.config.client_secret,
        });
        let data = self
            .request_inner(&self.endpoints.access_token, Payload::Json(payload), None, false)
            .await?;

        let access_token = data
            .get("accessToken")
            .and_then(Value::as_str)
            .ok_or_else(|| ClientError::ProtocolViolation("access_token 响应缺少 accessToken".to_string()))?
            .to_string();
        let expires_at = data
            .get("expiredAt")
            .and_then(Value::as_str)
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok());
        match expires_at {
            Some(at) => info!("access_token 已刷新, 到期时间: {}", at),
            None => info!("access_token 已刷新"),
        }

        {
            let mut token = self.token.write().await;
            token.access_token = access_token.clone();
            token.expires_at = expires_at;
        }
        if let Some(ref path) = self.config.token_file {
            tokio::fs::write(path, &access_token).await?;
            debug!("access_token 已写入 {:?}", path);
        }
        Ok(access_token)
    }

    /// 把分片字节 PUT 到预签名地址（不走统一响应包装）
    pub(crate) async fn put_presigned(&self, url: &str, data: Vec<u8>) -> Result<()> {
        let response = self.http.put(url).body(data).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::ProtocolViolation(format!(
                "预签名上传返回 {}: {}",
                status, body
            )));
        }
        Ok(())
    }

    /// 跟随全部重定向，返回最终地址
    pub(crate) async fn resolve_final_url(&self, url: &str) -> Result<String> {
        let response = self.http.head(url).send().await?;
        Ok(response.url().to_string())
    }
}

/// GET 请求把 JSON 对象摊平成查询参数，null 字段跳过
fn query_pairs(body: &Value) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    if let Some(map) = body.as_object() {
        for (key, value) in map {
            match value {
                Value::Null => {}
                Value::String(s) => pairs.push((key.clone(), s.clone())),
                other => pairs.push((key.clone(), other.to_string())),
            }
        }
    }
    pairs
}

/// 读取 token 文件；文件缺失或为空时写入配置提供的初始 token
///
/// 非空文件优先于配置值，与手工编辑过的 token 文件保持一致。
async fn load_or_seed_token(path: &Path, initial: &str) -> Result<String> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => {
            let stored = content.trim();
            if stored.is_empty() {
                if !initial.is_empty() {
                    tokio::fs::write(path, initial).await?;
                }
                Ok(initial.to_string())
            } else {
                Ok(stored.to_string())
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            if !initial.is_empty() {
                if let Some(parent) = path.parent() {
                    if !parent.as_os_str().is_empty() {
                        tokio::fs::create_dir_all(parent).await?;
                    }
                }
                tokio::fs::write(path, initial).await?;
            }
            Ok(initial.to_string())
        }
        Err(e) => Err(ClientError::Io(e)),
    }
}
