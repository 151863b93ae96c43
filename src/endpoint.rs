//! 接口端点描述与限速闸门
//!
//! 开放平台按接口维度限制 QPS。每个端点持有一个独立的闸门：
//! - 任一时刻最多 rate 个许可在外
//! - 许可释放后进入 1 秒冷却，冷却结束才能再次分配
//! - rate 为 0 的端点不限速
//!
//! 冷却队列用单调时钟的到期时刻表示，不依赖一次性定时器。

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

/// 开放平台主接口域名
pub const BASE_URL: &str = "https://open-api.123pan.com";
/// 单步上传专用域名
pub const UPLOAD_BASE_URL: &str = "https://openapi-upload.123242.com";
/// 固定平台标识请求头的值
pub const PLATFORM: &str = "open_platform";

/// 许可释放后的冷却时长
const SLOT_COOLDOWN: Duration = Duration::from_secs(1);

/// 单个接口端点：地址、方法与每秒配额
#[derive(Debug)]
pub struct ApiEndpoint {
    pub url: String,
    pub method: reqwest::Method,
    gate: EndpointGate,
}

impl ApiEndpoint {
    pub fn new(url: impl Into<String>, method: reqwest::Method, rate: usize) -> Self {
        Self {
            url: url.into(),
            method,
            gate: EndpointGate::new(rate),
        }
    }

    /// 端点的限速闸门
    pub fn gate(&self) -> &EndpointGate {
        &self.gate
    }
}

/// 端点级限速闸门（漏桶语义）
#[derive(Debug)]
pub struct EndpointGate {
    rate: usize,
    state: Mutex<GateState>,
    notify: Notify,
}

#[derive(Debug, Default)]
struct GateState {
    /// 已发出、尚未释放的许可数
    in_flight: usize,
    /// 已释放、仍在冷却的槽位到期时刻（入队顺序即时间顺序）
    cooling: VecDeque<Instant>,
}

impl EndpointGate {
    pub fn new(rate: usize) -> Self {
        Self {
            rate,
            state: Mutex::new(GateState::default()),
            notify: Notify::new(),
        }
    }

    /// 配置的每秒配额，0 表示不限速
    pub fn rate(&self) -> usize {
        self.rate
    }

    /// 取得准入许可，必要时阻塞等待
    ///
    /// 许可由返回的守卫持有，析构时触发延迟归还。
    /// rate 为 0 时立即返回一个空许可。
    pub async fn acquire(&self) -> GatePermit<'_> {
        if self.rate == 0 {
            return GatePermit { gate: self };
        }
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);

            let wait_until = {
                let mut state = self.state.lock();
                let now = Instant::now();
                while state.cooling.front().map_or(false, |&t| t <= now) {
                    state.cooling.pop_front();
                }
                if state.in_flight + state.cooling.len() < self.rate {
                    state.in_flight += 1;
                    return GatePermit { gate: self };
                }
                // 持锁期间登记等待，释放方的唤醒不会丢失
                notified.as_mut().enable();
                state.cooling.front().copied()
            };

            match wait_until {
                // 等最早的冷却槽位到期，或等某个许可被释放
                Some(deadline) => {
                    tokio::select! {
                        _ = tokio::time::sleep_until(deadline) => {}
                        _ = &mut notified => {}
                    }
                }
                // 全部槽位都被在途请求占用，只能等释放
                None => notified.await,
            }
        }
    }

    /// 归还许可：槽位进入冷却，冷却结束前不可再分配
    fn release(&self) {
        if self.rate == 0 {
            return;
        }
        let mut state = self.state.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
        state.cooling.push_back(Instant::now() + SLOT_COOLDOWN);
        drop(state);
        self.notify.notify_waiters();
    }
}

/// 准入许可守卫
#[derive(Debug)]
pub struct GatePermit<'a> {
    gate: &'a EndpointGate,
}

impl Drop for GatePermit<'_> {
    fn drop(&mut self) {
        self.gate.release();
    }
}

/// 全部开放接口端点，随客户端构造一次、全程共享
#[derive(Debug)]
pub struct ApiEndpoints {
    pub access_token: ApiEndpoint,
    pub user_info: ApiEndpoint,
    pub file_detail: ApiEndpoint,
    pub file_infos: ApiEndpoint,
    pub file_list: ApiEndpoint,
    pub file_list_v2: ApiEndpoint,
    pub file_trash: ApiEndpoint,
    pub file_delete: ApiEndpoint,
    pub file_recover: ApiEndpoint,
    pub file_move: ApiEndpoint,
    pub file_name: ApiEndpoint,
    pub file_rename: ApiEndpoint,
    pub download_info: ApiEndpoint,
    pub upload_domain: ApiEndpoint,
    pub mkdir: ApiEndpoint,
    pub upload_create: ApiEndpoint,
    pub upload_create_v2: ApiEndpoint,
    pub single_create: ApiEndpoint,
    pub list_upload_parts: ApiEndpoint,
    pub get_upload_url: ApiEndpoint,
    pub upload_complete: ApiEndpoint,
    pub upload_complete_v2: ApiEndpoint,
    pub upload_async_result: ApiEndpoint,
    pub offline_download: ApiEndpoint,
    pub offline_process: ApiEndpoint,
}

impl ApiEndpoints {
    /// 按配置的域名构造端点表
    ///
    /// 各端点的限速值对应开放平台公布的 QPS 配额，未公布的按不限速处理。
    pub fn new(base_url: &str, upload_base_url: &str) -> Self {
        use reqwest::Method;
        let base = base_url.trim_end_matches('/');
        let upload_base = upload_base_url.trim_end_matches('/');
        Self {
            access_token: ApiEndpoint::new(format!("{}/api/v1/access_token", base), Method::POST, 0),
            user_info: ApiEndpoint::new(format!("{}/api/v1/user/info", base), Method::GET, 0),
            file_detail: ApiEndpoint::new(format!("{}/api/v1/file/detail", base), Method::GET, 0),
            file_infos: ApiEndpoint::new(format!("{}/api/v1/file/infos", base), Method::POST, 10),
            file_list: ApiEndpoint::new(format!("{}/api/v1/file/list", base), Method::GET, 10),
            file_list_v2: ApiEndpoint::new(format!("{}/api/v2/file/list", base), Method::GET, 8),
            file_trash: ApiEndpoint::new(format!("{}/api/v1/file/trash", base), Method::POST, 0),
            file_delete: ApiEndpoint::new(format!("{}/api/v1/file/delete", base), Method::POST, 10),
            file_recover: ApiEndpoint::new(format!("{}/api/v1/file/recover", base), Method::POST, 0),
            file_move: ApiEndpoint::new(format!("{}/api/v1/file/move", base), Method::POST, 0),
            file_name: ApiEndpoint::new(format!("{}/api/v1/file/name", base), Method::PUT, 0),
            file_rename: ApiEndpoint::new(format!("{}/api/v1/file/rename", base), Method::POST, 0),
            download_info: ApiEndpoint::new(format!("{}/api/v1/file/download_info", base), Method::GET, 0),
            upload_domain: ApiEndpoint::new(format!("{}/upload/v2/file/domain", base), Method::GET, 0),
            mkdir: ApiEndpoint::new(format!("{}/upload/v1/file/mkdir", base), Method::POST, 15),
            upload_create: ApiEndpoint::new(format!("{}/upload/v1/file/create", base), Method::POST, 20),
            upload_create_v2: ApiEndpoint::new(format!("{}/upload/v2/file/create", base), Method::POST, 20),
            single_create: ApiEndpoint::new(
                format!("{}/upload/v2/file/single/create", upload_base),
                Method::POST,
                0,
            ),
            list_upload_parts: ApiEndpoint::new(
                format!("{}/upload/v1/file/list_upload_parts", base),
                Method::POST,
                0,
            ),
            get_upload_url: ApiEndpoint::new(format!("{}/upload/v1/file/get_upload_url", base), Method::POST, 0),
            upload_complete: ApiEndpoint::new(format!("{}/upload/v1/file/upload_complete", base), Method::POST, 0),
            upload_complete_v2: ApiEndpoint::new(
                format!("{}/upload/v2/file/upload_complete", base),
                Method::POST,
                0,
            ),
            upload_async_result: ApiEndpoint::new(
                format!("{}/upload/v1/file/upload_async_result", base),
                Method::POST,
                20,
            ),
            offline_download: ApiEndpoint::new(format!("{}/api/v1/offline/download", base), Method::POST, 5),
            offline_process: ApiEndpoint::new(
                format!("{}/api/v1/offline/download/process", base),
                Method::GET,
                10,
            ),
        }
    }

    /// V2 分片上传端点（目标服务器来自 create 响应，限速由服务器侧承担）
    pub fn slice_endpoint(server: &str) -> ApiEndpoint {
        ApiEndpoint::new(
            format!("{}/upload/v2/file/slice", server.trim_end_matches('/')),
            reqwest::Method::POST,
            0,
        )
    }
}
