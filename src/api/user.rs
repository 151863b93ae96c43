//! 用户接口

use crate::client::{Pan123Client, Payload};
use crate::error::Result;
use crate::types::{parse_data, UserInfo};

impl Pan123Client {
    /// 获取当前用户信息
    pub async fn user_info(&self) -> Result<UserInfo> {
        let data = self
            .request(&self.endpoints().user_info, Payload::Empty, None)
            .await?;
        parse_data(data)
    }
}
