//! 客户端配置
//!
//! 配置可以整体从 TOML 文件读入，也可以在代码里逐项构造。
//! 只有 client_id/client_secret 是必填项，其余都有默认值。

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::endpoint::{BASE_URL, UPLOAD_BASE_URL};

/// 客户端配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// 开放平台应用的 client_id
    #[serde(default)]
    pub client_id: String,
    /// 开放平台应用的 client_secret
    #[serde(default)]
    pub client_secret: String,
    /// 初始 access_token，留空则首次请求时自动换取
    #[serde(default)]
    pub access_token: String,
    /// token 持久化文件路径，设置后每次刷新都会回写
    #[serde(default)]
    pub token_file: Option<PathBuf>,
    /// 主接口域名
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// 单步上传域名
    #[serde(default = "default_upload_base_url")]
    pub upload_base_url: String,
    /// HTTP/SOCKS 代理地址，如 socks5://127.0.0.1:1080
    #[serde(default)]
    pub proxy: Option<String>,
    /// 跳过 TLS 证书校验（仅供抓包调试）
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

fn default_base_url() -> String {
    BASE_URL.to_string()
}

fn default_upload_base_url() -> String {
    UPLOAD_BASE_URL.to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            access_token: String::new(),
            token_file: None,
            base_url: default_base_url(),
            upload_base_url: default_upload_base_url(),
            proxy: None,
            accept_invalid_certs: false,
        }
    }
}

impl ClientConfig {
    /// 使用应用凭证构造最小配置
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            ..Default::default()
        }
    }

    /// 从 TOML 文件加载配置
    pub async fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("读取配置文件失败: {:?}", path))?;
        let config: ClientConfig =
            toml::from_str(&content).with_context(|| format!("解析配置文件失败: {:?}", path))?;
        info!("配置已加载: {:?}", path);
        Ok(config)
    }

    /// 把配置写入 TOML 文件，必要时创建父目录
    pub async fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("创建配置目录失败: {:?}", parent))?;
            }
        }
        let content = toml::to_string_pretty(self).context("序列化配置失败")?;
        tokio::fs::write(path, content)
            .await
            .with_context(|| format!("写入配置文件失败: {:?}", path))?;
        info!("配置已保存: {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.base_url, "https://open-api.123pan.com");
        assert_eq!(config.upload_base_url, "https://openapi-upload.123242.com");
        assert!(config.token_file.is_none());
        assert!(!config.accept_invalid_certs);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        // 只写凭证的最小配置文件
        let config: ClientConfig = toml::from_str(
            r#"
            client_id = "my-id"
            client_secret = "my-secret"
            "#,
        )
        .unwrap();
        assert_eq!(config.client_id, "my-id");
        assert_eq!(config.base_url, BASE_URL);
        assert!(config.proxy.is_none());
    }

    #[tokio::test]
    async fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub").join("pan123.toml");

        let mut config = ClientConfig::new("id-1", "secret-1");
        config.proxy = Some("socks5://127.0.0.1:1080".to_string());
        config.token_file = Some(dir.path().join("token.txt"));
        config.save_to_file(&path).await.unwrap();

        let loaded = ClientConfig::load_from_file(&path).await.unwrap();
        assert_eq!(loaded.client_id, "id-1");
        assert_eq!(loaded.client_secret, "secret-1");
        assert_eq!(loaded.proxy.as_deref(), Some("socks5://127.0.0.1:1080"));
        assert_eq!(loaded.token_file, config.token_file);
    }

    #[tokio::test]
    async fn test_load_missing_file_fails() {
        let err = ClientConfig::load_from_file("/nonexistent/pan123.toml")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("读取配置文件失败"));
    }
}
