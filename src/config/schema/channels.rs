use serde::{Deserialize, Serialize};

#[derive(Clone, Serialize, Deserialize)]
pub struct FeishuConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, rename = "appId")]
    pub app_id: String,
    #[serde(default, rename = "appSecret")]
    pub app_secret: String,
    /// Token Feishu puts in `header.token` of every event callback.
    #[serde(default, rename = "verificationToken")]
    pub verification_token: String,
    /// Name the bot is mentioned by in group chats.
    #[serde(default, rename = "botName")]
    pub bot_name: String,
    #[serde(default = "default_feishu_api_base", rename = "apiBase")]
    pub api_base: String,
    #[serde(default = "default_feishu_dedup_secs", rename = "dedupHorizonSecs")]
    pub dedup_horizon_secs: u64,
}

impl Default for FeishuConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            app_id: String::new(),
            app_secret: String::new(),
            verification_token: String::new(),
            bot_name: String::new(),
            api_base: default_feishu_api_base(),
            dedup_horizon_secs: default_feishu_dedup_secs(),
        }
    }
}

redact_debug!(
    FeishuConfig,
    enabled,
    app_id,
    redact(app_secret),
    redact(verification_token),
    bot_name,
    api_base,
    dedup_horizon_secs,
);

fn default_feishu_api_base() -> String {
    "https://open.feishu.cn/open-apis".to_string()
}

fn default_feishu_dedup_secs() -> u64 {
    // 7.1 hours, slightly above Feishu's redelivery window
    25_560
}

/// WeChat personal accounts are reached through an HTTP bridge process that
/// holds the web session and exposes send/revoke endpoints.
#[derive(Clone, Serialize, Deserialize)]
pub struct WechatConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, rename = "bridgeUrl")]
    pub bridge_url: String,
    /// Shared secret sent as `X-Bridge-Token` in both directions.
    #[serde(default, rename = "bridgeToken")]
    pub bridge_token: String,
    /// Drop replayed history after a bridge reconnect.
    #[serde(default, rename = "hotReload")]
    pub hot_reload: bool,
    #[serde(default = "default_expires_in_seconds", rename = "expiresInSeconds")]
    pub expires_in_seconds: u64,
    #[serde(default = "default_raw_dedup_secs", rename = "rawDedupSecs")]
    pub raw_dedup_secs: u64,
    /// Answer group messages even without an @mention.
    #[serde(default, rename = "noNeedAt")]
    pub no_need_at: bool,
}

impl Default for WechatConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bridge_url: String::new(),
            bridge_token: String::new(),
            hot_reload: false,
            expires_in_seconds: default_expires_in_seconds(),
            raw_dedup_secs: default_raw_dedup_secs(),
            no_need_at: false,
        }
    }
}

redact_debug!(
    WechatConfig,
    enabled,
    bridge_url,
    redact(bridge_token),
    hot_reload,
    expires_in_seconds,
    raw_dedup_secs,
    no_need_at,
);

fn default_expires_in_seconds() -> u64 {
    3600
}

fn default_raw_dedup_secs() -> u64 {
    600
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChannelsConfig {
    #[serde(default)]
    pub feishu: FeishuConfig,
    #[serde(default)]
    pub wechat: WechatConfig,
}
