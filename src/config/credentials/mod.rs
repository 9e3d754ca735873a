use super::schema::Config;
use tracing::debug;

macro_rules! define_credentials {
    ($( $name:literal, $env:literal => $($path:ident).+ );* $(;)?) => {
        /// All known credential slot names.
        pub const CREDENTIAL_NAMES: &[&str] = &[$($name),*];

        /// (slot name, env var name) pairs.
        pub const CREDENTIAL_ENV_VARS: &[(&str, &str)] = &[$(($name, $env)),*];

        /// Get the current value of a credential field by slot name.
        pub fn get_credential_value<'a>(config: &'a Config, name: &str) -> Option<&'a str> {
            match name {
                $($name => Some(config.$($path).+.as_str()),)*
                _ => None,
            }
        }

        /// Apply environment variable overrides.
        ///
        /// Any `CHATGATE_*` env var that is set and non-empty overwrites the
        /// corresponding config field, so secrets can be injected without
        /// touching the config file.
        pub fn apply_env_overrides(config: &mut Config) {
            $(
                if let Ok(val) = std::env::var($env)
                    && !val.is_empty()
                {
                    debug!("credential {} overridden from {}", $name, $env);
                    config.$($path).+ = val;
                }
            )*
        }
    };
}

define_credentials! {
    "openai-api-key",              "CHATGATE_OPENAI_API_KEY"              => providers.openai.api_key;
    "dashscope-api-key",           "CHATGATE_DASHSCOPE_API_KEY"           => providers.dashscope.api_key;
    "feishu-app-secret",           "CHATGATE_FEISHU_APP_SECRET"           => channels.feishu.app_secret;
    "feishu-verification-token",   "CHATGATE_FEISHU_VERIFICATION_TOKEN"   => channels.feishu.verification_token;
    "wechat-bridge-token",         "CHATGATE_WECHAT_BRIDGE_TOKEN"         => channels.wechat.bridge_token;
}

/// Slot names whose value is currently empty.
pub fn missing_credentials(config: &Config) -> Vec<&'static str> {
    CREDENTIAL_NAMES
        .iter()
        .copied()
        .filter(|name| get_credential_value(config, name).is_some_and(str::is_empty))
        .collect()
}
