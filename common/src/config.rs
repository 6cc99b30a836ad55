use crate::deserialize_optional_name::empty_string_as_none;
use crate::utils::{ENV_DISABLE_CACHE, ENV_MANUAL_INIT, ENV_RETRY_PROVIDER, env_flag, env_string};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

pub const OPTION_CACHE_DISABLED: &str = "cacheDisabled";
pub const OPTION_RETRY_CALLBACK_PROVIDER: &str = "retryCallbackProvider";

/// The option bag handed to the cache engine when it is initialized.
///
/// `cacheDisabled` and `retryCallbackProvider` are understood by the binding
/// layer itself, every other key is passed through to the engine untouched.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineOptions {
    #[serde(default)]
    pub cache_disabled: bool,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub retry_callback_provider: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EngineOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: &str, value: Value) {
        match name {
            OPTION_CACHE_DISABLED => match value.as_bool() {
                Some(disabled) => self.cache_disabled = disabled,
                None => warn!("Ignoring non-boolean {OPTION_CACHE_DISABLED}: {value}"),
            },
            OPTION_RETRY_CALLBACK_PROVIDER => match value {
                Value::Null => self.retry_callback_provider = None,
                Value::String(provider) if provider.trim().is_empty() => {
                    self.retry_callback_provider = None
                }
                Value::String(provider) => {
                    self.retry_callback_provider = Some(provider.trim().to_string())
                }
                other => warn!("Ignoring non-string {OPTION_RETRY_CALLBACK_PROVIDER}: {other}"),
            },
            _ => {
                debug!("Setting engine option {name} = {value}");
                self.extra.insert(name.to_string(), value);
            }
        }
    }

    pub fn merge(&mut self, options: Map<String, Value>) {
        for (name, value) in options {
            self.set(&name, value);
        }
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        match name {
            OPTION_CACHE_DISABLED => Some(Value::Bool(self.cache_disabled)),
            OPTION_RETRY_CALLBACK_PROVIDER => self
                .retry_callback_provider
                .as_ref()
                .map(|provider| Value::String(provider.clone())),
            _ => self.extra.get(name).cloned(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    /// When set the host must call `init` itself, nothing is started on construction.
    #[serde(default)]
    pub manual_init: bool,
    #[serde(default)]
    pub options: EngineOptions,
}

impl CacheConfig {
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::new()
    }

    pub fn into_builder(self) -> CacheConfigBuilder {
        CacheConfigBuilder { config: self }
    }

    pub fn from_json(input: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<Self>(input)
    }

    /// Defaults overridden by `IMGCACHE_*` environment variables.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    pub fn with_env_overrides(mut self) -> Self {
        if let Some(disabled) = env_flag(ENV_DISABLE_CACHE) {
            self.options.cache_disabled = disabled;
        }

        if let Some(manual_init) = env_flag(ENV_MANUAL_INIT) {
            self.manual_init = manual_init;
        }

        if let Some(provider) = env_string(ENV_RETRY_PROVIDER) {
            self.options.retry_callback_provider = Some(provider.trim().to_string());
        }

        self
    }
}

pub struct CacheConfigBuilder {
    config: CacheConfig,
}

impl Default for CacheConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: CacheConfig::default(),
        }
    }

    pub fn manual_init(mut self, manual_init: bool) -> Self {
        self.config.manual_init = manual_init;

        self
    }

    pub fn set_options(mut self, options: Map<String, Value>) -> Self {
        self.config.options.merge(options);

        self
    }

    pub fn set_option(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.config.options.set(name, value.into());

        self
    }

    pub fn disable_cache(mut self, disabled: bool) -> Self {
        self.config.options.cache_disabled = disabled;

        self
    }

    pub fn retry_callback_provider(mut self, name: impl Into<String>) -> Self {
        self.config
            .options
            .set(OPTION_RETRY_CALLBACK_PROVIDER, Value::String(name.into()));

        self
    }

    pub fn build(self) -> CacheConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn known_option_names_route_to_typed_fields() {
        let config = CacheConfig::builder()
            .set_option("cacheDisabled", true)
            .set_option("retryCallbackProvider", "offlineRetry")
            .set_option("chromeQuota", 10 * 1024 * 1024)
            .build();

        assert!(config.options.cache_disabled);
        assert_eq!(
            config.options.retry_callback_provider.as_deref(),
            Some("offlineRetry")
        );
        assert_eq!(config.options.get("chromeQuota"), Some(json!(10485760)));
        assert!(!config.options.extra.contains_key("cacheDisabled"));
    }

    #[test]
    fn set_options_merges_instead_of_replacing() {
        let mut first = Map::new();
        first.insert("localCacheFolder".into(), json!("imgcache"));
        first.insert("debug".into(), json!(false));

        let mut second = Map::new();
        second.insert("debug".into(), json!(true));

        let config = CacheConfig::builder()
            .set_options(first)
            .set_options(second)
            .build();

        assert_eq!(config.options.get("localCacheFolder"), Some(json!("imgcache")));
        assert_eq!(config.options.get("debug"), Some(json!(true)));
    }

    #[test]
    fn empty_provider_name_disables_retry() {
        let config = CacheConfig::builder().retry_callback_provider("  ").build();

        assert_eq!(config.options.retry_callback_provider, None);
    }

    #[test]
    fn wrongly_typed_known_option_is_ignored() {
        let config = CacheConfig::builder()
            .set_option("cacheDisabled", "yes please")
            .build();

        assert!(!config.options.cache_disabled);
    }

    #[test]
    fn deserializes_from_json() {
        let config = CacheConfig::from_json(
            r#"{
                "manualInit": true,
                "options": {
                    "cacheDisabled": false,
                    "retryCallbackProvider": "",
                    "usePersistentCache": true
                }
            }"#,
        )
        .unwrap();

        assert!(config.manual_init);
        assert_eq!(config.options.retry_callback_provider, None);
        assert_eq!(config.options.get("usePersistentCache"), Some(json!(true)));
    }

    #[test]
    fn rejects_unknown_top_level_fields() {
        assert!(CacheConfig::from_json(r#"{ "manual": true }"#).is_err());
    }
}
