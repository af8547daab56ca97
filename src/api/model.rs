//! Config records exchanged with the server besides plain content.

use crate::config::target::WatchTarget;
use serde::{Deserialize, Deserializer};

/// Content type of a config.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigType {
    Text,
    Json,
    Xml,
    Yaml,
    Html,
    Properties,
    Toml,
}

impl ConfigType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigType::Text => "text",
            ConfigType::Json => "json",
            ConfigType::Xml => "xml",
            ConfigType::Yaml => "yaml",
            ConfigType::Html => "html",
            ConfigType::Properties => "properties",
            ConfigType::Toml => "toml",
        }
    }
}

/// A config to publish along with its metadata.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NewConfig {
    /// Namespace/Tenant, `""` for the client's default namespace.
    pub namespace: String,
    pub group: String,
    pub data_id: String,
    pub content: String,
    pub tags: Vec<String>,
    pub app_name: Option<String>,
    pub operator: Option<String>,
    pub description: Option<String>,
    pub config_use: Option<String>,
    pub effect: Option<String>,
    pub schema: Option<String>,
    pub config_type: Option<ConfigType>,
}

impl NewConfig {
    pub fn new(
        namespace: impl Into<String>,
        group: impl Into<String>,
        data_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        NewConfig {
            namespace: namespace.into(),
            group: group.into(),
            data_id: data_id.into(),
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = Some(app_name.into());
        self
    }

    pub fn operator(mut self, operator: impl Into<String>) -> Self {
        self.operator = Some(operator.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn config_use(mut self, config_use: impl Into<String>) -> Self {
        self.config_use = Some(config_use.into());
        self
    }

    pub fn effect(mut self, effect: impl Into<String>) -> Self {
        self.effect = Some(effect.into());
        self
    }

    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn config_type(mut self, config_type: ConfigType) -> Self {
        self.config_type = Some(config_type);
        self
    }

    /// The untagged target this config is published to.
    pub fn target(&self) -> WatchTarget {
        WatchTarget::new(
            self.namespace.as_str(),
            self.group.as_str(),
            self.data_id.as_str(),
            None,
        )
    }
}

/// A config with all of its details, as returned by `show=all`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigDetail {
    #[serde(deserialize_with = "lenient_string")]
    pub id: String,
    pub data_id: String,
    pub group: String,
    #[serde(rename = "tenant", deserialize_with = "lenient_string")]
    pub namespace: String,
    pub content: String,
    pub md5: Option<String>,
    pub app_name: Option<String>,
    /// Raw content type, see [`ConfigType`] for the known ones.
    #[serde(rename = "type")]
    pub config_type: Option<String>,
    pub create_time: Option<i64>,
    pub modify_time: Option<i64>,
    pub create_user: Option<String>,
    pub create_ip: Option<String>,
    #[serde(rename = "desc")]
    pub description: Option<String>,
    #[serde(rename = "use")]
    pub config_use: Option<String>,
    pub effect: Option<String>,
    pub schema: Option<String>,
    /// Comma separated.
    #[serde(rename = "configTags")]
    pub tags: Option<String>,
}

/// One recorded revision of a config.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HistoryConfig {
    /// Query it with [`ConfigService::get_history_config`](crate::api::config::ConfigService::get_history_config).
    #[serde(rename = "id", deserialize_with = "lenient_i64")]
    pub revision: Option<i64>,
    #[serde(rename = "lastId", deserialize_with = "lenient_i64")]
    pub last_revision: Option<i64>,
    pub data_id: String,
    pub group: String,
    #[serde(rename = "tenant", deserialize_with = "lenient_string")]
    pub namespace: String,
    pub app_name: Option<String>,
    pub md5: Option<String>,
    pub content: Option<String>,
    #[serde(rename = "srcUser")]
    pub operator: Option<String>,
    #[serde(rename = "srcIp")]
    pub operator_ip: Option<String>,
    /// `I`, `U` or `D`, possibly space padded.
    #[serde(rename = "opType")]
    pub operation_type: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub created_time: String,
    #[serde(deserialize_with = "lenient_string")]
    pub last_modified_time: String,
}

/// One page of a paged query.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Page<T> {
    pub total_count: u64,
    /// 1-based.
    pub page_number: u32,
    pub page_size: u32,
    pub pages_available: u32,
    pub elements: Vec<T>,
}

impl<T> Page<T> {
    pub fn is_first(&self) -> bool {
        self.page_number <= 1
    }

    pub fn is_last(&self) -> bool {
        self.page_number >= self.pages_available
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Lenient {
    Number(i64),
    Text(String),
}

/// Servers differ in rendering ids and timestamps as numbers or strings.
fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Option::<Lenient>::deserialize(deserializer)? {
        Some(Lenient::Number(n)) => n.to_string(),
        Some(Lenient::Text(s)) => s,
        None => String::new(),
    })
}

fn lenient_i64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
    Ok(match Option::<Lenient>::deserialize(deserializer)? {
        Some(Lenient::Number(n)) => Some(n),
        Some(Lenient::Text(s)) => s.trim().parse().ok(),
        None => None,
    })
}
