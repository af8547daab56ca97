#[cfg(feature = "http")]
pub mod http;

use crate::api::error::{Error, Result};
use crate::api::model::{ConfigDetail, HistoryConfig, NewConfig, Page};
use crate::config::target::WatchTarget;
use async_trait::async_trait;
use md5::{Digest, Md5};
#[cfg(test)]
use mockall::automock;
use std::collections::HashSet;
use std::time::Duration;

/// One entry of a long-polling batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WatchItem {
    pub target: WatchTarget,
    /// md5 the client currently holds, `""` if none.
    pub digest: String,
}

/// Content of a config together with its md5.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfigContent {
    pub content: String,
    pub digest: String,
}

impl ConfigContent {
    /// Wrap `content`, computing its digest.
    pub fn new(content: impl Into<String>) -> Self {
        let content = content.into();
        let digest = md5_hex(&content);
        Self { content, digest }
    }
}

/// Lowercase hex md5 of `content`, the digest the Nacos server compares.
pub fn md5_hex(content: &str) -> String {
    hex::encode(Md5::digest(content.as_bytes()))
}

/// Request/response access to the config service.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ConfigTransport: Send + Sync + 'static {
    /// Hold until a config in `batch` no longer matches its digest or `hold`
    /// elapses; returns the changed targets, empty when nothing changed.
    async fn listen(&self, batch: &[WatchItem], hold: Duration) -> Result<HashSet<WatchTarget>>;

    /// Current content of `target`, `None` if the server has no such config.
    async fn fetch(&self, target: &WatchTarget) -> Result<Option<ConfigContent>>;

    /// Create or overwrite the untagged config described by `config`.
    async fn publish(&self, config: &NewConfig) -> Result<bool>;

    async fn remove(&self, target: &WatchTarget) -> Result<bool>;

    /// Content and metadata of `target`, `None` if the server has no such config.
    async fn fetch_detail(&self, _target: &WatchTarget) -> Result<Option<ConfigDetail>> {
        Err(Error::Unsupported("config details"))
    }

    /// One page of the recorded revisions of `target`, newest first.
    async fn history(
        &self,
        _target: &WatchTarget,
        _page_number: u32,
        _page_size: u32,
    ) -> Result<Page<HistoryConfig>> {
        Err(Error::Unsupported("config history"))
    }

    async fn history_revision(
        &self,
        _target: &WatchTarget,
        _revision: i64,
    ) -> Result<Option<HistoryConfig>> {
        Err(Error::Unsupported("config history"))
    }

    /// The revision recorded before the config with id `id` was last changed.
    async fn previous_history(
        &self,
        _target: &WatchTarget,
        _id: &str,
    ) -> Result<Option<HistoryConfig>> {
        Err(Error::Unsupported("config history"))
    }
}
