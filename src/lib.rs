//! A Nacos config client that keeps local copies of remote configs in sync
//! through one long-polling loop per client and notifies listeners on change.
//!
//! ```ignore
//! use nacos_config_watcher::api::client_config::ClientConfig;
//! use nacos_config_watcher::api::config::{ConfigService, ConfigServiceBuilder};
//!
//! let service = ConfigServiceBuilder::new(ClientConfig::new().server_addr("127.0.0.1:8848"))
//!     .build()
//!     .await?;
//! let handle = service.add_event_listener(
//!     "public",
//!     "DEFAULT_GROUP",
//!     "app.properties",
//!     None,
//!     std::sync::Arc::new(|event| println!("{:?} {}", event.kind(), event.content())),
//! );
//! service.remove_event_listener(&handle);
//! ```

pub mod api;
pub(crate) mod common;
pub(crate) mod config;

pub use api::error::{Error, Result};
pub use crate::common::remote::{ConfigContent, ConfigTransport, WatchItem};
#[cfg(feature = "http")]
pub use crate::common::remote::http::HttpConfigTransport;
pub use crate::config::target::WatchTarget;
