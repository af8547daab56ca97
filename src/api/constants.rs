//! Defaults and protocol constants.

pub const DEFAULT_SERVER_ADDR: &str = "127.0.0.1:8848";
pub const DEFAULT_SCHEME: &str = "http";
pub const DEFAULT_CONTEXT_PATH: &str = "/nacos";

/// The default group of configs.
pub const DEFAULT_GROUP: &str = "DEFAULT_GROUP";

/// How long the server may hold a long-polling request (ms).
pub const LONG_POLLING_TIMEOUT: u64 = 30_000;
/// Network margin on top of the hold, and plain request timeout (ms).
pub const READ_TIMEOUT: u64 = 5_000;
/// Budget for a single listener invocation (ms).
pub const EVENT_PROCESSING_TIMEOUT: u64 = 3_000;
pub const IDLE_INTERVAL: u64 = 500;
pub const SHUTDOWN_GRACE: u64 = 3_000;

pub const DEFAULT_FETCHING_POOL_SIZE: usize = 4;
pub const DEFAULT_PUBLISHING_POOL_SIZE: usize = 4;
pub const DEFAULT_FETCHING_CONFIG_THREAD_NAME: &str = "nacos-config-fetching";
pub const DEFAULT_LISTENING_CONFIG_THREAD_NAME: &str = "nacos-config-listening";
pub const DEFAULT_PUBLISHING_CONFIG_EVENT_THREAD_NAME: &str = "nacos-config-event-publishing";

/// Page size of history queries when none is given.
pub const DEFAULT_PAGE_SIZE: u32 = 100;
pub const MAX_PAGE_SIZE: u32 = 500;

pub(crate) const CONFIG_ENDPOINT: &str = "/v1/cs/configs";
pub(crate) const CONFIG_LISTENER_ENDPOINT: &str = "/v1/cs/configs/listener";
pub(crate) const CONFIG_HISTORY_ENDPOINT: &str = "/v1/cs/history";
pub(crate) const CONFIG_HISTORY_PREVIOUS_ENDPOINT: &str = "/v1/cs/history/previous";

pub(crate) const CONFIG_TENANT: &str = "tenant";
pub(crate) const CONFIG_GROUP: &str = "group";
pub(crate) const CONFIG_DATA_ID: &str = "dataId";
pub(crate) const CONFIG_TAG: &str = "tag";
pub(crate) const CONFIG_CONTENT: &str = "content";
pub(crate) const CONFIG_TAGS: &str = "config_tags";
pub(crate) const CONFIG_APP: &str = "appName";
pub(crate) const CONFIG_OPERATOR: &str = "src_user";
pub(crate) const CONFIG_DESCRIPTION: &str = "desc";
pub(crate) const CONFIG_USE: &str = "use";
pub(crate) const CONFIG_EFFECT: &str = "effect";
pub(crate) const CONFIG_SCHEMA: &str = "schema";
pub(crate) const CONFIG_TYPE: &str = "type";
pub(crate) const CONFIG_SHOW: &str = "show";
pub(crate) const SHOW_ALL: &str = "all";
pub(crate) const CONFIG_SEARCH: &str = "search";
pub(crate) const SEARCH_ACCURATE: &str = "accurate";
pub(crate) const PAGE_NUMBER: &str = "pageNo";
pub(crate) const PAGE_SIZE: &str = "pageSize";
pub(crate) const HISTORY_REVISION: &str = "nid";
pub(crate) const HISTORY_ID: &str = "id";
pub(crate) const LISTENING_CONFIGS: &str = "Listening-Configs";
pub(crate) const LONG_PULLING_TIMEOUT_HEADER: &str = "Long-Pulling-Timeout";
/// Answer at once instead of holding when nothing changed.
pub(crate) const LONG_PULLING_NO_HANGUP_HEADER: &str = "Long-Pulling-Timeout-No-Hangup";
/// The server compares listened digests against the configs of this tag.
pub(crate) const VIPSERVER_TAG_HEADER: &str = "Vipserver-Tag";
pub(crate) const CONTENT_MD5_HEADER: &str = "Content-MD5";

/// Separates the fields of one entry in a listening batch.
pub(crate) const WORD_SEPARATOR: char = '\u{2}';
/// Terminates one entry in a listening batch.
pub(crate) const LINE_SEPARATOR: char = '\u{1}';
