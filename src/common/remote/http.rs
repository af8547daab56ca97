use crate::api::client_config::ClientConfig;
use crate::api::constants::*;
use crate::api::error::{Error, Result};
use crate::api::model::{ConfigDetail, HistoryConfig, NewConfig, Page};
use crate::common::remote::{md5_hex, ConfigContent, ConfigTransport, WatchItem};
use crate::config::server_response::parse_changed_configs;
use crate::config::target::WatchTarget;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

/// [`ConfigTransport`] over the Nacos v1 open API.
#[derive(Clone, Debug)]
pub struct HttpConfigTransport {
    client: reqwest::Client,
    base_url: String,
    read_timeout: Duration,
}

/// Body of a history query.
#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct HistoryPage {
    total_count: u64,
    pages_available: u32,
    page_items: Vec<HistoryConfig>,
}

impl HttpConfigTransport {
    pub fn new(client_config: &ClientConfig) -> Result<Self> {
        client_config.validate()?;
        let client = reqwest::Client::builder()
            .connect_timeout(client_config.read_timeout_duration())
            .build()?;
        Ok(Self {
            client,
            base_url: client_config.base_url(),
            read_timeout: client_config.read_timeout_duration(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn target_params(target: &WatchTarget) -> Vec<(&'static str, &str)> {
        let mut params = vec![
            (CONFIG_TENANT, target.namespace()),
            (CONFIG_GROUP, target.group()),
            (CONFIG_DATA_ID, target.data_id()),
        ];
        if let Some(tag) = target.tag() {
            params.push((CONFIG_TAG, tag));
        }
        params
    }

    async fn expect_bool(response: reqwest::Response) -> Result<bool> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(Error::from_status(status.as_u16(), &body));
        }
        body.trim()
            .parse::<bool>()
            .map_err(|e| Error::Deserialization(format!("{body:?}: {e}")))
    }

    /// JSON body of a lookup, `None` when the server has nothing.
    async fn expect_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<Option<T>> {
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body = response.text().await?;
        if !status.is_success() {
            return Err(Error::from_status(status.as_u16(), &body));
        }
        let body = body.trim();
        if body.is_empty() || body == "null" {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(body)?))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<Option<T>> {
        let response = self
            .client
            .get(self.endpoint(path))
            .query(params)
            .timeout(self.read_timeout)
            .send()
            .await?;
        Self::expect_json(response).await
    }

    /// One listener request for targets sharing `tag`. Unless `hang` is set
    /// the server answers at once instead of holding.
    async fn listen_group(
        &self,
        tag: &str,
        items: &[&WatchItem],
        hold: Duration,
        hang: bool,
    ) -> Result<HashSet<WatchTarget>> {
        let mut request = self
            .client
            .post(self.endpoint(CONFIG_LISTENER_ENDPOINT))
            .header(LONG_PULLING_TIMEOUT_HEADER, hold.as_millis().to_string())
            .form(&[(LISTENING_CONFIGS, encode_listening_configs(items.iter().copied()))]);
        request = if hang {
            request.timeout(hold + self.read_timeout)
        } else {
            request
                .header(LONG_PULLING_NO_HANGUP_HEADER, "true")
                .timeout(self.read_timeout)
        };
        if !tag.is_empty() {
            request = request.header(VIPSERVER_TAG_HEADER, tag);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(Error::from_status(status.as_u16(), &body));
        }

        let mut changed = HashSet::new();
        for context in parse_changed_configs(&body)? {
            changed.extend(
                items
                    .iter()
                    .filter(|item| {
                        item.target
                            .matches(&context.tenant, &context.group, &context.data_id)
                    })
                    .map(|item| item.target.clone()),
            );
        }
        Ok(changed)
    }
}

/// `dataId^2group^2md5[^2tenant]^1` for every item of the batch.
pub(crate) fn encode_listening_configs<'a>(batch: impl IntoIterator<Item = &'a WatchItem>) -> String {
    let mut encoded = String::new();
    for item in batch {
        let target = &item.target;
        encoded.push_str(target.data_id());
        encoded.push(WORD_SEPARATOR);
        encoded.push_str(target.group());
        encoded.push(WORD_SEPARATOR);
        encoded.push_str(&item.digest);
        if !target.namespace().is_empty() {
            encoded.push(WORD_SEPARATOR);
            encoded.push_str(target.namespace());
        }
        encoded.push(LINE_SEPARATOR);
    }
    encoded
}

/// Split a batch by tag, untagged targets last.
fn group_by_tag(batch: &[WatchItem]) -> BTreeMap<(bool, &str), Vec<&WatchItem>> {
    let mut groups: BTreeMap<(bool, &str), Vec<&WatchItem>> = BTreeMap::new();
    for item in batch {
        let tag = item.target.tag();
        groups
            .entry((tag.is_none(), tag.unwrap_or_default()))
            .or_default()
            .push(item);
    }
    groups
}

#[async_trait]
impl ConfigTransport for HttpConfigTransport {
    /// The server takes one tag per request, so each tag gets its own request,
    /// one after the other. Only the last of them is held.
    async fn listen(&self, batch: &[WatchItem], hold: Duration) -> Result<HashSet<WatchTarget>> {
        let groups = group_by_tag(batch);
        let last = groups.len().saturating_sub(1);
        for (index, ((_, tag), items)) in groups.iter().enumerate() {
            let changed = self.listen_group(tag, items, hold, index == last).await?;
            if !changed.is_empty() {
                return Ok(changed);
            }
        }
        Ok(HashSet::new())
    }

    async fn fetch(&self, target: &WatchTarget) -> Result<Option<ConfigContent>> {
        let response = self
            .client
            .get(self.endpoint(CONFIG_ENDPOINT))
            .query(&Self::target_params(target))
            .timeout(self.read_timeout)
            .send()
            .await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let server_md5 = response
            .headers()
            .get(CONTENT_MD5_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());
        let body = response.text().await?;
        if !status.is_success() {
            return Err(Error::from_status(status.as_u16(), &body));
        }
        let digest = match server_md5 {
            Some(md5) if !md5.is_empty() => md5,
            _ => md5_hex(&body),
        };
        Ok(Some(ConfigContent {
            content: body,
            digest,
        }))
    }

    async fn publish(&self, config: &NewConfig) -> Result<bool> {
        let target = config.target();
        let tags = config.tags.join(",");
        let mut form = Self::target_params(&target);
        form.push((CONFIG_CONTENT, config.content.as_str()));
        if !tags.is_empty() {
            form.push((CONFIG_TAGS, tags.as_str()));
        }
        let optional = [
            (CONFIG_APP, config.app_name.as_deref()),
            (CONFIG_OPERATOR, config.operator.as_deref()),
            (CONFIG_DESCRIPTION, config.description.as_deref()),
            (CONFIG_USE, config.config_use.as_deref()),
            (CONFIG_EFFECT, config.effect.as_deref()),
            (CONFIG_SCHEMA, config.schema.as_deref()),
            (CONFIG_TYPE, config.config_type.map(|t| t.as_str())),
        ];
        form.extend(
            optional
                .into_iter()
                .filter_map(|(name, value)| value.map(|value| (name, value))),
        );

        let response = self
            .client
            .post(self.endpoint(CONFIG_ENDPOINT))
            .timeout(self.read_timeout)
            .form(&form)
            .send()
            .await?;
        Self::expect_bool(response).await
    }

    async fn remove(&self, target: &WatchTarget) -> Result<bool> {
        let response = self
            .client
            .delete(self.endpoint(CONFIG_ENDPOINT))
            .query(&Self::target_params(target))
            .timeout(self.read_timeout)
            .send()
            .await?;
        Self::expect_bool(response).await
    }

    async fn fetch_detail(&self, target: &WatchTarget) -> Result<Option<ConfigDetail>> {
        let mut params = Self::target_params(target);
        params.push((CONFIG_SHOW, SHOW_ALL));
        self.get_json(CONFIG_ENDPOINT, &params).await
    }

    async fn history(
        &self,
        target: &WatchTarget,
        page_number: u32,
        page_size: u32,
    ) -> Result<Page<HistoryConfig>> {
        let (number, size) = (page_number.to_string(), page_size.to_string());
        let mut params = Self::target_params(target);
        params.push((CONFIG_SEARCH, SEARCH_ACCURATE));
        params.push((PAGE_NUMBER, number.as_str()));
        params.push((PAGE_SIZE, size.as_str()));
        let page: HistoryPage = self
            .get_json(CONFIG_HISTORY_ENDPOINT, &params)
            .await?
            .unwrap_or_default();
        Ok(Page {
            total_count: page.total_count,
            page_number,
            page_size,
            pages_available: page.pages_available,
            elements: page.page_items,
        })
    }

    async fn history_revision(
        &self,
        target: &WatchTarget,
        revision: i64,
    ) -> Result<Option<HistoryConfig>> {
        let revision = revision.to_string();
        let mut params = Self::target_params(target);
        params.push((HISTORY_REVISION, revision.as_str()));
        self.get_json(CONFIG_HISTORY_ENDPOINT, &params).await
    }

    async fn previous_history(
        &self,
        target: &WatchTarget,
        id: &str,
    ) -> Result<Option<HistoryConfig>> {
        let mut params = Self::target_params(target);
        params.push((HISTORY_ID, id));
        self.get_json(CONFIG_HISTORY_PREVIOUS_ENDPOINT, &params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::model::ConfigType;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    /// Head (request line and headers, lowercased) and body of a request.
    #[derive(Clone, Debug)]
    struct Recorded {
        head: String,
        body: String,
    }

    /// Local HTTP endpoint answering one canned response per connection, in
    /// order, and recording what it was sent.
    async fn stub_server(responses: Vec<String>) -> (HttpConfigTransport, Arc<Mutex<Vec<Recorded>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let recorded = requests.clone();
        tokio::spawn(async move {
            for response in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                let request = read_request(&mut socket).await;
                recorded.lock().push(request);
                socket.write_all(response.as_bytes()).await.unwrap();
                let _ = socket.shutdown().await;
            }
        });
        let client_config = ClientConfig::new()
            .server_addr(addr.to_string())
            .read_timeout(Duration::from_secs(2));
        (HttpConfigTransport::new(&client_config).unwrap(), requests)
    }

    async fn read_request(socket: &mut TcpStream) -> Recorded {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
                let length = head
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                while buf.len() < end + 4 + length {
                    let n = socket.read(&mut chunk).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    buf.extend_from_slice(&chunk[..n]);
                }
                let body = String::from_utf8_lossy(&buf[end + 4..]).to_string();
                return Recorded { head, body };
            }
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                return Recorded {
                    head: String::from_utf8_lossy(&buf).to_ascii_lowercase(),
                    body: String::new(),
                };
            }
            buf.extend_from_slice(&chunk[..n]);
        }
    }

    fn response(status: &str, headers: &[(&str, &str)], body: &str) -> String {
        let mut response = format!(
            "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n",
            body.len()
        );
        for (name, value) in headers {
            response.push_str(&format!("{name}: {value}\r\n"));
        }
        response.push_str("\r\n");
        response.push_str(body);
        response
    }

    fn item(data_id: &str, tag: Option<&str>) -> WatchItem {
        WatchItem {
            target: WatchTarget::new("public", "DEFAULT_GROUP", data_id, tag),
            digest: String::new(),
        }
    }

    #[test]
    fn test_encode_listening_configs() {
        let batch = vec![
            WatchItem {
                target: WatchTarget::new("", "DEFAULT_GROUP", "a.properties", None),
                digest: String::new(),
            },
            WatchItem {
                target: WatchTarget::new("dev", "LOVE", "b.yaml", Some("beta")),
                digest: "abc".to_string(),
            },
        ];
        assert_eq!(
            encode_listening_configs(&batch),
            "a.properties\u{2}DEFAULT_GROUP\u{2}\u{1}b.yaml\u{2}LOVE\u{2}abc\u{2}dev\u{1}"
        );
    }

    #[test]
    fn test_group_by_tag_puts_untagged_last() {
        let batch = vec![item("a", None), item("a", Some("gray")), item("b", Some("beta"))];
        let tags: Vec<&str> = group_by_tag(&batch).keys().map(|(_, tag)| *tag).collect();
        assert_eq!(tags, vec!["beta", "gray", ""]);
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = ClientConfig::new().server_addr("");
        assert!(matches!(
            HttpConfigTransport::new(&config),
            Err(Error::InvalidConfig(_))
        ));
        let transport = HttpConfigTransport::new(&ClientConfig::new()).unwrap();
        assert_eq!(
            transport.endpoint(CONFIG_LISTENER_ENDPOINT),
            "http://127.0.0.1:8848/nacos/v1/cs/configs/listener"
        );
    }

    #[tokio::test]
    async fn test_fetch_not_found_is_none() {
        let (transport, _) =
            stub_server(vec![response("404 Not Found", &[], "config data not exist")]).await;
        let fetched = transport.fetch(&item("a.properties", None).target).await.unwrap();
        assert_eq!(fetched, None);
    }

    #[tokio::test]
    async fn test_fetch_digest_prefers_content_md5_header() {
        let (transport, requests) = stub_server(vec![
            response("200 OK", &[("Content-MD5", "0123abcd")], "a=1"),
            response("200 OK", &[], "a=1"),
        ])
        .await;
        let tagged = item("a.properties", Some("beta")).target;

        let fetched = transport.fetch(&tagged).await.unwrap().unwrap();
        assert_eq!(fetched.content, "a=1");
        assert_eq!(fetched.digest, "0123abcd");
        let fetched = transport.fetch(&tagged).await.unwrap().unwrap();
        assert_eq!(fetched.digest, md5_hex("a=1"));

        let requests = requests.lock();
        assert!(requests[0].head.starts_with("get /nacos/v1/cs/configs?"));
        assert!(requests[0].head.contains("tag=beta"));
        assert!(requests[0].head.contains("dataid=a.properties"));
    }

    #[tokio::test]
    async fn test_fetch_error_status() {
        let (transport, _) = stub_server(vec![response("403 Forbidden", &[], "")]).await;
        match transport.fetch(&item("a.properties", None).target).await {
            Err(Error::Transport(message)) => assert!(message.contains("403")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_listen_maps_changed_lines_to_batch() {
        let (transport, requests) = stub_server(vec![response(
            "200 OK",
            &[],
            "a.properties%02DEFAULT_GROUP%02public%01",
        )])
        .await;
        let batch = vec![item("a.properties", None), item("b.properties", None)];

        let changed = transport
            .listen(&batch, Duration::from_millis(300))
            .await
            .unwrap();
        assert_eq!(changed, [batch[0].target.clone()].into_iter().collect());

        let requests = requests.lock();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].head.starts_with("post /nacos/v1/cs/configs/listener"));
        assert!(requests[0].head.contains("long-pulling-timeout: 300"));
        assert!(!requests[0].head.contains("no-hangup"));
        assert!(!requests[0].head.contains("vipserver-tag"));
        assert!(requests[0].body.starts_with("Listening-Configs="));
    }

    #[tokio::test]
    async fn test_listen_sends_tagged_targets_with_their_tag() {
        let (transport, requests) = stub_server(vec![
            response("200 OK", &[], ""),
            response("200 OK", &[], "a.properties%02DEFAULT_GROUP%02public%01"),
        ])
        .await;
        let batch = vec![item("a.properties", None), item("a.properties", Some("beta"))];

        let changed = transport
            .listen(&batch, Duration::from_millis(300))
            .await
            .unwrap();
        // the untagged request answered, the tagged target is unaffected
        assert_eq!(changed, [batch[0].target.clone()].into_iter().collect());

        let requests = requests.lock();
        assert_eq!(requests.len(), 2);
        assert!(requests[0].head.contains("vipserver-tag: beta"));
        assert!(requests[0].head.contains("long-pulling-timeout-no-hangup: true"));
        assert!(!requests[1].head.contains("vipserver-tag"));
        assert!(!requests[1].head.contains("no-hangup"));
    }

    #[tokio::test]
    async fn test_listen_returns_tagged_change_without_holding() {
        let (transport, requests) = stub_server(vec![response(
            "200 OK",
            &[],
            "a.properties%02DEFAULT_GROUP%02public%01",
        )])
        .await;
        let batch = vec![item("a.properties", None), item("a.properties", Some("beta"))];

        let changed = transport
            .listen(&batch, Duration::from_millis(300))
            .await
            .unwrap();
        assert_eq!(changed, [batch[1].target.clone()].into_iter().collect());
        assert_eq!(requests.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_server_is_a_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let client_config = ClientConfig::new().server_addr(addr.to_string());
        let transport = HttpConfigTransport::new(&client_config).unwrap();

        let result = transport
            .listen(&[item("a.properties", None)], Duration::from_millis(300))
            .await;
        assert!(matches!(result, Err(Error::Transport(_))));
    }

    #[tokio::test]
    async fn test_publish_sends_metadata() {
        let (transport, requests) = stub_server(vec![response("200 OK", &[], "true")]).await;
        let config = NewConfig::new("public", "DEFAULT_GROUP", "app.yaml", "a: 1")
            .tags(["t1", "t2"])
            .app_name("test-app")
            .config_type(ConfigType::Yaml);

        assert!(transport.publish(&config).await.unwrap());

        let requests = requests.lock();
        let body = &requests[0].body;
        assert!(requests[0].head.starts_with("post /nacos/v1/cs/configs"));
        assert!(body.contains("dataId=app.yaml"));
        assert!(body.contains("config_tags=t1%2Ct2"));
        assert!(body.contains("appName=test-app"));
        assert!(body.contains("type=yaml"));
        assert!(!body.contains("desc="));
    }

    #[tokio::test]
    async fn test_remove_tagged_config() {
        let (transport, requests) = stub_server(vec![
            response("200 OK", &[], "true"),
            response("500 Internal Server Error", &[], "boom"),
        ])
        .await;
        let tagged = item("a.properties", Some("beta")).target;

        assert!(transport.remove(&tagged).await.unwrap());
        assert!(matches!(
            transport.remove(&tagged).await,
            Err(Error::Transport(message)) if message.contains("boom")
        ));
        let requests = requests.lock();
        assert!(requests[0].head.starts_with("delete /nacos/v1/cs/configs?"));
        assert!(requests[0].head.contains("tag=beta"));
    }

    #[tokio::test]
    async fn test_fetch_detail() {
        let (transport, requests) = stub_server(vec![
            response(
                "200 OK",
                &[("Content-Type", "application/json")],
                r#"{"id":"12","dataId":"a.properties","group":"DEFAULT_GROUP","tenant":"public","content":"a=1","appName":"test-app"}"#,
            ),
            response("200 OK", &[], ""),
        ])
        .await;
        let target = item("a.properties", None).target;

        let detail = transport.fetch_detail(&target).await.unwrap().unwrap();
        assert_eq!(detail.id, "12");
        assert_eq!(detail.content, "a=1");
        assert_eq!(detail.app_name.as_deref(), Some("test-app"));
        assert_eq!(transport.fetch_detail(&target).await.unwrap(), None);
        assert!(requests.lock()[0].head.contains("show=all"));
    }

    #[tokio::test]
    async fn test_history_queries() {
        let entry = r#"{"id":"7","lastId":-1,"dataId":"a.properties","group":"DEFAULT_GROUP","tenant":"public","content":"a=1","opType":"I "}"#;
        let (transport, requests) = stub_server(vec![
            response(
                "200 OK",
                &[],
                &format!(r#"{{"totalCount":1,"pageNumber":1,"pagesAvailable":1,"pageItems":[{entry}]}}"#),
            ),
            response("200 OK", &[], entry),
            response("404 Not Found", &[], ""),
        ])
        .await;
        let target = item("a.properties", None).target;

        let page = transport.history(&target, 1, 10).await.unwrap();
        assert_eq!(page.total_count, 1);
        assert_eq!(page.page_size, 10);
        assert!(page.is_first() && page.is_last());
        assert_eq!(page.elements[0].revision, Some(7));

        let revision = transport.history_revision(&target, 7).await.unwrap().unwrap();
        assert_eq!(revision.content.as_deref(), Some("a=1"));
        assert_eq!(transport.previous_history(&target, "12").await.unwrap(), None);

        let requests = requests.lock();
        assert!(requests[0].head.contains("search=accurate"));
        assert!(requests[0].head.contains("pageno=1"));
        assert!(requests[0].head.contains("pagesize=10"));
        assert!(requests[1].head.contains("nid=7"));
        assert!(requests[2].head.starts_with("get /nacos/v1/cs/history/previous?"));
        assert!(requests[2].head.contains("id=12"));
    }
}
