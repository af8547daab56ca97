use std::fmt;

/// Identity of one watchable config: `(namespace, group, data_id, tag)`.
///
/// An absent tag is stored as `""`, so two targets compare equal exactly
/// when all four fields match.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatchTarget {
    namespace: String,
    group: String,
    data_id: String,
    tag: String,
}

impl WatchTarget {
    pub fn new(
        namespace: impl Into<String>,
        group: impl Into<String>,
        data_id: impl Into<String>,
        tag: Option<&str>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            group: group.into(),
            data_id: data_id.into(),
            tag: tag.unwrap_or_default().to_string(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn data_id(&self) -> &str {
        &self.data_id
    }

    /// `None` when the target carries no tag.
    pub fn tag(&self) -> Option<&str> {
        if self.tag.is_empty() {
            None
        } else {
            Some(&self.tag)
        }
    }

    /// Whether this target lives at `(namespace, group, data_id)`, ignoring the tag.
    pub(crate) fn matches(&self, namespace: &str, group: &str, data_id: &str) -> bool {
        self.namespace == namespace && self.group == group && self.data_id == data_id
    }

    /// Display key used in logs, `dataId+group+tenant[+tag]`.
    pub fn group_key(&self) -> String {
        group_key(&self.data_id, &self.group, &self.namespace, &self.tag)
    }
}

impl fmt::Display for WatchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.group_key())
    }
}

pub(crate) fn group_key(data_id: &str, group: &str, tenant: &str, tag: &str) -> String {
    let mut key = format!("{data_id}+{group}");
    if !tenant.is_empty() {
        key.push('+');
        key.push_str(tenant);
    }
    if !tag.is_empty() {
        key.push('+');
        key.push_str(tag);
    }
    key
}
