use crate::api::constants::{LINE_SEPARATOR, WORD_SEPARATOR};
use crate::api::error::{Error, Result};
use percent_encoding::percent_decode_str;

/// The Context of config changed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct ConfigContext {
    /// DataId
    pub(crate) data_id: String,
    /// Group
    pub(crate) group: String,
    /// tenant, `""` for the public namespace
    pub(crate) tenant: String,
}

/// Parse the body of a long-polling response: percent-encoded
/// `dataId^2group[^2tenant]^1` lines, empty when nothing changed.
pub(crate) fn parse_changed_configs(body: &str) -> Result<Vec<ConfigContext>> {
    let decoded = percent_decode_str(body.trim())
        .decode_utf8()
        .map_err(|e| Error::Deserialization(e.to_string()))?;

    let mut changed = Vec::new();
    for line in decoded.split(LINE_SEPARATOR) {
        if line.trim().is_empty() {
            continue;
        }
        let words: Vec<&str> = line.split(WORD_SEPARATOR).collect();
        match words.as_slice() {
            [data_id, group] => changed.push(ConfigContext {
                data_id: data_id.to_string(),
                group: group.to_string(),
                tenant: String::new(),
            }),
            [data_id, group, tenant] => changed.push(ConfigContext {
                data_id: data_id.to_string(),
                group: group.to_string(),
                tenant: tenant.to_string(),
            }),
            _ => tracing::warn!(line = %line, "unrecognized changed config line, ignored"),
        }
    }
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_empty_body() {
        assert!(parse_changed_configs("").unwrap().is_empty());
        assert!(parse_changed_configs("\n").unwrap().is_empty());
    }

    #[test]
    fn test_parse_encoded_lines() {
        let body = "app.properties%02DEFAULT_GROUP%01db.yaml%02LOVE%02dev%01";
        let changed = parse_changed_configs(body).unwrap();
        assert_eq!(
            changed,
            vec![
                ConfigContext {
                    data_id: "app.properties".into(),
                    group: "DEFAULT_GROUP".into(),
                    tenant: String::new(),
                },
                ConfigContext {
                    data_id: "db.yaml".into(),
                    group: "LOVE".into(),
                    tenant: "dev".into(),
                },
            ]
        );
    }

    #[test]
    fn test_malformed_line_is_skipped() {
        let changed = parse_changed_configs("garbage%01a%02b%01").unwrap();
        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0].data_id, "a");
    }
}
