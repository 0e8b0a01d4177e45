use url::Url;

use crate::error::{GatewayError, GatewayResult};

const BTIH_PREFIX: &str = "urn:btih:";

/// Parsed view of a magnet URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MagnetLink {
    uri: String,
    info_hash: String,
    display_name: Option<String>,
}

impl MagnetLink {
    /// Parse and validate a magnet URI.
    ///
    /// A usable link starts with `magnet:` and carries an `xt=urn:btih:` topic.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Invalid`] when the URI is not a usable magnet link.
    pub fn parse(uri: &str) -> GatewayResult<Self> {
        let trimmed = uri.trim();
        if !trimmed.starts_with("magnet:") {
            return Err(GatewayError::invalid("magnet link must start with 'magnet:'"));
        }
        let parsed = Url::parse(trimmed)
            .map_err(|_| GatewayError::invalid("magnet link could not be parsed"))?;

        let mut info_hash = None;
        let mut display_name = None;
        for (key, value) in parsed.query_pairs() {
            match key.as_ref() {
                "xt" if info_hash.is_none() => {
                    info_hash = value
                        .strip_prefix(BTIH_PREFIX)
                        .and_then(normalize_info_hash);
                }
                "dn" if display_name.is_none() => {
                    let name = value.trim();
                    if !name.is_empty() {
                        display_name = Some(name.to_string());
                    }
                }
                _ => {}
            }
        }

        let info_hash = info_hash.ok_or_else(|| {
            GatewayError::invalid("magnet link is missing an 'xt=urn:btih:' info-hash")
        })?;

        Ok(Self {
            uri: trimmed.to_string(),
            info_hash,
            display_name,
        })
    }

    /// Original URI, trimmed.
    #[must_use]
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Lower-cased info-hash from the `xt` topic.
    #[must_use]
    pub fn info_hash(&self) -> &str {
        &self.info_hash
    }

    /// Display name from the `dn` parameter, when present.
    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    /// Name used for the provisional session while the add is pending.
    #[must_use]
    pub fn provisional_name(&self) -> String {
        self.display_name
            .clone()
            .unwrap_or_else(|| format!("magnet:{}", self.info_hash))
    }
}

/// Lower-case an info-hash, rejecting empty or non-alphanumeric values.
#[must_use]
pub fn normalize_info_hash(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || !trimmed.chars().all(|ch| ch.is_ascii_alphanumeric()) {
        return None;
    }
    Some(trimmed.to_ascii_lowercase())
}
