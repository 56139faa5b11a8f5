use crate::error::{Error, Result};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;

/// Resume point for a competitor search.
///
/// Opaque to callers: it travels as the string produced by [`Cursor::encode`]
/// and is only interpreted by the search engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    pub query_index: usize,
    pub page_token: Option<String>,
    pub seen_ids: BTreeSet<String>,
    pub scanned: usize,
    fingerprint: String,
}

impl Cursor {
    pub fn start(terms: &[String]) -> Self {
        Self {
            query_index: 0,
            page_token: None,
            seen_ids: BTreeSet::new(),
            scanned: 0,
            fingerprint: fingerprint(terms),
        }
    }

    pub fn encode(&self) -> Result<String> {
        let json = serde_json::to_vec(self)?;
        Ok(URL_SAFE_NO_PAD.encode(json))
    }

    pub fn decode(encoded: &str) -> Result<Self> {
        let bytes = URL_SAFE_NO_PAD
            .decode(encoded.trim())
            .map_err(|e| Error::invalid_cursor(format!("not valid base64: {e}")))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| Error::invalid_cursor(format!("malformed payload: {e}")))
    }

    /// Rejects cursors minted for a different list of query terms.
    pub fn validate(&self, terms: &[String]) -> Result<()> {
        if self.fingerprint != fingerprint(terms) {
            return Err(Error::invalid_cursor(
                "cursor belongs to a different search",
            ));
        }
        if self.query_index > terms.len() {
            return Err(Error::invalid_cursor(format!(
                "query index {} out of range for {} terms",
                self.query_index,
                terms.len()
            )));
        }
        Ok(())
    }

    pub fn is_exhausted(&self, terms: &[String]) -> bool {
        self.query_index >= terms.len()
    }

    /// Moves to the next page of the current term, or the first page of the next term.
    pub(crate) fn advance(&mut self, next_page_token: Option<String>) {
        match next_page_token {
            Some(token) => self.page_token = Some(token),
            None => {
                self.query_index += 1;
                self.page_token = None;
            }
        }
    }
}

fn fingerprint(terms: &[String]) -> String {
    let mut hasher = Sha256::new();
    for term in terms {
        hasher.update(term.as_bytes());
        hasher.update([0u8]);
    }
    let digest = hex::encode(hasher.finalize());
    digest[..16].to_string()
}
