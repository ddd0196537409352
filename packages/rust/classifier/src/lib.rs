//! Content classifier capability for Leadpipe.
//!
//! The enrichment phase asks a [`ContentClassifier`] for raw text about a
//! target host, then classifies that text into lead signals. The shipped
//! implementation is [`SearchClassifier`] (a Tavily-compatible search API)
//! paired with the keyword classifier in [`keywords`].

pub mod keywords;
mod search;

use async_trait::async_trait;
use leadpipe_shared::Result;
use serde::{Deserialize, Serialize};

pub use keywords::{DEFAULT_PRACTICE_TYPE, RICH_CONTENT_CHARS, classify_text, infer_practice_type};
pub use search::SearchClassifier;

/// Lead signals extracted from raw text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub services: Vec<String>,
    pub treatments: Vec<String>,
    pub specializations: Vec<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub location: Option<String>,
    pub practice_type: String,
}

impl Default for Classification {
    fn default() -> Self {
        Self {
            services: Vec::new(),
            treatments: Vec::new(),
            specializations: Vec::new(),
            phone: None,
            email: None,
            location: None,
            practice_type: DEFAULT_PRACTICE_TYPE.to_string(),
        }
    }
}

impl Classification {
    /// True when nothing usable was extracted.
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
            && self.treatments.is_empty()
            && self.specializations.is_empty()
            && self.phone.is_none()
            && self.email.is_none()
            && self.location.is_none()
    }
}

/// External search + classification capability used by enrichment.
#[async_trait]
pub trait ContentClassifier: Send + Sync {
    /// Fetch raw text about `query`, restricted to `scope_host`.
    ///
    /// An empty string means the service had nothing to say.
    async fn search(&self, query: &str, scope_host: &str) -> Result<String>;

    /// Turn raw text into lead signals.
    fn classify(&self, text: &str) -> Classification {
        classify_text(text)
    }
}
