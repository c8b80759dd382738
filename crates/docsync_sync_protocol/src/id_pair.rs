//! Draft/published document id pairs.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Prefix that turns a published id into its draft id.
pub const DRAFTS_PREFIX: &str = "drafts.";

/// Which half of a pair a document is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentVariant {
    /// The working copy.
    Draft,
    /// The live document.
    Published,
}

impl DocumentVariant {
    /// Both variants, draft first.
    pub const ALL: [DocumentVariant; 2] = [DocumentVariant::Draft, DocumentVariant::Published];

    /// Wire name of the variant.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Published => "published",
        }
    }
}

impl fmt::Display for DocumentVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The two ids a pair synchronizer follows.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdPair {
    /// Id of the draft document.
    pub draft_id: String,
    /// Id of the published document.
    pub published_id: String,
}

impl IdPair {
    /// Creates a pair from explicit ids.
    pub fn new(draft_id: impl Into<String>, published_id: impl Into<String>) -> Self {
        Self {
            draft_id: draft_id.into(),
            published_id: published_id.into(),
        }
    }

    /// Derives the pair of a published id, stripping a draft prefix if given one.
    pub fn from_published_id(id: &str) -> Self {
        let published = id.strip_prefix(DRAFTS_PREFIX).unwrap_or(id);
        Self::new(format!("{DRAFTS_PREFIX}{published}"), published)
    }

    /// Id of one variant.
    pub fn id(&self, variant: DocumentVariant) -> &str {
        match variant {
            DocumentVariant::Draft => &self.draft_id,
            DocumentVariant::Published => &self.published_id,
        }
    }

    /// Which variant `id` is, if it belongs to this pair.
    pub fn variant_of(&self, id: &str) -> Option<DocumentVariant> {
        if id == self.draft_id {
            Some(DocumentVariant::Draft)
        } else if id == self.published_id {
            Some(DocumentVariant::Published)
        } else {
            None
        }
    }

    /// Both ids, draft first.
    pub fn ids(&self) -> [&str; 2] {
        [&self.draft_id, &self.published_id]
    }
}
