//! Self-echo recognition.
//!
//! Slack has no per-message metadata we can set and read back through the
//! Events API, so outbound messages carry a single section block whose
//! `block_id` is this adapter instance's tag. An inbound message carrying
//! exactly that block is our own echo.

use uuid::Uuid;

use crate::model::Block;

/// Embeds and recognizes an instance-specific origin tag.
pub trait OriginMarker: Send + Sync {
    /// The tag of this adapter instance.
    fn tag(&self) -> &str;

    /// Blocks rendering `text` with the tag embedded.
    fn embed(&self, text: &str) -> Vec<Block>;

    /// Returns `true` if `blocks` carry this instance's tag.
    fn recognizes(&self, blocks: &[Block]) -> bool;
}

/// Tags messages through the `block_id` of a lone section block.
#[derive(Debug, Clone)]
pub struct BlockIdMarker {
    tag: String,
}

impl Default for BlockIdMarker {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockIdMarker {
    /// Creates a marker with a fresh `conflux_<uuid>` tag.
    pub fn new() -> Self {
        Self::with_tag(format!("conflux_{}", Uuid::new_v4()))
    }

    pub fn with_tag(tag: impl Into<String>) -> Self {
        Self { tag: tag.into() }
    }
}

impl OriginMarker for BlockIdMarker {
    fn tag(&self) -> &str {
        &self.tag
    }

    fn embed(&self, text: &str) -> Vec<Block> {
        vec![Block::section(self.tag.clone(), text)]
    }

    fn recognizes(&self, blocks: &[Block]) -> bool {
        matches!(blocks, [block] if block.is_section() && block.block_id == self.tag)
    }
}
