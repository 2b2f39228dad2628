//! Recovery of structured records from free-form agent output.
//!
//! Agent text is untrusted: every extractor degrades to "nothing found"
//! instead of failing, and callers decide whether an empty result is an
//! error. Each extractor is a short chain of independent matchers over the
//! fenced blocks found by [`fence::fenced_blocks`].

pub mod fence;
mod fields;
mod plan;
mod review;
mod ticket;

pub use plan::{extract_plan, ExtractedPlan, DEFAULT_PLAN_TITLE};
pub use review::{
    build_default_review_body, extract_review_info, ReviewInfo, EXCERPT_LIMIT, TRUNCATION_MARKER,
};
pub use ticket::{extract_ticket_drafts, TicketDraft};
