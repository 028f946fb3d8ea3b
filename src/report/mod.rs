//! Terminal reports: run summaries, data status, and sheet previews.

use crate::app::pipeline::Feed;
use crate::series::DataStatus;

pub mod format;

pub use format::*;

/// Coverage of one persisted sheet.
#[derive(Debug, Clone)]
pub struct StatusLine {
    pub feed: Feed,
    pub sheet: &'static str,
    pub status: DataStatus,
}
