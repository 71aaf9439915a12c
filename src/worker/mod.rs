//! Analysis worker
//!
//! A worker owns a dedicated thread and processes requests one at a time.
//! Every request produces exactly one [`OutboundMessage`](crate::model::OutboundMessage).

mod actor;
mod handler;

pub use actor::AnalysisWorker;
pub use handler::{handle_message, validate};
