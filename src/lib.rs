//! mailmerge: personalized email and webhook dispatch from a template and a mailing list.

pub mod channels;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod recipients;
pub mod setup;
pub mod template;
