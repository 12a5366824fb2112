//! Template parsing, tag substitution and message composition.

pub mod compose;
pub mod markdown;
pub mod parser;
pub mod tags;

pub use compose::{ComposedMessage, Composer, compose};
pub use parser::{ChannelKind, ParsedTemplate, TemplateParser, parse};
pub use tags::{MergeContext, substitute};
