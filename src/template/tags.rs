//! `{{key}}` merge tag substitution.
//!
//! Substitution is a single left-to-right scan: each tag in the source text
//! is replaced at most once and inserted values are never scanned again.
//! [`render`] then refuses any output that still carries `{{` and `}}`.

use std::collections::BTreeMap;

use crate::error::TemplateError;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// Merged key/value context used to resolve tags.
pub type MergeContext = BTreeMap<String, String>;

/// Build a substitution context from config fields and recipient fields.
///
/// Recipient values win on key collision.
pub fn merge_context<'a, C, R>(config: C, recipient: R) -> MergeContext
where
    C: IntoIterator<Item = (&'a String, &'a String)>,
    R: IntoIterator<Item = (&'a String, &'a String)>,
{
    let mut context: MergeContext = config
        .into_iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    for (k, v) in recipient {
        context.insert(k.clone(), v.clone());
    }
    context
}

/// Output of a substitution pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Substitution {
    pub text: String,
    /// Tag names found in the source text with no value in the context,
    /// in order of first appearance.
    pub unresolved: Vec<String>,
}

/// Replace every `{{key}}` whose key is in `context`.
///
/// Unknown tags are left in place and reported in `unresolved`.
pub fn substitute(text: &str, context: &MergeContext) -> Substitution {
    let mut out = String::with_capacity(text.len());
    let mut unresolved: Vec<String> = Vec::new();
    let mut rest = text;

    while let Some(start) = rest.find(OPEN) {
        let after_open = &rest[start + OPEN.len()..];
        let Some(len) = after_open.find(CLOSE) else {
            break;
        };
        let key = &after_open[..len];

        out.push_str(&rest[..start]);
        match context.get(key) {
            Some(value) => out.push_str(value),
            None => {
                out.push_str(&rest[start..start + OPEN.len() + len + CLOSE.len()]);
                if !unresolved.iter().any(|k| k == key) {
                    unresolved.push(key.to_string());
                }
            }
        }
        rest = &after_open[len + CLOSE.len()..];
    }
    out.push_str(rest);

    Substitution {
        text: out,
        unresolved,
    }
}

/// Substitute and fail if any tag in `text` could not be resolved.
///
/// The rendered output must also be free of tag syntax: if it still holds
/// both `{{` and `}}` (for example from a recipient value), the render fails
/// even though nothing is substituted a second time.
pub fn render(text: &str, context: &MergeContext) -> Result<String, TemplateError> {
    let Substitution { text, unresolved } = substitute(text, context);
    if !unresolved.is_empty() {
        return Err(TemplateError::UnresolvedTags { tags: unresolved });
    }
    if text.contains(OPEN) && text.contains(CLOSE) {
        return Err(TemplateError::UnresolvedTags {
            tags: substitute(&text, &MergeContext::new()).unresolved,
        });
    }
    Ok(text)
}
