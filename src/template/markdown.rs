//! Markdown rendering for the multipart email channel.

use pulldown_cmark::{Event, Options, Parser, Tag, TagEnd, html};

/// Render a markdown body to an HTML fragment, treating every line break as
/// a hard break.
pub fn to_html(md: &str) -> String {
    let parser = Parser::new_ext(md, Options::ENABLE_STRIKETHROUGH).map(|event| match event {
        Event::SoftBreak => Event::HardBreak,
        other => other,
    });
    let mut out = String::new();
    html::push_html(&mut out, parser);
    out
}

/// Wrap an HTML fragment in a minimal document.
pub fn to_html_document(md: &str) -> String {
    format!("<html><body>{}</body></html>", to_html(md))
}

/// Render a markdown body to plain text with all markup stripped.
///
/// Paragraphs and headings are separated by a blank line, list items get a
/// `- ` (or `N. `) prefix, and links keep their target in parentheses.
pub fn to_plain_text(md: &str) -> String {
    let mut out = String::new();
    let mut lists: Vec<Option<u64>> = Vec::new();
    let mut links: Vec<String> = Vec::new();

    for event in Parser::new_ext(md, Options::ENABLE_STRIKETHROUGH) {
        match event {
            Event::Start(tag) => match tag {
                Tag::List(start) => {
                    end_line(&mut out);
                    lists.push(start);
                }
                Tag::Item => {
                    end_line(&mut out);
                    let indent = "  ".repeat(lists.len().saturating_sub(1));
                    out.push_str(&indent);
                    match lists.last_mut() {
                        Some(Some(n)) => {
                            out.push_str(&format!("{n}. "));
                            *n += 1;
                        }
                        _ => out.push_str("- "),
                    }
                }
                Tag::Link { dest_url, .. } => links.push(dest_url.to_string()),
                _ => {}
            },
            Event::End(tag_end) => match tag_end {
                TagEnd::Paragraph | TagEnd::Heading(_) | TagEnd::CodeBlock => {
                    if lists.is_empty() {
                        end_block(&mut out);
                    } else {
                        end_line(&mut out);
                    }
                }
                TagEnd::List(_) => {
                    lists.pop();
                    if lists.is_empty() {
                        end_block(&mut out);
                    }
                }
                TagEnd::Item => end_line(&mut out),
                TagEnd::Link => {
                    if let Some(url) = links.pop()
                        && !url.is_empty()
                        && !out.ends_with(url.as_str())
                    {
                        out.push_str(&format!(" ({url})"));
                    }
                }
                _ => {}
            },
            Event::Text(text) | Event::Code(text) => out.push_str(&text),
            Event::SoftBreak | Event::HardBreak => out.push('\n'),
            Event::Rule => end_block(&mut out),
            _ => {}
        }
    }

    out.trim_end().to_string()
}

fn end_line(out: &mut String) {
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
}

fn end_block(out: &mut String) {
    end_line(out);
    if !out.is_empty() && !out.ends_with("\n\n") {
        out.push('\n');
    }
}
