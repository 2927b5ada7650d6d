use std::collections::HashMap;
use std::path::Path;

use pulldown_cmark::{CowStr, Event, Options, Parser, Tag, TagEnd, html};

use crate::error::RenderError;

/// Turns a watched file into the HTML pushed to viewers.
///
/// Implementations are synchronous and may block on file IO; callers run them
/// on the blocking pool.
pub trait RenderGateway: Send + Sync + 'static {
    fn render(&self, path: &Path) -> Result<String, RenderError>;
}

/// GitHub-flavoured Markdown renderer.
///
/// Raw HTML in the source is passed through untouched and headings get
/// generated `id`s so in-page anchors work.
#[derive(Debug, Clone)]
pub struct MarkdownRenderer {
    options: Options,
}

impl MarkdownRenderer {
    pub fn new() -> Self {
        let options = Options::ENABLE_TABLES
            | Options::ENABLE_STRIKETHROUGH
            | Options::ENABLE_TASKLISTS
            | Options::ENABLE_FOOTNOTES
            | Options::ENABLE_HEADING_ATTRIBUTES;
        Self { options }
    }

    /// Render Markdown source to an HTML fragment wrapped in the viewer container.
    pub fn render_str(&self, source: &str) -> String {
        let events: Vec<Event<'_>> = Parser::new_ext(source, self.options).collect();
        let events = with_heading_ids(events);

        let mut body = String::with_capacity(source.len() * 3 / 2);
        html::push_html(&mut body, events.into_iter());
        format!("<div id=\"markdown\" class=\"markdown-body\">\n{body}</div>\n")
    }
}

impl Default for MarkdownRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderGateway for MarkdownRenderer {
    fn render(&self, path: &Path) -> Result<String, RenderError> {
        let source = std::fs::read(path).map_err(|source| RenderError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(self.render_str(&String::from_utf8_lossy(&source)))
    }
}

/// Give every heading without an explicit `{#id}` a slug id, de-duplicated
/// with numeric suffixes in document order.
fn with_heading_ids(mut events: Vec<Event<'_>>) -> Vec<Event<'_>> {
    let mut seen: HashMap<String, usize> = HashMap::new();

    for i in 0..events.len() {
        if !matches!(events[i], Event::Start(Tag::Heading { id: None, .. })) {
            continue;
        }
        let text: String = events[i + 1..]
            .iter()
            .take_while(|e| !matches!(e, Event::End(TagEnd::Heading(_))))
            .filter_map(|e| match e {
                Event::Text(t) | Event::Code(t) => Some(&**t),
                _ => None,
            })
            .collect();

        let slug = unique_slug(slugify(&text), &mut seen);
        if let Event::Start(Tag::Heading { id, .. }) = &mut events[i] {
            *id = Some(CowStr::from(slug));
        }
    }
    events
}

fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for c in text.trim().chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
        } else if (c == ' ' || c == '-' || c == '_') && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        "heading".to_owned()
    } else {
        slug.to_owned()
    }
}

fn unique_slug(slug: String, seen: &mut HashMap<String, usize>) -> String {
    let count = seen.entry(slug.clone()).or_insert(0);
    let unique = if *count == 0 {
        slug
    } else {
        format!("{slug}-{count}")
    };
    *count += 1;
    unique
}
