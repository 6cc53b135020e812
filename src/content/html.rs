//! Allowlist HTML rebuilder.
//!
//! Tokenizes the input with html5ever and writes a fresh document containing
//! only what the [`SanitizationPolicy`] allows. Nothing from the input is
//! copied through unescaped.

use html5ever::tendril::StrTendril;
use html5ever::tokenizer::states::RawKind;
use html5ever::tokenizer::{
    BufferQueue, Tag, TagKind, Token, TokenSink, TokenSinkResult, Tokenizer, TokenizerOpts,
};
use html5ever::Attribute;

use crate::observability::metrics;
use crate::policy::SanitizationPolicy;

/// Deepest element nesting written to the output. Deeper tags are dropped
/// and their text kept.
pub const MAX_NESTING_DEPTH: usize = 512;

/// Elements without an end tag.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Elements whose content is never text for the reader.
const RAW_CONTENT_ELEMENTS: &[&str] = &[
    "script", "style", "iframe", "template", "noscript", "textarea", "title", "xmp", "noembed",
    "noframes",
];

/// Attributes carrying a URL that must pass the scheme allowlist.
const URL_ATTRIBUTES: &[&str] = &[
    "href",
    "src",
    "cite",
    "poster",
    "action",
    "formaction",
    "background",
    "longdesc",
    "data",
    "codebase",
    "xlink:href",
];

const FORCED_REL: &str = "noopener noreferrer";

/// Rebuild `html` keeping only allowlisted tags and attributes.
///
/// Never fails: offending nodes are dropped and the rest is kept. The output
/// is well-formed, with every kept element closed.
pub fn sanitize_html(html: &str, policy: &SanitizationPolicy) -> String {
    let mut input = BufferQueue::new();
    input.push_back(StrTendril::from_slice(html));

    let mut tokenizer = Tokenizer::new(Rebuilder::new(policy), TokenizerOpts::default());
    let _ = tokenizer.feed(&mut input);
    tokenizer.end();

    let rebuilder = tokenizer.sink;
    if rebuilder.dropped > 0 {
        tracing::debug!(dropped = rebuilder.dropped, "Sanitizer dropped markup");
    }
    metrics::record_html_sanitized();
    rebuilder.finish()
}

struct OpenElement {
    /// Name as written in the input, used to match end tags.
    source: String,
    /// Name written to the output.
    emitted: String,
}

/// Token sink that writes the sanitized document as it goes.
struct Rebuilder<'p> {
    policy: &'p SanitizationPolicy,
    out: String,
    open: Vec<OpenElement>,
    /// Raw-content element being skipped, with same-name nesting count.
    skipping: Option<(String, usize)>,
    dropped: usize,
}

impl<'p> Rebuilder<'p> {
    fn new(policy: &'p SanitizationPolicy) -> Self {
        Self {
            policy,
            out: String::new(),
            open: Vec::new(),
            skipping: None,
            dropped: 0,
        }
    }

    fn finish(mut self) -> String {
        while let Some(element) = self.open.pop() {
            self.write_end(&element.emitted);
        }
        self.out
    }

    fn start_tag(&mut self, tag: Tag) -> TokenSinkResult<()> {
        let name = tag.name.to_string();

        if let Some(kind) = raw_kind(&name) {
            self.dropped += 1;
            self.skipping = Some((name, 1));
            return match kind {
                Some(raw) => TokenSinkResult::RawData(raw),
                None => TokenSinkResult::Continue,
            };
        }

        if !self.policy.allows_tag(&name) || self.open.len() >= MAX_NESTING_DEPTH {
            self.dropped += 1;
            return TokenSinkResult::Continue;
        }

        if name == "a" && !anchor_href_allowed(&tag.attrs, self.policy) {
            // A link to a disallowed scheme keeps its text but loses every attribute.
            self.out.push_str("<span>");
            self.open.push(OpenElement {
                source: name,
                emitted: "span".to_string(),
            });
            return TokenSinkResult::Continue;
        }

        // The name matched the policy exactly, so it is safe to write back.
        self.out.push('<');
        self.out.push_str(&name);
        self.write_attributes(&name, &tag.attrs);
        self.out.push('>');

        if !VOID_ELEMENTS.contains(&name.as_str()) {
            self.open.push(OpenElement {
                emitted: name.clone(),
                source: name,
            });
        }
        TokenSinkResult::Continue
    }

    fn write_attributes(&mut self, tag: &str, attrs: &[Attribute]) {
        let mut force_rel = false;
        let keep_author_rel = self.policy.allows_attribute(tag, "rel");

        for attr in attrs {
            let name = attr.name.local.to_string().to_ascii_lowercase();
            let value: &str = &attr.value;

            if name == "style" || name.starts_with("on") || name == "rel" {
                continue;
            }
            if !self.policy.allows_attribute(tag, &name) {
                continue;
            }
            if !url_attribute_allowed(&name, value, self.policy) {
                self.dropped += 1;
                continue;
            }
            if name == "target" {
                if value.trim().eq_ignore_ascii_case("_blank") {
                    force_rel = true;
                    self.out.push_str(" target=\"_blank\"");
                }
                continue;
            }
            self.write_attribute(&name, value);
        }

        if force_rel {
            self.write_attribute("rel", FORCED_REL);
        } else if keep_author_rel {
            if let Some(rel) = attrs.iter().find(|a| (*a.name.local).eq_ignore_ascii_case("rel")) {
                self.write_attribute("rel", &rel.value);
            }
        }
    }

    fn write_attribute(&mut self, name: &str, value: &str) {
        self.out.push(' ');
        self.out.push_str(name);
        self.out.push_str("=\"");
        escape_into(&mut self.out, value, true);
        self.out.push('"');
    }

    fn end_tag(&mut self, tag: Tag) {
        let name = tag.name.to_string();
        // Unmatched end tags are dropped; a matched one also closes anything
        // left open inside it.
        let Some(position) = self.open.iter().rposition(|e| e.source == name) else {
            return;
        };
        while self.open.len() > position {
            if let Some(element) = self.open.pop() {
                self.write_end(&element.emitted);
            }
        }
    }

    fn write_end(&mut self, name: &str) {
        self.out.push_str("</");
        self.out.push_str(name);
        self.out.push('>');
    }

    /// Track raw-content nesting while skipping. Returns true while still skipping.
    fn skip(&mut self, token: &Token) -> bool {
        let Some((name, depth)) = self.skipping.as_mut() else {
            return false;
        };
        if let Token::TagToken(tag) = token {
            if &*tag.name == name.as_str() {
                match tag.kind {
                    TagKind::StartTag => *depth += 1,
                    TagKind::EndTag => {
                        *depth -= 1;
                        if *depth == 0 {
                            self.skipping = None;
                        }
                    }
                }
            }
        }
        true
    }
}

impl TokenSink for Rebuilder<'_> {
    type Handle = ();

    fn process_token(&mut self, token: Token, _line_number: u64) -> TokenSinkResult<()> {
        if self.skip(&token) {
            return TokenSinkResult::Continue;
        }

        match token {
            Token::TagToken(tag) => match tag.kind {
                TagKind::StartTag => return self.start_tag(tag),
                TagKind::EndTag => self.end_tag(tag),
            },
            Token::CharacterTokens(text) => escape_into(&mut self.out, &text, false),
            Token::CommentToken(_) | Token::DoctypeToken(_) => self.dropped += 1,
            Token::NullCharacterToken | Token::EOFToken | Token::ParseError(_) => {}
        }
        TokenSinkResult::Continue
    }
}

/// `Some(raw)` switches the tokenizer so the content is not parsed as markup;
/// `Some(None)` skips an element whose content is ordinary markup.
fn raw_kind(name: &str) -> Option<Option<RawKind>> {
    if !RAW_CONTENT_ELEMENTS.contains(&name) {
        return None;
    }
    Some(match name {
        "script" => Some(RawKind::ScriptData),
        "textarea" | "title" => Some(RawKind::Rcdata),
        "template" => None,
        _ => Some(RawKind::Rawtext),
    })
}

fn anchor_href_allowed(attrs: &[Attribute], policy: &SanitizationPolicy) -> bool {
    attrs
        .iter()
        .find(|a| (*a.name.local).eq_ignore_ascii_case("href"))
        .map_or(true, |href| url_allowed(&href.value, policy))
}

/// Every URL in a URL-bearing attribute must pass. `srcset` holds a
/// comma-separated candidate list.
fn url_attribute_allowed(name: &str, value: &str, policy: &SanitizationPolicy) -> bool {
    match name {
        "srcset" => value
            .split(',')
            .filter_map(|candidate| candidate.split_whitespace().next())
            .all(|url| url_allowed(url, policy)),
        _ if URL_ATTRIBUTES.contains(&name) => url_allowed(value, policy),
        _ => true,
    }
}

/// Relative URLs pass; absolute ones need an allowed scheme.
fn url_allowed(value: &str, policy: &SanitizationPolicy) -> bool {
    match url_scheme(value) {
        Some(scheme) => policy.allows_scheme(&scheme),
        None => true,
    }
}

/// Scheme of `value`, ignoring whitespace and control characters the way
/// browsers do (`java\tscript:`).
fn url_scheme(value: &str) -> Option<String> {
    let cleaned: String = value
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .collect();
    let end = cleaned.find([':', '/', '?', '#'])?;
    if end > 0 && cleaned[end..].starts_with(':') {
        Some(cleaned[..end].to_ascii_lowercase())
    } else {
        None
    }
}

fn escape_into(out: &mut String, text: &str, attribute: bool) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            '\'' if attribute => out.push_str("&#39;"),
            '\0' => {}
            _ => out.push(c),
        }
    }
}
