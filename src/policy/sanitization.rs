//! Allowlist policy for the HTML rebuilder.

use std::collections::{HashMap, HashSet};

/// Which tags, attributes and link schemes survive sanitization.
///
/// Names are matched lowercase. `style` and `on*` attributes are never
/// emitted, whatever the policy says.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SanitizationPolicy {
    pub allowed_tags: HashSet<String>,
    pub allowed_attributes_by_tag: HashMap<String, HashSet<String>>,
    pub allowed_url_schemes: HashSet<String>,
}

impl SanitizationPolicy {
    /// Empty policy: every tag is dropped, only text survives.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.allowed_tags
            .extend(tags.into_iter().map(|t| t.as_ref().to_ascii_lowercase()));
        self
    }

    pub fn allow_attributes<I, S>(mut self, tag: &str, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.allowed_attributes_by_tag
            .entry(tag.to_ascii_lowercase())
            .or_default()
            .extend(attributes.into_iter().map(|a| a.as_ref().to_ascii_lowercase()));
        self
    }

    pub fn allow_url_schemes<I, S>(mut self, schemes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.allowed_url_schemes
            .extend(schemes.into_iter().map(|s| s.as_ref().to_ascii_lowercase()));
        self
    }

    pub fn allows_tag(&self, tag: &str) -> bool {
        self.allowed_tags.contains(tag)
    }

    pub fn allows_attribute(&self, tag: &str, attribute: &str) -> bool {
        self.allowed_attributes_by_tag
            .get(tag)
            .is_some_and(|attrs| attrs.contains(attribute))
    }

    pub fn allows_scheme(&self, scheme: &str) -> bool {
        self.allowed_url_schemes.contains(scheme)
    }

    /// Canonical policy for briefing bodies written by administrators.
    pub fn briefing_body() -> Self {
        Self::new()
            .allow_tags([
                "p", "br", "hr", "strong", "em", "b", "i", "u", "s", "span", "a", "ul", "ol", "li",
                "h2", "h3", "h4", "blockquote", "code", "pre",
            ])
            .allow_attributes("a", ["href", "title", "target", "rel"])
            .allow_url_schemes(["http", "https", "mailto"])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_briefing_body_allowlists() {
        let policy = SanitizationPolicy::briefing_body();
        assert!(policy.allows_tag("a"));
        assert!(!policy.allows_tag("img"));
        assert!(!policy.allows_tag("script"));
        assert!(policy.allows_attribute("a", "href"));
        assert!(!policy.allows_attribute("p", "href"));
        assert!(policy.allows_scheme("mailto"));
        assert!(!policy.allows_scheme("javascript"));
    }

    #[test]
    fn test_builder_lowercases() {
        let policy = SanitizationPolicy::new()
            .allow_tags(["IMG"])
            .allow_attributes("IMG", ["SRC"]);
        assert!(policy.allows_tag("img"));
        assert!(policy.allows_attribute("img", "src"));
    }
}
