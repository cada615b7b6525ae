use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum TextSegment {
    Text(String),
    Link(String),
}

fn link_regex() -> Option<&'static Regex> {
    static LINK_RE: OnceLock<Option<Regex>> = OnceLock::new();
    LINK_RE
        .get_or_init(|| match Regex::new(r"(https?://.+?)[.?!]?(?:\s|$)") {
            Ok(re) => Some(re),
            Err(err) => {
                tracing::error!(error = %err, "internal link regex compile failure");
                None
            }
        })
        .as_ref()
}

/// Splits free text into plain runs and `http(s)://` links.
///
/// A link runs up to the next whitespace; one trailing `.`, `?` or `!` stays
/// with the surrounding text.
pub fn parse_links(text: &str) -> Vec<TextSegment> {
    let Some(re) = link_regex() else {
        return vec![TextSegment::Text(text.to_string())];
    };

    let mut out = Vec::new();
    let mut prev = 0;
    for caps in re.captures_iter(text) {
        let Some(link) = caps.get(1) else {
            continue;
        };
        if link.start() > prev {
            out.push(TextSegment::Text(text[prev..link.start()].to_string()));
        }
        out.push(TextSegment::Link(link.as_str().to_string()));
        prev = link.end();
    }
    if prev < text.len() || out.is_empty() {
        out.push(TextSegment::Text(text[prev..].to_string()));
    }
    out
}

pub fn links(text: &str) -> Vec<String> {
    parse_links(text)
        .into_iter()
        .filter_map(|segment| match segment {
            TextSegment::Link(url) => Some(url),
            TextSegment::Text(_) => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_one_segment() {
        assert_eq!(
            parse_links("Meets every Tuesday"),
            vec![TextSegment::Text("Meets every Tuesday".to_string())]
        );
    }

    #[test]
    fn trailing_punctuation_stays_in_text() {
        assert_eq!(
            parse_links("Sign up at https://example.com/form. See you!"),
            vec![
                TextSegment::Text("Sign up at ".to_string()),
                TextSegment::Link("https://example.com/form".to_string()),
                TextSegment::Text(". See you!".to_string()),
            ]
        );
    }

    #[test]
    fn multiple_links_and_end_of_text() {
        let segments = parse_links("http://a.org and https://b.org/x?y=1");
        assert_eq!(
            segments,
            vec![
                TextSegment::Link("http://a.org".to_string()),
                TextSegment::Text(" and ".to_string()),
                TextSegment::Link("https://b.org/x?y=1".to_string()),
            ]
        );
        assert_eq!(
            links("http://a.org and https://b.org/x?y=1"),
            vec!["http://a.org".to_string(), "https://b.org/x?y=1".to_string()]
        );
    }
}
