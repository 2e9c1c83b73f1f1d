//! `Link` header parsing (RFC 8288), used for paginated APIs.

use std::collections::BTreeMap;
use std::fmt;

/// One link from a `Link` header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Link {
    /// Target URI, without the angle brackets.
    pub url: String,
    /// Relation type (`next`, `prev`, ...), empty when absent.
    pub rel: String,
    /// Remaining parameters, keys lower-cased.
    pub params: BTreeMap<String, String>,
}

impl Link {
    /// Whether the link carries parameter `key`.
    pub fn has_param(&self, key: &str) -> bool {
        self.params.contains_key(key)
    }

    /// Value of parameter `key`, if present.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", self.url)?;
        for (key, value) in &self.params {
            write!(f, "; {}=\"{}\"", key, value)?;
        }
        if !self.rel.is_empty() {
            write!(f, "; rel=\"{}\"", self.rel)?;
        }
        Ok(())
    }
}

/// Parse one `Link` header value.
///
/// Malformed parameters are skipped and links without a target are dropped,
/// so this never fails.
pub fn parse_link_header(raw: &str) -> Vec<Link> {
    raw.split(',')
        .map(str::trim)
        .filter(|chunk| !chunk.is_empty())
        .filter_map(parse_link)
        .collect()
}

/// Parse several `Link` header values into one list, in order.
pub fn parse_link_headers<'a>(values: impl IntoIterator<Item = &'a str>) -> Vec<Link> {
    values.into_iter().flat_map(parse_link_header).collect()
}

/// Keep only the links with relation `rel`.
pub fn filter_by_rel<'a>(links: &'a [Link], rel: &'a str) -> impl Iterator<Item = &'a Link> + 'a {
    links.iter().filter(move |link| link.rel == rel)
}

fn parse_link(chunk: &str) -> Option<Link> {
    let mut link = Link::default();

    for piece in chunk.split(';').map(str::trim).filter(|p| !p.is_empty()) {
        if let Some(url) = piece.strip_prefix('<').and_then(|p| p.strip_suffix('>')) {
            link.url = url.to_string();
            continue;
        }

        let (key, value) = match piece.split_once('=') {
            Some((key, value)) => (key.trim(), value.trim().trim_matches('"')),
            None => (piece, ""),
        };
        if key.is_empty() {
            continue;
        }

        if key.eq_ignore_ascii_case("rel") {
            link.rel = value.to_string();
        } else {
            link.params.insert(key.to_ascii_lowercase(), value.to_string());
        }
    }

    (!link.url.is_empty()).then_some(link)
}
