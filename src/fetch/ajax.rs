//! AJAX crawling support: hashbang fragments and their escaped form.
//!
//! Implements the fragment rewrite protocol from the AJAX crawling
//! specification: a URL whose fragment starts with `!` is fetched with the
//! fragment moved into the `_escaped_fragment_` query parameter, and a page
//! carrying `<meta name="fragment" content="!">` asks for the same rewrite
//! of its own URL.

use scraper::{Html, Selector};
use url::Url;

/// Query parameter carrying an escaped hashbang fragment.
pub const ESCAPED_FRAGMENT: &str = "_escaped_fragment_";

fn set_query_param(url: &mut Url, name: &str, value: &str) {
    let retained: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != name)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    let mut pairs = url.query_pairs_mut();
    pairs.clear();
    pairs.extend_pairs(retained.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    pairs.append_pair(name, value);
}

/// `path#!x` → `path?_escaped_fragment_=x`. URLs without a hashbang
/// fragment (or that fail to parse) come back unchanged.
#[must_use]
pub fn escape_fragment(rawurl: &str) -> String {
    let Ok(mut url) = Url::parse(rawurl) else {
        return rawurl.to_string();
    };
    let fragment = match url.fragment().and_then(|f| f.strip_prefix('!')) {
        Some(rest) => rest.to_string(),
        None => return rawurl.to_string(),
    };
    set_query_param(&mut url, ESCAPED_FRAGMENT, &fragment);
    url.set_fragment(None);
    url.to_string()
}

/// Inverse of [`escape_fragment`]: drop `_escaped_fragment_=v` and restore
/// the `!v` fragment. URLs without the parameter come back unchanged.
#[must_use]
pub fn unescape_fragment(rawurl: &str) -> String {
    let Ok(mut url) = Url::parse(rawurl) else {
        return rawurl.to_string();
    };
    let mut fragment = None;
    let retained: Vec<(String, String)> = url
        .query_pairs()
        .filter_map(|(k, v)| {
            if k == ESCAPED_FRAGMENT {
                fragment = Some(v.into_owned());
                None
            } else {
                Some((k.into_owned(), v.into_owned()))
            }
        })
        .collect();
    let Some(fragment) = fragment else {
        return rawurl.to_string();
    };

    if retained.is_empty() {
        url.set_query(None);
    } else {
        let mut pairs = url.query_pairs_mut();
        pairs.clear();
        pairs.extend_pairs(retained.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    }
    if !fragment.is_empty() {
        url.set_fragment(Some(&format!("!{fragment}")));
    }
    url.to_string()
}

/// Scan a fetched document for a head-level
/// `<meta name="fragment" content="!…"/>` and, when present, return `rawurl`
/// rewritten with the escaped fragment. `None` means no rewrite: the URL
/// already carries `_escaped_fragment_`, the URL does not parse, or no such
/// meta element exists before the document body. Only `<head>` hints count;
/// a `fragment` meta authored inside `<body>` is deliberately ignored, the
/// parsed-tree equivalent of aborting a token scan at the `<body>` start
/// tag.
#[must_use]
pub fn fragment_meta_rewrite(rawurl: &str, body: &str) -> Option<String> {
    let Ok(mut url) = Url::parse(rawurl) else {
        return None;
    };
    if url.query_pairs().any(|(k, _)| k == ESCAPED_FRAGMENT) {
        return None;
    }

    let selector = Selector::parse("head meta").ok()?;
    let document = Html::parse_document(body);
    for element in document.select(&selector) {
        let name = element.value().attr("name").unwrap_or("");
        let content = element.value().attr("content").unwrap_or("");
        if name == "fragment" {
            if let Some(rest) = content.strip_prefix('!') {
                set_query_param(&mut url, ESCAPED_FRAGMENT, rest);
                return Some(url.to_string());
            }
        }
    }
    None
}
