use super::{DirectoryEntry, DirectoryError, DirectoryErrorKind, DirectoryResult};
use regex::Regex;

/// Search filter subset understood by the sandbox directory.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchFilter {
    Present(String),
    Equality(String, String),
    Substring(String, SubstringFilter),
    GreaterOrEqual(String, String),
    LessOrEqual(String, String),
    And(Vec<SearchFilter>),
    Or(Vec<SearchFilter>),
    Not(Box<SearchFilter>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubstringFilter {
    pub initial: Option<String>,
    pub any: Vec<String>,
    pub final_: Option<String>,
}

fn text_values<'a>(entry: &'a DirectoryEntry, attr: &str) -> impl Iterator<Item = String> + 'a {
    entry
        .attributes
        .get(attr)
        .into_iter()
        .flatten()
        .map(|raw| String::from_utf8_lossy(raw).into_owned())
}

impl SearchFilter {
    pub fn matches(&self, entry: &DirectoryEntry) -> bool {
        match self {
            SearchFilter::Present(attr) => {
                attr.eq_ignore_ascii_case("objectClass") || entry.attributes.contains(attr)
            }
            SearchFilter::Equality(attr, value) => {
                text_values(entry, attr).any(|v| v.eq_ignore_ascii_case(value))
            }
            SearchFilter::Substring(attr, substring) => {
                text_values(entry, attr).any(|v| substring.matches(&v))
            }
            SearchFilter::GreaterOrEqual(attr, value) => {
                text_values(entry, attr).any(|v| compare(&v, value).is_ge())
            }
            SearchFilter::LessOrEqual(attr, value) => {
                text_values(entry, attr).any(|v| compare(&v, value).is_le())
            }
            SearchFilter::And(filters) => filters.iter().all(|f| f.matches(entry)),
            SearchFilter::Or(filters) => filters.iter().any(|f| f.matches(entry)),
            SearchFilter::Not(filter) => !filter.matches(entry),
        }
    }
}

// Integers compare numerically, everything else case-insensitively.
fn compare(value: &str, assertion: &str) -> std::cmp::Ordering {
    match (value.parse::<i64>(), assertion.parse::<i64>()) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        _ => value.to_lowercase().cmp(&assertion.to_lowercase()),
    }
}

impl SubstringFilter {
    pub fn matches(&self, value: &str) -> bool {
        let mut pattern = String::new();

        match &self.initial {
            Some(initial) => pattern.push_str(&regex::escape(initial)),
            None => pattern.push_str(".*"),
        }
        for any in &self.any {
            pattern.push_str(".*");
            pattern.push_str(&regex::escape(any));
        }
        pattern.push_str(".*");
        if let Some(final_) = &self.final_ {
            pattern.push_str(&regex::escape(final_));
        }

        Regex::new(&format!("(?is)^{}$", pattern))
            .map(|re| re.is_match(value))
            .unwrap_or(false)
    }
}

fn filter_error(message: impl Into<String>) -> DirectoryError {
    DirectoryError::new(DirectoryErrorKind::FilterError, message)
}

/// Reverses `\XX` hex escapes in assertion values.
fn unescape_filter_value(value: &str) -> String {
    let mut out = Vec::with_capacity(value.len());
    let bytes = value.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'\\' {
            if let Some(byte) = value
                .get(i + 1..i + 3)
                .and_then(|h| u8::from_str_radix(h, 16).ok())
            {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }

    String::from_utf8_lossy(&out).into_owned()
}

pub fn parse_filter(filter_str: &str) -> DirectoryResult<SearchFilter> {
    let filter_str = filter_str.trim();

    if filter_str.is_empty() {
        return Err(filter_error("Empty filter string"));
    }
    if !filter_str.starts_with('(') || !filter_str.ends_with(')') {
        return Err(filter_error("Filter must be wrapped in parentheses"));
    }

    let inner = &filter_str[1..filter_str.len() - 1];

    if let Some(rest) = inner.strip_prefix('&') {
        return Ok(SearchFilter::And(parse_composite_filters(rest)?));
    } else if let Some(rest) = inner.strip_prefix('|') {
        return Ok(SearchFilter::Or(parse_composite_filters(rest)?));
    } else if let Some(rest) = inner.strip_prefix('!') {
        return Ok(SearchFilter::Not(Box::new(parse_filter(rest)?)));
    }

    if let Some(attr) = inner.strip_suffix("=*") {
        return Ok(SearchFilter::Present(attr.to_string()));
    }

    if let Some((attr, value)) = inner.split_once(">=") {
        return Ok(SearchFilter::GreaterOrEqual(
            attr.to_string(),
            unescape_filter_value(value),
        ));
    }
    if let Some((attr, value)) = inner.split_once("<=") {
        return Ok(SearchFilter::LessOrEqual(
            attr.to_string(),
            unescape_filter_value(value),
        ));
    }

    let (attr, value) = inner
        .split_once('=')
        .ok_or_else(|| filter_error(format!("Invalid filter format: {}", filter_str)))?;
    if attr.is_empty() {
        return Err(filter_error(format!("Missing attribute in filter: {}", filter_str)));
    }

    if value.contains('*') {
        let parts: Vec<&str> = value.split('*').collect();
        let last = parts.len() - 1;
        let non_empty = |s: &str| (!s.is_empty()).then(|| unescape_filter_value(s));
        return Ok(SearchFilter::Substring(
            attr.to_string(),
            SubstringFilter {
                initial: non_empty(parts[0]),
                any: parts[1..last]
                    .iter()
                    .filter(|s| !s.is_empty())
                    .map(|s| unescape_filter_value(s))
                    .collect(),
                final_: non_empty(parts[last]),
            },
        ));
    }

    Ok(SearchFilter::Equality(
        attr.to_string(),
        unescape_filter_value(value),
    ))
}

fn parse_composite_filters(s: &str) -> DirectoryResult<Vec<SearchFilter>> {
    let mut filters = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;

    for (i, ch) in s.char_indices() {
        match ch {
            '(' => {
                if depth == 0 {
                    start = i;
                }
                depth += 1;
            }
            ')' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| filter_error("Unbalanced parentheses in filter"))?;
                if depth == 0 {
                    filters.push(parse_filter(&s[start..=i])?);
                }
            }
            _ => {}
        }
    }

    if depth != 0 {
        return Err(filter_error("Unbalanced parentheses in filter"));
    }

    Ok(filters)
}
