//! Split Spring-Data repository method names into derived-query tokens.
//!
//! `findByAgeGreaterThanAndNameIn` becomes
//! `["findBy", "Age", "GreaterThan", "And", "Name", "In"]`: a subject token
//! (everything up to and including the first `By`), then property names,
//! operator keywords and connectors.

use once_cell::sync::Lazy;
use regex::Regex;

/// Verbs that may open a derived query.
static SUBJECT_VERB: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(find|read|get|query|search|stream|count|exists|delete|remove)")
        .expect("valid subject verb regex")
});

/// Operator and connector keywords, longest first so greedy matching picks
/// `GreaterThanEqual` over `GreaterThan`.
const KEYWORDS: &[&str] = &[
    "GreaterThanEqual",
    "LessThanEqual",
    "StartingWith",
    "StartsWith",
    "EndingWith",
    "EndsWith",
    "GreaterThan",
    "Containing",
    "Contains",
    "IsNotNull",
    "LessThan",
    "NotNull",
    "Between",
    "OrderBy",
    "Before",
    "IsNull",
    "Equals",
    "After",
    "False",
    "Like",
    "Null",
    "True",
    "Desc",
    "And",
    "Asc",
    "Not",
    "In",
    "Is",
    "Or",
];

/// Split `name` into derived-query tokens.
pub fn split_method_name(name: &str) -> Vec<String> {
    split_method_name_with_properties(name, &[])
}

/// Split `name`, preferring the given entity property names over keyword
/// splitting so that a property such as `loggedIn` is kept whole.
pub fn split_method_name_with_properties(name: &str, properties: &[&str]) -> Vec<String> {
    let (subject, rest) = split_subject(name);
    let mut tokens = vec![subject.to_string()];
    if rest.is_empty() {
        return tokens;
    }

    let words = camel_words(rest);
    let mut property: Vec<&str> = Vec::new();
    let mut i = 0;

    while i < words.len() {
        if let Some(len) = match_property(&words[i..], properties) {
            flush(&mut property, &mut tokens);
            tokens.push(words[i..i + len].concat());
            i += len;
            continue;
        }
        if let Some(len) = match_keyword(&words[i..]) {
            flush(&mut property, &mut tokens);
            tokens.push(words[i..i + len].concat());
            i += len;
            continue;
        }
        property.push(words[i]);
        i += 1;
    }
    flush(&mut property, &mut tokens);

    tokens
}

/// Split off the subject token: `findBy`, `findTop3By`, `countDistinctBy`,
/// `findAll`, `findAllById`.
fn split_subject(name: &str) -> (&str, &str) {
    if name == "findAll" || name == "findAllById" {
        return (name, "");
    }
    if let Some(rest) = name.strip_prefix("findAll") {
        if rest.starts_with("OrderBy") {
            return ("findAll", rest);
        }
    }

    let verb_end = match SUBJECT_VERB.find(name) {
        Some(m) => m.end(),
        None => return (name, ""),
    };

    // first `By` that starts a new camel-case word
    let bytes = name.as_bytes();
    let mut search = verb_end;
    while let Some(offset) = name[search..].find("By") {
        let idx = search + offset;
        let end = idx + 2;
        let at_boundary = end == name.len() || bytes[end].is_ascii_uppercase();
        let is_order_by = name[..idx].ends_with("Order");
        if at_boundary && !is_order_by {
            return (&name[..end], &name[end..]);
        }
        search = end;
    }

    (name, "")
}

/// `AgeGreaterThan` -> `["Age", "Greater", "Than"]`; digits stay attached.
fn camel_words(text: &str) -> Vec<&str> {
    let mut words = Vec::new();
    let mut start = 0;
    for (idx, ch) in text.char_indices().skip(1) {
        if ch.is_ascii_uppercase() {
            words.push(&text[start..idx]);
            start = idx;
        }
    }
    if start < text.len() {
        words.push(&text[start..]);
    }
    words
}

fn match_keyword(words: &[&str]) -> Option<usize> {
    KEYWORDS.iter().find_map(|keyword| match_words(words, keyword))
}

fn match_property(words: &[&str], properties: &[&str]) -> Option<usize> {
    properties
        .iter()
        .filter_map(|property| match_words(words, property))
        .max()
}

/// Number of leading `words` that concatenate exactly to `target`
/// (first letter compared case-insensitively).
fn match_words(words: &[&str], target: &str) -> Option<usize> {
    let mut consumed = 0;
    for (count, word) in words.iter().enumerate() {
        consumed += word.len();
        if consumed > target.len() {
            return None;
        }
        if consumed == target.len() {
            let joined = words[..=count].concat();
            return eq_capitalized(&joined, target).then_some(count + 1);
        }
    }
    None
}

fn eq_capitalized(word: &str, target: &str) -> bool {
    let mut a = word.chars();
    let mut b = target.chars();
    match (a.next(), b.next()) {
        (Some(x), Some(y)) => x.eq_ignore_ascii_case(&y) && a.as_str() == b.as_str(),
        _ => false,
    }
}

fn flush(property: &mut Vec<&str>, tokens: &mut Vec<String>) {
    if !property.is_empty() {
        tokens.push(property.concat());
        property.clear();
    }
}
