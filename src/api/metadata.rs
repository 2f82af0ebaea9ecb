//! Entity set name resolution
//!
//! The Web API addresses tables by their entity set (collection) name, which
//! for almost every table is the English plural of the logical name. Tables
//! that break the rule are handled with explicit overrides.

use std::collections::HashMap;

/// Maps a logical entity name to the collection name used in URLs.
pub trait EntitySetResolver: Send + Sync {
    fn entity_set(&self, logical_name: &str) -> String;
}

/// Resolver backed by English pluralization plus per-entity overrides.
#[derive(Debug, Clone, Default)]
pub struct PluralizingResolver {
    overrides: HashMap<String, String>,
}

impl PluralizingResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_override(mut self, logical_name: impl Into<String>, entity_set: impl Into<String>) -> Self {
        self.overrides.insert(logical_name.into(), entity_set.into());
        self
    }

    pub fn with_overrides<I, K, V>(mut self, overrides: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.overrides
            .extend(overrides.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }
}

impl EntitySetResolver for PluralizingResolver {
    fn entity_set(&self, logical_name: &str) -> String {
        match self.overrides.get(logical_name) {
            Some(entity_set) => entity_set.clone(),
            None => pluralize_entity_name(logical_name),
        }
    }
}

fn is_vowel(c: char) -> bool {
    matches!(c, 'a' | 'e' | 'i' | 'o' | 'u')
}

/// Whether the letter before the last one is a consonant
fn consonant_before_last(lower: &str) -> bool {
    lower.chars().rev().nth(1).is_some_and(|c| c.is_ascii_alphabetic() && !is_vowel(c))
}

/// Convert entity name to plural form using English grammar rules
pub fn pluralize_entity_name(entity_name: &str) -> String {
    if entity_name.is_empty() {
        return String::new();
    }

    let lower = entity_name.to_lowercase();
    // drop the last `n` ASCII letters; the suffixes matched below are ASCII
    let stem = |n: usize| &entity_name[..entity_name.len() - n];

    // quiz -> quizzes, but waltz -> waltzes
    if lower.ends_with('z') && !lower.ends_with("tz") {
        return format!("{}zes", entity_name);
    }

    if ["s", "sh", "ch", "x"].iter().any(|suffix| lower.ends_with(suffix)) {
        return format!("{}es", entity_name);
    }

    if lower.ends_with('y') && consonant_before_last(&lower) {
        return format!("{}ies", stem(1));
    }

    if lower.ends_with("fe") {
        return format!("{}ves", stem(2));
    }
    if lower.ends_with('f') {
        return format!("{}ves", stem(1));
    }

    if lower.ends_with('o') && consonant_before_last(&lower) {
        return format!("{}es", entity_name);
    }

    format!("{}s", entity_name)
}
