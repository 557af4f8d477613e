//! Fixture identifiers: `"collection/name"`, a bare `"collection"`, or the
//! empty root id.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use convert_case::{Case, Casing};

/// Splits an id into its collection and (possibly nested) name.
///
/// `"users/admin"` yields `("users", "admin")`, `"posts/2024/intro"` yields
/// `("posts", "2024/intro")` and `"users"` yields `("users", "")`.
pub fn split(id: &str) -> (&str, &str) {
    match id.split_once('/') {
        Some((base, name)) => (base, name),
        None => (id, ""),
    }
}

/// Joins a collection and a name into a fixture id.
pub fn join(base: &str, name: &str) -> String {
    format!("{base}/{name}")
}

/// Returns the collection part of an id.
pub fn base_of(id: &str) -> &str {
    split(id).0
}

/// Auto-incrementing fixture names for generated batches.
///
/// Clones share the counter, so every handle given to a generator draws
/// from the same sequence.
#[derive(Debug, Clone)]
pub struct FixtureIdGenerator {
    singular: String,
    counter: Arc<AtomicUsize>,
}

impl FixtureIdGenerator {
    pub fn new(singular: impl Into<String>) -> Self {
        Self {
            singular: singular.into(),
            counter: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Returns the next name, e.g. `post-1`, `post-2`.
    pub fn next_id(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        format!("{}-{}", self.singular, n)
    }
}

pub fn kebab_case(value: &str) -> String {
    value.to_case(Case::Kebab)
}

pub fn camel_case(value: &str) -> String {
    value.to_case(Case::Camel)
}

/// Regular English plural of the final word. Irregular nouns are not
/// handled (`Person` becomes `persons`); such collections set their name
/// with `CollectionSchema::collection_name`.
pub fn pluralize(word: &str) -> String {
    if word.is_empty() {
        return String::new();
    }
    let lower = word.to_lowercase();
    if lower.ends_with("ss")
        || lower.ends_with("sh")
        || lower.ends_with("ch")
        || lower.ends_with('x')
        || lower.ends_with('z')
    {
        return format!("{word}es");
    }
    if lower.ends_with('s') {
        return word.to_string();
    }
    if let Some(stem) = word.strip_suffix('y') {
        let before = stem.chars().last().map(|c| c.to_ascii_lowercase());
        if !matches!(before, Some('a' | 'e' | 'i' | 'o' | 'u') | None) {
            return format!("{stem}ies");
        }
    }
    format!("{word}s")
}

/// `UserProfile` -> `user-profiles`.
pub fn plural_kebab(model: &str) -> String {
    pluralize(&kebab_case(model))
}

/// `UserProfile` -> `userProfiles`.
pub fn plural_camel(model: &str) -> String {
    camel_case(&plural_kebab(model))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_and_join_round_trip() {
        assert_eq!(split("users/admin"), ("users", "admin"));
        assert_eq!(split("posts/2024/intro"), ("posts", "2024/intro"));
        assert_eq!(split("users"), ("users", ""));
        assert_eq!(split(""), ("", ""));
        assert_eq!(join("posts", "2024/intro"), "posts/2024/intro");
        assert_eq!(base_of("users/admin"), "users");
    }

    #[test]
    fn generator_is_strictly_increasing_across_clones() {
        let ids = FixtureIdGenerator::new("post");
        let other = ids.clone();
        assert_eq!(ids.next_id(), "post-1");
        assert_eq!(other.next_id(), "post-2");
        assert_eq!(ids.next_id(), "post-3");
    }

    #[test]
    fn inflects_model_names() {
        assert_eq!(plural_kebab("User"), "users");
        assert_eq!(plural_kebab("UserProfile"), "user-profiles");
        assert_eq!(plural_kebab("Category"), "categories");
        assert_eq!(plural_kebab("Address"), "addresses");
        assert_eq!(plural_kebab("Day"), "days");
        assert_eq!(plural_camel("UserProfile"), "userProfiles");
        assert_eq!(plural_kebab("Person"), "persons");
        assert_eq!(camel_case("UserProfile"), "userProfile");
    }
}
