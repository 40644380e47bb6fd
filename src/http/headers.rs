use crate::base::error::CoreError;
use http::header::{HeaderName, HeaderValue};
use std::str::FromStr;

/// An ordered, multi-valued header map.
///
/// Preserves insertion order and repeated names, which the cache needs to
/// round-trip responses exactly and to detect illegally duplicated
/// singleton headers (`Date`, `Expires`, `Age`). Names are
/// case-insensitive; `HeaderName` normalizes to lowercase.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeaderBag {
    entries: Vec<(HeaderName, HeaderValue)>,
}

impl HeaderBag {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Append a header, keeping any existing values for the same name.
    pub fn append(&mut self, name: &str, value: &str) -> Result<(), CoreError> {
        let name = HeaderName::from_str(name).map_err(|_| CoreError::parse("header name", name))?;
        let value =
            HeaderValue::from_str(value).map_err(|_| CoreError::parse("header value", value))?;
        self.entries.push((name, value));
        Ok(())
    }

    /// Append a pre-validated pair.
    pub fn append_pair(&mut self, name: HeaderName, value: HeaderValue) {
        self.entries.push((name, value));
    }

    /// Replace every occurrence of `name` with a single value, appending
    /// if the name was absent. The replacement takes the position of the
    /// first removed occurrence.
    pub fn set(&mut self, name: &str, value: &str) -> Result<(), CoreError> {
        let name = HeaderName::from_str(name).map_err(|_| CoreError::parse("header name", name))?;
        let value =
            HeaderValue::from_str(value).map_err(|_| CoreError::parse("header value", value))?;
        self.set_pair(name, value);
        Ok(())
    }

    /// Replace every occurrence of `name` with a single pre-validated value.
    pub fn set_pair(&mut self, name: HeaderName, value: HeaderValue) {
        match self.entries.iter().position(|(n, _)| *n == name) {
            Some(first) => {
                self.entries.retain(|(n, _)| *n != name);
                self.entries.insert(first.min(self.entries.len()), (name, value));
            }
            None => self.entries.push((name, value)),
        }
    }

    /// Remove every occurrence of `name`.
    pub fn remove(&mut self, name: &str) {
        if let Ok(target) = HeaderName::from_str(name) {
            self.entries.retain(|(n, _)| *n != target);
        }
    }

    /// First value for `name`, as a string. Values that are not valid
    /// visible ASCII are skipped.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.values_of(name).next()
    }

    /// All values for `name`, in insertion order.
    pub fn values_of<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a str> {
        let target = HeaderName::from_str(name).ok();
        self.entries
            .iter()
            .filter(move |(n, _)| Some(n) == target.as_ref())
            .filter_map(|(_, v)| v.to_str().ok())
    }

    /// Number of occurrences of `name`.
    pub fn count_of(&self, name: &str) -> usize {
        match HeaderName::from_str(name) {
            Ok(target) => self.entries.iter().filter(|(n, _)| *n == target).count(),
            Err(_) => 0,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.count_of(name) > 0
    }

    /// Canonical single value: all occurrences comma-joined in order.
    /// Repeated headers and pre-joined comma lists round-trip to the same
    /// canonical form.
    pub fn combined_value(&self, name: &str) -> Option<String> {
        let mut it = self.values_of(name);
        let first = it.next()?;
        let mut out = first.to_string();
        for v in it {
            out.push_str(", ");
            out.push_str(v);
        }
        Some(out)
    }

    /// Comma-separated tokens across all occurrences of `name`, trimmed,
    /// empty tokens dropped. The common currency for `Cache-Control`,
    /// `Vary`, and friends.
    pub fn tokens_of<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a str> {
        self.values_of(name)
            .flat_map(|v| v.split(','))
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&HeaderName, &HeaderValue)> {
        self.entries.iter().map(|(n, v)| (n, v))
    }
}

impl FromIterator<(HeaderName, HeaderValue)> for HeaderBag {
    fn from_iter<I: IntoIterator<Item = (HeaderName, HeaderValue)>>(iter: I) -> Self {
        Self { entries: iter.into_iter().collect() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bag(pairs: &[(&str, &str)]) -> HeaderBag {
        let mut b = HeaderBag::new();
        for (n, v) in pairs {
            b.append(n, v).unwrap();
        }
        b
    }

    #[test]
    fn test_append_and_get() {
        let b = bag(&[("Content-Type", "application/json")]);
        assert_eq!(b.get_str("content-type"), Some("application/json"));
    }

    #[test]
    fn test_multi_value_preserved() {
        let b = bag(&[("Vary", "Accept"), ("Vary", "User-Agent")]);
        assert_eq!(b.count_of("vary"), 2);
        assert_eq!(b.values_of("Vary").collect::<Vec<_>>(), vec!["Accept", "User-Agent"]);
    }

    #[test]
    fn test_combined_value_round_trips_both_forms() {
        let repeated = bag(&[("Vary", "Accept"), ("Vary", "User-Agent")]);
        let joined = bag(&[("Vary", "Accept, User-Agent")]);
        assert_eq!(repeated.combined_value("vary").unwrap(), "Accept, User-Agent");
        assert_eq!(
            repeated.tokens_of("vary").collect::<Vec<_>>(),
            joined.tokens_of("vary").collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_set_replaces_all_occurrences() {
        let mut b = bag(&[("Cache-Control", "no-cache"), ("Accept", "*/*"), ("Cache-Control", "private")]);
        b.set("Cache-Control", "public").unwrap();
        assert_eq!(b.count_of("cache-control"), 1);
        assert_eq!(b.get_str("cache-control"), Some("public"));
        // Replacement keeps the first occurrence's position.
        assert_eq!(b.iter().next().unwrap().0.as_str(), "cache-control");
    }

    #[test]
    fn test_tokens_trim_and_drop_empty() {
        let b = bag(&[("Cache-Control", " max-age=10 ,, no-cache ")]);
        assert_eq!(b.tokens_of("cache-control").collect::<Vec<_>>(), vec!["max-age=10", "no-cache"]);
    }

    #[test]
    fn test_invalid_name_rejected() {
        let mut b = HeaderBag::new();
        assert!(b.append("bad header", "v").is_err());
        assert!(b.append("X-Ok", "bad\nvalue").is_err());
    }

    #[test]
    fn test_remove() {
        let mut b = bag(&[("X-A", "1"), ("X-A", "2"), ("X-B", "3")]);
        b.remove("x-a");
        assert!(!b.contains("X-A"));
        assert!(b.contains("X-B"));
    }
}
