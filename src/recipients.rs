//! Parsing of the configured admin recipient list.

use serde::Serialize;

/// An ordered list of recipient email addresses.
///
/// Duplicates are kept: a repeated address receives a repeated delivery.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RecipientSet {
    addresses: Vec<String>,
}

impl RecipientSet {
    /// Parses a comma-separated list of addresses.
    ///
    /// Candidates are trimmed and empty ones dropped. An absent or empty
    /// input yields an empty set.
    pub fn parse(raw: Option<&str>) -> Self {
        let addresses = raw
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|candidate| !candidate.is_empty())
            .map(str::to_string)
            .collect();
        Self { addresses }
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.addresses.iter().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.addresses
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_trims_and_drops_empty_candidates() {
        let set = RecipientSet::parse(Some(" ops@example.com, ,admin@example.com ,"));
        assert_eq!(set.as_slice(), ["ops@example.com", "admin@example.com"]);
    }

    #[test]
    fn test_parse_absent_or_blank_is_empty() {
        assert!(RecipientSet::parse(None).is_empty());
        assert!(RecipientSet::parse(Some("")).is_empty());
        assert!(RecipientSet::parse(Some(" , ,")).is_empty());
    }

    #[test]
    fn test_parse_keeps_duplicates_in_order() {
        let set = RecipientSet::parse(Some("a@example.com,b@example.com,a@example.com"));
        assert_eq!(set.len(), 3);
        assert_eq!(
            set.iter().collect::<Vec<_>>(),
            vec!["a@example.com", "b@example.com", "a@example.com"]
        );
    }

    #[test]
    fn test_parse_is_repeatable() {
        let raw = Some("x@example.com, y@example.com");
        assert_eq!(RecipientSet::parse(raw), RecipientSet::parse(raw));
    }
}
