//! Page range parsing
//!
//! Turns strings like `"1-3, 5, 8-10"` (1-based, inclusive) into zero-based
//! page indices validated against a document's page count.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::RangeError;

/// Resolved, de-duplicated zero-based page indices.
///
/// Indices keep the order in which they were first named; use
/// [`PageRange::ascending`] where only the set matters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRange {
    indices: Vec<usize>,
}

impl PageRange {
    /// Parse a range string against a document with `page_count` pages.
    pub fn parse(spec: &str, page_count: u32) -> Result<Self, RangeError> {
        parse_page_range(spec, page_count)
    }

    /// Every page of a document.
    pub fn all(page_count: u32) -> Self {
        Self {
            indices: (0..page_count as usize).collect(),
        }
    }

    /// Validate 1-based page numbers, dropping repeats.
    pub fn from_page_numbers(pages: &[u32], page_count: u32) -> Result<Self, RangeError> {
        if pages.is_empty() {
            return Err(RangeError::EmptyRange);
        }
        let mut range = Self {
            indices: Vec::with_capacity(pages.len()),
        };
        let mut seen = HashSet::new();
        for &page in pages {
            let index = page_index(page, page_count)?;
            if seen.insert(index) {
                range.indices.push(index);
            }
        }
        Ok(range)
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn into_indices(self) -> Vec<usize> {
        self.indices
    }

    /// The same pages sorted ascending.
    pub fn ascending(&self) -> Vec<usize> {
        let mut sorted = self.indices.clone();
        sorted.sort_unstable();
        sorted
    }

    pub fn contains(&self, index: usize) -> bool {
        self.indices.contains(&index)
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Which pages of a document an operation applies to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum PageSelection {
    #[default]
    All,
    /// 1-based page numbers
    Pages(Vec<u32>),
    /// Range string such as `"1-3,5"`
    Range(String),
}

impl PageSelection {
    pub fn resolve(&self, page_count: u32) -> Result<PageRange, RangeError> {
        match self {
            PageSelection::All => Ok(PageRange::all(page_count)),
            PageSelection::Pages(pages) => PageRange::from_page_numbers(pages, page_count),
            PageSelection::Range(spec) => parse_page_range(spec, page_count),
        }
    }
}

/// Parse a page range string into zero-based indices.
///
/// Any invalid token or out-of-bounds page fails the whole parse; nothing is
/// clamped.
pub fn parse_page_range(spec: &str, page_count: u32) -> Result<PageRange, RangeError> {
    if spec.trim().is_empty() {
        return Err(RangeError::EmptyRange);
    }

    let mut indices = Vec::new();
    let mut seen = HashSet::new();

    for part in spec.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }

        let (start, end) = parse_token(part)?;
        for page in start..=end {
            let index = page_index(page, page_count)?;
            if seen.insert(index) {
                indices.push(index);
            }
        }
    }

    if indices.is_empty() {
        return Err(RangeError::EmptyRange);
    }

    Ok(PageRange { indices })
}

/// Validate 1-based page numbers, keeping repeats and order.
pub fn page_numbers_to_indices(pages: &[u32], page_count: u32) -> Result<Vec<usize>, RangeError> {
    if pages.is_empty() {
        return Err(RangeError::EmptyRange);
    }
    pages
        .iter()
        .map(|&page| page_index(page, page_count))
        .collect()
}

fn parse_token(token: &str) -> Result<(u32, u32), RangeError> {
    let invalid = || RangeError::InvalidToken(token.to_string());

    match token.split_once('-') {
        Some((start, end)) => {
            let start: u32 = start.trim().parse().map_err(|_| invalid())?;
            let end: u32 = end.trim().parse().map_err(|_| invalid())?;
            if start > end {
                return Err(invalid());
            }
            Ok((start, end))
        }
        None => {
            let page: u32 = token.parse().map_err(|_| invalid())?;
            Ok((page, page))
        }
    }
}

fn page_index(page: u32, page_count: u32) -> Result<usize, RangeError> {
    if page == 0 || page > page_count {
        return Err(RangeError::OutOfBounds { page, page_count });
    }
    Ok((page - 1) as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_single() {
        let result = parse_page_range("5", 6).unwrap();
        assert_eq!(result.indices(), &[4]);
    }

    #[test]
    fn test_parse_range() {
        let result = parse_page_range("1-3", 6).unwrap();
        assert_eq!(result.indices(), &[0, 1, 2]);
    }

    #[test]
    fn test_parse_mixed() {
        let result = parse_page_range("1-3,5", 6).unwrap();
        assert_eq!(result.ascending(), vec![0, 1, 2, 4]);
    }

    #[test]
    fn test_parse_ignores_whitespace() {
        let result = parse_page_range(" 1 - 3 ,  5 ", 6).unwrap();
        assert_eq!(result.indices(), &[0, 1, 2, 4]);
    }

    #[test]
    fn test_parse_deduplicates_keeping_token_order() {
        let result = parse_page_range("5, 1-3, 2-4", 6).unwrap();
        assert_eq!(result.indices(), &[4, 0, 1, 2, 3]);
        assert_eq!(result.ascending(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_parse_out_of_bounds() {
        let err = parse_page_range("1-10", 5).unwrap_err();
        assert_eq!(
            err,
            RangeError::OutOfBounds {
                page: 6,
                page_count: 5
            }
        );
    }

    #[test]
    fn test_parse_page_zero_is_out_of_bounds() {
        let err = parse_page_range("0", 5).unwrap_err();
        assert!(matches!(err, RangeError::OutOfBounds { page: 0, .. }));
    }

    #[test]
    fn test_parse_invalid_token() {
        assert_eq!(
            parse_page_range("abc", 5).unwrap_err(),
            RangeError::InvalidToken("abc".into())
        );
        assert!(matches!(
            parse_page_range("1-2-3", 5).unwrap_err(),
            RangeError::InvalidToken(_)
        ));
        assert!(matches!(
            parse_page_range("-3", 5).unwrap_err(),
            RangeError::InvalidToken(_)
        ));
    }

    #[test]
    fn test_parse_reversed_range_is_invalid() {
        assert_eq!(
            parse_page_range("4-2", 5).unwrap_err(),
            RangeError::InvalidToken("4-2".into())
        );
    }

    #[test]
    fn test_parse_empty() {
        assert_eq!(parse_page_range("", 5).unwrap_err(), RangeError::EmptyRange);
        assert_eq!(
            parse_page_range("   ", 5).unwrap_err(),
            RangeError::EmptyRange
        );
        assert_eq!(
            parse_page_range(" , ,", 5).unwrap_err(),
            RangeError::EmptyRange
        );
    }

    #[test]
    fn test_parse_skips_empty_tokens() {
        let result = parse_page_range("1,,3", 5).unwrap();
        assert_eq!(result.indices(), &[0, 2]);
    }

    #[test]
    fn test_selection_resolve() {
        assert_eq!(PageSelection::All.resolve(3).unwrap().indices(), &[0, 1, 2]);
        assert_eq!(
            PageSelection::Pages(vec![3, 1, 3])
                .resolve(3)
                .unwrap()
                .indices(),
            &[2, 0]
        );
        assert_eq!(
            PageSelection::Range("2-3".into())
                .resolve(3)
                .unwrap()
                .indices(),
            &[1, 2]
        );
        assert!(PageSelection::Pages(vec![4]).resolve(3).is_err());
    }

    #[test]
    fn test_page_numbers_keep_duplicates() {
        assert_eq!(
            page_numbers_to_indices(&[2, 2, 1], 3).unwrap(),
            vec![1, 1, 0]
        );
        assert!(page_numbers_to_indices(&[], 3).is_err());
    }

    #[test]
    fn test_selection_deserializes() {
        let sel: PageSelection =
            serde_json::from_str(r#"{"kind":"Range","value":"1-2"}"#).unwrap();
        assert_eq!(sel, PageSelection::Range("1-2".into()));
        let sel: PageSelection = serde_json::from_str(r#"{"kind":"All"}"#).unwrap();
        assert_eq!(sel, PageSelection::All);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Property: parsing never panics on arbitrary input
        #[test]
        fn parse_never_panics(input in ".{0,64}", count in 0u32..50) {
            let _ = parse_page_range(&input, count);
        }

        /// Property: every resolved index is within bounds
        #[test]
        fn resolved_indices_in_bounds(
            start in 1u32..40,
            len in 0u32..10,
            count in 1u32..60
        ) {
            let spec = format!("{}-{}", start, start + len);
            if let Ok(range) = parse_page_range(&spec, count) {
                prop_assert!(range.indices().iter().all(|&i| i < count as usize));
                prop_assert_eq!(range.len() as u32, len + 1);
            } else {
                prop_assert!(start + len > count);
            }
        }

        /// Property: output never contains duplicates
        #[test]
        fn resolved_indices_unique(pages in prop::collection::vec(1u32..20, 1..15)) {
            let spec = pages.iter().map(|p| p.to_string()).collect::<Vec<_>>().join(",");
            let range = parse_page_range(&spec, 20).unwrap();
            let unique: HashSet<_> = range.indices().iter().collect();
            prop_assert_eq!(unique.len(), range.len());
        }
    }
}
