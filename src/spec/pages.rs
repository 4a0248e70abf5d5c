//! Page selection and rotation for one source document.

use super::Rotation;
use crate::error::ConvertError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Which pages of a document to keep and how far to rotate them.
///
/// Indices are zero-based. Selection order carries no meaning: pages are
/// always emitted in ascending index order, which `BTreeSet` gives for free.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PageSet {
    page_count: usize,
    selected: BTreeSet<usize>,
    rotation: Rotation,
}

impl PageSet {
    /// Every page of a `page_count`-page document, unrotated.
    pub fn all(page_count: usize) -> Self {
        Self {
            page_count,
            selected: (0..page_count).collect(),
            rotation: Rotation::Deg0,
        }
    }

    /// Select exactly `pages`; duplicates collapse.
    pub fn with_pages(
        page_count: usize,
        pages: impl IntoIterator<Item = usize>,
    ) -> Result<Self, ConvertError> {
        let set = Self {
            page_count,
            selected: pages.into_iter().collect(),
            rotation: Rotation::Deg0,
        };
        set.validate()?;
        Ok(set)
    }

    pub fn with_rotation(mut self, rotation: Rotation) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    /// Rotate every page a further 90° clockwise.
    pub fn rotate_clockwise(&mut self) {
        self.rotation = self.rotation.clockwise();
    }

    pub fn is_selected(&self, index: usize) -> bool {
        self.selected.contains(&index)
    }

    /// Flip one page in or out of the selection. Out-of-range indices are ignored.
    pub fn toggle(&mut self, index: usize) {
        if index >= self.page_count {
            return;
        }
        if !self.selected.remove(&index) {
            self.selected.insert(index);
        }
    }

    /// Selected indices in ascending order.
    pub fn ascending(&self) -> Vec<usize> {
        self.selected.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.selected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    pub fn validate(&self) -> Result<(), ConvertError> {
        if let Some(&max) = self.selected.iter().next_back() {
            if max >= self.page_count {
                return Err(ConvertError::invalid_spec(format!(
                    "page {} is out of range (document has {} pages)",
                    max + 1,
                    self.page_count
                )));
            }
        }
        Ok(())
    }
}

/// Parse a 1-based range string like `"1-3, 5, 8-10"` into sorted unique
/// zero-based indices of a `page_count`-page document.
///
/// Pages past the end of the document are dropped, so the result never holds
/// more than `page_count` entries whatever the ranges say.
pub fn parse_ranges(input: &str, page_count: usize) -> Result<Vec<usize>, ConvertError> {
    let mut pages = BTreeSet::new();

    for part in input.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }

        let (start, end) = match part.split_once('-') {
            Some((s, e)) => (parse_page(s)?, parse_page(e)?),
            None => {
                let p = parse_page(part)?;
                (p, p)
            }
        };
        if start > end {
            return Err(ConvertError::invalid_spec(format!(
                "range start {start} > end {end}"
            )));
        }
        pages.extend((start..=end.min(page_count)).map(|p| p - 1));
    }

    Ok(pages.into_iter().collect())
}

fn parse_page(s: &str) -> Result<usize, ConvertError> {
    let s = s.trim();
    match s.parse::<usize>() {
        Ok(0) => Err(ConvertError::invalid_spec("page numbers start at 1")),
        Ok(p) => Ok(p),
        Err(_) => Err(ConvertError::invalid_spec(format!("invalid page number: {s:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_selects_every_page() {
        let set = PageSet::all(4);
        assert_eq!(set.ascending(), vec![0, 1, 2, 3]);
        assert_eq!(set.rotation(), Rotation::Deg0);
    }

    #[test]
    fn insertion_order_is_irrelevant() {
        let a = PageSet::with_pages(10, [7, 2, 5]).unwrap();
        let b = PageSet::with_pages(10, [5, 7, 2, 2]).unwrap();
        assert_eq!(a.ascending(), vec![2, 5, 7]);
        assert_eq!(a, b);
    }

    #[test]
    fn toggle_removes_and_restores() {
        let mut set = PageSet::all(3);
        set.toggle(1);
        assert_eq!(set.ascending(), vec![0, 2]);
        set.toggle(1);
        assert_eq!(set.ascending(), vec![0, 1, 2]);
        set.toggle(9);
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn out_of_range_is_invalid() {
        assert!(matches!(
            PageSet::with_pages(2, [0, 2]),
            Err(ConvertError::InvalidSpec(_))
        ));
    }

    #[test]
    fn rotation_wraps() {
        let mut set = PageSet::all(1).with_rotation(Rotation::Deg270);
        set.rotate_clockwise();
        assert_eq!(set.rotation(), Rotation::Deg0);
    }

    #[test]
    fn parse_ranges_complex() {
        assert_eq!(
            parse_ranges("1-3, 5, 8-10", 10).unwrap(),
            vec![0, 1, 2, 4, 7, 8, 9]
        );
        assert_eq!(parse_ranges("3, 1-2, 2", 10).unwrap(), vec![0, 1, 2]);
        assert!(parse_ranges("0", 10).is_err());
        assert!(parse_ranges("4-2", 10).is_err());
        assert!(parse_ranges("x", 10).is_err());
    }

    #[test]
    fn parse_ranges_stops_at_last_page() {
        assert_eq!(parse_ranges("2-4000000000", 3).unwrap(), vec![1, 2]);
        assert_eq!(parse_ranges("1, 7-9", 5).unwrap(), vec![0]);
        assert!(parse_ranges("6-9", 5).unwrap().is_empty());

        let all = parse_ranges("1-18446744073709551615", 4).unwrap();
        let pages = PageSet::with_pages(4, all).unwrap();
        assert_eq!(pages.ascending(), vec![0, 1, 2, 3]);
    }
}
