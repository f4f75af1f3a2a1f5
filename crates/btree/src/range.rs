//! Key ranges for scans and folds.

use std::ops::Bound;

/// A key interval with optional bounds, per-bound inclusivity, and an
/// optional cap on the number of records a scan may yield.
///
/// The default range is unbounded on both sides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Range {
    pub from_key: Option<Vec<u8>>,
    pub from_inclusive: bool,
    pub to_key: Option<Vec<u8>>,
    pub to_inclusive: bool,
    pub limit: Option<usize>,
}

impl Range {
    /// The full key space.
    #[must_use]
    pub fn all() -> Self {
        Self {
            from_key: None,
            from_inclusive: true,
            to_key: None,
            to_inclusive: false,
            limit: None,
        }
    }

    /// The half-open interval `[from, to)`; `None` leaves a side unbounded.
    #[must_use]
    pub fn new(from_key: Option<Vec<u8>>, to_key: Option<Vec<u8>>) -> Self {
        Self {
            from_key,
            from_inclusive: true,
            to_key,
            to_inclusive: false,
            limit: None,
        }
    }

    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn inclusive_to(mut self) -> Self {
        self.to_inclusive = true;
        self
    }

    #[must_use]
    pub fn exclusive_from(mut self) -> Self {
        self.from_inclusive = false;
        self
    }

    /// The same interval re-anchored at `key` (inclusive). This is how a
    /// paginated fold resumes after a `Limit(next_key)`.
    #[must_use]
    pub fn resume_from(&self, key: Vec<u8>) -> Self {
        Self {
            from_key: Some(key),
            from_inclusive: true,
            to_key: self.to_key.clone(),
            to_inclusive: self.to_inclusive,
            limit: self.limit,
        }
    }

    /// True when `key` falls below the lower bound.
    #[must_use]
    pub fn is_before_start(&self, key: &[u8]) -> bool {
        match &self.from_key {
            None => false,
            Some(from) => {
                if self.from_inclusive {
                    key < from.as_slice()
                } else {
                    key <= from.as_slice()
                }
            }
        }
    }

    /// True when `key` falls at or beyond the upper bound; a scan that sees
    /// such a key is finished.
    #[must_use]
    pub fn is_past_end(&self, key: &[u8]) -> bool {
        match &self.to_key {
            None => false,
            Some(to) => {
                if self.to_inclusive {
                    key > to.as_slice()
                } else {
                    key >= to.as_slice()
                }
            }
        }
    }

    /// True when `key` lies within the interval.
    #[must_use]
    pub fn contains(&self, key: &[u8]) -> bool {
        !self.is_before_start(key) && !self.is_past_end(key)
    }

    /// True when the interval can contain no key at all: crossed bounds, or
    /// equal bounds with an exclusive side.
    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        match (&self.from_key, &self.to_key) {
            (Some(from), Some(to)) => match from.cmp(to) {
                std::cmp::Ordering::Greater => true,
                std::cmp::Ordering::Equal => !(self.from_inclusive && self.to_inclusive),
                std::cmp::Ordering::Less => false,
            },
            _ => false,
        }
    }

    /// The lower bound in `std::ops::Bound` form (for `BTreeMap::range`).
    #[must_use]
    pub fn start_bound(&self) -> Bound<&[u8]> {
        match &self.from_key {
            None => Bound::Unbounded,
            Some(k) if self.from_inclusive => Bound::Included(k.as_slice()),
            Some(k) => Bound::Excluded(k.as_slice()),
        }
    }

    /// The upper bound in `std::ops::Bound` form.
    #[must_use]
    pub fn end_bound(&self) -> Bound<&[u8]> {
        match &self.to_key {
            None => Bound::Unbounded,
            Some(k) if self.to_inclusive => Bound::Included(k.as_slice()),
            Some(k) => Bound::Excluded(k.as_slice()),
        }
    }
}

impl Default for Range {
    fn default() -> Self {
        Self::all()
    }
}
