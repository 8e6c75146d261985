//! Document filtering
//!
//! A `DocumentFilter` is a conjunction of predicates plus index-based
//! pagination. Offset counts input positions, not matches: a matching
//! record that sits before `offset` is dropped, never promoted.

pub mod predicate;

pub use predicate::{DateMatch, FilterKey, NameMatch, Predicate, DATE_FORMAT};

use crate::error::DocError;
use crate::models::Metadata;

/// Conjunction of predicates with limit/offset
#[derive(Debug, Clone, Default)]
pub struct DocumentFilter {
    limit: usize,
    offset: usize,
    predicates: Vec<Predicate>,
}

impl DocumentFilter {
    pub fn new(limit: usize, offset: usize) -> Self {
        Self {
            limit,
            offset,
            predicates: Vec::new(),
        }
    }

    /// Parse and register a filter.
    ///
    /// Fails with `UnknownFilter` or `InvalidFilterValue`; the filter is
    /// left unchanged on error.
    pub fn add_filter(&mut self, key: &str, value: &str) -> Result<(), DocError> {
        let predicate = Predicate::parse(key, value)?;
        self.predicates.push(predicate);
        Ok(())
    }

    pub fn with_predicate(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    fn accepts(&self, meta: &Metadata) -> bool {
        self.predicates.iter().all(|p| p.matches(meta))
    }

    /// Select up to `limit` records at index `>= offset` that satisfy every predicate
    pub fn filter_data(&self, data: &[Metadata]) -> Vec<Metadata> {
        if self.limit == 0 {
            return Vec::new();
        }

        data.iter()
            .enumerate()
            .skip(self.offset)
            .filter(|(_, meta)| self.accepts(meta))
            .map(|(_, meta)| meta.clone())
            .take(self.limit)
            .collect()
    }
}
