//! Filter keys and predicates
//!
//! Each recognized key parses its value into one `Predicate` variant.
//! Adding a key means adding a `FilterKey` and a `Predicate` variant; the
//! exhaustive matches below make a missed case a compile error.

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDateTime, SubsecRound};
use uuid::Uuid;

use crate::error::DocError;
use crate::models::Metadata;

/// Date-time format accepted by the `created` filter
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Recognized filter keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterKey {
    Owner,
    File,
    Name,
    Mime,
    Public,
    Created,
    Grant,
    Id,
}

impl FilterKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterKey::Owner => "owner",
            FilterKey::File => "file",
            FilterKey::Name => "name",
            FilterKey::Mime => "mime",
            FilterKey::Public => "public",
            FilterKey::Created => "created",
            FilterKey::Grant => "grant",
            FilterKey::Id => "id",
        }
    }
}

impl fmt::Display for FilterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterKey {
    type Err = DocError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "owner" => Ok(FilterKey::Owner),
            "file" => Ok(FilterKey::File),
            "name" => Ok(FilterKey::Name),
            "mime" => Ok(FilterKey::Mime),
            "public" => Ok(FilterKey::Public),
            "created" => Ok(FilterKey::Created),
            "grant" => Ok(FilterKey::Grant),
            "id" => Ok(FilterKey::Id),
            other => Err(DocError::UnknownFilter(other.to_string())),
        }
    }
}

/// How a `name` filter matches
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameMatch {
    /// `*suffix`
    Suffix(String),
    /// `prefix*`
    Prefix(String),
    /// plain value
    Contains(String),
}

impl NameMatch {
    fn parse(value: &str) -> Self {
        if let Some(suffix) = value.strip_prefix('*') {
            NameMatch::Suffix(suffix.to_string())
        } else if let Some(prefix) = value.strip_suffix('*') {
            NameMatch::Prefix(prefix.to_string())
        } else {
            NameMatch::Contains(value.to_string())
        }
    }

    fn matches(&self, name: &str) -> bool {
        match self {
            NameMatch::Suffix(s) => name.ends_with(s.as_str()),
            NameMatch::Prefix(p) => name.starts_with(p.as_str()),
            NameMatch::Contains(c) => name.contains(c.as_str()),
        }
    }
}

/// Comparison applied by a `created` filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateMatch {
    After(NaiveDateTime),
    Before(NaiveDateTime),
    Equal(NaiveDateTime),
    /// Exclusive on both ends
    Between(NaiveDateTime, NaiveDateTime),
}

impl DateMatch {
    fn parse(value: &str) -> Option<Self> {
        let parse = |s: &str| NaiveDateTime::parse_from_str(s, DATE_FORMAT).ok();

        if let Some(rest) = value.strip_prefix('>') {
            return parse(rest).map(DateMatch::After);
        }
        if let Some(rest) = value.strip_prefix('<') {
            return parse(rest).map(DateMatch::Before);
        }
        if let Some(rest) = value.strip_prefix('=') {
            return parse(rest).map(DateMatch::Equal);
        }
        let (start, end) = value.split_once('~')?;
        Some(DateMatch::Between(parse(start)?, parse(end)?))
    }

    fn matches(&self, created: NaiveDateTime) -> bool {
        match *self {
            DateMatch::After(d) => created > d,
            DateMatch::Before(d) => created < d,
            DateMatch::Equal(d) => created == d,
            DateMatch::Between(start, end) => created > start && created < end,
        }
    }
}

/// A single parsed filter condition
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Owner(Uuid),
    File(bool),
    Name(NameMatch),
    Mime(String),
    Public(bool),
    Created(DateMatch),
    Grant(String),
    Id(Uuid),
}

impl Predicate {
    /// Parse a string key/value pair
    pub fn parse(key: &str, value: &str) -> Result<Self, DocError> {
        let key: FilterKey = key.parse()?;
        Self::from_key(key, value)
    }

    /// Parse the value for an already-known key
    pub fn from_key(key: FilterKey, value: &str) -> Result<Self, DocError> {
        let invalid = || DocError::InvalidFilterValue {
            key: key.to_string(),
            value: value.to_string(),
        };

        let predicate = match key {
            FilterKey::Owner => Predicate::Owner(Uuid::parse_str(value).map_err(|_| invalid())?),
            FilterKey::File => Predicate::File(parse_bool(value).ok_or_else(invalid)?),
            FilterKey::Name => Predicate::Name(NameMatch::parse(value)),
            FilterKey::Mime => Predicate::Mime(value.to_string()),
            FilterKey::Public => Predicate::Public(parse_bool(value).ok_or_else(invalid)?),
            FilterKey::Created => Predicate::Created(DateMatch::parse(value).ok_or_else(invalid)?),
            FilterKey::Grant => Predicate::Grant(value.to_string()),
            FilterKey::Id => Predicate::Id(Uuid::parse_str(value).map_err(|_| invalid())?),
        };
        Ok(predicate)
    }

    /// Whether `meta` satisfies this predicate
    pub fn matches(&self, meta: &Metadata) -> bool {
        match self {
            Predicate::Owner(owner) => meta.owner_id == *owner,
            Predicate::File(is_file) => meta.is_file == *is_file,
            Predicate::Name(m) => m.matches(&meta.name),
            Predicate::Mime(mime) => meta.mime.contains(mime.as_str()),
            Predicate::Public(is_public) => meta.is_public == *is_public,
            // Stored timestamps carry sub-second precision the filter format cannot express
            Predicate::Created(m) => m.matches(meta.created_at.naive_utc().trunc_subsecs(0)),
            Predicate::Grant(login) => meta.grants.iter().any(|g| g == login),
            Predicate::Id(id) => meta.id == *id,
        }
    }
}

/// Boolean-ish strings: 1/t/T/TRUE/true/True and 0/f/F/FALSE/false/False
fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}
