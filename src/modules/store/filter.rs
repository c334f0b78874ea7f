//
// Copyright (c) 2025 rustmailer.com (https://rustmailer.com)
//
// This file is part of the Bichon Email Archiving Project
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

use std::ops::Bound;

use regex::bytes::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::{
    modules::error::{code::ErrorCode, MailpostResult},
    raise_error,
};

/// Predicate tree evaluated against every cell a scan visits.
///
/// Row predicates look at the row key, value and qualifier predicates look at
/// the cell. A row is emitted with the cells that pass; rows left with no cell
/// are skipped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RowFilter {
    All,
    RowEquals(Vec<u8>),
    RowPrefix(Vec<u8>),
    RowRange {
        lower: Bound<Vec<u8>>,
        upper: Bound<Vec<u8>>,
    },
    /// Byte regex over the whole row key, Unicode disabled.
    RowRegex(String),
    ValueContains(Vec<u8>),
    ValueExcludes(Vec<u8>),
    QualifierEquals(Vec<u8>),
    And(Vec<RowFilter>),
    Or(Vec<RowFilter>),
}

impl RowFilter {
    /// `^prefix.*?needle` with every byte escaped, so arbitrary key bytes
    /// never leak regex syntax.
    pub fn row_contains(prefix: &[u8], needle: &[u8]) -> Self {
        RowFilter::RowRegex(format!(
            "^{}.*?{}",
            escape_bytes(prefix),
            escape_bytes(needle)
        ))
    }

    /// Folds nested `Or`s and collapses the trivial cases.
    pub fn any_of(filters: Vec<RowFilter>) -> Self {
        let mut flat = Vec::with_capacity(filters.len());
        for filter in filters {
            match filter {
                RowFilter::All => return RowFilter::All,
                RowFilter::Or(children) => flat.extend(children),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => RowFilter::All,
            1 => flat.remove(0),
            _ => RowFilter::Or(flat),
        }
    }

    pub fn prepare(&self) -> MailpostResult<PreparedFilter> {
        Ok(match self {
            RowFilter::All => PreparedFilter::All,
            RowFilter::RowEquals(row) => PreparedFilter::RowEquals(row.clone()),
            RowFilter::RowPrefix(prefix) => PreparedFilter::RowPrefix(prefix.clone()),
            RowFilter::RowRange { lower, upper } => PreparedFilter::RowRange {
                lower: lower.clone(),
                upper: upper.clone(),
            },
            RowFilter::RowRegex(pattern) => {
                let regex = RegexBuilder::new(pattern)
                    .unicode(false)
                    .dot_matches_new_line(true)
                    .build()
                    .map_err(|e| {
                        raise_error!(
                            format!("Invalid row regex '{}': {}", pattern, e),
                            ErrorCode::InvalidParameter
                        )
                    })?;
                PreparedFilter::RowRegex(regex)
            }
            RowFilter::ValueContains(needle) => PreparedFilter::ValueContains(needle.clone()),
            RowFilter::ValueExcludes(needle) => PreparedFilter::ValueExcludes(needle.clone()),
            RowFilter::QualifierEquals(q) => PreparedFilter::QualifierEquals(q.clone()),
            RowFilter::And(children) => PreparedFilter::And(
                children
                    .iter()
                    .map(RowFilter::prepare)
                    .collect::<MailpostResult<_>>()?,
            ),
            RowFilter::Or(children) => PreparedFilter::Or(
                children
                    .iter()
                    .map(RowFilter::prepare)
                    .collect::<MailpostResult<_>>()?,
            ),
        })
    }
}

fn escape_bytes(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 4);
    for b in bytes {
        out.push_str(&format!("\\x{:02X}", b));
    }
    out
}

/// [`RowFilter`] with its regexes compiled, ready to run inside a scan.
#[derive(Clone, Debug)]
pub enum PreparedFilter {
    All,
    RowEquals(Vec<u8>),
    RowPrefix(Vec<u8>),
    RowRange {
        lower: Bound<Vec<u8>>,
        upper: Bound<Vec<u8>>,
    },
    RowRegex(Regex),
    ValueContains(Vec<u8>),
    ValueExcludes(Vec<u8>),
    QualifierEquals(Vec<u8>),
    And(Vec<PreparedFilter>),
    Or(Vec<PreparedFilter>),
}

impl PreparedFilter {
    pub fn matches(&self, row: &[u8], qualifier: &[u8], value: &[u8]) -> bool {
        match self {
            PreparedFilter::All => true,
            PreparedFilter::RowEquals(expected) => row == expected.as_slice(),
            PreparedFilter::RowPrefix(prefix) => row.starts_with(prefix),
            PreparedFilter::RowRange { lower, upper } => {
                let above = match lower {
                    Bound::Included(l) => row >= l.as_slice(),
                    Bound::Excluded(l) => row > l.as_slice(),
                    Bound::Unbounded => true,
                };
                let below = match upper {
                    Bound::Included(u) => row <= u.as_slice(),
                    Bound::Excluded(u) => row < u.as_slice(),
                    Bound::Unbounded => true,
                };
                above && below
            }
            PreparedFilter::RowRegex(regex) => regex.is_match(row),
            PreparedFilter::ValueContains(needle) => contains(value, needle),
            PreparedFilter::ValueExcludes(needle) => !contains(value, needle),
            PreparedFilter::QualifierEquals(expected) => qualifier == expected.as_slice(),
            PreparedFilter::And(children) => {
                children.iter().all(|c| c.matches(row, qualifier, value))
            }
            PreparedFilter::Or(children) => {
                children.iter().any(|c| c.matches(row, qualifier, value))
            }
        }
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    needle.is_empty() || haystack.windows(needle.len()).any(|w| w == needle)
}
