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

use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use crate::{
    modules::{
        error::{code::ErrorCode, MailpostResult},
        indexer::{
            codec::MailboxId,
            date::{DateOp, DateResolution},
            executor::ScanOutcome,
            flags::Flag,
            manager::IndexManager,
        },
    },
    raise_error,
};

pub const MAX_CRITERIA: usize = 256;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TextScope {
    /// Message body only.
    Body,
    /// Body and every header.
    Full,
}

/// One search condition. A query is a list of these, combined with OR.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchCriterion {
    Text {
        value: String,
        scope: TextScope,
    },
    HeaderContains {
        name: String,
        value: String,
    },
    HeaderExists {
        name: String,
    },
    HeaderAddress {
        name: String,
        value: String,
    },
    Flag {
        flag: Flag,
        is_set: bool,
    },
    InternalDate {
        op: DateOp,
        timestamp: i64,
        resolution: DateResolution,
    },
    All,
    // Not expressible over the posting rows; the compiler rejects them.
    Size {
        larger_than: Option<u64>,
        smaller_than: Option<u64>,
    },
    Uid(Vec<RangeInclusive<u64>>),
    ModSeq(u64),
    Not(Box<SearchCriterion>),
}

impl SearchCriterion {
    pub fn text(value: impl Into<String>) -> Self {
        SearchCriterion::Text {
            value: value.into(),
            scope: TextScope::Full,
        }
    }

    pub fn body(value: impl Into<String>) -> Self {
        SearchCriterion::Text {
            value: value.into(),
            scope: TextScope::Body,
        }
    }

    pub fn header(name: impl Into<String>, value: impl Into<String>) -> Self {
        SearchCriterion::HeaderContains {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn flag(flag: Flag, is_set: bool) -> Self {
        SearchCriterion::Flag { flag, is_set }
    }

    pub fn internal_date(op: DateOp, timestamp: i64, resolution: DateResolution) -> Self {
        SearchCriterion::InternalDate {
            op,
            timestamp,
            resolution,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SearchCriterion::Text { .. } => "text",
            SearchCriterion::HeaderContains { .. } => "header-contains",
            SearchCriterion::HeaderExists { .. } => "header-exists",
            SearchCriterion::HeaderAddress { .. } => "header-address",
            SearchCriterion::Flag { .. } => "flag",
            SearchCriterion::InternalDate { .. } => "internal-date",
            SearchCriterion::All => "all",
            SearchCriterion::Size { .. } => "size",
            SearchCriterion::Uid(_) => "uid",
            SearchCriterion::ModSeq(_) => "modseq",
            SearchCriterion::Not(_) => "not",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub mailbox: MailboxId,
    pub criteria: Vec<SearchCriterion>,
}

impl SearchRequest {
    pub fn new(mailbox: MailboxId, criteria: Vec<SearchCriterion>) -> Self {
        Self { mailbox, criteria }
    }

    pub fn validate(&self) -> MailpostResult<()> {
        if self.criteria.len() > MAX_CRITERIA {
            return Err(raise_error!(
                format!(
                    "A search may hold at most {} criteria, got {}.",
                    MAX_CRITERIA,
                    self.criteria.len()
                ),
                ErrorCode::InvalidParameter
            ));
        }
        for criterion in &self.criteria {
            match criterion {
                SearchCriterion::HeaderContains { name, .. }
                | SearchCriterion::HeaderExists { name }
                | SearchCriterion::HeaderAddress { name, .. }
                    if name.trim().is_empty() =>
                {
                    return Err(raise_error!(
                        "Header criteria need a header name.".into(),
                        ErrorCode::InvalidParameter
                    ));
                }
                _ => {}
            }
        }
        Ok(())
    }
}

pub fn search_messages_impl(
    manager: &IndexManager,
    request: SearchRequest,
) -> MailpostResult<ScanOutcome> {
    request.validate()?;
    manager.search(&request.mailbox, &request.criteria)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::{indexer::manager::IndexOptions, store::memory::MemoryRowStore};
    use std::sync::Arc;

    #[test]
    fn oversized_requests_are_rejected() {
        let request = SearchRequest::new(
            MailboxId::from_u128(1),
            vec![SearchCriterion::All; MAX_CRITERIA + 1],
        );
        assert_eq!(
            request.validate().unwrap_err().code(),
            ErrorCode::InvalidParameter
        );
    }

    #[test]
    fn blank_header_names_are_rejected() {
        let request = SearchRequest::new(
            MailboxId::from_u128(1),
            vec![SearchCriterion::HeaderExists { name: " ".into() }],
        );
        assert!(request.validate().is_err());
    }

    #[test]
    fn search_impl_runs_against_the_manager() {
        let manager = IndexManager::new(Arc::new(MemoryRowStore::new()), IndexOptions::default());
        let outcome = search_messages_impl(
            &manager,
            SearchRequest::new(MailboxId::from_u128(1), vec![SearchCriterion::All]),
        )
        .unwrap();
        assert!(outcome.message_ids.is_empty());
        assert!(outcome.complete);
    }
}
