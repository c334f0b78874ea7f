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

use std::{collections::HashSet, ops::ControlFlow};

use crate::modules::{
    error::MailpostResult,
    indexer::{codec::MessageId, executor::harvest_row},
};

pub mod filter;
pub mod memory;

pub use filter::{PreparedFilter, RowFilter};

/// The only column family; every posting cell lives in it.
pub const COLUMN_FAMILY: &[u8] = b"F";

/// Presence marker stored in non-flag posting cells.
pub const CELL_SENTINEL: &[u8] = &[0x01];

/// One row as seen by a scan: the key and the cells that passed the filter,
/// ordered by qualifier.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScannedRow {
    pub row: Vec<u8>,
    pub cells: Vec<(Vec<u8>, Vec<u8>)>,
}

pub type RowVisitor<'a> = dyn FnMut(ScannedRow) -> ControlFlow<()> + 'a;

/// Sorted key-value store with single-row atomicity.
///
/// Implementations evaluate the filter next to the data and stream matching
/// rows in row-key order. Nothing here spans rows transactionally.
pub trait RowStore: Send + Sync {
    fn put(&self, family: &[u8], row: &[u8], qualifier: &[u8], value: &[u8])
        -> MailpostResult<()>;

    fn get(&self, family: &[u8], row: &[u8], qualifier: &[u8]) -> MailpostResult<Option<Vec<u8>>>;

    /// Returns whether a cell was removed.
    fn delete(&self, family: &[u8], row: &[u8], qualifier: &[u8]) -> MailpostResult<bool>;

    /// Visits every row under `row_prefix` that has at least one cell passing
    /// `filter`. The visitor stops the scan by returning `Break`.
    fn scan(
        &self,
        family: &[u8],
        row_prefix: &[u8],
        filter: &PreparedFilter,
        visitor: &mut RowVisitor<'_>,
    ) -> MailpostResult<()>;

    /// Colocated evaluation: decodes qualifiers into message ids without
    /// handing rows back to the caller.
    fn collect_message_ids(
        &self,
        family: &[u8],
        row_prefix: &[u8],
        filter: &PreparedFilter,
    ) -> MailpostResult<HashSet<MessageId>> {
        let mut ids = HashSet::new();
        self.scan(family, row_prefix, filter, &mut |row| {
            harvest_row(&row, &mut ids);
            ControlFlow::Continue(())
        })?;
        Ok(ids)
    }
}
