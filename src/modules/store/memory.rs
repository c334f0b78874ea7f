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

use std::{
    collections::{BTreeMap, HashSet},
    ops::{Bound, ControlFlow},
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use crate::{
    modules::{
        error::{code::ErrorCode, MailpostResult},
        indexer::{codec::MessageId, executor::harvest_row},
        store::{PreparedFilter, RowStore, RowVisitor, ScannedRow},
    },
    raise_error,
};

type Cells = BTreeMap<Vec<u8>, Vec<u8>>;
type Rows = BTreeMap<Vec<u8>, Cells>;

/// In-process store. Each instance is an isolated table, which keeps tests
/// independent of each other.
#[derive(Debug, Default)]
pub struct MemoryRowStore {
    families: RwLock<BTreeMap<Vec<u8>, Rows>>,
}

impl MemoryRowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of physical rows in a family.
    pub fn row_count(&self, family: &[u8]) -> MailpostResult<usize> {
        Ok(self.read()?.get(family).map(|rows| rows.len()).unwrap_or(0))
    }

    fn read(&self) -> MailpostResult<RwLockReadGuard<'_, BTreeMap<Vec<u8>, Rows>>> {
        self.families
            .read()
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::StoreError))
    }

    fn write(&self) -> MailpostResult<RwLockWriteGuard<'_, BTreeMap<Vec<u8>, Rows>>> {
        self.families
            .write()
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::StoreError))
    }

    fn filter_row(row: &[u8], cells: &Cells, filter: &PreparedFilter) -> Option<ScannedRow> {
        let passing: Vec<(Vec<u8>, Vec<u8>)> = cells
            .iter()
            .filter(|(q, v)| filter.matches(row, q, v))
            .map(|(q, v)| (q.clone(), v.clone()))
            .collect();
        if passing.is_empty() {
            return None;
        }
        Some(ScannedRow {
            row: row.to_vec(),
            cells: passing,
        })
    }
}

impl RowStore for MemoryRowStore {
    fn put(
        &self,
        family: &[u8],
        row: &[u8],
        qualifier: &[u8],
        value: &[u8],
    ) -> MailpostResult<()> {
        let mut families = self.write()?;
        families
            .entry(family.to_vec())
            .or_default()
            .entry(row.to_vec())
            .or_default()
            .insert(qualifier.to_vec(), value.to_vec());
        Ok(())
    }

    fn get(&self, family: &[u8], row: &[u8], qualifier: &[u8]) -> MailpostResult<Option<Vec<u8>>> {
        let families = self.read()?;
        Ok(families
            .get(family)
            .and_then(|rows| rows.get(row))
            .and_then(|cells| cells.get(qualifier))
            .cloned())
    }

    fn delete(&self, family: &[u8], row: &[u8], qualifier: &[u8]) -> MailpostResult<bool> {
        let mut families = self.write()?;
        let Some(rows) = families.get_mut(family) else {
            return Ok(false);
        };
        let Some(cells) = rows.get_mut(row) else {
            return Ok(false);
        };
        let removed = cells.remove(qualifier).is_some();
        if cells.is_empty() {
            rows.remove(row);
        }
        Ok(removed)
    }

    fn scan(
        &self,
        family: &[u8],
        row_prefix: &[u8],
        filter: &PreparedFilter,
        visitor: &mut RowVisitor<'_>,
    ) -> MailpostResult<()> {
        // Matching rows are copied out first so the visitor never runs under the lock.
        let matched: Vec<ScannedRow> = {
            let families = self.read()?;
            let Some(rows) = families.get(family) else {
                return Ok(());
            };
            rows.range::<[u8], _>((Bound::Included(row_prefix), Bound::Unbounded))
                .take_while(|(row, _)| row.starts_with(row_prefix))
                .filter_map(|(row, cells)| Self::filter_row(row, cells, filter))
                .collect()
        };
        for row in matched {
            if visitor(row).is_break() {
                break;
            }
        }
        Ok(())
    }

    fn collect_message_ids(
        &self,
        family: &[u8],
        row_prefix: &[u8],
        filter: &PreparedFilter,
    ) -> MailpostResult<HashSet<MessageId>> {
        let families = self.read()?;
        let mut ids = HashSet::new();
        let Some(rows) = families.get(family) else {
            return Ok(ids);
        };
        for (row, cells) in rows
            .range::<[u8], _>((Bound::Included(row_prefix), Bound::Unbounded))
            .take_while(|(row, _)| row.starts_with(row_prefix))
        {
            if let Some(scanned) = Self::filter_row(row, cells, filter) {
                harvest_row(&scanned, &mut ids);
            }
        }
        Ok(ids)
    }
}
