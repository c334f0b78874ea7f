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

use crate::modules::database::{cell_key, scan_prefix, split_cell_key, PostingCell, INDEX_MODELS};
use crate::modules::error::{code::ErrorCode, MailpostError, MailpostResult};
use crate::modules::store::{PreparedFilter, RowStore, RowVisitor, ScannedRow};
use crate::raise_error;
use native_db::{Builder, Database};
use std::{ops::ControlFlow, path::Path};
use tracing::{debug, info, warn};

const DEFAULT_CACHE_SIZE: usize = 134217728; //128MB
const MIN_CACHE_SIZE: usize = 67108864;

/// Posting table persisted in a native_db database file.
pub struct NativeRowStore {
    database: Database<'static>,
}

impl NativeRowStore {
    /// Opens the database at `path`, creating it when missing.
    pub fn open(path: impl AsRef<Path>, cache_size: Option<usize>) -> MailpostResult<Self> {
        let path = path.as_ref();
        info!("Opening index database at: {:?}", path);

        let mut database = Builder::new()
            .set_cache_size(cache_size.unwrap_or(DEFAULT_CACHE_SIZE).max(MIN_CACHE_SIZE))
            .create(&INDEX_MODELS, path)
            .map_err(Self::handle_database_error)?;

        let rw = database
            .rw_transaction()
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::StoreError))?;
        rw.commit()
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::StoreError))?;

        database
            .compact()
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::StoreError))?;
        Ok(Self { database })
    }

    fn handle_database_error(error: native_db::db_type::Error) -> MailpostError {
        raise_error!(
            format!("Failed to create database: {:?}", error),
            ErrorCode::StoreError
        )
    }

    fn flush(
        current: &mut Option<ScannedRow>,
        visitor: &mut RowVisitor<'_>,
    ) -> ControlFlow<()> {
        match current.take() {
            Some(row) if !row.cells.is_empty() => visitor(row),
            _ => ControlFlow::Continue(()),
        }
    }
}

impl RowStore for NativeRowStore {
    fn put(&self, family: &[u8], row: &[u8], qualifier: &[u8], value: &[u8]) -> MailpostResult<()> {
        let rw_transaction = self
            .database
            .rw_transaction()
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::StoreError))?;
        rw_transaction
            .upsert(PostingCell {
                key: cell_key(family, row, qualifier),
                value: value.to_vec(),
            })
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::StoreError))?;
        rw_transaction
            .commit()
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::StoreError))?;
        Ok(())
    }

    fn get(&self, family: &[u8], row: &[u8], qualifier: &[u8]) -> MailpostResult<Option<Vec<u8>>> {
        let r_transaction = self
            .database
            .r_transaction()
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::StoreError))?;
        let cell: Option<PostingCell> = r_transaction
            .get()
            .primary(cell_key(family, row, qualifier))
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::StoreError))?;
        Ok(cell.map(|c| c.value))
    }

    fn delete(&self, family: &[u8], row: &[u8], qualifier: &[u8]) -> MailpostResult<bool> {
        let rw_transaction = self
            .database
            .rw_transaction()
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::StoreError))?;
        let existing: Option<PostingCell> = rw_transaction
            .get()
            .primary(cell_key(family, row, qualifier))
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::StoreError))?;
        let Some(cell) = existing else {
            return Ok(false);
        };
        rw_transaction
            .remove(cell)
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::StoreError))?;
        rw_transaction
            .commit()
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::StoreError))?;
        Ok(true)
    }

    fn scan(
        &self,
        family: &[u8],
        row_prefix: &[u8],
        filter: &PreparedFilter,
        visitor: &mut RowVisitor<'_>,
    ) -> MailpostResult<()> {
        let r_transaction = self
            .database
            .r_transaction()
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::StoreError))?;
        let scan = r_transaction
            .scan()
            .primary::<PostingCell>()
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::StoreError))?;
        let cells = scan
            .start_with(scan_prefix(family, row_prefix))
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::StoreError))?;

        let mut current: Option<ScannedRow> = None;
        for cell in cells {
            let cell = cell.map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::StoreError))?;
            let Some((_, row, qualifier)) = split_cell_key(&cell.key) else {
                warn!(key = %hex::encode(&cell.key), "skipping undecodable cell key");
                continue;
            };
            if current.as_ref().is_some_and(|c| c.row != row)
                && Self::flush(&mut current, visitor).is_break()
            {
                return Ok(());
            }
            let entry = current.get_or_insert_with(|| ScannedRow {
                row: row.clone(),
                cells: Vec::new(),
            });
            if filter.matches(&row, &qualifier, &cell.value) {
                entry.cells.push((qualifier, cell.value));
            }
        }
        if Self::flush(&mut current, visitor).is_break() {
            debug!("visitor stopped the scan on its last row");
        }
        Ok(())
    }
}
