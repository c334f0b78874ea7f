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

use native_db::*;
use native_model::{native_model, Model};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

pub mod manager;

pub static INDEX_MODELS: LazyLock<Models> = LazyLock::new(|| {
    let mut adapter = ModelsAdapter::new();
    adapter.register_index_models();
    adapter.models
});

pub struct ModelsAdapter {
    pub models: Models,
}

impl ModelsAdapter {
    pub fn new() -> Self {
        ModelsAdapter {
            models: Models::new(),
        }
    }

    pub fn register_model<T: ToInput>(&mut self) {
        self.models.define::<T>().expect("failed to define model ");
    }

    pub fn register_index_models(&mut self) {
        self.register_model::<PostingCell>();
    }
}

/// One cell of the posting table. `key` is [`cell_key`] of (family, row,
/// qualifier); every cell of a row sorts together and rows keep raw byte
/// order.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[native_model(id = 1, version = 1)]
#[native_db]
pub struct PostingCell {
    #[primary_key]
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

const ESCAPE: u8 = 0x00;
const ESCAPED_ZERO: u8 = 0xFF;
const TERMINATOR: u8 = 0x01;

/// Order-preserving escape: 0x00 becomes 0x00 0xFF. Does not append the
/// terminator, so the result of a prefix is a prefix of the result.
pub fn escape_into(out: &mut Vec<u8>, bytes: &[u8]) {
    for &b in bytes {
        if b == ESCAPE {
            out.extend_from_slice(&[ESCAPE, ESCAPED_ZERO]);
        } else {
            out.push(b);
        }
    }
}

fn escape_component(out: &mut Vec<u8>, bytes: &[u8]) {
    escape_into(out, bytes);
    out.extend_from_slice(&[ESCAPE, TERMINATOR]);
}

pub fn cell_key(family: &[u8], row: &[u8], qualifier: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(family.len() + row.len() + qualifier.len() + 4);
    escape_component(&mut key, family);
    escape_component(&mut key, row);
    key.extend_from_slice(qualifier);
    key
}

/// Key prefix shared by every cell whose row starts with `row_prefix`.
pub fn scan_prefix(family: &[u8], row_prefix: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(family.len() + row_prefix.len() + 2);
    escape_component(&mut key, family);
    escape_into(&mut key, row_prefix);
    key
}

/// Reads one terminated component, returning it and the remaining bytes.
fn unescape_component(bytes: &[u8]) -> Option<(Vec<u8>, &[u8])> {
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != ESCAPE {
            out.push(bytes[i]);
            i += 1;
            continue;
        }
        match bytes.get(i + 1) {
            Some(&ESCAPED_ZERO) => {
                out.push(ESCAPE);
                i += 2;
            }
            Some(&TERMINATOR) => return Some((out, &bytes[i + 2..])),
            _ => return None,
        }
    }
    None
}

/// Splits a cell key back into (family, row, qualifier).
pub fn split_cell_key(key: &[u8]) -> Option<(Vec<u8>, Vec<u8>, Vec<u8>)> {
    let (family, rest) = unescape_component(key)?;
    let (row, qualifier) = unescape_component(rest)?;
    Some((family, row, qualifier.to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_keys_split_back() {
        let key = cell_key(b"F", &[0, 1, 0, 0xFF, 7], &[0, 0, 0, 1]);
        assert_eq!(
            split_cell_key(&key),
            Some((b"F".to_vec(), vec![0, 1, 0, 0xFF, 7], vec![0, 0, 0, 1]))
        );
    }

    #[test]
    fn cell_keys_follow_row_order() {
        let rows: [&[u8]; 5] = [b"a", &[b'a', 0], &[b'a', 0, 0], &[b'a', 1], b"ab"];
        let keys: Vec<Vec<u8>> = rows
            .iter()
            .map(|row| cell_key(b"F", row, &[0xFF; 8]))
            .collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }

    #[test]
    fn scan_prefix_covers_only_matching_rows() {
        let prefix = scan_prefix(b"F", b"ab");
        assert!(cell_key(b"F", b"ab", b"q").starts_with(&prefix));
        assert!(cell_key(b"F", b"abc", b"q").starts_with(&prefix));
        assert!(!cell_key(b"F", b"a", b"bq").starts_with(&prefix));
        assert!(!cell_key(b"G", b"ab", b"q").starts_with(&prefix));
    }

    #[test]
    fn truncated_keys_are_rejected() {
        assert_eq!(split_cell_key(&[b'F', 0]), None);
        assert_eq!(split_cell_key(b"F"), None);
    }
}
