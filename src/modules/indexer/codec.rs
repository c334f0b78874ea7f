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

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
    modules::{
        error::{code::ErrorCode, MailpostError, MailpostResult},
        indexer::fields::FieldId,
    },
    raise_error,
};

pub const MAILBOX_ID_LEN: usize = 16;
pub const ROW_PREFIX_LEN: usize = MAILBOX_ID_LEN + 1;
pub const QUALIFIER_LEN: usize = 8;

/// IMAP UID of a message, unique and ordered within its mailbox.
pub type MessageId = u64;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MailboxId([u8; MAILBOX_ID_LEN]);

impl MailboxId {
    pub const fn from_bytes(bytes: [u8; MAILBOX_ID_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; MAILBOX_ID_LEN] {
        &self.0
    }

    /// Same byte layout as a UUID built from its most and least significant halves.
    pub fn from_u128(value: u128) -> Self {
        Self(value.to_be_bytes())
    }
}

impl FromStr for MailboxId {
    type Err = MailpostError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let compact: String = s.trim().chars().filter(|c| *c != '-').collect();
        let decoded = hex::decode(&compact).map_err(|e| {
            raise_error!(
                format!("Invalid mailbox id '{}': {}", s, e),
                ErrorCode::InvalidParameter
            )
        })?;
        let bytes: [u8; MAILBOX_ID_LEN] = decoded.try_into().map_err(|_| {
            raise_error!(
                format!("Mailbox id '{}' must be exactly 16 bytes (32 hex digits)", s),
                ErrorCode::InvalidParameter
            )
        })?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for MailboxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let h = hex::encode(self.0);
        write!(
            f,
            "{}-{}-{}-{}-{}",
            &h[0..8],
            &h[8..12],
            &h[12..16],
            &h[16..20],
            &h[20..32]
        )
    }
}

/// A normalized token. Text terms are uppercased; sent dates use the
/// fixed-width encoding from [`Term::sent_date`].
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Term(Vec<u8>);

impl Term {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// Case-folds a text token.
    pub fn normalized(text: &str) -> Self {
        Self(text.to_uppercase().into_bytes())
    }

    /// Order-preserving 8-byte encoding of a millisecond timestamp: big-endian
    /// with the sign bit flipped, so byte order equals numeric order.
    pub fn sent_date(millis: i64) -> Self {
        Self(encode_millis(millis).to_vec())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_sent_date(&self) -> Option<i64> {
        let bytes: [u8; 8] = self.0.as_slice().try_into().ok()?;
        Some(decode_millis(bytes))
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

pub fn encode_millis(millis: i64) -> [u8; 8] {
    ((millis as u64) ^ (1 << 63)).to_be_bytes()
}

pub fn decode_millis(bytes: [u8; 8]) -> i64 {
    (u64::from_be_bytes(bytes) ^ (1 << 63)) as i64
}

pub fn mailbox_prefix(mailbox: &MailboxId) -> Vec<u8> {
    mailbox.as_bytes().to_vec()
}

pub fn field_prefix(mailbox: &MailboxId, field: FieldId) -> Vec<u8> {
    let mut key = Vec::with_capacity(ROW_PREFIX_LEN);
    key.extend_from_slice(mailbox.as_bytes());
    key.push(field.id());
    key
}

/// `mailbox(16) ‖ field(1) ‖ term`. The prefix is fixed-width, so the term
/// needs no escaping.
pub fn encode_row(mailbox: &MailboxId, field: FieldId, term: &Term) -> Vec<u8> {
    let mut key = Vec::with_capacity(ROW_PREFIX_LEN + term.as_bytes().len());
    key.extend_from_slice(mailbox.as_bytes());
    key.push(field.id());
    key.extend_from_slice(term.as_bytes());
    key
}

pub fn decode_row(row: &[u8]) -> MailpostResult<(MailboxId, FieldId, Term)> {
    if row.len() < ROW_PREFIX_LEN {
        return Err(raise_error!(
            format!(
                "Row key is {} bytes, shorter than the {}-byte prefix",
                row.len(),
                ROW_PREFIX_LEN
            ),
            ErrorCode::CorruptRowKey
        ));
    }
    let mut mailbox = [0u8; MAILBOX_ID_LEN];
    mailbox.copy_from_slice(&row[..MAILBOX_ID_LEN]);
    let field = FieldId::from_id(row[MAILBOX_ID_LEN])?;
    Ok((
        MailboxId(mailbox),
        field,
        Term::new(&row[ROW_PREFIX_LEN..]),
    ))
}

pub fn encode_qualifier(message_id: MessageId) -> [u8; QUALIFIER_LEN] {
    message_id.to_be_bytes()
}

pub fn decode_qualifier(qualifier: &[u8]) -> MailpostResult<MessageId> {
    let bytes: [u8; QUALIFIER_LEN] = qualifier.try_into().map_err(|_| {
        raise_error!(
            format!(
                "Qualifier must be {} bytes, got {}",
                QUALIFIER_LEN,
                qualifier.len()
            ),
            ErrorCode::CorruptRowKey
        )
    })?;
    Ok(MessageId::from_be_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::indexer::fields::ALL_FIELDS;

    fn mailbox(n: u128) -> MailboxId {
        MailboxId::from_u128(n)
    }

    #[test]
    fn row_round_trip_with_arbitrary_bytes() {
        let terms = [
            Term::empty(),
            Term::normalized("amsterdam"),
            Term::normalized("ÜBER-straße"),
            Term::new(vec![0u8, 0xff, 0x00, 0x7f, b'|']),
            Term::sent_date(-1),
            Term::new("日本語".as_bytes()),
        ];
        for field in ALL_FIELDS {
            for term in &terms {
                let m = mailbox(0x0123_4567_89ab_cdef_0011_2233_4455_6677);
                let row = encode_row(&m, field, term);
                let (m2, f2, t2) = decode_row(&row).unwrap();
                assert_eq!((m2, f2, &t2), (m, field, term));
            }
        }
    }

    #[test]
    fn short_or_unknown_rows_fail_to_decode() {
        assert_eq!(
            decode_row(&[0u8; 16]).unwrap_err().code(),
            ErrorCode::CorruptRowKey
        );
        let mut row = vec![0u8; 16];
        row.push(42);
        row.extend_from_slice(b"TERM");
        assert_eq!(decode_row(&row).unwrap_err().code(), ErrorCode::CorruptRowKey);
    }

    #[test]
    fn rows_of_smaller_mailbox_sort_first() {
        let low = mailbox(1);
        let high = mailbox(2);
        let high_smallest = encode_row(&high, FieldId::Body, &Term::empty());
        for field in ALL_FIELDS {
            let low_largest = encode_row(&low, field, &Term::new(vec![0xff; 64]));
            assert!(low_largest < high_smallest);
        }
        assert!(mailbox(u128::MAX - 1) < mailbox(u128::MAX));
    }

    #[test]
    fn rows_order_by_field_then_term() {
        let m = mailbox(7);
        let body_z = encode_row(&m, FieldId::Body, &Term::normalized("z"));
        let headers_a = encode_row(&m, FieldId::Headers, &Term::normalized("a"));
        assert!(body_z < headers_a);
        let a = encode_row(&m, FieldId::To, &Term::normalized("a"));
        let ab = encode_row(&m, FieldId::To, &Term::normalized("ab"));
        assert!(a < ab);
    }

    #[test]
    fn qualifier_order_matches_numeric_order() {
        let ids = [0u64, 1, 255, 256, 65_535, u32::MAX as u64, u64::MAX];
        for pair in ids.windows(2) {
            assert!(encode_qualifier(pair[0]) < encode_qualifier(pair[1]));
            assert_eq!(decode_qualifier(&encode_qualifier(pair[1])).unwrap(), pair[1]);
        }
        assert!(decode_qualifier(&[1, 2, 3]).is_err());
    }

    #[test]
    fn sent_date_terms_sort_numerically() {
        let times = [i64::MIN, -86_400_000, -1, 0, 1, 1_584_266_400_000, i64::MAX];
        for pair in times.windows(2) {
            assert!(Term::sent_date(pair[0]) < Term::sent_date(pair[1]));
        }
        for t in times {
            assert_eq!(Term::sent_date(t).as_sent_date(), Some(t));
        }
    }

    #[test]
    fn mailbox_id_parses_uuid_text() {
        let id: MailboxId = "01234567-89ab-cdef-0011-223344556677".parse().unwrap();
        assert_eq!(id, mailbox(0x0123_4567_89ab_cdef_0011_2233_4455_6677));
        assert_eq!(id.to_string(), "01234567-89ab-cdef-0011-223344556677");
        assert!("not-a-uuid".parse::<MailboxId>().is_err());
        assert!("0123".parse::<MailboxId>().is_err());
    }
}
