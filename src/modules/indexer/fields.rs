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

use std::fmt;

use crate::{
    modules::error::{code::ErrorCode, MailpostResult},
    raise_error,
};

/// Semantic field a posting belongs to.
///
/// The discriminant is the byte written into every row key, so these values
/// are part of the on-disk format and must never be renumbered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum FieldId {
    Body = 1,
    Headers = 2,
    PrefixHeader = 3,
    To = 4,
    Cc = 5,
    From = 6,
    Bcc = 7,
    BaseSubject = 8,
    SentDate = 9,
    Flags = 10,
    FirstFromName = 11,
    FirstToName = 12,
    FirstCcName = 13,
    FirstFromDisplay = 14,
    FirstToDisplay = 15,
}

pub const ALL_FIELDS: [FieldId; 15] = [
    FieldId::Body,
    FieldId::Headers,
    FieldId::PrefixHeader,
    FieldId::To,
    FieldId::Cc,
    FieldId::From,
    FieldId::Bcc,
    FieldId::BaseSubject,
    FieldId::SentDate,
    FieldId::Flags,
    FieldId::FirstFromName,
    FieldId::FirstToName,
    FieldId::FirstCcName,
    FieldId::FirstFromDisplay,
    FieldId::FirstToDisplay,
];

impl FieldId {
    pub const fn id(self) -> u8 {
        self as u8
    }

    pub fn from_id(id: u8) -> MailpostResult<Self> {
        ALL_FIELDS
            .iter()
            .copied()
            .find(|field| field.id() == id)
            .ok_or_else(|| {
                raise_error!(
                    format!("Unknown field id {} in row key", id),
                    ErrorCode::CorruptRowKey
                )
            })
    }

    pub const fn name(self) -> &'static str {
        match self {
            FieldId::Body => "BODY",
            FieldId::Headers => "HEADERS",
            FieldId::PrefixHeader => "PREFIX_HEADER",
            FieldId::To => "TO",
            FieldId::Cc => "CC",
            FieldId::From => "FROM",
            FieldId::Bcc => "BCC",
            FieldId::BaseSubject => "BASE_SUBJECT",
            FieldId::SentDate => "SENT_DATE",
            FieldId::Flags => "FLAGS",
            FieldId::FirstFromName => "FIRST_FROM_NAME",
            FieldId::FirstToName => "FIRST_TO_NAME",
            FieldId::FirstCcName => "FIRST_CC_NAME",
            FieldId::FirstFromDisplay => "FIRST_FROM_DISPLAY",
            FieldId::FirstToDisplay => "FIRST_TO_DISPLAY",
        }
    }

    /// Field holding postings for a named header. Unknown headers fall back
    /// to the generic header-value field.
    pub fn for_header(name: &str) -> Self {
        let name = name.trim();
        if name.eq_ignore_ascii_case("to") {
            FieldId::To
        } else if name.eq_ignore_ascii_case("from") {
            FieldId::From
        } else if name.eq_ignore_ascii_case("cc") {
            FieldId::Cc
        } else if name.eq_ignore_ascii_case("bcc") {
            FieldId::Bcc
        } else if name.eq_ignore_ascii_case("subject") {
            FieldId::BaseSubject
        } else {
            FieldId::PrefixHeader
        }
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn byte_table_is_a_bijection() {
        let ids: HashSet<u8> = ALL_FIELDS.iter().map(|f| f.id()).collect();
        assert_eq!(ids.len(), ALL_FIELDS.len());
        for field in ALL_FIELDS {
            assert_eq!(FieldId::from_id(field.id()).unwrap(), field);
        }
    }

    #[test]
    fn unknown_ids_are_rejected() {
        for id in [0u8, 16, 0x7f, 0xff] {
            let err = FieldId::from_id(id).unwrap_err();
            assert_eq!(err.code(), ErrorCode::CorruptRowKey);
        }
    }

    #[test]
    fn header_names_map_case_insensitively() {
        assert_eq!(FieldId::for_header("To"), FieldId::To);
        assert_eq!(FieldId::for_header("FROM"), FieldId::From);
        assert_eq!(FieldId::for_header("cc"), FieldId::Cc);
        assert_eq!(FieldId::for_header("Bcc"), FieldId::Bcc);
        assert_eq!(FieldId::for_header("subject"), FieldId::BaseSubject);
        assert_eq!(FieldId::for_header("X-Mailer"), FieldId::PrefixHeader);
    }
}
