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

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[repr(u32)]
pub enum ErrorCode {
    // Client-side errors (10000–10999)
    InvalidParameter = 10000,
    UnsupportedCriterion = 10040,

    // Index errors (60000–60999)
    IndexingFailed = 60000,
    CorruptRowKey = 60010,
    ScanAborted = 60020,
    StoreError = 60030,

    // Internal system errors (70000–70999)
    InternalError = 70000,
    IoError = 70020,
}

impl ErrorCode {
    /// Store-level failures that a caller may reasonably retry.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            ErrorCode::IndexingFailed | ErrorCode::ScanAborted | ErrorCode::StoreError
        )
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}({})", self, *self as u32)
    }
}
