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

use std::{collections::BTreeSet, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
    modules::error::{code::ErrorCode, MailpostError},
    raise_error,
};

/// Written when a message carries no flag at all.
pub const EMPTY_FLAGS_MARKER: &str = "\\";

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SystemFlag {
    Answered,
    Deleted,
    Draft,
    Flagged,
    Recent,
    Seen,
}

impl SystemFlag {
    pub const fn token(self) -> &'static str {
        match self {
            SystemFlag::Answered => "\\ANSWERED",
            SystemFlag::Deleted => "\\DELETED",
            SystemFlag::Draft => "\\DRAFT",
            SystemFlag::Flagged => "\\FLAGGED",
            SystemFlag::Recent => "\\RECENT",
            SystemFlag::Seen => "\\SEEN",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        let bare = name.strip_prefix('\\').unwrap_or(name);
        match bare.to_ascii_uppercase().as_str() {
            "ANSWERED" => Some(SystemFlag::Answered),
            "DELETED" => Some(SystemFlag::Deleted),
            "DRAFT" => Some(SystemFlag::Draft),
            "FLAGGED" => Some(SystemFlag::Flagged),
            "RECENT" => Some(SystemFlag::Recent),
            "SEEN" => Some(SystemFlag::Seen),
            _ => None,
        }
    }
}

/// A flag named in a search criterion or a flag update.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Flag {
    System(SystemFlag),
    Keyword(String),
}

impl Flag {
    /// Substring searched for in the encoded flags value.
    pub fn token(&self) -> String {
        match self {
            Flag::System(flag) => flag.token().to_string(),
            Flag::Keyword(keyword) => keyword.to_uppercase(),
        }
    }
}

impl FromStr for Flag {
    type Err = MailpostError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        if name.is_empty() || name == "\\" {
            return Err(raise_error!(
                "Flag name must not be empty".into(),
                ErrorCode::InvalidParameter
            ));
        }
        Ok(match SystemFlag::from_name(name) {
            Some(flag) => Flag::System(flag),
            None if name.contains('\\') => {
                return Err(raise_error!(
                    format!("Unknown system flag or invalid keyword '{}'", name),
                    ErrorCode::InvalidParameter
                ))
            }
            None => Flag::Keyword(name.to_string()),
        })
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.token())
    }
}

/// Flags currently set on a message.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageFlags {
    pub system: BTreeSet<SystemFlag>,
    pub keywords: BTreeSet<String>,
}

impl MessageFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, flag: Flag) -> Self {
        self.insert(flag);
        self
    }

    pub fn insert(&mut self, flag: Flag) {
        match flag {
            Flag::System(flag) => {
                self.system.insert(flag);
            }
            Flag::Keyword(keyword) => {
                self.keywords.insert(keyword.to_uppercase());
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.system.is_empty() && self.keywords.is_empty()
    }

    /// System tokens in declaration order, then keywords sorted. The order is
    /// fixed so the same flag set always encodes to the same value.
    pub fn encode(&self) -> String {
        if self.is_empty() {
            return EMPTY_FLAGS_MARKER.to_string();
        }
        let mut encoded = String::new();
        for flag in &self.system {
            encoded.push_str(flag.token());
        }
        for keyword in &self.keywords {
            encoded.push_str(keyword);
        }
        encoded
    }

    /// Parses a comma separated list such as `\Seen,\Answered,$Label1`.
    pub fn parse_list(list: &str) -> Result<Self, MailpostError> {
        let mut flags = MessageFlags::new();
        for name in list.split(',').map(str::trim).filter(|n| !n.is_empty()) {
            flags.insert(name.parse()?);
        }
        Ok(flags)
    }
}

impl FromIterator<Flag> for MessageFlags {
    fn from_iter<T: IntoIterator<Item = Flag>>(iter: T) -> Self {
        let mut flags = MessageFlags::new();
        for flag in iter {
            flags.insert(flag);
        }
        flags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_flags_encode_in_fixed_order() {
        let flags = MessageFlags::new()
            .with(Flag::System(SystemFlag::Seen))
            .with(Flag::System(SystemFlag::Answered));
        assert_eq!(flags.encode(), "\\ANSWERED\\SEEN");
    }

    #[test]
    fn empty_flags_render_marker() {
        assert_eq!(MessageFlags::new().encode(), EMPTY_FLAGS_MARKER);
    }

    #[test]
    fn no_flag_token_occurs_in_the_empty_marker() {
        for name in ["Empty", "EMPTY", "MPT", "E", "$Label1", "\\Seen", "Deleted"] {
            let flag: Flag = name.parse().unwrap();
            assert!(!EMPTY_FLAGS_MARKER.contains(&flag.token()), "{}", name);
        }
    }

    #[test]
    fn keywords_with_backslash_are_rejected() {
        assert!("\\Empty".parse::<Flag>().is_err());
        assert!("foo\\bar".parse::<Flag>().is_err());
        assert!("\\Seen".parse::<Flag>().is_ok());
    }

    #[test]
    fn keywords_follow_system_flags_uppercased() {
        let flags: MessageFlags = [
            Flag::Keyword("$label2".into()),
            Flag::System(SystemFlag::Flagged),
            Flag::Keyword("$Label1".into()),
        ]
        .into_iter()
        .collect();
        assert_eq!(flags.encode(), "\\FLAGGED$LABEL1$LABEL2");
    }

    #[test]
    fn flag_names_parse_with_or_without_backslash() {
        assert_eq!("SEEN".parse::<Flag>().unwrap(), Flag::System(SystemFlag::Seen));
        assert_eq!("\\Seen".parse::<Flag>().unwrap(), Flag::System(SystemFlag::Seen));
        assert_eq!(
            "Junk".parse::<Flag>().unwrap(),
            Flag::Keyword("Junk".into())
        );
        assert_eq!("junk".parse::<Flag>().unwrap().token(), "JUNK");
        assert!("".parse::<Flag>().is_err());
    }

    #[test]
    fn parse_list_collects_every_flag() {
        let flags = MessageFlags::parse_list("\\Seen, \\Draft ,work").unwrap();
        assert_eq!(flags.encode(), "\\DRAFT\\SEENWORK");
    }
}
