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

use clap::{builder::ValueParser, Args, Parser, Subcommand};
use std::{ops::RangeInclusive, path::PathBuf, time::Duration};

use crate::modules::{
    error::{code::ErrorCode, MailpostResult},
    indexer::{
        codec::{MailboxId, MessageId},
        date::{parse_timestamp, DateOp, DateResolution},
        executor::{ScanFailurePolicy, ScanMode},
        flags::{Flag, MessageFlags},
        manager::IndexOptions,
    },
    message::search::{SearchCriterion, TextScope},
};
use crate::raise_error;

#[derive(Debug, Parser)]
#[clap(
    name = "mailpost",
    about = "Posting-list search index for mailboxes on a sorted key-value store",
    version = env!("CARGO_PKG_VERSION")
)]
pub struct Settings {
    /// mailpost log level (default: "info")
    #[clap(
        long,
        default_value = "info",
        env,
        help = "Set the log level for mailpost"
    )]
    pub mailpost_log_level: String,

    /// Enable ANSI logs (default: true)
    #[clap(long, default_value = "true", env, help = "Enable ANSI formatted logs")]
    pub mailpost_ansi_logs: bool,

    /// Enable JSON logs (default: false)
    #[clap(
        long,
        default_value = "false",
        env,
        help = "Enable JSON formatted logs"
    )]
    pub mailpost_json_logs: bool,

    /// If false, logs will be printed to stdout
    #[clap(
        long,
        default_value = "false",
        env,
        help = "Enable log file output (otherwise logs go to stdout)"
    )]
    pub mailpost_log_to_file: bool,

    #[clap(
        long,
        default_value = "5",
        env,
        help = "Set the maximum number of server log files"
    )]
    pub mailpost_max_server_log_files: usize,

    #[clap(
        long,
        env,
        help = "Directory holding the index database and logs",
        value_parser = ValueParser::new(|s: &str| {
            let path = PathBuf::from(s);
            if !path.is_absolute() {
                return Err("Path must be an absolute directory path".to_string());
            }
            if !path.exists() {
                return Err(format!("Path {:?} does not exist", path));
            }
            if !path.is_dir() {
                return Err(format!("Path {:?} is not a directory", path));
            }
            Ok(s.to_string())
        })
    )]
    pub mailpost_root_dir: String,

    #[clap(
        long,
        env,
        default_value = "134217728",
        help = "Set the cache size for the index database in bytes (minimum 64MB)"
    )]
    pub mailpost_cache_size: Option<usize>,

    #[clap(
        long,
        env,
        value_enum,
        default_value = "client",
        help = "Decode scan results in the client or next to the data"
    )]
    pub mailpost_scan_mode: ScanMode,

    #[clap(
        long,
        env,
        default_value = "0",
        help = "Abort scans running longer than this many milliseconds (0 disables)"
    )]
    pub mailpost_scan_timeout_ms: u64,

    #[clap(
        long,
        env,
        value_enum,
        default_value = "partial",
        help = "Return partial results or fail when a scan is interrupted"
    )]
    pub mailpost_scan_failure: ScanFailurePolicy,

    #[clap(subcommand)]
    pub command: Command,
}

impl Settings {
    pub fn index_options(&self) -> IndexOptions {
        IndexOptions {
            scan_mode: self.mailpost_scan_mode,
            failure_policy: self.mailpost_scan_failure,
            scan_timeout: (self.mailpost_scan_timeout_ms > 0)
                .then(|| Duration::from_millis(self.mailpost_scan_timeout_ms)),
        }
    }

    pub fn database_path(&self) -> PathBuf {
        PathBuf::from(&self.mailpost_root_dir).join("index.db")
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Index one RFC 822 message file
    Index {
        #[clap(long)]
        mailbox: MailboxId,
        #[clap(long)]
        id: MessageId,
        #[clap(long, help = "Comma separated flags, e.g. \\Seen,$Work")]
        flags: Option<String>,
        #[clap(long, value_parser = parse_date, help = "Internal date (defaults to now)")]
        internal_date: Option<i64>,
        file: PathBuf,
    },
    /// Search a mailbox; criteria are combined with OR
    Search(SearchArgs),
    /// Remove messages from the index
    Delete {
        #[clap(long)]
        mailbox: MailboxId,
        #[clap(value_parser = parse_id_set, help = "Message ids, e.g. 1:4,7")]
        ids: IdSet,
    },
    /// Replace the flags of messages
    Flags {
        #[clap(long)]
        mailbox: MailboxId,
        #[clap(value_parser = parse_id_set)]
        ids: IdSet,
        #[clap(help = "Comma separated flags; empty clears them")]
        flags: String,
    },
    /// List every indexed message id
    List {
        #[clap(long)]
        mailbox: MailboxId,
        #[clap(long, help = "Print the outcome as JSON")]
        json: bool,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IdSet(pub Vec<RangeInclusive<MessageId>>);

#[derive(Debug, Args)]
pub struct SearchArgs {
    #[clap(long)]
    pub mailbox: MailboxId,
    #[clap(long, help = "Text in the body or any header")]
    pub text: Vec<String>,
    #[clap(long, help = "Text in the body")]
    pub body: Vec<String>,
    #[clap(long, value_parser = parse_header, help = "Header contains value, as Name:value")]
    pub header: Vec<(String, String)>,
    #[clap(long, help = "Header is present")]
    pub has_header: Vec<String>,
    #[clap(long)]
    pub from: Vec<String>,
    #[clap(long)]
    pub to: Vec<String>,
    #[clap(long)]
    pub cc: Vec<String>,
    #[clap(long)]
    pub bcc: Vec<String>,
    #[clap(long, help = "Flag is set")]
    pub flagged: Vec<String>,
    #[clap(long, help = "Flag is not set")]
    pub unflagged: Vec<String>,
    #[clap(long, value_parser = parse_date)]
    pub on: Option<i64>,
    #[clap(long, value_parser = parse_date)]
    pub before: Option<i64>,
    #[clap(long, value_parser = parse_date)]
    pub after: Option<i64>,
    #[clap(long, value_enum, default_value = "day")]
    pub resolution: DateResolution,
    #[clap(long, help = "Match every message")]
    pub all: bool,
    #[clap(long, help = "Print the outcome as JSON")]
    pub json: bool,
}

impl SearchArgs {
    pub fn criteria(&self) -> MailpostResult<Vec<SearchCriterion>> {
        let mut criteria = Vec::new();
        for value in &self.text {
            criteria.push(SearchCriterion::Text {
                value: value.clone(),
                scope: TextScope::Full,
            });
        }
        for value in &self.body {
            criteria.push(SearchCriterion::body(value.clone()));
        }
        for (name, value) in &self.header {
            criteria.push(SearchCriterion::header(name.clone(), value.clone()));
        }
        for name in &self.has_header {
            criteria.push(SearchCriterion::HeaderExists { name: name.clone() });
        }
        for (name, values) in [
            ("From", &self.from),
            ("To", &self.to),
            ("Cc", &self.cc),
            ("Bcc", &self.bcc),
        ] {
            for value in values {
                criteria.push(SearchCriterion::HeaderAddress {
                    name: name.to_string(),
                    value: value.clone(),
                });
            }
        }
        for (names, is_set) in [(&self.flagged, true), (&self.unflagged, false)] {
            for name in names {
                let flag: Flag = name.parse()?;
                criteria.push(SearchCriterion::flag(flag, is_set));
            }
        }
        for (op, timestamp) in [
            (DateOp::On, self.on),
            (DateOp::Before, self.before),
            (DateOp::After, self.after),
        ] {
            if let Some(timestamp) = timestamp {
                criteria.push(SearchCriterion::internal_date(op, timestamp, self.resolution));
            }
        }
        if self.all {
            criteria.push(SearchCriterion::All);
        }
        if criteria.is_empty() {
            return Err(raise_error!(
                "At least one search criterion is required (use --all to list everything)".into(),
                ErrorCode::InvalidParameter
            ));
        }
        Ok(criteria)
    }
}

pub fn parse_flags(list: Option<&str>) -> MailpostResult<MessageFlags> {
    match list {
        Some(list) => MessageFlags::parse_list(list),
        None => Ok(MessageFlags::new()),
    }
}

fn parse_date(s: &str) -> Result<i64, String> {
    parse_timestamp(s).map_err(|e| e.to_string())
}

fn parse_header(s: &str) -> Result<(String, String), String> {
    let (name, value) = s
        .split_once(':')
        .ok_or_else(|| format!("Expected Name:value, got {:?}", s))?;
    let name = name.trim();
    if name.is_empty() {
        return Err("Header name must not be empty".to_string());
    }
    Ok((name.to_string(), value.trim().to_string()))
}

/// Parses `1:4,7,9:9` into inclusive ranges.
fn parse_id_set(s: &str) -> Result<IdSet, String> {
    let mut ranges = Vec::new();
    for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let parse = |v: &str| {
            v.trim()
                .parse::<MessageId>()
                .map_err(|e| format!("Invalid message id {:?}: {}", v, e))
        };
        let range = match part.split_once(':') {
            Some((start, end)) => {
                let (start, end) = (parse(start)?, parse(end)?);
                if start > end {
                    return Err(format!("Range {} is reversed", part));
                }
                start..=end
            }
            None => {
                let id = parse(part)?;
                id..=id
            }
        };
        ranges.push(range);
    }
    if ranges.is_empty() {
        return Err("At least one message id is required".to_string());
    }
    Ok(IdSet(ranges))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAILBOX: &str = "00000000-0000-0000-0000-000000000001";

    fn settings(args: &[&str]) -> Settings {
        let mut argv = vec!["mailpost", "--mailpost-root-dir", "/"];
        argv.extend_from_slice(args);
        Settings::try_parse_from(argv).unwrap()
    }

    #[test]
    fn id_sets_parse_ranges() {
        assert_eq!(
            parse_id_set("1:4, 7").unwrap(),
            IdSet(vec![1..=4, 7..=7])
        );
        assert!(parse_id_set("4:1").is_err());
        assert!(parse_id_set("x").is_err());
        assert!(parse_id_set(" , ").is_err());
    }

    #[test]
    fn scan_settings_become_index_options() {
        let s = settings(&[
            "--mailpost-scan-mode",
            "colocated",
            "--mailpost-scan-timeout-ms",
            "250",
            "--mailpost-scan-failure",
            "propagate",
            "list",
            "--mailbox",
            MAILBOX,
        ]);
        let options = s.index_options();
        assert_eq!(options.scan_mode, ScanMode::Colocated);
        assert_eq!(options.failure_policy, ScanFailurePolicy::Propagate);
        assert_eq!(options.scan_timeout, Some(Duration::from_millis(250)));

        let s = settings(&["list", "--mailbox", MAILBOX]);
        assert_eq!(s.index_options(), IndexOptions::default());
    }

    #[test]
    fn search_arguments_become_criteria() {
        let s = settings(&[
            "search",
            "--mailbox",
            MAILBOX,
            "--text",
            "amsterdam",
            "--header",
            "X-Mailer: Rusty",
            "--from",
            "john@example.com",
            "--unflagged",
            "\\Seen",
            "--on",
            "2020-03-15",
        ]);
        let Command::Search(args) = s.command else {
            panic!("expected search");
        };
        let criteria = args.criteria().unwrap();
        assert_eq!(criteria.len(), 5);
        assert!(criteria.contains(&SearchCriterion::header("X-Mailer", "Rusty")));
        assert!(criteria.contains(&SearchCriterion::internal_date(
            DateOp::On,
            1_584_230_400_000,
            DateResolution::Day
        )));
    }

    #[test]
    fn empty_search_is_rejected() {
        let s = settings(&["search", "--mailbox", MAILBOX]);
        let Command::Search(args) = s.command else {
            panic!("expected search");
        };
        assert_eq!(
            args.criteria().unwrap_err().code(),
            ErrorCode::InvalidParameter
        );
    }
}
