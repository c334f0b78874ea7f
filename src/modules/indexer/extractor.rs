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

use std::collections::{BTreeMap, BTreeSet};

use mail_parser::{Address, MessageParser};

use crate::{
    modules::{
        error::{code::ErrorCode, MailpostResult},
        indexer::{codec::Term, fields::FieldId},
    },
    raise_error,
};

/// Terms produced for one message, grouped by field. Duplicates collapse.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FieldTerms(BTreeMap<FieldId, BTreeSet<Term>>);

impl FieldTerms {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: FieldId, term: Term) {
        self.0.entry(field).or_default().insert(term);
    }

    pub fn insert_text(&mut self, field: FieldId, text: &str) {
        for term in tokenize(text) {
            self.insert(field, term);
        }
    }

    pub fn with(mut self, field: FieldId, term: &str) -> Self {
        self.insert(field, Term::normalized(term));
        self
    }

    pub fn get(&self, field: FieldId) -> Option<&BTreeSet<Term>> {
        self.0.get(&field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (FieldId, &Term)> {
        self.0
            .iter()
            .flat_map(|(field, terms)| terms.iter().map(move |term| (*field, term)))
    }

    pub fn len(&self) -> usize {
        self.0.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Turns a raw message into field terms. Tokenization and charset handling
/// belong to the implementation.
pub trait TermExtractor: Send + Sync {
    fn extract(&self, raw: &[u8], internal_date: i64) -> MailpostResult<FieldTerms>;
}

const TOKEN_JOINERS: &[char] = &['@', '.', '-', '_', '+', '\''];

/// Splits on whitespace and punctuation while keeping address and host
/// characters inside a token, then uppercases.
pub fn tokenize(text: &str) -> impl Iterator<Item = Term> + '_ {
    text.split(|c: char| !(c.is_alphanumeric() || TOKEN_JOINERS.contains(&c)))
        .map(|token| token.trim_matches(TOKEN_JOINERS))
        .filter(|token| !token.is_empty())
        .map(Term::normalized)
}

/// Strips reply and forward markers: `Re: [list] Fwd: topic (fwd)` -> `topic`.
pub fn base_subject(subject: &str) -> String {
    let mut current = subject.trim().to_string();
    loop {
        let before = current.clone();
        let lower = current.to_ascii_lowercase();
        for marker in ["re:", "fw:", "fwd:"] {
            if lower.starts_with(marker) {
                current = current[marker.len()..].trim_start().to_string();
                break;
            }
        }
        if current.starts_with('[') {
            if let Some(end) = current.find(']') {
                let rest = current[end + 1..].trim_start();
                if !rest.is_empty() {
                    current = rest.to_string();
                }
            }
        }
        if current.to_ascii_lowercase().ends_with("(fwd)") {
            current = current[..current.len() - "(fwd)".len()].trim_end().to_string();
        }
        if current == before {
            return current;
        }
    }
}

/// Extractor built on `mail-parser`.
#[derive(Debug, Default, Clone, Copy)]
pub struct MimeTermExtractor;

impl MimeTermExtractor {
    fn first_mailbox(address: Option<&Address<'_>>) -> Option<(String, String)> {
        let first = address?.first()?;
        let mailbox = first.address.as_ref().map(|a| a.to_string())?;
        let display = first
            .name
            .as_ref()
            .map(|n| n.to_string())
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| mailbox.clone());
        Some((mailbox, display))
    }

    fn index_addresses(terms: &mut FieldTerms, field: FieldId, address: Option<&Address<'_>>) {
        let Some(address) = address else {
            return;
        };
        for addr in address.iter() {
            let rendered = match (&addr.name, &addr.address) {
                (Some(name), Some(address)) => format!("{} <{}>", name, address),
                (None, Some(address)) => address.to_string(),
                (Some(name), None) => name.to_string(),
                (None, None) => continue,
            };
            terms.insert_text(field, &rendered);
        }
    }
}

impl TermExtractor for MimeTermExtractor {
    fn extract(&self, raw: &[u8], internal_date: i64) -> MailpostResult<FieldTerms> {
        let message = MessageParser::default().parse(raw).ok_or_else(|| {
            raise_error!(
                "Failed to parse message for indexing".into(),
                ErrorCode::IndexingFailed
            )
        })?;
        let mut terms = FieldTerms::new();

        for header in message.headers() {
            let start = header.offset_start as usize;
            let end = (header.offset_end as usize).min(raw.len());
            if start > end {
                continue;
            }
            let value = String::from_utf8_lossy(&raw[start..end])
                .replace("\r\n", " ")
                .replace('\n', " ");
            let value = value.trim();
            terms.insert_text(FieldId::Headers, &format!("{}: {}", header.name(), value));
            terms.insert_text(FieldId::PrefixHeader, value);
        }

        Self::index_addresses(&mut terms, FieldId::From, message.from());
        Self::index_addresses(&mut terms, FieldId::To, message.to());
        Self::index_addresses(&mut terms, FieldId::Cc, message.cc());
        Self::index_addresses(&mut terms, FieldId::Bcc, message.bcc());

        if let Some((mailbox, display)) = Self::first_mailbox(message.from()) {
            terms.insert(FieldId::FirstFromName, Term::normalized(&mailbox));
            terms.insert(FieldId::FirstFromDisplay, Term::normalized(&display));
        }
        if let Some((mailbox, display)) = Self::first_mailbox(message.to()) {
            terms.insert(FieldId::FirstToName, Term::normalized(&mailbox));
            terms.insert(FieldId::FirstToDisplay, Term::normalized(&display));
        }
        if let Some((mailbox, _)) = Self::first_mailbox(message.cc()) {
            terms.insert(FieldId::FirstCcName, Term::normalized(&mailbox));
        }

        if let Some(subject) = message.subject() {
            let base = base_subject(subject);
            if !base.is_empty() {
                terms.insert(FieldId::BaseSubject, Term::normalized(&base));
            }
        }

        let mut part = 0;
        while let Some(text) = message.body_text(part) {
            terms.insert_text(FieldId::Body, &text);
            part += 1;
        }

        terms.insert(FieldId::SentDate, Term::sent_date(internal_date));
        Ok(terms)
    }
}
