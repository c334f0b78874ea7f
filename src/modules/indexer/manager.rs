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
    ops::{ControlFlow, RangeInclusive},
    sync::Arc,
    time::Duration,
};

use tracing::{debug, info, warn};

use crate::{
    modules::{
        error::{code::ErrorCode, MailpostResult},
        indexer::{
            codec::{encode_qualifier, encode_row, mailbox_prefix, MailboxId, MessageId, Term},
            executor::{ScanExecutor, ScanFailurePolicy, ScanMode, ScanOutcome},
            extractor::{FieldTerms, MimeTermExtractor, TermExtractor},
            fields::FieldId,
            flags::MessageFlags,
            query,
        },
        message::search::SearchCriterion,
        store::{RowFilter, RowStore, CELL_SENTINEL, COLUMN_FAMILY},
    },
    raise_error,
};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IndexOptions {
    pub scan_mode: ScanMode,
    pub failure_policy: ScanFailurePolicy,
    /// `None` lets a scan run to completion.
    pub scan_timeout: Option<Duration>,
}

/// Outcome of a best-effort delete.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeleteReport {
    pub removed: usize,
    pub failed: usize,
}

impl DeleteReport {
    fn merge(&mut self, other: DeleteReport) {
        self.removed += other.removed;
        self.failed += other.failed;
    }
}

/// Entry point for indexing, searching, flag updates and deletion over a
/// single injected store.
pub struct IndexManager {
    store: Arc<dyn RowStore>,
    extractor: Arc<dyn TermExtractor>,
    options: IndexOptions,
}

impl IndexManager {
    pub fn new(store: Arc<dyn RowStore>, options: IndexOptions) -> Self {
        Self::with_extractor(store, Arc::new(MimeTermExtractor), options)
    }

    pub fn with_extractor(
        store: Arc<dyn RowStore>,
        extractor: Arc<dyn TermExtractor>,
        options: IndexOptions,
    ) -> Self {
        Self {
            store,
            extractor,
            options,
        }
    }

    pub fn options(&self) -> &IndexOptions {
        &self.options
    }

    fn executor(&self) -> ScanExecutor<'_> {
        ScanExecutor::new(self.store.as_ref())
            .mode(self.options.scan_mode)
            .policy(self.options.failure_policy)
            .timeout(self.options.scan_timeout)
    }

    /// Writes the FLAGS cell and one posting per distinct (field, term).
    ///
    /// Writes are independent; a failure leaves the message partially indexed
    /// and the caller decides whether to retry. Writing the same message again
    /// produces the same cells.
    pub fn store_message(
        &self,
        mailbox: &MailboxId,
        message_id: MessageId,
        flags: &MessageFlags,
        field_terms: &FieldTerms,
    ) -> MailpostResult<()> {
        let qualifier = encode_qualifier(message_id);
        let flags_row = encode_row(mailbox, FieldId::Flags, &Term::empty());
        self.store
            .put(COLUMN_FAMILY, &flags_row, &qualifier, flags.encode().as_bytes())
            .map_err(|e| {
                raise_error!(
                    format!("Failed to write flags of message {}: {}", message_id, e),
                    ErrorCode::IndexingFailed
                )
            })?;

        let mut postings = 0usize;
        for (field, term) in field_terms.iter() {
            if field == FieldId::Flags {
                continue;
            }
            let row = encode_row(mailbox, field, term);
            self.store
                .put(COLUMN_FAMILY, &row, &qualifier, CELL_SENTINEL)
                .map_err(|e| {
                    raise_error!(
                        format!(
                            "Failed to write {} posting of message {}: {}",
                            field, message_id, e
                        ),
                        ErrorCode::IndexingFailed
                    )
                })?;
            postings += 1;
        }
        debug!(mailbox = %mailbox, message_id, postings, "message indexed");
        Ok(())
    }

    pub fn index_raw_message(
        &self,
        mailbox: &MailboxId,
        message_id: MessageId,
        flags: &MessageFlags,
        raw: &[u8],
        internal_date: i64,
    ) -> MailpostResult<()> {
        let terms = self.extractor.extract(raw, internal_date)?;
        self.store_message(mailbox, message_id, flags, &terms)
    }

    /// Rewrites the FLAGS cell of an indexed message. Returns false when the
    /// message has no FLAGS cell or the store failed; failures are logged,
    /// never raised. Concurrent updates race (last write wins).
    pub fn update_flags(
        &self,
        mailbox: &MailboxId,
        message_id: MessageId,
        flags: &MessageFlags,
    ) -> bool {
        let qualifier = encode_qualifier(message_id);
        let row = encode_row(mailbox, FieldId::Flags, &Term::empty());
        match self.store.get(COLUMN_FAMILY, &row, &qualifier) {
            Ok(Some(previous)) => {
                debug!(
                    mailbox = %mailbox,
                    message_id,
                    previous = %String::from_utf8_lossy(&previous),
                    "replacing flags"
                );
            }
            Ok(None) => {
                warn!(mailbox = %mailbox, message_id, "no flags cell found, message is not indexed");
                return false;
            }
            Err(e) => {
                warn!(mailbox = %mailbox, message_id, error = %e, "failed to read flags cell");
                return false;
            }
        }
        match self
            .store
            .put(COLUMN_FAMILY, &row, &qualifier, flags.encode().as_bytes())
        {
            Ok(()) => true,
            Err(e) => {
                warn!(mailbox = %mailbox, message_id, error = %e, "failed to update flags");
                false
            }
        }
    }

    /// Returns how many messages were updated.
    pub fn update_flags_many(
        &self,
        mailbox: &MailboxId,
        ranges: &[RangeInclusive<MessageId>],
        flags: &MessageFlags,
    ) -> usize {
        ranges
            .iter()
            .flat_map(|range| range.clone())
            .filter(|id| self.update_flags(mailbox, *id, flags))
            .count()
    }

    /// Finds every cell carrying the message's qualifier and removes it.
    /// Individual failures are logged and counted.
    pub fn delete_message(&self, mailbox: &MailboxId, message_id: MessageId) -> DeleteReport {
        let qualifier = encode_qualifier(message_id);
        let filter = RowFilter::QualifierEquals(qualifier.to_vec());
        let mut report = DeleteReport::default();

        let rows = match self.matching_rows(mailbox, &filter) {
            Ok(rows) => rows,
            Err(e) => {
                warn!(mailbox = %mailbox, message_id, error = %e, "failed to locate cells for delete");
                report.failed += 1;
                return report;
            }
        };
        for row in rows {
            match self.store.delete(COLUMN_FAMILY, &row, &qualifier) {
                Ok(true) => report.removed += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(
                        mailbox = %mailbox,
                        message_id,
                        row = %hex::encode(&row),
                        error = %e,
                        "failed to delete cell"
                    );
                    report.failed += 1;
                }
            }
        }
        debug!(
            mailbox = %mailbox,
            message_id,
            removed = report.removed,
            failed = report.failed,
            "message deleted"
        );
        report
    }

    pub fn delete_messages(
        &self,
        mailbox: &MailboxId,
        ranges: &[RangeInclusive<MessageId>],
    ) -> DeleteReport {
        let mut report = DeleteReport::default();
        for id in ranges.iter().flat_map(|range| range.clone()) {
            report.merge(self.delete_message(mailbox, id));
        }
        info!(
            mailbox = %mailbox,
            removed = report.removed,
            failed = report.failed,
            "delete finished"
        );
        report
    }

    pub fn search(
        &self,
        mailbox: &MailboxId,
        criteria: &[SearchCriterion],
    ) -> MailpostResult<ScanOutcome> {
        let filter = query::compile(mailbox, criteria)?;
        self.executor().execute(mailbox, &filter)
    }

    pub fn list_message_ids(&self, mailbox: &MailboxId) -> MailpostResult<ScanOutcome> {
        self.search(mailbox, &[SearchCriterion::All])
    }

    fn matching_rows(&self, mailbox: &MailboxId, filter: &RowFilter) -> MailpostResult<Vec<Vec<u8>>> {
        let prepared = filter.prepare()?;
        let prefix = mailbox_prefix(mailbox);
        let mut rows = Vec::new();
        self.store
            .scan(COLUMN_FAMILY, &prefix, &prepared, &mut |row| {
                rows.push(row.row);
                ControlFlow::Continue(())
            })?;
        Ok(rows)
    }
}
