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
    collections::HashSet,
    ops::ControlFlow,
    time::{Duration, Instant},
};

use clap::ValueEnum;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    modules::{
        error::{code::ErrorCode, MailpostError, MailpostResult},
        indexer::codec::{decode_qualifier, decode_row, mailbox_prefix, MailboxId, MessageId},
        store::{RowFilter, RowStore, ScannedRow, COLUMN_FAMILY},
    },
    raise_error,
};

/// Where the filter result is turned into message ids.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
pub enum ScanMode {
    /// Rows stream back and qualifiers are decoded here.
    #[default]
    Client,
    /// The store decodes qualifiers next to the data and returns only ids.
    /// The deadline is checked once the store returns.
    Colocated,
}

/// What a scan does when the store fails or the deadline passes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
pub enum ScanFailurePolicy {
    /// Return what was collected so far and mark the outcome incomplete.
    #[default]
    Partial,
    /// Fail the whole search with `ScanAborted`.
    Propagate,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanOutcome {
    pub message_ids: HashSet<MessageId>,
    /// False when the scan stopped early and `message_ids` may be missing hits.
    pub complete: bool,
}

impl ScanOutcome {
    pub fn sorted_ids(&self) -> Vec<MessageId> {
        self.message_ids.iter().copied().sorted_unstable().collect()
    }
}

/// Adds the message ids carried by a row's qualifiers to `ids`.
///
/// Rows with an undecodable key and cells with a malformed qualifier are
/// logged and skipped. Returns the number of qualifiers harvested.
pub fn harvest_row(row: &ScannedRow, ids: &mut HashSet<MessageId>) -> usize {
    if let Err(e) = decode_row(&row.row) {
        warn!(row = %hex::encode(&row.row), error = %e, "skipping corrupt row");
        return 0;
    }
    let mut harvested = 0;
    for (qualifier, _) in &row.cells {
        match decode_qualifier(qualifier) {
            Ok(id) => {
                ids.insert(id);
                harvested += 1;
            }
            Err(e) => {
                warn!(
                    row = %hex::encode(&row.row),
                    qualifier = %hex::encode(qualifier),
                    error = %e,
                    "skipping corrupt qualifier"
                );
            }
        }
    }
    harvested
}

/// Runs one compiled filter over a mailbox's rows.
pub struct ScanExecutor<'a> {
    store: &'a dyn RowStore,
    mode: ScanMode,
    policy: ScanFailurePolicy,
    timeout: Option<Duration>,
}

impl<'a> ScanExecutor<'a> {
    pub fn new(store: &'a dyn RowStore) -> Self {
        Self {
            store,
            mode: ScanMode::default(),
            policy: ScanFailurePolicy::default(),
            timeout: None,
        }
    }

    pub fn mode(mut self, mode: ScanMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn policy(mut self, policy: ScanFailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn execute(&self, mailbox: &MailboxId, filter: &RowFilter) -> MailpostResult<ScanOutcome> {
        let prepared = filter.prepare()?;
        let prefix = mailbox_prefix(mailbox);
        let started = Instant::now();
        let deadline = self.timeout.map(|t| started + t);
        let expired = || deadline.is_some_and(|d| Instant::now() >= d);

        let outcome = match self.mode {
            ScanMode::Client => {
                let mut ids = HashSet::new();
                let mut timed_out = false;
                let result = self.store.scan(COLUMN_FAMILY, &prefix, &prepared, &mut |row| {
                    if expired() {
                        timed_out = true;
                        return ControlFlow::Break(());
                    }
                    harvest_row(&row, &mut ids);
                    ControlFlow::Continue(())
                });
                match result {
                    Err(e) => self.on_failure(mailbox, ids, e)?,
                    Ok(()) if timed_out => self.on_failure(mailbox, ids, self.timed_out())?,
                    Ok(()) => ScanOutcome {
                        message_ids: ids,
                        complete: true,
                    },
                }
            }
            ScanMode::Colocated => {
                match self
                    .store
                    .collect_message_ids(COLUMN_FAMILY, &prefix, &prepared)
                {
                    Ok(ids) if expired() => self.on_failure(mailbox, ids, self.timed_out())?,
                    Ok(ids) => ScanOutcome {
                        message_ids: ids,
                        complete: true,
                    },
                    Err(e) => self.on_failure(mailbox, HashSet::new(), e)?,
                }
            }
        };

        debug!(
            mailbox = %mailbox,
            mode = ?self.mode,
            hits = outcome.message_ids.len(),
            complete = outcome.complete,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "scan finished"
        );
        Ok(outcome)
    }

    fn timed_out(&self) -> MailpostError {
        raise_error!(
            format!("Scan exceeded its {:?} timeout", self.timeout),
            ErrorCode::ScanAborted
        )
    }

    fn on_failure(
        &self,
        mailbox: &MailboxId,
        collected: HashSet<MessageId>,
        error: MailpostError,
    ) -> MailpostResult<ScanOutcome> {
        match self.policy {
            ScanFailurePolicy::Partial => {
                warn!(
                    mailbox = %mailbox,
                    collected = collected.len(),
                    error = %error,
                    "scan stopped early, returning partial results"
                );
                Ok(ScanOutcome {
                    message_ids: collected,
                    complete: false,
                })
            }
            ScanFailurePolicy::Propagate => Err(raise_error!(
                format!("Scan of mailbox {} aborted: {}", mailbox, error),
                ErrorCode::ScanAborted
            )),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::modules::{
        indexer::{
            codec::{encode_qualifier, encode_row, Term},
            fields::FieldId,
        },
        store::{memory::MemoryRowStore, PreparedFilter, RowVisitor, CELL_SENTINEL},
    };

    /// Delegates to a memory store but fails after `allowed` rows.
    pub(crate) struct FailingStore {
        pub inner: MemoryRowStore,
        pub allowed: usize,
    }

    impl RowStore for FailingStore {
        fn put(&self, family: &[u8], row: &[u8], qualifier: &[u8], value: &[u8]) -> MailpostResult<()> {
            self.inner.put(family, row, qualifier, value)
        }

        fn get(&self, family: &[u8], row: &[u8], qualifier: &[u8]) -> MailpostResult<Option<Vec<u8>>> {
            self.inner.get(family, row, qualifier)
        }

        fn delete(&self, family: &[u8], row: &[u8], qualifier: &[u8]) -> MailpostResult<bool> {
            self.inner.delete(family, row, qualifier)
        }

        fn scan(
            &self,
            family: &[u8],
            row_prefix: &[u8],
            filter: &PreparedFilter,
            visitor: &mut RowVisitor<'_>,
        ) -> MailpostResult<()> {
            let mut seen = 0;
            let mut failed = false;
            self.inner.scan(family, row_prefix, filter, &mut |row| {
                if seen == self.allowed {
                    failed = true;
                    return ControlFlow::Break(());
                }
                seen += 1;
                visitor(row)
            })?;
            if failed {
                return Err(raise_error!(
                    "region server went away".into(),
                    ErrorCode::StoreError
                ));
            }
            Ok(())
        }
    }

    fn seed(store: &dyn RowStore, mailbox: &MailboxId) {
        for (id, word) in [(1u64, "ALPHA"), (2, "BRAVO"), (3, "CHARLIE")] {
            let row = encode_row(mailbox, FieldId::Body, &Term::normalized(word));
            store
                .put(COLUMN_FAMILY, &row, &encode_qualifier(id), CELL_SENTINEL)
                .unwrap();
        }
    }

    #[test]
    fn harvest_skips_bad_qualifiers() {
        let mailbox = MailboxId::from_u128(9);
        let row = ScannedRow {
            row: encode_row(&mailbox, FieldId::Body, &Term::normalized("X")),
            cells: vec![
                (encode_qualifier(4).to_vec(), CELL_SENTINEL.to_vec()),
                (vec![1, 2, 3], CELL_SENTINEL.to_vec()),
            ],
        };
        let mut ids = HashSet::new();
        assert_eq!(harvest_row(&row, &mut ids), 1);
        assert_eq!(ids, HashSet::from([4]));
    }

    #[test]
    fn harvest_skips_corrupt_rows() {
        let row = ScannedRow {
            row: vec![0u8; 5],
            cells: vec![(encode_qualifier(4).to_vec(), CELL_SENTINEL.to_vec())],
        };
        let mut ids = HashSet::new();
        assert_eq!(harvest_row(&row, &mut ids), 0);
        assert!(ids.is_empty());
    }

    #[test]
    fn client_and_colocated_agree() {
        let store = MemoryRowStore::new();
        let mailbox = MailboxId::from_u128(9);
        seed(&store, &mailbox);
        let client = ScanExecutor::new(&store).execute(&mailbox, &RowFilter::All).unwrap();
        let colocated = ScanExecutor::new(&store)
            .mode(ScanMode::Colocated)
            .execute(&mailbox, &RowFilter::All)
            .unwrap();
        assert_eq!(client, colocated);
        assert_eq!(client.sorted_ids(), vec![1, 2, 3]);
        assert!(client.complete);
    }

    #[test]
    fn partial_policy_keeps_collected_ids() {
        let store = FailingStore {
            inner: MemoryRowStore::new(),
            allowed: 1,
        };
        let mailbox = MailboxId::from_u128(9);
        seed(&store, &mailbox);
        let outcome = ScanExecutor::new(&store).execute(&mailbox, &RowFilter::All).unwrap();
        assert!(!outcome.complete);
        assert_eq!(outcome.message_ids.len(), 1);
    }

    #[test]
    fn propagate_policy_aborts() {
        let store = FailingStore {
            inner: MemoryRowStore::new(),
            allowed: 1,
        };
        let mailbox = MailboxId::from_u128(9);
        seed(&store, &mailbox);
        let err = ScanExecutor::new(&store)
            .policy(ScanFailurePolicy::Propagate)
            .execute(&mailbox, &RowFilter::All)
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ScanAborted);
    }

    #[test]
    fn expired_deadline_marks_outcome_incomplete() {
        let store = MemoryRowStore::new();
        let mailbox = MailboxId::from_u128(9);
        seed(&store, &mailbox);
        let outcome = ScanExecutor::new(&store)
            .timeout(Some(Duration::ZERO))
            .execute(&mailbox, &RowFilter::All)
            .unwrap();
        assert!(!outcome.complete);
        assert!(outcome.message_ids.is_empty());
    }

    #[test]
    fn colocated_scan_honours_the_deadline() {
        let store = MemoryRowStore::new();
        let mailbox = MailboxId::from_u128(9);
        seed(&store, &mailbox);
        let outcome = ScanExecutor::new(&store)
            .mode(ScanMode::Colocated)
            .timeout(Some(Duration::ZERO))
            .execute(&mailbox, &RowFilter::All)
            .unwrap();
        assert!(!outcome.complete);
        assert_eq!(outcome.sorted_ids(), vec![1, 2, 3]);

        let err = ScanExecutor::new(&store)
            .mode(ScanMode::Colocated)
            .policy(ScanFailurePolicy::Propagate)
            .timeout(Some(Duration::ZERO))
            .execute(&mailbox, &RowFilter::All)
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ScanAborted);
    }
}
