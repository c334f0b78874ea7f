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

use std::ops::Bound;

use tracing::debug;

use crate::{
    modules::{
        error::{code::ErrorCode, MailpostResult},
        indexer::{
            codec::{encode_row, field_prefix, MailboxId, Term},
            date::date_range,
            extractor::tokenize,
            fields::FieldId,
        },
        message::search::{SearchCriterion, TextScope},
        store::RowFilter,
    },
    raise_error,
};

/// Compiles criteria into one filter over the mailbox's rows.
///
/// Criteria are OR'd: a message matching any single criterion is returned.
/// An empty list behaves like [`SearchCriterion::All`].
pub fn compile(mailbox: &MailboxId, criteria: &[SearchCriterion]) -> MailpostResult<RowFilter> {
    let mut alternatives = Vec::with_capacity(criteria.len());
    for criterion in criteria {
        alternatives.push(compile_criterion(mailbox, criterion)?);
    }
    let filter = RowFilter::any_of(alternatives);
    debug!(mailbox = %mailbox, criteria = criteria.len(), ?filter, "compiled search filter");
    Ok(filter)
}

fn compile_criterion(mailbox: &MailboxId, criterion: &SearchCriterion) -> MailpostResult<RowFilter> {
    match criterion {
        SearchCriterion::All => Ok(RowFilter::All),
        SearchCriterion::Text { value, scope } => {
            let fields: &[FieldId] = match scope {
                TextScope::Body => &[FieldId::Body],
                TextScope::Full => &[FieldId::Body, FieldId::Headers],
            };
            let terms = query_terms(value);
            // Every message contains the empty string.
            if terms.is_empty() {
                return Ok(RowFilter::All);
            }
            Ok(RowFilter::any_of(
                fields
                    .iter()
                    .flat_map(|field| terms.iter().map(|term| term_match(mailbox, *field, term)))
                    .collect(),
            ))
        }
        SearchCriterion::HeaderContains { name, value } => Ok(term_match(
            mailbox,
            FieldId::for_header(name),
            &Term::normalized(value),
        )),
        SearchCriterion::HeaderExists { name } => Ok(RowFilter::RowPrefix(encode_row(
            mailbox,
            FieldId::for_header(name),
            &Term::empty(),
        ))),
        SearchCriterion::HeaderAddress { name, value } => {
            let field = FieldId::for_header(name);
            let terms = query_terms(value);
            if terms.is_empty() {
                return Ok(term_match(mailbox, field, &Term::empty()));
            }
            Ok(RowFilter::any_of(
                terms.iter().map(|term| term_match(mailbox, field, term)).collect(),
            ))
        }
        SearchCriterion::Flag { flag, is_set } => {
            let token = flag.token().into_bytes();
            let value = if *is_set {
                RowFilter::ValueContains(token)
            } else {
                RowFilter::ValueExcludes(token)
            };
            Ok(RowFilter::And(vec![
                RowFilter::RowEquals(encode_row(mailbox, FieldId::Flags, &Term::empty())),
                value,
            ]))
        }
        SearchCriterion::InternalDate {
            op,
            timestamp,
            resolution,
        } => {
            let (lower, upper) = date_range(*op, *timestamp, *resolution)?;
            let to_row = |millis: i64| encode_row(mailbox, FieldId::SentDate, &Term::sent_date(millis));
            Ok(RowFilter::RowRange {
                lower: map_bound(lower, to_row),
                upper: map_bound(upper, to_row),
            })
        }
        SearchCriterion::Size { .. }
        | SearchCriterion::Uid(_)
        | SearchCriterion::ModSeq(_)
        | SearchCriterion::Not(_) => Err(raise_error!(
            format!(
                "Search criterion '{}' is not supported by the posting index",
                criterion.kind()
            ),
            ErrorCode::UnsupportedCriterion
        )),
    }
}

/// Exact row prefix on the term, or the term appearing anywhere in the term
/// part of a row of the same field.
fn term_match(mailbox: &MailboxId, field: FieldId, term: &Term) -> RowFilter {
    RowFilter::Or(vec![
        RowFilter::RowPrefix(encode_row(mailbox, field, term)),
        RowFilter::row_contains(&field_prefix(mailbox, field), term.as_bytes()),
    ])
}

fn query_terms(value: &str) -> Vec<Term> {
    let mut terms: Vec<Term> = tokenize(value).collect();
    if terms.is_empty() && !value.trim().is_empty() {
        terms.push(Term::normalized(value.trim()));
    }
    terms
}

fn map_bound(bound: Bound<i64>, f: impl Fn(i64) -> Vec<u8>) -> Bound<Vec<u8>> {
    match bound {
        Bound::Included(v) => Bound::Included(f(v)),
        Bound::Excluded(v) => Bound::Excluded(f(v)),
        Bound::Unbounded => Bound::Unbounded,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::indexer::{
        date::{DateOp, DateResolution},
        flags::{Flag, SystemFlag},
    };

    fn mailbox() -> MailboxId {
        MailboxId::from_u128(42)
    }

    #[test]
    fn no_criteria_matches_everything() {
        assert_eq!(compile(&mailbox(), &[]).unwrap(), RowFilter::All);
        assert_eq!(
            compile(&mailbox(), &[SearchCriterion::All]).unwrap(),
            RowFilter::All
        );
    }

    #[test]
    fn match_all_absorbs_other_criteria() {
        let filter = compile(
            &mailbox(),
            &[SearchCriterion::text("amsterdam"), SearchCriterion::All],
        )
        .unwrap();
        assert_eq!(filter, RowFilter::All);
    }

    #[test]
    fn body_text_uses_uppercased_prefix_and_substring() {
        let filter = compile(&mailbox(), &[SearchCriterion::body("Amsterdam")]).unwrap();
        let term = Term::normalized("AMSTERDAM");
        assert_eq!(
            filter,
            RowFilter::Or(vec![
                RowFilter::RowPrefix(encode_row(&mailbox(), FieldId::Body, &term)),
                RowFilter::row_contains(&field_prefix(&mailbox(), FieldId::Body), b"AMSTERDAM"),
            ])
        );
    }

    #[test]
    fn full_text_covers_body_and_headers() {
        let filter = compile(&mailbox(), &[SearchCriterion::text("venice")]).unwrap();
        let RowFilter::Or(children) = filter else {
            panic!("expected an OR filter");
        };
        let headers = encode_row(&mailbox(), FieldId::Headers, &Term::normalized("venice"));
        assert!(children.contains(&RowFilter::RowPrefix(headers)));
        assert_eq!(children.len(), 4);
    }

    #[test]
    fn header_exists_is_a_field_prefix() {
        let filter = compile(
            &mailbox(),
            &[SearchCriterion::HeaderExists { name: "Cc".into() }],
        )
        .unwrap();
        assert_eq!(
            filter,
            RowFilter::RowPrefix(field_prefix(&mailbox(), FieldId::Cc))
        );
    }

    #[test]
    fn flags_match_the_flags_row_and_its_value() {
        let set = compile(
            &mailbox(),
            &[SearchCriterion::flag(Flag::System(SystemFlag::Seen), true)],
        )
        .unwrap();
        let row = encode_row(&mailbox(), FieldId::Flags, &Term::empty());
        assert_eq!(
            set,
            RowFilter::And(vec![
                RowFilter::RowEquals(row.clone()),
                RowFilter::ValueContains(b"\\SEEN".to_vec()),
            ])
        );
        let unset = compile(
            &mailbox(),
            &[SearchCriterion::flag(Flag::System(SystemFlag::Deleted), false)],
        )
        .unwrap();
        assert_eq!(
            unset,
            RowFilter::And(vec![
                RowFilter::RowEquals(row),
                RowFilter::ValueExcludes(b"\\DELETED".to_vec()),
            ])
        );
    }

    #[test]
    fn date_criteria_become_sent_date_ranges() {
        let t = 1_584_266_400_000; // 2020-03-15T10:00:00Z
        let day = 1_584_230_400_000; // 2020-03-15T00:00:00Z
        let filter = compile(
            &mailbox(),
            &[SearchCriterion::internal_date(DateOp::On, t, DateResolution::Day)],
        )
        .unwrap();
        let row = |ms| encode_row(&mailbox(), FieldId::SentDate, &Term::sent_date(ms));
        assert_eq!(
            filter,
            RowFilter::RowRange {
                lower: Bound::Included(row(day)),
                upper: Bound::Excluded(row(day + 86_400_000)),
            }
        );
    }

    #[test]
    fn unsupported_criteria_reject_the_whole_query() {
        for unsupported in [
            SearchCriterion::Size {
                larger_than: Some(10),
                smaller_than: None,
            },
            SearchCriterion::Uid(vec![1..=5]),
            SearchCriterion::ModSeq(7),
            SearchCriterion::Not(Box::new(SearchCriterion::All)),
        ] {
            let err = compile(&mailbox(), &[SearchCriterion::All, unsupported]).unwrap_err();
            assert_eq!(err.code(), ErrorCode::UnsupportedCriterion);
        }
    }
}
