//! Query evaluation by sorted posting-list merges

use super::{CancelFlag, Query, QueryOptions, MAX_QUERY_DEPTH};
use crate::error::{MarginaliaError, Result};
use crate::index::posting::{intersect, union};
use crate::index::{IndexSnapshot, InvertedIndex};
use crate::logging::QueryStats;
use crate::record::RecordId;
use std::borrow::Cow;
use std::cmp::Reverse;
use std::time::Instant;

type Ids<'a> = Cow<'a, [RecordId]>;

/// Tree levels accepted for evaluation; each parsed group adds at most an
/// AND and an OR level
const MAX_TREE_DEPTH: usize = 2 * MAX_QUERY_DEPTH + 1;

fn nothing<'a>() -> Ids<'a> {
    Cow::Owned(Vec::new())
}

/// Intersect lists smallest first, stopping as soon as the result is empty
fn intersect_all<'a>(mut lists: Vec<Ids<'a>>, cancel: &CancelFlag) -> Result<Ids<'a>> {
    if lists.is_empty() {
        return Ok(nothing());
    }
    lists.sort_by_key(|l| l.len());

    let mut lists = lists.into_iter();
    let mut acc = match lists.next() {
        Some(first) => first,
        None => return Ok(nothing()),
    };
    for next in lists {
        if acc.is_empty() {
            break;
        }
        cancel.check()?;
        acc = Cow::Owned(intersect(&acc, &next));
    }
    Ok(acc)
}

/// Raw ids matching `query`, ascending; stale ids are still present
fn resolve<'a>(index: &'a InvertedIndex, query: &Query, cancel: &CancelFlag) -> Result<Ids<'a>> {
    match query {
        Query::Term(text) => {
            let lists = index
                .terms_for(text)
                .iter()
                .map(|term| Cow::Borrowed(index.term_postings(term)))
                .collect();
            intersect_all(lists, cancel)
        }
        Query::Tag(tag) => Ok(Cow::Borrowed(index.tag_postings(tag))),
        Query::And(children) => {
            let mut lists = Vec::with_capacity(children.len());
            for child in children {
                cancel.check()?;
                let ids = resolve(index, child, cancel)?;
                if ids.is_empty() {
                    return Ok(nothing());
                }
                lists.push(ids);
            }
            intersect_all(lists, cancel)
        }
        Query::Or(children) => {
            let mut acc = nothing();
            for child in children {
                cancel.check()?;
                let ids = resolve(index, child, cancel)?;
                acc = if acc.is_empty() {
                    ids
                } else {
                    Cow::Owned(union(&acc, &ids))
                };
            }
            Ok(acc)
        }
    }
}

/// Evaluate `query` against an index snapshot.
///
/// Returns live ids ordered newest first (descending `created_at`, ties by
/// descending id). Tombstoned ids are dropped here even when their posting
/// entries are still present. Trees deeper than the parser would produce are
/// rejected with `InvalidQuery`.
pub fn evaluate(
    snapshot: &IndexSnapshot,
    query: &Query,
    cancel: &CancelFlag,
    stats: &QueryStats,
) -> Result<Vec<RecordId>> {
    let start = Instant::now();

    if query.depth() > MAX_TREE_DEPTH {
        return Err(MarginaliaError::invalid_query(0, "nesting too deep"));
    }

    // Every id lives in exactly one layer, so per-layer results are disjoint
    let resolved = cancel.check().and_then(|_| {
        let [base, recent] = snapshot.layers();
        let base = resolve(base, query, cancel)?;
        let recent = resolve(recent, query, cancel)?;
        Ok(if recent.is_empty() {
            base
        } else {
            Cow::Owned(union(&base, &recent))
        })
    });
    let raw = match resolved {
        Ok(ids) => ids,
        Err(MarginaliaError::Cancelled) => {
            stats.record_cancelled();
            tracing::debug!(query = %query, "Query cancelled");
            return Err(MarginaliaError::Cancelled);
        }
        Err(e) => return Err(e),
    };

    let mut hits: Vec<_> = raw
        .iter()
        .filter_map(|&id| {
            snapshot
                .doc(id)
                .filter(|_| snapshot.is_live(id))
                .map(|doc| (doc.created_at, id))
        })
        .collect();
    stats.record_stale_filtered(raw.len() - hits.len());

    hits.sort_unstable_by_key(|&hit| Reverse(hit));
    let ids: Vec<RecordId> = hits.into_iter().map(|(_, id)| id).collect();

    stats.record_query(ids.len());
    crate::trace_time!(start, "evaluate_query", results = ids.len());
    Ok(ids)
}

/// Apply offset and limit; `default_limit` applies when the options carry none
pub fn paginate<T>(items: Vec<T>, options: &QueryOptions, default_limit: Option<usize>) -> Vec<T> {
    let limit = options.limit.or(default_limit).unwrap_or(usize::MAX);
    items
        .into_iter()
        .skip(options.offset)
        .take(limit)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ids, record};
    use chrono::{TimeZone, Utc};

    /// Records 1 and 2 sit in the base layer, 3 and 4 in the delta
    fn sample_index() -> IndexSnapshot {
        let mut base = InvertedIndex::new(false);
        base.index(&record(1, "channels are simple to learn", &["go"]));
        base.index(&record(2, "ownership and borrowing", &["rust"]));
        let mut index = IndexSnapshot::from(base);
        index.index(&record(3, "channels in rust via crossbeam", &["rust", "concurrency"]));
        index.index(&record(4, "the GIL limits threads", &["python", "concurrency"]));
        index
    }

    fn run(index: &IndexSnapshot, q: &str) -> Vec<RecordId> {
        let query = Query::parse(q).unwrap();
        evaluate(index, &query, &CancelFlag::new(), &QueryStats::new()).unwrap()
    }

    #[test]
    fn test_term_and_tag_leaves() {
        let index = sample_index();
        assert_eq!(run(&index, "channels"), ids(&[3, 1]));
        assert_eq!(run(&index, "tag:RUST"), ids(&[3, 2]));
        assert!(run(&index, "nonexistent").is_empty());
    }

    #[test]
    fn test_and_is_intersection() {
        let index = sample_index();
        let a = run(&index, "channels");
        let b = run(&index, "tag:rust");
        let both = run(&index, "channels AND tag:rust");
        let expected: Vec<_> = a.iter().copied().filter(|id| b.contains(id)).collect();
        assert_eq!(both, expected);
        assert_eq!(both, ids(&[3]));
    }

    #[test]
    fn test_or_is_union() {
        let index = sample_index();
        assert_eq!(run(&index, "tag:go OR tag:python"), ids(&[4, 1]));
        assert_eq!(run(&index, "tag:concurrency OR tag:rust"), ids(&[4, 3, 2]));
    }

    #[test]
    fn test_multi_token_term_requires_all_tokens() {
        let index = sample_index();
        assert_eq!(run(&index, "\"simple channels\""), ids(&[1]));
        assert!(run(&index, "\"simple ownership\"").is_empty());
        assert!(run(&index, "\"--\"").is_empty());
    }

    #[test]
    fn test_empty_query_is_empty() {
        let index = sample_index();
        assert!(run(&index, "").is_empty());
        let q = Query::And(Vec::new());
        assert!(evaluate(&index, &q, &CancelFlag::new(), &QueryStats::new())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_stale_ids_filtered() {
        let mut index = sample_index();
        index.unindex(RecordId::new(3));
        let stats = QueryStats::new();
        let q = Query::term("channels");

        let result = evaluate(&index, &q, &CancelFlag::new(), &stats).unwrap();
        assert_eq!(result, ids(&[1]));
        assert_eq!(stats.stale_filtered(), 1);
        assert_eq!(stats.queries(), 1);
    }

    #[test]
    fn test_stale_ids_filtered_in_base_layer() {
        let mut index = sample_index();
        index.unindex(RecordId::new(1));
        let stats = QueryStats::new();

        let result = evaluate(&index, &Query::term("channels"), &CancelFlag::new(), &stats).unwrap();
        assert_eq!(result, ids(&[3]));
        assert_eq!(stats.stale_filtered(), 1);
    }

    #[test]
    fn test_held_snapshot_unaffected_by_later_writes() {
        let held = sample_index();
        let mut next = held.clone();
        next.index(&record(5, "channels everywhere", &["go"]));
        next.unindex(RecordId::new(1));

        assert_eq!(run(&held, "channels"), ids(&[3, 1]));
        assert_eq!(run(&next, "channels"), ids(&[5, 3]));
    }

    #[test]
    fn test_rejects_overly_deep_trees() {
        let index = sample_index();
        let mut q = Query::term("channels");
        for _ in 0..20_000 {
            q = Query::And(vec![q]);
        }
        let err = evaluate(&index, &q, &CancelFlag::new(), &QueryStats::new()).unwrap_err();
        assert!(matches!(err, MarginaliaError::InvalidQuery { position: 0, .. }));
        // Tear the tree down iteratively; a recursive drop would overflow
        let mut node = q;
        while let Query::And(mut children) = node {
            node = children.pop().unwrap_or_else(Query::empty);
        }

        let mut shallow = Query::term("channels");
        for _ in 0..MAX_QUERY_DEPTH {
            shallow = Query::And(vec![shallow]);
        }
        assert_eq!(run_query(&index, &shallow), ids(&[3, 1]));
    }

    fn run_query(index: &IndexSnapshot, q: &Query) -> Vec<RecordId> {
        evaluate(index, q, &CancelFlag::new(), &QueryStats::new()).unwrap()
    }

    #[test]
    fn test_orders_by_created_at_then_id() {
        let mut index = InvertedIndex::new(false);
        let ts = Utc.timestamp_opt(1_800_000_000, 0).unwrap();
        let mut old = record(9, "note", &[]);
        old.created_at = Utc.timestamp_opt(1_000, 0).unwrap();
        let mut a = record(2, "note", &[]);
        a.created_at = ts;
        let mut b = record(5, "note", &[]);
        b.created_at = ts;
        for r in [&old, &a, &b] {
            index.index(r);
        }

        assert_eq!(run(&IndexSnapshot::from(index), "note"), ids(&[5, 2, 9]));
    }

    #[test]
    fn test_cancelled_flag_aborts() {
        let index = sample_index();
        let cancel = CancelFlag::new();
        cancel.cancel();
        let stats = QueryStats::new();

        let q = Query::parse("channels OR tag:go").unwrap();
        let err = evaluate(&index, &q, &cancel, &stats).unwrap_err();
        assert!(matches!(err, MarginaliaError::Cancelled));
        assert_eq!(stats.cancelled(), 1);
        assert_eq!(stats.queries(), 0);
    }

    #[test]
    fn test_paginate() {
        let items = vec![1, 2, 3, 4, 5];
        assert_eq!(
            paginate(items.clone(), &QueryOptions::limit(2).with_offset(1), None),
            vec![2, 3]
        );
        assert_eq!(
            paginate(items.clone(), &QueryOptions::default(), Some(3)),
            vec![1, 2, 3]
        );
        assert_eq!(
            paginate(items, &QueryOptions::default().with_offset(10), None),
            Vec::<i32>::new()
        );
    }
}
