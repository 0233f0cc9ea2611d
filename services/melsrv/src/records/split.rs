//! Fan-out of one record into several sources by field-name prefix

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::builder::coerce_counter;
use super::sslog::SslogRecord;
use crate::protocols::melsec::FieldMap;

/// One output source of a split
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitTarget {
    pub source: String,
    /// Empty prefix marks a catch-all target for unmatched fields
    #[serde(default)]
    pub fieldprefix: String,
    /// Counter field name, after prefix stripping
    #[serde(default)]
    pub counterfield: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Route {
    Claimed { target: usize, field: String },
    Unmatched,
}

/// Memoized routing decisions, keyed by field name
///
/// A cache is only valid for the target list it was filled with.
#[derive(Debug, Default)]
pub struct PrefixCache {
    routes: HashMap<String, Route>,
}

impl PrefixCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    fn route(&mut self, targets: &[SplitTarget], name: &str) -> &Route {
        self.routes
            .entry(name.to_string())
            .or_insert_with(|| resolve_route(targets, name))
    }
}

/// Longest non-empty prefix wins; the first configured target wins a tie
fn resolve_route(targets: &[SplitTarget], name: &str) -> Route {
    let mut best: Option<(usize, usize)> = None;
    for (i, target) in targets.iter().enumerate() {
        let prefix = target.fieldprefix.as_str();
        if prefix.is_empty() || !name.starts_with(prefix) {
            continue;
        }
        if best.map_or(true, |(_, len)| prefix.len() > len) {
            best = Some((i, prefix.len()));
        }
    }

    match best {
        Some((target, len)) => {
            let stripped = &name[len..];
            // a field named exactly like the prefix keeps its name
            let field = if stripped.is_empty() { name } else { stripped };
            Route::Claimed {
                target,
                field: field.to_string(),
            }
        },
        None => Route::Unmatched,
    }
}

/// Split `record` across `targets`
///
/// Unmatched fields go to every catch-all target, or to every target when
/// no catch-all exists. Each output is a fresh record for its target source.
pub fn split(
    targets: &[SplitTarget],
    record: &SslogRecord,
    cache: &mut PrefixCache,
) -> Vec<SslogRecord> {
    let mut per_target: Vec<FieldMap> = vec![FieldMap::new(); targets.len()];
    let catch_all: Vec<usize> = targets
        .iter()
        .enumerate()
        .filter(|(_, t)| t.fieldprefix.is_empty())
        .map(|(i, _)| i)
        .collect();

    for (name, value) in &record.fieldvalues {
        match cache.route(targets, name) {
            Route::Claimed { target, field } => {
                per_target[*target].insert(field.clone(), value.clone());
            },
            Route::Unmatched if catch_all.is_empty() => {
                for fields in per_target.iter_mut() {
                    fields.insert(name.clone(), value.clone());
                }
            },
            Route::Unmatched => {
                for &i in &catch_all {
                    per_target[i].insert(name.clone(), value.clone());
                }
            },
        }
    }

    targets
        .iter()
        .zip(per_target)
        .filter_map(|(target, fields)| {
            if fields.is_empty() {
                debug!("{}: no fields for split target", target.source);
                return None;
            }

            let counter = match &target.counterfield {
                Some(name) => match fields.get(name) {
                    Some(fv) => Some(coerce_counter(&fv.value, &target.source)),
                    None => {
                        warn!(
                            "{}: dropping record {} without counter field '{}'",
                            target.source, record.id, name
                        );
                        return None;
                    },
                },
                None => record.counter.clone(),
            };

            let mut out = record.derive(&target.source, fields);
            out.counter = counter;
            Some(out)
        })
        .collect()
}
