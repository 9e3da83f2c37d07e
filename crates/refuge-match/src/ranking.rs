use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use refuge_types::models::{Need, Offer};

use crate::category::categories_match;

/// Cross-matching panels ("offers for your needs").
pub const SUGGESTION_LIMIT: usize = 5;
/// "Recent" panels.
pub const RECENT_LIMIT: usize = 3;

/// Anything that can be ranked against a user's own categories.
pub trait Candidate {
    fn category(&self) -> Option<&str>;
    fn created_at(&self) -> DateTime<Utc>;
}

impl Candidate for Need {
    fn category(&self) -> Option<&str> {
        Some(self.category.as_str())
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl Candidate for Offer {
    fn category(&self) -> Option<&str> {
        Some(self.category.as_str())
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// A candidate plus whether it matched one of the viewer's categories.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ranked<T> {
    #[serde(flatten)]
    pub item: T,
    pub category_match: bool,
}

/// True when `category` is compatible with at least one of `own`.
pub fn matches_any<S: AsRef<str>>(category: Option<&str>, own: &[S]) -> bool {
    own.iter()
        .any(|c| categories_match(category, Some(c.as_ref())))
}

/// Candidates compatible with `own`, newest first, at most `limit`.
pub fn matching_candidates<T, S>(
    own: &[S],
    candidates: impl IntoIterator<Item = T>,
    limit: usize,
) -> Vec<Ranked<T>>
where
    T: Candidate,
    S: AsRef<str>,
{
    let mut kept: Vec<Ranked<T>> = candidates
        .into_iter()
        .filter(|c| matches_any(c.category(), own))
        .map(|item| Ranked {
            item,
            category_match: true,
        })
        .collect();

    sort_ranked(&mut kept);
    kept.truncate(limit);
    kept
}

/// Every candidate, direct category matches first, then newest first,
/// at most `limit`.
pub fn rank_candidates<T, S>(
    own: &[S],
    candidates: impl IntoIterator<Item = T>,
    limit: usize,
) -> Vec<Ranked<T>>
where
    T: Candidate,
    S: AsRef<str>,
{
    let mut ranked: Vec<Ranked<T>> = candidates
        .into_iter()
        .map(|item| {
            let category_match = matches_any(item.category(), own);
            Ranked {
                item,
                category_match,
            }
        })
        .collect();

    sort_ranked(&mut ranked);
    ranked.truncate(limit);
    ranked
}

fn sort_ranked<T: Candidate>(ranked: &mut [Ranked<T>]) {
    ranked.sort_by(|a, b| {
        b.category_match
            .cmp(&a.category_match)
            .then_with(|| b.item.created_at().cmp(&a.item.created_at()))
    });
}
