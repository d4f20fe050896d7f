//! Rule-based selection of the next tracked set
//!
//! ## Algorithm
//!
//! 1. Pinned and held instruments always pass through
//! 2. Remaining candidates are filtered on liquidity and volatility
//! 3. Survivors are classified Momentum / Dip
//! 4. Up to `max_momentum` Momentum picks (change desc), then up to
//!    `max_dip` Dip picks (volatility desc) among those not already picked
//! 5. Union in priority order pinned → held → Momentum → Dip, capped at
//!    `max_tracked` without ever dropping pinned or held
//!
//! Ranking ties break on larger 24h traded value, then on instrument key,
//! so the same inputs always produce the same set.

use super::rules::{CandidateStats, Category, SelectionRules};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Result of a selection run, with the per-category detail
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct SelectionOutcome {
    /// Next tracked set
    pub selected: BTreeSet<String>,
    /// Momentum picks that made it into `selected`, in rank order
    pub momentum: Vec<String>,
    /// Dip picks that made it into `selected`, in rank order
    pub dip: Vec<String>,
    /// Every filtered candidate qualifying as Momentum, ranked
    pub momentum_all: Vec<String>,
    /// Every filtered candidate qualifying as Dip, ranked
    pub dip_all: Vec<String>,
    /// Non-pinned, non-held candidates passing the filter
    pub filtered_count: usize,
    pub total_candidates: usize,
}

struct Ranked<'a> {
    instrument: &'a str,
    change: f64,
    volatility: f64,
    value_traded: f64,
}

fn rank_by<'a>(items: &mut [Ranked<'a>], key: impl Fn(&Ranked<'a>) -> f64) {
    items.sort_by(|a, b| {
        key(b)
            .total_cmp(&key(a))
            .then_with(|| b.value_traded.total_cmp(&a.value_traded))
            .then_with(|| a.instrument.cmp(b.instrument))
    });
}

/// Select with the default thresholds
pub fn select(
    candidates: &BTreeMap<String, CandidateStats>,
    held: &BTreeSet<String>,
    pinned: &BTreeSet<String>,
) -> SelectionOutcome {
    select_with(&SelectionRules::default(), candidates, held, pinned)
}

pub fn select_with(
    rules: &SelectionRules,
    candidates: &BTreeMap<String, CandidateStats>,
    held: &BTreeSet<String>,
    pinned: &BTreeSet<String>,
) -> SelectionOutcome {
    let mut momentum_ranked = Vec::new();
    let mut dip_ranked = Vec::new();
    let mut filtered_count = 0;

    for (instrument, stats) in candidates {
        if pinned.contains(instrument) || held.contains(instrument) {
            continue;
        }
        if !rules.passes_filter(stats) {
            continue;
        }
        filtered_count += 1;

        // passes_filter guarantees every field is present
        let (Some(change), Some(volatility), Some(value_traded)) =
            (stats.change_rate, stats.volatility, stats.value_traded_24h)
        else {
            continue;
        };

        for category in rules.categories(stats) {
            let ranked = Ranked {
                instrument: instrument.as_str(),
                change,
                volatility,
                value_traded,
            };
            match category {
                Category::Momentum => momentum_ranked.push(ranked),
                Category::Dip => dip_ranked.push(ranked),
            }
        }
    }

    rank_by(&mut momentum_ranked, |r| r.change);
    rank_by(&mut dip_ranked, |r| r.volatility);

    let momentum_picks: Vec<&str> = momentum_ranked
        .iter()
        .take(rules.max_momentum)
        .map(|r| r.instrument)
        .collect();
    let dip_picks: Vec<&str> = dip_ranked
        .iter()
        .map(|r| r.instrument)
        .filter(|instrument| !momentum_picks.contains(instrument))
        .take(rules.max_dip)
        .collect();

    // Union in priority order
    let mut selected: BTreeSet<String> = pinned.iter().chain(held.iter()).cloned().collect();
    let mut momentum = Vec::new();
    let mut dip = Vec::new();

    for instrument in &momentum_picks {
        if selected.len() >= rules.max_tracked {
            break;
        }
        if selected.insert(instrument.to_string()) {
            momentum.push(instrument.to_string());
        }
    }
    for instrument in &dip_picks {
        if selected.len() >= rules.max_tracked {
            break;
        }
        if selected.insert(instrument.to_string()) {
            dip.push(instrument.to_string());
        }
    }

    let outcome = SelectionOutcome {
        selected,
        momentum,
        dip,
        momentum_all: momentum_ranked.iter().map(|r| r.instrument.to_string()).collect(),
        dip_all: dip_ranked.iter().map(|r| r.instrument.to_string()).collect(),
        filtered_count,
        total_candidates: candidates.len(),
    };

    log::info!(
        "🎯 Selection: {} tracked (pinned {}, held {}, momentum {}/{}, dip {}/{}), {}/{} passed filter",
        outcome.selected.len(),
        pinned.len(),
        held.len(),
        outcome.momentum.len(),
        outcome.momentum_all.len(),
        outcome.dip.len(),
        outcome.dip_all.len(),
        outcome.filtered_count,
        outcome.total_candidates
    );

    outcome
}
