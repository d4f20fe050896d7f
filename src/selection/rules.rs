//! Selection thresholds and per-candidate classification
//!
//! All rates are ratios: `0.03` means +3%, `0.015` means 1.5%.

use serde::{Deserialize, Serialize};

/// 24h market stats for one candidate instrument
///
/// Any missing field excludes the candidate from filtering.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CandidateStats {
    /// Traded value over the last 24h, in quote currency
    pub value_traded_24h: Option<f64>,
    /// Signed 24h price change ratio
    pub change_rate: Option<f64>,
    /// `(high - low) / price` over the last 24h
    pub volatility: Option<f64>,
}

impl CandidateStats {
    /// Build stats from raw 24h ticker fields
    ///
    /// Volatility is `(high - low) / price`; a non-positive price leaves it
    /// missing.
    pub fn from_ticker(
        value_traded: Option<f64>,
        change_rate: Option<f64>,
        high: Option<f64>,
        low: Option<f64>,
        price: Option<f64>,
    ) -> Self {
        let volatility = match (high, low, price) {
            (Some(high), Some(low), Some(price)) if price > 0.0 => Some((high - low) / price),
            _ => None,
        };

        Self {
            value_traded_24h: value_traded.filter(|v| v.is_finite()),
            change_rate: change_rate.filter(|v| v.is_finite()),
            volatility: volatility.filter(|v| v.is_finite()),
        }
    }
}

/// Category a filtered candidate qualifies for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    /// Strong recent gain
    Momentum,
    /// Shallow pullback with enough movement to trade
    Dip,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionRules {
    pub min_value_traded: f64,
    pub min_volatility: f64,
    pub max_volatility: f64,
    pub momentum_min_change: f64,
    pub dip_min_change: f64,
    pub dip_max_change: f64,
    pub dip_min_volatility: f64,
    pub max_momentum: usize,
    pub max_dip: usize,
    /// Upper bound on the final tracked set (pinned/held may exceed it)
    pub max_tracked: usize,
}

impl Default for SelectionRules {
    fn default() -> Self {
        Self {
            min_value_traded: 1_000_000_000.0,
            min_volatility: 0.01,
            max_volatility: 0.25,
            momentum_min_change: 0.03,
            dip_min_change: -0.06,
            dip_max_change: 0.0,
            dip_min_volatility: 0.015,
            max_momentum: 6,
            max_dip: 6,
            max_tracked: 10,
        }
    }
}

impl SelectionRules {
    /// Liquidity and volatility filter
    pub fn passes_filter(&self, stats: &CandidateStats) -> bool {
        match (stats.value_traded_24h, stats.volatility, stats.change_rate) {
            (Some(value), Some(vol), Some(_)) => {
                value >= self.min_value_traded
                    && vol >= self.min_volatility
                    && vol <= self.max_volatility
            }
            _ => false,
        }
    }

    /// Categories a filtered candidate qualifies for (possibly both, possibly none)
    pub fn categories(&self, stats: &CandidateStats) -> Vec<Category> {
        let (Some(change), Some(vol)) = (stats.change_rate, stats.volatility) else {
            return Vec::new();
        };

        let mut categories = Vec::with_capacity(2);
        if change >= self.momentum_min_change {
            categories.push(Category::Momentum);
        }
        if change >= self.dip_min_change
            && change <= self.dip_max_change
            && vol >= self.dip_min_volatility
        {
            categories.push(Category::Dip);
        }
        categories
    }
}
