//! Live token value tracking for the chart display
//!
//! Observes spawn/score/despawn and keeps a fixed-length rolling series of
//! the total score held by tokens still on the board.

use std::collections::{BTreeMap, VecDeque};

use super::pool::TokenId;
use crate::finite_or_zero;
use crate::settings::MarketSettings;

/// Rolling total-value series
#[derive(Debug, Clone)]
pub struct ScoreAggregator {
    live: BTreeMap<TokenId, u32>,
    series: VecDeque<f32>,
    resolution: usize,
    chart_max: f32,
}

impl ScoreAggregator {
    pub fn new(settings: &MarketSettings) -> Self {
        let resolution = settings.chart_resolution.max(1);
        Self {
            live: BTreeMap::new(),
            series: std::iter::repeat_n(0.0, resolution).collect(),
            resolution,
            chart_max: settings.chart_max,
        }
    }

    pub fn on_token_spawned(&mut self, id: TokenId) {
        self.live.insert(id, 0);
    }

    /// Record a token's new score; lower values are ignored
    pub fn on_token_scored(&mut self, id: TokenId, score: u32) {
        if let Some(current) = self.live.get_mut(&id) {
            *current = (*current).max(score);
        }
    }

    /// Stop tracking a token; returns its last known score
    pub fn on_token_despawned(&mut self, id: TokenId) -> Option<u32> {
        self.live.remove(&id)
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    /// Sum of live token scores right now
    pub fn total_value(&self) -> u64 {
        self.live.values().map(|&s| s as u64).sum()
    }

    /// Shift the series left and append the current total
    pub fn recalc(&mut self) -> u64 {
        let total = self.total_value();
        if self.series.len() >= self.resolution {
            self.series.pop_front();
        }
        self.series.push_back(total as f32);
        total
    }

    /// Raw totals, oldest first
    pub fn series(&self) -> Vec<f32> {
        self.series.iter().copied().collect()
    }

    /// Totals divided by the chart maximum (0 when the maximum is unusable)
    pub fn normalized_series(&self) -> Vec<f32> {
        self.series
            .iter()
            .map(|&v| finite_or_zero(v / self.chart_max))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(slot: u32) -> TokenId {
        TokenId {
            slot,
            generation: 0,
        }
    }

    #[test]
    fn test_series_is_fixed_length_and_shifts() {
        let settings = MarketSettings {
            chart_resolution: 3,
            ..MarketSettings::default()
        };
        let mut agg = ScoreAggregator::new(&settings);
        assert_eq!(agg.series(), vec![0.0, 0.0, 0.0]);

        agg.on_token_spawned(id(0));
        agg.on_token_scored(id(0), 2);
        assert_eq!(agg.recalc(), 2);
        agg.on_token_spawned(id(1));
        agg.on_token_scored(id(1), 5);
        assert_eq!(agg.recalc(), 7);
        assert_eq!(agg.series(), vec![0.0, 2.0, 7.0]);

        agg.on_token_despawned(id(0));
        agg.recalc();
        assert_eq!(agg.series(), vec![2.0, 7.0, 5.0]);
    }

    #[test]
    fn test_empty_board_totals_zero() {
        let mut agg = ScoreAggregator::new(&MarketSettings::default());
        assert_eq!(agg.recalc(), 0);
        assert!(agg.normalized_series().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_zero_chart_max_normalizes_to_zero() {
        let settings = MarketSettings {
            chart_max: 0.0,
            ..MarketSettings::default()
        };
        let mut agg = ScoreAggregator::new(&settings);
        agg.on_token_spawned(id(0));
        agg.on_token_scored(id(0), 10);
        agg.recalc();
        assert!(agg.normalized_series().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_scores_never_decrease() {
        let mut agg = ScoreAggregator::new(&MarketSettings::default());
        agg.on_token_spawned(id(0));
        agg.on_token_scored(id(0), 4);
        agg.on_token_scored(id(0), 1);
        assert_eq!(agg.total_value(), 4);
        // Unknown tokens are ignored
        agg.on_token_scored(id(9), 100);
        assert_eq!(agg.total_value(), 4);
        assert_eq!(agg.on_token_despawned(id(0)), Some(4));
        assert_eq!(agg.on_token_despawned(id(0)), None);
    }
}
