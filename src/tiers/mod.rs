//! Price tier derivation from quartile cuts.
//!
//! Prices are split into four ordered tiers at the 25th, 50th and 75th
//! percentiles, labeled Economico < Medio < Alto < Premium. Tier boundaries
//! reported to callers are the highest price actually observed in each tier,
//! which is what a catalog browser wants to show.

use crate::error::{PredioError, Result};
use serde::{Deserialize, Serialize};

/// Ordered tier labels, cheapest first.
pub const TIER_LABELS: [&str; 4] = ["Economico", "Medio", "Alto", "Premium"];

/// Quartile-based price tiers for one price column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceTiers {
    /// Cut points at the 25th, 50th and 75th percentiles.
    cuts: [f64; 3],
    /// Tier index (0..4) for each input value, in input order.
    tiers: Vec<usize>,
    /// (label, max observed price) per tier, cheapest first.
    boundaries: Vec<(String, f64)>,
}

impl PriceTiers {
    /// Builds quartile tiers over the given prices.
    ///
    /// Values at or below a cut fall in the lower tier, so a price exactly
    /// on the median lands in Medio.
    ///
    /// # Errors
    ///
    /// Returns a validation error if `prices` is empty or contains a
    /// non-finite value.
    pub fn from_prices(prices: &[f64]) -> Result<Self> {
        if prices.is_empty() {
            return Err(PredioError::validation("cannot derive tiers from zero prices"));
        }
        if prices.iter().any(|p| !p.is_finite()) {
            return Err(PredioError::validation("prices must be finite to derive tiers"));
        }

        let mut sorted = prices.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).expect("finite values always compare"));

        let cuts = [
            quantile_r7(&sorted, 0.25),
            quantile_r7(&sorted, 0.50),
            quantile_r7(&sorted, 0.75),
        ];

        let tiers: Vec<usize> = prices.iter().map(|&p| tier_index(p, &cuts)).collect();

        // Boundary per tier is the max price observed in it; an empty tier
        // falls back to its upper cut (the top tier to the overall max).
        let mut max_in_tier = [f64::NEG_INFINITY; 4];
        for (&price, &tier) in prices.iter().zip(tiers.iter()) {
            if price > max_in_tier[tier] {
                max_in_tier[tier] = price;
            }
        }
        let overall_max = sorted[sorted.len() - 1];
        let boundaries = TIER_LABELS
            .iter()
            .enumerate()
            .map(|(i, label)| {
                let boundary = if max_in_tier[i].is_finite() {
                    max_in_tier[i]
                } else if i < 3 {
                    cuts[i]
                } else {
                    overall_max
                };
                ((*label).to_string(), boundary)
            })
            .collect();

        Ok(Self { cuts, tiers, boundaries })
    }

    /// Quartile cut points.
    #[must_use]
    pub fn cuts(&self) -> &[f64; 3] {
        &self.cuts
    }

    /// Tier index for each input price, in input order.
    #[must_use]
    pub fn tiers(&self) -> &[usize] {
        &self.tiers
    }

    /// Tier label for each input price, in input order.
    #[must_use]
    pub fn labels(&self) -> Vec<&'static str> {
        self.tiers.iter().map(|&t| TIER_LABELS[t]).collect()
    }

    /// (label, max observed price) per tier, cheapest first.
    #[must_use]
    pub fn boundaries(&self) -> &[(String, f64)] {
        &self.boundaries
    }

    /// Tier index for an arbitrary price under the fitted cuts.
    #[must_use]
    pub fn tier_of(&self, price: f64) -> usize {
        tier_index(price, &self.cuts)
    }
}

/// Lowest tier whose cut the price does not exceed.
fn tier_index(price: f64, cuts: &[f64; 3]) -> usize {
    if price <= cuts[0] {
        0
    } else if price <= cuts[1] {
        1
    } else if price <= cuts[2] {
        2
    } else {
        3
    }
}

/// Linear-interpolation quantile (Hyndman and Fan type 7) of sorted data.
fn quantile_r7(sorted: &[f64], p: f64) -> f64 {
    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }
    let h = (n - 1) as f64 * p;
    let lo = h.floor() as usize;
    let hi = (lo + 1).min(n - 1);
    sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantile_r7_known_values() {
        let sorted = [1.0, 2.0, 3.0, 4.0];
        assert!((quantile_r7(&sorted, 0.25) - 1.75).abs() < 1e-9);
        assert!((quantile_r7(&sorted, 0.50) - 2.5).abs() < 1e-9);
        assert!((quantile_r7(&sorted, 0.75) - 3.25).abs() < 1e-9);
    }

    #[test]
    fn test_quantile_single_value() {
        assert_eq!(quantile_r7(&[7.0], 0.25), 7.0);
        assert_eq!(quantile_r7(&[7.0], 0.75), 7.0);
    }

    #[test]
    fn test_tiers_balanced_quarters() {
        let prices: Vec<f64> = (1..=8).map(f64::from).collect();
        let tiers = PriceTiers::from_prices(&prices).unwrap();
        // Each quartile gets two of the eight values.
        for tier in 0..4 {
            let count = tiers.tiers().iter().filter(|&&t| t == tier).count();
            assert_eq!(count, 2, "tier {tier} should hold two values");
        }
    }

    #[test]
    fn test_tiers_labels_ordered() {
        let prices = vec![10.0, 20.0, 30.0, 40.0];
        let tiers = PriceTiers::from_prices(&prices).unwrap();
        assert_eq!(tiers.labels(), vec!["Economico", "Medio", "Alto", "Premium"]);
    }

    #[test]
    fn test_tiers_value_on_cut_goes_lower() {
        let prices = vec![1.0, 2.0, 3.0, 4.0];
        let tiers = PriceTiers::from_prices(&prices).unwrap();
        // Median is 2.5; exactly the median belongs to Medio.
        assert_eq!(tiers.tier_of(2.5), 1);
        assert_eq!(tiers.tier_of(2.6), 2);
    }

    #[test]
    fn test_tier_boundaries_are_observed_maxima() {
        let prices = vec![100.0, 200.0, 300.0, 400.0, 500.0, 600.0, 700.0, 800.0];
        let tiers = PriceTiers::from_prices(&prices).unwrap();
        let boundaries = tiers.boundaries();
        assert_eq!(boundaries[0], ("Economico".to_string(), 200.0));
        assert_eq!(boundaries[3], ("Premium".to_string(), 800.0));
        // Boundaries are non-decreasing from cheapest to priciest tier.
        for pair in boundaries.windows(2) {
            assert!(pair[0].1 <= pair[1].1);
        }
    }

    #[test]
    fn test_tiers_constant_prices() {
        let prices = vec![50.0; 5];
        let tiers = PriceTiers::from_prices(&prices).unwrap();
        // Every cut equals 50, so everything is Economico.
        assert!(tiers.tiers().iter().all(|&t| t == 0));
        assert_eq!(tiers.boundaries()[0].1, 50.0);
    }

    #[test]
    fn test_tiers_reject_empty_and_nan() {
        assert!(PriceTiers::from_prices(&[]).is_err());
        assert!(PriceTiers::from_prices(&[1.0, f64::NAN]).is_err());
    }
}
