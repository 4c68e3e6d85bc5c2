//! Technical indicator calculations on daily series
//!
//! All functions take columns ordered oldest first and never pad missing
//! observations: a window that does not fit the data yields `None` (or an
//! empty series) instead of a made-up number.

use super::bundle::ChipBucket;
use crate::utils::round_to;

/// Simple moving average of the latest `period` closes
///
/// `None` when the window does not fit.
pub fn latest_sma(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period {
        return None;
    }
    let window = &closes[closes.len() - period..];
    Some(window.iter().sum::<f64>() / period as f64)
}

/// Exponential moving average seeded with the first observation
///
/// Uses `alpha = 2 / (period + 1)` and the recursive form
/// `ema[i] = alpha * x[i] + (1 - alpha) * ema[i - 1]`.
pub fn calculate_ema(values: &[f64], period: usize) -> Vec<f64> {
    if values.is_empty() || period == 0 {
        return Vec::new();
    }

    let alpha = 2.0 / (period as f64 + 1.0);
    let mut ema = Vec::with_capacity(values.len());
    let mut prev = values[0];
    ema.push(prev);

    for &value in &values[1..] {
        prev = alpha * value + (1.0 - alpha) * prev;
        ema.push(prev);
    }

    ema
}

/// MACD lines aligned with the input series
#[derive(Debug, Clone, PartialEq)]
pub struct MacdSeries {
    /// Fast line: EMA(fast) - EMA(slow)
    pub dif: Vec<f64>,
    /// Signal line: EMA(signal) of the fast line
    pub dea: Vec<f64>,
    /// 2 * (dif - dea)
    pub histogram: Vec<f64>,
}

/// Calculate MACD (fast line, signal line, histogram)
pub fn calculate_macd(closes: &[f64], fast: usize, slow: usize, signal: usize) -> MacdSeries {
    let ema_fast = calculate_ema(closes, fast);
    let ema_slow = calculate_ema(closes, slow);

    let dif: Vec<f64> = ema_fast
        .iter()
        .zip(ema_slow.iter())
        .map(|(f, s)| f - s)
        .collect();
    let dea = calculate_ema(&dif, signal);
    let histogram = dif
        .iter()
        .zip(dea.iter())
        .map(|(d, e)| 2.0 * (d - e))
        .collect();

    MacdSeries { dif, dea, histogram }
}

/// Highest high and lowest low over the trailing `lookback` observations
pub fn rolling_extremes(highs: &[f64], lows: &[f64], lookback: usize) -> Option<(f64, f64)> {
    if lookback == 0 || highs.len() < lookback || lows.len() < lookback {
        return None;
    }

    let high = highs[highs.len() - lookback..]
        .iter()
        .copied()
        .fold(f64::MIN, f64::max);
    let low = lows[lows.len() - lookback..]
        .iter()
        .copied()
        .fold(f64::MAX, f64::min);

    Some((high, low))
}

/// Price-residency histogram over the trailing `lookback` closes
///
/// The closing-price range is split into `buckets` equal-width bins; each
/// bin reports the fraction of observations that fell in it, rounded to 4
/// decimals independently. The top edge belongs to the last bin. A flat
/// range (max == min) puts every observation in the first bin.
pub fn chip_distribution(closes: &[f64], lookback: usize, buckets: usize) -> Option<Vec<ChipBucket>> {
    if buckets == 0 || lookback == 0 || closes.len() < lookback {
        return None;
    }

    let window = &closes[closes.len() - lookback..];
    let min = window.iter().copied().fold(f64::MAX, f64::min);
    let max = window.iter().copied().fold(f64::MIN, f64::max);
    let width = (max - min) / buckets as f64;

    let mut counts = vec![0usize; buckets];
    for &close in window {
        let idx = if width > 0.0 {
            (((close - min) / width).floor() as usize).min(buckets - 1)
        } else {
            0
        };
        counts[idx] += 1;
    }

    let total = window.len() as f64;
    let distribution = counts
        .iter()
        .enumerate()
        .map(|(i, &count)| ChipBucket {
            price_low: round_to(min + width * i as f64, 3),
            price_high: round_to(min + width * (i + 1) as f64, 3),
            ratio: round_to(count as f64 / total, 4),
        })
        .collect();

    Some(distribution)
}

/// Coefficient of variation of the trailing `lookback` volumes
///
/// Sample standard deviation divided by the mean. `None` when the window
/// does not fit or the mean volume is zero.
pub fn volume_dispersion(volumes: &[f64], lookback: usize) -> Option<f64> {
    if lookback < 2 || volumes.len() < lookback {
        return None;
    }

    let window = &volumes[volumes.len() - lookback..];
    let n = window.len() as f64;
    let mean = window.iter().sum::<f64>() / n;
    if mean == 0.0 {
        return None;
    }

    let variance = window.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    Some(variance.sqrt() / mean)
}

/// Percentage gain between the latest close and the close `sessions` bars ago
///
/// `None` when the series has `sessions` or fewer observations, or the base
/// close is not positive.
pub fn percent_gain(closes: &[f64], sessions: usize) -> Option<f64> {
    if sessions == 0 || closes.len() <= sessions {
        return None;
    }

    let latest = closes[closes.len() - 1];
    let base = closes[closes.len() - 1 - sessions];
    if base <= 0.0 {
        return None;
    }

    Some((latest - base) / base)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latest_sma() {
        let closes = vec![10.0, 11.0, 12.0, 13.0, 14.0, 15.0];
        assert_eq!(latest_sma(&closes, 3), Some(14.0));
        assert_eq!(latest_sma(&closes, 6), Some(12.5));
        assert_eq!(latest_sma(&closes, 7), None);
    }

    #[test]
    fn test_calculate_ema() {
        let ema = calculate_ema(&[10.0, 20.0, 30.0], 3);
        // alpha = 0.5
        assert_eq!(ema, vec![10.0, 15.0, 22.5]);
        assert!(calculate_ema(&[], 3).is_empty());
    }

    #[test]
    fn test_macd_flat_series_is_zero() {
        let closes = vec![12.5; 60];
        let macd = calculate_macd(&closes, 12, 26, 9);
        assert_eq!(macd.dif.len(), 60);
        assert!(macd.dif.iter().all(|v| v.abs() < 1e-12));
        assert!(macd.histogram.iter().all(|v| v.abs() < 1e-12));
    }

    #[test]
    fn test_macd_uptrend_positive() {
        let closes: Vec<f64> = (0..80).map(|i| 10.0 + i as f64 * 0.1).collect();
        let macd = calculate_macd(&closes, 12, 26, 9);
        let last = closes.len() - 1;
        assert!(macd.dif[last] > 0.0);
        assert!((macd.histogram[last] - 2.0 * (macd.dif[last] - macd.dea[last])).abs() < 1e-12);
    }

    #[test]
    fn test_rolling_extremes() {
        let highs = vec![5.0, 9.0, 7.0, 6.0];
        let lows = vec![1.0, 3.0, 2.0, 4.0];
        assert_eq!(rolling_extremes(&highs, &lows, 3), Some((9.0, 2.0)));
        assert_eq!(rolling_extremes(&highs, &lows, 5), None);
    }

    #[test]
    fn test_chip_distribution_sums_to_one() {
        let closes: Vec<f64> = (0..150).map(|i| 10.0 + ((i * 7) % 23) as f64 * 0.37).collect();
        let chips = chip_distribution(&closes, 120, 10).unwrap();

        assert_eq!(chips.len(), 10);
        let sum: f64 = chips.iter().map(|c| c.ratio).sum();
        assert!((sum - 1.0).abs() < 0.001, "sum was {}", sum);
        assert!(chips.windows(2).all(|w| w[0].price_high <= w[1].price_high));
    }

    #[test]
    fn test_chip_distribution_top_edge_in_last_bucket() {
        let closes: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let chips = chip_distribution(&closes, 10, 10).unwrap();
        // 0..=9 with width 0.9: one close per bin, the maximum included
        assert_eq!(chips[9].ratio, 0.1);
        assert!(chips.iter().all(|c| c.ratio == 0.1));
    }

    #[test]
    fn test_chip_distribution_flat_range() {
        let closes = vec![8.8; 120];
        let chips = chip_distribution(&closes, 120, 10).unwrap();
        assert_eq!(chips[0].ratio, 1.0);
        assert!(chips[1..].iter().all(|c| c.ratio == 0.0));
    }

    #[test]
    fn test_chip_distribution_short_series() {
        assert!(chip_distribution(&[1.0, 2.0], 120, 10).is_none());
    }

    #[test]
    fn test_volume_dispersion() {
        // mean 5, sample variance 20/3
        let cv = volume_dispersion(&[2.0, 4.0, 6.0, 8.0], 4).unwrap();
        assert!((cv - (20.0f64 / 3.0).sqrt() / 5.0).abs() < 1e-12);

        assert_eq!(volume_dispersion(&[0.0; 10], 10), None);
        assert_eq!(volume_dispersion(&[1.0; 3], 10), None);
    }

    #[test]
    fn test_percent_gain() {
        let closes = vec![10.0, 11.0, 12.0];
        assert_eq!(percent_gain(&closes, 2), Some(0.2));
        assert_eq!(percent_gain(&closes, 3), None);
        assert_eq!(percent_gain(&[0.0, 1.0], 1), None);
    }
}
