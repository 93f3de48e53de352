use std::time::{Duration, Instant};

use serde::Serialize;

use crate::{Database, DbError};

pub const DEFAULT_ANOMALY_THRESHOLD: f64 = 3.0;

/// Summary of observed query latencies, in seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LatencyBaseline {
    pub mean: f64,
    pub median: f64,
    pub max: f64,
}

/// Time a single run of `sql`, including fetching every row.
pub async fn sample_query_latency(db: &mut dyn Database, sql: &str) -> Result<Duration, DbError> {
    let start = Instant::now();
    db.get_results(sql).await?;
    Ok(start.elapsed())
}

pub fn compute_baseline(samples: &[f64]) -> LatencyBaseline {
    if samples.is_empty() {
        return LatencyBaseline::default();
    }

    let mut sorted = samples.to_vec();
    sorted.sort_by(f64::total_cmp);

    let n = sorted.len();
    #[allow(clippy::cast_precision_loss)]
    let mean = sorted.iter().sum::<f64>() / n as f64;
    let median = if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    };

    LatencyBaseline {
        mean,
        median,
        max: sorted[n - 1],
    }
}

/// Flags `current` when it exceeds `threshold` times the baseline mean.
pub fn detect_anomaly(current: f64, baseline: &LatencyBaseline, threshold: f64) -> (bool, String) {
    if baseline.mean <= 0.0 {
        return (false, "baseline not established".to_string());
    }
    if current > threshold * baseline.mean {
        return (
            true,
            format!(
                "latency {current:.3}s > {threshold:.1}x baseline mean ({:.3}s)",
                baseline.mean
            ),
        );
    }
    (false, "ok".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{QueryPolicy, SqliteDatabase};

    #[test]
    fn empty_samples_give_zero_baseline() {
        assert_eq!(compute_baseline(&[]), LatencyBaseline::default());
    }

    #[test]
    fn odd_count_median_is_middle_value() {
        let baseline = compute_baseline(&[0.3, 0.1, 0.2]);
        assert!((baseline.mean - 0.2).abs() < 1e-9);
        assert!((baseline.median - 0.2).abs() < 1e-9);
        assert!((baseline.max - 0.3).abs() < 1e-9);
    }

    #[test]
    fn even_count_median_averages_middle_pair() {
        let baseline = compute_baseline(&[4.0, 1.0, 3.0, 2.0]);
        assert!((baseline.median - 2.5).abs() < 1e-9);
        assert!((baseline.mean - 2.5).abs() < 1e-9);
        assert!((baseline.max - 4.0).abs() < 1e-9);
    }

    #[test]
    fn anomaly_needs_a_baseline() {
        let (flagged, reason) = detect_anomaly(10.0, &LatencyBaseline::default(), 3.0);
        assert!(!flagged);
        assert_eq!(reason, "baseline not established");
    }

    #[test]
    fn anomaly_above_threshold() {
        let baseline = compute_baseline(&[0.01, 0.01]);

        let (flagged, reason) = detect_anomaly(0.05, &baseline, DEFAULT_ANOMALY_THRESHOLD);
        assert!(flagged);
        assert_eq!(reason, "latency 0.050s > 3.0x baseline mean (0.010s)");

        assert_eq!(
            detect_anomaly(0.02, &baseline, DEFAULT_ANOMALY_THRESHOLD),
            (false, "ok".to_string())
        );
    }

    #[tokio::test]
    async fn samples_a_real_query() {
        let mut db = SqliteDatabase::in_memory(QueryPolicy::ReadOnly).await.unwrap();
        let elapsed = sample_query_latency(&mut db, "SELECT 1").await.unwrap();
        assert!(elapsed < Duration::from_secs(5));
    }
}
