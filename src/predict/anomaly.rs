//! Outlier screening on the growth series.
//!
//! One-off spikes such as an acquisition year would otherwise dominate the
//! fit, so growth deltas more than three standard deviations from the mean
//! are excluded from fitting. The excluded points are kept and reported so
//! callers can still display them.

use crate::schema::GrowthAnomaly;

const Z_THRESHOLD: f64 = 3.0;

/// Splits growth deltas into the points used for fitting and the points
/// flagged as anomalous. Needs at least four deltas before screening; with
/// fewer there is no meaningful distribution to stand out from.
pub fn screen_growth(deltas: &[(i32, f64)]) -> (Vec<(i32, f64)>, Vec<GrowthAnomaly>) {
    if deltas.len() < 4 {
        return (deltas.to_vec(), Vec::new());
    }

    let n = deltas.len() as f64;
    let mean = deltas.iter().map(|(_, g)| g).sum::<f64>() / n;
    let var = deltas.iter().map(|(_, g)| (g - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let std = var.sqrt();
    if std == 0.0 {
        return (deltas.to_vec(), Vec::new());
    }

    let mut kept = Vec::new();
    let mut anomalies = Vec::new();
    for &(year, growth) in deltas {
        let z = (growth - mean) / std;
        if z.abs() > Z_THRESHOLD {
            anomalies.push(GrowthAnomaly {
                year,
                growth,
                z_score: z,
            });
        } else {
            kept.push((year, growth));
        }
    }
    (kept, anomalies)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_series_passes_through() {
        let deltas = vec![(2022, 5.0), (2023, 200.0)];
        let (kept, anomalies) = screen_growth(&deltas);
        assert_eq!(kept.len(), 2);
        assert!(anomalies.is_empty());
    }

    #[test]
    fn spike_is_flagged_and_retained_for_display() {
        let mut deltas: Vec<(i32, f64)> = (2010..2023)
            .map(|year| (year, 5.0 + (year % 3) as f64 * 0.5))
            .collect();
        deltas.push((2023, 300.0));
        let (kept, anomalies) = screen_growth(&deltas);
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].year, 2023);
        assert!(anomalies[0].z_score > 3.0);
        assert!(kept.iter().all(|(year, _)| *year != 2023));
    }

    #[test]
    fn uniform_series_has_no_anomalies() {
        let deltas: Vec<(i32, f64)> = (2018..2024).map(|year| (year, 4.0)).collect();
        let (kept, anomalies) = screen_growth(&deltas);
        assert_eq!(kept.len(), deltas.len());
        assert!(anomalies.is_empty());
    }
}
