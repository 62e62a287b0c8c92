use crate::domain::{SkuYearRange, YearOverlap};

const MARGIN_STEEPNESS: f64 = 8.0;

pub fn year_overlap(range: &SkuYearRange, year: Option<i32>) -> YearOverlap {
    match year {
        None => YearOverlap::Unknown,
        Some(year) if range.contains(year) => YearOverlap::Within,
        Some(_) => YearOverlap::Outside,
    }
}

pub fn year_factor(overlap: YearOverlap) -> f64 {
    match overlap {
        YearOverlap::Within => 1.0,
        YearOverlap::Unknown => 0.85,
        YearOverlap::Outside => 0.6,
    }
}

/// Non-decreasing in both `margin` and `evidence_z`.
pub fn calibrate(margin: f64, evidence_z: f64, overlap: YearOverlap) -> f64 {
    let separation = logistic(MARGIN_STEEPNESS * margin);
    let support = logistic(evidence_z);
    (year_factor(overlap) * (0.5 * separation + 0.5 * support)).clamp(0.0, 1.0)
}

/// Population z-scores; a distribution without spread scores zero everywhere.
pub fn z_scores(values: &[f64]) -> Vec<f64> {
    if values.is_empty() {
        return Vec::new();
    }
    let count = values.len() as f64;
    let mean = values.iter().sum::<f64>() / count;
    let variance = values.iter().map(|value| (value - mean).powi(2)).sum::<f64>() / count;
    let deviation = variance.sqrt();
    if deviation <= f64::EPSILON {
        return vec![0.0; values.len()];
    }
    values.iter().map(|value| (value - mean) / deviation).collect()
}

fn logistic(value: f64) -> f64 {
    1.0 / (1.0 + (-value).exp())
}

#[cfg(test)]
mod tests {
    use super::{calibrate, year_overlap, z_scores};
    use crate::domain::{SkuYearRange, YearOverlap};

    #[test]
    fn overlap_classifies_query_year() {
        let range = SkuYearRange { count: 3, start_year: 2018, end_year: 2021 };

        assert_eq!(year_overlap(&range, Some(2019)), YearOverlap::Within);
        assert_eq!(year_overlap(&range, Some(2024)), YearOverlap::Outside);
        assert_eq!(year_overlap(&range, None), YearOverlap::Unknown);
    }

    #[test]
    fn confidence_orders_year_overlap() {
        let within = calibrate(0.2, 0.5, YearOverlap::Within);
        let unknown = calibrate(0.2, 0.5, YearOverlap::Unknown);
        let outside = calibrate(0.2, 0.5, YearOverlap::Outside);

        assert!(within > unknown && unknown > outside);
        assert!((0.0..=1.0).contains(&within));
    }

    #[test]
    fn confidence_never_drops_with_more_margin_or_evidence() {
        let mut previous = 0.0;
        for step in -10..=10 {
            let value = calibrate(f64::from(step) / 10.0, 0.0, YearOverlap::Within);
            assert!(value >= previous);
            previous = value;
        }
        assert!(calibrate(0.1, 1.5, YearOverlap::Unknown) >= calibrate(0.1, -1.5, YearOverlap::Unknown));
    }

    #[test]
    fn flat_distribution_scores_zero() {
        assert_eq!(z_scores(&[2.0, 2.0, 2.0]), vec![0.0, 0.0, 0.0]);
        let scores = z_scores(&[1.0, 3.0]);
        assert!((scores[0] + 1.0).abs() < 1e-12 && (scores[1] - 1.0).abs() < 1e-12);
        assert!(z_scores(&[]).is_empty());
    }
}
