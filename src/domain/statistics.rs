//! Return statistics over a slice of the log-return table.

use crate::domain::error::RebalancerError;
use crate::domain::series::SeriesTable;

/// Minimum rows for a well-defined sample covariance over `assets` columns.
pub fn minimum_rows(assets: usize) -> usize {
    assets + 1
}

/// Per-asset column means.
pub fn expected_returns(slice: &SeriesTable) -> Vec<f64> {
    let n = slice.len();
    if n == 0 {
        return vec![0.0; slice.asset_count()];
    }
    (0..slice.asset_count())
        .map(|j| slice.column(j).sum::<f64>() / n as f64)
        .collect()
}

/// Sample covariance matrix (n - 1 divisor).
pub fn covariance(slice: &SeriesTable) -> Result<Vec<Vec<f64>>, RebalancerError> {
    let n = slice.len();
    let k = slice.asset_count();
    let minimum = minimum_rows(k);
    if n < minimum {
        return Err(RebalancerError::InsufficientData { rows: n, minimum });
    }

    let means = expected_returns(slice);
    let mut cov = vec![vec![0.0; k]; k];
    for row in slice.rows() {
        for i in 0..k {
            let di = row[i] - means[i];
            for j in i..k {
                cov[i][j] += di * (row[j] - means[j]);
            }
        }
    }
    let denom = (n - 1) as f64;
    for i in 0..k {
        for j in i..k {
            let v = cov[i][j] / denom;
            cov[i][j] = v;
            cov[j][i] = v;
        }
    }
    Ok(cov)
}

/// `wᵀ Σ w`
pub fn portfolio_variance(weights: &[f64], cov: &[Vec<f64>]) -> f64 {
    weights
        .iter()
        .enumerate()
        .map(|(i, wi)| {
            wi * cov[i]
                .iter()
                .zip(weights.iter())
                .map(|(c, wj)| c * wj)
                .sum::<f64>()
        })
        .sum()
}

pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn table(rows: Vec<Vec<f64>>) -> SeriesTable {
        let k = rows.first().map(|r| r.len()).unwrap_or(0);
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let dates = (0..rows.len())
            .map(|i| start + chrono::Duration::days(i as i64))
            .collect();
        let assets = (0..k).map(|i| format!("A{}", i)).collect();
        SeriesTable::new(dates, assets, rows).unwrap()
    }

    #[test]
    fn expected_returns_are_column_means() {
        let t = table(vec![vec![0.01, 0.02], vec![0.03, -0.02], vec![0.02, 0.0]]);
        let mu = expected_returns(&t);
        assert_relative_eq!(mu[0], 0.02, epsilon = 1e-15);
        assert_relative_eq!(mu[1], 0.0, epsilon = 1e-15);
    }

    #[test]
    fn covariance_matches_hand_computation() {
        let t = table(vec![vec![1.0, 2.0], vec![2.0, 4.0], vec![3.0, 6.0]]);
        let cov = covariance(&t).unwrap();
        // var(x) = 1, var(y) = 4, cov = 2 with n - 1 divisor
        assert_relative_eq!(cov[0][0], 1.0);
        assert_relative_eq!(cov[1][1], 4.0);
        assert_relative_eq!(cov[0][1], 2.0);
        assert_relative_eq!(cov[1][0], cov[0][1]);
    }

    #[test]
    fn covariance_needs_assets_plus_one_rows() {
        let t = table(vec![vec![0.01, 0.02, 0.03], vec![0.0, 0.01, 0.02]]);
        let err = covariance(&t).unwrap_err();
        assert!(matches!(
            err,
            RebalancerError::InsufficientData {
                rows: 2,
                minimum: 4
            }
        ));
    }

    #[test]
    fn covariance_is_deterministic() {
        let t = table(vec![
            vec![0.01, -0.02],
            vec![0.005, 0.01],
            vec![-0.003, 0.004],
            vec![0.02, -0.01],
        ]);
        assert_eq!(covariance(&t).unwrap(), covariance(&t).unwrap());
        assert_eq!(expected_returns(&t), expected_returns(&t));
    }

    #[test]
    fn portfolio_variance_of_single_asset() {
        let cov = vec![vec![0.04, 0.0], vec![0.0, 0.09]];
        assert_relative_eq!(portfolio_variance(&[1.0, 0.0], &cov), 0.04);
        assert_relative_eq!(portfolio_variance(&[0.5, 0.5], &cov), 0.0325);
    }

    #[test]
    fn dot_product() {
        assert_relative_eq!(dot(&[1.0, 2.0], &[3.0, 4.0]), 11.0);
    }
}
