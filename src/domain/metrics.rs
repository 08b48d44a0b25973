//! Performance statistics over a chained portfolio sequence.

use crate::domain::calendar::Interval;
use crate::domain::portfolio::EquityPoint;
use crate::domain::sequence::PortfolioSequence;

#[derive(Debug, Clone, PartialEq)]
pub struct SequenceMetrics {
    pub total_return: f64,
    pub annualized_return: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub max_drawdown: f64,
    /// Longest run of observations spent below a prior peak.
    pub max_drawdown_duration: i64,
    pub rebalances: usize,
    pub skipped_periods: usize,
    pub non_converged: usize,
    pub observations: usize,
}

impl SequenceMetrics {
    /// `risk_free_rate` is per observation, matching the optimizer objective.
    pub fn compute(sequence: &PortfolioSequence, interval: Interval, risk_free_rate: f64) -> Self {
        let curve = sequence.equity_curve(1.0);
        let returns: Vec<f64> = sequence.realized_returns().map(|r| r.value).collect();

        let final_equity = curve.last().map(|p| p.equity).unwrap_or(1.0);
        let total_return = final_equity - 1.0;

        let periods_per_year = interval.periods_per_year();
        let years = returns.len() as f64 / periods_per_year;
        let annualized_return = if years > 0.0 && total_return > -1.0 {
            (1.0 + total_return).powf(1.0 / years) - 1.0
        } else {
            0.0
        };

        let (max_drawdown, max_drawdown_duration) = compute_drawdown(&curve, 1.0);
        let (sharpe_ratio, sortino_ratio) =
            compute_risk_adjusted(&returns, risk_free_rate, periods_per_year);

        SequenceMetrics {
            total_return,
            annualized_return,
            sharpe_ratio,
            sortino_ratio,
            max_drawdown,
            max_drawdown_duration,
            rebalances: sequence.len(),
            skipped_periods: sequence.skipped().len(),
            non_converged: sequence.non_converged().count(),
            observations: returns.len(),
        }
    }
}

fn compute_drawdown(equity_curve: &[EquityPoint], initial: f64) -> (f64, i64) {
    let mut peak = initial;
    let mut max_dd = 0.0_f64;
    let mut max_dd_duration = 0i64;
    let mut current_dd_duration = 0i64;

    for point in equity_curve {
        if point.equity >= peak {
            peak = point.equity;
            current_dd_duration = 0;
        } else if peak > 0.0 {
            let dd = (peak - point.equity) / peak;
            max_dd = max_dd.max(dd);
            current_dd_duration += 1;
            max_dd_duration = max_dd_duration.max(current_dd_duration);
        }
    }

    (max_dd, max_dd_duration)
}

fn compute_risk_adjusted(returns: &[f64], rf: f64, periods_per_year: f64) -> (f64, f64) {
    if returns.len() < 2 {
        return (0.0, 0.0);
    }

    let n = returns.len() as f64;
    let mean: f64 = returns.iter().sum::<f64>() / n;
    let variance: f64 = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    let stddev = variance.sqrt();
    let excess_return = mean - rf;
    let scale = periods_per_year.sqrt();

    let sharpe = if stddev > 0.0 {
        excess_return / stddev * scale
    } else {
        0.0
    };

    let downside: f64 = returns
        .iter()
        .filter(|&&r| r < rf)
        .map(|&r| (r - rf).powi(2))
        .sum();
    let downside_stddev = (downside / n).sqrt();

    let sortino = if downside_stddev > 0.0 {
        excess_return / downside_stddev * scale
    } else {
        0.0
    };

    (sharpe, sortino)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn make_equity_curve(values: &[f64]) -> Vec<EquityPoint> {
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| EquityPoint {
                date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
                    + chrono::Duration::days(i as i64),
                equity: v,
            })
            .collect()
    }

    #[test]
    fn empty_sequence_metrics() {
        let metrics = SequenceMetrics::compute(&PortfolioSequence::default(), Interval::Daily, 0.0);
        assert_eq!(metrics.total_return, 0.0);
        assert_eq!(metrics.annualized_return, 0.0);
        assert_eq!(metrics.rebalances, 0);
        assert_eq!(metrics.observations, 0);
    }

    #[test]
    fn max_drawdown_from_peak() {
        let curve = make_equity_curve(&[1.0, 1.1, 0.9, 0.95, 0.8, 1.0]);
        let (dd, duration) = compute_drawdown(&curve, 1.0);
        assert!((dd - (1.1 - 0.8) / 1.1).abs() < 1e-9);
        assert_eq!(duration, 4);
    }

    #[test]
    fn drawdown_counts_from_initial_capital() {
        let curve = make_equity_curve(&[0.9, 0.95]);
        let (dd, duration) = compute_drawdown(&curve, 1.0);
        assert!((dd - 0.1).abs() < 1e-9);
        assert_eq!(duration, 2);
    }

    #[test]
    fn sharpe_positive_for_steady_gains() {
        let returns: Vec<f64> = (0..100).map(|i| 0.001 + 0.0001 * (i % 3) as f64).collect();
        let (sharpe, sortino) = compute_risk_adjusted(&returns, 0.0, 252.0);
        assert!(sharpe > 0.0);
        // no downside observations
        assert_eq!(sortino, 0.0);
    }

    #[test]
    fn sortino_finite_with_losses() {
        let returns = [0.01, -0.005, 0.01, -0.015, 0.02];
        let (sharpe, sortino) = compute_risk_adjusted(&returns, 0.0, 252.0);
        assert!(sharpe.is_finite());
        assert!(sortino.is_finite());
        assert!(sortino > sharpe);
    }
}
