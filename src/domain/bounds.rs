//! Allocation bounds and linear constraints fed to the optimizer.
//!
//! Configuration speaks in asset names ([`BoundOverride`], [`ConstraintSpec`]);
//! the solver works on column indices ([`Bound`], [`ConstraintSet`]).

use crate::domain::error::RebalancerError;
use crate::domain::universe::COMMANDS_SECTION;
use std::str::FromStr;

const FEASIBILITY_TOLERANCE: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bound {
    pub lower: f64,
    pub upper: f64,
}

impl Bound {
    pub fn new(lower: f64, upper: f64) -> Self {
        Self { lower, upper }
    }

    pub fn contains(&self, w: f64, tolerance: f64) -> bool {
        w >= self.lower - tolerance && w <= self.upper + tolerance
    }
}

/// Per-asset weight limits derived from the strategy commands.
///
/// With `shorting` on, every asset's default lower bound is `-short_limit`
/// and `long_floor` is not used; per-asset overrides still apply.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundsPolicy {
    pub shorting: bool,
    pub short_limit: f64,
    pub long_floor: f64,
    pub long_ceiling: f64,
}

impl Default for BoundsPolicy {
    fn default() -> Self {
        Self {
            shorting: false,
            short_limit: 0.0,
            long_floor: 0.0,
            long_ceiling: 1.0,
        }
    }
}

impl BoundsPolicy {
    pub fn validate(&self) -> Result<(), RebalancerError> {
        if !self.long_floor.is_finite() || !self.long_ceiling.is_finite() {
            return Err(RebalancerError::config_invalid(
                COMMANDS_SECTION,
                "long_floor",
                "long_floor and long_ceiling must be finite",
            ));
        }
        if self.long_floor > self.long_ceiling {
            return Err(RebalancerError::config_invalid(
                COMMANDS_SECTION,
                "long_floor",
                format!(
                    "long_floor {} exceeds long_ceiling {}",
                    self.long_floor, self.long_ceiling
                ),
            ));
        }
        if !self.shorting && self.long_floor < 0.0 {
            return Err(RebalancerError::config_invalid(
                COMMANDS_SECTION,
                "long_floor",
                "long_floor must be non-negative when shorting is disabled",
            ));
        }
        if !(self.short_limit >= 0.0) {
            return Err(RebalancerError::config_invalid(
                COMMANDS_SECTION,
                "short_limit",
                "short_limit must be non-negative",
            ));
        }
        Ok(())
    }

    /// Lowest weight any single asset may take under this policy.
    pub fn floor(&self) -> f64 {
        if self.shorting {
            -self.short_limit
        } else {
            self.long_floor
        }
    }

    pub fn default_bound(&self) -> Bound {
        Bound::new(self.floor(), self.long_ceiling)
    }
}

/// Explicit bound for a named asset, overriding the policy default.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundOverride {
    pub asset: String,
    pub bound: Bound,
}

/// Parse `ASSET:lo:hi, ASSET:lo:hi`.
pub fn parse_bound_overrides(input: &str) -> Result<Vec<BoundOverride>, String> {
    let mut overrides = Vec::new();
    for token in input.split(',') {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            continue;
        }
        let parts: Vec<&str> = trimmed.split(':').map(str::trim).collect();
        if parts.len() != 3 || parts[0].is_empty() {
            return Err(format!("expected ASSET:lower:upper, got '{}'", trimmed));
        }
        let lower: f64 = parts[1]
            .parse()
            .map_err(|_| format!("invalid lower bound '{}'", parts[1]))?;
        let upper: f64 = parts[2]
            .parse()
            .map_err(|_| format!("invalid upper bound '{}'", parts[2]))?;
        overrides.push(BoundOverride {
            asset: parts[0].to_uppercase(),
            bound: Bound::new(lower, upper),
        });
    }
    Ok(overrides)
}

/// Bounds for every asset in column order.
pub fn resolve_bounds(
    assets: &[String],
    policy: &BoundsPolicy,
    overrides: &[BoundOverride],
) -> Result<Vec<Bound>, RebalancerError> {
    policy.validate()?;
    let mut bounds = vec![policy.default_bound(); assets.len()];

    for o in overrides {
        let idx = assets.iter().position(|a| *a == o.asset).ok_or_else(|| {
            RebalancerError::config_invalid(
                COMMANDS_SECTION,
                "bounds",
                format!("bound given for unknown asset {}", o.asset),
            )
        })?;
        if !o.bound.lower.is_finite() || !o.bound.upper.is_finite() {
            return Err(RebalancerError::config_invalid(
                COMMANDS_SECTION,
                "bounds",
                format!("bounds for {} must be finite", o.asset),
            ));
        }
        if o.bound.lower > o.bound.upper {
            return Err(RebalancerError::config_invalid(
                COMMANDS_SECTION,
                "bounds",
                format!("lower bound exceeds upper bound for {}", o.asset),
            ));
        }
        if o.bound.lower < policy.floor() {
            return Err(RebalancerError::config_invalid(
                COMMANDS_SECTION,
                "bounds",
                format!(
                    "lower bound {} for {} is below the allowed floor {}",
                    o.bound.lower,
                    o.asset,
                    policy.floor()
                ),
            ));
        }
        bounds[idx] = o.bound;
    }
    Ok(bounds)
}

/// `Σ w[assets] <= cap`, by asset name.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupCapSpec {
    pub assets: Vec<String>,
    pub cap: f64,
}

/// Constraint instructions as written in the universe file.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintSpec {
    pub budget: f64,
    pub group_caps: Vec<GroupCapSpec>,
}

impl Default for ConstraintSpec {
    fn default() -> Self {
        Self {
            budget: 1.0,
            group_caps: Vec::new(),
        }
    }
}

impl FromStr for ConstraintSpec {
    type Err = String;

    /// `budget=1.0;cap=AAA+BBB:0.6`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut spec = ConstraintSpec::default();
        for clause in s.split(';') {
            let clause = clause.trim();
            if clause.is_empty() {
                continue;
            }
            let (key, value) = clause
                .split_once('=')
                .ok_or_else(|| format!("expected key=value, got '{}'", clause))?;
            match key.trim().to_lowercase().as_str() {
                "budget" => {
                    spec.budget = value
                        .trim()
                        .parse()
                        .map_err(|_| format!("invalid budget '{}'", value.trim()))?;
                }
                "cap" => {
                    let (group, cap) = value
                        .rsplit_once(':')
                        .ok_or_else(|| format!("expected ASSET+ASSET:max, got '{}'", value))?;
                    let assets: Vec<String> = group
                        .split('+')
                        .map(|a| a.trim().to_uppercase())
                        .filter(|a| !a.is_empty())
                        .collect();
                    if assets.is_empty() {
                        return Err(format!("cap '{}' names no assets", value));
                    }
                    let cap: f64 = cap
                        .trim()
                        .parse()
                        .map_err(|_| format!("invalid cap '{}'", cap.trim()))?;
                    spec.group_caps.push(GroupCapSpec { assets, cap });
                }
                other => return Err(format!("unknown constraint '{}'", other)),
            }
        }
        Ok(spec)
    }
}

/// `Σ w[indices] <= cap`
#[derive(Debug, Clone, PartialEq)]
pub struct GroupCap {
    pub indices: Vec<usize>,
    pub cap: f64,
}

/// Solver-facing constraint set: a budget equality plus optional group caps.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintSet {
    pub budget: f64,
    pub group_caps: Vec<GroupCap>,
}

impl Default for ConstraintSet {
    fn default() -> Self {
        Self {
            budget: 1.0,
            group_caps: Vec::new(),
        }
    }
}

impl ConstraintSet {
    /// Largest violation of any constraint by `weights`.
    pub fn max_violation(&self, weights: &[f64]) -> f64 {
        let budget = (weights.iter().sum::<f64>() - self.budget).abs();
        self.group_caps
            .iter()
            .map(|g| (g.indices.iter().map(|&i| weights[i]).sum::<f64>() - g.cap).max(0.0))
            .fold(budget, f64::max)
    }
}

impl ConstraintSpec {
    pub fn resolve(&self, assets: &[String]) -> Result<ConstraintSet, RebalancerError> {
        if !self.budget.is_finite() {
            return Err(RebalancerError::config_invalid(
                COMMANDS_SECTION,
                "constraints",
                "budget must be finite",
            ));
        }
        let group_caps = self
            .group_caps
            .iter()
            .map(|g| {
                let indices = g
                    .assets
                    .iter()
                    .map(|name| {
                        assets.iter().position(|a| a == name).ok_or_else(|| {
                            RebalancerError::config_invalid(
                                COMMANDS_SECTION,
                                "constraints",
                                format!("cap names unknown asset {}", name),
                            )
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                if !g.cap.is_finite() {
                    return Err(RebalancerError::config_invalid(
                        COMMANDS_SECTION,
                        "constraints",
                        format!("cap for {} must be finite", g.assets.join("+")),
                    ));
                }
                Ok(GroupCap {
                    indices,
                    cap: g.cap,
                })
            })
            .collect::<Result<Vec<_>, RebalancerError>>()?;
        Ok(ConstraintSet {
            budget: self.budget,
            group_caps,
        })
    }
}

/// Reject bound/constraint combinations no weight vector can satisfy.
pub fn check_feasible(bounds: &[Bound], constraints: &ConstraintSet) -> Result<(), RebalancerError> {
    let lo: f64 = bounds.iter().map(|b| b.lower).sum();
    let hi: f64 = bounds.iter().map(|b| b.upper).sum();
    if constraints.budget < lo - FEASIBILITY_TOLERANCE || constraints.budget > hi + FEASIBILITY_TOLERANCE {
        return Err(RebalancerError::config_invalid(
            COMMANDS_SECTION,
            "bounds",
            format!(
                "budget {} unreachable within bounds (sum of lower {}, sum of upper {})",
                constraints.budget, lo, hi
            ),
        ));
    }
    for g in &constraints.group_caps {
        let group_lo: f64 = g.indices.iter().map(|&i| bounds[i].lower).sum();
        if group_lo > g.cap + FEASIBILITY_TOLERANCE {
            return Err(RebalancerError::config_invalid(
                COMMANDS_SECTION,
                "constraints",
                format!("cap {} is below the group's combined lower bounds {}", g.cap, group_lo),
            ));
        }
    }
    Ok(())
}
