//! Among-site rate heterogeneity.
//!
//! A rate scheme offers both views of the same distribution:
//! - discrete: `n_categories()` multipliers, one picked per site
//! - continuous: one positive real rate drawn per site
//!
//! Discrete categories are drawn uniformly, regardless of the category
//! probabilities the scheme reports.

use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use rand_distr::Gamma;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SimulationError};

/// How each simulated site gets its rate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateMode {
    /// Uniformly drawn category; transition rows come from the cache.
    #[default]
    Discrete,
    /// Rate drawn from the continuous distribution; rows computed on the fly.
    Continuous,
}

pub trait RateScheme: Send + Sync {
    fn n_categories(&self) -> usize;

    /// Rate multiplier of category `c`; `c` must be below `n_categories()`.
    fn category_multiplier(&self, c: usize) -> f64;

    /// Probability of category `c`.
    fn category_probability(&self, _c: usize) -> f64 {
        1.0 / self.n_categories() as f64
    }

    fn draw_category<R: Rng + ?Sized>(&self, rng: &mut R) -> usize
    where
        Self: Sized,
    {
        rng.gen_range(0..self.n_categories())
    }

    fn draw_continuous_rate<R: Rng + ?Sized>(&self, rng: &mut R) -> f64
    where
        Self: Sized;

    fn check_category(&self, category: usize) -> Result<()> {
        if category >= self.n_categories() {
            return Err(SimulationError::CategoryOutOfRange {
                category,
                n_categories: self.n_categories(),
            });
        }
        Ok(())
    }
}

/// Every site evolves at the same rate.
#[derive(Clone, Debug)]
pub struct ConstantRate {
    rate: f64,
}

impl ConstantRate {
    pub fn new(rate: f64) -> Result<Self> {
        if !(rate.is_finite() && rate >= 0.0) {
            return Err(SimulationError::InvalidRates {
                reason: format!("constant rate must be non-negative, got {rate}"),
            });
        }
        Ok(Self { rate })
    }
}

impl Default for ConstantRate {
    fn default() -> Self {
        Self { rate: 1.0 }
    }
}

impl RateScheme for ConstantRate {
    fn n_categories(&self) -> usize {
        1
    }

    fn category_multiplier(&self, _c: usize) -> f64 {
        self.rate
    }

    fn draw_continuous_rate<R: Rng + ?Sized>(&self, _rng: &mut R) -> f64 {
        self.rate
    }
}

/// Explicit categories. Continuous draws pick a category by probability and
/// return its multiplier.
#[derive(Clone, Debug)]
pub struct CategoryRates {
    multipliers: Vec<f64>,
    probabilities: Vec<f64>,
    sampler: WeightedIndex<f64>,
}

impl CategoryRates {
    /// Categories with the given multipliers and probabilities. Probabilities
    /// are normalised to sum to one and multipliers are rescaled so that
    /// their probability-weighted mean is one.
    pub fn new(multipliers: Vec<f64>, probabilities: Vec<f64>) -> Result<Self> {
        if multipliers.is_empty() || multipliers.len() != probabilities.len() {
            return Err(SimulationError::InvalidRates {
                reason: format!(
                    "need matching non-empty multipliers and probabilities, got {} and {}",
                    multipliers.len(),
                    probabilities.len()
                ),
            });
        }
        if multipliers.iter().any(|&m| !(m.is_finite() && m >= 0.0)) {
            return Err(SimulationError::InvalidRates {
                reason: format!("multipliers must be non-negative: {multipliers:?}"),
            });
        }
        let sampler = WeightedIndex::new(&probabilities).map_err(|e| {
            SimulationError::InvalidRates {
                reason: format!("invalid category probabilities {probabilities:?}: {e}"),
            }
        })?;
        let total: f64 = probabilities.iter().sum();
        let probabilities: Vec<f64> = probabilities.iter().map(|p| p / total).collect();

        let mean: f64 = multipliers.iter().zip(&probabilities).map(|(m, p)| m * p).sum();
        if mean <= 0.0 {
            return Err(SimulationError::InvalidRates {
                reason: format!("multipliers have zero mean: {multipliers:?}"),
            });
        }
        let multipliers = multipliers.iter().map(|m| m / mean).collect();

        Ok(Self {
            multipliers,
            probabilities,
            sampler,
        })
    }

    /// Equiprobable categories.
    pub fn uniform(multipliers: Vec<f64>) -> Result<Self> {
        let n = multipliers.len();
        Self::new(multipliers, vec![1.0; n])
    }

    /// Mean multiplier weighted by category probability.
    pub fn mean(&self) -> f64 {
        self.multipliers
            .iter()
            .zip(&self.probabilities)
            .map(|(m, p)| m * p)
            .sum()
    }
}

impl RateScheme for CategoryRates {
    fn n_categories(&self) -> usize {
        self.multipliers.len()
    }

    fn category_multiplier(&self, c: usize) -> f64 {
        self.multipliers[c]
    }

    fn category_probability(&self, c: usize) -> f64 {
        self.probabilities[c]
    }

    fn draw_continuous_rate<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        self.multipliers[self.sampler.sample(rng)]
    }
}

/// Gamma distributed rates with mean one and shape `alpha`.
///
/// Discrete categories use the median of each of `n` equiprobable slices,
/// rescaled so the category mean is one.
#[derive(Clone, Debug)]
pub struct GammaRates {
    alpha: f64,
    multipliers: Vec<f64>,
    distribution: Gamma<f64>,
}

impl GammaRates {
    pub fn new(alpha: f64, n_categories: usize) -> Result<Self> {
        if !(alpha.is_finite() && alpha > 0.0) || n_categories == 0 {
            return Err(SimulationError::InvalidRates {
                reason: format!(
                    "gamma needs alpha > 0 and at least one category, got alpha={alpha}, n={n_categories}"
                ),
            });
        }
        let distribution =
            Gamma::new(alpha, 1.0 / alpha).map_err(|e| SimulationError::InvalidRates {
                reason: format!("gamma(alpha={alpha}): {e}"),
            })?;

        let medians: Vec<f64> = (0..n_categories)
            .map(|k| {
                let p = (2 * k + 1) as f64 / (2 * n_categories) as f64;
                // Gamma(alpha, rate alpha) quantile
                gamma_quantile(alpha, p) / alpha
            })
            .collect();
        let mean = medians.iter().sum::<f64>() / n_categories as f64;
        let multipliers = medians.iter().map(|m| m / mean).collect();

        Ok(Self {
            alpha,
            multipliers,
            distribution,
        })
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }
}

impl RateScheme for GammaRates {
    fn n_categories(&self) -> usize {
        self.multipliers.len()
    }

    fn category_multiplier(&self, c: usize) -> f64 {
        self.multipliers[c]
    }

    fn draw_continuous_rate<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        self.distribution.sample(rng)
    }
}

/// Quantile of the unit-scale gamma distribution with shape `a`, by bisection
/// on ln x of the regularized lower incomplete gamma function.
///
/// Small shapes put low quantiles far below one, so the lower bracket starts
/// from the small-x limit P(a, x) ~ x^a / Γ(a + 1).
fn gamma_quantile(a: f64, p: f64) -> f64 {
    let below = |ln_x: f64| regularized_lower_gamma(a, ln_x.exp()) < p;

    let mut lo = (p.ln() + ln_gamma(a + 1.0)) / a - 1.0;
    while !below(lo) {
        lo -= 1.0;
    }
    let mut hi = a.max(1.0).ln();
    while below(hi) {
        hi += std::f64::consts::LN_2;
    }
    for _ in 0..200 {
        let mid = 0.5 * (lo + hi);
        if below(mid) {
            lo = mid;
        } else {
            hi = mid;
        }
        if hi - lo <= 1e-14 {
            break;
        }
    }
    (0.5 * (lo + hi)).exp()
}

/// P(a, x) = γ(a, x) / Γ(a): series for x < a + 1, continued fraction above.
fn regularized_lower_gamma(a: f64, x: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    let log_prefix = a * x.ln() - x - ln_gamma(a);

    if x < a + 1.0 {
        let mut term = 1.0 / a;
        let mut sum = term;
        let mut denom = a;
        for _ in 0..1000 {
            denom += 1.0;
            term *= x / denom;
            sum += term;
            if term.abs() < sum.abs() * 1e-16 {
                break;
            }
        }
        (sum.ln() + log_prefix).exp()
    } else {
        // Modified Lentz for the upper tail Q(a, x)
        let tiny = 1e-300;
        let mut b = x + 1.0 - a;
        let mut c = 1.0 / tiny;
        let mut d = 1.0 / b;
        let mut h = d;
        for i in 1..1000 {
            let an = -(i as f64) * (i as f64 - a);
            b += 2.0;
            d = an * d + b;
            if d.abs() < tiny {
                d = tiny;
            }
            c = b + an / c;
            if c.abs() < tiny {
                c = tiny;
            }
            d = 1.0 / d;
            let delta = d * c;
            h *= delta;
            if (delta - 1.0).abs() < 1e-16 {
                break;
            }
        }
        1.0 - (log_prefix.exp() * h)
    }
}

/// Lanczos approximation (g = 7, n = 9).
fn ln_gamma(x: f64) -> f64 {
    const COEFFICIENTS: [f64; 9] = [
        0.999_999_999_999_809_9,
        676.520_368_121_885_1,
        -1_259.139_216_722_402_8,
        771.323_428_777_653_1,
        -176.615_029_162_140_6,
        12.507_343_278_686_905,
        -0.138_571_095_265_720_12,
        9.984_369_578_019_572e-6,
        1.505_632_735_149_311_6e-7,
    ];

    if x < 0.5 {
        // Reflection
        let pi = std::f64::consts::PI;
        return (pi / (pi * x).sin()).ln() - ln_gamma(1.0 - x);
    }
    let x = x - 1.0;
    let mut sum = COEFFICIENTS[0];
    for (i, &c) in COEFFICIENTS.iter().enumerate().skip(1) {
        sum += c / (x + i as f64);
    }
    let t = x + 7.5;
    0.5 * (2.0 * std::f64::consts::PI).ln() + (x + 0.5) * t.ln() - t + sum.ln()
}
