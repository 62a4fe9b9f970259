//! Sample sizes and risk for ballot-level comparison audits.
//!
//! The formulas are the Kaplan-Markov bounds of "A Gentle Introduction to
//! Risk-limiting Audits" (Lindeman and Stark, 2012). Inputs are exact rationals.
//! Logarithms and powers are evaluated in f64 and only their final, rounded
//! result leaves this module.

use log::debug;
use num::{BigInt, BigRational, Signed, Zero};

use crate::config::AuditError;
use crate::decimal::{rational_to_f64, Risk};

/// Running totals of the five kinds of discrepancies.
///
/// Codes: -2 two-vote understatement, -1 one-vote understatement, 0 other,
/// 1 one-vote overstatement, 2 two-vote overstatement.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Default)]
pub struct DiscrepancyCounts {
    pub two_under: u32,
    pub one_under: u32,
    pub other: u32,
    pub one_over: u32,
    pub two_over: u32,
}

impl DiscrepancyCounts {
    pub const EMPTY: DiscrepancyCounts = DiscrepancyCounts {
        two_under: 0,
        one_under: 0,
        other: 0,
        one_over: 0,
        two_over: 0,
    };

    fn slot_mut(&mut self, code: i32) -> Result<&mut u32, AuditError> {
        match code {
            -2 => Ok(&mut self.two_under),
            -1 => Ok(&mut self.one_under),
            0 => Ok(&mut self.other),
            1 => Ok(&mut self.one_over),
            2 => Ok(&mut self.two_over),
            _ => Err(AuditError::InvalidDiscrepancy { code }),
        }
    }

    pub fn record(&mut self, code: i32) -> Result<(), AuditError> {
        let slot = self.slot_mut(code)?;
        *slot += 1;
        Ok(())
    }

    /// Fails without changing anything if the counter is already at zero.
    pub fn remove(&mut self, code: i32) -> Result<(), AuditError> {
        let slot = self.slot_mut(code)?;
        *slot = slot
            .checked_sub(1)
            .ok_or(AuditError::NegativeDiscrepancyCount { code })?;
        Ok(())
    }

    pub fn count(&self, code: i32) -> Result<u32, AuditError> {
        match code {
            -2 => Ok(self.two_under),
            -1 => Ok(self.one_under),
            0 => Ok(self.other),
            1 => Ok(self.one_over),
            2 => Ok(self.two_over),
            _ => Err(AuditError::InvalidDiscrepancy { code }),
        }
    }

    pub fn overstatements(&self) -> u32 {
        self.one_over + self.two_over
    }

    /// All the over- and understatements. "Other" discrepancies are not included.
    pub fn total(&self) -> u32 {
        self.two_under + self.one_under + self.one_over + self.two_over
    }
}

pub fn is_valid_discrepancy(code: i32) -> bool {
    (-2..=2).contains(&code)
}

/// The smallest winner-loser margin divided by the number of ballots in the universe.
/// Zero when the universe is empty.
pub fn diluted_margin(margin: u64, universe_size: u64) -> BigRational {
    if universe_size == 0 {
        BigRational::zero()
    } else {
        BigRational::new(BigInt::from(margin), BigInt::from(universe_size))
    }
}

/// The number of ballots to audit if no further overstatements are found.
///
/// This is the stopping sample size, never smaller than the number of
/// over- and understatements already seen. A zero margin gives 0: such a
/// contest cannot be audited.
pub fn optimistic(
    risk_limit: &BigRational,
    diluted_margin: &BigRational,
    gamma: &BigRational,
    counts: &DiscrepancyCounts,
) -> u32 {
    if !diluted_margin.is_positive() {
        return 0;
    }
    let g = rational_to_f64(gamma);
    let mu = rational_to_f64(diluted_margin);
    let log_sum = rational_to_f64(risk_limit).ln()
        + counts.two_under as f64 * (1.0 + 1.0 / g).ln()
        + counts.one_under as f64 * (1.0 + 1.0 / (2.0 * g)).ln()
        + counts.one_over as f64 * (1.0 - 1.0 / (2.0 * g)).ln()
        + counts.two_over as f64 * (1.0 - 1.0 / g).ln();
    let size = (-2.0 * g * log_sum / mu).ceil();
    let from_formula = if size.is_finite() && size > 0.0 {
        size as u32
    } else {
        0
    };
    debug!(
        "optimistic: mu={} gamma={} counts={:?} formula={}",
        mu, g, counts, size
    );
    from_formula.max(counts.total())
}

/// Scales the optimistic size by the overstatement rate seen so far:
/// ceil(optimistic * (1 + overstatements / audited)).
pub fn estimated(optimistic: u32, overstatements: u32, audited_samples: u32) -> u32 {
    if overstatements == 0 || audited_samples == 0 {
        return optimistic;
    }
    let numer = optimistic as u64 * (audited_samples as u64 + overstatements as u64);
    let denom = audited_samples as u64;
    let res = (numer + denom - 1) / denom;
    u32::try_from(res).unwrap_or(u32::MAX)
}

/// The Kaplan-Markov p-value after `audited_samples` ballots, at most 1.
pub fn p_value_approximation(
    audited_samples: u32,
    diluted_margin: &BigRational,
    gamma: &BigRational,
    counts: &DiscrepancyCounts,
) -> f64 {
    let g = rational_to_f64(gamma);
    let mu = rational_to_f64(diluted_margin);
    let p = (1.0 - mu / (2.0 * g)).powf(audited_samples as f64)
        * (1.0 - 1.0 / (2.0 * g)).powf(-(counts.one_over as f64))
        * (1.0 - 1.0 / g).powf(-(counts.two_over as f64))
        * (1.0 + 1.0 / (2.0 * g)).powf(-(counts.one_under as f64))
        * (1.0 + 1.0 / g).powf(-(counts.two_under as f64));
    p.min(1.0)
}

/// The current risk: 1 until something is known (no samples, or no margin),
/// then the p-value rounded half-up to three places.
pub fn risk_measurement(
    audited_samples: u32,
    diluted_margin: &BigRational,
    gamma: &BigRational,
    counts: &DiscrepancyCounts,
) -> Risk {
    if audited_samples > 0 && diluted_margin.is_positive() {
        Risk::from_f64_half_up(p_value_approximation(
            audited_samples,
            diluted_margin,
            gamma,
            counts,
        ))
    } else {
        Risk::ONE
    }
}
