//! The comparison audit of one contest.
//!
//! A [`ComparisonAudit`] follows the audit of a contest across all the counties
//! it appears in. It knows which sampled CVRs belong to the contest, counts the
//! discrepancies found between those CVRs and their audited ballots, and derives
//! from them the number of ballots still to examine and the current risk.
//!
//! Plurality contests compare the recorded choices directly against the reported
//! winners and losers. IRV contests hand the comparison to their assertions, and
//! are as hard to audit as their hardest assertion.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use log::{debug, error, info, warn};
use num::{BigRational, Zero};

use crate::assertion::Assertion;
use crate::config::{
    AuditError, AuditReason, AuditSettings, AuditStatus, ConsensusValue, ContestType, RecordType,
};
use crate::cvr::{CastVoteRecord, CvrContestInfo, CvrId};
use crate::decimal::{format_rational, Risk};
use crate::stats::{self, DiscrepancyCounts};
use crate::tally::ContestResult;

/// How the discrepancies of a contest are computed.
#[derive(PartialEq, Debug, Clone)]
pub enum ContestMethod {
    Plurality {
        winners: Vec<String>,
        losers: Vec<String>,
        winners_allowed: u32,
        /// The smallest winner-loser margin, in votes.
        min_margin: u64,
    },
    Irv {
        assertions: Vec<Assertion>,
    },
}

#[derive(PartialEq, Debug, Clone)]
pub struct ComparisonAudit {
    contest: String,
    counties: BTreeSet<u64>,
    reason: AuditReason,
    status: AuditStatus,
    risk_limit: BigRational,
    gamma: BigRational,
    diluted_margin: BigRational,
    method: ContestMethod,
    /// The sampled CVRs of the contest, in selection order. A CVR appears once per
    /// time it was drawn.
    contest_cvr_ids: Vec<CvrId>,
    audited_sample_count: u32,
    optimistic_samples_to_audit: u32,
    estimated_samples_to_audit: u32,
    counts: DiscrepancyCounts,
    disagreement_count: u32,
    discrepancies: BTreeMap<CvrId, i32>,
    disagreements: BTreeSet<CvrId>,
    optimistic_recalculate_needed: bool,
    estimated_recalculate_needed: bool,
}

impl ComparisonAudit {
    fn new(
        result: &ContestResult,
        settings: &AuditSettings,
        reason: AuditReason,
        diluted_margin: BigRational,
        method: ContestMethod,
    ) -> ComparisonAudit {
        let status = if diluted_margin.is_zero() {
            AuditStatus::NotAuditable
        } else {
            AuditStatus::NotStarted
        };
        let mut audit = ComparisonAudit {
            contest: result.contest_name.clone(),
            counties: result.counties.clone(),
            reason,
            status,
            risk_limit: settings.risk_limit.clone(),
            gamma: settings.gamma.clone(),
            diluted_margin,
            method,
            contest_cvr_ids: Vec::new(),
            audited_sample_count: 0,
            optimistic_samples_to_audit: 0,
            estimated_samples_to_audit: 0,
            counts: DiscrepancyCounts::EMPTY,
            disagreement_count: 0,
            discrepancies: BTreeMap::new(),
            disagreements: BTreeSet::new(),
            optimistic_recalculate_needed: true,
            estimated_recalculate_needed: true,
        };
        audit.recalculate_samples_to_audit();
        debug!(
            "new: audit of {} ({}), status {}, diluted margin {}, optimistic {}",
            audit.contest,
            audit.reason,
            audit.status,
            format_rational(&audit.diluted_margin, 6),
            audit.optimistic_samples_to_audit
        );
        audit
    }

    /// The audit of a plurality contest, using the winners, losers and diluted
    /// margin of its tally.
    pub fn plurality(
        result: &ContestResult,
        settings: &AuditSettings,
        reason: AuditReason,
    ) -> ComparisonAudit {
        let method = ContestMethod::Plurality {
            winners: result.winners.clone(),
            losers: result.losers.clone(),
            winners_allowed: result.winners_allowed,
            min_margin: result.min_margin,
        };
        ComparisonAudit::new(result, settings, reason, result.diluted_margin.clone(), method)
    }

    /// The audit of an IRV contest. Its diluted margin is the smallest one of its
    /// assertions. A contest without assertions cannot be audited.
    pub fn irv(
        result: &ContestResult,
        settings: &AuditSettings,
        reason: AuditReason,
        assertions: Vec<Assertion>,
    ) -> ComparisonAudit {
        let diluted_margin = assertions
            .iter()
            .map(|a| a.diluted_margin.clone())
            .min()
            .unwrap_or_else(BigRational::zero);
        if assertions.is_empty() {
            debug!("irv: no assertions for {}, not auditable", result.contest_name);
        }
        ComparisonAudit::new(
            result,
            settings,
            reason,
            diluted_margin,
            ContestMethod::Irv { assertions },
        )
    }

    pub fn contest_name(&self) -> &str {
        &self.contest
    }

    pub fn contest_type(&self) -> ContestType {
        match self.method {
            ContestMethod::Plurality { .. } => ContestType::Plurality,
            ContestMethod::Irv { .. } => ContestType::Irv,
        }
    }

    pub fn method(&self) -> &ContestMethod {
        &self.method
    }

    /// The assertions of an IRV contest. Empty for plurality contests.
    pub fn assertions(&self) -> &[Assertion] {
        match &self.method {
            ContestMethod::Irv { assertions } => assertions,
            ContestMethod::Plurality { .. } => &[],
        }
    }

    pub fn counties(&self) -> &BTreeSet<u64> {
        &self.counties
    }

    pub fn is_for_county(&self, county_id: u64) -> bool {
        self.counties.contains(&county_id)
    }

    pub fn audit_reason(&self) -> AuditReason {
        self.reason
    }

    pub fn audit_status(&self) -> AuditStatus {
        self.status
    }

    pub fn risk_limit(&self) -> &BigRational {
        &self.risk_limit
    }

    pub fn gamma(&self) -> &BigRational {
        &self.gamma
    }

    pub fn diluted_margin(&self) -> &BigRational {
        &self.diluted_margin
    }

    /// The smallest margin in votes. For IRV, the smallest assertion margin (0 without assertions).
    pub fn min_margin(&self) -> u64 {
        match &self.method {
            ContestMethod::Plurality { min_margin, .. } => *min_margin,
            ContestMethod::Irv { assertions } => {
                assertions.iter().map(|a| a.margin).min().unwrap_or(0)
            }
        }
    }

    // ********* Status **********

    /// Brings the status in line with the sample sizes. Sticky statuses never change.
    pub fn update_audit_status(&mut self) {
        debug!(
            "update_audit_status: {} for {}, optimistic {}, audited {}",
            self.status, self.contest, self.optimistic_samples_to_audit, self.audited_sample_count
        );
        if self.status.is_sticky() {
            return;
        }
        if self.optimistic_recalculate_needed || self.estimated_recalculate_needed {
            self.recalculate_samples_to_audit();
        }
        if self.optimistic_samples_to_audit <= self.audited_sample_count {
            debug!("update_audit_status: risk limit achieved for {}", self.contest);
            self.status = AuditStatus::RiskLimitAchieved;
        } else if self.status == AuditStatus::NotStarted && self.audited_sample_count == 0 {
            debug!("update_audit_status: no sample of {} audited yet", self.contest);
        } else {
            if self.status == AuditStatus::RiskLimitAchieved {
                warn!(
                    "update_audit_status: {} moving from RISK_LIMIT_ACHIEVED to IN_PROGRESS",
                    self.contest
                );
            }
            self.status = AuditStatus::InProgress;
        }
    }

    /// Stops the audit, unless the risk limit was already achieved or the contest
    /// could not be audited.
    pub fn end_audit(&mut self) {
        if self.status != AuditStatus::RiskLimitAchieved
            && self.status != AuditStatus::NotAuditable
        {
            self.status = AuditStatus::Ended;
        }
    }

    pub fn set_hand_count(&mut self) {
        info!("set_hand_count: {} goes to a full hand count", self.contest);
        self.status = AuditStatus::HandCount;
    }

    pub fn is_hand_count(&self) -> bool {
        self.status == AuditStatus::HandCount
    }

    pub fn is_finished(&self) -> bool {
        matches!(
            self.status,
            AuditStatus::NotAuditable
                | AuditStatus::RiskLimitAchieved
                | AuditStatus::HandCount
                | AuditStatus::Ended
        )
    }

    /// The contest drives the sample selection.
    pub fn is_targeted(&self) -> bool {
        self.reason.is_targeted() && !self.is_hand_count()
    }

    // ********* Sample sizes **********

    fn recalculate_samples_to_audit(&mut self) {
        debug!(
            "recalculate_samples_to_audit: start {} counts {:?} optimistic {} estimated {}",
            self.contest, self.counts, self.optimistic_samples_to_audit, self.estimated_samples_to_audit
        );
        let audited = self.audited_sample_count;
        match &mut self.method {
            ContestMethod::Plurality { .. } => {
                if self.optimistic_recalculate_needed {
                    self.optimistic_samples_to_audit = stats::optimistic(
                        &self.risk_limit,
                        &self.diluted_margin,
                        &self.gamma,
                        &self.counts,
                    );
                }
                self.estimated_samples_to_audit = stats::estimated(
                    self.optimistic_samples_to_audit,
                    self.counts.overstatements(),
                    audited,
                );
            }
            ContestMethod::Irv { assertions } => {
                if assertions.is_empty() {
                    self.optimistic_samples_to_audit = 0;
                    self.estimated_samples_to_audit = 0;
                } else {
                    if self.optimistic_recalculate_needed {
                        let (risk_limit, gamma) = (&self.risk_limit, &self.gamma);
                        self.optimistic_samples_to_audit = assertions
                            .iter_mut()
                            .map(|a| a.compute_optimistic_samples_to_audit(risk_limit, gamma))
                            .max()
                            .unwrap_or(0);
                    }
                    self.estimated_samples_to_audit = assertions
                        .iter_mut()
                        .map(|a| a.compute_estimated_samples_to_audit(audited))
                        .max()
                        .unwrap_or(0);
                    for a in assertions.iter_mut() {
                        a.update_risk(audited, &self.gamma);
                    }
                }
            }
        }
        self.optimistic_recalculate_needed = false;
        self.estimated_recalculate_needed = false;
        debug!(
            "recalculate_samples_to_audit: end {} optimistic {} estimated {}",
            self.contest, self.optimistic_samples_to_audit, self.estimated_samples_to_audit
        );
    }

    /// The sample size before any discrepancy is found.
    pub fn initial_samples_to_audit(&self) -> u32 {
        match &self.method {
            ContestMethod::Plurality { .. } => stats::optimistic(
                &self.risk_limit,
                &self.diluted_margin,
                &self.gamma,
                &DiscrepancyCounts::EMPTY,
            ),
            ContestMethod::Irv { assertions } => assertions
                .iter()
                .map(|a| {
                    stats::optimistic(
                        &self.risk_limit,
                        &a.diluted_margin,
                        &self.gamma,
                        &DiscrepancyCounts::EMPTY,
                    )
                })
                .max()
                .unwrap_or(0),
        }
    }

    pub fn optimistic_samples_to_audit(&mut self) -> u32 {
        if self.optimistic_recalculate_needed {
            self.recalculate_samples_to_audit();
        }
        self.optimistic_samples_to_audit
    }

    pub fn estimated_samples_to_audit(&mut self) -> u32 {
        if self.estimated_recalculate_needed {
            debug!("estimated_samples_to_audit: recalculate needed for {}", self.contest);
            self.recalculate_samples_to_audit();
        }
        self.estimated_samples_to_audit
    }

    pub fn optimistic_remaining(&mut self) -> u32 {
        self.optimistic_samples_to_audit()
            .saturating_sub(self.audited_sample_count)
    }

    pub fn estimated_remaining(&mut self) -> u32 {
        self.estimated_samples_to_audit()
            .saturating_sub(self.audited_sample_count)
    }

    pub fn audited_sample_count(&self) -> u32 {
        self.audited_sample_count
    }

    pub fn overstatements(&self) -> u32 {
        self.counts.overstatements()
    }

    /// The current risk. For IRV, the largest risk among the assertions, and 1 without assertions.
    pub fn risk_measurement(&self) -> Risk {
        match &self.method {
            ContestMethod::Plurality { .. } => stats::risk_measurement(
                self.audited_sample_count,
                &self.diluted_margin,
                &self.gamma,
                &self.counts,
            ),
            ContestMethod::Irv { assertions } => assertions
                .iter()
                .map(|a| {
                    stats::risk_measurement(
                        self.audited_sample_count,
                        &a.diluted_margin,
                        &self.gamma,
                        a.counts(),
                    )
                })
                .max()
                .unwrap_or(Risk::ONE),
        }
    }

    // ********* Samples **********

    pub fn add_contest_cvr_ids(&mut self, cvr_ids: &[CvrId]) {
        self.contest_cvr_ids.extend_from_slice(cvr_ids);
    }

    pub fn contest_cvr_ids(&self) -> &[CvrId] {
        &self.contest_cvr_ids
    }

    /// True if the CVR was drawn for this contest.
    pub fn is_covering(&self, cvr_id: CvrId) -> bool {
        self.contest_cvr_ids.contains(&cvr_id)
    }

    /// How many times the CVR was drawn for this contest.
    pub fn multiplicity(&self, cvr_id: CvrId) -> u32 {
        self.contest_cvr_ids.iter().filter(|id| **id == cvr_id).count() as u32
    }

    pub fn signal_sample_audited(&mut self, count: u32, cvr_id: CvrId) {
        self.estimated_recalculate_needed = true;
        let covered = self.is_covering(cvr_id);
        let targeted = self.is_targeted();
        if targeted && !covered {
            debug!(
                "signal_sample_audited: {} is targeted but CVR {} was not selected for it",
                self.contest, cvr_id
            );
        }
        if targeted && covered {
            debug!(
                "signal_sample_audited: {} CVR {} audited samples {} count {}",
                self.contest, cvr_id, self.audited_sample_count, count
            );
            self.audited_sample_count += count;
            if self.status == AuditStatus::RiskLimitAchieved {
                warn!(
                    "signal_sample_audited: resetting {} from RISK_LIMIT_ACHIEVED to IN_PROGRESS",
                    self.contest
                );
                self.status = AuditStatus::InProgress;
            }
        }
    }

    pub fn signal_sample_unaudited(&mut self, count: u32, cvr_id: CvrId) {
        self.estimated_recalculate_needed = true;
        if self.is_targeted() && self.is_covering(cvr_id) {
            debug!(
                "signal_sample_unaudited: {} CVR {} audited samples {} count {}",
                self.contest, cvr_id, self.audited_sample_count, count
            );
            if count > self.audited_sample_count {
                warn!(
                    "signal_sample_unaudited: {} cannot unaudit {} samples out of {}",
                    self.contest, count, self.audited_sample_count
                );
            }
            self.audited_sample_count = self.audited_sample_count.saturating_sub(count);
            if self.status == AuditStatus::RiskLimitAchieved {
                warn!(
                    "signal_sample_unaudited: resetting {} from RISK_LIMIT_ACHIEVED to IN_PROGRESS",
                    self.contest
                );
                self.status = AuditStatus::InProgress;
            }
        }
    }

    // ********* Disagreements **********

    pub fn record_disagreement(&mut self, cvr_id: CvrId) {
        self.disagreements.insert(cvr_id);
        self.disagreement_count += 1;
    }

    pub fn remove_disagreement(&mut self, cvr_id: CvrId) {
        self.disagreements.remove(&cvr_id);
        self.disagreement_count = self.disagreement_count.saturating_sub(1);
    }

    pub fn disagreement_count(&self) -> u32 {
        self.disagreement_count
    }

    // ********* Discrepancies **********

    pub fn discrepancy_count(&self, code: i32) -> Result<u32, AuditError> {
        self.counts.count(code)
    }

    pub fn counts(&self) -> &DiscrepancyCounts {
        &self.counts
    }

    pub fn discrepancy_for(&self, cvr_id: CvrId) -> Option<i32> {
        self.discrepancies.get(&cvr_id).copied()
    }

    /// The recorded discrepancies, by CVR.
    pub fn discrepancies(&self) -> &BTreeMap<CvrId, i32> {
        &self.discrepancies
    }

    /// Compares a CVR with its audited ballot for this contest.
    pub fn compute_discrepancy(
        &mut self,
        cvr: &CastVoteRecord,
        acvr: &CastVoteRecord,
    ) -> Result<Option<i32>, AuditError> {
        match &mut self.method {
            ContestMethod::Plurality {
                winners,
                losers,
                winners_allowed,
                ..
            } => plurality_discrepancy(&self.contest, winners, losers, *winners_allowed, cvr, acvr),
            ContestMethod::Irv { assertions } => {
                let res = assertions
                    .iter_mut()
                    .filter_map(|a| a.compute_discrepancy(cvr, acvr))
                    .max();
                match res {
                    Some(d) => info!(
                        "compute_discrepancy: {} maximum discrepancy {} for CVR {}",
                        self.contest, d, cvr.id
                    ),
                    None => debug!(
                        "compute_discrepancy: {} no discrepancy for CVR {}",
                        self.contest, cvr.id
                    ),
                }
                Ok(res)
            }
        }
    }

    fn check_code(&self, code: i32) -> Result<(), AuditError> {
        if stats::is_valid_discrepancy(code) {
            Ok(())
        } else {
            error!("{}: invalid discrepancy type {}", self.contest, code);
            Err(AuditError::InvalidDiscrepancy { code })
        }
    }

    fn record_in_counters(&mut self, cvr_id: CvrId, code: i32) -> Result<(), AuditError> {
        if self.is_covering(cvr_id) {
            self.counts.record(code)?;
            if code != 0 {
                self.optimistic_recalculate_needed = true;
            }
        }
        info!(
            "record_discrepancy: {} type {} for CVR {}",
            self.contest, code, cvr_id
        );
        self.discrepancies.insert(cvr_id, code);
        Ok(())
    }

    fn remove_from_counters(&mut self, cvr_id: CvrId, code: i32) -> Result<(), AuditError> {
        if self.is_covering(cvr_id) {
            if let Err(e) = self.counts.remove(code) {
                error!(
                    "remove_discrepancy: {} for CVR {} in {}",
                    e, cvr_id, self.contest
                );
                return Err(e);
            }
            if code != 0 {
                self.optimistic_recalculate_needed = true;
            }
        }
        self.discrepancies.remove(&cvr_id);
        Ok(())
    }

    /// Counts one occurrence of a discrepancy of type `code` for the CVR.
    ///
    /// For IRV contests, `code` must be the largest discrepancy cached by the
    /// assertions for that CVR, and each assertion counts its own discrepancy.
    /// Only CVRs drawn for this contest change the counters.
    pub fn record_discrepancy(&mut self, cvr_id: CvrId, code: i32) -> Result<(), AuditError> {
        self.check_code(code)?;
        let covering = self.is_covering(cvr_id);
        if let ContestMethod::Irv { assertions } = &mut self.method {
            let expected = assertions.iter().filter_map(|a| a.discrepancy_for(cvr_id)).max();
            if expected != Some(code) {
                error!(
                    "record_discrepancy: {} is not the maximum discrepancy type for CVR {} in {}",
                    code, cvr_id, self.contest
                );
                return Err(AuditError::DiscrepancyMismatch {
                    contest: self.contest.clone(),
                    cvr_id,
                    expected,
                    given: code,
                });
            }
            if covering {
                for a in assertions.iter_mut() {
                    a.record_discrepancy(cvr_id)?;
                }
            } else {
                warn!(
                    "record_discrepancy: discrepancy computed for {} but CVR {} was not drawn for it",
                    self.contest, cvr_id
                );
            }
            self.optimistic_recalculate_needed = true;
        }
        self.record_in_counters(cvr_id, code)
    }

    /// Removes one occurrence of a discrepancy of type `code` for the CVR.
    pub fn remove_discrepancy(&mut self, cvr_id: CvrId, code: i32) -> Result<(), AuditError> {
        self.check_code(code)?;
        let covering = self.is_covering(cvr_id);
        info!(
            "remove_discrepancy: {} type {} for CVR {}",
            self.contest, code, cvr_id
        );
        if let ContestMethod::Irv { assertions } = &mut self.method {
            if covering {
                let mut removed = false;
                for a in assertions.iter_mut() {
                    removed |= a.remove_discrepancy(cvr_id)?;
                }
                if !removed {
                    warn!(
                        "remove_discrepancy: no discrepancies removed for CVR {} in {}",
                        cvr_id, self.contest
                    );
                    return Ok(());
                }
                self.optimistic_recalculate_needed = true;
            }
        }
        self.remove_from_counters(cvr_id, code)
    }

    pub fn description(&self) -> String {
        format!(
            "{} audit of {}: status {}, reason {}, diluted margin {}, audited {}, \
             optimistic {}, estimated {}, risk {}.",
            self.contest_type_label(),
            self.contest,
            self.status,
            self.reason,
            format_rational(&self.diluted_margin, 6),
            self.audited_sample_count,
            self.optimistic_samples_to_audit,
            self.estimated_samples_to_audit,
            self.risk_measurement()
        )
    }

    fn contest_type_label(&self) -> &'static str {
        match self.contest_type() {
            ContestType::Plurality => "Plurality",
            ContestType::Irv => "IRV",
        }
    }
}

// ********* Plurality discrepancies **********

fn plurality_discrepancy(
    contest: &str,
    winners: &[String],
    losers: &[String],
    winners_allowed: u32,
    cvr: &CastVoteRecord,
    acvr: &CastVoteRecord,
) -> Result<Option<i32>, AuditError> {
    let cvr_info = cvr.contest_info_for(contest);
    let acvr_info = acvr.contest_info_for(contest);
    if acvr.record_type == RecordType::PhantomBallot {
        return Ok(Some(match cvr_info {
            Some(ci) => phantom_ballot_discrepancy(ci, losers),
            None => 1,
        }));
    }
    if cvr.is_phantom_record() {
        return Ok(Some(2));
    }
    match (cvr_info, acvr_info) {
        (Some(ci), Some(ai)) if ai.consensus == ConsensusValue::No => {
            Ok(Some(phantom_ballot_discrepancy(ci, losers)))
        }
        (Some(ci), Some(ai)) => {
            audited_ballot_discrepancy(contest, winners, losers, winners_allowed, ci, ai)
        }
        _ => Ok(None),
    }
}

/// 2 if a winner may have lost a vote, 1 otherwise.
fn phantom_ballot_discrepancy(cvr_info: &CvrContestInfo, losers: &[String]) -> i32 {
    let winner_votes = cvr_info.choices.iter().filter(|c| !losers.contains(c)).count();
    if winner_votes == 0 {
        1
    } else {
        2
    }
}

fn vote_change(name: &str, cvr_choices: &HashSet<&str>, acvr_choices: &HashSet<&str>) -> i32 {
    match (cvr_choices.contains(name), acvr_choices.contains(name)) {
        (false, true) => 1,
        (true, false) => -1,
        _ => 0,
    }
}

/// The largest change of any winner-loser margin between the CVR and the
/// audited ballot. An understatement is only reported if every margin widened.
fn audited_ballot_discrepancy(
    contest: &str,
    winners: &[String],
    losers: &[String],
    winners_allowed: u32,
    cvr_info: &CvrContestInfo,
    acvr_info: &CvrContestInfo,
) -> Result<Option<i32>, AuditError> {
    // An overvote is recorded by the tabulation system as no selection at all.
    let acvr_choices: HashSet<&str> = if acvr_info.choices.len() <= winners_allowed as usize {
        acvr_info.choices.iter().map(|c| c.as_str()).collect()
    } else {
        HashSet::new()
    };
    let cvr_choices: HashSet<&str> = cvr_info.choices.iter().map(|c| c.as_str()).collect();
    if cvr_choices == acvr_choices {
        return Ok(None);
    }

    let mut raw_result: Option<i32> = None;
    let mut possible_understatement = true;
    for winner in winners {
        let winner_change = vote_change(winner, &cvr_choices, &acvr_choices);
        if losers.is_empty() {
            raw_result = raw_result.max(Some(-winner_change));
        } else {
            for loser in losers {
                let loser_change = vote_change(loser, &cvr_choices, &acvr_choices);
                let d = loser_change - winner_change;
                raw_result = raw_result.max(Some(d));
                if d >= 0 {
                    possible_understatement = false;
                }
            }
        }
    }
    match raw_result {
        None => {
            error!("audited_ballot_discrepancy: no winners in contest {}", contest);
            Err(AuditError::NoWinners {
                contest: contest.to_string(),
            })
        }
        Some(d) if possible_understatement => Ok(Some(d)),
        Some(d) => Ok(Some(d.max(0))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn v(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    fn settings() -> AuditSettings {
        AuditSettings::parse("0.05", "1.03905").unwrap()
    }

    fn mayor_result() -> ContestResult {
        let mut r = ContestResult::new("Mayor", ContestType::Plurality);
        r.counties.insert(1);
        r.winners = v(&["Alice"]);
        r.losers = v(&["Bob", "Chuan"]);
        r.winners_allowed = 1;
        r.min_margin = 10;
        r.ballot_count = 100;
        r.diluted_margin = stats::diluted_margin(10, 100);
        r
    }

    fn record(id: u64, record_type: RecordType, choices: Option<&[&str]>) -> CastVoteRecord {
        CastVoteRecord {
            id: CvrId(id),
            record_type,
            county_id: 1,
            imprinted_id: format!("1-1-{}", id),
            revision: 0,
            comment: None,
            contest_info: choices
                .map(|c| vec![CvrContestInfo::new("Mayor", v(c))])
                .unwrap_or_default(),
        }
    }

    fn cvr(choices: &[&str]) -> CastVoteRecord {
        record(1, RecordType::Uploaded, Some(choices))
    }

    fn acvr(choices: &[&str]) -> CastVoteRecord {
        record(1, RecordType::AuditorEntered, Some(choices))
    }

    fn plurality() -> ComparisonAudit {
        ComparisonAudit::plurality(&mayor_result(), &settings(), AuditReason::CountyWideContest)
    }

    fn ids(range: std::ops::RangeInclusive<u64>) -> Vec<CvrId> {
        range.map(CvrId).collect()
    }

    #[test]
    fn plurality_discrepancies() {
        let mut audit = plurality();
        let mut d = |c: &[&str], a: &[&str]| audit.compute_discrepancy(&cvr(c), &acvr(a)).unwrap();
        assert_eq!(d(&["Alice"], &["Alice"]), None);
        assert_eq!(d(&["Alice"], &["Bob"]), Some(2));
        assert_eq!(d(&["Alice"], &[]), Some(1));
        assert_eq!(d(&["Chuan"], &["Bob"]), Some(1));
        assert_eq!(d(&["Bob"], &["Alice"]), Some(-1));
        assert_eq!(d(&["Bob"], &[]), Some(0));
        // The overvote on the audited ballot matches the blank CVR.
        assert_eq!(d(&[], &["Alice", "Bob"]), None);
        assert_eq!(d(&["Alice"], &["Alice", "Bob"]), Some(1));
    }

    #[test]
    fn plurality_phantoms() {
        let mut audit = plurality();
        let phantom_ballot = record(1, RecordType::PhantomBallot, None);
        let phantom_record = record(1, RecordType::PhantomRecord, None);
        assert_eq!(audit.compute_discrepancy(&cvr(&["Alice"]), &phantom_ballot), Ok(Some(2)));
        assert_eq!(audit.compute_discrepancy(&cvr(&["Bob"]), &phantom_ballot), Ok(Some(1)));
        assert_eq!(
            audit.compute_discrepancy(&record(1, RecordType::Uploaded, None), &phantom_ballot),
            Ok(Some(1))
        );
        assert_eq!(audit.compute_discrepancy(&phantom_record, &acvr(&["Alice"])), Ok(Some(2)));
        let mut no_consensus = acvr(&["Alice"]);
        no_consensus.contest_info[0].consensus = ConsensusValue::No;
        assert_eq!(audit.compute_discrepancy(&cvr(&["Bob"]), &no_consensus), Ok(Some(1)));
        let blank = record(1, RecordType::Uploaded, None);
        let blank_acvr = record(1, RecordType::AuditorEntered, None);
        assert_eq!(audit.compute_discrepancy(&blank, &blank_acvr), Ok(None));
    }

    #[test]
    fn plurality_without_winners() {
        let mut result = mayor_result();
        result.winners.clear();
        let mut audit = ComparisonAudit::plurality(&result, &settings(), AuditReason::CountyWideContest);
        assert_eq!(
            audit.compute_discrepancy(&cvr(&["Bob"]), &acvr(&["Chuan"])),
            Err(AuditError::NoWinners {
                contest: "Mayor".to_string()
            })
        );
    }

    #[test]
    fn status_transitions() {
        init();
        let mut audit = plurality();
        assert_eq!(audit.audit_status(), AuditStatus::NotStarted);
        assert_eq!(audit.optimistic_samples_to_audit(), 63);
        assert_eq!(audit.initial_samples_to_audit(), 63);
        audit.add_contest_cvr_ids(&ids(1..=63));
        // Drawn but not examined yet.
        audit.update_audit_status();
        assert_eq!(audit.audit_status(), AuditStatus::NotStarted);
        audit.signal_sample_audited(1, CvrId(1));
        audit.update_audit_status();
        assert_eq!(audit.audit_status(), AuditStatus::InProgress);
        for id in 2..=62 {
            audit.signal_sample_audited(1, CvrId(id));
        }
        audit.update_audit_status();
        assert_eq!(audit.audit_status(), AuditStatus::InProgress);
        assert_eq!(audit.optimistic_remaining(), 1);
        audit.signal_sample_audited(1, CvrId(63));
        audit.update_audit_status();
        assert_eq!(audit.audit_status(), AuditStatus::RiskLimitAchieved);
        assert!(audit.is_finished());
        audit.signal_sample_unaudited(1, CvrId(63));
        assert_eq!(audit.audit_status(), AuditStatus::InProgress);
        audit.update_audit_status();
        assert_eq!(audit.audit_status(), AuditStatus::InProgress);
        audit.end_audit();
        assert_eq!(audit.audit_status(), AuditStatus::Ended);
        audit.signal_sample_audited(1, CvrId(63));
        audit.update_audit_status();
        assert_eq!(audit.audit_status(), AuditStatus::Ended);
    }

    #[test]
    fn zero_margin_is_not_auditable() {
        let mut result = mayor_result();
        result.diluted_margin = BigRational::zero();
        let mut audit = ComparisonAudit::plurality(&result, &settings(), AuditReason::TiedContest);
        assert_eq!(audit.audit_status(), AuditStatus::NotAuditable);
        audit.update_audit_status();
        audit.end_audit();
        assert_eq!(audit.audit_status(), AuditStatus::NotAuditable);
        assert_eq!(audit.risk_measurement(), Risk::ONE);
    }

    #[test]
    fn opportunistic_samples_are_not_counted() {
        let mut audit =
            ComparisonAudit::plurality(&mayor_result(), &settings(), AuditReason::OpportunisticBenefits);
        audit.add_contest_cvr_ids(&ids(1..=3));
        audit.signal_sample_audited(1, CvrId(1));
        assert_eq!(audit.audited_sample_count(), 0);
        assert!(!audit.is_targeted());

        let mut audit = plurality();
        audit.add_contest_cvr_ids(&ids(1..=3));
        audit.signal_sample_audited(1, CvrId(9));
        assert_eq!(audit.audited_sample_count(), 0);
        audit.set_hand_count();
        audit.signal_sample_audited(1, CvrId(1));
        assert_eq!(audit.audited_sample_count(), 0);
        assert!(audit.is_hand_count());
    }

    #[test]
    fn discrepancies_move_sample_sizes() {
        init();
        let mut audit = plurality();
        audit.add_contest_cvr_ids(&[CvrId(1), CvrId(2), CvrId(2)]);
        assert_eq!(audit.multiplicity(CvrId(2)), 2);
        audit.record_discrepancy(CvrId(1), 1).unwrap();
        assert_eq!(audit.optimistic_samples_to_audit(), 76);
        for _ in 0..20 {
            audit.signal_sample_audited(1, CvrId(1));
        }
        assert_eq!(audit.estimated_samples_to_audit(), 80);
        assert_eq!(audit.estimated_remaining(), 60);
        assert_eq!(audit.discrepancy_for(CvrId(1)), Some(1));

        // Not drawn for this contest: kept, not counted.
        audit.record_discrepancy(CvrId(5), 2).unwrap();
        assert_eq!(audit.discrepancy_count(2), Ok(0));
        assert_eq!(audit.discrepancy_for(CvrId(5)), Some(2));

        audit.remove_discrepancy(CvrId(1), 1).unwrap();
        assert_eq!(audit.counts(), &DiscrepancyCounts::EMPTY);
        assert_eq!(audit.optimistic_samples_to_audit(), 63);
        assert_eq!(
            audit.remove_discrepancy(CvrId(1), 1),
            Err(AuditError::NegativeDiscrepancyCount { code: 1 })
        );
        assert_eq!(
            audit.record_discrepancy(CvrId(1), 3),
            Err(AuditError::InvalidDiscrepancy { code: 3 })
        );
    }

    #[test]
    fn risk_after_clean_sample() {
        let mut audit = plurality();
        audit.add_contest_cvr_ids(&ids(1..=100));
        assert_eq!(audit.risk_measurement(), Risk::ONE);
        for id in 1..=100 {
            audit.signal_sample_audited(1, CvrId(id));
        }
        assert_eq!(audit.risk_measurement().to_string(), "0.007");
    }

    #[test]
    fn disagreements() {
        let mut audit = plurality();
        audit.record_disagreement(CvrId(3));
        audit.record_disagreement(CvrId(3));
        assert_eq!(audit.disagreement_count(), 2);
        audit.remove_disagreement(CvrId(3));
        audit.remove_disagreement(CvrId(3));
        audit.remove_disagreement(CvrId(3));
        assert_eq!(audit.disagreement_count(), 0);
    }

    fn irv_result() -> ContestResult {
        let mut r = ContestResult::new("Mayor", ContestType::Irv);
        r.counties.insert(1);
        r.ballot_count = 1000;
        r
    }

    fn irv_audit() -> ComparisonAudit {
        let assertions = vec![
            Assertion::neb("Mayor", "Alice", "Bob", 100, 1000),
            Assertion::nen("Mayor", "Alice", "Chuan", &["Alice", "Chuan"], 200, 1000),
        ];
        ComparisonAudit::irv(&irv_result(), &settings(), AuditReason::CountyWideContest, assertions)
    }

    #[test]
    fn irv_takes_the_hardest_assertion() {
        let mut audit = irv_audit();
        assert_eq!(audit.contest_type(), ContestType::Irv);
        assert_eq!(audit.diluted_margin(), &stats::diluted_margin(1, 10));
        assert_eq!(audit.min_margin(), 100);
        assert_eq!(audit.optimistic_samples_to_audit(), 63);
        assert_eq!(audit.initial_samples_to_audit(), 63);
        assert_eq!(audit.risk_measurement(), Risk::ONE);

        let empty = ComparisonAudit::irv(&irv_result(), &settings(), AuditReason::CountyWideContest, vec![]);
        assert_eq!(empty.audit_status(), AuditStatus::NotAuditable);
        assert_eq!(empty.min_margin(), 0);
        assert_eq!(empty.initial_samples_to_audit(), 0);
        assert_eq!(empty.risk_measurement(), Risk::ONE);
    }

    #[test]
    fn irv_record_and_remove() {
        init();
        let mut audit = irv_audit();
        audit.add_contest_cvr_ids(&[CvrId(1)]);
        // NEB: -1 - 1 = -2. NEN (Alice, Chuan): 0 - 1 = -1.
        let d = audit.compute_discrepancy(&cvr(&["Bob"]), &acvr(&["Alice"])).unwrap();
        assert_eq!(d, Some(-1));
        assert_eq!(
            audit.record_discrepancy(CvrId(1), -2),
            Err(AuditError::DiscrepancyMismatch {
                contest: "Mayor".to_string(),
                cvr_id: CvrId(1),
                expected: Some(-1),
                given: -2
            })
        );
        audit.record_discrepancy(CvrId(1), -1).unwrap();
        assert_eq!(audit.counts().one_under, 1);
        assert_eq!(audit.assertions()[0].counts().two_under, 1);
        assert_eq!(audit.assertions()[1].counts().one_under, 1);

        audit.remove_discrepancy(CvrId(1), -1).unwrap();
        assert_eq!(audit.counts(), &DiscrepancyCounts::EMPTY);
        assert_eq!(audit.assertions()[0].counts(), &DiscrepancyCounts::EMPTY);
        assert!(audit.remove_discrepancy(CvrId(1), -1).is_err());
    }

    #[test]
    fn irv_samples_outside_the_contest() {
        let mut audit = irv_audit();
        audit.compute_discrepancy(&cvr(&["Alice"]), &acvr(&["Bob"])).unwrap();
        audit.record_discrepancy(CvrId(1), 2).unwrap();
        assert_eq!(audit.counts(), &DiscrepancyCounts::EMPTY);
        assert_eq!(audit.discrepancy_for(CvrId(1)), Some(2));
        audit.remove_discrepancy(CvrId(1), 2).unwrap();
        assert_eq!(audit.discrepancy_for(CvrId(1)), None);
        // Nothing cached by the assertions for this CVR.
        assert!(audit.record_discrepancy(CvrId(2), 0).is_err());
    }

    #[test]
    fn irv_estimates_and_risk() {
        let mut audit = irv_audit();
        audit.add_contest_cvr_ids(&ids(1..=50));
        audit.compute_discrepancy(&cvr(&["Alice"]), &acvr(&["Wendy"])).unwrap();
        audit.record_discrepancy(CvrId(1), 1).unwrap();
        for id in 1..=20 {
            audit.signal_sample_audited(1, CvrId(id));
        }
        assert_eq!(audit.optimistic_samples_to_audit(), 76);
        assert_eq!(audit.estimated_samples_to_audit(), 80);
        for id in 21..=50 {
            audit.signal_sample_audited(1, CvrId(id));
        }
        assert_eq!(audit.risk_measurement().to_string(), "0.164");
        audit.update_audit_status();
        assert_eq!(audit.assertions()[0].current_risk().to_string(), "0.164");
        assert!(audit
            .description()
            .starts_with("IRV audit of Mayor: status IN_PROGRESS"));
    }
}
