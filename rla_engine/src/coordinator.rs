//! The audit round lifecycle of a county.
//!
//! The coordinator applies the decisions of the audit board to the comparison
//! audits of a county dashboard. Records are loaded from and saved to an
//! [`AuditRepository`] passed in by the caller.
//!
//! A CVR may be drawn several times for a contest, possibly in different rounds.
//! Each [`CvrAuditInfo`] remembers how many of those occurrences have already been
//! counted for each contest, so that auditing the ballot again only counts the new
//! occurrences.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use log::{debug, error, info, warn};

use crate::assertion::Assertion;
use crate::comparison_audit::ComparisonAudit;
use crate::config::{AuditError, AuditReason, AuditSettings, ContestType, RecordType};
use crate::cvr::{CastVoteRecord, CvrAuditInfo, CvrId};
use crate::dashboard::CountyDashboard;
use crate::tally::ContestResult;

/// Storage of the records an audit works on.
///
/// Values are returned by copy: callers save what they change.
pub trait AuditRepository {
    fn cvr(&self, cvr_id: CvrId) -> Option<CastVoteRecord>;

    fn save_cvr(&mut self, cvr: CastVoteRecord);

    fn audit_info(&self, cvr_id: CvrId) -> Option<CvrAuditInfo>;

    fn save_audit_info(&mut self, info: CvrAuditInfo);

    /// Stores the current audited record of a CVR, replacing the previous one
    /// unless it was superseded.
    fn record_acvr(&mut self, cvr_id: CvrId, acvr: CastVoteRecord);

    /// Replaces the current audited record with its superseded form `old`, then
    /// stores `new` as the current one.
    fn supersede_acvr(&mut self, cvr_id: CvrId, old: CastVoteRecord, new: CastVoteRecord);

    /// All the audited records of a CVR, oldest first.
    fn acvr_history(&self, cvr_id: CvrId) -> Vec<CastVoteRecord>;

    /// The highest revision among the audited records of a CVR, 0 if none.
    fn max_revision(&self, cvr_id: CvrId) -> u64 {
        self.acvr_history(cvr_id)
            .iter()
            .map(|acvr| acvr.revision)
            .max()
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryRepository {
    cvrs: BTreeMap<CvrId, CastVoteRecord>,
    infos: BTreeMap<CvrId, CvrAuditInfo>,
    acvrs: BTreeMap<CvrId, Vec<CastVoteRecord>>,
}

impl InMemoryRepository {
    pub fn new() -> InMemoryRepository {
        InMemoryRepository::default()
    }

    pub fn cvr_count(&self) -> usize {
        self.cvrs.len()
    }

    /// The number of uploaded CVRs of each county.
    pub fn cvr_counts_by_county(&self) -> BTreeMap<u64, u64> {
        let mut res = BTreeMap::new();
        for cvr in self.cvrs.values() {
            *res.entry(cvr.county_id).or_insert(0) += 1;
        }
        res
    }
}

impl AuditRepository for InMemoryRepository {
    fn cvr(&self, cvr_id: CvrId) -> Option<CastVoteRecord> {
        self.cvrs.get(&cvr_id).cloned()
    }

    fn save_cvr(&mut self, cvr: CastVoteRecord) {
        self.cvrs.insert(cvr.id, cvr);
    }

    fn audit_info(&self, cvr_id: CvrId) -> Option<CvrAuditInfo> {
        self.infos.get(&cvr_id).cloned()
    }

    fn save_audit_info(&mut self, info: CvrAuditInfo) {
        self.infos.insert(info.cvr_id, info);
    }

    fn record_acvr(&mut self, cvr_id: CvrId, acvr: CastVoteRecord) {
        let history = self.acvrs.entry(cvr_id).or_default();
        match history.last_mut() {
            Some(last) if last.record_type != RecordType::Reaudited => {
                *last = acvr;
            }
            _ => history.push(acvr),
        }
    }

    fn supersede_acvr(&mut self, cvr_id: CvrId, old: CastVoteRecord, new: CastVoteRecord) {
        let history = self.acvrs.entry(cvr_id).or_default();
        match history.last_mut() {
            Some(last) => *last = old,
            None => history.push(old),
        }
        history.push(new);
    }

    fn acvr_history(&self, cvr_id: CvrId) -> Vec<CastVoteRecord> {
        self.acvrs.get(&cvr_id).cloned().unwrap_or_default()
    }
}

/// A ballot the audit board has to retrieve in a round.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct BallotToAudit {
    pub cvr_id: CvrId,
    /// An audited record is attached to the CVR.
    pub audited: bool,
    /// The ballot was already part of an earlier round.
    pub previously_audited: bool,
}

/// True if `acvr` may be attached to `cvr`: it describes the same card and was
/// entered by an audit board or generated by the system.
pub fn check_acvr_sanity(cvr: &CastVoteRecord, acvr: &CastVoteRecord) -> bool {
    cvr.is_audit_pair_with(acvr)
        && (acvr.record_type.is_auditor_generated() || acvr.record_type.is_system_generated())
}

/// Builds the comparison audit matching the type of the contest.
pub fn create_audit_of_correct_type(
    result: &ContestResult,
    settings: &AuditSettings,
    reason: AuditReason,
    assertions: Vec<Assertion>,
) -> Result<ComparisonAudit, AuditError> {
    match result.contest_type() {
        Some(ContestType::Plurality) => Ok(ComparisonAudit::plurality(result, settings, reason)),
        Some(ContestType::Irv) => Ok(ComparisonAudit::irv(result, settings, reason, assertions)),
        None => {
            error!(
                "create_audit_of_correct_type: contest {} has types {:?}",
                result.contest_name, result.contest_types
            );
            Err(AuditError::InconsistentContestTypes {
                contest: result.contest_name.clone(),
            })
        }
    }
}

fn distinct(cvr_ids: &[CvrId]) -> Vec<CvrId> {
    let mut seen = HashSet::new();
    cvr_ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

fn reason_for(audit: &ComparisonAudit, cvr_id: CvrId) -> AuditReason {
    if audit.is_covering(cvr_id) && audit.audit_reason().is_targeted() {
        audit.audit_reason()
    } else {
        AuditReason::OpportunisticBenefits
    }
}

fn disagrees_on(acvr: &CastVoteRecord, contest: &str) -> bool {
    acvr.contest_info_for(contest)
        .map(|ci| !ci.has_consensus())
        .unwrap_or(false)
}

/// Drives the rounds of the counties and applies audit board submissions.
///
/// The coordinator holds one comparison audit per contest. A dashboard works on
/// the audits of the contests its county takes part in, so the samples and
/// discrepancies found in every county of a contest add up in the same audit.
#[derive(Debug, Clone)]
pub struct AuditRoundCoordinator<R: AuditRepository> {
    repository: R,
    audits: BTreeMap<String, ComparisonAudit>,
}

impl<R: AuditRepository> AuditRoundCoordinator<R> {
    pub fn new(repository: R) -> AuditRoundCoordinator<R> {
        AuditRoundCoordinator {
            repository,
            audits: BTreeMap::new(),
        }
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    pub fn repository_mut(&mut self) -> &mut R {
        &mut self.repository
    }

    fn load_cvr(&self, cvr_id: CvrId) -> Result<CastVoteRecord, AuditError> {
        self.repository.cvr(cvr_id).ok_or_else(|| {
            error!("load_cvr: unknown CVR {}", cvr_id);
            AuditError::UnknownCvr(cvr_id)
        })
    }

    // ********* Audits **********

    /// Registers the audit of a contest. An audit already registered for the
    /// same contest is replaced.
    pub fn add_audit(&mut self, audit: ComparisonAudit) {
        let contest = audit.contest_name().to_string();
        if self.audits.contains_key(&contest) {
            warn!("add_audit: replacing the audit of {}", contest);
        }
        self.audits.insert(contest, audit);
    }

    pub fn audit_for(&self, contest: &str) -> Option<&ComparisonAudit> {
        self.audits.get(contest)
    }

    pub fn audit_for_mut(&mut self, contest: &str) -> Option<&mut ComparisonAudit> {
        self.audits.get_mut(contest)
    }

    /// All the audits, by contest name.
    pub fn audits(&self) -> impl Iterator<Item = &ComparisonAudit> {
        self.audits.values()
    }

    pub fn audits_mut(&mut self) -> impl Iterator<Item = &mut ComparisonAudit> {
        self.audits.values_mut()
    }

    /// The audits of the contests the county takes part in.
    pub fn county_audits(&self, county_id: u64) -> impl Iterator<Item = &ComparisonAudit> {
        self.audits.values().filter(move |a| a.is_for_county(county_id))
    }

    pub fn update_audit_status(&mut self, cdb: &CountyDashboard) {
        let county_id = cdb.county_id;
        for audit in self.audits.values_mut().filter(|a| a.is_for_county(county_id)) {
            audit.update_audit_status();
        }
        debug!(
            "update_audit_status: county {} statuses {:?}",
            county_id,
            self.county_audits(county_id)
                .map(|a| (a.contest_name(), a.audit_status()))
                .collect::<Vec<_>>()
        );
    }

    /// Attaches the samples drawn for each contest to their audits and returns
    /// the round's audit subsequence (every drawn CVR, with repetitions) and
    /// ballot sequence (the distinct CVRs, sorted).
    ///
    /// Samples for contests the county does not take part in are ignored.
    pub fn round_sequences(
        &mut self,
        cdb: &CountyDashboard,
        samples: &BTreeMap<String, Vec<CvrId>>,
    ) -> (Vec<CvrId>, Vec<CvrId>) {
        let mut audit_sequence = Vec::new();
        for (contest, cvr_ids) in samples {
            match self.audits.get_mut(contest) {
                Some(audit) if audit.is_for_county(cdb.county_id) => {
                    audit.add_contest_cvr_ids(cvr_ids);
                    audit_sequence.extend_from_slice(cvr_ids);
                }
                _ => warn!(
                    "round_sequences: county {} does not audit contest {}",
                    cdb.county_id, contest
                ),
            }
        }
        let ballot_sequence: BTreeSet<CvrId> = audit_sequence.iter().copied().collect();
        (audit_sequence, ballot_sequence.into_iter().collect())
    }

    // ********* Rounds **********

    /// Starts a new round on the dashboard and catches up with the ballots of the
    /// round that were already audited.
    ///
    /// Returns true if ballots remain to examine in the round.
    pub fn start_round(
        &mut self,
        cdb: &mut CountyDashboard,
        audit_sequence: Vec<CvrId>,
        ballot_sequence: Vec<CvrId>,
    ) -> Result<bool, AuditError> {
        info!(
            "start_round: county {}, {} ballots, {} samples",
            cdb.county_id,
            ballot_sequence.len(),
            audit_sequence.len()
        );
        cdb.start_round(
            ballot_sequence.len(),
            audit_sequence.len(),
            0,
            ballot_sequence,
            audit_sequence,
        );
        self.update_round(cdb)?;
        self.update_cvr_under_audit(cdb)?;
        Ok(cdb
            .current_round()
            .map(|round| round.ballots_remaining() > 0)
            .unwrap_or(false))
    }

    /// Counts in the new round the discrepancies and disagreements of the ballots
    /// it contains that were audited earlier.
    fn update_round(&mut self, cdb: &mut CountyDashboard) -> Result<(), AuditError> {
        let subsequence = match cdb.current_round() {
            Some(round) => round.audit_subsequence.clone(),
            None => return Err(AuditError::NoCurrentRound),
        };
        let county_id = cdb.county_id;
        for cvr_id in distinct(&subsequence) {
            let info = self
                .repository
                .audit_info(cvr_id)
                .unwrap_or_else(|| CvrAuditInfo::new(cvr_id));
            if let Some(acvr) = info.acvr().cloned() {
                let cvr = self.load_cvr(cvr_id)?;
                let mut round_discrepancies = Vec::new();
                let mut round_disagreements = Vec::new();
                for audit in self.audits.values_mut().filter(|a| a.is_for_county(county_id)) {
                    let reason = reason_for(audit, cvr_id);
                    let multiplicity = audit.multiplicity(cvr_id);
                    if audit.compute_discrepancy(&cvr, &acvr)?.is_some() {
                        round_discrepancies.push((reason, multiplicity));
                    }
                    if disagrees_on(&acvr, audit.contest_name()) {
                        round_disagreements.push((reason, multiplicity));
                    }
                }
                if let Some(round) = cdb.current_round_mut() {
                    for (reason, multiplicity) in round_discrepancies {
                        let reasons = [reason].into_iter().collect();
                        for _ in 0..multiplicity {
                            round.add_discrepancy(&reasons);
                        }
                    }
                    for (reason, multiplicity) in round_disagreements {
                        let reasons = [reason].into_iter().collect();
                        for _ in 0..multiplicity {
                            round.add_disagreement(&reasons);
                        }
                    }
                }
            }
            self.repository.save_audit_info(info);
        }
        Ok(())
    }

    /// Moves the audited prefix of the round past every ballot that already has an
    /// audited record, counting the occurrences not counted yet. Stops at the
    /// first ballot the audit board still has to examine.
    pub fn update_cvr_under_audit(&mut self, cdb: &mut CountyDashboard) -> Result<(), AuditError> {
        let (start, subsequence) = match cdb.current_round() {
            Some(round) => (
                round.start_audited_prefix_length,
                round.audit_subsequence.clone(),
            ),
            None => {
                debug!("update_cvr_under_audit: county {} has no current round", cdb.county_id);
                self.update_audit_status(cdb);
                return Ok(());
            }
        };
        let mut index = cdb.audited_prefix_length().saturating_sub(start);
        let mut checked = HashSet::new();
        while index < subsequence.len() {
            let cvr_id = subsequence[index];
            if !checked.contains(&cvr_id) {
                let mut info = match self.repository.audit_info(cvr_id) {
                    Some(info) if info.acvr().is_some() => info,
                    _ => break,
                };
                let count = self.audit(cdb, &mut info, false)?;
                self.repository.save_audit_info(info);
                cdb.set_audited_sample_count(cdb.audited_sample_count() + count);
                checked.insert(cvr_id);
            }
            index += 1;
        }
        debug!(
            "update_cvr_under_audit: county {} audited prefix {}",
            cdb.county_id,
            index + start
        );
        cdb.set_audited_prefix_length(index + start);
        self.update_audit_status(cdb);
        Ok(())
    }

    // ********* Auditing **********

    /// Counts, for every audit of the county, the occurrences of the ballot not
    /// counted yet. Returns the number of occurrences counted.
    fn audit(
        &mut self,
        cdb: &mut CountyDashboard,
        info: &mut CvrAuditInfo,
        update_counters: bool,
    ) -> Result<u32, AuditError> {
        let cvr = self.load_cvr(info.cvr_id)?;
        let acvr = info
            .acvr()
            .cloned()
            .ok_or(AuditError::MissingAuditedBallot(info.cvr_id))?;
        let county_id = cdb.county_id;
        let mut discrepancies = BTreeSet::new();
        let mut disagreements = BTreeSet::new();
        let mut total = 0;
        for audit in self.audits.values_mut().filter(|a| a.is_for_county(county_id)) {
            let contest = audit.contest_name().to_string();
            let multiplicity = audit.multiplicity(cvr.id);
            let audit_count = multiplicity.saturating_sub(info.count_for(&contest));
            total += audit_count;
            info.set_count_for(&contest, multiplicity);
            let reason = reason_for(audit, cvr.id);

            if let Some(code) = audit.compute_discrepancy(&cvr, &acvr)? {
                for _ in 0..audit_count {
                    audit.record_discrepancy(cvr.id, code)?;
                }
                discrepancies.insert(reason);
            }
            if disagrees_on(&acvr, &contest) {
                for _ in 0..audit_count {
                    audit.record_disagreement(cvr.id);
                }
                disagreements.insert(reason);
            }
            audit.signal_sample_audited(audit_count, cvr.id);
        }
        if update_counters {
            cdb.add_discrepancy(&discrepancies);
            cdb.add_disagreement(&disagreements);
        }
        info.set_discrepancy(discrepancies);
        info.set_disagreement(disagreements);
        Ok(total)
    }

    /// Reverses [`Self::audit`] for the occurrences of the ballot counted so far.
    /// Returns the number of occurrences uncounted.
    fn unaudit(&mut self, cdb: &mut CountyDashboard, info: &mut CvrAuditInfo) -> Result<u32, AuditError> {
        let cvr = self.load_cvr(info.cvr_id)?;
        let acvr = info
            .acvr()
            .cloned()
            .ok_or(AuditError::MissingAuditedBallot(info.cvr_id))?;
        let county_id = cdb.county_id;
        let mut discrepancies = BTreeSet::new();
        let mut disagreements = BTreeSet::new();
        let mut total = 0;
        for audit in self.audits.values_mut().filter(|a| a.is_for_county(county_id)) {
            let contest = audit.contest_name().to_string();
            // Occurrences drawn after the last count were never recorded.
            let audit_count = info.count_for(&contest);
            total += audit_count;
            let reason = reason_for(audit, cvr.id);

            if let Some(code) = audit.compute_discrepancy(&cvr, &acvr)? {
                for _ in 0..audit_count {
                    audit.remove_discrepancy(cvr.id, code)?;
                }
                discrepancies.insert(reason);
            }
            if disagrees_on(&acvr, &contest) {
                for _ in 0..audit_count {
                    audit.remove_disagreement(cvr.id);
                }
                disagreements.insert(reason);
            }
            audit.signal_sample_unaudited(audit_count, cvr.id);
        }
        cdb.remove_discrepancy(&discrepancies);
        cdb.remove_disagreement(&disagreements);
        info.set_discrepancy(BTreeSet::new());
        info.set_disagreement(BTreeSet::new());
        info.reset_counted();
        Ok(total)
    }

    /// Attaches the audit board's record to a sampled CVR.
    ///
    /// Returns false, without changing anything, if the CVR is not under audit or
    /// the record does not describe the same card. Submitting again for the same
    /// CVR replaces the previous record.
    pub fn submit_audit_cvr(
        &mut self,
        cdb: &mut CountyDashboard,
        cvr_id: CvrId,
        acvr: CastVoteRecord,
    ) -> Result<bool, AuditError> {
        let mut info = match self.repository.audit_info(cvr_id) {
            Some(info) => info,
            None => {
                warn!("submit_audit_cvr: CVR {} is not under audit", cvr_id);
                return Ok(false);
            }
        };
        let cvr = self.load_cvr(cvr_id)?;
        if !check_acvr_sanity(&cvr, &acvr) {
            warn!(
                "submit_audit_cvr: rejected record {} ({}, imprinted id {}) for CVR {} (imprinted id {})",
                acvr.id, acvr.record_type, acvr.imprinted_id, cvr_id, cvr.imprinted_id
            );
            return Ok(false);
        }

        if info.acvr().is_none() {
            info.set_acvr(acvr.clone());
            let new_count = self.audit(cdb, &mut info, true)?;
            cdb.add_audited_ballot();
            cdb.set_audited_sample_count(cdb.audited_sample_count() + new_count);
            debug!("submit_audit_cvr: CVR {} counted {} samples", cvr_id, new_count);
        } else {
            let former_count = self.unaudit(cdb, &mut info)?;
            info.set_acvr(acvr.clone());
            let new_count = self.audit(cdb, &mut info, true)?;
            cdb.set_audited_sample_count(
                (cdb.audited_sample_count() + new_count).saturating_sub(former_count),
            );
            info!(
                "submit_audit_cvr: CVR {} re-interpreted, {} samples uncounted, {} counted",
                cvr_id, former_count, new_count
            );
        }
        self.repository.record_acvr(cvr_id, acvr);
        self.repository.save_audit_info(info);
        self.update_cvr_under_audit(cdb)?;
        Ok(true)
    }

    /// Replaces the audited record of a CVR after a second look at the ballot. The
    /// previous record is kept as superseded.
    ///
    /// Returns false if the CVR was never audited or the new record does not
    /// describe the same card.
    pub fn reaudit(
        &mut self,
        cdb: &mut CountyDashboard,
        cvr_id: CvrId,
        mut new_acvr: CastVoteRecord,
        comment: &str,
    ) -> Result<bool, AuditError> {
        let mut info = match self.repository.audit_info(cvr_id) {
            Some(info) if info.acvr().is_some() => info,
            _ => {
                error!("reaudit: CVR {} was not audited yet", cvr_id);
                return Ok(false);
            }
        };
        let cvr = self.load_cvr(cvr_id)?;
        if !check_acvr_sanity(&cvr, &new_acvr) {
            warn!("reaudit: rejected record {} for CVR {}", new_acvr.id, cvr_id);
            return Ok(false);
        }
        let mut old_acvr = info
            .acvr()
            .cloned()
            .ok_or(AuditError::MissingAuditedBallot(cvr_id))?;

        let former_count = self.unaudit(cdb, &mut info)?;

        let mut revision = self.repository.max_revision(cvr_id);
        if revision == 0 {
            revision = 1;
            old_acvr.revision = 1;
        }
        old_acvr.set_to_reaudited();
        new_acvr.comment = Some(comment.to_string());
        new_acvr.revision = revision + 1;
        self.repository
            .supersede_acvr(cvr_id, old_acvr, new_acvr.clone());

        info.set_acvr(new_acvr);
        let new_count = self.audit(cdb, &mut info, true)?;
        cdb.set_audited_sample_count(
            (cdb.audited_sample_count() + new_count).saturating_sub(former_count),
        );
        self.repository.save_audit_info(info);
        info!(
            "reaudit: CVR {} now at revision {}, {} samples uncounted, {} counted",
            cvr_id,
            revision + 1,
            former_count,
            new_count
        );
        self.update_audit_status(cdb);
        Ok(true)
    }

    // ********* Queries **********

    /// True if the CVR has an audited record attached.
    pub fn is_audited(&self, cvr_id: CvrId) -> bool {
        self.repository
            .audit_info(cvr_id)
            .map(|info| info.acvr().is_some())
            .unwrap_or(false)
    }

    /// The distinct CVRs drawn in a round, in drawing order. Rounds start at 1.
    pub fn cvrs_to_audit_in_round(
        &self,
        cdb: &CountyDashboard,
        round_number: usize,
    ) -> Result<Vec<CvrId>, AuditError> {
        if round_number < 1 || round_number > cdb.rounds().len() {
            return Err(AuditError::InvalidRound(round_number));
        }
        let round = &cdb.rounds()[round_number - 1];
        Ok(distinct(&round.audit_subsequence))
    }

    /// The CVRs of the current round past the audited prefix.
    pub fn cvr_ids_remaining_in_current_round(&self, cdb: &CountyDashboard) -> Vec<CvrId> {
        match cdb.current_round() {
            Some(round) => {
                let from = round
                    .actual_audited_prefix_length
                    .saturating_sub(round.start_audited_prefix_length);
                let to = round
                    .expected_audited_prefix_length
                    .min(round.audit_subsequence.len());
                round
                    .audit_subsequence
                    .get(from..to)
                    .map(|ids| ids.to_vec())
                    .unwrap_or_default()
            }
            None => Vec::new(),
        }
    }

    /// The ballots to retrieve in a round, empty if there is no such round.
    pub fn ballots_to_audit(&self, cdb: &CountyDashboard, round_number: usize) -> Vec<BallotToAudit> {
        if round_number < 1 || round_number > cdb.rounds().len() {
            debug!("ballots_to_audit: no round {}", round_number);
            return Vec::new();
        }
        let earlier: HashSet<CvrId> = cdb.rounds()[..round_number - 1]
            .iter()
            .flat_map(|round| round.ballot_sequence.iter().copied())
            .collect();
        cdb.rounds()[round_number - 1]
            .ballot_sequence
            .iter()
            .map(|cvr_id| BallotToAudit {
                cvr_id: *cvr_id,
                audited: self.is_audited(*cvr_id),
                previously_audited: earlier.contains(cvr_id),
            })
            .collect()
    }

    /// The largest estimate of the ballots still to examine among the driving
    /// contests of the county.
    pub fn estimated_samples_to_audit(&mut self, cdb: &CountyDashboard) -> u32 {
        let driving = cdb.driving_contests();
        self.audits
            .values_mut()
            .filter(|a| driving.contains(a.contest_name()))
            .map(|a| a.estimated_remaining())
            .max()
            .unwrap_or(0)
    }
}
