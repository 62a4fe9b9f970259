// ********* County dashboards and rounds ***********

use std::collections::{BTreeMap, BTreeSet};

use log::info;

use crate::config::{AuditError, AuditReason};
use crate::cvr::CvrId;

/// One round of the audit in a county.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Round {
    /// Starts at 1.
    pub number: usize,
    /// The number of distinct ballots to examine in this round.
    pub expected_count: usize,
    /// The number of ballots examined so far in this round.
    pub actual_count: usize,
    pub start_audited_prefix_length: usize,
    pub expected_audited_prefix_length: usize,
    pub actual_audited_prefix_length: usize,
    /// The distinct ballots to retrieve, in retrieval order.
    pub ballot_sequence: Vec<CvrId>,
    /// The CVRs drawn for this round, in drawing order, with repetitions.
    pub audit_subsequence: Vec<CvrId>,
    discrepancies: BTreeMap<AuditReason, u32>,
    disagreements: BTreeMap<AuditReason, u32>,
}

fn add_reasons(counts: &mut BTreeMap<AuditReason, u32>, reasons: &BTreeSet<AuditReason>) {
    for r in reasons {
        *counts.entry(*r).or_insert(0) += 1;
    }
}

fn remove_reasons(counts: &mut BTreeMap<AuditReason, u32>, reasons: &BTreeSet<AuditReason>) {
    for r in reasons {
        if let Some(c) = counts.get_mut(r) {
            *c = c.saturating_sub(1);
        }
    }
}

impl Round {
    pub fn new(
        number: usize,
        expected_count: usize,
        expected_audited_prefix_length: usize,
        start_audited_prefix_length: usize,
        ballot_sequence: Vec<CvrId>,
        audit_subsequence: Vec<CvrId>,
    ) -> Round {
        Round {
            number,
            expected_count,
            actual_count: 0,
            start_audited_prefix_length,
            expected_audited_prefix_length,
            actual_audited_prefix_length: start_audited_prefix_length,
            ballot_sequence,
            audit_subsequence,
            discrepancies: BTreeMap::new(),
            disagreements: BTreeMap::new(),
        }
    }

    pub fn discrepancies(&self) -> &BTreeMap<AuditReason, u32> {
        &self.discrepancies
    }

    pub fn disagreements(&self) -> &BTreeMap<AuditReason, u32> {
        &self.disagreements
    }

    pub fn add_discrepancy(&mut self, reasons: &BTreeSet<AuditReason>) {
        add_reasons(&mut self.discrepancies, reasons);
    }

    pub fn add_disagreement(&mut self, reasons: &BTreeSet<AuditReason>) {
        add_reasons(&mut self.disagreements, reasons);
    }

    pub fn is_complete(&self) -> bool {
        self.actual_count >= self.expected_count
    }

    /// The distinct ballots still to examine.
    pub fn ballots_remaining(&self) -> usize {
        self.expected_count.saturating_sub(self.actual_count)
    }
}

/// The audit state of one county: its rounds and the counters shown to the
/// audit board.
///
/// The comparison audits are not held here. A contest may span several
/// counties, and its single audit is kept by the
/// [`AuditRoundCoordinator`](crate::coordinator::AuditRoundCoordinator).
#[derive(PartialEq, Debug, Clone)]
pub struct CountyDashboard {
    pub county_id: u64,
    driving_contests: BTreeSet<String>,
    rounds: Vec<Round>,
    current_round_index: Option<usize>,
    audited_prefix_length: usize,
    audited_sample_count: u32,
    ballots_audited: u32,
    discrepancies: BTreeMap<AuditReason, u32>,
    disagreements: BTreeMap<AuditReason, u32>,
}

impl CountyDashboard {
    pub fn new(county_id: u64) -> CountyDashboard {
        CountyDashboard {
            county_id,
            driving_contests: BTreeSet::new(),
            rounds: Vec::new(),
            current_round_index: None,
            audited_prefix_length: 0,
            audited_sample_count: 0,
            ballots_audited: 0,
            discrepancies: BTreeMap::new(),
            disagreements: BTreeMap::new(),
        }
    }

    /// The contests the sample is drawn for.
    pub fn driving_contests(&self) -> &BTreeSet<String> {
        &self.driving_contests
    }

    pub fn set_driving_contests(&mut self, contests: BTreeSet<String>) {
        self.driving_contests = contests;
    }

    // ********* Rounds **********

    pub fn start_round(
        &mut self,
        number_of_ballots: usize,
        audit_subsequence_length: usize,
        start_index: usize,
        ballot_sequence: Vec<CvrId>,
        audit_subsequence: Vec<CvrId>,
    ) {
        let index = self.rounds.len();
        let round = Round::new(
            index + 1,
            number_of_ballots,
            audit_subsequence_length,
            start_index,
            ballot_sequence,
            audit_subsequence,
        );
        info!(
            "start_round: county {} round {}, {} ballots",
            self.county_id, round.number, number_of_ballots
        );
        self.rounds.push(round);
        self.current_round_index = Some(index);
        self.audited_prefix_length = start_index;
    }

    pub fn end_round(&mut self) -> Result<(), AuditError> {
        let round = self.current_round().ok_or(AuditError::NoCurrentRound)?;
        info!(
            "end_round: county {} round {}, {} of {} ballots audited",
            self.county_id, round.number, round.actual_count, round.expected_count
        );
        self.current_round_index = None;
        Ok(())
    }

    pub fn current_round(&self) -> Option<&Round> {
        self.current_round_index.and_then(|idx| self.rounds.get(idx))
    }

    pub fn current_round_mut(&mut self) -> Option<&mut Round> {
        match self.current_round_index {
            Some(idx) => self.rounds.get_mut(idx),
            None => None,
        }
    }

    pub fn rounds(&self) -> &[Round] {
        &self.rounds
    }

    /// The number of entries of the current round's audit subsequence already
    /// processed, counted from the start of the audit.
    pub fn audited_prefix_length(&self) -> usize {
        self.audited_prefix_length
    }

    pub fn set_audited_prefix_length(&mut self, length: usize) {
        self.audited_prefix_length = length;
        if let Some(round) = self.current_round_mut() {
            round.actual_audited_prefix_length = length;
        }
    }

    // ********* Counters **********

    /// The samples counted toward the risk limit, with repetitions.
    pub fn audited_sample_count(&self) -> u32 {
        self.audited_sample_count
    }

    pub fn set_audited_sample_count(&mut self, count: u32) {
        self.audited_sample_count = count;
    }

    /// The distinct ballots examined by the audit board.
    pub fn ballots_audited(&self) -> u32 {
        self.ballots_audited
    }

    pub fn add_audited_ballot(&mut self) {
        self.ballots_audited += 1;
        if let Some(round) = self.current_round_mut() {
            round.actual_count += 1;
        }
    }

    pub fn add_discrepancy(&mut self, reasons: &BTreeSet<AuditReason>) {
        add_reasons(&mut self.discrepancies, reasons);
        if let Some(round) = self.current_round_mut() {
            add_reasons(&mut round.discrepancies, reasons);
        }
    }

    pub fn remove_discrepancy(&mut self, reasons: &BTreeSet<AuditReason>) {
        remove_reasons(&mut self.discrepancies, reasons);
        if let Some(round) = self.current_round_mut() {
            remove_reasons(&mut round.discrepancies, reasons);
        }
    }

    pub fn add_disagreement(&mut self, reasons: &BTreeSet<AuditReason>) {
        add_reasons(&mut self.disagreements, reasons);
        if let Some(round) = self.current_round_mut() {
            add_reasons(&mut round.disagreements, reasons);
        }
    }

    pub fn remove_disagreement(&mut self, reasons: &BTreeSet<AuditReason>) {
        remove_reasons(&mut self.disagreements, reasons);
        if let Some(round) = self.current_round_mut() {
            remove_reasons(&mut round.disagreements, reasons);
        }
    }

    pub fn discrepancies(&self) -> &BTreeMap<AuditReason, u32> {
        &self.discrepancies
    }

    pub fn disagreements(&self) -> &BTreeMap<AuditReason, u32> {
        &self.disagreements
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reasons(rs: &[AuditReason]) -> BTreeSet<AuditReason> {
        rs.iter().copied().collect()
    }

    #[test]
    fn rounds_and_counters() {
        let mut cdb = CountyDashboard::new(4);
        assert_eq!(cdb.end_round(), Err(AuditError::NoCurrentRound));
        cdb.start_round(2, 3, 0, vec![CvrId(1), CvrId(2)], vec![CvrId(2), CvrId(1), CvrId(2)]);
        assert_eq!(cdb.current_round().unwrap().number, 1);
        cdb.add_audited_ballot();
        cdb.add_discrepancy(&reasons(&[AuditReason::CountyWideContest]));
        cdb.add_discrepancy(&reasons(&[
            AuditReason::CountyWideContest,
            AuditReason::OpportunisticBenefits,
        ]));
        cdb.remove_discrepancy(&reasons(&[AuditReason::OpportunisticBenefits]));
        cdb.add_disagreement(&reasons(&[AuditReason::StateWideContest]));
        cdb.set_audited_prefix_length(2);

        let round = cdb.current_round().unwrap();
        assert_eq!(round.actual_count, 1);
        assert!(!round.is_complete());
        assert_eq!(round.actual_audited_prefix_length, 2);
        assert_eq!(round.discrepancies()[&AuditReason::CountyWideContest], 2);
        assert_eq!(round.discrepancies()[&AuditReason::OpportunisticBenefits], 0);
        assert_eq!(cdb.disagreements()[&AuditReason::StateWideContest], 1);
        assert_eq!(cdb.ballots_audited(), 1);

        cdb.end_round().unwrap();
        assert!(cdb.current_round().is_none());
        cdb.start_round(1, 1, 3, vec![CvrId(5)], vec![CvrId(5)]);
        let round = cdb.current_round().unwrap();
        assert_eq!(round.number, 2);
        assert_eq!(cdb.audited_prefix_length(), 3);
        assert!(round.discrepancies().is_empty());
        assert_eq!(cdb.discrepancies()[&AuditReason::CountyWideContest], 2);
    }
}
