//! NEB and NEN assertions of an IRV contest.
//!
//! The assertions are produced outside of this crate, by a solver that looks at
//! the full set of ballots. Jointly, they imply that the reported winner won. The
//! audit checks each of them independently: each assertion behaves like a
//! two-candidate plurality contest between its winner and its loser, with its own
//! discrepancy counters, sample sizes and risk.

use std::collections::BTreeMap;
use std::fmt::Display;

use log::{debug, error, info};
use num::BigRational;

use crate::config::AuditError;
use crate::cvr::{CastVoteRecord, CvrContestInfo, CvrId};
use crate::decimal::Risk;
use crate::stats::{self, DiscrepancyCounts};

#[derive(Eq, PartialEq, Debug, Clone)]
pub enum AssertionKind {
    /// The winner cannot be eliminated before the loser: the winner always has
    /// more first preferences than the loser has votes at any point of the count.
    NotEliminatedBefore,
    /// When only the continuing candidates remain, the loser is eliminated
    /// before the winner.
    NotEliminatedNext { continuing: Vec<String> },
}

impl Display for AssertionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssertionKind::NotEliminatedBefore => write!(f, "NEB"),
            AssertionKind::NotEliminatedNext { .. } => write!(f, "NEN"),
        }
    }
}

/// One assertion, together with the state of its audit.
#[derive(PartialEq, Debug, Clone)]
pub struct Assertion {
    pub contest: String,
    pub winner: String,
    pub loser: String,
    pub kind: AssertionKind,
    /// In votes.
    pub margin: u64,
    pub diluted_margin: BigRational,
    /// As estimated by the solver. Only reported.
    pub difficulty: f64,
    cvr_discrepancy: BTreeMap<CvrId, i32>,
    counts: DiscrepancyCounts,
    optimistic_samples_to_audit: u32,
    estimated_samples_to_audit: u32,
    current_risk: Risk,
}

impl Assertion {
    pub fn new(
        contest: &str,
        winner: &str,
        loser: &str,
        kind: AssertionKind,
        margin: u64,
        universe_size: u64,
        difficulty: f64,
    ) -> Assertion {
        Assertion {
            contest: contest.to_string(),
            winner: winner.to_string(),
            loser: loser.to_string(),
            kind,
            margin,
            diluted_margin: stats::diluted_margin(margin, universe_size),
            difficulty,
            cvr_discrepancy: BTreeMap::new(),
            counts: DiscrepancyCounts::EMPTY,
            optimistic_samples_to_audit: 0,
            estimated_samples_to_audit: 0,
            current_risk: Risk::ONE,
        }
    }

    pub fn neb(contest: &str, winner: &str, loser: &str, margin: u64, universe_size: u64) -> Assertion {
        Assertion::new(
            contest,
            winner,
            loser,
            AssertionKind::NotEliminatedBefore,
            margin,
            universe_size,
            0.0,
        )
    }

    pub fn nen(
        contest: &str,
        winner: &str,
        loser: &str,
        continuing: &[&str],
        margin: u64,
        universe_size: u64,
    ) -> Assertion {
        let continuing = continuing.iter().map(|c| c.to_string()).collect();
        Assertion::new(
            contest,
            winner,
            loser,
            AssertionKind::NotEliminatedNext { continuing },
            margin,
            universe_size,
            0.0,
        )
    }

    /// The score of a ballot: 1 if it counts for the winner against the loser,
    /// -1 if it counts for the loser, 0 otherwise.
    pub fn score(&self, choices: &[String]) -> i32 {
        match &self.kind {
            AssertionKind::NotEliminatedBefore => {
                let winner_idx = choices.iter().position(|c| *c == self.winner);
                let loser_idx = choices.iter().position(|c| *c == self.loser);
                match (winner_idx, loser_idx) {
                    (Some(0), _) => 1,
                    (None, Some(_)) => -1,
                    (Some(w), Some(l)) if l < w => -1,
                    _ => 0,
                }
            }
            AssertionKind::NotEliminatedNext { continuing } => {
                match choices.iter().find(|c| continuing.contains(c)) {
                    Some(first) if *first == self.winner => 1,
                    Some(first) if *first == self.loser => -1,
                    _ => 0,
                }
            }
        }
    }

    fn score_info(&self, info: &CvrContestInfo) -> i32 {
        let s = self.score(&info.choices);
        debug!(
            "score: {} for {} vote {:?}",
            s,
            self.short_name(),
            info.choices
        );
        s
    }

    /// Compares a CVR with its audited counterpart.
    ///
    /// Returns None if they agree on this contest, and the discrepancy code
    /// otherwise. A code of 0 means that the records differ without affecting this
    /// assertion. The result is cached for the CVR, to be counted later with
    /// [`Assertion::record_discrepancy`].
    pub fn compute_discrepancy(&mut self, cvr: &CastVoteRecord, acvr: &CastVoteRecord) -> Option<i32> {
        let cvr_info = cvr.contest_info_for(&self.contest);
        let acvr_info = acvr.contest_info_for(&self.contest);
        let cvr_phantom = cvr.is_phantom_record();
        let acvr_phantom = acvr.is_phantom_acvr();

        let result = if !cvr_phantom && !acvr_phantom && cvr_info.is_none() && acvr_info.is_none() {
            None
        } else {
            let cvr_score = match cvr_info {
                _ if cvr_phantom => 1,
                Some(ci) => self.score_info(ci),
                None => 0,
            };
            let acvr_score = match acvr_info {
                _ if acvr_phantom => -1,
                Some(ai) if !ai.has_consensus() => -1,
                Some(ai) => self.score_info(ai),
                None => 0,
            };
            let d = cvr_score - acvr_score;
            let same_record = match (cvr_info, acvr_info) {
                (Some(ci), Some(ai)) => ai.has_consensus() && ci.choices == ai.choices,
                _ => false,
            };
            if d == 0 && same_record && !cvr_phantom && !acvr_phantom {
                None
            } else {
                Some(d)
            }
        };

        match result {
            Some(d) => {
                info!(
                    "compute_discrepancy: CVR {} {} discrepancy {}",
                    cvr.id,
                    self.short_name(),
                    d
                );
                self.cvr_discrepancy.insert(cvr.id, d);
            }
            None => {
                info!(
                    "compute_discrepancy: CVR {} {} no discrepancy",
                    cvr.id,
                    self.short_name()
                );
                self.cvr_discrepancy.remove(&cvr.id);
            }
        }
        result
    }

    /// Counts the cached discrepancy of the CVR once.
    ///
    /// Returns false (and does nothing) if no discrepancy is cached for it.
    pub fn record_discrepancy(&mut self, cvr_id: CvrId) -> Result<bool, AuditError> {
        let code = match self.cvr_discrepancy.get(&cvr_id) {
            Some(code) => *code,
            None => {
                debug!(
                    "record_discrepancy: no discrepancy cached for CVR {} in {}",
                    cvr_id,
                    self.short_name()
                );
                return Ok(false);
            }
        };
        if let Err(e) = self.counts.record(code) {
            error!("record_discrepancy: {} in {}", e, self.short_name());
            return Err(e);
        }
        debug!(
            "record_discrepancy: type {} added to {} for CVR {}, totals {:?}",
            code,
            self.short_name(),
            cvr_id,
            self.counts
        );
        Ok(true)
    }

    /// Removes one count of the cached discrepancy of the CVR. The cached code is
    /// kept: a CVR sampled several times is removed once per occurrence.
    pub fn remove_discrepancy(&mut self, cvr_id: CvrId) -> Result<bool, AuditError> {
        let code = match self.cvr_discrepancy.get(&cvr_id) {
            Some(code) => *code,
            None => {
                debug!(
                    "remove_discrepancy: no discrepancy cached for CVR {} in {}",
                    cvr_id,
                    self.short_name()
                );
                return Ok(false);
            }
        };
        if let Err(e) = self.counts.remove(code) {
            error!(
                "remove_discrepancy: {} in {} for CVR {}",
                e,
                self.short_name(),
                cvr_id
            );
            return Err(e);
        }
        debug!(
            "remove_discrepancy: type {} removed from {} for CVR {}, totals {:?}",
            code,
            self.short_name(),
            cvr_id,
            self.counts
        );
        Ok(true)
    }

    pub fn discrepancy_for(&self, cvr_id: CvrId) -> Option<i32> {
        self.cvr_discrepancy.get(&cvr_id).copied()
    }

    /// The cached discrepancies, by CVR.
    pub fn discrepancies(&self) -> &BTreeMap<CvrId, i32> {
        &self.cvr_discrepancy
    }

    pub fn counts(&self) -> &DiscrepancyCounts {
        &self.counts
    }

    pub fn compute_optimistic_samples_to_audit(
        &mut self,
        risk_limit: &BigRational,
        gamma: &BigRational,
    ) -> u32 {
        self.optimistic_samples_to_audit =
            stats::optimistic(risk_limit, &self.diluted_margin, gamma, &self.counts);
        debug!(
            "compute_optimistic_samples_to_audit: {} ballots for {}",
            self.optimistic_samples_to_audit,
            self.short_name()
        );
        self.optimistic_samples_to_audit
    }

    /// Uses the last optimistic value.
    pub fn compute_estimated_samples_to_audit(&mut self, audited_samples: u32) -> u32 {
        self.estimated_samples_to_audit = stats::estimated(
            self.optimistic_samples_to_audit,
            self.counts.overstatements(),
            audited_samples,
        );
        debug!(
            "compute_estimated_samples_to_audit: {} ballots for {} ({} overstatements in {} samples)",
            self.estimated_samples_to_audit,
            self.short_name(),
            self.counts.overstatements(),
            audited_samples
        );
        self.estimated_samples_to_audit
    }

    pub fn update_risk(&mut self, audited_samples: u32, gamma: &BigRational) -> Risk {
        self.current_risk =
            stats::risk_measurement(audited_samples, &self.diluted_margin, gamma, &self.counts);
        self.current_risk
    }

    pub fn optimistic_samples_to_audit(&self) -> u32 {
        self.optimistic_samples_to_audit
    }

    pub fn estimated_samples_to_audit(&self) -> u32 {
        self.estimated_samples_to_audit
    }

    pub fn current_risk(&self) -> Risk {
        self.current_risk
    }

    fn short_name(&self) -> String {
        format!("{} {} {} v {}", self.contest, self.kind, self.winner, self.loser)
    }

    pub fn description(&self) -> String {
        format!(
            "{}: oneOver = {}; twoOver = {}; oneUnder = {}; twoUnder = {}; other = {}; \
             optimistic = {}; estimated = {}; risk {}.",
            self.short_name(),
            self.counts.one_over,
            self.counts.two_over,
            self.counts.one_under,
            self.counts.two_under,
            self.counts.other,
            self.optimistic_samples_to_audit,
            self.estimated_samples_to_audit,
            self.current_risk
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AuditSettings, ConsensusValue, RecordType};

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn v(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
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

    fn neb() -> Assertion {
        Assertion::neb("Mayor", "Alice", "Bob", 100, 1000)
    }

    #[test]
    fn neb_scores() {
        let a = neb();
        assert_eq!(a.score(&v(&["Alice", "Wendy"])), 1);
        assert_eq!(a.score(&v(&["Wendy", "Bob", "Alice"])), -1);
        assert_eq!(a.score(&v(&["Wendy", "Alice", "Bob"])), 0);
        assert_eq!(a.score(&v(&["Bob"])), -1);
        assert_eq!(a.score(&v(&[])), 0);
        assert_eq!(a.score(&v(&["Wendy"])), 0);
    }

    #[test]
    fn nen_scores() {
        let a = Assertion::nen("Mayor", "Alice", "Bob", &["Alice", "Bob", "Chuan"], 50, 1000);
        assert_eq!(a.score(&v(&["Wendy", "Alice", "Bob"])), 1);
        assert_eq!(a.score(&v(&["Diego", "Bob", "Alice"])), -1);
        assert_eq!(a.score(&v(&["Chuan", "Alice"])), 0);
        assert_eq!(a.score(&v(&["Diego", "Wendy"])), 0);
        assert_eq!(a.kind.to_string(), "NEN");
    }

    #[test]
    fn discrepancy_from_differing_ballots() {
        init();
        let mut a = neb();
        let d = a.compute_discrepancy(&cvr(&["Alice", "Wendy"]), &acvr(&["Wendy", "Chuan"]));
        assert_eq!(d, Some(1));
        assert_eq!(a.discrepancy_for(CvrId(1)), Some(1));
        // A difference that does not affect the assertion.
        let d = a.compute_discrepancy(&cvr(&["Wendy", "Chuan"]), &acvr(&["Chuan", "Wendy"]));
        assert_eq!(d, Some(0));
        assert_eq!(a.discrepancy_for(CvrId(1)), Some(0));
    }

    #[test]
    fn identical_ballots_clear_stale_entries() {
        init();
        let mut a = neb();
        a.compute_discrepancy(&cvr(&["Bob"]), &acvr(&["Alice"]));
        assert_eq!(a.discrepancy_for(CvrId(1)), Some(-2));
        let d = a.compute_discrepancy(&cvr(&["Alice", "Bob"]), &acvr(&["Alice", "Bob"]));
        assert_eq!(d, None);
        assert!(a.discrepancies().is_empty());
    }

    #[test]
    fn contest_absent_from_both() {
        let mut a = neb();
        let c = record(1, RecordType::Uploaded, None);
        let ac = record(1, RecordType::AuditorEntered, None);
        assert_eq!(a.compute_discrepancy(&c, &ac), None);
        // Absent from the audited ballot only.
        assert_eq!(a.compute_discrepancy(&cvr(&["Alice"]), &ac), Some(1));
    }

    #[test]
    fn phantoms_and_disagreement() {
        let mut a = neb();
        let phantom_cvr = record(1, RecordType::PhantomRecord, None);
        let phantom_ballot = record(1, RecordType::PhantomBallot, None);
        assert_eq!(a.compute_discrepancy(&phantom_cvr, &phantom_ballot), Some(2));
        assert_eq!(a.compute_discrepancy(&cvr(&["Bob"]), &phantom_ballot), Some(0));
        assert_eq!(a.compute_discrepancy(&phantom_cvr, &acvr(&["Alice"])), Some(0));
        let mut no_consensus = acvr(&["Alice"]);
        no_consensus.contest_info[0].consensus = ConsensusValue::No;
        assert_eq!(a.compute_discrepancy(&cvr(&["Alice"]), &no_consensus), Some(2));
    }

    #[test]
    fn record_and_remove() {
        init();
        let mut a = neb();
        assert_eq!(a.record_discrepancy(CvrId(1)), Ok(false));
        a.compute_discrepancy(&cvr(&["Alice"]), &acvr(&["Bob"]));
        assert_eq!(a.record_discrepancy(CvrId(1)), Ok(true));
        assert_eq!(a.record_discrepancy(CvrId(1)), Ok(true));
        assert_eq!(a.counts().two_over, 2);
        assert_eq!(a.remove_discrepancy(CvrId(1)), Ok(true));
        assert_eq!(a.remove_discrepancy(CvrId(1)), Ok(true));
        assert_eq!(a.counts(), &DiscrepancyCounts::EMPTY);
        assert_eq!(
            a.remove_discrepancy(CvrId(1)),
            Err(AuditError::NegativeDiscrepancyCount { code: 2 })
        );
        assert_eq!(a.remove_discrepancy(CvrId(7)), Ok(false));
    }

    #[test]
    fn record_then_remove_is_neutral() {
        for (c, ac) in [
            (vec!["Alice"], vec!["Bob"]),
            (vec!["Alice"], vec!["Wendy"]),
            (vec!["Wendy"], vec!["Chuan"]),
            (vec!["Wendy"], vec!["Alice"]),
            (vec!["Bob"], vec!["Alice"]),
        ] {
            let mut a = neb();
            a.compute_discrepancy(&cvr(&c), &acvr(&ac));
            let before = *a.counts();
            a.record_discrepancy(CvrId(1)).unwrap();
            a.remove_discrepancy(CvrId(1)).unwrap();
            assert_eq!(*a.counts(), before);
        }
    }

    #[test]
    fn sample_sizes_and_description() {
        let settings = AuditSettings::parse("0.05", "1.03905").unwrap();
        let mut a = neb();
        assert_eq!(a.current_risk(), Risk::ONE);
        assert_eq!(
            a.compute_optimistic_samples_to_audit(&settings.risk_limit, &settings.gamma),
            63
        );
        a.compute_discrepancy(&cvr(&["Alice"]), &acvr(&["Wendy"]));
        a.record_discrepancy(CvrId(1)).unwrap();
        assert_eq!(
            a.compute_optimistic_samples_to_audit(&settings.risk_limit, &settings.gamma),
            76
        );
        assert_eq!(a.compute_estimated_samples_to_audit(20), 80);
        assert_eq!(a.update_risk(50, &settings.gamma).to_string(), "0.164");
        assert_eq!(
            a.description(),
            "Mayor NEB Alice v Bob: oneOver = 1; twoOver = 0; oneUnder = 0; twoUnder = 0; \
             other = 0; optimistic = 76; estimated = 80; risk 0.164."
        );
    }
}
