// ********* Cast vote records ***********

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;

use crate::config::{AuditReason, ConsensusValue, RecordType};

/// The identifier of a cast vote record, as assigned by the repository.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub struct CvrId(pub u64);

impl Display for CvrId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The votes of one contest on one record.
///
/// For IRV contests the choices are the corrected candidate order, most
/// preferred first. For plurality contests they are the selected candidates.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct CvrContestInfo {
    pub contest: String,
    pub choices: Vec<String>,
    pub consensus: ConsensusValue,
    pub comment: Option<String>,
}

impl CvrContestInfo {
    pub fn new(contest: &str, choices: Vec<String>) -> CvrContestInfo {
        CvrContestInfo {
            contest: contest.to_string(),
            choices,
            consensus: ConsensusValue::Yes,
            comment: None,
        }
    }

    pub fn has_consensus(&self) -> bool {
        self.consensus == ConsensusValue::Yes
    }
}

/// A record of one ballot: either what the tabulation system reported (CVR), or
/// what an audit board read on the paper ballot (ACVR).
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct CastVoteRecord {
    pub id: CvrId,
    pub record_type: RecordType,
    pub county_id: u64,
    pub imprinted_id: String,
    /// Incremented each time an audited record is superseded by a re-audit. 0 for
    /// records that were never re-audited.
    pub revision: u64,
    pub comment: Option<String>,
    pub contest_info: Vec<CvrContestInfo>,
}

impl CastVoteRecord {
    pub fn contest_info_for(&self, contest: &str) -> Option<&CvrContestInfo> {
        self.contest_info.iter().find(|ci| ci.contest == contest)
    }

    /// True if both records describe the same physical ballot.
    pub fn is_audit_pair_with(&self, other: &CastVoteRecord) -> bool {
        self.county_id == other.county_id && self.imprinted_id == other.imprinted_id
    }

    pub fn is_phantom_record(&self) -> bool {
        self.record_type == RecordType::PhantomRecord
    }

    /// An audited record standing for a ballot that could not be examined.
    pub fn is_phantom_acvr(&self) -> bool {
        matches!(
            self.record_type,
            RecordType::PhantomBallot | RecordType::PhantomRecordAcvr
        )
    }

    pub fn set_to_reaudited(&mut self) {
        self.record_type = RecordType::Reaudited;
    }
}

/// The audit state of one sampled CVR.
///
/// Holds the audited record currently paired with the CVR, and for each
/// comparison audit (keyed by contest name) how many occurrences of the CVR in
/// the sample have already been counted.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct CvrAuditInfo {
    pub cvr_id: CvrId,
    acvr: Option<CastVoteRecord>,
    count_by_contest: BTreeMap<String, u32>,
    discrepancy: BTreeSet<AuditReason>,
    disagreement: BTreeSet<AuditReason>,
}

impl CvrAuditInfo {
    pub fn new(cvr_id: CvrId) -> CvrAuditInfo {
        CvrAuditInfo {
            cvr_id,
            acvr: None,
            count_by_contest: BTreeMap::new(),
            discrepancy: BTreeSet::new(),
            disagreement: BTreeSet::new(),
        }
    }

    pub fn acvr(&self) -> Option<&CastVoteRecord> {
        self.acvr.as_ref()
    }

    pub fn set_acvr(&mut self, acvr: CastVoteRecord) {
        self.acvr = Some(acvr);
    }

    pub fn count_for(&self, contest: &str) -> u32 {
        self.count_by_contest.get(contest).copied().unwrap_or(0)
    }

    pub fn set_count_for(&mut self, contest: &str, count: u32) {
        self.count_by_contest.insert(contest.to_string(), count);
    }

    /// Forgets which occurrences were counted, so the next audit counts them all again.
    pub fn reset_counted(&mut self) {
        self.count_by_contest.clear();
    }

    /// The audit reasons of the contests for which this ballot showed a discrepancy.
    pub fn discrepancy(&self) -> &BTreeSet<AuditReason> {
        &self.discrepancy
    }

    pub fn set_discrepancy(&mut self, reasons: BTreeSet<AuditReason>) {
        self.discrepancy = reasons;
    }

    /// The audit reasons of the contests the audit board disagreed on.
    pub fn disagreement(&self) -> &BTreeSet<AuditReason> {
        &self.disagreement
    }

    pub fn set_disagreement(&mut self, reasons: BTreeSet<AuditReason>) {
        self.disagreement = reasons;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: u64, record_type: RecordType, imprinted_id: &str) -> CastVoteRecord {
        CastVoteRecord {
            id: CvrId(id),
            record_type,
            county_id: 3,
            imprinted_id: imprinted_id.to_string(),
            revision: 0,
            comment: None,
            contest_info: vec![CvrContestInfo::new(
                "Mayor",
                vec!["Alice".to_string(), "Bob".to_string()],
            )],
        }
    }

    #[test]
    fn pairing_and_lookup() {
        let cvr = record(1, RecordType::Uploaded, "3-1-7");
        let acvr = record(2, RecordType::AuditorEntered, "3-1-7");
        let other = record(3, RecordType::AuditorEntered, "3-1-8");
        assert!(cvr.is_audit_pair_with(&acvr));
        assert!(!cvr.is_audit_pair_with(&other));
        assert!(cvr.contest_info_for("Mayor").unwrap().has_consensus());
        assert!(cvr.contest_info_for("Council").is_none());
        assert!(record(4, RecordType::PhantomBallot, "x").is_phantom_acvr());
        assert!(record(4, RecordType::PhantomRecord, "x").is_phantom_record());
    }

    #[test]
    fn audit_info_counters() {
        let mut info = CvrAuditInfo::new(CvrId(9));
        assert_eq!(info.count_for("Mayor"), 0);
        info.set_count_for("Mayor", 2);
        info.set_count_for("Council", 1);
        assert_eq!(info.count_for("Mayor"), 2);
        info.reset_counted();
        assert_eq!(info.count_for("Mayor"), 0);
        assert_eq!(info.count_for("Council"), 0);

        let mut acvr = record(10, RecordType::AuditorEntered, "3-1-7");
        acvr.set_to_reaudited();
        info.set_acvr(acvr);
        assert_eq!(info.acvr().unwrap().record_type, RecordType::Reaudited);
        assert_eq!(CvrId(12).to_string(), "12");
    }
}
