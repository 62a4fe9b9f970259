use crate::ballot::{interpret, BallotInterpretation, RawBallot};
use crate::config::{AuditError, ConsensusValue, RecordType};
use crate::cvr::{CastVoteRecord, CvrContestInfo, CvrId};

/// A builder for cast vote records and audited ballots.
///
/// Ranked contests are given as the raw marks of the ballot. They are stored in
/// their corrected order, and the builder keeps a record of each correction.
///
/// ```
/// pub use rla_engine::builder::CvrBuilder;
/// pub use rla_engine::RecordType;
/// # use rla_engine::AuditError;
///
/// let (cvr, interpretations) = CvrBuilder::new(7, 1, "1-12-3")
///     .irv_contest("Mayor", "Alice(1),Bob(2),Bob(3),Chuan(3)")?
///     .plurality_contest("Council", &["Diego"])
///     .build();
///
/// assert_eq!(cvr.contest_info_for("Mayor").unwrap().choices, vec!["Alice", "Bob", "Chuan"]);
/// assert_eq!(interpretations.len(), 1);
///
/// let (acvr, _) = CvrBuilder::new(1007, 1, "1-12-3")
///     .record_type(RecordType::AuditorEntered)
///     .plurality_contest("Council", &["Diego"])
///     .no_consensus("Council")
///     .build();
/// assert!(acvr.is_audit_pair_with(&cvr));
///
/// # Ok::<(), AuditError>(())
/// ```
pub struct CvrBuilder {
    pub(crate) _id: CvrId,
    pub(crate) _record_type: RecordType,
    pub(crate) _county_id: u64,
    pub(crate) _imprinted_id: String,
    pub(crate) _contests: Vec<CvrContestInfo>,
    pub(crate) _interpretations: Vec<BallotInterpretation>,
}

impl CvrBuilder {
    /// Starts an uploaded record.
    pub fn new(id: u64, county_id: u64, imprinted_id: &str) -> CvrBuilder {
        CvrBuilder {
            _id: CvrId(id),
            _record_type: RecordType::Uploaded,
            _county_id: county_id,
            _imprinted_id: imprinted_id.to_string(),
            _contests: Vec::new(),
            _interpretations: Vec::new(),
        }
    }

    pub fn record_type(self, record_type: RecordType) -> CvrBuilder {
        CvrBuilder {
            _record_type: record_type,
            ..self
        }
    }

    /// Adds a ranked contest from marks such as `"Alice(1),Bob(2)"`.
    pub fn irv_contest(mut self, contest: &str, raw: &str) -> Result<CvrBuilder, AuditError> {
        let ballot = RawBallot::parse(raw)?;
        let (choices, interpretation) = interpret(
            self._county_id,
            contest,
            self._record_type,
            self._id,
            &self._imprinted_id,
            &ballot,
        );
        if let Some(i) = interpretation {
            self._interpretations.push(i);
        }
        self._contests.push(CvrContestInfo::new(contest, choices));
        Ok(self)
    }

    pub fn plurality_contest(mut self, contest: &str, choices: &[&str]) -> CvrBuilder {
        let choices = choices.iter().map(|c| c.to_string()).collect();
        self._contests.push(CvrContestInfo::new(contest, choices));
        self
    }

    /// Marks a contest already added as one the audit board disagreed on.
    pub fn no_consensus(mut self, contest: &str) -> CvrBuilder {
        for info in self._contests.iter_mut().filter(|ci| ci.contest == contest) {
            info.consensus = ConsensusValue::No;
        }
        self
    }

    /// The corrections made so far to the ranked contests.
    pub fn interpretations(&self) -> &[BallotInterpretation] {
        &self._interpretations
    }

    pub fn build(self) -> (CastVoteRecord, Vec<BallotInterpretation>) {
        let cvr = CastVoteRecord {
            id: self._id,
            record_type: self._record_type,
            county_id: self._county_id,
            imprinted_id: self._imprinted_id,
            revision: 0,
            comment: None,
            contest_info: self._contests,
        };
        (cvr, self._interpretations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interpretations_are_recorded_once_per_corrected_contest() {
        let builder = CvrBuilder::new(3, 2, "2-1-3")
            .record_type(RecordType::AuditorEntered)
            .irv_contest("Mayor", "Alice(1),Bob(2)")
            .unwrap()
            .irv_contest("Sheriff", "Diego(2),Edna(3)")
            .unwrap();
        assert_eq!(builder.interpretations().len(), 1);
        let (acvr, interpretations) = builder.no_consensus("Mayor").build();

        assert_eq!(acvr.record_type, RecordType::AuditorEntered);
        assert_eq!(acvr.contest_info_for("Mayor").unwrap().consensus, ConsensusValue::No);
        assert!(acvr.contest_info_for("Sheriff").unwrap().choices.is_empty());
        let i = &interpretations[0];
        assert_eq!(i.contest, "Sheriff");
        assert_eq!(i.cvr_id, CvrId(3));
        assert_eq!(i.record_type, RecordType::AuditorEntered);
        assert_eq!(i.raw_choices, vec!["Diego(2)", "Edna(3)"]);
    }

    #[test]
    fn malformed_marks() {
        assert!(CvrBuilder::new(1, 1, "x").irv_contest("Mayor", "Alice(0)").is_err());
    }
}
