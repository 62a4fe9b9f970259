//! Interpretation of ranked (IRV) ballots.
//!
//! A scanned ranked ballot is a bag of `(rank, candidate)` marks. It may skip
//! ranks, rank the same candidate several times or give the same rank to several
//! candidates. Such a ballot is turned into the ordered list of candidates the
//! voter most plausibly meant, by applying in order:
//!
//! - Rule 3: a candidate ranked several times only keeps its highest rank,
//! - Rule 1: the ballot stops before the first rank shared by two candidates (overvote),
//! - Rule 2: the ballot stops before the first skipped rank. A ballot that does not
//!   start at rank 1 is blank.
//!
//! ```
//! use rla_engine::RawBallot;
//! let raw = RawBallot::parse("Alice(1),Bob(2),Alice(3),Chuan(3),Diego(5)")?;
//! assert!(!raw.is_valid());
//! assert_eq!(raw.interpret_valid_intent().candidate_names(), vec!["Alice", "Bob", "Chuan"]);
//! # Ok::<(), rla_engine::AuditError>(())
//! ```

use std::collections::HashSet;
use std::fmt::Display;

use log::debug;

use crate::config::{AuditError, RecordType};
use crate::cvr::CvrId;

/// One mark on a ranked ballot.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub struct Preference {
    pub rank: u32,
    pub candidate: String,
}

impl Preference {
    pub fn new(rank: u32, candidate: &str) -> Preference {
        Preference {
            rank,
            candidate: candidate.to_string(),
        }
    }

    /// Parses the `Name(rank)` form used by CVR exports.
    pub fn parse(buf: &str) -> Result<Preference, AuditError> {
        let invalid = || AuditError::InvalidPreference(buf.to_string());
        let trimmed = buf.trim();
        let body = trimmed.strip_suffix(')').ok_or_else(invalid)?;
        let open = body.rfind('(').ok_or_else(invalid)?;
        let name = body[..open].trim();
        let rank_str = &body[open + 1..];
        if name.is_empty() || rank_str.is_empty() || !rank_str.chars().all(|c| c.is_ascii_digit())
        {
            return Err(invalid());
        }
        let rank: u32 = rank_str.parse().map_err(|_| invalid())?;
        if rank == 0 {
            return Err(invalid());
        }
        Ok(Preference::new(rank, name))
    }
}

impl Display for Preference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.candidate, self.rank)
    }
}

/// The preferences of a ballot, as recorded. Always kept sorted by rank; marks
/// sharing a rank keep their recorded order.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct RawBallot {
    preferences: Vec<Preference>,
}

impl RawBallot {
    pub fn new(mut preferences: Vec<Preference>) -> RawBallot {
        preferences.sort_by_key(|p| p.rank);
        RawBallot { preferences }
    }

    /// Parses a comma-separated list of `Name(rank)` marks. An empty string is a blank ballot.
    pub fn parse(buf: &str) -> Result<RawBallot, AuditError> {
        if buf.trim().is_empty() {
            return Ok(RawBallot::default());
        }
        let prefs = buf
            .split(',')
            .map(Preference::parse)
            .collect::<Result<Vec<Preference>, AuditError>>()?;
        Ok(RawBallot::new(prefs))
    }

    /// Parses a list of marks, one per entry.
    pub fn parse_choices(choices: &[String]) -> Result<RawBallot, AuditError> {
        let prefs = choices
            .iter()
            .map(|c| Preference::parse(c))
            .collect::<Result<Vec<Preference>, AuditError>>()?;
        Ok(RawBallot::new(prefs))
    }

    pub fn preferences(&self) -> &[Preference] {
        &self.preferences
    }

    pub fn len(&self) -> usize {
        self.preferences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.preferences.is_empty()
    }

    /// True if no candidate appears twice and the ranks are exactly 1..=len.
    pub fn is_valid(&self) -> bool {
        let mut seen: HashSet<&str> = HashSet::new();
        self.preferences
            .iter()
            .enumerate()
            .all(|(idx, p)| p.rank as usize == idx + 1 && seen.insert(p.candidate.as_str()))
    }

    /// Overvotes: stops before the first rank that two candidates share.
    pub fn apply_rule1(&self) -> RawBallot {
        let cut = self
            .preferences
            .windows(2)
            .position(|w| w[0].rank == w[1].rank);
        self.truncated(cut)
    }

    /// Skipped ranks: stops before the first gap. Blank if rank 1 is missing.
    pub fn apply_rule2(&self) -> RawBallot {
        match self.preferences.first() {
            None => RawBallot::default(),
            Some(first) if first.rank != 1 => RawBallot::default(),
            Some(_) => {
                let cut = self
                    .preferences
                    .windows(2)
                    .position(|w| w[1].rank > w[0].rank + 1)
                    .map(|idx| idx + 1);
                self.truncated(cut)
            }
        }
    }

    /// Duplicates: only the highest ranked occurrence of each candidate remains.
    pub fn apply_rule3(&self) -> RawBallot {
        let mut seen: HashSet<&str> = HashSet::new();
        let preferences = self
            .preferences
            .iter()
            .filter(|p| seen.insert(p.candidate.as_str()))
            .cloned()
            .collect();
        RawBallot { preferences }
    }

    /// Applies rules 3, 1 and 2 in this order and returns a valid (possibly blank) ballot.
    /// Valid ballots are returned unchanged.
    pub fn interpret_valid_intent(&self) -> RawBallot {
        if self.is_valid() {
            return self.clone();
        }
        let mut res = self.apply_rule3();
        if !res.is_valid() {
            res = res.apply_rule1();
        }
        if !res.is_valid() {
            res = res.apply_rule2();
        }
        debug!("interpret_valid_intent: {} -> {}", self, res);
        res
    }

    /// The candidates, most preferred first.
    pub fn candidate_names(&self) -> Vec<String> {
        self.preferences.iter().map(|p| p.candidate.clone()).collect()
    }

    fn truncated(&self, cut: Option<usize>) -> RawBallot {
        let mut preferences = self.preferences.clone();
        if let Some(idx) = cut {
            preferences.truncate(idx);
        }
        RawBallot { preferences }
    }
}

impl Display for RawBallot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let marks: Vec<String> = self.preferences.iter().map(|p| p.to_string()).collect();
        write!(f, "{}", marks.join(","))
    }
}

/// The candidate order of a ballot after correction.
pub fn canonicalize(preferences: &[Preference]) -> Vec<String> {
    RawBallot::new(preferences.to_vec())
        .interpret_valid_intent()
        .candidate_names()
}

/// A ballot whose recorded marks had to be corrected.
///
/// Kept so that the correction can be reported. It does not take part in the
/// audit statistics.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct BallotInterpretation {
    pub county_id: u64,
    pub contest: String,
    pub record_type: RecordType,
    pub cvr_id: CvrId,
    pub imprinted_id: String,
    pub raw_choices: Vec<String>,
    pub interpreted_choices: Vec<String>,
}

/// Corrects a ranked ballot.
///
/// Returns the candidate order and, if it differs from what was recorded, the
/// record of the correction.
pub fn interpret(
    county_id: u64,
    contest: &str,
    record_type: RecordType,
    cvr_id: CvrId,
    imprinted_id: &str,
    raw: &RawBallot,
) -> (Vec<String>, Option<BallotInterpretation>) {
    let interpreted = raw.interpret_valid_intent().candidate_names();
    if interpreted == raw.candidate_names() {
        return (interpreted, None);
    }
    let record = BallotInterpretation {
        county_id,
        contest: contest.to_string(),
        record_type,
        cvr_id,
        imprinted_id: imprinted_id.to_string(),
        raw_choices: raw.preferences().iter().map(|p| p.to_string()).collect(),
        interpreted_choices: interpreted.clone(),
    };
    (interpreted, Some(record))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ballot(s: &str) -> RawBallot {
        RawBallot::parse(s).unwrap()
    }

    fn names(s: &str) -> String {
        ballot(s).interpret_valid_intent().to_string()
    }

    #[test]
    fn parse_preferences() {
        assert_eq!(Preference::parse("Alice(1)").unwrap(), Preference::new(1, "Alice"));
        assert_eq!(
            Preference::parse(" Candidate A (12) ").unwrap(),
            Preference::new(12, "Candidate A")
        );
        assert_eq!(
            Preference::parse("Write (in) Name(2)").unwrap(),
            Preference::new(2, "Write (in) Name")
        );
        for bad in ["Alice", "(1)", "Alice(0)", "Alice()", "Alice(-1)", "Alice(x)", ""] {
            assert_eq!(
                Preference::parse(bad),
                Err(AuditError::InvalidPreference(bad.to_string()))
            );
        }
    }

    #[test]
    fn parse_sorts_by_rank() {
        let b = ballot("Chuan(3),Alice(1),Bob(1)");
        assert_eq!(b.to_string(), "Alice(1),Bob(1),Chuan(3)");
        assert!(ballot("").is_empty());
        assert!(RawBallot::parse("Alice(1),Bob").is_err());
    }

    #[test]
    fn validity() {
        assert!(ballot("").is_valid());
        assert!(ballot("Alice(1),Bob(2)").is_valid());
        assert!(!ballot("Alice(1),Alice(2)").is_valid());
        assert!(!ballot("Alice(1),Bob(1)").is_valid());
        assert!(!ballot("Alice(2)").is_valid());
        assert!(!ballot("Alice(1),Bob(3)").is_valid());
    }

    #[test]
    fn rule1_lengths() {
        assert_eq!(ballot("Alice(1),Alice(1)").apply_rule1().len(), 0);
        assert_eq!(ballot("Alice(2),Alice(1)").apply_rule1().len(), 2);
        assert_eq!(ballot("Alice(1),Bob(2),Chuan(2)").apply_rule1().len(), 1);
        assert_eq!(ballot("Alice(1),Bob(2),Chuan(3),Diego(3)").apply_rule1().len(), 2);
    }

    #[test]
    fn rule2_lengths() {
        assert_eq!(ballot("Alice(1),Alice(1)").apply_rule2().len(), 2);
        assert_eq!(ballot("Alice(1),Bob(3)").apply_rule2().len(), 1);
        assert_eq!(ballot("Bob(2),Chuan(3)").apply_rule2().len(), 0);
        assert_eq!(ballot("Alice(1),Bob(2),Chuan(4)").apply_rule2().len(), 2);
        assert_eq!(ballot("Alice(3),Bob(2),Chuan(4)").apply_rule2().len(), 0);
    }

    #[test]
    fn rule3_lengths() {
        assert_eq!(
            ballot("Alice(1),Alice(2),Bob(2),Chuan(4),Bob(3)").apply_rule3().len(),
            3
        );
        assert_eq!(ballot("Alice(1),Alice(2),Alice(4)").apply_rule3().len(), 1);
    }

    #[test]
    fn dedupe_before_overvote() {
        assert_eq!(
            names("Candidate A(1),Candidate B(1),Candidate C(1),Candidate C(2),Candidate B(3)"),
            ""
        );
        assert_eq!(
            names("Candidate B(1),Candidate A(2),Candidate C(2),Candidate C(3)"),
            "Candidate B(1)"
        );
        assert_eq!(names("Candidate A(1),Candidate B(3)"), "Candidate A(1)");
        assert_eq!(
            names("Candidate A(1),Candidate A(2),Candidate B(3)"),
            "Candidate A(1)"
        );
        assert_eq!(
            names("Candidate B(1),Candidate A(2),Candidate B(2),Candidate C(3)"),
            "Candidate B(1),Candidate A(2),Candidate C(3)"
        );
    }

    #[test]
    fn interpretation_is_a_fixpoint() {
        let raws = [
            "",
            "Alice(1),Bob(2),Chuan(3)",
            "Alice(1),Bob(1),Chuan(2)",
            "Bob(2),Chuan(3)",
            "Alice(1),Alice(2),Bob(2),Chuan(4),Bob(3)",
            "Alice(1),Bob(2),Chuan(2),Alice(3),Diego(3)",
        ];
        for raw in raws {
            let once = ballot(raw).interpret_valid_intent();
            assert!(once.is_valid(), "{}", raw);
            assert_eq!(once.interpret_valid_intent(), once, "{}", raw);
        }
        let valid = ballot("Alice(1),Bob(2),Chuan(3)");
        assert_eq!(valid.interpret_valid_intent(), valid);
    }

    #[test]
    fn canonical_names() {
        let prefs = vec![
            Preference::new(2, "Bob"),
            Preference::new(1, "Alice"),
            Preference::new(4, "Chuan"),
        ];
        assert_eq!(canonicalize(&prefs), vec!["Alice", "Bob"]);
    }

    #[test]
    fn interpretation_records() {
        let raw = ballot("Alice(1),Bob(2)");
        let (choices, record) = interpret(1, "Mayor", RecordType::Uploaded, CvrId(4), "1-1-4", &raw);
        assert_eq!(choices, vec!["Alice", "Bob"]);
        assert!(record.is_none());

        let raw = ballot("Alice(1),Bob(1)");
        let (choices, record) = interpret(1, "Mayor", RecordType::Uploaded, CvrId(5), "1-1-5", &raw);
        assert!(choices.is_empty());
        let record = record.unwrap();
        assert_eq!(record.raw_choices, vec!["Alice(1)", "Bob(1)"]);
        assert!(record.interpreted_choices.is_empty());
        assert_eq!(record.cvr_id, CvrId(5));
        assert_eq!(record.imprinted_id, "1-1-5");
    }
}
