// ********* Audit vocabulary ***********

use std::error::Error;
use std::fmt::Display;

use num::{BigRational, One, Signed};

use crate::cvr::CvrId;
use crate::decimal::parse_decimal;

/// The state of the audit of one contest.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub enum AuditStatus {
    NotStarted,
    InProgress,
    RiskLimitAchieved,
    /// The contest is going to a full hand count. No further transitions.
    HandCount,
    /// The audit was stopped before reaching its risk limit. No further transitions.
    Ended,
    /// The margin is zero (or there is nothing to audit). No further transitions.
    NotAuditable,
}

impl AuditStatus {
    /// Statuses that no audit activity can move out of.
    pub fn is_sticky(&self) -> bool {
        matches!(
            self,
            AuditStatus::Ended | AuditStatus::HandCount | AuditStatus::NotAuditable
        )
    }
}

impl Display for AuditStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AuditStatus::NotStarted => "NOT_STARTED",
            AuditStatus::InProgress => "IN_PROGRESS",
            AuditStatus::RiskLimitAchieved => "RISK_LIMIT_ACHIEVED",
            AuditStatus::HandCount => "HAND_COUNT",
            AuditStatus::Ended => "ENDED",
            AuditStatus::NotAuditable => "NOT_AUDITABLE",
        };
        write!(f, "{}", s)
    }
}

/// Why a contest is part of the audit.
///
/// Every reason except `OpportunisticBenefits` is a targeted reason: the contest
/// drives the sample selection.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub enum AuditReason {
    StateWideContest,
    CountyWideContest,
    CloseContest,
    TiedContest,
    GeographicalScope,
    ConcernRegardingAccuracy,
    OpportunisticBenefits,
}

impl AuditReason {
    pub fn is_targeted(&self) -> bool {
        !matches!(self, AuditReason::OpportunisticBenefits)
    }
}

impl Display for AuditReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AuditReason::StateWideContest => "STATE_WIDE_CONTEST",
            AuditReason::CountyWideContest => "COUNTY_WIDE_CONTEST",
            AuditReason::CloseContest => "CLOSE_CONTEST",
            AuditReason::TiedContest => "TIED_CONTEST",
            AuditReason::GeographicalScope => "GEOGRAPHICAL_SCOPE",
            AuditReason::ConcernRegardingAccuracy => "CONCERN_REGARDING_ACCURACY",
            AuditReason::OpportunisticBenefits => "OPPORTUNISTIC_BENEFITS",
        };
        write!(f, "{}", s)
    }
}

/// Where a (audited) cast vote record comes from.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub enum RecordType {
    /// Exported by the tabulation system.
    Uploaded,
    /// Entered by an audit board.
    AuditorEntered,
    /// An audited record that was superseded by a later re-audit.
    Reaudited,
    /// A CVR created for a ballot present in the manifest but missing from the export.
    PhantomRecord,
    /// An audited record for a ballot that could not be found.
    PhantomBallot,
    /// The audited counterpart of a phantom record.
    PhantomRecordAcvr,
}

impl RecordType {
    pub fn is_auditor_generated(&self) -> bool {
        matches!(self, RecordType::AuditorEntered | RecordType::Reaudited)
    }

    pub fn is_system_generated(&self) -> bool {
        matches!(
            self,
            RecordType::PhantomRecord | RecordType::PhantomBallot | RecordType::PhantomRecordAcvr
        )
    }
}

impl Display for RecordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RecordType::Uploaded => "UPLOADED",
            RecordType::AuditorEntered => "AUDITOR_ENTERED",
            RecordType::Reaudited => "REAUDITED",
            RecordType::PhantomRecord => "PHANTOM_RECORD",
            RecordType::PhantomBallot => "PHANTOM_BALLOT",
            RecordType::PhantomRecordAcvr => "PHANTOM_RECORD_ACVR",
        };
        write!(f, "{}", s)
    }
}

/// Whether the audit board agreed on the interpretation of a contest.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum ConsensusValue {
    Yes,
    No,
}

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub enum ContestType {
    Plurality,
    Irv,
}

/// Errors that prevent an audit operation from completing.
///
/// All of them denote a programming or data-integrity problem: they are
/// surfaced to the caller, never retried.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum AuditError {
    /// A CVR id that the repository does not know.
    UnknownCvr(CvrId),
    /// The CVR has no audited ballot attached.
    MissingAuditedBallot(CvrId),
    /// A discrepancy code outside of -2..=2.
    InvalidDiscrepancy { code: i32 },
    /// Removing a discrepancy would make a counter negative.
    NegativeDiscrepancyCount { code: i32 },
    /// A pairwise discrepancy was requested for a contest without winners.
    NoWinners { contest: String },
    /// The contests grouped under one name are not all plurality or all IRV.
    InconsistentContestTypes { contest: String },
    /// The discrepancy passed to an IRV audit differs from the one of its assertions.
    DiscrepancyMismatch {
        contest: String,
        cvr_id: CvrId,
        expected: Option<i32>,
        given: i32,
    },
    InvalidPreference(String),
    InvalidDecimal(String),
    InvalidSettings(String),
    /// The dashboard has no round in progress.
    NoCurrentRound,
    /// Round numbers start at 1.
    InvalidRound(usize),
}

impl Error for AuditError {}

impl Display for AuditError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuditError::UnknownCvr(id) => write!(f, "unknown CVR {}", id),
            AuditError::MissingAuditedBallot(id) => {
                write!(f, "no audited ballot attached to CVR {}", id)
            }
            AuditError::InvalidDiscrepancy { code } => {
                write!(f, "invalid discrepancy type: {}", code)
            }
            AuditError::NegativeDiscrepancyCount { code } => {
                write!(f, "negative discrepancy count for type {}", code)
            }
            AuditError::NoWinners { contest } => {
                write!(f, "unable to compute discrepancy in contest {}", contest)
            }
            AuditError::InconsistentContestTypes { contest } => write!(
                f,
                "contest {} has inconsistent or unrecognized contest types",
                contest
            ),
            AuditError::DiscrepancyMismatch {
                contest,
                cvr_id,
                expected,
                given,
            } => write!(
                f,
                "discrepancy {} for CVR {} in contest {} does not match the assertions ({:?})",
                given, cvr_id, contest, expected
            ),
            AuditError::InvalidPreference(s) => {
                write!(f, "couldn't parse candidate-preference: {}", s)
            }
            AuditError::InvalidDecimal(s) => write!(f, "not a decimal number: {}", s),
            AuditError::InvalidSettings(s) => write!(f, "invalid audit settings: {}", s),
            AuditError::NoCurrentRound => write!(f, "no round in progress"),
            AuditError::InvalidRound(n) => write!(f, "invalid round specified: {}", n),
        }
    }
}

// ********* Configuration **********

/// The risk limit and the error inflation factor shared by all the audits.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct AuditSettings {
    pub risk_limit: BigRational,
    pub gamma: BigRational,
}

impl AuditSettings {
    pub const DEFAULT_RISK_LIMIT: &'static str = "0.03";
    pub const DEFAULT_GAMMA: &'static str = "1.03905";

    /// Checks that 0 < risk limit < 1 and gamma > 1.
    pub fn new(risk_limit: BigRational, gamma: BigRational) -> Result<AuditSettings, AuditError> {
        if !risk_limit.is_positive() || risk_limit >= BigRational::one() {
            return Err(AuditError::InvalidSettings(format!(
                "risk limit must be in (0, 1), got {}",
                risk_limit
            )));
        }
        if gamma <= BigRational::one() {
            return Err(AuditError::InvalidSettings(format!(
                "gamma must be greater than 1, got {}",
                gamma
            )));
        }
        Ok(AuditSettings { risk_limit, gamma })
    }

    /// Builds the settings from decimal strings such as "0.05".
    pub fn parse(risk_limit: &str, gamma: &str) -> Result<AuditSettings, AuditError> {
        AuditSettings::new(parse_decimal(risk_limit)?, parse_decimal(gamma)?)
    }

    /// Risk limit 3%, gamma 1.03905.
    pub fn colorado_defaults() -> AuditSettings {
        AuditSettings {
            risk_limit: BigRational::new(3.into(), 100.into()),
            gamma: BigRational::new(103905.into(), 100000.into()),
        }
    }
}

impl Default for AuditSettings {
    fn default() -> Self {
        AuditSettings::colorado_defaults()
    }
}
