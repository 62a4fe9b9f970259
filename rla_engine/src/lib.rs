//! The statistics and bookkeeping core of a risk-limiting comparison audit.
//!
//! The crate takes the reported results of plurality and instant-runoff (IRV)
//! contests, the cast vote records (CVRs) produced by scanners and the audited
//! ballots (ACVRs) entered by audit boards, and tells, round after round, how
//! many more ballots must be examined and what the current measured risk is.
//!
//! The main pieces, from the leaves up:
//! - [`ballot`] turns a raw ranked ballot into its valid interpretation,
//! - [`assertion`] scores ballots against the NEB/NEN assertions of an IRV contest,
//! - [`comparison_audit`] holds the per-contest audit state machine,
//! - [`tally`] aggregates county results into contest results,
//! - [`coordinator`] applies audit-board submissions to the dashboards.
//!
//! See [`quick_start`] for a worked example.

mod config;
pub mod assertion;
pub mod ballot;
pub mod builder;
pub mod comparison_audit;
pub mod coordinator;
pub mod cvr;
pub mod dashboard;
pub mod decimal;
pub mod quick_start;
pub mod stats;
pub mod tally;

pub use crate::assertion::{Assertion, AssertionKind};
pub use crate::ballot::{BallotInterpretation, Preference, RawBallot};
pub use crate::comparison_audit::{ComparisonAudit, ContestMethod};
pub use crate::config::*;
pub use crate::coordinator::{AuditRepository, AuditRoundCoordinator, BallotToAudit, InMemoryRepository};
pub use crate::cvr::{CastVoteRecord, CvrAuditInfo, CvrContestInfo, CvrId};
pub use crate::dashboard::{CountyDashboard, Round};
pub use crate::decimal::{FixedDecimal, Risk};
pub use crate::stats::DiscrepancyCounts;
pub use crate::tally::{ContestResult, CountyContestResult, UniverseCounts, UniverseSource};
