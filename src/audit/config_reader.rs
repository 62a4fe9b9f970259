use crate::audit::*;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsConfig {
    pub risk_limit: Option<String>,
    pub gamma: Option<String>,
}

/// The results of one contest in one county.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountyResultConfig {
    pub county_id: u64,
    pub contest_name: String,
    /// "PLURALITY" or "IRV".
    pub contest_type: String,
    pub winners_allowed: Option<u32>,
    /// Empty for IRV contests.
    #[serde(default)]
    pub vote_totals: BTreeMap<String, u64>,
}

/// An assertion as produced by the assertion generator.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssertionConfig {
    /// "NEB" or "NEN".
    #[serde(rename = "type")]
    pub assertion_type: String,
    pub winner: String,
    pub loser: String,
    pub margin: u64,
    pub difficulty: Option<f64>,
    #[serde(default)]
    pub assumed_continuing: Vec<String>,
}

/// A contest selected for audit.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditConfig {
    pub contest_name: String,
    /// For example "COUNTY_WIDE_CONTEST".
    pub reason: String,
    #[serde(default)]
    pub assertions: Vec<AssertionConfig>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountyConfig {
    pub id: u64,
    /// The number of ballots in the ballot manifest.
    pub manifest_ballots: u64,
    /// Defaults to every targeted contest audited in the county.
    pub driving_contests: Option<Vec<String>>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContestChoicesConfig {
    pub contest: String,
    /// Candidate names for plurality contests, marks such as "Alice(1)" for IRV
    /// contests.
    #[serde(default)]
    pub choices: Vec<String>,
    /// "YES" or "NO", only read on audited records.
    pub consensus: Option<String>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CvrConfig {
    pub id: u64,
    pub county_id: u64,
    pub imprinted_id: String,
    /// Defaults to "UPLOADED".
    pub record_type: Option<String>,
    #[serde(default)]
    pub contests: Vec<ContestChoicesConfig>,
}

/// What the audit board read on one ballot.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionConfig {
    pub cvr_id: u64,
    pub acvr_id: u64,
    /// Defaults to "AUDITOR_ENTERED".
    pub record_type: Option<String>,
    /// Defaults to the imprinted id of the CVR.
    pub imprinted_id: Option<String>,
    #[serde(default)]
    pub contests: Vec<ContestChoicesConfig>,
    /// If present, the submission is a re-audit with this comment.
    pub reaudit_comment: Option<String>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundConfig {
    pub county_id: u64,
    /// The CVR ids drawn for each contest, in drawing order.
    pub samples: BTreeMap<String, Vec<u64>>,
    #[serde(default)]
    pub submissions: Vec<SubmissionConfig>,
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioConfig {
    pub settings: Option<SettingsConfig>,
    /// "MANIFESTS" (default) or "CVR_COUNTS".
    pub universe: Option<String>,
    pub counties: Vec<CountyConfig>,
    pub results: Vec<CountyResultConfig>,
    pub audits: Vec<AuditConfig>,
    pub cvrs: Vec<CvrConfig>,
    #[serde(default)]
    pub rounds: Vec<RoundConfig>,
}

pub fn read_scenario(path: &str) -> RlaResult<ScenarioConfig> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    parse_scenario(&contents)
}

pub fn parse_scenario(contents: &str) -> RlaResult<ScenarioConfig> {
    let config: ScenarioConfig = serde_json::from_str(contents).context(ParsingJsonSnafu {})?;
    debug!("parse_scenario: {:?}", config);
    Ok(config)
}

pub fn read_summary(path: &str) -> RlaResult<JSValue> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    let js: JSValue = serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu {})?;
    debug!("read_summary: {:?}", js);
    Ok(js)
}

pub fn validate_settings(config: &Option<SettingsConfig>) -> RlaResult<AuditSettings> {
    let (risk_limit, gamma) = match config {
        Some(c) => (
            c.risk_limit
                .clone()
                .unwrap_or_else(|| AuditSettings::DEFAULT_RISK_LIMIT.to_string()),
            c.gamma
                .clone()
                .unwrap_or_else(|| AuditSettings::DEFAULT_GAMMA.to_string()),
        ),
        None => return Ok(AuditSettings::default()),
    };
    AuditSettings::parse(&risk_limit, &gamma).context(EngineSnafu {})
}

pub fn read_contest_type(s: &str) -> RlaResult<ContestType> {
    match s {
        "PLURALITY" | "plurality" => Ok(ContestType::Plurality),
        "IRV" | "irv" => Ok(ContestType::Irv),
        x => whatever!("Unknown contest type {:?}", x),
    }
}

pub fn read_audit_reason(s: &str) -> RlaResult<AuditReason> {
    let res = match s {
        "STATE_WIDE_CONTEST" => AuditReason::StateWideContest,
        "COUNTY_WIDE_CONTEST" => AuditReason::CountyWideContest,
        "CLOSE_CONTEST" => AuditReason::CloseContest,
        "TIED_CONTEST" => AuditReason::TiedContest,
        "GEOGRAPHICAL_SCOPE" => AuditReason::GeographicalScope,
        "CONCERN_REGARDING_ACCURACY" => AuditReason::ConcernRegardingAccuracy,
        "OPPORTUNISTIC_BENEFITS" => AuditReason::OpportunisticBenefits,
        x => whatever!("Unknown audit reason {:?}", x),
    };
    Ok(res)
}

pub fn read_record_type(s: &Option<String>, default: RecordType) -> RlaResult<RecordType> {
    let res = match s.as_deref() {
        None => default,
        Some("UPLOADED") => RecordType::Uploaded,
        Some("AUDITOR_ENTERED") => RecordType::AuditorEntered,
        Some("REAUDITED") => RecordType::Reaudited,
        Some("PHANTOM_RECORD") => RecordType::PhantomRecord,
        Some("PHANTOM_BALLOT") => RecordType::PhantomBallot,
        Some("PHANTOM_RECORD_ACVR") => RecordType::PhantomRecordAcvr,
        Some(x) => whatever!("Unknown record type {:?}", x),
    };
    Ok(res)
}

pub fn read_universe_source(s: &Option<String>) -> RlaResult<UniverseSource> {
    match s.as_deref() {
        None | Some("MANIFESTS") => Ok(UniverseSource::Manifests),
        Some("CVR_COUNTS") => Ok(UniverseSource::CvrCounts),
        Some(x) => whatever!("Unknown universe source {:?}", x),
    }
}

pub fn read_consensus(s: &Option<String>) -> RlaResult<bool> {
    match s.as_deref() {
        None | Some("YES") => Ok(true),
        Some("NO") => Ok(false),
        Some(x) => whatever!("Unknown consensus value {:?}", x),
    }
}

/// Builds the assertions of an IRV contest over a universe of `universe_size` ballots.
pub fn validate_assertions(
    contest: &str,
    assertions: &[AssertionConfig],
    universe_size: u64,
) -> RlaResult<Vec<Assertion>> {
    let mut res = Vec::new();
    for a in assertions {
        let kind = match a.assertion_type.as_str() {
            "NEB" => AssertionKind::NotEliminatedBefore,
            "NEN" => AssertionKind::NotEliminatedNext {
                continuing: a.assumed_continuing.clone(),
            },
            x => whatever!("Unknown assertion type {:?} in contest {}", x, contest),
        };
        res.push(Assertion::new(
            contest,
            &a.winner,
            &a.loser,
            kind,
            a.margin,
            universe_size,
            a.difficulty.unwrap_or(0.0),
        ));
    }
    Ok(res)
}
