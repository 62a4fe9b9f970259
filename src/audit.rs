use log::{debug, info, warn};

use rla_engine::builder::CvrBuilder;
use rla_engine::coordinator::create_audit_of_correct_type;
use rla_engine::decimal::format_rational;
use rla_engine::tally::count_all_contests;
use rla_engine::*;
use snafu::{prelude::*, Snafu};

use std::collections::{BTreeMap, BTreeSet};
use std::fs;

use serde_json::json;
use serde_json::Map as JSMap;
use serde_json::Value as JSValue;
use text_diff::print_diff;

use crate::audit::config_reader::*;
use crate::audit::io_csv::*;

pub mod config_reader;
pub mod io_csv;

#[derive(Debug, Snafu)]
pub enum RlaError {
    #[snafu(display("Error opening file {path}"))]
    OpeningJson {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error parsing JSON: {source}"))]
    ParsingJson { source: serde_json::Error },
    #[snafu(display("Error writing {path}"))]
    WritingOutput {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error writing CSV file {path}: {source}"))]
    CsvWrite { source: csv::Error, path: String },
    #[snafu(display("Audit error: {source}"))]
    Engine { source: AuditError },
    #[snafu(display("County {county_id} is not part of the scenario"))]
    UnknownCounty { county_id: u64 },

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type RlaResult<T> = Result<T, RlaError>;

/// The state of an audit after a scenario was played.
pub struct AuditRun {
    pub dashboards: BTreeMap<u64, CountyDashboard>,
    pub coordinator: AuditRoundCoordinator<InMemoryRepository>,
    pub interpretations: Vec<BallotInterpretation>,
}

fn counts_to_json(counts: &DiscrepancyCounts) -> JSValue {
    json!({
        "oneOver": counts.one_over,
        "twoOver": counts.two_over,
        "oneUnder": counts.one_under,
        "twoUnder": counts.two_under,
        "other": counts.other,
    })
}

fn reasons_to_json(reasons: &BTreeMap<AuditReason, u32>) -> JSValue {
    let mut m: JSMap<String, JSValue> = JSMap::new();
    for (reason, count) in reasons {
        m.insert(reason.to_string(), json!(count));
    }
    JSValue::Object(m)
}

fn audit_to_json(audit: &mut ComparisonAudit) -> JSValue {
    let optimistic = audit.optimistic_samples_to_audit();
    let estimated = audit.estimated_samples_to_audit();
    let assertions: Vec<JSValue> = audit
        .assertions()
        .iter()
        .map(|a| json!(a.description()))
        .collect();
    let contest_type = match audit.contest_type() {
        ContestType::Plurality => "PLURALITY",
        ContestType::Irv => "IRV",
    };
    json!({
        "contest": audit.contest_name(),
        "type": contest_type,
        "reason": audit.audit_reason().to_string(),
        "status": audit.audit_status().to_string(),
        "risk": audit.risk_measurement().to_string(),
        "dilutedMargin": format_rational(audit.diluted_margin(), 6),
        "auditedSampleCount": audit.audited_sample_count(),
        "optimisticSamplesToAudit": optimistic,
        "estimatedSamplesToAudit": estimated,
        "optimisticRemaining": audit.optimistic_remaining(),
        "estimatedRemaining": audit.estimated_remaining(),
        "discrepancies": counts_to_json(audit.counts()),
        "disagreements": audit.disagreement_count(),
        "assertions": assertions,
    })
}

fn dashboard_to_json(
    cdb: &CountyDashboard,
    coordinator: &mut AuditRoundCoordinator<InMemoryRepository>,
) -> JSValue {
    let rounds: Vec<JSValue> = cdb
        .rounds()
        .iter()
        .map(|r| {
            json!({
                "round": r.number,
                "expectedCount": r.expected_count,
                "actualCount": r.actual_count,
                "discrepancies": reasons_to_json(r.discrepancies()),
                "disagreements": reasons_to_json(r.disagreements()),
            })
        })
        .collect();
    let estimated = coordinator.estimated_samples_to_audit(cdb);
    let contests: Vec<JSValue> = coordinator
        .county_audits(cdb.county_id)
        .map(|a| json!(a.contest_name()))
        .collect();
    json!({
        "countyId": cdb.county_id,
        "auditedSampleCount": cdb.audited_sample_count(),
        "ballotsAudited": cdb.ballots_audited(),
        "estimatedSamplesToAudit": estimated,
        "discrepancies": reasons_to_json(cdb.discrepancies()),
        "disagreements": reasons_to_json(cdb.disagreements()),
        "rounds": rounds,
        "contests": contests,
    })
}

pub fn build_report_js(run: &mut AuditRun) -> JSValue {
    let mut counties: Vec<JSValue> = Vec::new();
    for cdb in run.dashboards.values() {
        counties.push(dashboard_to_json(cdb, &mut run.coordinator));
    }
    let contests: Vec<JSValue> = run.coordinator.audits_mut().map(audit_to_json).collect();
    json!({ "contests": contests, "counties": counties })
}

fn build_record(
    builder: CvrBuilder,
    contests: &[ContestChoicesConfig],
    contest_types: &BTreeMap<String, ContestType>,
) -> RlaResult<(CastVoteRecord, Vec<BallotInterpretation>)> {
    let mut builder = builder;
    for c in contests {
        builder = match contest_types.get(&c.contest) {
            Some(ContestType::Irv) => builder
                .irv_contest(&c.contest, &c.choices.join(","))
                .context(EngineSnafu {})?,
            Some(ContestType::Plurality) => {
                let choices: Vec<&str> = c.choices.iter().map(|s| s.as_str()).collect();
                builder.plurality_contest(&c.contest, &choices)
            }
            None => whatever!("Unknown contest {:?} on a ballot", c.contest),
        };
        if !read_consensus(&c.consensus)? {
            builder = builder.no_consensus(&c.contest);
        }
    }
    Ok(builder.build())
}

/// Plays a scenario: tallies the contests, creates the audits and applies the
/// rounds and submissions in order.
pub fn run_audit(config: &ScenarioConfig) -> RlaResult<AuditRun> {
    let settings = validate_settings(&config.settings)?;
    let source = read_universe_source(&config.universe)?;

    let mut county_results: Vec<CountyContestResult> = Vec::new();
    for r in config.results.iter() {
        let contest_type = read_contest_type(&r.contest_type)?;
        county_results.push(CountyContestResult {
            county_id: r.county_id,
            contest_name: r.contest_name.clone(),
            contest_type,
            winners_allowed: r.winners_allowed.unwrap_or(1),
            vote_totals: r.vote_totals.clone(),
        });
    }
    let contest_types: BTreeMap<String, ContestType> = county_results
        .iter()
        .map(|r| (r.contest_name.clone(), r.contest_type))
        .collect();

    // Uploaded records.
    let mut repository = InMemoryRepository::new();
    let mut interpretations: Vec<BallotInterpretation> = Vec::new();
    for c in config.cvrs.iter() {
        let record_type = read_record_type(&c.record_type, RecordType::Uploaded)?;
        let builder = CvrBuilder::new(c.id, c.county_id, &c.imprinted_id).record_type(record_type);
        let (cvr, mut interp) = build_record(builder, &c.contests, &contest_types)?;
        interpretations.append(&mut interp);
        repository.save_cvr(cvr);
    }
    info!(
        "run_audit: {} CVRs, {} interpretations",
        repository.cvr_count(),
        interpretations.len()
    );

    let universe = UniverseCounts {
        manifest_totals: config
            .counties
            .iter()
            .map(|c| (c.id, c.manifest_ballots))
            .collect(),
        cvr_counts: repository.cvr_counts_by_county(),
    };
    let results = count_all_contests(&county_results, &universe, source);

    // One dashboard per county. The audit of a contest is shared by the
    // dashboards of its counties.
    let mut dashboards: BTreeMap<u64, CountyDashboard> = BTreeMap::new();
    for county in config.counties.iter() {
        dashboards.insert(county.id, CountyDashboard::new(county.id));
    }
    let mut coordinator = AuditRoundCoordinator::new(repository);
    for a in config.audits.iter() {
        let reason = read_audit_reason(&a.reason)?;
        let result = match results.iter().find(|r| r.contest_name == a.contest_name) {
            Some(r) => r,
            None => whatever!("No results for audited contest {:?}", a.contest_name),
        };
        if let Some(county_id) = result.counties.iter().find(|id| !dashboards.contains_key(*id)) {
            return UnknownCountySnafu {
                county_id: *county_id,
            }
            .fail();
        }
        let assertions = validate_assertions(&a.contest_name, &a.assertions, result.ballot_count)?;
        let audit = create_audit_of_correct_type(result, &settings, reason, assertions)
            .context(EngineSnafu {})?;
        debug!("run_audit: {}", audit.description());
        coordinator.add_audit(audit);
    }
    for county in config.counties.iter() {
        let driving: BTreeSet<String> = match &county.driving_contests {
            Some(names) => names.iter().cloned().collect(),
            None => coordinator
                .county_audits(county.id)
                .filter(|a| a.is_targeted())
                .map(|a| a.contest_name().to_string())
                .collect(),
        };
        let cdb = dashboards
            .get_mut(&county.id)
            .context(UnknownCountySnafu {
                county_id: county.id,
            })?;
        cdb.set_driving_contests(driving);
    }

    for round in config.rounds.iter() {
        let cdb = dashboards
            .get_mut(&round.county_id)
            .context(UnknownCountySnafu {
                county_id: round.county_id,
            })?;
        let samples: BTreeMap<String, Vec<CvrId>> = round
            .samples
            .iter()
            .map(|(contest, ids)| (contest.clone(), ids.iter().copied().map(CvrId).collect()))
            .collect();
        let (audit_sequence, ballot_sequence) = coordinator.round_sequences(cdb, &samples);
        coordinator
            .start_round(cdb, audit_sequence, ballot_sequence)
            .context(EngineSnafu {})?;

        for s in round.submissions.iter() {
            let cvr_id = CvrId(s.cvr_id);
            let cvr = match coordinator.repository().cvr(cvr_id) {
                Some(cvr) => cvr,
                None => whatever!("Submission for unknown CVR {}", s.cvr_id),
            };
            let record_type = read_record_type(&s.record_type, RecordType::AuditorEntered)?;
            let imprinted_id = s.imprinted_id.clone().unwrap_or(cvr.imprinted_id);
            let builder =
                CvrBuilder::new(s.acvr_id, cvr.county_id, &imprinted_id).record_type(record_type);
            let (acvr, mut interp) = build_record(builder, &s.contests, &contest_types)?;
            interpretations.append(&mut interp);
            let accepted = match &s.reaudit_comment {
                Some(comment) => coordinator.reaudit(cdb, cvr_id, acvr, comment),
                None => coordinator.submit_audit_cvr(cdb, cvr_id, acvr),
            }
            .context(EngineSnafu {})?;
            if !accepted {
                warn!("run_audit: submission for CVR {} was rejected", s.cvr_id);
            }
        }
        cdb.end_round().context(EngineSnafu {})?;
    }

    Ok(AuditRun {
        dashboards,
        coordinator,
        interpretations,
    })
}

pub fn run_scenario(
    scenario_path: &str,
    check_summary_path: Option<String>,
    out_path: Option<String>,
    interpretations_path: Option<String>,
    discrepancies_path: Option<String>,
) -> RlaResult<()> {
    let config = read_scenario(scenario_path)?;
    let mut run = run_audit(&config)?;

    let report_js = build_report_js(&mut run);
    let pretty_js_report = serde_json::to_string_pretty(&report_js).context(ParsingJsonSnafu {})?;
    match out_path.as_deref() {
        None | Some("stdout") => println!("{}", pretty_js_report),
        Some(path) => {
            fs::write(path, &pretty_js_report).context(WritingOutputSnafu { path })?;
        }
    }

    if let Some(path) = interpretations_path {
        write_interpretations_file(&path, &run.interpretations)?;
    }
    if let Some(path) = discrepancies_path {
        let rows = discrepancy_rows(&run.coordinator);
        write_discrepancies_file(&path, &rows)?;
    }

    // The reference report, if provided for comparison
    if let Some(summary_p) = check_summary_path {
        let summary_ref = read_summary(&summary_p)?;
        let pretty_js_summary_ref =
            serde_json::to_string_pretty(&summary_ref).context(ParsingJsonSnafu {})?;
        if pretty_js_summary_ref != pretty_js_report {
            warn!("Found differences with the reference report");
            print_diff(
                pretty_js_summary_ref.as_str(),
                pretty_js_report.as_ref(),
                "\n",
            );
            whatever!("Difference detected between calculated report and reference report")
        }
    }

    Ok(())
}
