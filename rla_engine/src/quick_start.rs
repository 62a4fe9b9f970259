/*!

# Quick start: one county, one contest

This walkthrough runs a complete ballot-comparison audit of a small plurality
contest, from the county results to the risk limit.

**The contest** County 1 reports 90 votes for Alice and 10 for Bob in the race for
Mayor. Its ballot manifest lists 100 ballots. The tally gives the winners, the
losers and the diluted margin of the contest: (90 - 10) / 100 = 0.8.

**The audit** With a risk limit of 5% and the usual gamma of 1.03905, an audit
that finds no discrepancy needs 8 samples. The samples are drawn outside of
the engine (with a seeded pseudo-random generator, for instance). Here the
sample draws CVR 3 twice.

A contest may span several counties. Its audit is held once, by the
coordinator, and every county dashboard of the contest adds its samples to it.

**The audit board** The coordinator tells which ballots to retrieve, and the
audit board submits what it reads on each of them. Each submission is compared
with the CVR and the counters of the audit move accordingly.

```
use std::collections::BTreeMap;
use rla_engine::builder::CvrBuilder;
use rla_engine::coordinator::create_audit_of_correct_type;
use rla_engine::tally::count_all_contests;
use rla_engine::*;

// Results and universe.
let county_result = CountyContestResult {
    county_id: 1,
    contest_name: "Mayor".to_string(),
    contest_type: ContestType::Plurality,
    winners_allowed: 1,
    vote_totals: [("Alice".to_string(), 90), ("Bob".to_string(), 10)]
        .into_iter()
        .collect(),
};
let universe = UniverseCounts {
    manifest_totals: [(1, 100)].into_iter().collect(),
    cvr_counts: BTreeMap::new(),
};
let results = count_all_contests(&[county_result], &universe, UniverseSource::Manifests);
assert_eq!(results[0].winners, vec!["Alice"]);

// The uploaded CVRs.
let mut repository = InMemoryRepository::new();
for id in 1..=10 {
    let (cvr, _) = CvrBuilder::new(id, 1, &format!("1-1-{}", id))
        .plurality_contest("Mayor", &["Alice"])
        .build();
    repository.save_cvr(cvr);
}
let mut coordinator = AuditRoundCoordinator::new(repository);

// The audit of the contest, shared by the dashboards of its counties.
let settings = AuditSettings::parse("0.05", "1.03905")?;
let audit = create_audit_of_correct_type(
    &results[0],
    &settings,
    AuditReason::CountyWideContest,
    Vec::new(),
)?;
assert_eq!(audit.initial_samples_to_audit(), 8);
coordinator.add_audit(audit);
let mut dashboard = CountyDashboard::new(1);

// First round.
let sample: Vec<CvrId> = [3, 1, 3, 5, 2, 7, 8, 4].into_iter().map(CvrId).collect();
let samples = [("Mayor".to_string(), sample)].into_iter().collect();
let (audit_sequence, ballot_sequence) = coordinator.round_sequences(&dashboard, &samples);
coordinator.start_round(&mut dashboard, audit_sequence, ballot_sequence)?;

// The audit board reads every ballot as the scanner did.
for id in coordinator.cvrs_to_audit_in_round(&dashboard, 1)? {
    let (acvr, _) = CvrBuilder::new(1000 + id.0, 1, &format!("1-1-{}", id.0))
        .record_type(RecordType::AuditorEntered)
        .plurality_contest("Mayor", &["Alice"])
        .build();
    assert!(coordinator.submit_audit_cvr(&mut dashboard, id, acvr)?);
}

let audit = coordinator.audit_for("Mayor").unwrap();
assert_eq!(audit.audit_status(), AuditStatus::RiskLimitAchieved);
assert_eq!(audit.risk_measurement().to_string(), "0.020");
# Ok::<(), AuditError>(())
```

Had the audit board read a vote for Bob on one of the ballots, the submission
would have recorded a two-vote overstatement, and the estimated number of
samples would have grown beyond the first round. The next round is started the
same way, with the new samples of the contest.

For ranked (IRV) contests the audit is built from the assertions produced by an
assertion generator (see [`crate::assertion::Assertion`]), and the raw ranked
marks of the ballots are corrected before comparison (see [`crate::ballot`]).

The `rla` command line program runs whole audit scenarios described in JSON:

```bash
rla --scenario scenario.json --out report.json \
  --interpretations interpretations.csv --discrepancies discrepancies.csv
```

*/
