//! Aggregation of county results into contest results.
//!
//! A contest may span several counties. Each county reports its own vote totals;
//! the audit works on the contest as a whole: its winners, losers and diluted
//! margin over the universe of all the ballots cast in the counties concerned.
//!
//! IRV contests only get their counties and ballot count here. Their winner and
//! margins come from the assertions.

use std::collections::{BTreeMap, BTreeSet};

use log::{debug, error, warn};
use num::{BigRational, Zero};

use crate::config::ContestType;
use crate::stats;

/// The results of one contest in one county.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct CountyContestResult {
    pub county_id: u64,
    pub contest_name: String,
    pub contest_type: ContestType,
    pub winners_allowed: u32,
    /// Votes by choice. Empty for IRV contests.
    pub vote_totals: BTreeMap<String, u64>,
}

/// The results of one contest across all its counties.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ContestResult {
    pub contest_name: String,
    /// The types declared by the counties. More than one type is an error for the audit.
    pub contest_types: BTreeSet<ContestType>,
    pub counties: BTreeSet<u64>,
    pub winners_allowed: u32,
    pub vote_totals: BTreeMap<String, u64>,
    /// In decreasing order of votes.
    pub winners: Vec<String>,
    pub losers: Vec<String>,
    /// The size of the universe the diluted margin is computed on.
    pub ballot_count: u64,
    pub min_margin: u64,
    pub max_margin: u64,
    pub diluted_margin: BigRational,
}

impl ContestResult {
    pub fn new(contest_name: &str, contest_type: ContestType) -> ContestResult {
        ContestResult {
            contest_name: contest_name.to_string(),
            contest_types: [contest_type].into_iter().collect(),
            counties: BTreeSet::new(),
            winners_allowed: 1,
            vote_totals: BTreeMap::new(),
            winners: Vec::new(),
            losers: Vec::new(),
            ballot_count: 0,
            min_margin: 0,
            max_margin: 0,
            diluted_margin: BigRational::zero(),
        }
    }

    /// The contest type, if all the counties agree on it.
    pub fn contest_type(&self) -> Option<ContestType> {
        if self.contest_types.len() == 1 {
            self.contest_types.iter().next().copied()
        } else {
            None
        }
    }
}

/// Where the size of the ballot universe is read from.
///
/// The ballot manifests are authoritative and must be used once the audit has
/// started. The uploaded CVRs may be used before, for estimations.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum UniverseSource {
    Manifests,
    CvrCounts,
}

/// The ballot counts per county.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct UniverseCounts {
    /// Total ballots listed in the ballot manifests.
    pub manifest_totals: BTreeMap<u64, u64>,
    /// Number of uploaded CVRs.
    pub cvr_counts: BTreeMap<u64, u64>,
}

impl UniverseCounts {
    pub fn ballot_count(&self, contest: &str, counties: &BTreeSet<u64>, source: UniverseSource) -> u64 {
        match source {
            UniverseSource::Manifests => counties
                .iter()
                .map(|c| self.manifest_totals.get(c).copied().unwrap_or(0))
                .sum(),
            UniverseSource::CvrCounts => {
                let mut total = 0;
                for county in counties {
                    match self.cvr_counts.get(county) {
                        Some(count) if *count > 0 => total += count,
                        _ => warn!(
                            "ballot_count: no CVRs for county {}, the estimate for {} may be inaccurate",
                            county, contest
                        ),
                    }
                }
                total
            }
        }
    }
}

/// Groups the county results by contest name and counts each contest.
/// All the contests are counted with the same universe source.
pub fn count_all_contests(
    results: &[CountyContestResult],
    universe: &UniverseCounts,
    source: UniverseSource,
) -> Vec<ContestResult> {
    let mut by_contest: BTreeMap<&str, Vec<&CountyContestResult>> = BTreeMap::new();
    for r in results {
        by_contest.entry(r.contest_name.as_str()).or_default().push(r);
    }
    by_contest
        .into_iter()
        .map(|(name, county_results)| count_contest(name, &county_results, universe, source))
        .collect()
}

pub fn count_contest(
    contest_name: &str,
    county_results: &[&CountyContestResult],
    universe: &UniverseCounts,
    source: UniverseSource,
) -> ContestResult {
    let contest_types: BTreeSet<ContestType> =
        county_results.iter().map(|r| r.contest_type).collect();
    let counties: BTreeSet<u64> = county_results.iter().map(|r| r.county_id).collect();
    let ballot_count = universe.ballot_count(contest_name, &counties, source);
    if ballot_count == 0 {
        let data_source = match source {
            UniverseSource::Manifests => "ballot manifests",
            UniverseSource::CvrCounts => "uploaded CVRs",
        };
        error!(
            "count_contest: {} has no {} for counties {:?}",
            contest_name, data_source, counties
        );
    }
    debug!(
        "count_contest: {} counted from {:?}, {} ballots",
        contest_name, source, ballot_count
    );

    let mut res = ContestResult {
        contest_name: contest_name.to_string(),
        contest_types,
        counties,
        winners_allowed: 1,
        vote_totals: BTreeMap::new(),
        winners: Vec::new(),
        losers: Vec::new(),
        ballot_count,
        min_margin: 0,
        max_margin: 0,
        diluted_margin: BigRational::zero(),
    };
    if res.contest_type() == Some(ContestType::Irv) {
        return res;
    }

    let allowed: BTreeSet<u32> = county_results.iter().map(|r| r.winners_allowed).collect();
    if allowed.len() > 1 {
        error!(
            "count_contest: county results for {} contain different numbers of winners allowed: {:?}",
            contest_name, allowed
        );
    }
    res.winners_allowed = match allowed.iter().max() {
        Some(n) => *n,
        None => {
            error!(
                "count_contest: {} does not have any winners allowed, assuming 1",
                contest_name
            );
            1
        }
    };
    res.vote_totals = accumulate_vote_totals(county_results.iter().map(|r| &r.vote_totals));
    res.winners = winners(&res.vote_totals, res.winners_allowed);
    res.losers = losers(&res.vote_totals, &res.winners);
    let margins = pairwise_margins(&res.winners, &res.losers, &res.vote_totals);
    res.min_margin = margins.iter().next().copied().unwrap_or(0);
    res.max_margin = margins.iter().next_back().copied().unwrap_or(0);
    res.diluted_margin = stats::diluted_margin(res.min_margin, res.ballot_count);
    res
}

pub fn accumulate_vote_totals<'a, I>(totals: I) -> BTreeMap<String, u64>
where
    I: Iterator<Item = &'a BTreeMap<String, u64>>,
{
    let mut acc: BTreeMap<String, u64> = BTreeMap::new();
    for vt in totals {
        for (choice, votes) in vt {
            *acc.entry(choice.clone()).or_insert(0) += votes;
        }
    }
    acc
}

/// The choices by decreasing number of votes. Ties are broken by name.
pub fn rank_totals(vote_totals: &BTreeMap<String, u64>) -> Vec<(String, u64)> {
    let mut ranked: Vec<(String, u64)> = vote_totals
        .iter()
        .map(|(name, votes)| (name.clone(), *votes))
        .collect();
    ranked.sort_by(|(n1, v1), (n2, v2)| v2.cmp(v1).then_with(|| n1.cmp(n2)));
    ranked
}

pub fn winners(vote_totals: &BTreeMap<String, u64>, winners_allowed: u32) -> Vec<String> {
    rank_totals(vote_totals)
        .into_iter()
        .take(winners_allowed as usize)
        .map(|(name, _)| name)
        .collect()
}

pub fn losers(vote_totals: &BTreeMap<String, u64>, winners: &[String]) -> Vec<String> {
    rank_totals(vote_totals)
        .into_iter()
        .map(|(name, _)| name)
        .filter(|name| !winners.contains(name))
        .collect()
}

/// The winner-loser margins of every pair. {0} when there are no losers.
pub fn pairwise_margins(
    winners: &[String],
    losers: &[String],
    vote_totals: &BTreeMap<String, u64>,
) -> BTreeSet<u64> {
    let votes = |name: &String| vote_totals.get(name).copied().unwrap_or(0);
    let mut margins = BTreeSet::new();
    if losers.is_empty() {
        margins.insert(0);
    } else {
        for w in winners {
            for l in losers {
                margins.insert(votes(w).saturating_sub(votes(l)));
            }
        }
    }
    margins
}

#[cfg(test)]
mod tests {
    use super::*;

    fn county(county_id: u64, contest: &str, totals: &[(&str, u64)]) -> CountyContestResult {
        CountyContestResult {
            county_id,
            contest_name: contest.to_string(),
            contest_type: ContestType::Plurality,
            winners_allowed: 1,
            vote_totals: totals.iter().map(|(n, v)| (n.to_string(), *v)).collect(),
        }
    }

    fn universe() -> UniverseCounts {
        UniverseCounts {
            manifest_totals: [(1, 600), (2, 400)].into_iter().collect(),
            cvr_counts: [(1, 590)].into_iter().collect(),
        }
    }

    #[test]
    fn count_across_counties() {
        let results = vec![
            county(1, "Governor", &[("Alice", 300), ("Bob", 200), ("Chuan", 50)]),
            county(2, "Governor", &[("Alice", 100), ("Bob", 150), ("Diego", 10)]),
            county(2, "Sheriff", &[("Erin", 100)]),
        ];
        let contests = count_all_contests(&results, &universe(), UniverseSource::Manifests);
        assert_eq!(contests.len(), 2);
        let gov = &contests[0];
        assert_eq!(gov.contest_name, "Governor");
        assert_eq!(gov.winners, vec!["Alice"]);
        assert_eq!(gov.losers, vec!["Bob", "Chuan", "Diego"]);
        assert_eq!(gov.vote_totals["Bob"], 350);
        assert_eq!(gov.ballot_count, 1000);
        assert_eq!(gov.min_margin, 50);
        assert_eq!(gov.max_margin, 390);
        assert_eq!(gov.diluted_margin, stats::diluted_margin(1, 20));

        let sheriff = &contests[1];
        assert!(sheriff.losers.is_empty());
        assert_eq!(sheriff.min_margin, 0);
        assert_eq!(sheriff.ballot_count, 400);
        assert!(sheriff.diluted_margin.is_zero());
    }

    #[test]
    fn cvr_counts_universe() {
        let results = vec![
            county(1, "Governor", &[("Alice", 300), ("Bob", 200)]),
            county(2, "Governor", &[("Alice", 100), ("Bob", 150)]),
        ];
        let contests = count_all_contests(&results, &universe(), UniverseSource::CvrCounts);
        // County 2 has no CVRs and contributes nothing.
        assert_eq!(contests[0].ballot_count, 590);
    }

    #[test]
    fn ties_and_multiple_winners() {
        let mut r = county(1, "Council", &[("Bob", 10), ("Alice", 10), ("Chuan", 4), ("Diego", 1)]);
        r.winners_allowed = 2;
        let contests = count_all_contests(&[r], &universe(), UniverseSource::Manifests);
        let c = &contests[0];
        assert_eq!(c.winners_allowed, 2);
        assert_eq!(c.winners, vec!["Alice", "Bob"]);
        assert_eq!(c.losers, vec!["Chuan", "Diego"]);
        assert_eq!(c.min_margin, 6);
    }

    #[test]
    fn irv_membership_only() {
        let mut r1 = county(1, "Mayor", &[]);
        r1.contest_type = ContestType::Irv;
        let mut r2 = county(2, "Mayor", &[]);
        r2.contest_type = ContestType::Irv;
        let contests = count_all_contests(&[r1, r2], &universe(), UniverseSource::Manifests);
        let c = &contests[0];
        assert_eq!(c.contest_type(), Some(ContestType::Irv));
        assert_eq!(c.ballot_count, 1000);
        assert!(c.winners.is_empty());
        assert!(c.diluted_margin.is_zero());
    }

    #[test]
    fn mixed_types() {
        let mut r1 = county(1, "Mayor", &[("Alice", 3)]);
        r1.contest_type = ContestType::Irv;
        let r2 = county(2, "Mayor", &[("Alice", 3), ("Bob", 1)]);
        let contests = count_all_contests(&[r1, r2], &universe(), UniverseSource::Manifests);
        assert_eq!(contests[0].contest_type(), None);
        assert_eq!(contests[0].contest_types.len(), 2);
    }
}
