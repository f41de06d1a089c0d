use std::collections::{BTreeMap, BTreeSet, HashSet};

use chrono::{Datelike, NaiveDate};

use crate::models::{
    CompetitionAnalytics, Dataset, Distribution, GlobalAnalytics, IndividualAnalytics,
    IndividualStandingRow, IndividualTally, MonthlySeries, Placement, StudentPlacementRow, Team,
    TeamAnalytics, TeamPlacementRow, TeamStandingRow, UniversityAnalytics, UniversityScore,
};

const TOP_N: usize = 5;

const YEAR_LABELS: [&str; 7] = [
    "1st Year",
    "2nd Year",
    "3rd Year",
    "4th Year",
    "5th Year+",
    "Graduated",
    "Unknown",
];

// --- month arithmetic for the time-bucketed series ---

fn month_index(date: NaiveDate) -> i32 {
    date.year() * 12 + date.month0() as i32
}

fn month_label(index: i32) -> String {
    format!("{:04}-{:02}", index.div_euclid(12), index.rem_euclid(12) + 1)
}

/// Probe day inside a month, mirroring the original's day-2 sample point.
fn month_sample_day(index: i32) -> NaiveDate {
    NaiveDate::from_ymd_opt(index.div_euclid(12), (index.rem_euclid(12) + 1) as u32, 2)
        .unwrap_or(NaiveDate::MIN)
}

/// Active-team count per month, derived strictly from the creation and
/// deactivation dates, never from the `is_active` flag. Months sampled are
/// exactly those where some team was created or deactivated.
fn active_team_series(teams: &[&Team]) -> MonthlySeries {
    let mut months: BTreeSet<i32> = BTreeSet::new();
    for team in teams {
        months.insert(month_index(team.created_at));
        if let Some(inactive_at) = team.inactive_at {
            months.insert(month_index(inactive_at));
        }
    }

    let mut series = MonthlySeries::default();
    for month in months {
        let probe = month_sample_day(month);
        let active = teams
            .iter()
            .filter(|t| t.created_at <= probe && t.inactive_at.map_or(true, |d| d > probe))
            .count();
        series.labels.push(month_label(month));
        series.data_points.push(active);
    }
    series
}

fn best_percentile(placements: &[Placement]) -> Option<f64> {
    placements
        .iter()
        .map(|p| p.percentile)
        .fold(None, |best, p| match best {
            Some(b) if b <= p => Some(b),
            _ => Some(p),
        })
}

// --- individual ---

pub fn individual_analytics(dataset: &Dataset, handle: &str) -> Option<IndividualAnalytics> {
    let user = dataset.find_user(handle)?;

    let mut placements: Vec<Placement> = user
        .placements
        .iter()
        .filter(|p| p.date.is_some())
        .cloned()
        .collect();
    placements.sort_by_key(|p| p.date);

    let total_competitions = user.placements.len();
    let solo_competitions = user
        .placements
        .iter()
        .filter(|p| p.team_id.is_none())
        .count();

    Some(IndividualAnalytics {
        user: user.clone(),
        best_placement: best_percentile(&placements),
        placements,
        total_competitions,
        solo_competitions,
        team_competitions: total_competitions - solo_competitions,
    })
}

// --- team ---

/// Team results are reported by every member, so the same competition shows
/// up once per member. First occurrence wins; later duplicates are dropped,
/// not merged.
pub fn team_analytics(dataset: &Dataset, team_name: &str) -> Option<TeamAnalytics> {
    let team = dataset.find_team_by_name(team_name)?;

    let mut seen: HashSet<&str> = HashSet::new();
    let mut placements: Vec<Placement> = Vec::new();
    for user in &dataset.users {
        for placement in &user.placements {
            if placement.team_id.as_deref() == Some(team.id.as_str())
                && seen.insert(placement.name.as_str())
            {
                placements.push(placement.clone());
            }
        }
    }
    placements.retain(|p| p.date.is_some());
    placements.sort_by_key(|p| p.date);

    Some(TeamAnalytics {
        team: team.clone(),
        best_placement: best_percentile(&placements),
        total_competitions: placements.len(),
        placements,
    })
}

// --- university ---

pub fn university_analytics(dataset: &Dataset, university: &str) -> UniversityAnalytics {
    let students: Vec<_> = dataset
        .users
        .iter()
        .filter(|u| u.university.as_deref() == Some(university))
        .collect();
    let teams: Vec<&Team> = dataset
        .teams
        .iter()
        .filter(|t| t.university == university)
        .collect();
    let active_team_count = teams.iter().filter(|t| t.is_active).count();

    // Best result per (team, competition) pair, resolved through the members'
    // placement records; unknown team ids are skipped.
    let mut team_rows: Vec<TeamPlacementRow> = Vec::new();
    for student in &students {
        for placement in &student.placements {
            let Some(team_id) = placement.team_id.as_deref() else {
                continue;
            };
            let Some(team) = dataset.find_team_by_id(team_id) else {
                continue;
            };
            match team_rows
                .iter_mut()
                .find(|row| row.team_id == team_id && row.name == placement.name)
            {
                Some(row) => {
                    if placement.percentile < row.percentile {
                        row.rank = placement.rank;
                        row.percentile = placement.percentile;
                        row.date = placement.date;
                    }
                }
                None => team_rows.push(TeamPlacementRow {
                    team_id: team.id.clone(),
                    team_name: team.name.clone(),
                    name: placement.name.clone(),
                    rank: placement.rank,
                    percentile: placement.percentile,
                    date: placement.date,
                }),
            }
        }
    }
    team_rows.sort_by(|a, b| a.percentile.total_cmp(&b.percentile));
    team_rows.truncate(TOP_N);

    let mut student_rows: Vec<StudentPlacementRow> = students
        .iter()
        .flat_map(|student| {
            student
                .placements
                .iter()
                .filter(|p| p.team_id.is_none())
                .map(move |p| StudentPlacementRow {
                    handle: student.handle.clone(),
                    name: p.name.clone(),
                    rank: p.rank,
                    percentile: p.percentile,
                    date: p.date,
                })
        })
        .collect();
    student_rows.sort_by(|a, b| a.percentile.total_cmp(&b.percentile));
    student_rows.truncate(TOP_N);

    // Cumulative enrollment from the first join month through the current one.
    let mut join_counts: BTreeMap<i32, usize> = BTreeMap::new();
    for student in &students {
        if let Some(join_date) = student.join_date {
            *join_counts.entry(month_index(join_date)).or_insert(0) += 1;
        }
    }
    let mut growth = MonthlySeries::default();
    if let Some(&first_month) = join_counts.keys().next() {
        let last_month = month_index(dataset.as_of);
        let mut cumulative = 0;
        let mut month = first_month;
        while month <= last_month {
            cumulative += join_counts.get(&month).copied().unwrap_or(0);
            growth.labels.push(month_label(month));
            growth.data_points.push(cumulative);
            month += 1;
        }
    }

    let mut year_counts: BTreeMap<&str, usize> = BTreeMap::new();
    for student in &students {
        let label = YEAR_LABELS
            .iter()
            .find(|l| **l == student.academic_year_label)
            .copied()
            .unwrap_or("Unknown");
        *year_counts.entry(label).or_insert(0) += 1;
    }
    let mut students_by_year = Distribution::default();
    for label in YEAR_LABELS {
        if let Some(&count) = year_counts.get(label) {
            students_by_year.labels.push(label.to_string());
            students_by_year.data.push(count);
        }
    }

    UniversityAnalytics {
        university: university.to_string(),
        students: students.iter().map(|s| (*s).clone()).collect(),
        team_count: teams.len(),
        active_team_count,
        top_team_placements: team_rows,
        top_student_placements: student_rows,
        growth,
        active_teams: active_team_series(&teams),
        students_by_year,
    }
}

// --- competition ---

/// Series key for recurring editions of the same event: any standalone
/// 4-digit token is removed before case-folding, so "ICPC 2023 Regional"
/// and "ICPC 2024 Regional" collapse to the same key.
pub fn contest_series(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let is_word = |c: char| c.is_alphanumeric() || c == '_';
    let mut out = String::new();
    let mut i = 0;
    while i < chars.len() {
        if chars[i].is_ascii_digit() {
            let mut j = i;
            while j < chars.len() && chars[j].is_ascii_digit() {
                j += 1;
            }
            let bounded = (i == 0 || !is_word(chars[i - 1])) && (j == chars.len() || !is_word(chars[j]));
            if j - i == 4 && bounded {
                i = j;
                continue;
            }
            out.extend(&chars[i..j]);
            i = j;
        } else {
            out.push(chars[i]);
            i += 1;
        }
    }
    out.trim().to_lowercase()
}

fn is_first_time_for_user(dataset: &Dataset, handle: &str, competition: &str) -> bool {
    let series = contest_series(competition);
    if series.is_empty() {
        return false;
    }
    let Some(user) = dataset.find_user(handle) else {
        return false;
    };
    !user
        .placements
        .iter()
        .any(|p| p.name != competition && contest_series(&p.name) == series)
}

fn is_first_time_for_team(dataset: &Dataset, team: &Team, competition: &str) -> bool {
    team.members
        .iter()
        .all(|member| is_first_time_for_user(dataset, member, competition))
}

pub fn competition_analytics(dataset: &Dataset, competition: &str) -> CompetitionAnalytics {
    let mut individual_standings: Vec<IndividualStandingRow> = Vec::new();
    for user in &dataset.users {
        for placement in &user.placements {
            if placement.name != competition {
                continue;
            }
            let team = placement
                .team_id
                .as_deref()
                .and_then(|id| dataset.find_team_by_id(id));
            individual_standings.push(IndividualStandingRow {
                rank: placement.rank,
                handle: user.handle.clone(),
                university: user.university.clone(),
                team_id: team.map(|t| t.id.clone()),
                team_name: team.map(|t| t.name.clone()),
                is_first_time: is_first_time_for_user(dataset, &user.handle, competition),
            });
        }
    }
    individual_standings.sort_by_key(|row| row.rank);

    // One row per team, taking the best-ranked member's row.
    let mut team_standings: Vec<TeamStandingRow> = Vec::new();
    for row in &individual_standings {
        let Some(team_id) = row.team_id.as_deref() else {
            continue;
        };
        if team_standings.iter().any(|t| t.team_id == team_id) {
            continue;
        }
        let Some(team) = dataset.find_team_by_id(team_id) else {
            continue;
        };
        team_standings.push(TeamStandingRow {
            rank: row.rank,
            team_id: team.id.clone(),
            team_name: team.name.clone(),
            university: team.university.clone(),
            members: team.members.clone(),
            is_first_time: is_first_time_for_team(dataset, team, competition),
        });
    }

    CompetitionAnalytics {
        individual_standings,
        team_standings,
    }
}

// --- global ---

pub fn global_analytics(dataset: &Dataset) -> GlobalAnalytics {
    // Composite score rewards large cohorts with strong mean placements;
    // universities with no students or no placements are skipped outright.
    let mut top_universities: Vec<UniversityScore> = Vec::new();
    for university in &dataset.universities {
        let students: Vec<_> = dataset
            .users
            .iter()
            .filter(|u| u.university.as_deref() == Some(university.as_str()))
            .collect();
        if students.is_empty() {
            continue;
        }
        let placements: Vec<&Placement> =
            students.iter().flat_map(|s| s.placements.iter()).collect();
        if placements.is_empty() {
            continue;
        }
        let avg_percentile =
            placements.iter().map(|p| p.percentile).sum::<f64>() / placements.len() as f64;
        top_universities.push(UniversityScore {
            university: university.clone(),
            score: students.len() as f64 * (100.0 - avg_percentile),
            students: students.len(),
            avg_percentile,
        });
    }
    top_universities.sort_by(|a, b| b.score.total_cmp(&a.score));
    top_universities.truncate(TOP_N);

    let mut top_individuals: Vec<IndividualTally> = dataset
        .users
        .iter()
        .filter_map(|user| {
            let top_placements = user
                .placements
                .iter()
                .filter(|p| p.percentile <= 10.0)
                .count();
            (top_placements > 0).then(|| IndividualTally {
                handle: user.handle.clone(),
                top_placements,
            })
        })
        .collect();
    top_individuals.sort_by(|a, b| b.top_placements.cmp(&a.top_placements));
    top_individuals.truncate(TOP_N);

    let all_teams: Vec<&Team> = dataset.teams.iter().collect();

    let count_users = |university: &str| {
        dataset
            .users
            .iter()
            .filter(|u| u.university.as_deref() == Some(university))
            .count()
    };
    let count_teams = |university: &str| {
        dataset
            .teams
            .iter()
            .filter(|t| t.university == university)
            .count()
    };
    GlobalAnalytics {
        top_universities,
        top_individuals,
        active_teams: active_team_series(&all_teams),
        user_distribution: distribution(&dataset.universities, count_users),
        team_distribution: distribution(&dataset.universities, count_teams),
    }
}

fn distribution<F: Fn(&str) -> usize>(universities: &[String], count: F) -> Distribution {
    let mut entries: Vec<(&String, usize)> = universities
        .iter()
        .map(|u| (u, count(u)))
        .filter(|(_, n)| *n > 0)
        .collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1));
    Distribution {
        labels: entries.iter().map(|(u, _)| (*u).clone()).collect(),
        data: entries.iter().map(|(_, n)| *n).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::preprocess;
    use crate::models::{CompetitionInfo, RawBundle, RawPlacement, RawUser};
    use std::collections::BTreeMap;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn team(id: &str, name: &str, university: &str, members: &[&str]) -> Team {
        Team {
            id: id.to_string(),
            name: name.to_string(),
            university: university.to_string(),
            members: members.iter().map(|m| m.to_string()).collect(),
            created_at: ymd(2023, 1, 1),
            inactive_at: None,
            is_active: true,
        }
    }

    fn placement(name: &str, rank: u32, total: u32, team_id: Option<&str>) -> RawPlacement {
        RawPlacement {
            name: name.to_string(),
            rank,
            total,
            team_id: team_id.map(|t| t.to_string()),
        }
    }

    fn user(handle: &str, university: &str, placements: Vec<RawPlacement>) -> RawUser {
        RawUser {
            handle: handle.to_string(),
            full_name: None,
            university_start_date: Some(ymd(2023, 9, 1)),
            is_trusted: None,
            university: Some(university.to_string()),
            join_date: Some(ymd(2023, 9, 15)),
            placements,
        }
    }

    fn fixture() -> Dataset {
        let mut competitions = BTreeMap::new();
        for (name, date) in [
            ("ICPC 2023 Regional", ymd(2023, 11, 4)),
            ("ICPC 2024 Regional", ymd(2024, 11, 2)),
            ("Spring Open 2024", ymd(2024, 4, 20)),
        ] {
            competitions.insert(name.to_string(), CompetitionInfo { date });
        }

        let bundle = RawBundle {
            users: vec![
                user(
                    "alice",
                    "KTH",
                    vec![
                        placement("ICPC 2023 Regional", 4, 100, Some("t1")),
                        placement("ICPC 2024 Regional", 8, 100, Some("t1")),
                        placement("Spring Open 2024", 2, 40, None),
                    ],
                ),
                user(
                    "bob",
                    "KTH",
                    vec![
                        // Same team result reported by a second member.
                        placement("ICPC 2024 Regional", 8, 100, Some("t1")),
                    ],
                ),
                user(
                    "carol",
                    "LTH",
                    vec![placement("ICPC 2024 Regional", 30, 100, Some("t2"))],
                ),
            ],
            teams: vec![
                team("t1", "Kodkrigarna", "KTH", &["alice", "bob"]),
                team("t2", "Lundaloparna", "LTH", &["carol"]),
            ],
            competitions,
            universities: vec!["KTH".to_string(), "LTH".to_string()],
        };
        preprocess(bundle, ymd(2026, 8, 30))
    }

    #[test]
    fn individual_analytics_counts_solo_and_team_entries() {
        let ds = fixture();
        let result = individual_analytics(&ds, "Alice").unwrap();
        assert_eq!(result.total_competitions, 3);
        assert_eq!(result.solo_competitions, 1);
        assert_eq!(result.team_competitions, 2);
        assert_eq!(result.best_placement, Some(4.0));
        // Dated placements come back in ascending date order.
        let dates: Vec<_> = result.placements.iter().map(|p| p.date).collect();
        let mut sorted = dates.clone();
        sorted.sort();
        assert_eq!(dates, sorted);
    }

    #[test]
    fn unknown_handle_yields_none() {
        assert!(individual_analytics(&fixture(), "nobody").is_none());
    }

    #[test]
    fn team_analytics_deduplicates_member_reports() {
        let ds = fixture();
        let result = team_analytics(&ds, "Kodkrigarna").unwrap();
        // alice and bob both reported ICPC 2024; only one row survives.
        assert_eq!(result.total_competitions, 2);
        assert_eq!(result.best_placement, Some(4.0));
        assert_eq!(result.placements[0].name, "ICPC 2023 Regional");
    }

    #[test]
    fn university_analytics_filters_and_ranks() {
        let ds = fixture();
        let result = university_analytics(&ds, "KTH");
        assert_eq!(result.students.len(), 2);
        assert_eq!(result.team_count, 1);
        assert_eq!(result.active_team_count, 1);
        // Best team row is the rank-4 2023 result.
        assert_eq!(result.top_team_placements[0].rank, 4);
        assert_eq!(result.top_team_placements[0].team_name, "Kodkrigarna");
        assert_eq!(result.top_student_placements.len(), 1);
        assert_eq!(result.top_student_placements[0].handle, "alice");
        // Both students joined 2023-09; growth runs through the current month.
        assert_eq!(result.growth.labels.first().map(String::as_str), Some("2023-09"));
        assert_eq!(result.growth.labels.last().map(String::as_str), Some("2026-08"));
        assert_eq!(result.growth.data_points.first(), Some(&2));
        assert_eq!(result.growth.data_points.last(), Some(&2));
        assert_eq!(result.students_by_year.labels, vec!["3rd Year".to_string()]);
        assert_eq!(result.students_by_year.data, vec![2]);
    }

    #[test]
    fn unknown_university_yields_empty_aggregates() {
        let result = university_analytics(&fixture(), "MIT");
        assert!(result.students.is_empty());
        assert!(result.top_team_placements.is_empty());
        assert!(result.growth.labels.is_empty());
        assert!(result.students_by_year.labels.is_empty());
    }

    #[test]
    fn active_team_series_uses_dates_not_flags() {
        let mut ds = fixture();
        ds.teams[0].inactive_at = Some(ymd(2024, 6, 1));
        ds.teams[0].is_active = true; // stale flag must be ignored
        let result = university_analytics(&ds, "KTH");
        // Months sampled: creation (2023-01) and deactivation (2024-06).
        assert_eq!(result.active_teams.labels, vec!["2023-01", "2024-06"]);
        assert_eq!(result.active_teams.data_points, vec![1, 0]);
    }

    #[test]
    fn team_deactivated_on_probe_day_counts_as_inactive() {
        let mut ds = fixture();
        // Deactivation lands exactly on the day-2 sample point.
        ds.teams[0].inactive_at = Some(ymd(2024, 6, 2));
        let result = university_analytics(&ds, "KTH");
        assert_eq!(result.active_teams.labels, vec!["2023-01", "2024-06"]);
        assert_eq!(result.active_teams.data_points, vec![1, 0]);
        // Same boundary rule in the global view.
        let global = global_analytics(&ds);
        assert_eq!(global.active_teams.labels, vec!["2023-01", "2024-06"]);
        assert_eq!(global.active_teams.data_points, vec![2, 1]);
    }

    #[test]
    fn contest_series_strips_standalone_years() {
        assert_eq!(contest_series("ICPC 2024 Regional"), contest_series("ICPC 2023 Regional"));
        assert_eq!(contest_series("  Spring Open 2024"), "spring open");
        // Digits glued to a word are not a year token.
        assert_ne!(contest_series("ICPC2024 Regional"), contest_series("ICPC2023 Regional"));
        // Five-digit runs are left alone.
        assert_eq!(contest_series("Marathon 12345"), "marathon 12345");
        assert_eq!(contest_series("2024"), "");
    }

    #[test]
    fn first_time_flags_respect_the_series() {
        let ds = fixture();
        let result = competition_analytics(&ds, "ICPC 2024 Regional");
        let alice = result
            .individual_standings
            .iter()
            .find(|r| r.handle == "alice")
            .unwrap();
        // alice played the 2023 edition of the same series.
        assert!(!alice.is_first_time);
        let bob = result
            .individual_standings
            .iter()
            .find(|r| r.handle == "bob")
            .unwrap();
        assert!(bob.is_first_time);
        let carol = result
            .individual_standings
            .iter()
            .find(|r| r.handle == "carol")
            .unwrap();
        assert!(carol.is_first_time);
    }

    #[test]
    fn team_standings_deduplicate_and_inherit_member_flags() {
        let ds = fixture();
        let result = competition_analytics(&ds, "ICPC 2024 Regional");
        assert_eq!(result.team_standings.len(), 2);
        // Sorted by rank ascending; t1 (rank 8) before t2 (rank 30).
        assert_eq!(result.team_standings[0].team_id, "t1");
        // alice is a returning member, so t1 is not first-time.
        assert!(!result.team_standings[0].is_first_time);
        assert!(result.team_standings[1].is_first_time);
    }

    #[test]
    fn standings_skip_unknown_team_ids() {
        let mut ds = fixture();
        ds.users[2].placements[0].team_id = Some("ghost".to_string());
        let result = competition_analytics(&ds, "ICPC 2024 Regional");
        let carol = result
            .individual_standings
            .iter()
            .find(|r| r.handle == "carol")
            .unwrap();
        assert_eq!(carol.team_id, None);
        assert_eq!(result.team_standings.len(), 1);
    }

    #[test]
    fn global_analytics_scores_universities() {
        let ds = fixture();
        let result = global_analytics(&ds);
        assert_eq!(result.top_universities[0].university, "KTH");
        // KTH: percentiles 4, 8, 5, 8 -> mean 6.25; 2 students.
        assert!((result.top_universities[0].score - 2.0 * (100.0 - 6.25)).abs() < 1e-9);
        assert_eq!(result.top_individuals[0].handle, "alice");
        assert_eq!(result.top_individuals[0].top_placements, 3);
        assert_eq!(result.user_distribution.labels, vec!["KTH", "LTH"]);
        assert_eq!(result.user_distribution.data, vec![2, 1]);
        assert_eq!(result.team_distribution.data, vec![1, 1]);
    }

    #[test]
    fn global_analytics_on_empty_dataset_is_empty_not_an_error() {
        let result = global_analytics(&Dataset::default());
        assert!(result.top_universities.is_empty());
        assert!(result.top_individuals.is_empty());
        assert!(result.active_teams.labels.is_empty());
        assert!(result.user_distribution.labels.is_empty());
        assert!(result.team_distribution.labels.is_empty());
    }
}
