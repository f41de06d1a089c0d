use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

// --- raw dataset bundle, as supplied by the import boundary ---

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawBundle {
    #[serde(default)]
    pub users: Vec<RawUser>,
    #[serde(default)]
    pub teams: Vec<Team>,
    #[serde(default)]
    pub competitions: BTreeMap<String, CompetitionInfo>,
    #[serde(default)]
    pub universities: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompetitionInfo {
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawUser {
    pub handle: String,
    pub full_name: Option<String>,
    pub university_start_date: Option<NaiveDate>,
    pub is_trusted: Option<bool>,
    pub university: Option<String>,
    pub join_date: Option<NaiveDate>,
    #[serde(default)]
    pub placements: Vec<RawPlacement>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPlacement {
    pub name: String,
    pub rank: u32,
    #[serde(default)]
    pub total: u32,
    pub team_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Team {
    pub id: String,
    pub name: String,
    pub university: String,
    #[serde(default)]
    pub members: Vec<String>,
    pub created_at: NaiveDate,
    pub inactive_at: Option<NaiveDate>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

// --- enriched in-memory dataset produced by preprocessing ---

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Placement {
    pub name: String,
    pub rank: u32,
    pub total: u32,
    pub team_id: Option<String>,
    pub percentile: f64,
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub handle: String,
    pub full_name: Option<String>,
    pub university: Option<String>,
    pub university_start_date: Option<NaiveDate>,
    pub join_date: Option<NaiveDate>,
    pub is_trusted: bool,
    pub academic_year: Option<u8>,
    pub academic_year_label: String,
    pub placements: Vec<Placement>,
}

/// One immutable snapshot of the curated dataset. A load builds a whole new
/// snapshot; queries only ever take it by shared reference.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Dataset {
    pub users: Vec<User>,
    pub teams: Vec<Team>,
    pub competitions: BTreeMap<String, NaiveDate>,
    pub universities: Vec<String>,
    pub as_of: NaiveDate,
}

impl Dataset {
    /// Handle lookups are case-insensitive wherever a handle acts as a key.
    pub fn find_user(&self, handle: &str) -> Option<&User> {
        self.users
            .iter()
            .find(|u| u.handle.eq_ignore_ascii_case(handle))
    }

    pub fn find_team_by_name(&self, name: &str) -> Option<&Team> {
        self.teams.iter().find(|t| t.name == name)
    }

    pub fn find_team_by_id(&self, id: &str) -> Option<&Team> {
        self.teams.iter().find(|t| t.id == id)
    }
}

// --- externally fetched per-handle signals ---

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingChange {
    pub contest_id: i64,
    pub contest_name: String,
    pub new_rating: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    #[serde(default)]
    pub verdict: String,
    pub creation_time_seconds: i64,
    pub problem: Problem,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Problem {
    pub contest_id: Option<i64>,
    pub index: String,
    pub rating: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalBundle {
    #[serde(default)]
    pub rating_changes: Vec<RatingChange>,
    #[serde(default)]
    pub submissions: Vec<Submission>,
}

/// Manually entered inputs for one roster member.
#[derive(Debug, Clone)]
pub struct RosterEntry {
    pub handle: String,
    pub nova_score: f64,
    pub hard_score: f64,
    pub placements: Vec<f64>,
    pub is_trusted: bool,
}

/// Everything the feature model derived for one handle, transient per
/// scoring request and never merged back into the curated dataset.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureStats {
    pub handle: String,
    pub is_trusted: bool,
    pub max_rating: f64,
    pub average_contest_rating: f64,
    pub total_contest_count: usize,
    pub div2_contest_count: usize,
    pub avg_div2_performance: f64,
    pub skipped_submission_count: usize,
    pub raw_activity_score: f64,
    pub unique_active_days: usize,
    pub avg_gap: f64,
    pub std_dev_gap: f64,
    pub score_max_rating: f64,
    pub score_avg_rating: f64,
    pub score_contest_count: f64,
    pub score_combined_luna: f64,
    pub score_placements: f64,
    pub score_div2_performance: f64,
    pub score_weighted_solves: f64,
    pub score_activity: f64,
    pub inactivity_score: f64,
    pub readiness_probability: f64,
}

// --- analytics query results ---

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndividualAnalytics {
    pub user: User,
    pub placements: Vec<Placement>,
    pub best_placement: Option<f64>,
    pub total_competitions: usize,
    pub solo_competitions: usize,
    pub team_competitions: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamAnalytics {
    pub team: Team,
    pub placements: Vec<Placement>,
    pub best_placement: Option<f64>,
    pub total_competitions: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlySeries {
    pub labels: Vec<String>,
    pub data_points: Vec<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Distribution {
    pub labels: Vec<String>,
    pub data: Vec<usize>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamPlacementRow {
    pub team_id: String,
    pub team_name: String,
    pub name: String,
    pub rank: u32,
    pub percentile: f64,
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentPlacementRow {
    pub handle: String,
    pub name: String,
    pub rank: u32,
    pub percentile: f64,
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UniversityAnalytics {
    pub university: String,
    pub students: Vec<User>,
    pub team_count: usize,
    pub active_team_count: usize,
    pub top_team_placements: Vec<TeamPlacementRow>,
    pub top_student_placements: Vec<StudentPlacementRow>,
    pub growth: MonthlySeries,
    pub active_teams: MonthlySeries,
    pub students_by_year: Distribution,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndividualStandingRow {
    pub rank: u32,
    pub handle: String,
    pub university: Option<String>,
    pub team_id: Option<String>,
    pub team_name: Option<String>,
    pub is_first_time: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamStandingRow {
    pub rank: u32,
    pub team_id: String,
    pub team_name: String,
    pub university: String,
    pub members: Vec<String>,
    pub is_first_time: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompetitionAnalytics {
    pub individual_standings: Vec<IndividualStandingRow>,
    pub team_standings: Vec<TeamStandingRow>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UniversityScore {
    pub university: String,
    pub score: f64,
    pub students: usize,
    pub avg_percentile: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndividualTally {
    pub handle: String,
    pub top_placements: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalAnalytics {
    pub top_universities: Vec<UniversityScore>,
    pub top_individuals: Vec<IndividualTally>,
    pub active_teams: MonthlySeries,
    pub user_distribution: Distribution,
    pub team_distribution: Distribution,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRef {
    pub handle: String,
    pub full_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamRef {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetSummary {
    pub users: Vec<UserRef>,
    pub teams: Vec<TeamRef>,
    pub universities: Vec<String>,
    pub competitions: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDetails {
    pub user: User,
    pub teams: Vec<Team>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamDetails {
    pub team: Team,
    pub placements: Vec<Placement>,
}
