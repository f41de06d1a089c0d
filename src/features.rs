use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, NaiveDate, NaiveTime};

use crate::curve::{logistic_curve, sigmoid};
use crate::models::{FeatureStats, RosterEntry, SignalBundle, Submission};

const SECONDS_PER_DAY: f64 = 86_400.0;
const ACCEPTED: &str = "OK";
const SKIPPED: &str = "SKIPPED";

/// Fixed weight table for the final linear combination.
pub struct Weights {
    pub bias: f64,
    pub max_rating: f64,
    pub avg_rating: f64,
    pub contest_count: f64,
    pub luna_score: f64,
    pub placement_score: f64,
    pub avg_div2_perf_score: f64,
    pub weighted_solves: f64,
    pub activity_score: f64,
    pub inactivity_pattern: f64,
    pub skipped: f64,
}

pub const WEIGHTS: Weights = Weights {
    bias: -7.0,
    max_rating: 0.02,
    avg_rating: 0.01,
    contest_count: 0.03,
    luna_score: 0.04,
    placement_score: 0.08,
    avg_div2_perf_score: 0.16,
    weighted_solves: 0.05,
    activity_score: 0.08,
    inactivity_pattern: -0.04,
    skipped: -0.015,
};

pub fn score_from_max_rating(max_rating: f64) -> f64 {
    logistic_curve(max_rating, 60.0, 0.01, 1750.0)
}

pub fn score_from_avg_rating(avg_rating: f64) -> f64 {
    logistic_curve(avg_rating, 50.0, 0.012, 1650.0)
}

pub fn score_from_contest_count(contest_count: usize) -> f64 {
    logistic_curve(contest_count as f64, 25.0, 0.06, 60.0)
}

pub fn combined_luna_score(nova_score: f64, hard_score: f64) -> f64 {
    let combined_raw = nova_score * 0.5 + hard_score * 1.5;
    logistic_curve(combined_raw, 50.0, 0.025, 300.0)
}

/// Root-mean-square of the inverted percentiles, so a run of strong
/// placements scores high and a single bad one drags quadratically.
pub fn score_from_placements(percentiles: &[f64]) -> f64 {
    if percentiles.is_empty() {
        return 0.0;
    }
    let sum_of_squares: f64 = percentiles
        .iter()
        .map(|p| {
            let inverted = 100.0 - p;
            inverted * inverted
        })
        .sum();
    let rms = (sum_of_squares / percentiles.len() as f64).sqrt();
    logistic_curve(rms, 70.0, 0.08, 75.0)
}

pub fn score_from_div2_performance(avg_performance: f64) -> f64 {
    logistic_curve(avg_performance, 100.0, 0.3, 10.0)
}

fn problem_letter_weight(index: &str) -> f64 {
    match index.chars().next().map(|c| c.to_ascii_uppercase()) {
        Some('A') => 1.0,
        Some('B') => 2.0,
        Some('C') => 4.0,
        Some('D') => 8.0,
        Some('E') => 12.0,
        Some('F') => 16.0,
        _ => 0.0,
    }
}

/// Average per-contest performance over the Div. 2 subset: distinct solved
/// problem letters weighted, summed per contest, divided by the number of
/// Div. 2 contests entered. Zero contests yields a raw average of 0.
pub fn avg_div2_performance(
    submissions: &[Submission],
    div2_contest_ids: &HashSet<i64>,
    div2_contest_count: usize,
) -> f64 {
    if div2_contest_count == 0 {
        return 0.0;
    }
    let mut solved: HashMap<i64, HashSet<String>> = HashMap::new();
    for sub in submissions {
        if sub.verdict != ACCEPTED {
            continue;
        }
        let Some(contest_id) = sub.problem.contest_id else {
            continue;
        };
        if !div2_contest_ids.contains(&contest_id) {
            continue;
        }
        solved
            .entry(contest_id)
            .or_default()
            .insert(sub.problem.index.clone());
    }
    let total: f64 = solved
        .values()
        .map(|indices| indices.iter().map(|i| problem_letter_weight(i)).sum::<f64>())
        .sum();
    total / div2_contest_count as f64
}

/// Recency- and difficulty-weighted sum over distinct accepted problems,
/// newest submission per problem counting.
pub fn recency_weighted_solve_score(submissions: &[Submission], now_secs: i64) -> f64 {
    const DECAY: f64 = 0.005;
    const RATING_BASE: f64 = 1200.0;
    const GROWTH_FACTOR: f64 = 1.15;

    let mut sorted: Vec<&Submission> = submissions.iter().collect();
    sorted.sort_by(|a, b| b.creation_time_seconds.cmp(&a.creation_time_seconds));

    let mut seen: HashSet<(Option<i64>, String)> = HashSet::new();
    let mut raw = 0.0;
    for sub in sorted {
        if sub.verdict != ACCEPTED {
            continue;
        }
        let Some(rating) = sub.problem.rating else {
            continue;
        };
        if !seen.insert((sub.problem.contest_id, sub.problem.index.clone())) {
            continue;
        }
        let days_old = (now_secs - sub.creation_time_seconds) as f64 / SECONDS_PER_DAY;
        let recency_weight = (-DECAY * days_old).exp();
        let problem_score = GROWTH_FACTOR.powf((rating - RATING_BASE) / 100.0);
        raw += problem_score * recency_weight;
    }
    logistic_curve(raw, 40.0, 0.002, 1500.0)
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActivityMetrics {
    pub raw_activity_score: f64,
    pub unique_active_days: usize,
    pub inactivity_score: f64,
    pub avg_gap: f64,
    pub std_dev_gap: f64,
}

fn day_start_secs(day: NaiveDate) -> i64 {
    day.and_time(NaiveTime::MIN).and_utc().timestamp()
}

/// Buckets accepted submissions by UTC calendar day. Raw activity rewards
/// many distinct active days with diminishing per-day returns; the
/// inactivity penalty grows with sparse, irregular, or stale activity.
pub fn activity_metrics(submissions: &[Submission], now_secs: i64) -> ActivityMetrics {
    const DECAY: f64 = 0.003;

    let mut daily: BTreeMap<NaiveDate, usize> = BTreeMap::new();
    for sub in submissions {
        if sub.verdict != ACCEPTED {
            continue;
        }
        let Some(dt) = DateTime::from_timestamp(sub.creation_time_seconds, 0) else {
            continue;
        };
        *daily.entry(dt.date_naive()).or_insert(0) += 1;
    }

    let mut raw_activity_score = 0.0;
    for (day, count) in &daily {
        let days_old = (now_secs - day_start_secs(*day)) as f64 / SECONDS_PER_DAY;
        raw_activity_score += (*count as f64).sqrt() * (-DECAY * days_old).exp();
    }

    let unique_active_days = daily.len();
    if unique_active_days < 3 {
        return ActivityMetrics {
            raw_activity_score,
            unique_active_days,
            inactivity_score: 100.0,
            avg_gap: 365.0,
            std_dev_gap: 0.0,
        };
    }

    let days: Vec<NaiveDate> = daily.keys().copied().collect();
    let gaps: Vec<f64> = days
        .windows(2)
        .map(|pair| (pair[1] - pair[0]).num_days() as f64)
        .collect();
    let avg_gap = gaps.iter().sum::<f64>() / gaps.len() as f64;
    let variance = gaps.iter().map(|g| (g - avg_gap).powi(2)).sum::<f64>() / gaps.len() as f64;
    let std_dev_gap = variance.sqrt();

    let last_day = days[days.len() - 1];
    let recency_gap = (now_secs - day_start_secs(last_day)) as f64 / SECONDS_PER_DAY;
    let raw_penalty = avg_gap + 2.0 * std_dev_gap + 1.5 * recency_gap;

    ActivityMetrics {
        raw_activity_score,
        unique_active_days,
        inactivity_score: logistic_curve(raw_penalty, 100.0, 0.1, 40.0),
        avg_gap,
        std_dev_gap,
    }
}

pub fn score_from_activity(raw_activity_score: f64) -> f64 {
    logistic_curve(raw_activity_score, 50.0, 0.1, 50.0)
}

/// Applies the trust dampening to the sub-scores. Fetched-signal scores get
/// 10% credit, the manual score 80%, and the inactivity penalty is halved.
/// Trusted stats come back unchanged.
pub fn trust_adjusted(stats: &FeatureStats) -> FeatureStats {
    let mut adjusted = stats.clone();
    if stats.is_trusted {
        return adjusted;
    }
    const FETCHED_PENALTY: f64 = 0.1;
    const MANUAL_PENALTY: f64 = 0.8;
    adjusted.score_max_rating *= FETCHED_PENALTY;
    adjusted.score_avg_rating *= FETCHED_PENALTY;
    adjusted.score_contest_count *= FETCHED_PENALTY;
    adjusted.score_div2_performance *= FETCHED_PENALTY;
    adjusted.score_weighted_solves *= FETCHED_PENALTY;
    adjusted.score_activity *= FETCHED_PENALTY;
    adjusted.score_combined_luna *= MANUAL_PENALTY;
    adjusted.inactivity_score *= 0.5;
    adjusted
}

pub fn readiness_probability(stats: &FeatureStats) -> f64 {
    let s = trust_adjusted(stats);
    let z = WEIGHTS.bias
        + s.score_max_rating * WEIGHTS.max_rating
        + s.score_avg_rating * WEIGHTS.avg_rating
        + s.score_contest_count * WEIGHTS.contest_count
        + s.score_combined_luna * WEIGHTS.luna_score
        + s.score_placements * WEIGHTS.placement_score
        + s.score_div2_performance * WEIGHTS.avg_div2_perf_score
        + s.score_weighted_solves * WEIGHTS.weighted_solves
        + s.score_activity * WEIGHTS.activity_score
        + s.inactivity_score * WEIGHTS.inactivity_pattern
        + s.skipped_submission_count as f64 * WEIGHTS.skipped;
    sigmoid(z)
}

/// Scores one roster member against their fetched signals. Absent or empty
/// histories degrade to 0-valued raw statistics instead of failing.
pub fn score_user(entry: &RosterEntry, signals: &SignalBundle, now_secs: i64) -> FeatureStats {
    let changes = &signals.rating_changes;
    let total_contest_count = changes.len();
    let max_rating = if total_contest_count > 0 {
        changes.iter().map(|c| c.new_rating).fold(f64::MIN, f64::max)
    } else {
        0.0
    };
    let average_contest_rating = if total_contest_count > 0 {
        changes.iter().map(|c| c.new_rating).sum::<f64>() / total_contest_count as f64
    } else {
        0.0
    };

    let div2_contest_ids: HashSet<i64> = changes
        .iter()
        .filter(|c| c.contest_name.contains("Div. 2"))
        .map(|c| c.contest_id)
        .collect();
    let div2_contest_count = changes
        .iter()
        .filter(|c| c.contest_name.contains("Div. 2"))
        .count();
    let avg_div2 = avg_div2_performance(&signals.submissions, &div2_contest_ids, div2_contest_count);

    let skipped_submission_count = signals
        .submissions
        .iter()
        .filter(|s| s.verdict == SKIPPED)
        .count();

    let activity = activity_metrics(&signals.submissions, now_secs);

    let mut stats = FeatureStats {
        handle: entry.handle.clone(),
        is_trusted: entry.is_trusted,
        max_rating,
        average_contest_rating,
        total_contest_count,
        div2_contest_count,
        avg_div2_performance: avg_div2,
        skipped_submission_count,
        raw_activity_score: activity.raw_activity_score,
        unique_active_days: activity.unique_active_days,
        avg_gap: activity.avg_gap,
        std_dev_gap: activity.std_dev_gap,
        score_max_rating: score_from_max_rating(max_rating),
        score_avg_rating: score_from_avg_rating(average_contest_rating),
        score_contest_count: score_from_contest_count(total_contest_count),
        score_combined_luna: combined_luna_score(entry.nova_score, entry.hard_score),
        score_placements: score_from_placements(&entry.placements),
        score_div2_performance: score_from_div2_performance(avg_div2),
        score_weighted_solves: recency_weighted_solve_score(&signals.submissions, now_secs),
        score_activity: score_from_activity(activity.raw_activity_score),
        inactivity_score: activity.inactivity_score,
        readiness_probability: 0.0,
    };
    stats.readiness_probability = readiness_probability(&stats);
    stats
}
