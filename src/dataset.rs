use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};

use crate::models::{Dataset, Placement, RawBundle, User};

/// Academic-year bucket from an enrollment date, measured against `today`
/// with month rollover: the first 12 months are year 1. Years 5 through 9
/// collapse into "5th Year+", year 10 and beyond is "Graduated".
pub fn academic_year(start: Option<NaiveDate>, today: NaiveDate) -> (Option<u8>, &'static str) {
    let Some(start) = start else {
        return (None, "Unknown");
    };
    let mut elapsed = today.year() - start.year();
    if today.month() < start.month() {
        elapsed -= 1;
    }
    let year = elapsed + 1;
    match year {
        1 => (Some(1), "1st Year"),
        2 => (Some(2), "2nd Year"),
        3 => (Some(3), "3rd Year"),
        4 => (Some(4), "4th Year"),
        5..=9 => (Some(5), "5th Year+"),
        _ => (Some(6), "Graduated"),
    }
}

pub fn percentile(rank: u32, total: u32) -> f64 {
    if total > 0 {
        rank as f64 / total as f64 * 100.0
    } else {
        100.0
    }
}

/// Normalizes a raw import bundle into the enriched snapshot the analytics
/// queries consume. Pure and idempotent: the same bundle and `today` always
/// produce the same snapshot, and a new snapshot fully replaces the old one.
pub fn preprocess(raw: RawBundle, today: NaiveDate) -> Dataset {
    let competitions: BTreeMap<String, NaiveDate> = raw
        .competitions
        .into_iter()
        .map(|(name, info)| (name, info.date))
        .collect();

    let users: Vec<User> = raw
        .users
        .into_iter()
        .map(|u| {
            let (year, label) = academic_year(u.university_start_date, today);
            let placements: Vec<Placement> = u
                .placements
                .into_iter()
                .map(|p| Placement {
                    percentile: percentile(p.rank, p.total),
                    date: competitions.get(&p.name).copied(),
                    name: p.name,
                    rank: p.rank,
                    total: p.total,
                    team_id: p.team_id,
                })
                .collect();
            User {
                handle: u.handle,
                full_name: u.full_name,
                university: u.university,
                university_start_date: u.university_start_date,
                join_date: u.join_date,
                is_trusted: u.is_trusted.unwrap_or(true),
                academic_year: year,
                academic_year_label: label.to_string(),
                placements,
            }
        })
        .collect();

    Dataset {
        users,
        teams: raw.teams,
        competitions,
        universities: raw.universities,
        as_of: today,
    }
}
