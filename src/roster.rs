use std::path::Path;

use crate::models::RosterEntry;

/// Parses one roster CSV row's cells. Numeric cells default to 0 when blank
/// or unparseable; the placements cell holds `;`- or `,`-separated
/// percentiles; trust defaults to true.
fn parse_row(row: &RosterRow) -> Option<RosterEntry> {
    // Rows without a handle or a placements cell are skipped, not errors.
    if row.handle.trim().is_empty() || row.placements.trim().is_empty() {
        return None;
    }
    let placements: Vec<f64> = row
        .placements
        .split([';', ','])
        .filter_map(|cell| cell.trim().parse::<f64>().ok())
        .collect();
    Some(RosterEntry {
        handle: row.handle.trim().to_string(),
        nova_score: row.nova_score.trim().parse().unwrap_or(0.0),
        hard_score: row.hard_score.trim().parse().unwrap_or(0.0),
        placements,
        is_trusted: !row
            .is_trusted
            .as_deref()
            .is_some_and(|cell| cell.trim().eq_ignore_ascii_case("false")),
    })
}

#[derive(Debug, serde::Deserialize)]
struct RosterRow {
    handle: String,
    #[serde(default)]
    nova_score: String,
    #[serde(default)]
    hard_score: String,
    #[serde(default)]
    placements: String,
    #[serde(default)]
    is_trusted: Option<String>,
}

pub fn load_roster(path: &Path) -> anyhow::Result<Vec<RosterEntry>> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let mut entries = Vec::new();
    for result in reader.deserialize::<RosterRow>() {
        let row = result?;
        if let Some(entry) = parse_row(&row) {
            entries.push(entry);
        }
    }
    Ok(entries)
}
