use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

mod analytics;
mod curve;
mod dataset;
mod dispatcher;
mod features;
mod models;
mod report;
mod roster;

use dispatcher::{Dispatcher, RequestEnvelope, ResponseEnvelope};
use models::{FeatureStats, SignalBundle};
use report::FailedHandle;

#[derive(Parser)]
#[command(name = "contest-readiness")]
#[command(about = "Readiness scoring and cohort analytics for competitive programming rosters", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score a roster of handles against fetched contest signals
    Score {
        #[arg(long)]
        roster: PathBuf,
        #[arg(long)]
        signals: PathBuf,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Write a markdown readiness report for a scored roster
    Report {
        #[arg(long)]
        roster: PathBuf,
        #[arg(long)]
        signals: PathBuf,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Print the dataset summary (handles, teams, universities, competitions)
    Summary {
        #[arg(long)]
        dataset: PathBuf,
    },
    /// Analytics for one handle
    Individual {
        #[arg(long)]
        dataset: PathBuf,
        handle: String,
    },
    /// Analytics for one team, by team name
    Team {
        #[arg(long)]
        dataset: PathBuf,
        name: String,
    },
    /// Analytics for one university
    University {
        #[arg(long)]
        dataset: PathBuf,
        name: String,
    },
    /// Standings and first-time flags for one competition
    Competition {
        #[arg(long)]
        dataset: PathBuf,
        name: String,
    },
    /// Dataset-wide rankings and distributions
    Global {
        #[arg(long)]
        dataset: PathBuf,
    },
    /// Full record for one handle, with team memberships
    UserDetails {
        #[arg(long)]
        dataset: PathBuf,
        handle: String,
    },
    /// Full record for one team, by team id
    TeamDetails {
        #[arg(long)]
        dataset: PathBuf,
        id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Score {
            roster,
            signals,
            limit,
        } => {
            let (scored, failures) = score_roster(&roster, &signals)?;
            let mut ranked = scored;
            ranked.sort_by(|a, b| b.readiness_probability.total_cmp(&a.readiness_probability));

            if ranked.is_empty() {
                println!("No handles were scored.");
            } else {
                println!("Top handles by readiness:");
                for stats in ranked.iter().take(limit) {
                    println!(
                        "- {} readiness {:.1}% across {} contests (max rating {:.0}, inactivity {:.1}){}",
                        stats.handle,
                        stats.readiness_probability * 100.0,
                        stats.total_contest_count,
                        stats.max_rating,
                        stats.inactivity_score,
                        if stats.is_trusted { "" } else { " [unverified]" },
                    );
                }
            }
            for failure in &failures {
                eprintln!("warning: {}: {}", failure.handle, failure.reason);
            }
        }
        Commands::Report {
            roster,
            signals,
            out,
        } => {
            let (scored, failures) = score_roster(&roster, &signals)?;
            let report = report::build_report(&scored, &failures, Utc::now().date_naive());
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
        Commands::Summary { dataset } => {
            run_query(&dataset, "GET_INITIAL_DATA", Value::Null).await?;
        }
        Commands::Individual { dataset, handle } => {
            run_query(&dataset, "GET_INDIVIDUAL_ANALYTICS", Value::String(handle)).await?;
        }
        Commands::Team { dataset, name } => {
            run_query(&dataset, "GET_TEAM_ANALYTICS", Value::String(name)).await?;
        }
        Commands::University { dataset, name } => {
            run_query(&dataset, "GET_UNIVERSITY_ANALYTICS", Value::String(name)).await?;
        }
        Commands::Competition { dataset, name } => {
            run_query(&dataset, "GET_COMPETITION_ANALYTICS", Value::String(name)).await?;
        }
        Commands::Global { dataset } => {
            run_query(&dataset, "GET_GLOBAL_ANALYTICS", Value::Null).await?;
        }
        Commands::UserDetails { dataset, handle } => {
            run_query(&dataset, "GET_USER_DETAILS", Value::String(handle)).await?;
        }
        Commands::TeamDetails { dataset, id } => {
            run_query(&dataset, "GET_TEAM_DETAILS", Value::String(id)).await?;
        }
    }

    Ok(())
}

/// Scores every roster entry that has a fetched-signal bundle. A handle
/// whose fetch is missing becomes a failure row; it never aborts the batch.
fn score_roster(
    roster_path: &PathBuf,
    signals_path: &PathBuf,
) -> anyhow::Result<(Vec<FeatureStats>, Vec<FailedHandle>)> {
    let entries = roster::load_roster(roster_path)
        .with_context(|| format!("failed to read roster {}", roster_path.display()))?;
    let raw = std::fs::read_to_string(signals_path)
        .with_context(|| format!("failed to read signals {}", signals_path.display()))?;
    let bundles: HashMap<String, SignalBundle> =
        serde_json::from_str(&raw).context("signals file is not a handle-to-bundle JSON map")?;
    let bundles: HashMap<String, SignalBundle> = bundles
        .into_iter()
        .map(|(handle, bundle)| (handle.to_lowercase(), bundle))
        .collect();

    let now = Utc::now().timestamp();
    let mut scored = Vec::new();
    let mut failures = Vec::new();
    for entry in &entries {
        match bundles.get(&entry.handle.to_lowercase()) {
            Some(bundle) => scored.push(features::score_user(entry, bundle, now)),
            None => failures.push(FailedHandle {
                handle: entry.handle.clone(),
                reason: "no fetched signals for this handle".to_string(),
            }),
        }
    }
    Ok((scored, failures))
}

/// Loads the dataset into a fresh dispatcher, runs one query through the
/// channel boundary, and prints the response payload as JSON.
async fn run_query(dataset_path: &PathBuf, kind: &str, payload: Value) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(dataset_path)
        .with_context(|| format!("failed to read dataset {}", dataset_path.display()))?;
    let bundle: Value = serde_json::from_str(&raw).context("dataset file is not valid JSON")?;

    let (requests, mut responses) = Dispatcher::new(Utc::now().date_naive()).spawn();
    send_and_wait(&requests, &mut responses, "INIT_DATA", bundle).await?;
    let result = send_and_wait(&requests, &mut responses, kind, payload).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn send_and_wait(
    requests: &mpsc::Sender<RequestEnvelope>,
    responses: &mut mpsc::Receiver<ResponseEnvelope>,
    kind: &str,
    payload: Value,
) -> anyhow::Result<Value> {
    let request_id = Uuid::new_v4().to_string();
    requests
        .send(RequestEnvelope {
            kind: kind.to_string(),
            payload,
            request_id: request_id.clone(),
        })
        .await
        .context("dispatcher is no longer running")?;
    let response = responses
        .recv()
        .await
        .context("dispatcher stopped before replying")?;
    anyhow::ensure!(
        response.request_id == request_id,
        "response correlation id {} does not match request {}",
        response.request_id,
        request_id
    );
    if response.kind.ends_with("_ERROR") {
        anyhow::bail!(
            "{kind} failed: {}",
            response.payload.as_str().unwrap_or("unknown error")
        );
    }
    Ok(response.payload)
}
