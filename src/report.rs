use std::fmt::Write;

use chrono::NaiveDate;

use crate::models::FeatureStats;

/// A roster member whose fetch failed; scoring continued without them.
#[derive(Debug, Clone)]
pub struct FailedHandle {
    pub handle: String,
    pub reason: String,
}

pub fn build_report(
    scored: &[FeatureStats],
    failures: &[FailedHandle],
    generated: NaiveDate,
) -> String {
    let mut ranked: Vec<&FeatureStats> = scored.iter().collect();
    ranked.sort_by(|a, b| b.readiness_probability.total_cmp(&a.readiness_probability));

    let mut output = String::new();

    let _ = writeln!(output, "# Contest Readiness Report");
    let _ = writeln!(
        output,
        "Generated {} for {} scored handle(s).",
        generated,
        scored.len()
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Readiness Ranking");

    if ranked.is_empty() {
        let _ = writeln!(output, "No handles were scored.");
    } else {
        for stats in &ranked {
            let _ = writeln!(
                output,
                "- {}: readiness {:.1}% (max rating {:.0}, {} contests, placement {:.1}, div2 {:.1}, activity {:.1}, inactivity {:.1}){}",
                stats.handle,
                stats.readiness_probability * 100.0,
                stats.max_rating,
                stats.total_contest_count,
                stats.score_placements,
                stats.score_div2_performance,
                stats.score_activity,
                stats.inactivity_score,
                if stats.is_trusted { "" } else { " [unverified]" },
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Failed Handles");

    if failures.is_empty() {
        let _ = writeln!(output, "All handles were scored successfully.");
    } else {
        for failure in failures {
            let _ = writeln!(output, "- {}: {}", failure.handle, failure.reason);
        }
    }

    output
}
