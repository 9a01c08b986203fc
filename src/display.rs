//! Table rows for the CLI output.

use drill_ledger::database::stats::Summary;
use drill_ledger::ingest::field::CanonicalRow;
use drill_ledger::pipeline::FileOutcome;
use std::path::PathBuf;
use tabled::Table;
use tabled::Tabled;

#[derive(Tabled)]
pub struct OutcomeRow {
    #[tabled(rename = "File")]
    pub file: String,
    #[tabled(rename = "Outcome")]
    pub outcome: String,
    #[tabled(rename = "Detail")]
    pub detail: String,
}

#[derive(Tabled)]
pub struct IntervalRow {
    #[tabled(rename = "Hole ID")]
    pub hole_id: String,
    #[tabled(rename = "Date Logging")]
    pub logging_date: String,
    #[tabled(rename = "From")]
    pub from: String,
    #[tabled(rename = "To")]
    pub to: String,
    #[tabled(rename = "Length")]
    pub length: String,
    #[tabled(rename = "Recovery")]
    pub recovery: String,
    #[tabled(rename = "Material")]
    pub material: String,
    #[tabled(rename = "Rock")]
    pub rock: String,
    #[tabled(rename = "Weath")]
    pub weathering: String,
}

#[derive(Tabled)]
pub struct FigureRow {
    #[tabled(rename = "Figure")]
    pub name: &'static str,
    #[tabled(rename = "Value")]
    pub value: String,
}

#[derive(Tabled)]
pub struct RecoveryRow {
    #[tabled(rename = "From")]
    pub depth: String,
    #[tabled(rename = "Mean Recovery")]
    pub recovery: String,
}

#[derive(Tabled)]
pub struct MaterialRow {
    #[tabled(rename = "Material Code")]
    pub code: String,
    #[tabled(rename = "Rows")]
    pub count: usize,
}

fn optional(value: Option<f64>) -> String {
    value.map(|value| value.to_string()).unwrap_or_default()
}

pub fn outcomes_table(outcomes: &[(PathBuf, FileOutcome)]) -> String {
    let rows = outcomes.iter().map(|(path, outcome)| OutcomeRow {
        file: path.display().to_string(),
        outcome: outcome.to_string(),
        detail: match outcome {
            FileOutcome::Failed { reason, .. } => reason.to_owned(),
            _ => String::new(),
        },
    });
    Table::new(rows).to_string()
}

pub fn intervals_table(rows: &[CanonicalRow]) -> String {
    let rows = rows.iter().map(|row| IntervalRow {
        hole_id: row.hole_id.to_owned(),
        logging_date: row.logging_date.to_string(),
        from: row.from.to_string(),
        to: optional(row.to),
        length: optional(row.length),
        recovery: format!("{:.2}", row.recovery),
        material: row.material_code.to_owned(),
        rock: row.rock_code.to_owned(),
        weathering: row.weathering.as_ref().map(|value| value.to_text()).unwrap_or_default(),
    });
    Table::new(rows).to_string()
}

pub fn summary_table(summary: &Summary) -> String {
    let rows = vec![
        FigureRow {
            name: "Rows",
            value: summary.rows.to_string(),
        },
        FigureRow {
            name: "Total holes",
            value: summary.total_holes().to_string(),
        },
        FigureRow {
            name: "Average length",
            value: format!("{:.2}", summary.average_length),
        },
        FigureRow {
            name: "Deepest",
            value: summary.deepest.to_string(),
        },
        FigureRow {
            name: "Shallowest",
            value: summary.shallowest.to_string(),
        },
    ];
    Table::new(rows).to_string()
}

pub fn recovery_table(series: &[(f64, f64)]) -> String {
    let rows = series.iter().map(|(depth, recovery)| RecoveryRow {
        depth: depth.to_string(),
        recovery: format!("{:.1}%", recovery * 100.0),
    });
    Table::new(rows).to_string()
}

pub fn material_table(counts: &[(String, usize)]) -> String {
    let rows = counts.iter().map(|(code, count)| MaterialRow {
        code: code.to_owned(),
        count: *count,
    });
    Table::new(rows).to_string()
}
