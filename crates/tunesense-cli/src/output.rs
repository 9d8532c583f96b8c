//! Output formatting for CLI

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tabled::settings::Style;
use tabled::{Table, Tabled};

use tunesense_core::RecommendationResult;
use tunesense_recommend::diagnostics::ComparedFeature;
use tunesense_recommend::FailedTrack;

/// Output format options
pub enum OutputFormat {
    Text,
    Json,
    Table,
}

impl From<&str> for OutputFormat {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            "table" => OutputFormat::Table,
            _ => OutputFormat::Text,
        }
    }
}

/// Serialize `data` as pretty JSON
pub fn format_output<T: Serialize>(data: &T) -> String {
    serde_json::to_string_pretty(data).unwrap_or_else(|_| "{}".to_string())
}

/// Render `data` as JSON, or `rows` as a table for the human formats
pub fn render<T: Serialize, R: Tabled>(data: &T, rows: Vec<R>, format: &str) -> String {
    match OutputFormat::from(format) {
        OutputFormat::Json => format_output(data),
        OutputFormat::Table => Table::new(rows).with(Style::rounded()).to_string(),
        OutputFormat::Text => Table::new(rows).with(Style::blank()).to_string(),
    }
}

/// True when only machine-readable output should reach stdout
pub fn is_json(format: &str) -> bool {
    matches!(OutputFormat::from(format), OutputFormat::Json)
}

/// Green status line on stderr
pub fn success(message: &str) {
    eprintln!("{} {}", style("✓").green().bold(), message);
}

/// Yellow status line on stderr
pub fn warning(message: &str) {
    eprintln!("{} {}", style("!").yellow().bold(), message);
}

/// Progress bar for a batch of `len` tracks
pub fn progress_bar(len: u64, message: &str) -> anyhow::Result<ProgressBar> {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec}, ETA: {eta})")?
            .progress_chars("=> "),
    );
    pb.set_message(message.to_string());
    Ok(pb)
}

#[derive(Tabled)]
pub struct StatRow {
    #[tabled(rename = "Field")]
    pub name: String,
    #[tabled(rename = "Value")]
    pub value: String,
}

impl StatRow {
    pub fn new(name: &str, value: impl ToString) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
        }
    }
}

#[derive(Tabled)]
pub struct FeatureRow {
    #[tabled(rename = "Column")]
    pub column: String,
    #[tabled(rename = "Value")]
    pub value: String,
}

#[derive(Tabled)]
pub struct RecommendationRow {
    #[tabled(rename = "#")]
    pub rank: usize,
    #[tabled(rename = "Track")]
    pub track_id: String,
    #[tabled(rename = "Distance")]
    pub distance: String,
    #[tabled(rename = "Artist")]
    pub artist: String,
    #[tabled(rename = "Title")]
    pub title: String,
    #[tabled(rename = "Genre")]
    pub genre: String,
}

impl RecommendationRow {
    pub fn from_results(results: &[RecommendationResult]) -> Vec<Self> {
        results
            .iter()
            .enumerate()
            .map(|(i, r)| Self {
                rank: i + 1,
                track_id: r.track_id.to_string(),
                distance: format!("{:.4}", r.distance),
                artist: r.artist.clone(),
                title: r.title.clone(),
                genre: r.genre.clone(),
            })
            .collect()
    }
}

#[derive(Tabled)]
pub struct ComparisonRow {
    #[tabled(rename = "Feature")]
    pub name: String,
    #[tabled(rename = "Query")]
    pub query: String,
    #[tabled(rename = "Candidate")]
    pub candidate: String,
    #[tabled(rename = "Difference")]
    pub difference: String,
}

impl From<&ComparedFeature> for ComparisonRow {
    fn from(f: &ComparedFeature) -> Self {
        Self {
            name: f.name.clone(),
            query: format!("{:.4}", f.query),
            candidate: format!("{:.4}", f.candidate),
            difference: format!("{:+.4}", f.candidate - f.query),
        }
    }
}

#[derive(Tabled)]
pub struct FailureRow {
    #[tabled(rename = "Track")]
    pub track_id: String,
    #[tabled(rename = "Code")]
    pub code: String,
    #[tabled(rename = "Reason")]
    pub reason: String,
}

impl From<&FailedTrack> for FailureRow {
    fn from(f: &FailedTrack) -> Self {
        Self {
            track_id: f.track_id.to_string(),
            code: f.code.clone(),
            reason: f.reason.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tunesense_core::TrackId;

    #[test]
    fn test_output_format_parsing() {
        assert!(matches!(OutputFormat::from("JSON"), OutputFormat::Json));
        assert!(matches!(OutputFormat::from("table"), OutputFormat::Table));
        assert!(matches!(OutputFormat::from("anything"), OutputFormat::Text));
    }

    #[test]
    fn test_render_json_and_table() {
        let results = vec![RecommendationResult {
            track_id: TrackId(91),
            distance: 0.5,
            title: "Ninety-one".to_string(),
            artist: "B".to_string(),
            genre: "Pop".to_string(),
        }];

        let json = render(&results, RecommendationRow::from_results(&results), "json");
        assert!(json.contains("\"track_id\": 91"));

        let table = render(&results, RecommendationRow::from_results(&results), "table");
        assert!(table.contains("Ninety-one"));
        assert!(table.contains("0.5000"));
    }

    #[test]
    fn test_comparison_difference_is_signed() {
        let row = ComparisonRow::from(&ComparedFeature {
            name: "tempo".to_string(),
            query: 120.0,
            candidate: 90.0,
        });
        assert_eq!(row.difference, "-30.0000");
    }
}
