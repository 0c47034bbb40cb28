//! Medication reports for sharing outside the app.
//!
//! JSON carries the full dose history, the plain-text variant is meant for
//! pasting into a message, and the CSV variant flattens the history into one
//! row per medication, day and slot.

use crate::{adherence, Frequency, Medication, Result, TakenHistory};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Write as _;
use std::fs::File;
use std::path::Path;

/// One medication as it appears in an exported report
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MedicationReport {
    pub name: String,
    pub dosage: String,
    pub frequency: String,
    pub prescribed_by: String,
    pub purpose: String,
    pub adherence: u8,
    pub history: TakenHistory,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReportDocument<'a> {
    exported_at: DateTime<Utc>,
    medications: &'a [MedicationReport],
}

/// Human-readable label for a medication's frequency
pub fn frequency_label(medication: &Medication) -> String {
    match (medication.frequency, medication.custom_frequency) {
        (Frequency::Once, _) => "Once daily".into(),
        (Frequency::Twice, _) => "Twice daily".into(),
        (Frequency::Thrice, _) => "Three times daily".into(),
        (Frequency::Custom, Some(count)) => format!("{} times daily", count),
        (Frequency::Custom, None) => "Custom".into(),
    }
}

pub fn build_report(medications: &[Medication]) -> Vec<MedicationReport> {
    medications
        .iter()
        .map(|m| MedicationReport {
            name: m.name.clone(),
            dosage: m.dosage.clone(),
            frequency: frequency_label(m),
            prescribed_by: m.prescribed_by.clone(),
            purpose: m.purpose.clone(),
            adherence: adherence::adherence(m),
            history: m.taken_history.clone(),
        })
        .collect()
}

/// Pretty-printed JSON report with an export timestamp
pub fn to_json(medications: &[Medication]) -> Result<String> {
    let report = build_report(medications);
    let document = ReportDocument {
        exported_at: Utc::now(),
        medications: &report,
    };
    Ok(serde_json::to_string_pretty(&document)?)
}

/// Plain-text summary without the raw history
pub fn to_text(medications: &[Medication]) -> String {
    let mut out = String::from("Medication Report\n=================\n");
    if medications.is_empty() {
        out.push_str("\nNo medications recorded.\n");
        return out;
    }
    for report in build_report(medications) {
        // Writing to a String cannot fail
        let _ = write!(
            out,
            "\n{}\n  Dosage: {}\n  Frequency: {}\n  Prescribed by: {}\n  Purpose: {}\n  Adherence: {}%\n",
            report.name,
            report.dosage,
            report.frequency,
            report.prescribed_by,
            report.purpose,
            report.adherence
        );
    }
    out
}

/// A row in the CSV output
#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    medication_id: &'a str,
    name: &'a str,
    date: String,
    slot: usize,
    taken: bool,
}

/// Write one CSV row per medication, day and slot.
///
/// Returns the number of rows written.
pub fn write_history_csv(medications: &[Medication], path: &Path) -> Result<usize> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file = File::create(path)?;
    let mut writer = csv::WriterBuilder::new().has_headers(true).from_writer(file);

    let mut rows = 0;
    for medication in medications {
        for (date, row) in &medication.taken_history {
            for (slot, taken) in row.iter().enumerate() {
                writer.serialize(CsvRow {
                    medication_id: &medication.id,
                    name: &medication.name,
                    date: date.to_string(),
                    slot,
                    taken: *taken,
                })?;
                rows += 1;
            }
        }
    }

    writer.flush()?;
    let file = writer
        .into_inner()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
    file.sync_all()?;

    tracing::info!("Wrote {} history row(s) to {:?}", rows, path);
    Ok(rows)
}
