use std::collections::HashSet;
use std::fmt;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::ValueEnum;
use rust_xlsxwriter::{Format, Workbook, Worksheet};
use tracing::info;

use crate::report::Report;

pub const CONTACTS_SHEET: &str = "contacts";
pub const SUMMARY_SHEET: &str = "summary";
const CONTACT_HEADER: [&str; 4] = ["name", "email", "phone", "source_url"];
const SUMMARY_HEADER: [&str; 2] = ["metric", "value"];
const CONTACT_WIDTHS: [u16; 4] = [28, 34, 20, 48];
const SEP: char = ',';

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SheetFormat {
    /// One workbook with `contacts` and `summary` worksheets
    Xlsx,
    /// `contacts.csv` and `summary.csv` in a directory
    Csv,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    Count(usize),
    Ratio(f64),
}

impl MetricValue {
    fn as_f64(self) -> f64 {
        match self {
            MetricValue::Count(n) => n as f64,
            MetricValue::Ratio(r) => r,
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Count(n) => write!(f, "{}", n),
            MetricValue::Ratio(r) => write!(f, "{:.4}", r),
        }
    }
}

/// Write the report. Xlsx writes one workbook at `out`; csv writes two sheets
/// into the directory `out` names without its extension. Returns the files written.
pub fn write_report(out: &Path, format: SheetFormat, report: &Report) -> Result<Vec<PathBuf>> {
    let written = match format {
        SheetFormat::Xlsx => {
            write_workbook(out, report)?;
            vec![out.to_path_buf()]
        }
        SheetFormat::Csv => {
            let dir = out.with_extension("");
            let (contacts, summary) = write_csv(&dir, report)?;
            vec![contacts, summary]
        }
    };
    info!(
        "Wrote {} contacts to {}",
        report.records.len(),
        written[0].display()
    );
    Ok(written)
}

pub fn write_workbook(path: &Path, report: &Report) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();

    let sheet = workbook.add_worksheet();
    sheet.set_name(CONTACTS_SHEET)?;
    write_header(sheet, &CONTACT_HEADER, &bold)?;
    for (i, row) in contact_rows(report).iter().enumerate() {
        let r = sheet_row(i)?;
        for (col, cell) in (0u16..).zip(row) {
            if !cell.is_empty() {
                sheet.write_string(r, col, cell)?;
            }
        }
    }
    for (col, width) in (0u16..).zip(CONTACT_WIDTHS) {
        sheet.set_column_width(col, width)?;
    }

    let sheet = workbook.add_worksheet();
    sheet.set_name(SUMMARY_SHEET)?;
    write_header(sheet, &SUMMARY_HEADER, &bold)?;
    for (i, (metric, value)) in summary_rows(report).into_iter().enumerate() {
        let r = sheet_row(i)?;
        sheet.write_string(r, 0, metric)?;
        sheet.write_number(r, 1, value.as_f64())?;
    }
    sheet.set_column_width(0, 22)?;

    workbook
        .save(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

fn write_header(sheet: &mut Worksheet, titles: &[&str], bold: &Format) -> Result<()> {
    for (col, title) in (0u16..).zip(titles) {
        sheet.write_string_with_format(0, col, *title, bold)?;
    }
    Ok(())
}

/// Worksheet row for the i-th data row, below the header.
fn sheet_row(i: usize) -> Result<u32> {
    u32::try_from(i + 1).context("Too many rows for one worksheet")
}

/// Write contacts.csv and summary.csv into `dir`. Returns both paths.
pub fn write_csv(dir: &Path, report: &Report) -> Result<(PathBuf, PathBuf)> {
    std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;

    let contacts_path = dir.join(format!("{}.csv", CONTACTS_SHEET));
    write_sheet(&contacts_path, &CONTACT_HEADER, &contact_rows(report))?;

    let summary: Vec<Vec<String>> = summary_rows(report)
        .into_iter()
        .map(|(k, v)| vec![k.to_string(), v.to_string()])
        .collect();
    let summary_path = dir.join(format!("{}.csv", SUMMARY_SHEET));
    write_sheet(&summary_path, &SUMMARY_HEADER, &summary)?;

    Ok((contacts_path, summary_path))
}

fn write_sheet(path: &Path, header: &[&str], rows: &[Vec<String>]) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut w = BufWriter::new(file);
    let header: Vec<String> = header.iter().map(|h| h.to_string()).collect();
    write_row(&mut w, &header, SEP)?;
    for row in rows {
        write_row(&mut w, row, SEP)?;
    }
    w.flush()
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

/// One row per unique record, first-seen order; absent fields are empty cells.
pub fn contact_rows(report: &Report) -> Vec<Vec<String>> {
    report
        .records
        .iter()
        .filter(|r| !r.is_empty())
        .map(|r| {
            vec![
                r.name.clone().unwrap_or_default(),
                r.email.clone().unwrap_or_default(),
                r.phone.clone().unwrap_or_default(),
                r.source.clone(),
            ]
        })
        .collect()
}

pub fn summary_rows(report: &Report) -> Vec<(&'static str, MetricValue)> {
    use MetricValue::{Count, Ratio};

    let stats = &report.stats;
    let emails = distinct(report.records.iter().map(|r| r.email.as_deref()));
    let phones = distinct(report.records.iter().map(|r| r.phone.as_deref()));

    vec![
        ("total_rows", Count(contact_rows(report).len())),
        ("unique_emails", Count(emails)),
        ("unique_phones", Count(phones)),
        ("total_extracted", Count(stats.total_extracted)),
        ("unique_count", Count(stats.unique_count)),
        ("duplicates_removed", Count(stats.duplicates_removed)),
        ("pages_processed", Count(stats.pages_processed)),
        ("pages_failed", Count(stats.pages_failed)),
        ("rejected_candidates", Count(stats.rejected_candidates)),
        ("success_rate", Ratio(stats.success_rate())),
    ]
}

fn distinct<'a>(values: impl Iterator<Item = Option<&'a str>>) -> usize {
    values
        .flatten()
        .filter(|v| !v.is_empty())
        .collect::<HashSet<_>>()
        .len()
}

fn needs_quotes(field: &str, sep: char) -> bool {
    field.contains(sep) || field.contains('"') || field.contains('\n') || field.contains('\r')
}

/// Write one delimited row, quoting cells that need it.
pub fn write_row<W: Write>(mut w: W, row: &[String], sep: char) -> io::Result<()> {
    for (i, cell) in row.iter().enumerate() {
        if i > 0 {
            write!(w, "{}", sep)?;
        }
        if needs_quotes(cell, sep) {
            write!(w, "\"{}\"", cell.replace('"', "\"\""))?;
        } else {
            write!(w, "{}", cell)?;
        }
    }
    writeln!(w)
}

// ── Tests ──
