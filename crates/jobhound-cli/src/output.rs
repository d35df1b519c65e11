use std::io::Write;

use anyhow::Result;
use clap::ValueEnum;
use jobhound_core::models::{Posting, RunStats};
use jobhound_db::{PostingStats, StoredPosting};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable summary and listing
    Summary,
    /// Pretty-printed JSON array
    Json,
    /// CSV with a header row
    Csv,
}

/// Flat row shared by scraped and stored postings.
#[derive(Serialize)]
pub struct CsvRow<'a> {
    fingerprint: &'a str,
    title: &'a str,
    company: &'a str,
    location: &'a str,
    salary: Option<&'a str>,
    remote: bool,
    employment_type: &'a str,
    source: &'a str,
    url: &'a str,
    posted_at: Option<String>,
    scraped_at: String,
}

impl<'a> From<&'a Posting> for CsvRow<'a> {
    fn from(p: &'a Posting) -> Self {
        CsvRow {
            fingerprint: p.fingerprint(),
            title: &p.title,
            company: &p.company,
            location: &p.location,
            salary: p.salary.as_deref(),
            remote: p.remote,
            employment_type: p.employment_type.as_str(),
            source: &p.source,
            url: &p.url,
            posted_at: p.posted_at.map(|t| t.to_rfc3339()),
            scraped_at: p.scraped_at.to_rfc3339(),
        }
    }
}

impl<'a> From<&'a StoredPosting> for CsvRow<'a> {
    fn from(p: &'a StoredPosting) -> Self {
        CsvRow {
            fingerprint: &p.fingerprint,
            title: &p.title,
            company: &p.company,
            location: &p.location,
            salary: p.salary.as_deref(),
            remote: p.remote,
            employment_type: p.employment_type.as_str(),
            source: &p.source,
            url: &p.url,
            posted_at: p.posted_at.map(|t| t.to_rfc3339()),
            scraped_at: p.scraped_at.to_rfc3339(),
        }
    }
}

pub fn write_csv<'a, T, W>(rows: &'a [T], writer: W) -> Result<()>
where
    &'a T: Into<CsvRow<'a>>,
    W: Write,
{
    let mut csv = csv::Writer::from_writer(writer);
    for row in rows {
        let record: CsvRow<'a> = row.into();
        csv.serialize(record)?;
    }
    csv.flush()?;
    Ok(())
}

pub fn write_json<T: Serialize, W: Write>(value: &T, mut writer: W) -> Result<()> {
    serde_json::to_writer_pretty(&mut writer, value)?;
    writeln!(writer)?;
    Ok(())
}

pub fn write_run_summary<W: Write>(
    stats: &RunStats,
    unique: usize,
    errors: &[String],
    mut out: W,
) -> Result<()> {
    writeln!(out, "Jobs scraped:   {}", stats.jobs_scraped)?;
    writeln!(out, "Unique jobs:    {unique}")?;
    writeln!(out, "Errors:         {}", stats.errors)?;
    match stats.duration() {
        Some(d) => writeln!(out, "Duration:       {:.2}s", d.as_secs_f64())?,
        None => writeln!(out, "Duration:       n/a")?,
    }
    match stats.jobs_per_second() {
        Some(rate) => writeln!(out, "Jobs/second:    {rate:.2}")?,
        None => writeln!(out, "Jobs/second:    n/a")?,
    }
    for error in errors {
        writeln!(out, "  ! {error}")?;
    }
    Ok(())
}

pub fn write_listing<W: Write>(postings: &[Posting], mut out: W) -> Result<()> {
    for p in postings {
        writeln!(
            out,
            "[{}] {} at {} ({}){}",
            p.source,
            p.title,
            p.company,
            p.location,
            p.salary
                .as_deref()
                .map(|s| format!(" {s}"))
                .unwrap_or_default()
        )?;
    }
    Ok(())
}

pub fn write_stored_listing<W: Write>(postings: &[StoredPosting], mut out: W) -> Result<()> {
    if postings.is_empty() {
        writeln!(out, "No postings found")?;
        return Ok(());
    }
    for p in postings {
        writeln!(
            out,
            "  {} [{}] {} at {} ({}) {}",
            p.scraped_at.format("%Y-%m-%d %H:%M"),
            p.source,
            p.title,
            p.company,
            p.location,
            p.url,
        )?;
    }
    writeln!(out, "\nTotal: {} postings", postings.len())?;
    Ok(())
}

pub fn write_posting_stats<W: Write>(stats: &PostingStats, mut out: W) -> Result<()> {
    writeln!(out, "Total postings: {}", stats.total)?;
    writeln!(out, "Remote:         {}", stats.remote)?;
    writeln!(out, "Posted today:   {}", stats.posted_today)?;
    match stats.last_scraped_at {
        Some(at) => writeln!(out, "Last scraped:   {}", at.format("%Y-%m-%d %H:%M"))?,
        None => writeln!(out, "Last scraped:   never")?,
    }

    writeln!(out, "\nBy source:")?;
    for (source, count) in &stats.by_source {
        writeln!(out, "  {source:<16} {count}")?;
    }
    writeln!(out, "\nBy employment type:")?;
    for (kind, count) in &stats.by_employment_type {
        writeln!(out, "  {kind:<16} {count}")?;
    }
    writeln!(out, "\nTop companies:")?;
    for entry in &stats.top_companies {
        writeln!(out, "  {:<24} {}", entry.name, entry.count)?;
    }
    writeln!(out, "\nTop locations:")?;
    for entry in &stats.top_locations {
        writeln!(out, "  {:<24} {}", entry.name, entry.count)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use jobhound_core::testutil::make_raw_posting;
    use jobhound_db::NameCount;

    use super::*;

    fn postings() -> Vec<Posting> {
        let scraped_at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let mut raw = make_raw_posting("indeed", "Rust Engineer", "Ferrous, GmbH", "Berlin");
        raw.salary = Some("$150k - $200k".into());
        vec![
            Posting::from_raw(raw, scraped_at),
            Posting::from_raw(make_raw_posting("linkedin", "SRE", "Acme", "Remote"), scraped_at),
        ]
    }

    #[test]
    fn csv_has_header_and_quotes_commas() {
        let mut buf = Vec::new();
        write_csv(&postings(), &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("fingerprint,title,company,location,salary"));
        assert!(lines[1].contains("\"Ferrous, GmbH\""));
        assert!(lines[1].contains("full_time"));
        assert!(lines[2].contains(",,"), "missing salary is an empty field");
    }

    #[test]
    fn json_output_includes_fingerprint() {
        let mut buf = Vec::new();
        write_json(&postings(), &mut buf).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&buf).unwrap();

        assert_eq!(value.as_array().unwrap().len(), 2);
        assert_eq!(value[0]["fingerprint"].as_str().unwrap().len(), 64);
        assert_eq!(value[1]["employment_type"], "full_time");
    }

    #[test]
    fn summary_reports_counts_and_rate() {
        let stats = RunStats {
            jobs_scraped: 10,
            errors: 1,
            started_at: Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()),
            finished_at: Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 2).unwrap()),
        };
        let mut buf = Vec::new();
        write_run_summary(&stats, 9, &["linkedin scraper failed: boom".into()], &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();

        assert!(text.contains("Jobs scraped:   10"));
        assert!(text.contains("Unique jobs:    9"));
        assert!(text.contains("Duration:       2.00s"));
        assert!(text.contains("Jobs/second:    5.00"));
        assert!(text.contains("! linkedin scraper failed: boom"));
    }

    #[test]
    fn posting_stats_table_lists_breakdowns() {
        let stats = PostingStats {
            total: 3,
            by_source: [("indeed".to_string(), 2), ("linkedin".to_string(), 1)].into(),
            by_employment_type: [("full_time".to_string(), 3)].into(),
            remote: 2,
            posted_today: 1,
            last_scraped_at: Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap()),
            top_companies: vec![NameCount {
                name: "Acme".into(),
                count: 2,
            }],
            top_locations: vec![],
        };
        let mut buf = Vec::new();
        write_posting_stats(&stats, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();

        assert!(text.contains("Total postings: 3"));
        assert!(text.contains("Last scraped:   2024-05-01 12:30"));
        assert!(text.contains("  indeed           2"));
        assert!(text.contains("  full_time        3"));
        assert!(text.contains("  Acme"));
    }
}
