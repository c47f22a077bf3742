//! Console output and CSV export

use anyhow::Result;
use speedlog_core::{format_latency, MeasurementRecord, ServerSurvey, TIMESTAMP_FORMAT};
use std::io::Write;
use std::path::Path;

const SURVEY_ROWS: usize = 50;

/// Print the outcome of a single run
pub fn print_record(record: &MeasurementRecord) {
    let m = &record.measurement;
    println!("Test #{} at {}", record.id, m.tested_at.format(TIMESTAMP_FORMAT));
    println!("  ISP:       {}", m.isp);
    println!(
        "  Server:    {} ({}, {:.1} km)",
        m.server_name, m.server_country, m.server_distance_km
    );
    println!("  Latency:   {}", format_latency(m.latency_ms));
    println!("  Download:  {:.2} Mbps", m.download_mbps);
    println!("  Upload:    {:.2} Mbps", m.upload_mbps);
}

/// Print stored records as a table, in the order given
pub fn print_records(records: &[MeasurementRecord]) -> Result<()> {
    let stdout = std::io::stdout();
    write_records(&mut stdout.lock(), records)
}

fn write_records<W: Write>(out: &mut W, records: &[MeasurementRecord]) -> Result<()> {
    if records.is_empty() {
        writeln!(out, "No test results stored yet")?;
        return Ok(());
    }

    writeln!(
        out,
        "{:>5}  {:<19}  {:<20}  {:<20}  {:>9}  {:>10}  {:>10}  {:>10}",
        "ID", "Time", "ISP", "Server", "Distance", "Latency", "Download", "Upload"
    )?;
    for record in records {
        let m = &record.measurement;
        writeln!(
            out,
            "{:>5}  {:<19}  {:<20}  {:<20}  {:>6.1} km  {:>10}  {:>10.2}  {:>10.2}",
            record.id,
            m.tested_at.format(TIMESTAMP_FORMAT).to_string(),
            truncate(&m.isp, 20),
            truncate(&m.server_name, 20),
            m.server_distance_km,
            format_latency(m.latency_ms),
            m.download_mbps,
            m.upload_mbps,
        )?;
    }
    writeln!(out, "{} result(s)", records.len())?;
    Ok(())
}

/// Print the identity and the nearest servers with their latency
pub fn print_survey(survey: &ServerSurvey) -> Result<()> {
    let stdout = std::io::stdout();
    write_survey(&mut stdout.lock(), survey)
}

fn write_survey<W: Write>(out: &mut W, survey: &ServerSurvey) -> Result<()> {
    writeln!(out, "Public IP: {}", survey.identity.ip)?;
    writeln!(out, "ISP:       {}", survey.identity.isp)?;
    writeln!(out, "{} server(s) available", survey.total)?;
    writeln!(out)?;
    writeln!(
        out,
        "{:>8}  {:<24}  {:<24}  {:<16}  {:>10}  {:>10}",
        "ID", "Name", "Sponsor", "Country", "Distance", "Latency"
    )?;
    for server in survey.servers.iter().take(SURVEY_ROWS) {
        writeln!(
            out,
            "{:>8}  {:<24}  {:<24}  {:<16}  {:>7.1} km  {:>10}",
            server.id,
            truncate(&server.name, 24),
            truncate(&server.sponsor, 24),
            truncate(&server.country, 16),
            server.distance_km,
            format_latency(server.latency_ms()),
        )?;
    }
    Ok(())
}

fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        s.to_string()
    } else {
        let mut cut: String = s.chars().take(width.saturating_sub(1)).collect();
        cut.push('~');
        cut
    }
}

/// Export records as CSV
pub fn export_csv(records: &[MeasurementRecord], output_path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(output_path)?;

    writer.write_record([
        "id",
        "test_time",
        "isp",
        "server_name",
        "server_country",
        "server_distance_km",
        "latency_ms",
        "download_mbps",
        "upload_mbps",
    ])?;

    for record in records {
        let m = &record.measurement;
        writer.write_record(&[
            record.id.to_string(),
            m.tested_at.format(TIMESTAMP_FORMAT).to_string(),
            m.isp.clone(),
            m.server_name.clone(),
            m.server_country.clone(),
            format!("{:.2}", m.server_distance_km),
            m.latency_ms.map(|v| v.to_string()).unwrap_or_default(),
            format!("{:.2}", m.download_mbps),
            format!("{:.2}", m.upload_mbps),
        ])?;
    }

    writer.flush()?;

    Ok(())
}
