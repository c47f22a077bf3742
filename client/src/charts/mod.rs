//! PNG trend chart export

use anyhow::Result;
use plotters::prelude::*;
use speedlog_core::TrendSeries;
use std::path::Path;

/// Render throughput (upper panel) and latency (lower panel) for a trend
pub fn generate_trend_chart(
    series: &TrendSeries,
    output_path: &Path,
    width: u32,
    height: u32,
) -> Result<()> {
    if series.is_empty() {
        anyhow::bail!("No measurements to chart");
    }

    let points = series.len() as i32;
    let labels = &series.labels;
    let label_at = |x: &i32| -> String {
        usize::try_from(*x)
            .ok()
            .and_then(|i| labels.get(i))
            .cloned()
            .unwrap_or_default()
    };

    let root = BitMapBackend::new(output_path, (width, height)).into_drawing_area();
    root.fill(&WHITE)?;
    let (upper, lower) = root.split_vertically(height * 2 / 3);

    let speed_max = series
        .download_data
        .iter()
        .chain(series.upload_data.iter())
        .copied()
        .fold(0.0_f64, f64::max);
    let speed_top = (speed_max * 1.1).max(1.0);

    let caption = if series.server_name.is_empty() {
        "Speed Test Trend".to_string()
    } else {
        format!(
            "Speed Test Trend ({}, {}, {:.1} km)",
            series.isp, series.server_name, series.distance
        )
    };

    let mut chart = ChartBuilder::on(&upper)
        .caption(caption, ("sans-serif", 32).into_font())
        .margin(15)
        .x_label_area_size(40)
        .y_label_area_size(80)
        .build_cartesian_2d(0..points.max(2) - 1, 0.0..speed_top)?;

    chart
        .configure_mesh()
        .x_label_formatter(&label_at)
        .y_desc("Speed (Mbps)")
        .label_style(("sans-serif", 16))
        .axis_desc_style(("sans-serif", 20))
        .draw()?;

    chart
        .draw_series(LineSeries::new(
            series.download_data.iter().enumerate().map(|(i, v)| (i as i32, *v)),
            BLUE.stroke_width(3),
        ))?
        .label("Download")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], BLUE.stroke_width(3)));

    chart
        .draw_series(LineSeries::new(
            series.upload_data.iter().enumerate().map(|(i, v)| (i as i32, *v)),
            GREEN.stroke_width(3),
        ))?
        .label("Upload")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], GREEN.stroke_width(3)));

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .label_font(("sans-serif", 16))
        .draw()?;

    let latency_max = series
        .latency_data
        .iter()
        .flatten()
        .copied()
        .max()
        .unwrap_or(0) as f64;

    let mut latency_chart = ChartBuilder::on(&lower)
        .margin(15)
        .x_label_area_size(40)
        .y_label_area_size(80)
        .build_cartesian_2d(0..points.max(2) - 1, 0.0..(latency_max * 1.1).max(1.0))?;

    latency_chart
        .configure_mesh()
        .x_label_formatter(&label_at)
        .y_desc("Latency (ms)")
        .x_desc("Time")
        .label_style(("sans-serif", 16))
        .axis_desc_style(("sans-serif", 20))
        .draw()?;

    // Unmeasured latency leaves a gap
    latency_chart.draw_series(
        series
            .latency_data
            .iter()
            .enumerate()
            .filter_map(|(i, v)| v.map(|ms| (i as i32, ms as f64)))
            .map(|point| Circle::new(point, 4, RED.filled())),
    )?;

    root.present()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_series_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.png");
        assert!(generate_trend_chart(&TrendSeries::default(), &path, 800, 600).is_err());
        assert!(!path.exists());
    }
}
