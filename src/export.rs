//! AGP report export (PDF and JSON)
//!
//! Rendering only: every number comes from an [`AgpSummary`]. Percentages
//! are rounded here, never in the statistics engine.

use printpdf::*;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use crate::error::GlucoTrackError;
use crate::reading::Reading;
use crate::stats::{AgpSummary, ControlLabel, HourlyPercentiles};
use crate::units::{GlucoseRange, Thresholds};

/// PDF document dimensions (A4)
const PAGE_WIDTH_MM: f32 = 210.0;
const PAGE_HEIGHT_MM: f32 = 297.0;
const MARGIN_MM: f32 = 20.0;

/// Event rows that fit on the second page
const MAX_EVENT_ROWS: usize = 30;

/// Colors
const COLOR_RED: Color = Color::Rgb(Rgb { r: 0.9, g: 0.3, b: 0.3, icc_profile: None });
const COLOR_DARK_RED: Color = Color::Rgb(Rgb { r: 0.7, g: 0.1, b: 0.1, icc_profile: None });
const COLOR_GREEN: Color = Color::Rgb(Rgb { r: 0.3, g: 0.7, b: 0.3, icc_profile: None });
const COLOR_YELLOW: Color = Color::Rgb(Rgb { r: 0.95, g: 0.75, b: 0.2, icc_profile: None });
const COLOR_ORANGE: Color = Color::Rgb(Rgb { r: 0.9, g: 0.5, b: 0.2, icc_profile: None });
const COLOR_BLACK: Color = Color::Rgb(Rgb { r: 0.0, g: 0.0, b: 0.0, icc_profile: None });
const COLOR_GRAY: Color = Color::Rgb(Rgb { r: 0.5, g: 0.5, b: 0.5, icc_profile: None });
const COLOR_LIGHT_GRAY: Color = Color::Rgb(Rgb { r: 0.9, g: 0.9, b: 0.9, icc_profile: None });
const COLOR_IQR: Color = Color::Rgb(Rgb { r: 0.75, g: 0.75, b: 0.75, icc_profile: None });

const FOOTER_NOTES: &str = "GMI is estimated from mean glucose. CV below 36% indicates stable glucose.";
const DISCLAIMER: &str = "Simulated data for demonstration only. Not for medical use.";

/// Write the AGP report as a two-page PDF
pub fn export_to_pdf<P: AsRef<Path>>(
    path: P,
    summary: &AgpSummary,
    events: &[Reading],
    patient: &str,
    thresholds: Thresholds,
) -> Result<(), GlucoTrackError> {
    let mut doc = PdfDocument::new("GlucoTrack AGP Report");

    let summary_ops = build_summary_page(summary, patient, thresholds);
    let detail_ops = build_detail_page(summary, events);
    doc.with_pages(vec![
        PdfPage::new(Mm(PAGE_WIDTH_MM), Mm(PAGE_HEIGHT_MM), summary_ops),
        PdfPage::new(Mm(PAGE_WIDTH_MM), Mm(PAGE_HEIGHT_MM), detail_ops),
    ]);

    let mut warnings = Vec::new();
    let bytes = doc.save(&PdfSaveOptions::default(), &mut warnings);

    let mut file = File::create(path.as_ref())
        .map_err(|e| GlucoTrackError::Export(format!("Failed to create file: {}", e)))?;
    file.write_all(&bytes)
        .map_err(|e| GlucoTrackError::Export(format!("Failed to write PDF: {}", e)))?;

    Ok(())
}

/// Write the summary as pretty JSON for other renderers
pub fn export_to_json<P: AsRef<Path>>(path: P, summary: &AgpSummary) -> Result<(), GlucoTrackError> {
    let json = serde_json::to_string_pretty(summary)?;
    fs::write(path, json)?;
    Ok(())
}

/// Plain-text summary for the terminal
pub fn summary_text(summary: &AgpSummary) -> String {
    let mut out = String::new();
    out.push_str(&format!("Report period:   {} - {}\n", format_date(summary.period_start), format_date(summary.period_end)));
    out.push_str(&format!("Readings:        {}\n", summary.reading_count));
    out.push_str(&format!("Overall control: {}\n", summary.control));
    out.push_str(&format!("Average glucose: {:.0} mg/dL\n", summary.average));
    out.push_str(&format!("GMI:             {:.1}%\n", summary.gmi));
    out.push_str(&format!("Variability CV:  {:.1}%\n", summary.cv));
    out.push_str("Time in ranges:\n");
    for (range, pct) in bands(summary) {
        out.push_str(&format!("  {:<28} {:>3}%\n", range.label(), pct as i32));
    }
    out.push_str("Hourly profile (median [p25-p75]):\n");
    for h in &summary.hourly_profile {
        out.push_str(&format!(
            "  {:02}:00  {:>3.0} [{:.0}-{:.0}]  n={}\n",
            h.hour, h.median, h.p25, h.p75, h.count
        ));
    }
    out
}

fn format_date(ts: chrono::DateTime<chrono::Utc>) -> String {
    ts.with_timezone(&chrono::Local).format("%b %-d, %Y").to_string()
}

/// Bands from highest to lowest with their percentage
fn bands(summary: &AgpSummary) -> [(GlucoseRange, f64); 5] {
    [
        (GlucoseRange::VeryHigh, summary.time_very_high_pct),
        (GlucoseRange::High, summary.time_high_pct),
        (GlucoseRange::InRange, summary.time_in_range_pct),
        (GlucoseRange::Low, summary.time_low_pct),
        (GlucoseRange::VeryLow, summary.time_very_low_pct),
    ]
}

fn range_color(range: GlucoseRange) -> Color {
    match range {
        GlucoseRange::VeryHigh => COLOR_ORANGE,
        GlucoseRange::High => COLOR_YELLOW,
        GlucoseRange::InRange => COLOR_GREEN,
        GlucoseRange::Low => COLOR_RED,
        GlucoseRange::VeryLow => COLOR_DARK_RED,
    }
}

fn control_color(control: ControlLabel) -> Color {
    match control {
        ControlLabel::Excellent | ControlLabel::Good => COLOR_GREEN,
        ControlLabel::NeedsImprovement => COLOR_ORANGE,
    }
}

// Helper to create text operations
fn text_ops(text: &str, size: f32, x: f32, y: f32, font: BuiltinFont, color: Color) -> Vec<Op> {
    vec![
        Op::SetFillColor { col: color },
        Op::StartTextSection,
        Op::SetFontSizeBuiltinFont { size: Pt(size), font },
        Op::SetTextCursor { pos: Point::new(Mm(x), Mm(y)) },
        Op::WriteTextBuiltinFont {
            items: vec![TextItem::Text(text.to_string())],
            font,
        },
        Op::EndTextSection,
    ]
}

fn line_ops(x1: f32, y1: f32, x2: f32, y2: f32, color: Color, width: f32) -> Vec<Op> {
    vec![
        Op::SetOutlineColor { col: color },
        Op::SetOutlineThickness { pt: Pt(width) },
        Op::DrawLine {
            line: Line {
                points: vec![
                    LinePoint { p: Point::new(Mm(x1), Mm(y1)), bezier: false },
                    LinePoint { p: Point::new(Mm(x2), Mm(y2)), bezier: false },
                ],
                is_closed: false,
            },
        },
    ]
}

fn rect_points(x: f32, y: f32, width: f32, height: f32) -> Vec<LinePoint> {
    vec![
        LinePoint { p: Point::new(Mm(x), Mm(y)), bezier: false },
        LinePoint { p: Point::new(Mm(x + width), Mm(y)), bezier: false },
        LinePoint { p: Point::new(Mm(x + width), Mm(y + height)), bezier: false },
        LinePoint { p: Point::new(Mm(x), Mm(y + height)), bezier: false },
    ]
}

fn rect_fill_ops(x: f32, y: f32, width: f32, height: f32, color: Color) -> Vec<Op> {
    vec![
        Op::SetFillColor { col: color },
        Op::DrawPolygon {
            polygon: Polygon {
                rings: vec![PolygonRing { points: rect_points(x, y, width, height) }],
                mode: PaintMode::Fill,
                winding_order: WindingOrder::NonZero,
            },
        },
    ]
}

fn rect_stroke_ops(x: f32, y: f32, width: f32, height: f32, color: Color, stroke_width: f32) -> Vec<Op> {
    vec![
        Op::SetOutlineColor { col: color },
        Op::SetOutlineThickness { pt: Pt(stroke_width) },
        Op::DrawPolygon {
            polygon: Polygon {
                rings: vec![PolygonRing { points: rect_points(x, y, width, height) }],
                mode: PaintMode::Stroke,
                winding_order: WindingOrder::NonZero,
            },
        },
    ]
}

fn bar_ops(x: f32, y: f32, width: f32, height: f32, fill_pct: f32, fill_color: Color) -> Vec<Op> {
    let mut ops = Vec::new();
    ops.extend(rect_fill_ops(x, y, width, height, COLOR_LIGHT_GRAY));
    if fill_pct > 0.0 {
        ops.extend(rect_fill_ops(x, y, width * fill_pct.min(1.0), height, fill_color));
    }
    ops.extend(rect_stroke_ops(x, y, width, height, COLOR_GRAY, 0.3));
    ops
}

fn build_summary_page(summary: &AgpSummary, patient: &str, thresholds: Thresholds) -> Vec<Op> {
    let mut ops = Vec::new();
    let mut y = PAGE_HEIGHT_MM - MARGIN_MM;

    // Header
    ops.extend(text_ops("Ambulatory Glucose Profile (AGP)", 20.0, MARGIN_MM, y, BuiltinFont::HelveticaBold, COLOR_BLACK));
    y -= 10.0;
    ops.extend(text_ops(&format!("Patient: {}", patient), 11.0, MARGIN_MM, y, BuiltinFont::Helvetica, COLOR_BLACK));
    y -= 6.0;
    let period = format!(
        "Report Period: {} - {}",
        format_date(summary.period_start),
        format_date(summary.period_end)
    );
    ops.extend(text_ops(&period, 11.0, MARGIN_MM, y, BuiltinFont::Helvetica, COLOR_BLACK));
    y -= 6.0;
    let generated = chrono::Local::now().format("%Y-%m-%d %H:%M").to_string();
    ops.extend(text_ops(&format!("Generated: {}", generated), 9.0, MARGIN_MM, y, BuiltinFont::Helvetica, COLOR_GRAY));
    y -= 8.0;
    ops.extend(line_ops(MARGIN_MM, y, PAGE_WIDTH_MM - MARGIN_MM, y, COLOR_GRAY, 0.5));
    y -= 12.0;

    // Control label and key metrics
    ops.extend(text_ops(
        &format!("Overall Control: {}", summary.control),
        14.0,
        MARGIN_MM,
        y,
        BuiltinFont::HelveticaBold,
        control_color(summary.control),
    ));
    y -= 10.0;

    let metrics = [
        ("Average Glucose", format!("{} mg/dL", summary.average as i32)),
        ("Glucose Management Indicator (GMI)", format!("{:.1}%", summary.gmi)),
        ("Glucose Variability (CV)", format!("{:.1}%", summary.cv)),
        ("Readings", format!("{}", summary.reading_count)),
    ];
    for (label, value) in metrics.iter() {
        ops.extend(text_ops(label, 10.0, MARGIN_MM + 5.0, y, BuiltinFont::Helvetica, COLOR_BLACK));
        ops.extend(text_ops(value, 10.0, MARGIN_MM + 95.0, y, BuiltinFont::HelveticaBold, COLOR_BLACK));
        y -= 6.0;
    }
    y -= 6.0;

    // Time in ranges
    ops.extend(text_ops("Time in Ranges", 14.0, MARGIN_MM, y, BuiltinFont::HelveticaBold, COLOR_BLACK));
    y -= 10.0;

    let label_width = 60.0;
    let bar_width = 75.0;
    let bar_x = MARGIN_MM + label_width;
    for (range, pct) in bands(summary) {
        ops.extend(text_ops(range.label(), 9.0, MARGIN_MM, y - 2.0, BuiltinFont::Helvetica, COLOR_BLACK));
        ops.extend(bar_ops(bar_x, y - 4.0, bar_width, 7.0, (pct / 100.0) as f32, range_color(range)));
        ops.extend(text_ops(&format!("{}%", pct as i32), 9.0, bar_x + bar_width + 3.0, y - 2.0, BuiltinFont::Helvetica, COLOR_BLACK));
        y -= 10.0;
    }
    y -= 8.0;

    // 24-hour profile
    ops.extend(text_ops("24-Hour Glucose Profile", 14.0, MARGIN_MM, y, BuiltinFont::HelveticaBold, COLOR_BLACK));
    y -= 8.0;
    ops.extend(build_profile_chart(&summary.hourly_profile, y, thresholds));

    ops.extend(text_ops(DISCLAIMER, 8.0, MARGIN_MM, MARGIN_MM, BuiltinFont::Helvetica, COLOR_GRAY));
    ops
}

/// Median line over an IQR band per hour, 40-400 mg/dL scale
fn build_profile_chart(profile: &[HourlyPercentiles], top: f32, thresholds: Thresholds) -> Vec<Op> {
    let mut ops = Vec::new();

    let chart_x = MARGIN_MM + 12.0;
    let chart_height = 70.0;
    let chart_y = top - chart_height;
    let chart_width = PAGE_WIDTH_MM - 2.0 * MARGIN_MM - 12.0;

    ops.extend(rect_fill_ops(chart_x, chart_y, chart_width, chart_height, COLOR_LIGHT_GRAY));
    ops.extend(rect_stroke_ops(chart_x, chart_y, chart_width, chart_height, COLOR_BLACK, 0.5));

    let y_min = 40.0_f32;
    let y_max = 400.0_f32;
    let to_y = |v: f64| chart_y + ((v as f32 - y_min) / (y_max - y_min)) * chart_height;
    let hour_x = |hour: u8| chart_x + (hour as f32 + 0.5) * (chart_width / 24.0);

    for val in [70, 180, 250, 350] {
        let label_y = to_y(val as f64);
        ops.extend(text_ops(&format!("{}", val), 6.0, MARGIN_MM, label_y - 1.5, BuiltinFont::Helvetica, COLOR_GRAY));
    }
    let low_y = to_y(thresholds.low as f64);
    let high_y = to_y(thresholds.high as f64);
    ops.extend(line_ops(chart_x, low_y, chart_x + chart_width, low_y, COLOR_RED, 0.6));
    ops.extend(line_ops(chart_x, high_y, chart_x + chart_width, high_y, COLOR_ORANGE, 0.6));

    // interquartile boxes
    let box_width = chart_width / 24.0 * 0.7;
    for h in profile {
        let x = hour_x(h.hour) - box_width / 2.0;
        let p25_y = to_y(h.p25);
        let height = (to_y(h.p75) - p25_y).max(0.5);
        ops.extend(rect_fill_ops(x, p25_y, box_width, height, COLOR_IQR));
    }

    // median line through consecutive hours with data
    for pair in profile.windows(2) {
        ops.extend(line_ops(hour_x(pair[0].hour), to_y(pair[0].median), hour_x(pair[1].hour), to_y(pair[1].median), COLOR_BLACK, 1.0));
    }
    if let [only] = profile {
        let x = hour_x(only.hour);
        ops.extend(line_ops(x - box_width / 2.0, to_y(only.median), x + box_width / 2.0, to_y(only.median), COLOR_BLACK, 1.0));
    }

    for hour in (0..24).step_by(4) {
        let label_x = hour_x(hour) - 3.0;
        ops.extend(text_ops(&format!("{}:00", hour), 6.0, label_x, chart_y - 5.0, BuiltinFont::Helvetica, COLOR_BLACK));
    }

    ops
}

fn build_detail_page(summary: &AgpSummary, events: &[Reading]) -> Vec<Op> {
    let mut ops = Vec::new();
    let mut y = PAGE_HEIGHT_MM - MARGIN_MM;

    ops.extend(text_ops("Time in Ranges", 16.0, MARGIN_MM, y, BuiltinFont::HelveticaBold, COLOR_BLACK));
    y -= 10.0;

    let col_x = [MARGIN_MM, MARGIN_MM + 90.0, MARGIN_MM + 125.0];
    ops.extend(text_ops("Range", 9.0, col_x[0], y, BuiltinFont::HelveticaBold, COLOR_BLACK));
    ops.extend(text_ops("Percentage", 9.0, col_x[1], y, BuiltinFont::HelveticaBold, COLOR_BLACK));
    ops.extend(text_ops("Status", 9.0, col_x[2], y, BuiltinFont::HelveticaBold, COLOR_BLACK));
    y -= 3.0;
    ops.extend(line_ops(MARGIN_MM, y, PAGE_WIDTH_MM - MARGIN_MM, y, COLOR_GRAY, 0.3));
    y -= 6.0;

    for (range, pct) in bands(summary) {
        ops.extend(text_ops(range.label(), 9.0, col_x[0], y, BuiltinFont::Helvetica, COLOR_BLACK));
        ops.extend(text_ops(&format!("{}%", pct as i32), 9.0, col_x[1], y, BuiltinFont::Helvetica, COLOR_BLACK));
        ops.extend(text_ops(range.status(), 9.0, col_x[2], y, BuiltinFont::HelveticaBold, range_color(range)));
        y -= 6.0;
    }
    y -= 10.0;

    ops.extend(text_ops("Hourly Percentiles", 14.0, MARGIN_MM, y, BuiltinFont::HelveticaBold, COLOR_BLACK));
    y -= 8.0;
    let hour_cols = [MARGIN_MM, MARGIN_MM + 20.0, MARGIN_MM + 40.0, MARGIN_MM + 60.0, MARGIN_MM + 80.0];
    for (i, title) in ["Hour", "n", "p25", "Median", "p75"].iter().enumerate() {
        ops.extend(text_ops(title, 8.0, hour_cols[i], y, BuiltinFont::HelveticaBold, COLOR_BLACK));
    }
    y -= 5.0;
    for h in &summary.hourly_profile {
        let cells = [
            format!("{:02}:00", h.hour),
            h.count.to_string(),
            format!("{:.0}", h.p25),
            format!("{:.0}", h.median),
            format!("{:.0}", h.p75),
        ];
        for (i, cell) in cells.iter().enumerate() {
            ops.extend(text_ops(cell, 7.0, hour_cols[i], y, BuiltinFont::Helvetica, COLOR_BLACK));
        }
        y -= 4.0;
    }
    y -= 8.0;

    // Logged events, newest first
    ops.extend(text_ops("Logged Events", 14.0, MARGIN_MM, y, BuiltinFont::HelveticaBold, COLOR_BLACK));
    y -= 8.0;
    let tagged: Vec<&Reading> = events.iter().filter(|r| r.event.is_some()).collect();
    if tagged.is_empty() {
        ops.extend(text_ops("No events logged", 9.0, MARGIN_MM, y, BuiltinFont::Helvetica, COLOR_GRAY));
    }
    for reading in tagged.iter().take(MAX_EVENT_ROWS) {
        if y < MARGIN_MM + 20.0 {
            break;
        }
        let when = reading.timestamp.with_timezone(&chrono::Local).format("%b %-d, %-I:%M %p").to_string();
        let event = reading.event.map(|e| e.as_str()).unwrap_or("");
        ops.extend(text_ops(&when, 8.0, MARGIN_MM, y, BuiltinFont::Helvetica, COLOR_BLACK));
        ops.extend(text_ops(event, 8.0, MARGIN_MM + 45.0, y, BuiltinFont::Helvetica, COLOR_BLACK));
        ops.extend(text_ops(&format!("{} mg/dL", reading.value as i32), 8.0, MARGIN_MM + 75.0, y, BuiltinFont::Helvetica, COLOR_BLACK));
        y -= 4.5;
    }

    ops.extend(text_ops(FOOTER_NOTES, 8.0, MARGIN_MM, MARGIN_MM + 6.0, BuiltinFont::Helvetica, COLOR_GRAY));
    ops.extend(text_ops(DISCLAIMER, 8.0, MARGIN_MM, MARGIN_MM, BuiltinFont::Helvetica, COLOR_GRAY));
    ops
}
