//! Report artifact rendering: prediction CSV and a plain-text PDF.

use chrono::Utc;

use super::aggregator::{aggregate, AggregateSummary};
use super::error::{ServiceError, ServiceResult};
use crate::api::{PredictionResult, ReportFormat, ReportSummary};

/// Fixed column set of the prediction CSV export.
pub const CSV_COLUMNS: [&str; 8] = [
    "id",
    "sampleId",
    "hmpiScore",
    "riskCategory",
    "latitude",
    "longitude",
    "date",
    "createdAt",
];

/// Serialize predictions to CSV, one row per prediction in input order.
///
/// Scores are written with two decimals.
pub fn predictions_to_csv(predictions: &[PredictionResult]) -> ServiceResult<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(CSV_COLUMNS).map_err(csv_error)?;
    for p in predictions {
        writer
            .write_record([
                p.id.to_string(),
                p.sample_id.to_string(),
                format!("{:.2}", p.hmpi_score),
                p.risk_category.to_string(),
                p.location.latitude.to_string(),
                p.location.longitude.to_string(),
                p.date.to_rfc3339(),
                p.created_at.to_rfc3339(),
            ])
            .map_err(csv_error)?;
    }
    writer
        .into_inner()
        .map_err(|e| ServiceError::Internal(format!("CSV flush failed: {}", e)))
}

fn csv_error(err: csv::Error) -> ServiceError {
    ServiceError::Internal(format!("CSV write failed: {}", err))
}

/// Render the artifact for `report` over the selected predictions.
pub fn render_report(
    report: &ReportSummary,
    predictions: &[PredictionResult],
) -> ServiceResult<Vec<u8>> {
    match report.format {
        ReportFormat::Excel => predictions_to_csv(predictions),
        ReportFormat::Pdf => {
            let summary = aggregate(predictions);
            Ok(PdfDocument::from_lines(&report_lines(report, &summary, predictions)).to_bytes())
        }
    }
}

const MAX_MAP_POINTS: usize = 25;

fn report_lines(
    report: &ReportSummary,
    summary: &AggregateSummary,
    predictions: &[PredictionResult],
) -> Vec<String> {
    let config = &report.config;
    let mut lines = vec![config.title.clone()];
    if let Some(description) = &config.description {
        lines.push(description.clone());
    }
    lines.push(format!("Generated: {}", Utc::now().format("%Y-%m-%d %H:%M UTC")));
    lines.push(format!(
        "Date range: {} to {}",
        config.date_range.start_date, config.date_range.end_date
    ));
    if let Some(location) = &config.location {
        lines.push(format!(
            "Location: {:.4}, {:.4} (radius {} km)",
            location.latitude, location.longitude, location.radius
        ));
    }
    lines.push(String::new());

    lines.push("Summary".to_string());
    lines.push(format!("Total samples: {}", summary.total));
    lines.push(format!("Average HMPI: {:.2}", summary.average_hmpi));
    for share in &summary.categories {
        lines.push(format!(
            "  {}: {} ({:.1}%)",
            share.category, share.count, share.percentage
        ));
    }

    if config.include_charts {
        lines.push(String::new());
        lines.push("HMPI distribution".to_string());
        for bin in &summary.histogram {
            lines.push(format!("  {:>9}: {} ({:.1}%)", bin.range, bin.count, bin.percentage));
        }
        lines.push(String::new());
        lines.push("Metal concentrations (mg/L)".to_string());
        for metal in &summary.metals {
            lines.push(format!(
                "  {}: avg {:.4}, min {:.4}, max {:.4}",
                metal.metal, metal.average, metal.min, metal.max
            ));
        }
    }

    if config.include_map {
        lines.push(String::new());
        lines.push("Sample locations".to_string());
        for p in predictions.iter().take(MAX_MAP_POINTS) {
            lines.push(format!(
                "  {:.4}, {:.4}  {}",
                p.location.latitude, p.location.longitude, p.risk_category
            ));
        }
        if predictions.len() > MAX_MAP_POINTS {
            lines.push(format!("  ... {} more", predictions.len() - MAX_MAP_POINTS));
        }
    }

    if config.include_raw_data {
        lines.push(String::new());
        lines.push("Raw data".to_string());
        lines.push("  Date        Latitude   Longitude  HMPI      Category".to_string());
        for p in predictions {
            lines.push(format!(
                "  {}  {:>9.4}  {:>9.4}  {:>8.2}  {}",
                p.date.format("%Y-%m-%d"),
                p.location.latitude,
                p.location.longitude,
                p.hmpi_score,
                p.risk_category
            ));
        }
    }

    lines
}

const LINES_PER_PAGE: usize = 48;
const PAGE_WIDTH: u32 = 612;
const PAGE_HEIGHT: u32 = 792;
const FONT_SIZE: u32 = 10;
const LEADING: u32 = 14;
const MARGIN: u32 = 56;

/// Minimal PDF 1.4 writer: monospaced text lines, Helvetica, letter pages.
#[derive(Debug, Clone)]
pub struct PdfDocument {
    pages: Vec<Vec<String>>,
}

impl PdfDocument {
    pub fn from_lines(lines: &[String]) -> Self {
        let mut pages: Vec<Vec<String>> = lines
            .chunks(LINES_PER_PAGE)
            .map(|chunk| chunk.to_vec())
            .collect();
        if pages.is_empty() {
            pages.push(Vec::new());
        }
        Self { pages }
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        // Object layout: 1 catalog, 2 page tree, 3 font, then page/content pairs.
        let page_ids: Vec<usize> = (0..self.pages.len()).map(|i| 4 + i * 2).collect();
        let mut objects: Vec<String> = Vec::with_capacity(3 + self.pages.len() * 2);

        objects.push("<< /Type /Catalog /Pages 2 0 R >>".to_string());
        let kids = page_ids
            .iter()
            .map(|id| format!("{} 0 R", id))
            .collect::<Vec<_>>()
            .join(" ");
        objects.push(format!(
            "<< /Type /Pages /Kids [{}] /Count {} >>",
            kids,
            page_ids.len()
        ));
        objects.push("<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string());

        for (page, id) in self.pages.iter().zip(&page_ids) {
            objects.push(format!(
                "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {} {}] \
                 /Resources << /Font << /F1 3 0 R >> >> /Contents {} 0 R >>",
                PAGE_WIDTH,
                PAGE_HEIGHT,
                id + 1
            ));
            let stream = content_stream(page);
            objects.push(format!(
                "<< /Length {} >>\nstream\n{}\nendstream",
                stream.len(),
                stream
            ));
        }

        let mut out = String::from("%PDF-1.4\n");
        let mut offsets = Vec::with_capacity(objects.len());
        for (i, body) in objects.iter().enumerate() {
            offsets.push(out.len());
            out.push_str(&format!("{} 0 obj\n{}\nendobj\n", i + 1, body));
        }
        let xref_at = out.len();
        out.push_str(&format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1));
        for offset in offsets {
            out.push_str(&format!("{:010} 00000 n \n", offset));
        }
        out.push_str(&format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref_at
        ));
        out.into_bytes()
    }
}

fn content_stream(lines: &[String]) -> String {
    let mut stream = format!(
        "BT\n/F1 {} Tf\n{} TL\n{} {} Td\n",
        FONT_SIZE,
        LEADING,
        MARGIN,
        PAGE_HEIGHT - MARGIN
    );
    for line in lines {
        stream.push_str(&format!("({}) Tj T*\n", escape_text(line)));
    }
    stream.push_str("ET");
    stream
}

/// Escape a line for a PDF literal string. Non-ASCII becomes `?`.
fn escape_text(line: &str) -> String {
    let mut escaped = String::with_capacity(line.len());
    for c in line.chars() {
        match c {
            '(' | ')' | '\\' => {
                escaped.push('\\');
                escaped.push(c);
            }
            c if c.is_ascii() && !c.is_ascii_control() => escaped.push(c),
            _ => escaped.push('?'),
        }
    }
    escaped
}

/// MIME type and file name of a rendered report.
pub fn artifact_headers(report: &ReportSummary) -> (&'static str, String) {
    (report.format.content_type(), report.file_name())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{DateRange, OwnerId, ReportConfig, Sample, SampleId};
    use std::collections::BTreeMap;

    fn prediction(score: f64) -> PredictionResult {
        let sample = Sample {
            id: SampleId::new(),
            latitude: 12.5,
            longitude: -3.25,
            date: Utc::now(),
            metal_concentrations: BTreeMap::from([("lead".to_string(), score)]),
        };
        PredictionResult::from_sample(&sample, score, None)
    }

    fn report(format: ReportFormat) -> ReportSummary {
        ReportSummary::pending(
            OwnerId::new("alice"),
            ReportConfig {
                title: "Quarterly (draft)".to_string(),
                description: None,
                date_range: DateRange {
                    start_date: "2024-01-01".to_string(),
                    end_date: "2024-03-31".to_string(),
                },
                location: None,
                include_charts: true,
                include_map: true,
                include_raw_data: true,
                format,
                prediction_ids: None,
            },
        )
    }

    #[test]
    fn test_csv_has_fixed_columns() {
        let bytes = predictions_to_csv(&[prediction(12.345)]).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("id,sampleId,hmpiScore,riskCategory,latitude,longitude,date,createdAt")
        );
        let row = lines.next().unwrap();
        assert!(row.contains(",12.35,safe,12.5,-3.25,"));
        assert!(lines.next().is_none());
    }

    #[test]
    fn test_empty_csv_is_header_only() {
        let text = String::from_utf8(predictions_to_csv(&[]).unwrap()).unwrap();
        assert_eq!(text.lines().count(), 1);
    }

    #[test]
    fn test_pdf_structure() {
        let bytes = render_report(&report(ReportFormat::Pdf), &[prediction(75.0)]).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("%PDF-1.4"));
        assert!(text.trim_end().ends_with("%%EOF"));
        assert!(text.contains("/BaseFont /Helvetica"));
        assert!(text.contains("(Quarterly \\(draft\\)) Tj"));
        assert!(text.contains("Average HMPI: 75.00"));
    }

    #[test]
    fn test_pdf_xref_offsets_point_at_objects() {
        let bytes = PdfDocument::from_lines(&["hello".to_string()]).to_bytes();
        let text = String::from_utf8(bytes).unwrap();
        let xref = text.find("xref\n").unwrap();
        let entries: Vec<&str> = text[xref..].lines().skip(3).take(3).collect();
        for (i, entry) in entries.iter().enumerate() {
            let offset: usize = entry[..10].parse().unwrap();
            assert!(text[offset..].starts_with(&format!("{} 0 obj", i + 1)));
        }
    }

    #[test]
    fn test_pdf_paginates() {
        let lines: Vec<String> = (0..LINES_PER_PAGE * 2 + 1).map(|i| i.to_string()).collect();
        let doc = PdfDocument::from_lines(&lines);
        assert_eq!(doc.page_count(), 3);
        let text = String::from_utf8(doc.to_bytes()).unwrap();
        assert!(text.contains("/Count 3"));
    }

    #[test]
    fn test_escape_text() {
        assert_eq!(escape_text("a(b)\\c"), "a\\(b\\)\\\\c");
        assert_eq!(escape_text("µg"), "?g");
    }

    #[test]
    fn test_excel_report_is_csv() {
        let r = report(ReportFormat::Excel);
        let bytes = render_report(&r, &[prediction(1.0)]).unwrap();
        assert!(String::from_utf8(bytes).unwrap().starts_with("id,sampleId"));
        let (mime, name) = artifact_headers(&r);
        assert_eq!(mime, "text/csv; charset=utf-8");
        assert!(name.ends_with(".csv"));
    }
}
