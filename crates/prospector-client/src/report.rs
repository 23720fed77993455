use std::fmt::Write as _;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use prospector_core::error::AppError;
use prospector_core::models::{AnalysisBundle, CompanyRecord, ReportReference, compute_hash};
use prospector_core::traits::ReportGenerator;

/// Writes Markdown prospect reports into a directory.
#[derive(Debug, Clone)]
pub struct MarkdownReportGenerator {
    output_dir: PathBuf,
}

impl MarkdownReportGenerator {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    fn file_name(record: &CompanyRecord, generated_at: DateTime<Utc>) -> String {
        format!(
            "{}_{}.md",
            slugify(&record.name),
            generated_at.format("%Y%m%d_%H%M%S")
        )
    }
}

impl ReportGenerator for MarkdownReportGenerator {
    async fn generate_report(
        &self,
        record: &CompanyRecord,
        bundle: &AnalysisBundle,
    ) -> Result<ReportReference, AppError> {
        let generated_at = Utc::now();
        let body = render_report(record, bundle, generated_at);

        tokio::fs::create_dir_all(&self.output_dir).await?;
        let path = self.output_dir.join(Self::file_name(record, generated_at));
        tokio::fs::write(&path, &body).await?;

        tracing::info!(path = %path.display(), bytes = body.len(), "Report written");
        Ok(ReportReference {
            location: path.display().to_string(),
            content_hash: compute_hash(&body),
        })
    }
}

/// Render the Markdown report body.
pub fn render_report(
    record: &CompanyRecord,
    bundle: &AnalysisBundle,
    generated_at: DateTime<Utc>,
) -> String {
    let mut out = String::new();
    // Writing to a String cannot fail.
    let _ = write_report(&mut out, record, bundle, generated_at);
    out
}

fn write_report(
    out: &mut String,
    record: &CompanyRecord,
    bundle: &AnalysisBundle,
    generated_at: DateTime<Utc>,
) -> std::fmt::Result {
    writeln!(out, "# Prospect Report: {}", record.name)?;
    writeln!(out, "\n_Generated {}_", generated_at.format("%Y-%m-%d %H:%M UTC"))?;

    writeln!(out, "\n## Executive Summary\n")?;
    match &bundle.analysis {
        Some(analysis) if !analysis.market_position.is_empty() => {
            writeln!(out, "**Market position:** {}", analysis.market_position)?;
        }
        _ => writeln!(out, "{} operates in {}.", record.name, record.industry)?,
    }
    if let Some(analysis) = &bundle.analysis {
        bullet_section(out, "Key Opportunities", &analysis.opportunities)?;
        bullet_section(out, "Risk Factors", &analysis.risks)?;
    }

    writeln!(out, "\n## Company Overview\n")?;
    writeln!(out, "- **Industry:** {}", record.industry)?;
    writeln!(out, "- **Description:** {}", record.description)?;
    if let Some(profile) = &bundle.profile {
        writeln!(out, "\n{}", profile.trim())?;
    }

    bullet_section(out, "Products", &record.products)?;

    if !record.team.is_empty() {
        writeln!(out, "\n## Team\n")?;
        for member in &record.team {
            if member.role.is_empty() {
                writeln!(out, "- {}", member.name)?;
            } else {
                writeln!(out, "- {}, {}", member.name, member.role)?;
            }
        }
    }

    if !record.news.is_empty() {
        writeln!(out, "\n## Recent News\n")?;
        for item in &record.news {
            writeln!(out, "- {} ({}, {})", item.headline, item.source, item.date)?;
        }
    }

    if !record.metrics.is_empty() {
        writeln!(out, "\n## Metrics\n")?;
        writeln!(out, "| Metric | Value |")?;
        writeln!(out, "|---|---|")?;
        for (name, value) in &record.metrics {
            writeln!(out, "| {name} | {value} |")?;
        }
    }

    if !record.social_media.is_empty() {
        writeln!(out, "\n## Social Media\n")?;
        for (platform, link) in &record.social_media {
            writeln!(out, "- {platform}: {link}")?;
        }
    }
    Ok(())
}

fn bullet_section(out: &mut String, title: &str, items: &[String]) -> std::fmt::Result {
    if items.is_empty() {
        return Ok(());
    }
    writeln!(out, "\n### {title}\n")?;
    for item in items {
        writeln!(out, "- {item}")?;
    }
    Ok(())
}

/// `"Acme Robotics, Inc."` → `"acme-robotics-inc"`.
pub fn slugify(name: &str) -> String {
    let slug = name
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-");
    if slug.is_empty() {
        "company".to_string()
    } else {
        slug
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::TimeZone;
    use prospector_core::models::{AnalysisResult, MetricValue, NewsItem, TeamMember};

    use super::*;

    fn record() -> CompanyRecord {
        CompanyRecord {
            name: "Acme Robotics, Inc.".into(),
            description: "Industrial robotics".into(),
            industry: "Robotics".into(),
            products: vec!["ArmOne".into()],
            team: vec![TeamMember {
                name: "Ada Park".into(),
                role: "CEO".into(),
            }],
            news: vec![NewsItem {
                headline: "Acme raises Series B".into(),
                date: "2024-03-01".into(),
                source: "TechWire".into(),
            }],
            social_media: BTreeMap::new(),
            metrics: BTreeMap::from([("employees".into(), MetricValue::Integer(85))]),
        }
    }

    fn bundle() -> AnalysisBundle {
        AnalysisBundle {
            analysis: Some(AnalysisResult {
                market_position: "Challenger".into(),
                opportunities: vec!["EU expansion".into()],
                risks: vec![],
                extra: Default::default(),
            }),
            profile: Some("Acme builds robot arms.".into()),
        }
    }

    #[test]
    fn renders_all_sections() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap();
        let body = render_report(&record(), &bundle(), at);

        assert!(body.starts_with("# Prospect Report: Acme Robotics, Inc.\n"));
        assert!(body.contains("_Generated 2024-05-01 09:30 UTC_"));
        assert!(body.contains("**Market position:** Challenger"));
        assert!(body.contains("### Key Opportunities\n\n- EU expansion"));
        assert!(!body.contains("Risk Factors"));
        assert!(body.contains("Acme builds robot arms."));
        assert!(body.contains("- Ada Park, CEO"));
        assert!(body.contains("- Acme raises Series B (TechWire, 2024-03-01)"));
        assert!(body.contains("| employees | 85 |"));
        assert!(!body.contains("## Social Media"));
    }

    #[test]
    fn renders_without_analysis() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap();
        let body = render_report(&record(), &AnalysisBundle::default(), at);
        assert!(body.contains("Acme Robotics, Inc. operates in Robotics."));
    }

    #[test]
    fn slugify_names() {
        assert_eq!(slugify("Acme Robotics, Inc."), "acme-robotics-inc");
        assert_eq!(slugify("  "), "company");
    }

    #[tokio::test]
    async fn writes_report_file_with_hash() {
        let dir = tempfile::tempdir().unwrap();
        let generator = MarkdownReportGenerator::new(dir.path().join("reports"));

        let reference = generator
            .generate_report(&record(), &bundle())
            .await
            .unwrap();

        let written = std::fs::read_to_string(&reference.location).unwrap();
        assert_eq!(reference.content_hash, compute_hash(&written));
        let file_name = std::path::Path::new(&reference.location)
            .file_name()
            .unwrap()
            .to_string_lossy()
            .into_owned();
        assert!(file_name.starts_with("acme-robotics-inc_"));
        assert!(file_name.ends_with(".md"));
    }
}
