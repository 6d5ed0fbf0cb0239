//! Human-readable rendering of per-title results.

use crate::models::{TitleReport, VariantOutcome};
use std::fmt::Write as _;

const DESCRIPTION_PREVIEW_CHARS: usize = 120;

pub fn render_reports(reports: &[TitleReport]) -> String {
    let mut out = String::new();

    for report in reports {
        let _ = writeln!(out, "Cover designs for: {}", report.title);

        if let Some(error) = &report.description_error {
            let _ = writeln!(out, "  Descriptions failed: {}", error);
        }

        for variant in &report.variants {
            match &variant.outcome {
                VariantOutcome::Saved(saved) => {
                    let _ = writeln!(
                        out,
                        "  Cover {}: {}",
                        variant.variant_index,
                        saved.image_path.display()
                    );
                    let _ = writeln!(out, "    {}", preview(&variant.description));
                }
                VariantOutcome::ImageFailed(reason) => {
                    let _ = writeln!(
                        out,
                        "  Cover {}: image generation failed ({})",
                        variant.variant_index, reason
                    );
                }
                VariantOutcome::SaveFailed(reason) => {
                    let _ = writeln!(
                        out,
                        "  Cover {}: could not be saved ({})",
                        variant.variant_index, reason
                    );
                }
            }
        }

        if report.saved_count() == 0 {
            let _ = writeln!(
                out,
                "  No images were successfully generated for '{}'.",
                report.title
            );
        }
        out.push('\n');
    }

    let saved: usize = reports.iter().map(TitleReport::saved_count).sum();
    let failed: usize = reports.iter().map(TitleReport::failed_count).sum();
    let _ = writeln!(
        out,
        "{} cover(s) saved, {} failed, across {} title(s).",
        saved,
        failed,
        reports.len()
    );
    out
}

fn preview(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= DESCRIPTION_PREVIEW_CHARS {
        flat
    } else {
        let cut: String = flat.chars().take(DESCRIPTION_PREVIEW_CHARS).collect();
        format!("{}...", cut.trim_end())
    }
}
