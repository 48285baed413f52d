//! Terminal rendering for classification results and disease cards.

use std::fmt::Write;

use skinsight_core::{DiseaseInfo, Prediction};

const MAX_LIST_ITEMS: usize = 10;
const BAR_WIDTH: usize = 30;

// ── Public API ──

pub fn print_predictions(source: &str, predictions: &[Prediction]) {
    print!("{}", render_predictions(source, predictions));
}

pub fn print_disease_card(name: &str, info: &DiseaseInfo) {
    print!("{}", render_disease_card(name, info));
}

/// One line per prediction with a proportional bar.
pub fn render_predictions(source: &str, predictions: &[Prediction]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== {source} ===");
    if predictions.is_empty() {
        let _ = writeln!(out, "  (no predictions)");
        return out;
    }

    let name_width = predictions
        .iter()
        .map(|p| p.name.chars().count())
        .max()
        .unwrap_or(0);

    for (rank, p) in predictions.iter().map(Prediction::rounded).enumerate() {
        let filled = ((p.confidence / 100.0) * BAR_WIDTH as f64).round() as usize;
        let bar = "#".repeat(filled.min(BAR_WIDTH));
        let _ = writeln!(
            out,
            "  {:>2}. {:<name_width$}  {:>6.2}%  {bar}",
            rank + 1,
            p.name,
            p.confidence,
        );
    }
    out
}

/// Vertical card, one section per record field.
pub fn render_disease_card(name: &str, info: &DiseaseInfo) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== {name} ===");
    let _ = writeln!(out);

    render_section(&mut out, "Symptoms", &info.symptoms);
    render_section(&mut out, "Causes", &info.causes);
    render_section(&mut out, "Home Remedies", &info.home_remedy);
    render_section(&mut out, "Treatments", &info.treatment);
    out
}

// ── Section rendering ──

fn render_section(out: &mut String, header: &str, items: &[String]) {
    let _ = writeln!(out, "{header}");
    if items.is_empty() {
        let _ = writeln!(out, "  (none)");
    }
    for item in items.iter().take(MAX_LIST_ITEMS) {
        let _ = writeln!(out, "  - {item}");
    }
    if items.len() > MAX_LIST_ITEMS {
        let _ = writeln!(out, "  ... and {} more", items.len() - MAX_LIST_ITEMS);
    }
    let _ = writeln!(out);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pred(name: &str, confidence: f64) -> Prediction {
        Prediction {
            name: name.into(),
            confidence,
        }
    }

    #[test]
    fn predictions_are_numbered_and_rounded() {
        let text = render_predictions(
            "lesion.jpg",
            &[pred("Melanoma", 61.234_56), pred("Eczema", 38.765_44)],
        );
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "=== lesion.jpg ===");
        assert!(lines[1].contains(" 1. Melanoma"), "{}", lines[1]);
        assert!(lines[1].contains("61.23%"), "{}", lines[1]);
        assert!(lines[2].contains(" 2. Eczema"), "{}", lines[2]);
        assert!(lines[2].contains("38.77%"), "{}", lines[2]);
    }

    #[test]
    fn full_confidence_fills_the_bar() {
        let text = render_predictions("x", &[pred("Psoriasis", 100.0)]);
        assert!(text.contains(&"#".repeat(BAR_WIDTH)));
    }

    #[test]
    fn empty_predictions() {
        assert!(render_predictions("x", &[]).contains("(no predictions)"));
    }

    #[test]
    fn card_lists_every_section() {
        let info = DiseaseInfo {
            symptoms: vec!["itching".into()],
            causes: vec![],
            home_remedy: (0..12).map(|i| format!("remedy {i}")).collect(),
            treatment: vec!["emollients".into()],
        };
        let text = render_disease_card("Eczema", &info);

        assert!(text.starts_with("=== Eczema ===\n"));
        for header in ["Symptoms", "Causes", "Home Remedies", "Treatments"] {
            assert!(text.lines().any(|l| l == header), "missing {header}");
        }
        assert!(text.contains("  - itching"));
        assert!(text.contains("  (none)"));
        assert!(text.contains("  - remedy 9"));
        assert!(!text.contains("  - remedy 10"));
        assert!(text.contains("... and 2 more"));
    }
}
