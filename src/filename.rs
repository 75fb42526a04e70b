use crate::row::Row;
use crate::variables::{has_unresolved_tokens, substitute};
use std::collections::HashMap;

const MAX_STEM_CHARS: usize = 200;
const FORBIDDEN: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Pdf,
    Docx,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Pdf => "pdf",
            OutputFormat::Docx => "docx",
        }
    }

    pub fn from_str(raw: &str) -> Option<Self> {
        match raw.trim().trim_start_matches('.').to_ascii_lowercase().as_str() {
            "pdf" => Some(OutputFormat::Pdf),
            "docx" | "word" => Some(OutputFormat::Docx),
            _ => None,
        }
    }
}

/// Derive the output filename for one row. Pure and deterministic.
pub fn generate(
    row: &Row,
    pattern: &str,
    fallback_prefix: &str,
    index: usize,
    format: OutputFormat,
) -> String {
    let fallback = fallback_stem(fallback_prefix, index);
    let filled = substitute(pattern, row);
    let stem = if filled.trim().is_empty() || has_unresolved_tokens(&filled) {
        fallback.clone()
    } else {
        filled
    };
    let mut stem = sanitize_stem(&stem);
    if stem.is_empty() {
        stem = sanitize_stem(&fallback);
    }
    if stem.is_empty() {
        // Prefix itself sanitized away.
        stem = format!("{:04}", index + 1);
    }
    format!("{}.{}", stem, format.extension())
}

/// Name of the bulk archive for a project.
pub fn archive_name(project: &str) -> String {
    let mut stem = sanitize_stem(project);
    if stem.is_empty() {
        stem = "project".to_string();
    }
    format!("{}_documents.zip", stem)
}

/// Make `name` unique within `seen` by inserting `_2`, `_3`, ... before the
/// extension.
pub fn dedupe(name: &str, seen: &mut HashMap<String, usize>) -> String {
    let count = seen.entry(name.to_string()).or_insert(0);
    *count += 1;
    if *count == 1 {
        return name.to_string();
    }
    let (stem, ext) = match name.rfind('.') {
        Some(dot) if dot > 0 => (&name[..dot], &name[dot..]),
        _ => (name, ""),
    };
    let mut n = *count;
    loop {
        let candidate = format!("{}_{}{}", stem, n, ext);
        if !seen.contains_key(&candidate) {
            seen.insert(candidate.clone(), 1);
            return candidate;
        }
        n += 1;
    }
}

fn fallback_stem(prefix: &str, index: usize) -> String {
    format!("{}_{:04}", prefix, index.saturating_add(1))
}

fn sanitize_stem(raw: &str) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    let cleaned: String = collapsed
        .chars()
        .filter(|ch| !FORBIDDEN.contains(ch) && !ch.is_control())
        .map(|ch| if ch == ' ' { '_' } else { ch })
        .take(MAX_STEM_CHARS)
        .collect();
    cleaned
        .trim_end_matches(|ch: char| ch == '.' || ch.is_whitespace())
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unresolved_token_uses_indexed_fallback() {
        let name = generate(&Row::new(), "{Missing}", "doc", 2, OutputFormat::Pdf);
        assert_eq!(name, "doc_0003.pdf");
    }

    #[test]
    fn forbidden_characters_are_stripped() {
        let row = Row::new().with("Name", "A/B:C");
        assert_eq!(generate(&row, "{Name}", "doc", 0, OutputFormat::Pdf), "ABC.pdf");
    }

    #[test]
    fn whitespace_collapses_to_underscores() {
        let row = Row::new().with("First", " Ana ").with("Last", "Lopez");
        let name = generate(&row, "{First}   {Last}\tinvoice", "doc", 0, OutputFormat::Docx);
        assert_eq!(name, "Ana_Lopez_invoice.docx");
    }

    #[test]
    fn blank_pattern_uses_fallback() {
        let name = generate(&Row::new(), "   ", "letter", 11, OutputFormat::Docx);
        assert_eq!(name, "letter_0012.docx");
    }

    #[test]
    fn sanitized_to_nothing_reapplies_fallback() {
        let row = Row::new().with("Name", "???");
        assert_eq!(generate(&row, "{Name}", "doc", 0, OutputFormat::Pdf), "doc_0001.pdf");
    }

    #[test]
    fn trailing_dots_are_removed() {
        let row = Row::new().with("Name", "report...");
        assert_eq!(generate(&row, "{Name}", "doc", 0, OutputFormat::Pdf), "report.pdf");
    }

    #[test]
    fn long_names_truncate_by_characters() {
        let row = Row::new().with("Name", "é".repeat(300));
        let name = generate(&row, "{Name}", "doc", 0, OutputFormat::Pdf);
        assert_eq!(name.chars().count(), 200 + ".pdf".len());
    }

    #[test]
    fn generate_is_deterministic() {
        let row = Row::new().with("Name", "Ana");
        let a = generate(&row, "cert-{Name}", "doc", 4, OutputFormat::Pdf);
        let b = generate(&row, "cert-{Name}", "doc", 4, OutputFormat::Pdf);
        assert_eq!(a, b);
    }

    #[test]
    fn archive_name_follows_project() {
        assert_eq!(archive_name("Spring Gala"), "Spring_Gala_documents.zip");
        assert_eq!(archive_name(""), "project_documents.zip");
    }

    #[test]
    fn dedupe_numbers_repeats() {
        let mut seen = HashMap::new();
        assert_eq!(dedupe("a.pdf", &mut seen), "a.pdf");
        assert_eq!(dedupe("a.pdf", &mut seen), "a_2.pdf");
        assert_eq!(dedupe("a.pdf", &mut seen), "a_3.pdf");
        assert_eq!(dedupe("b.pdf", &mut seen), "b.pdf");
    }
}
