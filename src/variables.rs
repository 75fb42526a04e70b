//! `{Column}` placeholder handling.
//!
//! A token is `{` followed by one or more characters other than braces and a
//! closing `}`. Identifiers are trimmed before lookup. Unknown identifiers and
//! null cells leave the token untouched.

use crate::row::Row;

/// One placeholder occurrence inside a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Token<'a> {
    /// Byte offset of the opening brace.
    start: usize,
    /// Byte offset one past the closing brace.
    end: usize,
    ident: &'a str,
}

/// Yields tokens left to right in a single pass.
struct TokenScanner<'a> {
    source: &'a str,
    pos: usize,
}

impl<'a> TokenScanner<'a> {
    fn new(source: &'a str) -> Self {
        Self { source, pos: 0 }
    }
}

impl<'a> Iterator for TokenScanner<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Token<'a>> {
        let bytes = self.source.as_bytes();
        while self.pos < bytes.len() {
            let Some(rel) = self.source[self.pos..].find('{') else {
                self.pos = bytes.len();
                return None;
            };
            let open = self.pos + rel;
            let body_start = open + 1;
            // The body ends at the first brace of either kind.
            let Some(close_rel) = self.source[body_start..].find(['{', '}']) else {
                self.pos = bytes.len();
                return None;
            };
            let close = body_start + close_rel;
            if bytes[close] == b'{' || close == body_start {
                // `{{x}` restarts at the inner brace; `{}` is not a token.
                self.pos = if bytes[close] == b'{' { close } else { close + 1 };
                continue;
            }
            self.pos = close + 1;
            return Some(Token {
                start: open,
                end: close + 1,
                ident: self.source[body_start..close].trim(),
            });
        }
        None
    }
}

/// Replace every resolvable `{Column}` token with the row's value.
///
/// Substituted values are never scanned again, so a cell containing `{X}`
/// stays literal in the output.
pub fn substitute(template: &str, row: &Row) -> String {
    let mut out = String::with_capacity(template.len());
    let mut copied = 0usize;
    for token in TokenScanner::new(template) {
        out.push_str(&template[copied..token.start]);
        match row.display(token.ident) {
            Some(value) => out.push_str(&value),
            None => out.push_str(&template[token.start..token.end]),
        }
        copied = token.end;
    }
    out.push_str(&template[copied..]);
    out
}

/// Unique trimmed identifiers in first-seen order. A whitespace-only token
/// such as `{ }` yields `""`.
pub fn extract_variables(template: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for token in TokenScanner::new(template) {
        if out.iter().any(|seen| seen == token.ident) {
            continue;
        }
        out.push(token.ident.to_string());
    }
    out
}

/// True when `text` still holds at least one `{...}` token.
pub fn has_unresolved_tokens(text: &str) -> bool {
    TokenScanner::new(text).next().is_some()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateValidation {
    pub is_valid: bool,
    pub missing_variables: Vec<String>,
}

/// Advisory check of template identifiers against the dataset's columns.
pub fn validate_template<S: AsRef<str>>(template: &str, columns: &[S]) -> TemplateValidation {
    let missing_variables: Vec<String> = extract_variables(template)
        .into_iter()
        .filter(|name| !columns.iter().any(|column| column.as_ref() == name))
        .collect();
    TemplateValidation {
        is_valid: missing_variables.is_empty(),
        missing_variables,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ana() -> Row {
        Row::new().with("Name", "Ana")
    }

    #[test]
    fn substitutes_known_columns() {
        assert_eq!(substitute("Hi {Name}", &ana()), "Hi Ana");
    }

    #[test]
    fn unknown_columns_pass_through() {
        assert_eq!(substitute("Hi {Ghost}", &ana()), "Hi {Ghost}");
    }

    #[test]
    fn identifiers_are_trimmed() {
        assert_eq!(substitute("Hi { Name }!", &ana()), "Hi Ana!");
    }

    #[test]
    fn null_cells_pass_through() {
        let row = Row::new().with("Name", crate::row::CellValue::Null);
        assert_eq!(substitute("{Name}", &row), "{Name}");
    }

    #[test]
    fn numbers_and_booleans_use_literal_form() {
        let row = Row::new().with("ID", 42i64).with("Paid", false).with("Rate", 0.5);
        assert_eq!(substitute("{ID}/{Paid}/{Rate}", &row), "42/false/0.5");
    }

    #[test]
    fn substituted_values_are_not_rescanned() {
        let row = Row::new().with("A", "{B}").with("B", "boom");
        let once = substitute("x{A}y", &row);
        assert_eq!(once, "x{B}y");
        assert_eq!(substitute("x{A}y", &row), once);
    }

    #[test]
    fn nested_and_empty_braces_are_not_tokens() {
        let row = ana();
        assert_eq!(substitute("{{Name}}", &row), "{Ana}");
        assert_eq!(substitute("{} and {", &row), "{} and {");
        assert_eq!(substitute("css { color: red }", &row), "css { color: red }");
    }

    #[test]
    fn multibyte_text_survives() {
        let row = Row::new().with("Név", "Ágnes");
        assert_eq!(substitute("Szia {Név} ✓", &row), "Szia Ágnes ✓");
    }

    #[test]
    fn extract_is_unique_and_ordered() {
        assert_eq!(
            extract_variables("Hello {Name}, your ID is {ID}. {Name} again."),
            vec!["Name", "ID"]
        );
    }

    #[test]
    fn whitespace_only_tokens_extract_as_empty_names() {
        assert_eq!(extract_variables("{ } {Name} {\t}"), vec!["", "Name"]);
        let result = validate_template("{ } {Name}", &["Name"]);
        assert_eq!(result.missing_variables, vec![""]);
        assert_eq!(substitute("a { } b", &ana()), "a { } b");
    }

    #[test]
    fn validation_reports_missing_columns() {
        let result = validate_template("{Name} {Email} {ID}", &["Name", "ID"]);
        assert!(!result.is_valid);
        assert_eq!(result.missing_variables, vec!["Email"]);
        assert!(validate_template("{Name}", &["Name"]).is_valid);
    }

    #[test]
    fn detects_unresolved_tokens() {
        assert!(has_unresolved_tokens("doc_{X}"));
        assert!(!has_unresolved_tokens("doc_{}"));
        assert!(!has_unresolved_tokens("plain"));
    }
}
