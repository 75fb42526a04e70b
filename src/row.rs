use crate::error::DocMergeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;

/// One scalar spreadsheet cell.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Text(String),
    Number(f64),
    Bool(bool),
    Null,
}

impl CellValue {
    /// Display form used for substitution. `Null` has none.
    pub fn as_display(&self) -> Option<String> {
        match self {
            CellValue::Text(text) => Some(text.clone()),
            CellValue::Number(value) => Some(format_number(*value)),
            CellValue::Bool(value) => Some(value.to_string()),
            CellValue::Null => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }
}

fn format_number(value: f64) -> String {
    if !value.is_finite() {
        return if value.is_nan() {
            "NaN".to_string()
        } else if value > 0.0 {
            "Infinity".to_string()
        } else {
            "-Infinity".to_string()
        };
    }
    let magnitude = value.abs();
    if magnitude != 0.0 && !(1e-6..1e21).contains(&magnitude) {
        // Shortest digits in exponent form, with an explicit `+` on
        // positive exponents: `1e+21`, `1.5e-7`.
        let formatted = format!("{:e}", value);
        return match formatted.split_once('e') {
            Some((mantissa, exponent)) if !exponent.starts_with('-') => {
                format!("{}e+{}", mantissa, exponent)
            }
            _ => formatted,
        };
    }
    if value.fract() == 0.0 && magnitude < 1e15 {
        // -0.0 prints as "0".
        return format!("{}", value as i64);
    }
    format!("{}", value)
}

impl From<serde_json::Value> for CellValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => CellValue::Null,
            serde_json::Value::Bool(b) => CellValue::Bool(b),
            serde_json::Value::Number(n) => n
                .as_f64()
                .map(CellValue::Number)
                .unwrap_or_else(|| CellValue::Text(n.to_string())),
            serde_json::Value::String(s) => CellValue::Text(s),
            other => CellValue::Text(other.to_string()),
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Text(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        CellValue::Number(value as f64)
    }
}

impl From<bool> for CellValue {
    fn from(value: bool) -> Self {
        CellValue::Bool(value)
    }
}

impl Serialize for CellValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            CellValue::Text(text) => serializer.serialize_str(text),
            CellValue::Number(value) => serializer.serialize_f64(*value),
            CellValue::Bool(value) => serializer.serialize_bool(*value),
            CellValue::Null => serializer.serialize_unit(),
        }
    }
}

impl<'de> Deserialize<'de> for CellValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(CellValue::from)
    }
}

/// A record of the uploaded dataset: column name to cell value, in column
/// order. Immutable once handed to a render.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<String>,
    values: HashMap<String, CellValue>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: impl Into<String>, value: impl Into<CellValue>) -> Self {
        self.insert(column, value);
        self
    }

    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<CellValue>) {
        let column = column.into();
        if !self.values.contains_key(&column) {
            self.columns.push(column.clone());
        }
        self.values.insert(column, value.into());
    }

    pub fn get(&self, column: &str) -> Option<&CellValue> {
        self.values.get(column)
    }

    /// Display value for a column; missing keys and nulls both yield `None`.
    pub fn display(&self, column: &str) -> Option<String> {
        self.values.get(column).and_then(CellValue::as_display)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for column in &self.columns {
            if let Some(value) = self.values.get(column) {
                map.serialize_entry(column, value)?;
            }
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Row {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let map = serde_json::Map::<String, serde_json::Value>::deserialize(deserializer)?;
        let mut row = Row::new();
        for (column, value) in map {
            row.insert(column, CellValue::from(value));
        }
        Ok(row)
    }
}

/// Load a JSON array of objects into rows.
pub fn rows_from_json(json: &str) -> Result<Vec<Row>, DocMergeError> {
    Ok(serde_json::from_str(json)?)
}

/// Column headers of a dataset, taken from its first row.
pub fn column_headers(rows: &[Row]) -> Vec<String> {
    rows.first()
        .map(|row| row.columns().to_vec())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_stringify_like_spreadsheet_cells() {
        assert_eq!(CellValue::Number(3.0).as_display().as_deref(), Some("3"));
        assert_eq!(CellValue::Number(2.5).as_display().as_deref(), Some("2.5"));
        assert_eq!(CellValue::Number(-0.0).as_display().as_deref(), Some("0"));
        assert_eq!(CellValue::Bool(true).as_display().as_deref(), Some("true"));
        assert_eq!(CellValue::Null.as_display(), None);
    }

    #[test]
    fn rows_load_from_json_in_column_order() {
        let rows = rows_from_json(
            r#"[{"Name":"Ana","Age":31,"Active":true,"Note":null},{"Name":"Bo"}]"#,
        )
        .expect("rows");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].columns(), ["Name", "Age", "Active", "Note"]);
        assert_eq!(rows[0].display("Age").as_deref(), Some("31"));
        assert_eq!(rows[0].display("Note"), None);
        assert_eq!(rows[1].display("Age"), None);
        assert_eq!(column_headers(&rows), vec!["Name", "Age", "Active", "Note"]);
    }

    #[test]
    fn nested_json_values_are_kept_as_text() {
        let rows = rows_from_json(r#"[{"Tags":["a","b"]}]"#).expect("rows");
        assert_eq!(rows[0].display("Tags").as_deref(), Some(r#"["a","b"]"#));
    }

    #[test]
    fn row_serializes_back_to_json_object() {
        let row = Row::new().with("Name", "Ana").with("ID", 7i64);
        let json = serde_json::to_string(&row).expect("json");
        assert_eq!(json, r#"{"Name":"Ana","ID":7.0}"#);
    }

    #[test]
    fn extreme_numbers_use_exponent_form() {
        let show = |n: f64| CellValue::Number(n).as_display().expect("number");
        assert_eq!(show(1e21), "1e+21");
        assert_eq!(show(-2.5e22), "-2.5e+22");
        assert_eq!(show(1.5e-7), "1.5e-7");
        assert_eq!(show(1e-6), "0.000001");
        assert_eq!(show(1e20), "100000000000000000000");
        assert_eq!(show(-0.0), "0");
    }
}
