//! Printing solved sheets.

use adam_core::storage::write_values_content;
use adam_core::{CellKind, InvariantViolation, Name, Sheet, Value};
use adam_engine::BUILTINS;
use adam_engine::engine::format_value;
use serde::Serialize;

/// An `-e` expression and what it evaluated to.
#[derive(Debug, Serialize)]
pub struct Evaluation {
    pub expression: String,
    pub value: Value,
}

#[derive(Serialize)]
struct JsonCell<'a> {
    name: Name,
    kind: CellKind,
    value: &'a Value,
}

#[derive(Serialize)]
struct JsonOutput<'a> {
    cells: Vec<JsonCell<'a>>,
    evaluations: &'a [Evaluation],
    violations: &'a [InvariantViolation],
}

/// `name = value` per cell, then `expr => value` per evaluation.
pub fn render_text(sheet: &Sheet, evaluations: &[Evaluation]) -> String {
    let mut out = write_values_content(sheet);
    for eval in evaluations {
        out.push_str(&format!("{} => {}\n", eval.expression, format_value(&eval.value)));
    }
    out
}

pub fn render_json(
    sheet: &Sheet,
    evaluations: &[Evaluation],
    violations: &[InvariantViolation],
) -> serde_json::Result<String> {
    let output = JsonOutput {
        cells: sheet
            .cells()
            .iter()
            .map(|cell| JsonCell {
                name: cell.name,
                kind: cell.kind,
                value: &cell.value,
            })
            .collect(),
        evaluations,
        violations,
    };
    serde_json::to_string_pretty(&output)
}

pub fn describe_violation(violation: &InvariantViolation) -> String {
    match &violation.expression {
        Some(expression) => format!(
            "{}: invariant '{}' does not hold: {}",
            violation.position, violation.name, expression
        ),
        None => format!(
            "{}: invariant '{}' does not hold",
            violation.position, violation.name
        ),
    }
}

/// One `name  description` line per built-in function.
pub fn list_functions() -> String {
    let width = BUILTINS.iter().map(|b| b.name.len()).max().unwrap_or(0);
    BUILTINS
        .iter()
        .map(|b| format!("{:width$}  {}\n", b.name, b.description))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use adam_core::storage::parse_sheet_content;

    fn sheet() -> Sheet {
        let mut sheet =
            parse_sheet_content("input a: 2\nexternal e\noutput o <== a * 2\n", None).unwrap();
        sheet.build().unwrap();
        sheet
    }

    #[test]
    fn test_render_text() {
        let evaluations = vec![Evaluation {
            expression: "o + 1".to_string(),
            value: Value::from(5),
        }];
        assert_eq!(
            render_text(&sheet(), &evaluations),
            "a = 2\ne = empty\no = 4\no + 1 => 5\n"
        );
    }

    #[test]
    fn test_list_functions() {
        let listing = list_functions();
        assert_eq!(listing.lines().count(), BUILTINS.len());
        assert!(listing.lines().any(|line| line.starts_with("sqrt ")));
    }

    #[test]
    fn test_render_json() {
        let json = render_json(&sheet(), &[], &[]).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["cells"][0]["name"], "a");
        assert_eq!(parsed["cells"][0]["kind"], "input");
        assert_eq!(parsed["cells"][1]["value"], serde_json::Value::Null);
        assert_eq!(parsed["cells"][2]["value"].as_f64(), Some(4.0));
    }
}
