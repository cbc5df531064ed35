//! Writer for solved sheet values

use crate::error::Result;
use crate::sheet::Sheet;
use adam_engine::engine::format_value;
use std::fs;
use std::path::Path;

/// Write every cell's current value to a file
pub fn write_values(path: &Path, sheet: &Sheet) -> Result<()> {
    let content = write_values_content(sheet);
    fs::write(path, content)?;
    Ok(())
}

/// One `name = value` line per cell, in declaration order
pub fn write_values_content(sheet: &Sheet) -> String {
    let mut out = String::new();
    for (name, value) in sheet.snapshot() {
        out.push_str(&format!("{} = {}\n", name, format_value(&value)));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{parse_sheet, parse_sheet_content};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_write_values_in_declaration_order() {
        let mut sheet = parse_sheet_content(
            "input b: 2\ninput a: 'hi'\nexternal e\noutput o <== [b, a]\n",
            None,
        )
        .unwrap();
        sheet.build().unwrap();
        assert_eq!(
            write_values_content(&sheet),
            "b = 2\na = 'hi'\ne = empty\no = [2, 'hi']\n"
        );
    }

    #[test]
    fn test_load_then_write_files() {
        let sheet_path = std::env::temp_dir().join(format!(
            "adam_writer_test_{}.adm",
            std::process::id()
        ));
        let values_path = sheet_path.with_extension("txt");
        fs::write(&sheet_path, "input w: 3\nlogic area <== w * w\n").unwrap();

        let mut sheet = parse_sheet(&sheet_path).unwrap();
        sheet.build().unwrap();
        write_values(&values_path, &sheet).unwrap();
        assert_eq!(fs::read_to_string(&values_path).unwrap(), "w = 3\narea = 9\n");
        assert_eq!(
            sheet.cell("area").unwrap().position.file.as_deref(),
            sheet_path.to_str()
        );

        let _ = fs::remove_file(&sheet_path);
        let _ = fs::remove_file(&values_path);
    }

    #[test]
    fn test_empty_sheet_writes_nothing() {
        assert_eq!(write_values_content(&Sheet::new()), "");
    }
}
