//! Reading sheet descriptions and writing solved values.

pub mod parser;
pub mod writer;

pub use parser::{load_sheet, load_sheet_content, parse_sheet, parse_sheet_content};
pub use writer::{write_values, write_values_content};
