//! Parser for the .adm sheet description format
//!
//! One declaration per line; blank lines and lines starting with `#` are
//! skipped.
//!
//! ```text
//! constant k: 10
//! input a: 1
//! external host
//! interface h: 5 <== w * 2
//! logic x <== a * k
//! invariant positive <== x > 0
//! relate when (flag) { a <== b * 2; b <== a / 2 }
//! ```

use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use adam_engine::engine::{Expression, Name, compile};
use regex::Regex;

use crate::error::{AdamError, Result};
use crate::sheet::{CellKind, LinePosition, RelateTerm, Sheet};

const ARROW: &str = "<==";

fn declaration_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^\s*(input|output|constant|logic|invariant|interface|external)\s+([A-Za-z_][A-Za-z0-9_]*)\s*(.*?)\s*$",
        )
        .expect("valid regex")
    })
}

fn relate_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*relate(?:\s+when\s*\((.*)\))?\s*\{(.*)\}\s*$").expect("valid regex")
    })
}

fn identifier_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid regex"))
}

/// Parse a sheet file. The returned sheet is not built yet.
pub fn parse_sheet(path: &Path) -> Result<Sheet> {
    let mut sheet = Sheet::new();
    load_sheet(&mut sheet, path)?;
    Ok(sheet)
}

/// Add the declarations in a sheet file to `sheet`.
pub fn load_sheet(sheet: &mut Sheet, path: &Path) -> Result<()> {
    let content = fs::read_to_string(path)?;
    let file = path.display().to_string();
    load_sheet_content(sheet, &content, Some(&file))
}

/// Parse sheet content from a string. The returned sheet is not built yet.
pub fn parse_sheet_content(content: &str, file: Option<&str>) -> Result<Sheet> {
    let mut sheet = Sheet::new();
    load_sheet_content(&mut sheet, content, file)?;
    Ok(sheet)
}

/// Add the declarations in `content` to `sheet`.
pub fn load_sheet_content(sheet: &mut Sheet, content: &str, file: Option<&str>) -> Result<()> {
    for (line_num, line) in content.lines().enumerate() {
        let trimmed = line.trim();

        // Skip empty lines and comments
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let at = Locator {
            file,
            line: line_num + 1,
            text: line,
        };
        if let Some(caps) = relate_regex().captures(line) {
            parse_relation(sheet, &at, caps.get(1), caps.get(2))?;
        } else if let Some(caps) = declaration_regex().captures(line) {
            let (Some(keyword), Some(name), Some(rest)) = (caps.get(1), caps.get(2), caps.get(3))
            else {
                return Err(at.error(0, "Expected a declaration"));
            };
            parse_declaration(sheet, &at, keyword.as_str(), name.as_str(), rest)?;
        } else {
            return Err(at.error(
                line.len() - line.trim_start().len(),
                "Expected a declaration or 'relate' clause",
            ));
        }
    }
    Ok(())
}

/// Maps byte offsets within one source line to positions.
struct Locator<'a> {
    file: Option<&'a str>,
    line: usize,
    text: &'a str,
}

impl Locator<'_> {
    fn position(&self, offset: usize) -> LinePosition {
        let offset = offset.min(self.text.len());
        let column = self.text.get(..offset).map_or(offset, |s| s.chars().count()) + 1;
        LinePosition::new(self.file, self.line, column)
    }

    fn error(&self, offset: usize, message: impl Into<String>) -> AdamError {
        AdamError::Parse {
            position: self.position(offset),
            message: message.into(),
        }
    }

    /// Compile the expression at `offset..offset + source.len()`.
    fn compile(&self, source: &str, offset: usize) -> Result<(Expression, LinePosition)> {
        let start = offset + (source.len() - source.trim_start().len());
        let source = source.trim();
        if source.is_empty() {
            return Err(self.error(start, "Expected an expression"));
        }
        let expression = compile(source).map_err(|err| {
            self.error(
                start + err.offset,
                format!("Invalid expression: {}", err.message),
            )
        })?;
        Ok((expression, self.position(start)))
    }
}

fn parse_declaration(
    sheet: &mut Sheet,
    at: &Locator<'_>,
    keyword: &str,
    name: &str,
    rest: regex::Match<'_>,
) -> Result<()> {
    let position = at.position(rest.start().min(at.text.len()));
    let decl_position = at.position(at.text.len() - at.text.trim_start().len());
    let text = rest.as_str();

    // `: initializer` and/or `<== expression`
    let (init_part, expr_part) = match find_top_level(text, ARROW) {
        Some(arrow) => (
            &text[..arrow],
            Some((&text[arrow + ARROW.len()..], rest.start() + arrow + ARROW.len())),
        ),
        None => (text, None),
    };
    let init_part = init_part.trim_end();
    let initializer = if init_part.is_empty() {
        None
    } else if let Some(init) = init_part.strip_prefix(':') {
        Some(at.compile(init, rest.start() + 1)?)
    } else {
        return Err(at.error(rest.start(), "Expected ':' or '<==' after the cell name"));
    };
    let expression = match expr_part {
        Some((source, offset)) => Some(at.compile(source, offset)?),
        None => None,
    };

    let kind = match keyword {
        "input" => CellKind::Input,
        "constant" => CellKind::Constant,
        "output" => CellKind::Output,
        "logic" => CellKind::Logic,
        "invariant" => CellKind::Invariant,
        "external" => CellKind::External,
        _ => CellKind::Interface {
            linked: expression.is_some(),
        },
    };

    match kind {
        CellKind::Interface { linked } => {
            let (init, init_position) = split(initializer, &decl_position);
            let (expr, expr_position) = split(expression, &position);
            sheet.add_interface(name, linked, init_position, init, expr_position, expr)
        }
        CellKind::Input | CellKind::Constant | CellKind::External => {
            if expression.is_some() {
                return Err(at.error(
                    rest.start(),
                    format!("{} cells take an initializer (': expr'), not '<=='", kind),
                ));
            }
            if kind == CellKind::Constant && initializer.is_none() {
                return Err(at.error(rest.start(), "constant cells need an initializer"));
            }
            if kind == CellKind::External && initializer.is_some() {
                return Err(at.error(rest.start(), "external cells take no initializer"));
            }
            let (init, init_position) = split(initializer, &decl_position);
            sheet.add_cell(kind, name, init_position, init)
        }
        CellKind::Output | CellKind::Logic | CellKind::Invariant => {
            if initializer.is_some() {
                return Err(at.error(
                    rest.start(),
                    format!("{} cells are defined with '<== expr', not ':'", kind),
                ));
            }
            let Some((expr, expr_position)) = expression else {
                return Err(at.error(rest.start(), format!("{} cells need '<== expr'", kind)));
            };
            sheet.add_cell(kind, name, expr_position, Some(expr))
        }
    }
}

fn split(
    compiled: Option<(Expression, LinePosition)>,
    fallback: &LinePosition,
) -> (Option<Expression>, LinePosition) {
    match compiled {
        Some((expression, position)) => (Some(expression), position),
        None => (None, fallback.clone()),
    }
}

fn parse_relation(
    sheet: &mut Sheet,
    at: &Locator<'_>,
    guard: Option<regex::Match<'_>>,
    body: Option<regex::Match<'_>>,
) -> Result<()> {
    let position = at.position(at.text.len() - at.text.trim_start().len());
    let guard = match guard {
        Some(g) => Some(at.compile(g.as_str(), g.start())?.0),
        None => None,
    };
    let Some(body) = body else {
        return Err(at.error(position.column.saturating_sub(1), "Expected '{ terms }'"));
    };

    let mut terms = Vec::new();
    for (offset, term) in split_top_level(body.as_str(), ';') {
        if term.trim().is_empty() {
            continue;
        }
        let offset = body.start() + offset;
        let Some(arrow) = find_top_level(term, ARROW) else {
            return Err(at.error(offset, "Expected 'names <== expression' in relate term"));
        };
        let mut names = Vec::new();
        for name in term[..arrow].split(',') {
            let name = name.trim();
            if !identifier_regex().is_match(name) {
                return Err(at.error(
                    offset,
                    format!("Invalid cell name '{}' in relate term", name),
                ));
            }
            names.push(Name::new(name));
        }
        let start = arrow + ARROW.len();
        let (expression, _) = at.compile(&term[start..], offset + start)?;
        terms.push(RelateTerm::multi(names, expression));
    }
    sheet.add_relation(position, guard, terms)
}

/// Byte offset of the first `needle` outside quotes.
fn find_top_level(text: &str, needle: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (i, ch) in text.char_indices() {
        match quote {
            Some(q) => {
                if escaped {
                    escaped = false;
                } else if ch == '\\' {
                    escaped = true;
                } else if ch == q {
                    quote = None;
                }
            }
            None if ch == '"' || ch == '\'' => quote = Some(ch),
            None if text[i..].starts_with(needle) => return Some(i),
            None => {}
        }
    }
    None
}

/// Split on `separator` outside quotes and brackets, keeping each piece's
/// byte offset.
fn split_top_level(text: &str, separator: char) -> Vec<(usize, &str)> {
    let mut pieces = Vec::new();
    let mut start = 0;
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (i, ch) in text.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            '"' | '\'' => quote = Some(ch),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            c if c == separator && depth == 0 => {
                pieces.push((start, &text[start..i]));
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    pieces.push((start, &text[start..]));
    pieces
}
