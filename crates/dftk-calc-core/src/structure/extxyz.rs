use super::Structure;
use crate::common::elements::atomic_number_for_symbol;
use std::fmt::Write as _;

const SUPPORTED_PROPERTIES: &str = "species:S:1:pos:R:3";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StructureTextError {
    #[error("structure text is empty")]
    Empty,
    #[error("line 1: invalid atom count '{0}'")]
    InvalidAtomCount(String),
    #[error("line 2: missing Lattice entry")]
    MissingLattice,
    #[error("line 2: invalid Lattice entry '{0}'; expected nine numbers")]
    InvalidLattice(String),
    #[error("line 2: invalid pbc entry '{0}'; expected three of T/F")]
    InvalidPbc(String),
    #[error("line 2: unsupported Properties '{0}'; only 'species:S:1:pos:R:3' is understood")]
    UnsupportedProperties(String),
    #[error("line 2: unterminated quoted value")]
    UnterminatedQuote,
    #[error("expected {expected} atom lines, found {found}")]
    TruncatedAtoms { expected: usize, found: usize },
    #[error("line {line}: {reason}")]
    InvalidAtomLine { line: usize, reason: String },
    #[error("structure is invalid: {0}")]
    InvalidStructure(String),
}

pub fn write_extxyz(structure: &Structure) -> String {
    let mut text = String::new();
    let lattice = structure
        .cell()
        .iter()
        .flatten()
        .map(|value| value.to_string())
        .collect::<Vec<_>>()
        .join(" ");
    let pbc = structure
        .pbc()
        .iter()
        .map(|flag| if *flag { "T" } else { "F" })
        .collect::<Vec<_>>()
        .join(" ");

    let _ = writeln!(text, "{}", structure.len());
    let _ = writeln!(
        text,
        "Lattice=\"{}\" Properties={} pbc=\"{}\"",
        lattice, SUPPORTED_PROPERTIES, pbc
    );
    for (symbol, position) in structure.symbols().iter().zip(structure.positions()) {
        let _ = writeln!(
            text,
            "{} {} {} {}",
            symbol, position[0], position[1], position[2]
        );
    }
    text
}

pub fn parse_extxyz(source: &str) -> Result<Structure, StructureTextError> {
    let mut lines = source.lines();
    let count_line = lines.next().ok_or(StructureTextError::Empty)?;
    if count_line.trim().is_empty() {
        return Err(StructureTextError::Empty);
    }
    let count = count_line
        .trim()
        .parse::<usize>()
        .map_err(|_| StructureTextError::InvalidAtomCount(count_line.trim().to_string()))?;

    let comment = lines.next().unwrap_or_default();
    let fields = parse_comment_fields(comment)?;

    let mut cell = None;
    let mut pbc = [true; 3];
    for (key, value) in &fields {
        match key.to_ascii_lowercase().as_str() {
            "lattice" => cell = Some(parse_lattice(value)?),
            "pbc" => pbc = parse_pbc(value)?,
            "properties" => {
                if !value.eq_ignore_ascii_case(SUPPORTED_PROPERTIES) {
                    return Err(StructureTextError::UnsupportedProperties(value.clone()));
                }
            }
            _ => {}
        }
    }
    let cell = cell.ok_or(StructureTextError::MissingLattice)?;

    let mut numbers = Vec::with_capacity(count);
    let mut positions = Vec::with_capacity(count);
    for (offset, line) in lines.take(count).enumerate() {
        let line_number = offset + 3;
        let (number, position) = parse_atom_line(line, line_number)?;
        numbers.push(number);
        positions.push(position);
    }
    if numbers.len() != count {
        return Err(StructureTextError::TruncatedAtoms {
            expected: count,
            found: numbers.len(),
        });
    }

    Structure::new(numbers, positions, cell)
        .map(|structure| structure.with_pbc(pbc))
        .map_err(|error| StructureTextError::InvalidStructure(error.message().to_string()))
}

fn parse_comment_fields(comment: &str) -> Result<Vec<(String, String)>, StructureTextError> {
    let mut fields = Vec::new();
    let mut chars = comment.chars().peekable();

    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        if chars.peek().is_none() {
            break;
        }

        let mut key = String::new();
        while let Some(c) = chars.next_if(|c| *c != '=' && !c.is_whitespace()) {
            key.push(c);
        }

        let mut value = String::new();
        if chars.next_if_eq(&'=').is_some() {
            if chars.next_if_eq(&'"').is_some() {
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some(c) => value.push(c),
                        None => return Err(StructureTextError::UnterminatedQuote),
                    }
                }
            } else {
                while let Some(c) = chars.next_if(|c| !c.is_whitespace()) {
                    value.push(c);
                }
            }
        }
        fields.push((key, value));
    }

    Ok(fields)
}

fn parse_lattice(value: &str) -> Result<[[f64; 3]; 3], StructureTextError> {
    let numbers = value
        .split_whitespace()
        .map(str::parse::<f64>)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| StructureTextError::InvalidLattice(value.to_string()))?;
    if numbers.len() != 9 {
        return Err(StructureTextError::InvalidLattice(value.to_string()));
    }

    let mut cell = [[0.0; 3]; 3];
    for (index, number) in numbers.into_iter().enumerate() {
        cell[index / 3][index % 3] = number;
    }
    Ok(cell)
}

fn parse_pbc(value: &str) -> Result<[bool; 3], StructureTextError> {
    let flags = value
        .split_whitespace()
        .map(|token| match token {
            "T" | "t" | "True" | "true" => Ok(true),
            "F" | "f" | "False" | "false" => Ok(false),
            _ => Err(StructureTextError::InvalidPbc(value.to_string())),
        })
        .collect::<Result<Vec<_>, _>>()?;

    flags
        .try_into()
        .map_err(|_| StructureTextError::InvalidPbc(value.to_string()))
}

fn parse_atom_line(line: &str, line_number: usize) -> Result<(usize, [f64; 3]), StructureTextError> {
    let tokens = line.split_whitespace().collect::<Vec<_>>();
    if tokens.len() < 4 {
        return Err(StructureTextError::InvalidAtomLine {
            line: line_number,
            reason: format!("expected 'symbol x y z', found '{}'", line.trim()),
        });
    }

    let number =
        atomic_number_for_symbol(tokens[0]).ok_or_else(|| StructureTextError::InvalidAtomLine {
            line: line_number,
            reason: format!("unknown element symbol '{}'", tokens[0]),
        })?;

    let mut position = [0.0; 3];
    for (axis, token) in tokens[1..4].iter().enumerate() {
        position[axis] = token
            .parse::<f64>()
            .map_err(|_| StructureTextError::InvalidAtomLine {
                line: line_number,
                reason: format!("invalid coordinate '{}'", token),
            })?;
    }
    Ok((number, position))
}

#[cfg(test)]
mod tests {
    use super::{StructureTextError, parse_extxyz, write_extxyz};
    use crate::structure::Structure;

    fn silicon_pair() -> Structure {
        Structure::from_symbols(
            &["Si", "Si"],
            vec![[0.0, 0.0, 0.0], [1.3575, 1.3575, 1.3575]],
            [[0.0, 2.715, 2.715], [2.715, 0.0, 2.715], [2.715, 2.715, 0.0]],
        )
        .expect("structure should build")
    }

    #[test]
    fn written_text_uses_extended_xyz_header() {
        let text = write_extxyz(&silicon_pair());
        let lines = text.lines().collect::<Vec<_>>();

        assert_eq!(lines[0], "2");
        assert_eq!(
            lines[1],
            "Lattice=\"0 2.715 2.715 2.715 0 2.715 2.715 2.715 0\" \
             Properties=species:S:1:pos:R:3 pbc=\"T T T\""
        );
        assert_eq!(lines[3], "Si 1.3575 1.3575 1.3575");
    }

    #[test]
    fn parsed_structure_matches_written_structure() {
        let structure = silicon_pair().with_pbc([true, true, false]);
        let parsed = parse_extxyz(&write_extxyz(&structure)).expect("text should parse");
        assert_eq!(parsed, structure);
    }

    #[test]
    fn parser_accepts_foreign_comment_fields() {
        let text = "1\nenergy=-3.5 Lattice=\"4 0 0 0 4 0 0 0 4\" name=probe\nH 0.5 0.5 0.5 extra\n";
        let parsed = parse_extxyz(text).expect("text should parse");
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed.numbers(), &[1]);
        assert_eq!(parsed.pbc(), [true; 3]);
    }

    #[test]
    fn malformed_text_is_reported_with_location() {
        assert_eq!(parse_extxyz(""), Err(StructureTextError::Empty));
        assert_eq!(
            parse_extxyz("two\n"),
            Err(StructureTextError::InvalidAtomCount("two".to_string()))
        );
        assert_eq!(
            parse_extxyz("1\npbc=\"T T T\"\nH 0 0 0\n"),
            Err(StructureTextError::MissingLattice)
        );
        assert_eq!(
            parse_extxyz("2\nLattice=\"1 0 0 0 1 0 0 0 1\"\nH 0 0 0\n"),
            Err(StructureTextError::TruncatedAtoms {
                expected: 2,
                found: 1
            })
        );
        assert!(matches!(
            parse_extxyz("1\nLattice=\"1 0 0 0 1 0 0 0 1\"\nH 0 zero 0\n"),
            Err(StructureTextError::InvalidAtomLine { line: 3, .. })
        ));
        assert_eq!(
            parse_extxyz("1\nLattice=\"1 0 0\n"),
            Err(StructureTextError::UnterminatedQuote)
        );
    }
}
