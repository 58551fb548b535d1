use crate::core::chem::bond::BondType;
use crate::core::chem::structure::{Atom, ChemicalStructure};
use crate::core::io::traits::ChemicalFile;
use nalgebra::Point3;
use std::io::{self, BufRead, Write};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SdfError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Parse error on line {line}: {kind}")]
    Parse { line: usize, kind: SdfParseErrorKind },
    #[error("Record ended before {0}")]
    Truncated(&'static str),
}

#[derive(Debug, Error)]
pub enum SdfParseErrorKind {
    #[error("Invalid integer in columns {columns} (value: '{value}')")]
    InvalidInt { columns: &'static str, value: String },
    #[error("Invalid float in columns {columns} (value: '{value}')")]
    InvalidFloat { columns: &'static str, value: String },
    #[error("Bond references atom {0}, which does not exist")]
    BondAtomOutOfRange(usize),
    #[error("Malformed data item header")]
    MalformedDataHeader,
}

const PROGRAM_LINE: &str = "  fragforge         3D";

fn slice_and_trim(line: &str, start: usize, end: usize) -> &str {
    line.get(start..end.min(line.len())).unwrap_or("").trim()
}

fn parse_usize(line: &str, line_num: usize, start: usize, end: usize, columns: &'static str) -> Result<usize, SdfError> {
    let value = slice_and_trim(line, start, end);
    value.parse().map_err(|_| SdfError::Parse {
        line: line_num,
        kind: SdfParseErrorKind::InvalidInt {
            columns,
            value: value.to_string(),
        },
    })
}

fn parse_f64(line: &str, line_num: usize, start: usize, end: usize, columns: &'static str) -> Result<f64, SdfError> {
    let value = slice_and_trim(line, start, end);
    value.parse().map_err(|_| SdfError::Parse {
        line: line_num,
        kind: SdfParseErrorKind::InvalidFloat {
            columns,
            value: value.to_string(),
        },
    })
}

/// MDL SD files (V2000 connection tables followed by `> <TAG>` data items).
pub struct SdfFile;

struct LineCursor<I> {
    lines: I,
    line_num: usize,
}

impl<I: Iterator<Item = io::Result<String>>> LineCursor<I> {
    fn next_line(&mut self) -> Result<Option<String>, SdfError> {
        match self.lines.next() {
            Some(line) => {
                self.line_num += 1;
                Ok(Some(line?))
            }
            None => Ok(None),
        }
    }

    fn expect_line(&mut self, what: &'static str) -> Result<String, SdfError> {
        self.next_line()?.ok_or(SdfError::Truncated(what))
    }
}

impl SdfFile {
    fn read_record<I>(cursor: &mut LineCursor<I>, title: String) -> Result<ChemicalStructure, SdfError>
    where
        I: Iterator<Item = io::Result<String>>,
    {
        let mut structure = ChemicalStructure::new(title.trim());
        cursor.expect_line("program line")?;
        cursor.expect_line("comment line")?;
        let counts = cursor.expect_line("counts line")?;
        let line_num = cursor.line_num;
        let n_atoms = parse_usize(&counts, line_num, 0, 3, "1-3")?;
        let n_bonds = parse_usize(&counts, line_num, 3, 6, "4-6")?;

        for _ in 0..n_atoms {
            let line = cursor.expect_line("atom block end")?;
            let n = cursor.line_num;
            let x = parse_f64(&line, n, 0, 10, "1-10")?;
            let y = parse_f64(&line, n, 10, 20, "11-20")?;
            let z = parse_f64(&line, n, 20, 30, "21-30")?;
            let symbol = slice_and_trim(&line, 31, 34);
            structure.add_atom(Atom::new(symbol, Point3::new(x, y, z)));
        }

        for _ in 0..n_bonds {
            let line = cursor.expect_line("bond block end")?;
            let n = cursor.line_num;
            let a = parse_usize(&line, n, 0, 3, "1-3")?;
            let b = parse_usize(&line, n, 3, 6, "4-6")?;
            let code = parse_usize(&line, n, 6, 9, "7-9")?;
            for index in [a, b] {
                if index == 0 || index > n_atoms {
                    return Err(SdfError::Parse {
                        line: n,
                        kind: SdfParseErrorKind::BondAtomOutOfRange(index),
                    });
                }
            }
            let bond_type = u8::try_from(code).map_or(BondType::Undefined, BondType::from_mdl_code);
            structure.add_bond(a - 1, b - 1, bond_type);
        }

        // Property block, data items, record terminator.
        let mut in_properties = true;
        while let Some(line) = cursor.next_line()? {
            if line.starts_with("$$$$") {
                return Ok(structure);
            }
            if in_properties {
                if line.starts_with("M  END") {
                    in_properties = false;
                }
                continue;
            }
            if line.starts_with('>') {
                let tag = line
                    .split_once('<')
                    .and_then(|(_, rest)| rest.split_once('>'))
                    .map(|(tag, _)| tag.to_string())
                    .ok_or(SdfError::Parse {
                        line: cursor.line_num,
                        kind: SdfParseErrorKind::MalformedDataHeader,
                    })?;
                let mut value_lines = Vec::new();
                let mut terminated = false;
                while let Some(value) = cursor.next_line()? {
                    if value.trim().is_empty() {
                        break;
                    }
                    if value.starts_with("$$$$") {
                        terminated = true;
                        break;
                    }
                    value_lines.push(value);
                }
                structure.set_property(&tag, value_lines.join("\n"));
                if terminated {
                    return Ok(structure);
                }
            }
        }
        // A final record without `$$$$` is accepted.
        if in_properties {
            return Err(SdfError::Truncated("M  END"));
        }
        Ok(structure)
    }

    fn write_record(structure: &ChemicalStructure, writer: &mut impl Write) -> io::Result<()> {
        writeln!(writer, "{}", structure.title.lines().next().unwrap_or(""))?;
        writeln!(writer, "{PROGRAM_LINE}")?;
        writeln!(writer)?;
        writeln!(
            writer,
            "{:>3}{:>3}  0  0  0  0  0  0  0  0999 V2000",
            structure.atom_count(),
            structure.bond_count()
        )?;
        for atom in structure.atoms() {
            writeln!(
                writer,
                "{:>10.4}{:>10.4}{:>10.4} {:<3} 0  0  0  0  0  0  0  0  0  0  0  0",
                atom.position.x, atom.position.y, atom.position.z, atom.symbol
            )?;
        }
        for bond in structure.bonds() {
            writeln!(
                writer,
                "{:>3}{:>3}{:>3}  0",
                bond.atom1 + 1,
                bond.atom2 + 1,
                bond.bond_type.mdl_code()
            )?;
        }
        writeln!(writer, "M  END")?;
        for (tag, value) in structure.properties() {
            writeln!(writer, "> <{tag}>")?;
            for line in value.lines() {
                writeln!(writer, "{line}")?;
            }
            writeln!(writer)?;
        }
        writeln!(writer, "$$$$")
    }
}

impl ChemicalFile for SdfFile {
    type Error = SdfError;

    fn read_from(reader: &mut impl BufRead) -> Result<Vec<ChemicalStructure>, Self::Error> {
        let mut cursor = LineCursor {
            lines: reader.lines(),
            line_num: 0,
        };
        let mut structures = Vec::new();
        while let Some(title) = cursor.next_line()? {
            // Blank lines after a terminated record are padding, not titles.
            if title.trim().is_empty() && !structures.is_empty() {
                continue;
            }
            structures.push(Self::read_record(&mut cursor, title)?);
        }
        Ok(structures)
    }

    fn write_to(
        structures: &[ChemicalStructure],
        writer: &mut impl Write,
    ) -> Result<(), Self::Error> {
        for structure in structures {
            Self::write_record(structure, writer)?;
        }
        Ok(())
    }
}
