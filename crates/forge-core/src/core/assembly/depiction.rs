use super::{DepictionError, DepictionRenderer};
use crate::core::chem::bond::BondType;
use crate::core::chem::element;
use crate::core::chem::structure::ChemicalStructure;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

const SCALE: f64 = 40.0;
const MARGIN: f64 = 30.0;

/// Flat projection of the x/y coordinates into an SVG drawing. Carbon labels
/// are omitted, as usual for skeletal formulas.
#[derive(Debug, Clone, Copy, Default)]
pub struct SvgDepiction;

impl DepictionRenderer for SvgDepiction {
    fn render(&self, structure: &ChemicalStructure, path: &Path) -> Result<(), DepictionError> {
        let (drawn, _) = structure.retain_atoms(|a| element::is_real_atom(&a.symbol));
        if drawn.is_empty() {
            return Err(DepictionError::EmptyStructure);
        }

        let xs = drawn.atoms().iter().map(|a| a.position.x);
        let ys = drawn.atoms().iter().map(|a| a.position.y);
        let (min_x, max_x) = xs.fold((f64::MAX, f64::MIN), |(lo, hi), x| (lo.min(x), hi.max(x)));
        let (min_y, max_y) = ys.fold((f64::MAX, f64::MIN), |(lo, hi), y| (lo.min(y), hi.max(y)));
        let width = (max_x - min_x) * SCALE + 2.0 * MARGIN;
        let height = (max_y - min_y) * SCALE + 2.0 * MARGIN;
        // SVG's y axis points down.
        let project = |i: usize| {
            let p = drawn.atoms()[i].position;
            ((p.x - min_x) * SCALE + MARGIN, (max_y - p.y) * SCALE + MARGIN)
        };

        let mut out = BufWriter::new(File::create(path)?);
        writeln!(
            out,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{width:.0}" height="{height:.0}" viewBox="0 0 {width:.1} {height:.1}">"#
        )?;
        writeln!(out, r#"<rect width="100%" height="100%" fill="white"/>"#)?;
        for bond in drawn.bonds() {
            let (x1, y1) = project(bond.atom1);
            let (x2, y2) = project(bond.atom2);
            let strokes = match bond.bond_type {
                BondType::Double => 2,
                BondType::Triple => 3,
                _ => 1,
            };
            let (dx, dy) = (x2 - x1, y2 - y1);
            let len = (dx * dx + dy * dy).sqrt().max(f64::EPSILON);
            let (nx, ny) = (-dy / len * 3.0, dx / len * 3.0);
            for k in 0..strokes {
                let off = k as f64 - (strokes - 1) as f64 / 2.0;
                writeln!(
                    out,
                    r#"<line x1="{:.1}" y1="{:.1}" x2="{:.1}" y2="{:.1}" stroke="black" stroke-width="1.5"/>"#,
                    x1 + nx * off,
                    y1 + ny * off,
                    x2 + nx * off,
                    y2 + ny * off
                )?;
            }
        }
        for (i, atom) in drawn.atoms().iter().enumerate() {
            if atom.symbol == "C" {
                continue;
            }
            let (x, y) = project(i);
            writeln!(
                out,
                r#"<circle cx="{x:.1}" cy="{y:.1}" r="8" fill="white"/><text x="{x:.1}" y="{:.1}" font-family="sans-serif" font-size="12" text-anchor="middle">{}</text>"#,
                y + 4.0,
                atom.symbol
            )?;
        }
        writeln!(out, "</svg>")?;
        out.flush()?;
        Ok(())
    }
}
