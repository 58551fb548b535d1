use crate::core::chem::structure::ChemicalStructure;
use std::error::Error;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Defines the interface for reading and writing chemical structure files.
///
/// A file holds an ordered sequence of structures. Implementors handle the
/// format-specific parsing and serialization; the path-based helpers are
/// provided on top of the reader/writer methods.
pub trait ChemicalFile {
    /// The error type for I/O and parsing failures.
    type Error: Error + From<io::Error>;

    /// Reads every structure available from a buffered reader.
    ///
    /// # Errors
    ///
    /// Returns an error if parsing fails or the reader fails.
    fn read_from(reader: &mut impl BufRead) -> Result<Vec<ChemicalStructure>, Self::Error>;

    /// Writes the structures, in order, to a writer.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    fn write_to(
        structures: &[ChemicalStructure],
        writer: &mut impl Write,
    ) -> Result<(), Self::Error>;

    fn read_from_path<P: AsRef<Path>>(path: P) -> Result<Vec<ChemicalStructure>, Self::Error> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        Self::read_from(&mut reader)
    }

    fn write_to_path<P: AsRef<Path>>(
        structures: &[ChemicalStructure],
        path: P,
    ) -> Result<(), Self::Error> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        Self::write_to(structures, &mut writer)?;
        writer.flush()?;
        Ok(())
    }

    /// Writes a single structure to a file path.
    fn write_one_to_path<P: AsRef<Path>>(
        structure: &ChemicalStructure,
        path: P,
    ) -> Result<(), Self::Error> {
        Self::write_to_path(std::slice::from_ref(structure), path)
    }
}
