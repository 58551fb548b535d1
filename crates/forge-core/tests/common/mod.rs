#![allow(dead_code)]

use fragforge::core::fitness::DescriptorSpec;
use std::fs;
use std::path::{Path, PathBuf};

/// A methylene scaffold with two symmetric attachment points and two
/// single-AP fragments: every level-1 molecule is either HOCH2OH or propane.
pub const SPACE: &str = r#"
[[scaffolds]]
name = "methylene"
atoms = [
  { element = "C", position = [0.0, 0.0, 0.0] },
  { element = "H", position = [-0.6, 0.9, 0.0] },
  { element = "H", position = [-0.6, -0.9, 0.0] },
]
bonds = [{ atoms = [0, 1] }, { atoms = [0, 2] }]
attachment-points = [
  { atom = 0, class = "c:0", direction = [1.5, 0.0, 0.0] },
  { atom = 0, class = "c:0", direction = [0.0, 0.0, 1.5] },
]
symmetric-aps = [[0, 1]]

[[fragments]]
name = "hydroxyl"
atoms = [
  { element = "O", position = [0.0, 0.0, 0.0] },
  { element = "H", position = [0.96, 0.0, 0.0] },
]
bonds = [{ atoms = [0, 1] }]
attachment-points = [{ atom = 0, class = "f:0", direction = [-1.4, 0.0, 0.0] }]

[[fragments]]
name = "methyl"
atoms = [
  { element = "C", position = [0.0, 0.0, 0.0] },
  { element = "H", position = [0.6, 0.9, 0.0] },
  { element = "H", position = [0.6, -0.9, 0.0] },
  { element = "H", position = [0.6, 0.0, 0.9] },
]
bonds = [{ atoms = [0, 1] }, { atoms = [0, 2] }, { atoms = [0, 3] }]
attachment-points = [{ atom = 0, class = "f:0", direction = [-1.5, 0.0, 0.0] }]

[compatibility]
"c:0" = ["f:0"]
"#;

pub fn write_space(dir: &Path) -> PathBuf {
    let path = dir.join("space.toml");
    fs::write(&path, SPACE).unwrap();
    path
}

pub fn atoms_descriptor() -> DescriptorSpec {
    DescriptorSpec {
        variable: "atoms".into(),
        descriptor: "nAtoms".into(),
        pattern: None,
        result_index: None,
    }
}

/// Writes an `sh` script that copies its input to its output and appends
/// the given data item to the record.
#[cfg(unix)]
pub fn write_tagging_script(dir: &Path, tag: &str, value: &str) -> PathBuf {
    let path = dir.join("score.sh");
    let script = format!(
        "awk '/^\\$\\$\\$\\$/ {{ print \"> <{tag}>\"; print \"{value}\"; print \"\" }} {{ print }}' \"$1\" > \"$2\"\n"
    );
    fs::write(&path, script).unwrap();
    path
}
