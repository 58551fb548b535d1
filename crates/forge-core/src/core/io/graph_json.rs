use crate::core::models::graph::{Graph, GraphError};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GraphJsonError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Malformed graph JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Graph is inconsistent: {0}")]
    Inconsistent(#[from] GraphError),
}

/// Parses a graph and checks that its attachment-point usage is consistent.
pub fn from_str(text: &str) -> Result<Graph, GraphJsonError> {
    let graph: Graph = serde_json::from_str(text)?;
    graph.check_ap_exclusivity()?;
    Ok(graph)
}

pub fn to_string(graph: &Graph) -> Result<String, GraphJsonError> {
    Ok(serde_json::to_string(graph)?)
}

pub fn read_from_path<P: AsRef<Path>>(path: P) -> Result<Graph, GraphJsonError> {
    let reader = BufReader::new(File::open(path)?);
    let graph: Graph = serde_json::from_reader(reader)?;
    graph.check_ap_exclusivity()?;
    Ok(graph)
}

pub fn write_to_path<P: AsRef<Path>>(graph: &Graph, path: P) -> Result<(), GraphJsonError> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, graph)?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::chem::bond::BondType;
    use crate::core::models::attachment_point::{ApRef, AttachmentPoint};
    use crate::core::models::ids::{GraphId, VertexId};
    use crate::core::models::vertex::{BuildingBlockType, Vertex};

    fn two_vertex_graph() -> Graph {
        let mut g = Graph::new(GraphId(9));
        let mut s = Vertex::new(VertexId(0), BuildingBlockType::Scaffold);
        s.aps.push(AttachmentPoint::new(VertexId(0), 0, Some("x:0".parse().unwrap())));
        let mut f = Vertex::new(VertexId(0), BuildingBlockType::Fragment);
        f.aps.push(AttachmentPoint::new(VertexId(0), 0, Some("x:1".parse().unwrap())));
        let root = g.add_vertex(s);
        g.append_vertex_on_ap(ApRef::new(root, 0), f, 0, BondType::Double)
            .unwrap();
        g
    }

    #[test]
    fn graph_survives_a_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("g.json");
        let g = two_vertex_graph();
        write_to_path(&g, &path).unwrap();
        assert_eq!(read_from_path(&path).unwrap(), g);
    }

    #[test]
    fn inconsistent_ap_flags_are_rejected() {
        let g = two_vertex_graph();
        let text = to_string(&g).unwrap().replacen("\"in_use\":true", "\"in_use\":false", 1);
        assert!(matches!(from_str(&text), Err(GraphJsonError::Inconsistent(_))));
    }
}
