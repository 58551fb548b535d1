use super::context::RunContext;
use super::error::EngineError;
use crate::core::chem::element::element_data;
use crate::core::chem::structure::ChemicalStructure;
use crate::core::models::graph::Graph;
use tracing::debug;

/// What validation learned about an acceptable graph.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationPayload {
    pub structure: ChemicalStructure,
    pub uid: String,
    pub smiles: String,
}

fn reject(graph: &Graph, reason: &str) -> Result<Option<ValidationPayload>, EngineError> {
    debug!(graph = %graph.id(), reason, "Graph rejected");
    Ok(None)
}

/// Index of the first atom bonded beyond the highest valence of its element.
fn overvalent_atom(structure: &ChemicalStructure) -> Option<usize> {
    (0..structure.atom_count()).find(|&i| {
        structure
            .atom(i)
            .and_then(|a| element_data(&a.symbol))
            .is_some_and(|d| structure.bond_order_sum(i) > u32::from(d.max_valence))
    })
}

/// Decides whether `graph` is an acceptable molecule (or intermediate).
///
/// Returns `Ok(None)` for graphs that must be discarded: broken tree shape
/// or AP bookkeeping, free APs whose class may never stay unused, limits on
/// size or weight exceeded, atoms over their valence, or a structure that
/// cannot be assembled at all. Errors are reserved for failures of the run
/// itself, such as cancellation.
pub fn check_consistency(graph: &Graph, ctx: &RunContext) -> Result<Option<ValidationPayload>, EngineError> {
    ctx.token.check()?;
    if !graph.is_tree() {
        return reject(graph, "not a tree");
    }
    if let Err(e) = graph.check_ap_exclusivity() {
        return reject(graph, &e.to_string());
    }
    let forbidden_end = graph.free_aps().into_iter().any(|r| {
        graph
            .ap(r)
            .and_then(|ap| ap.class.as_ref())
            .is_some_and(|c| ctx.space.is_forbidden_end(c))
    });
    if forbidden_end {
        return reject(graph, "free attachment point of a forbidden-end class");
    }

    let limits = &ctx.options.constraints;
    if let Some(max) = limits.max_heavy_atoms {
        if graph.heavy_atom_count() > max {
            return reject(graph, "too many heavy atoms");
        }
    }

    let structure = match ctx.assemble(graph, false) {
        Ok(s) => s,
        Err(e) => return reject(graph, &format!("assembly failed: {e}")),
    };
    if let Some(max) = limits.max_molecular_weight {
        if structure.molecular_weight() > max {
            return reject(graph, "molecular weight above limit");
        }
    }
    if let Some(atom) = overvalent_atom(&structure) {
        return reject(graph, &format!("atom {} exceeds its valence", atom + 1));
    }

    let (smiles, uid) = ctx.describe(&structure);
    Ok(Some(ValidationPayload {
        structure,
        uid,
        smiles,
    }))
}
