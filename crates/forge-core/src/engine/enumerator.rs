use super::error::EngineError;
use crate::core::fragspace::{FragmentChoice, FragmentSpace};
use crate::core::models::attachment_point::{ApClass, ApRef};
use crate::core::models::graph::Graph;
use crate::core::models::ids::VertexId;

/// Indices into the option lists of every slot; identifies one combination.
pub type CombinationPointer = Vec<usize>;

/// A group of free APs that receive the same building block. Symmetric APs
/// of one vertex, and matching APs of symmetric vertices, share a slot.
#[derive(Debug, Clone, PartialEq)]
pub struct Slot {
    pub aps: Vec<ApRef>,
    pub class: ApClass,
    /// `None` leaves the APs free.
    pub options: Vec<Option<FragmentChoice>>,
}

/// One building block to attach on one AP of the root graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attachment {
    pub parent: ApRef,
    pub choice: FragmentChoice,
    /// Index of the slot; vertices attached through the same slot are
    /// symmetric to each other.
    pub symmetry_group: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Combination {
    pub pointer: CombinationPointer,
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotKey {
    Single(VertexId, usize),
    Group(VertexId, usize),
}

/// Lazily walks every combination of building blocks for the free APs of a
/// root graph, like an odometer whose wheels are the slots.
#[derive(Debug, Clone)]
pub struct CombinationEnumerator {
    slots: Vec<Slot>,
    next: Option<CombinationPointer>,
}

impl CombinationEnumerator {
    /// Prepares the slots of `root`.
    ///
    /// # Errors
    ///
    /// Fails with a configuration error when an AP that must not stay free
    /// (it needs a capping group or its class is a forbidden end) has
    /// nothing compatible in the fragment space.
    pub fn new(root: &Graph, space: &FragmentSpace) -> Result<Self, EngineError> {
        let mut keyed: Vec<(SlotKey, Vec<ApRef>)> = Vec::new();
        for ap_ref in root.free_aps() {
            let Some(vertex) = root.vertex(ap_ref.vertex) else {
                continue;
            };
            if vertex.is_ring_closing() {
                continue;
            }
            let owner = root
                .symmetric_set_of(ap_ref.vertex)
                .and_then(|s| s.iter().next())
                .unwrap_or(ap_ref.vertex);
            let key = match vertex.symmetry_group_of(ap_ref.ap) {
                Some(group) => SlotKey::Group(owner, group),
                None => SlotKey::Single(owner, ap_ref.ap),
            };
            match keyed.iter_mut().find(|(k, _)| *k == key) {
                Some((_, aps)) => aps.push(ap_ref),
                None => keyed.push((key, vec![ap_ref])),
            }
        }

        let mut slots = Vec::with_capacity(keyed.len());
        for (_, aps) in keyed {
            let Some(class) = root.ap(aps[0]).and_then(|ap| ap.class.clone()) else {
                continue;
            };
            let mut options: Vec<Option<FragmentChoice>> = space
                .compatible_fragments(&class)
                .into_iter()
                .map(Some)
                .collect();
            if let Some(cap) = space.cap_choice(&class) {
                options.push(Some(cap));
            }
            let mandatory = space.requires_cap(&class) || space.is_forbidden_end(&class);
            if options.is_empty() && mandatory {
                return Err(EngineError::Configuration(format!(
                    "attachment point {} of class '{class}' must be used but nothing in the fragment space is compatible with it",
                    aps[0]
                )));
            }
            if !mandatory {
                options.push(None);
            }
            if options.iter().all(Option::is_none) {
                continue;
            }
            slots.push(Slot { aps, class, options });
        }

        let next = (!slots.is_empty()).then(|| vec![0; slots.len()]);
        Ok(Self { slots, next })
    }

    /// Continues from a saved pointer instead of the first combination.
    pub fn starting_at(mut self, pointer: CombinationPointer) -> Result<Self, EngineError> {
        let fits = pointer.len() == self.slots.len()
            && pointer.iter().zip(&self.slots).all(|(&i, s)| i < s.options.len());
        if !fits {
            return Err(EngineError::Configuration(format!(
                "combination pointer {pointer:?} does not fit the {} slots of this graph",
                self.slots.len()
            )));
        }
        self.next = Some(pointer);
        Ok(self)
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    /// Pointer of the next combination to be produced; `None` once the
    /// enumeration is over.
    pub fn pointer(&self) -> Option<&[usize]> {
        self.next.as_deref()
    }

    /// Size of the full combination space, the all-free combination included.
    pub fn total(&self) -> u128 {
        if self.slots.is_empty() {
            return 0;
        }
        self.slots.iter().map(|s| s.options.len() as u128).product()
    }

    fn advance(&self, pointer: &[usize]) -> Option<CombinationPointer> {
        let mut next = pointer.to_vec();
        for (i, slot) in self.slots.iter().enumerate().rev() {
            next[i] += 1;
            if next[i] < slot.options.len() {
                return Some(next);
            }
            next[i] = 0;
        }
        None
    }

    fn materialize(&self, pointer: &[usize]) -> Vec<Attachment> {
        let mut attachments = Vec::new();
        for (group, (slot, &i)) in self.slots.iter().zip(pointer).enumerate() {
            if let Some(choice) = slot.options[i] {
                attachments.extend(slot.aps.iter().map(|&parent| Attachment {
                    parent,
                    choice,
                    symmetry_group: group,
                }));
            }
        }
        attachments
    }
}

impl Iterator for CombinationEnumerator {
    type Item = Combination;

    fn next(&mut self) -> Option<Combination> {
        loop {
            let pointer = self.next.take()?;
            self.next = self.advance(&pointer);
            let attachments = self.materialize(&pointer);
            // Leaving every AP free would only reproduce the root.
            if !attachments.is_empty() {
                return Some(Combination {
                    pointer,
                    attachments,
                });
            }
        }
    }
}
