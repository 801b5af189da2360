//! Per-invocation blueprint context.

use std::cell::Cell;

use onair_core::{hash_id, Error, PartId, Result, RundownId, StudioId};

/// Which blueprint entry point the context was built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextKind {
    Baseline,
    Part,
    AdLib,
}

/// A note left by the blueprint for the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Note {
    pub message: String,
    pub part_id: Option<PartId>,
}

/// Read-only facts about the invocation plus a few capabilities.
///
/// One value is built for each blueprint call and dropped afterwards.
#[derive(Debug)]
pub struct BlueprintContext {
    kind: ContextKind,
    studio_id: StudioId,
    rundown_id: RundownId,
    part_id: Option<PartId>,
    notes: Vec<Note>,
    hash_counter: Cell<u32>,
}

impl BlueprintContext {
    pub fn baseline(studio_id: StudioId, rundown_id: RundownId) -> Self {
        Self::build(ContextKind::Baseline, studio_id, rundown_id, None)
    }

    pub fn part(studio_id: StudioId, rundown_id: RundownId, part_id: PartId) -> Self {
        Self::build(ContextKind::Part, studio_id, rundown_id, Some(part_id))
    }

    pub fn adlib(studio_id: StudioId, rundown_id: RundownId, part_id: PartId) -> Self {
        Self::build(ContextKind::AdLib, studio_id, rundown_id, Some(part_id))
    }

    fn build(
        kind: ContextKind,
        studio_id: StudioId,
        rundown_id: RundownId,
        part_id: Option<PartId>,
    ) -> Self {
        Self {
            kind,
            studio_id,
            rundown_id,
            part_id,
            notes: Vec::new(),
            hash_counter: Cell::new(0),
        }
    }

    pub fn kind(&self) -> ContextKind {
        self.kind
    }

    pub fn studio_id(&self) -> &StudioId {
        &self.studio_id
    }

    pub fn rundown_id(&self) -> &RundownId {
        &self.rundown_id
    }

    /// The part being generated. Not available while building the baseline.
    pub fn part_id(&self) -> Result<&PartId> {
        match (self.kind, &self.part_id) {
            (ContextKind::Part | ContextKind::AdLib, Some(id)) => Ok(id),
            _ => Err(Error::Blueprint(format!(
                "part_id is not available in a {:?} context",
                self.kind
            ))),
        }
    }

    /// Deterministic id for generated content.
    ///
    /// With `name` the id depends only on the context and the name. Without
    /// it, ids are numbered in call order, so repeated invocations over the
    /// same input produce the same ids.
    pub fn get_hash_id(&self, name: Option<&str>) -> String {
        let scope = match &self.part_id {
            Some(part) => format!("{}_{}", self.rundown_id, part),
            None => format!("{}_baseline", self.rundown_id),
        };
        match name {
            Some(name) => hash_id(&format!("{scope}_{name}")),
            None => {
                let n = self.hash_counter.get();
                self.hash_counter.set(n + 1);
                hash_id(&format!("{scope}_{n}"))
            }
        }
    }

    /// Record a warning to show the operator.
    pub fn notify_user_warning(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(rundown_id = %self.rundown_id, "Blueprint note: {}", message);
        self.notes.push(Note {
            message,
            part_id: self.part_id.clone(),
        });
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub fn into_notes(self) -> Vec<Note> {
        self.notes
    }
}
