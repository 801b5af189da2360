//! Blueprint contract and registry.
//!
//! A blueprint turns normalized ingest data into playable content: the
//! rundown baseline and the pieces and ad-libs of each part. Its output is
//! untrusted and is re-validated by [`validate_part_output`] and
//! [`validate_baseline`] before anything is persisted.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use serde::Deserialize;

use onair_core::{
    AdLibPiece, AdLibPieceId, Error, InfiniteMode, Part, Piece, PieceContent, PieceId, Result,
    Rundown, StudioId, TimelineObject, Trigger,
};

use crate::context::BlueprintContext;

// ---------------------------------------------------------------------------
// Contract
// ---------------------------------------------------------------------------

/// Content generated for one part.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlueprintOutput {
    pub pieces: Vec<Piece>,
    pub adlib_pieces: Vec<AdLibPiece>,
}

/// Show-specific content generator.
pub trait Blueprint: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Version; the registry refuses to replace a blueprint with an older one.
    fn version(&self) -> u32;

    /// Always-on objects for the rundown.
    fn get_baseline(&self, ctx: &mut BlueprintContext, rundown: &Rundown)
        -> Result<Vec<TimelineObject>>;

    /// Pieces and ad-libs for one part.
    fn get_part(&self, ctx: &mut BlueprintContext, part: &Part) -> Result<BlueprintOutput>;
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn check_object_ids<'a>(
    owner: &str,
    objects: impl IntoIterator<Item = &'a TimelineObject>,
) -> Result<()> {
    let mut seen = HashSet::new();
    for obj in objects {
        if obj.id.is_empty() {
            return Err(Error::Blueprint(format!("{owner}: timeline object without id")));
        }
        if !seen.insert(obj.id.as_str()) {
            return Err(Error::Blueprint(format!(
                "{owner}: duplicate timeline object id {}",
                obj.id
            )));
        }
    }
    Ok(())
}

/// Check the blueprint's output for `part`.
pub fn validate_part_output(part: &Part, output: &BlueprintOutput) -> Result<()> {
    let mut piece_ids = HashSet::new();
    for piece in &output.pieces {
        if piece.external_id.is_empty() {
            return Err(Error::Blueprint(format!("piece {} has no external id", piece.id)));
        }
        if piece.part_id != part.id || piece.rundown_id != part.rundown_id {
            return Err(Error::Blueprint(format!(
                "piece {} does not belong to part {}",
                piece.id, part.id
            )));
        }
        if !piece_ids.insert(&piece.id) {
            return Err(Error::Blueprint(format!("duplicate piece id {}", piece.id)));
        }
        check_object_ids(
            &format!("piece {}", piece.id),
            &piece.content.timeline_objects,
        )?;
    }

    let mut adlib_ids = HashSet::new();
    for adlib in &output.adlib_pieces {
        if adlib.external_id.is_empty() {
            return Err(Error::Blueprint(format!("ad-lib {} has no external id", adlib.id)));
        }
        if !adlib_ids.insert(&adlib.id) {
            return Err(Error::Blueprint(format!("duplicate ad-lib id {}", adlib.id)));
        }
        check_object_ids(
            &format!("ad-lib {}", adlib.id),
            &adlib.content.timeline_objects,
        )?;
    }
    Ok(())
}

/// Check baseline objects.
pub fn validate_baseline(objects: &[TimelineObject]) -> Result<()> {
    check_object_ids("baseline", objects)
}

// ---------------------------------------------------------------------------
// PassthroughBlueprint
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct PieceSpec {
    #[serde(default)]
    external_id: String,
    #[serde(default)]
    name: String,
    source_layer_id: String,
    #[serde(default)]
    trigger: Trigger,
    #[serde(default)]
    expected_duration: Option<i64>,
    #[serde(default)]
    infinite_mode: InfiniteMode,
    #[serde(default)]
    is_transition: bool,
    #[serde(default)]
    extend_on_hold: bool,
    #[serde(default)]
    objects: Vec<TimelineObject>,
}

#[derive(Debug, Deserialize)]
struct AdLibSpec {
    #[serde(default)]
    external_id: String,
    #[serde(default)]
    name: String,
    source_layer_id: String,
    #[serde(default)]
    expected_duration: Option<i64>,
    #[serde(default)]
    infinite_mode: InfiniteMode,
    #[serde(default)]
    rank: f64,
    #[serde(default)]
    objects: Vec<TimelineObject>,
}

fn payload_list<T: for<'de> Deserialize<'de>>(payload: &serde_json::Value, key: &str) -> Result<Vec<T>> {
    match payload.get(key) {
        None | Some(serde_json::Value::Null) => Ok(Vec::new()),
        Some(value) => serde_json::from_value(value.clone())
            .map_err(|e| Error::Blueprint(format!("invalid {key} payload: {e}"))),
    }
}

/// Builds content straight from the ingest payload.
///
/// The rundown payload may carry `baseline` (timeline objects); a part
/// payload may carry `pieces` and `adlibs`. Ids are derived from the
/// external ids, so re-ingesting the same data yields the same documents.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughBlueprint;

impl Blueprint for PassthroughBlueprint {
    fn name(&self) -> &str {
        "passthrough"
    }

    fn version(&self) -> u32 {
        1
    }

    fn get_baseline(
        &self,
        _ctx: &mut BlueprintContext,
        rundown: &Rundown,
    ) -> Result<Vec<TimelineObject>> {
        payload_list(&rundown.payload, "baseline")
    }

    fn get_part(&self, ctx: &mut BlueprintContext, part: &Part) -> Result<BlueprintOutput> {
        let specs: Vec<PieceSpec> = payload_list(&part.payload, "pieces")?;
        let adlib_specs: Vec<AdLibSpec> = payload_list(&part.payload, "adlibs")?;

        let mut pieces = Vec::with_capacity(specs.len());
        for spec in specs {
            if spec.external_id.is_empty() {
                ctx.notify_user_warning(format!(
                    "piece on layer {} has no external id",
                    spec.source_layer_id
                ));
            }
            let id = PieceId::from(ctx.get_hash_id(Some(&format!("piece_{}", spec.external_id))));
            let mut piece = Piece::new(id, part.rundown_id.clone(), part.id.clone(), spec.source_layer_id);
            piece.external_id = spec.external_id;
            if !spec.name.is_empty() {
                piece.name = spec.name;
            }
            piece.trigger = spec.trigger;
            piece.expected_duration = spec.expected_duration;
            piece.infinite_mode = spec.infinite_mode;
            piece.is_transition = spec.is_transition;
            piece.extend_on_hold = spec.extend_on_hold;
            piece.content = PieceContent {
                timeline_objects: spec.objects,
            };
            pieces.push(piece);
        }

        let adlib_pieces = adlib_specs
            .into_iter()
            .map(|spec| AdLibPiece {
                id: AdLibPieceId::from(ctx.get_hash_id(Some(&format!("adlib_{}", spec.external_id)))),
                rundown_id: part.rundown_id.clone(),
                part_id: part.id.clone(),
                name: if spec.name.is_empty() {
                    spec.external_id.clone()
                } else {
                    spec.name
                },
                external_id: spec.external_id,
                source_layer_id: spec.source_layer_id,
                expected_duration: spec.expected_duration,
                infinite_mode: spec.infinite_mode,
                content: PieceContent {
                    timeline_objects: spec.objects,
                },
                rank: spec.rank,
            })
            .collect();

        Ok(BlueprintOutput {
            pieces,
            adlib_pieces,
        })
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Blueprints keyed by studio, with a shared fallback.
pub struct BlueprintRegistry {
    by_studio: DashMap<StudioId, Arc<dyn Blueprint>>,
    fallback: Arc<dyn Blueprint>,
}

impl BlueprintRegistry {
    pub fn new(fallback: Arc<dyn Blueprint>) -> Self {
        Self {
            by_studio: DashMap::new(),
            fallback,
        }
    }

    /// Install `blueprint` for `studio`.
    ///
    /// Replacing an installed blueprint requires a strictly newer version;
    /// an equal or older one is rejected with a conflict.
    pub fn register(&self, studio: StudioId, blueprint: Arc<dyn Blueprint>) -> Result<()> {
        if let Some(existing) = self.by_studio.get(&studio) {
            if blueprint.version() <= existing.version() {
                return Err(Error::Conflict(format!(
                    "blueprint {} v{} is not newer than installed v{}",
                    blueprint.name(),
                    blueprint.version(),
                    existing.version()
                )));
            }
        }
        tracing::info!(studio_id = %studio, "Registered blueprint {} v{}", blueprint.name(), blueprint.version());
        self.by_studio.insert(studio, blueprint);
        Ok(())
    }

    /// Blueprint for `studio`, or the fallback.
    pub fn get(&self, studio: &StudioId) -> Arc<dyn Blueprint> {
        self.by_studio
            .get(studio)
            .map(|b| Arc::clone(b.value()))
            .unwrap_or_else(|| Arc::clone(&self.fallback))
    }

    /// Drop the studio's blueprint so the next lookup uses the fallback.
    pub fn invalidate(&self, studio: &StudioId) -> bool {
        self.by_studio.remove(studio).is_some()
    }
}

impl Default for BlueprintRegistry {
    fn default() -> Self {
        Self::new(Arc::new(PassthroughBlueprint))
    }
}
