//! The engine ties the hecs scene to one instance set per rendering
//! category and drives the round/frame cycle:
//!
//! 1. the simulation spawns, moves and despawns entities during a round;
//!    entities that already hold a build handle are updated in place;
//! 2. `end_round` pushes every remaining entity, publishes all build
//!    buffers and forgets the now-stale handles;
//! 3. `update` + `draw` run every visual frame until the next round.

use hecs::World;
use tracing::{debug, warn};

use crate::components::{
    Active, InstanceMatrix, Position, RenderSlot, Rotation, Scale, Transform, Visual,
};
use crate::config::{PoolConfig, RenderSettings};
use crate::draw::{DrawBackend, DrawStats, FrameContext};
use crate::error::PoolError;
use crate::handle::{EntityHandle, HandleSink};
use crate::instance_set::InstanceSet;
use crate::properties::{CircuitProperties, ParticleProperties, PinProperties, SharedParams};
use crate::systems::{push_round, reset_slots};

pub type CategorySet<K> = InstanceSet<K, InstanceMatrix, hecs::Entity>;

/// One instance set per rendering category.
pub struct CategorySets {
    pub particles: CategorySet<ParticleProperties>,
    pub pins: CategorySet<PinProperties>,
    pub circuits: CategorySet<CircuitProperties>,
}

impl CategorySets {
    pub fn new(config: PoolConfig, settings: RenderSettings) -> Self {
        Self {
            particles: InstanceSet::new(config, settings),
            pins: InstanceSet::new(config, settings),
            circuits: InstanceSet::new(config, settings),
        }
    }

    pub fn add(
        &mut self,
        visual: &Visual,
        matrix: InstanceMatrix,
        owner: hecs::Entity,
    ) -> Result<EntityHandle, PoolError> {
        match visual {
            Visual::Particle(key) => self.particles.add_entity(key, matrix, owner),
            Visual::Pin(key) => self.pins.add_entity(key, matrix, owner),
            Visual::Circuit(key) => self.circuits.add_entity(key, matrix, owner),
        }
    }

    pub fn update(
        &mut self,
        visual: &Visual,
        handle: EntityHandle,
        matrix: InstanceMatrix,
    ) -> Result<(), PoolError> {
        match visual {
            Visual::Particle(_) => self.particles.update(handle, matrix),
            Visual::Pin(_) => self.pins.update(handle, matrix),
            Visual::Circuit(_) => self.circuits.update(handle, matrix),
        }
    }

    pub fn remove(
        &mut self,
        visual: &Visual,
        handle: EntityHandle,
        sink: &mut impl HandleSink<hecs::Entity>,
    ) -> Result<hecs::Entity, PoolError> {
        match visual {
            Visual::Particle(_) => self.particles.remove(handle, sink),
            Visual::Pin(_) => self.pins.remove(handle, sink),
            Visual::Circuit(_) => self.circuits.remove(handle, sink),
        }
    }

    pub fn finish_build(&mut self) {
        self.particles.finish_build();
        self.pins.finish_build();
        self.circuits.finish_build();
    }

    pub fn switch_instances(&mut self) {
        self.particles.switch_instances();
        self.pins.switch_instances();
        self.circuits.switch_instances();
    }

    pub fn draw<B>(&self, frame: FrameContext, backend: &mut B) -> DrawStats
    where
        B: DrawBackend<SharedParams, InstanceMatrix> + ?Sized,
    {
        let mut stats = self.particles.draw(frame, backend);
        stats += self.pins.draw(frame, backend);
        stats += self.circuits.draw(frame, backend);
        stats
    }

    pub fn set_settings(&mut self, settings: &RenderSettings) {
        self.particles.set_settings(settings);
        self.pins.set_settings(settings);
        self.circuits.set_settings(settings);
    }

    pub fn release_spare_chunks(&mut self) -> usize {
        self.particles.release_spare_chunks()
            + self.pins.release_spare_chunks()
            + self.circuits.release_spare_chunks()
    }

    pub fn check_invariants(&self) -> Result<(), PoolError> {
        self.particles.check_invariants()?;
        self.pins.check_invariants()?;
        self.circuits.check_invariants()
    }
}

/// Patches the `RenderSlot` of an entity whose instance was relocated.
impl HandleSink<hecs::Entity> for World {
    fn relocate(&mut self, owner: hecs::Entity, to: EntityHandle) {
        if let Ok(mut slot) = self.get::<&mut RenderSlot>(owner) {
            slot.0 = Some(to);
        }
    }
}

/// Largest external ID the entity map accepts.
pub const MAX_EXTERNAL_ID: u32 = (1 << 24) - 1;

/// Maps simulation-side IDs to scene entities.
/// IDs are small dense integers, so a Vec gives O(1) lookup.
#[derive(Default)]
pub struct EntityMap {
    map: Vec<Option<hecs::Entity>>,
}

impl EntityMap {
    pub fn insert(&mut self, external_id: u32, entity: hecs::Entity) -> Result<(), PoolError> {
        if external_id > MAX_EXTERNAL_ID {
            return Err(PoolError::IdOutOfRange {
                id: external_id,
                max: MAX_EXTERNAL_ID,
            });
        }
        let idx = external_id as usize;
        if idx >= self.map.len() {
            self.map.resize(idx + 1, None);
        }
        self.map[idx] = Some(entity);
        Ok(())
    }

    pub fn get(&self, external_id: u32) -> Option<hecs::Entity> {
        self.map.get(external_id as usize).copied().flatten()
    }

    pub fn remove(&mut self, external_id: u32) -> Option<hecs::Entity> {
        self.map.get_mut(external_id as usize).and_then(Option::take)
    }
}

/// The core engine state.
pub struct Engine {
    pub world: World,
    pub entity_map: EntityMap,
    pub sets: CategorySets,
    settings: RenderSettings,
    round_timer: f32,
    round_count: u64,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        Self::with_config(PoolConfig::default(), RenderSettings::default())
    }

    pub fn with_config(config: PoolConfig, settings: RenderSettings) -> Self {
        Self {
            world: World::new(),
            entity_map: EntityMap::default(),
            sets: CategorySets::new(config, settings),
            settings,
            round_timer: 0.0,
            round_count: 0,
        }
    }

    /// Create a scene entity for a simulation primitive. Re-using a live
    /// external ID returns the existing entity unchanged.
    pub fn spawn(
        &mut self,
        external_id: u32,
        visual: Visual,
        transform: Transform,
    ) -> Result<hecs::Entity, PoolError> {
        if let Some(existing) = self.entity_map.get(external_id) {
            warn!(external_id, "spawn for existing id ignored");
            return Ok(existing);
        }
        if external_id > MAX_EXTERNAL_ID {
            warn!(external_id, max = MAX_EXTERNAL_ID, "spawn id out of range");
            return Err(PoolError::IdOutOfRange {
                id: external_id,
                max: MAX_EXTERNAL_ID,
            });
        }
        let entity = self.world.spawn((
            Position(transform.translation),
            Rotation(transform.rotation),
            Scale(transform.scale),
            visual,
            RenderSlot::default(),
            Active,
        ));
        self.entity_map.insert(external_id, entity)?;
        Ok(entity)
    }

    /// Move an entity. If it was already pushed this round, its instance
    /// is overwritten in place.
    pub fn set_transform(&mut self, external_id: u32, transform: Transform) -> Result<(), PoolError> {
        let Some(entity) = self.entity_map.get(external_id) else {
            debug!(external_id, "transform for unknown id ignored");
            return Ok(());
        };
        if let Ok(mut pos) = self.world.get::<&mut Position>(entity) {
            pos.0 = transform.translation;
        }
        if let Ok(mut rot) = self.world.get::<&mut Rotation>(entity) {
            rot.0 = transform.rotation;
        }
        if let Ok(mut scale) = self.world.get::<&mut Scale>(entity) {
            scale.0 = transform.scale;
        }
        match self.pushed(entity) {
            Some((visual, handle)) => self.sets.update(&visual, handle, transform.into()),
            None => Ok(()),
        }
    }

    /// Change the properties an entity is batched by. A pushed instance
    /// leaves its old batch and is pushed again at the end of the round.
    pub fn set_visual(&mut self, external_id: u32, visual: Visual) -> Result<(), PoolError> {
        let Some(entity) = self.entity_map.get(external_id) else {
            debug!(external_id, "visual for unknown id ignored");
            return Ok(());
        };
        let removal = self.unpush(entity);
        if self.world.insert_one(entity, visual).is_err() {
            debug!(external_id, "entity vanished while changing visual");
        }
        removal
    }

    /// Push one entity into its build buffer now instead of at the end
    /// of the round.
    pub fn push_entity(&mut self, external_id: u32) -> Result<EntityHandle, PoolError> {
        let Some(entity) = self.entity_map.get(external_id) else {
            warn!(external_id, "push for unknown id ignored");
            return Err(PoolError::UnknownEntity(external_id));
        };
        let visual = self
            .world
            .get::<&Visual>(entity)
            .map(|v| (*v).clone())
            .map_err(|_| PoolError::UnknownEntity(external_id))?;
        let matrix = self.matrix_of(entity);
        let handle = self.sets.add(&visual, matrix, entity)?;
        if let Ok(mut slot) = self.world.get::<&mut RenderSlot>(entity) {
            slot.0 = Some(handle);
        }
        Ok(handle)
    }

    /// Remove an entity from the scene and, if pushed, from its build buffer.
    /// Unknown IDs are reported as `UnknownEntity`.
    pub fn despawn(&mut self, external_id: u32) -> Result<(), PoolError> {
        let Some(entity) = self.entity_map.remove(external_id) else {
            return Err(PoolError::UnknownEntity(external_id));
        };
        let removal = self.unpush(entity);
        let _ = self.world.despawn(entity);
        removal
    }

    /// Finish the round: push every entity still lacking a handle, publish
    /// all build buffers and drop the handles that pointed into them.
    pub fn end_round(&mut self) -> usize {
        let pushed = push_round(&mut self.world, &mut self.sets);
        self.sets.finish_build();
        self.sets.switch_instances();
        reset_slots(&mut self.world);
        self.round_count += 1;
        self.round_timer = 0.0;
        debug!(round = self.round_count, pushed, "round published");
        pushed
    }

    /// Advance the frame clock by `dt` seconds. Progress saturates at the
    /// end of the round until the next one is published.
    pub fn update(&mut self, dt: f32) {
        self.round_timer = (self.round_timer + dt.max(0.0)).min(self.settings.round_duration);
    }

    /// Progress through the current round, `0.0..=1.0`.
    pub fn round_progress(&self) -> f32 {
        if self.settings.round_duration <= 0.0 {
            return 1.0;
        }
        self.round_timer / self.settings.round_duration
    }

    /// Draw the last published round of every category.
    pub fn draw<B>(&self, backend: &mut B) -> DrawStats
    where
        B: DrawBackend<SharedParams, InstanceMatrix> + ?Sized,
    {
        let frame = FrameContext {
            round_progress: self.round_progress(),
        };
        self.sets.draw(frame, backend)
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    /// Replace the global settings and re-derive every batch's parameters.
    pub fn set_settings(&mut self, settings: RenderSettings) {
        self.settings = settings;
        self.round_timer = self.round_timer.min(settings.round_duration);
        self.sets.set_settings(&settings);
    }

    pub fn release_spare_chunks(&mut self) -> usize {
        self.sets.release_spare_chunks()
    }

    /// Rounds published since engine start.
    pub fn round_count(&self) -> u64 {
        self.round_count
    }

    /// Current build handle of an entity, if pushed this round.
    pub fn handle_of(&self, external_id: u32) -> Option<EntityHandle> {
        let entity = self.entity_map.get(external_id)?;
        self.world.get::<&RenderSlot>(entity).ok()?.0
    }

    fn matrix_of(&self, entity: hecs::Entity) -> InstanceMatrix {
        let pos = self.world.get::<&Position>(entity).map(|p| *p).unwrap_or_default();
        let rot = self.world.get::<&Rotation>(entity).map(|r| *r).unwrap_or_default();
        let scale = self.world.get::<&Scale>(entity).map(|s| *s).unwrap_or_default();
        Transform::from_components(&pos, &rot, &scale).into()
    }

    /// Visual and build handle of an entity that was pushed this round.
    fn pushed(&self, entity: hecs::Entity) -> Option<(Visual, EntityHandle)> {
        let handle = self.world.get::<&RenderSlot>(entity).ok()?.0?;
        let visual = self.world.get::<&Visual>(entity).ok()?;
        Some(((*visual).clone(), handle))
    }

    /// Take a pushed entity back out of its build buffer.
    fn unpush(&mut self, entity: hecs::Entity) -> Result<(), PoolError> {
        let Some((visual, handle)) = self.pushed(entity) else {
            return Ok(());
        };
        if let Ok(mut slot) = self.world.get::<&mut RenderSlot>(entity) {
            slot.0 = None;
        }
        self.sets.remove(&visual, handle, &mut self.world).map(|_| ())
    }
}

// ── Dev-tools debug methods ──────────────────────────────────────
#[cfg(feature = "dev-tools")]
impl Engine {
    /// Active-registry statistics per category: particles, pins, circuits.
    pub fn debug_stats(&self) -> [crate::instance_set::PoolStats; 3] {
        [
            self.sets.particles.active_stats(),
            self.sets.pins.active_stats(),
            self.sets.circuits.active_stats(),
        ]
    }

    /// Number of active entities in the scene.
    pub fn debug_entity_count(&self) -> u32 {
        crate::systems::count_active(&self.world) as u32
    }

    pub fn debug_check_invariants(&self) -> Result<(), PoolError> {
        self.sets.check_invariants()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::draw::DrawCall;
    use crate::properties::Rgba8;
    use glam::Vec3;

    /// Records the x translation of every drawn instance, per mesh.
    #[derive(Default)]
    struct Xs(Vec<(u32, f32)>);

    impl DrawBackend<SharedParams, InstanceMatrix> for Xs {
        fn draw_instanced(&mut self, call: DrawCall<'_, SharedParams, InstanceMatrix>) {
            for m in &call.instances[..call.count] {
                self.0.push((call.params.mesh as u32, m.translation().x));
            }
        }
    }

    fn drawn_x(engine: &Engine) -> Vec<f32> {
        let mut xs = Xs::default();
        engine.draw(&mut xs);
        let mut out: Vec<f32> = xs.0.into_iter().map(|(_, x)| x).collect();
        out.sort_by(f32::total_cmp);
        out
    }

    fn particle() -> Visual {
        Visual::Particle(ParticleProperties {
            color: Rgba8::new(200, 50, 50, 255),
            ..Default::default()
        })
    }

    fn at(x: f32) -> Transform {
        Transform::from_translation(Vec3::new(x, 0.0, 0.0))
    }

    #[test]
    fn nothing_drawn_before_first_round() {
        let mut engine = Engine::new();
        engine.spawn(0, particle(), at(1.0)).unwrap();
        engine.push_entity(0).unwrap();
        assert!(drawn_x(&engine).is_empty());
    }

    #[test]
    fn end_round_publishes_all_categories() {
        let mut engine = Engine::new();
        engine.spawn(0, particle(), at(1.0)).unwrap();
        engine.spawn(1, Visual::Pin(PinProperties::default()), at(2.0)).unwrap();
        engine.spawn(2, Visual::Circuit(CircuitProperties::default()), at(3.0)).unwrap();
        assert_eq!(engine.end_round(), 3);
        assert_eq!(drawn_x(&engine), vec![1.0, 2.0, 3.0]);
        assert_eq!(engine.round_count(), 1);
        assert_eq!(engine.handle_of(0), None);
    }

    #[test]
    fn moves_during_round_show_up_after_next_switch() {
        let mut engine = Engine::new();
        engine.spawn(0, particle(), at(1.0)).unwrap();
        engine.end_round();

        engine.push_entity(0).unwrap();
        engine.set_transform(0, at(5.0)).unwrap();
        assert_eq!(drawn_x(&engine), vec![1.0]);

        engine.end_round();
        assert_eq!(drawn_x(&engine), vec![5.0]);
    }

    #[test]
    fn despawn_patches_relocated_entity() {
        let mut engine = Engine::new();
        for id in 0..3 {
            engine.spawn(id, particle(), at(id as f32)).unwrap();
            engine.push_entity(id).unwrap();
        }
        let h0 = engine.handle_of(0).unwrap();
        engine.despawn(0).unwrap();
        // Entity 2 was last and took over entity 0's slot.
        assert_eq!(engine.handle_of(2), Some(h0));

        engine.set_transform(2, at(9.0)).unwrap();
        engine.end_round();
        assert_eq!(drawn_x(&engine), vec![1.0, 9.0]);
    }

    #[test]
    fn duplicate_push_is_rejected() {
        let mut engine = Engine::new();
        engine.spawn(0, particle(), at(1.0)).unwrap();
        engine.push_entity(0).unwrap();
        assert!(matches!(
            engine.push_entity(0),
            Err(PoolError::DuplicateRegistration(_))
        ));
        engine.end_round();
        assert_eq!(drawn_x(&engine), vec![1.0]);
    }

    #[test]
    fn visual_change_moves_entity_to_new_batch() {
        let mut engine = Engine::new();
        engine.spawn(0, particle(), at(1.0)).unwrap();
        engine.push_entity(0).unwrap();
        engine
            .set_visual(
                0,
                Visual::Particle(ParticleProperties {
                    beeping: true,
                    ..Default::default()
                }),
            )
            .unwrap();
        assert_eq!(engine.handle_of(0), None);
        engine.end_round();

        let active = engine.sets.particles.active();
        assert_eq!(active.len(), 2);
        assert_eq!(active.live_count(), 1);
    }

    #[test]
    fn round_progress_saturates() {
        let mut engine = Engine::new();
        let duration = engine.settings().round_duration;
        engine.update(duration * 0.5);
        assert!((engine.round_progress() - 0.5).abs() < 1e-6);
        engine.update(duration * 10.0);
        assert_eq!(engine.round_progress(), 1.0);
        engine.end_round();
        assert_eq!(engine.round_progress(), 0.0);
    }

    #[test]
    fn hiding_pins_skips_their_batches() {
        let mut engine = Engine::new();
        engine.spawn(0, particle(), at(1.0)).unwrap();
        engine.spawn(1, Visual::Pin(PinProperties::default()), at(2.0)).unwrap();
        engine.end_round();
        engine.set_settings(RenderSettings {
            show_pins: false,
            ..Default::default()
        });
        let mut xs = Xs::default();
        let stats = engine.draw(&mut xs);
        assert_eq!(stats.skipped_batches, 1);
        assert_eq!(xs.0, vec![(0, 1.0)]);
    }

    #[test]
    fn out_of_range_ids_are_rejected_without_allocating() {
        let mut engine = Engine::new();
        assert_eq!(
            engine.spawn(u32::MAX, particle(), at(0.0)),
            Err(PoolError::IdOutOfRange {
                id: u32::MAX,
                max: MAX_EXTERNAL_ID,
            })
        );
        assert!(engine.entity_map.map.is_empty());
        assert_eq!(engine.despawn(u32::MAX), Err(PoolError::UnknownEntity(u32::MAX)));
        assert!(engine.spawn(MAX_EXTERNAL_ID, particle(), at(0.0)).is_ok());
    }

    #[test]
    fn spawning_existing_id_keeps_entity() {
        let mut engine = Engine::new();
        let a = engine.spawn(4, particle(), at(1.0)).unwrap();
        let b = engine.spawn(4, particle(), at(2.0)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn twenty_thousand_entities_over_many_rounds() {
        let mut engine = Engine::new();
        for id in 0..20_000u32 {
            let visual = if id % 3 == 0 {
                Visual::Circuit(CircuitProperties {
                    connector: id % 2 == 0,
                    ..Default::default()
                })
            } else {
                particle()
            };
            engine.spawn(id, visual, at(id as f32)).unwrap();
        }
        for round in 0..3 {
            engine.end_round();
            let mut xs = Xs::default();
            let stats = engine.draw(&mut xs);
            assert_eq!(stats.instances, 20_000 - round as usize, "round {round}");
            engine.despawn(round).unwrap();
        }
        engine.sets.check_invariants().unwrap();
    }
}
