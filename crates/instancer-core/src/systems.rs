//! Scene systems that move entity state into the instance sets.

use hecs::World;

use crate::components::{
    Active, InstanceMatrix, Position, RenderSlot, Rotation, Scale, Transform, Visual,
};
use crate::engine::CategorySets;

/// Push every active entity that has no handle yet this round into the
/// build buffers, recording the returned handle on the entity.
/// Returns the number of entities pushed.
pub fn push_round(world: &mut World, sets: &mut CategorySets) -> usize {
    let mut pushed = 0;
    for (entity, pos, rot, scale, visual, slot, _active) in world.query_mut::<(
        hecs::Entity,
        &Position,
        &Rotation,
        &Scale,
        &Visual,
        &mut RenderSlot,
        &Active,
    )>() {
        if slot.0.is_some() {
            continue;
        }
        let matrix = InstanceMatrix::from(Transform::from_components(pos, rot, scale));
        // Rejections are logged by the instance set.
        if let Ok(handle) = sets.add(visual, matrix, entity) {
            slot.0 = Some(handle);
            pushed += 1;
        }
    }
    pushed
}

/// Forget every handle. Run right after a switch: handles pointed into the
/// registry that has just been published.
pub fn reset_slots(world: &mut World) {
    for slot in world.query_mut::<&mut RenderSlot>() {
        slot.0 = None;
    }
}

/// Count active entities. Useful for debug overlay.
pub fn count_active(world: &World) -> usize {
    world.query::<&Active>().iter().count()
}

/// Entities that currently hold a handle into a build buffer.
pub fn count_slotted(world: &World) -> usize {
    world
        .query::<&RenderSlot>()
        .iter()
        .filter(|slot| slot.0.is_some())
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PoolConfig, RenderSettings};
    use crate::properties::{CircuitProperties, ParticleProperties};
    use glam::Vec3;

    fn spawn(world: &mut World, visual: Visual, x: f32) -> hecs::Entity {
        world.spawn((
            Position(Vec3::new(x, 0.0, 0.0)),
            Rotation::default(),
            Scale::default(),
            visual,
            RenderSlot::default(),
            Active,
        ))
    }

    #[test]
    fn push_round_assigns_handles_once() {
        let mut world = World::new();
        let mut sets = CategorySets::new(PoolConfig::new(8).unwrap(), RenderSettings::default());
        let a = spawn(&mut world, Visual::Particle(ParticleProperties::default()), 1.0);
        spawn(&mut world, Visual::Circuit(CircuitProperties::default()), 2.0);
        // Not active: never pushed.
        world.spawn((
            Position::default(),
            Rotation::default(),
            Scale::default(),
            Visual::Particle(ParticleProperties::default()),
            RenderSlot::default(),
        ));

        assert_eq!(push_round(&mut world, &mut sets), 2);
        assert_eq!(count_slotted(&world), 2);
        assert!(world.get::<&RenderSlot>(a).unwrap().0.is_some());

        // Second pass finds nothing new.
        assert_eq!(push_round(&mut world, &mut sets), 0);
        assert_eq!(sets.particles.pending_count(), 1);
        assert_eq!(sets.circuits.pending_count(), 1);
    }

    #[test]
    fn reset_slots_clears_handles() {
        let mut world = World::new();
        let mut sets = CategorySets::new(PoolConfig::default(), RenderSettings::default());
        spawn(&mut world, Visual::Particle(ParticleProperties::default()), 0.0);
        push_round(&mut world, &mut sets);
        reset_slots(&mut world);
        assert_eq!(count_slotted(&world), 0);
        assert_eq!(count_active(&world), 1);
    }
}
