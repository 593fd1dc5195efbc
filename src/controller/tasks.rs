use bevy::prelude::*;
use bevy::tasks::{AsyncComputeTaskPool, Task};
use futures_lite::future;

use super::{execute, Completion, Controller, Effect, Services};

#[derive(Component)]
pub struct PendingEffect(Task<Completion>);

/// Start `effect` on the compute pool. Basemap tiles own the IO pool, so a
/// stalled tile server cannot hold up catalog or coverage requests.
pub fn effect_task(services: &Services, effect: Effect) -> Task<Completion> {
    let services = services.clone();
    AsyncComputeTaskPool::get().spawn(async move { execute(effect, &services) })
}

/// [`apply_completions`] picks up the result.
pub fn spawn_effect(commands: &mut Commands, services: &Services, effect: Effect) {
    commands.spawn(PendingEffect(effect_task(services, effect)));
}

pub fn apply_completions(
    mut commands: Commands,
    mut tasks: Query<(Entity, &mut PendingEffect)>,
    mut controller: ResMut<Controller>,
) {
    for (entity, mut pending) in &mut tasks {
        if let Some(completion) = future::block_on(future::poll_once(&mut pending.0)) {
            controller.complete(completion);
            commands.entity(entity).despawn();
        }
    }
}

pub fn probe_backend(mut commands: Commands, controller: Res<Controller>, services: Res<Services>) {
    spawn_effect(&mut commands, &services, controller.probe_backend());
}
