use bevy::prelude::*;

use crate::transition::TeleportCue;

/// Physics state of the player that a teleport must clear.
#[derive(Component, Debug, Clone, Copy, Default, PartialEq)]
pub struct PlayerBody {
    pub linear_velocity: Vec3,
    pub angular_velocity: Vec3,
}

/// Marks where the player lands when a flashback begins.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct FlashbackAnchor;

/// Pose the player left from when entering a flashback.
#[derive(Resource, Debug, Clone, Copy, Default, PartialEq)]
pub struct ReturnPoint(Option<Transform>);

impl ReturnPoint {
    pub fn get(&self) -> Option<&Transform> {
        self.0.as_ref()
    }
}

fn player_transform(world: &mut World) -> Option<Transform> {
    let mut query = world.query_filtered::<&Transform, With<PlayerBody>>();
    query.get_single(world).ok().copied()
}

fn anchor_transform(world: &mut World) -> Option<Transform> {
    let mut query = world.query_filtered::<&Transform, With<FlashbackAnchor>>();
    query.get_single(world).ok().copied()
}

/// Record the player's pose unless one is already held from an earlier entry.
pub fn remember_return_point(world: &mut World) {
    if world
        .get_resource::<ReturnPoint>()
        .is_some_and(|point| point.0.is_some())
    {
        return;
    }
    let Some(transform) = player_transform(world) else {
        tracing::debug!(target: "echoes::teleport", "return_point.skipped=no_player");
        return;
    };
    world.insert_resource(ReturnPoint(Some(transform)));
}

/// Move the player for `cue` and zero its velocities.
///
/// Missing destinations or a missing player are logged and skipped.
pub fn apply_teleport(world: &mut World, cue: TeleportCue) {
    let destination = match cue {
        TeleportCue::IntoFlashback => anchor_transform(world),
        TeleportCue::ReturnFromFlashback => world
            .get_resource::<ReturnPoint>()
            .and_then(|point| point.0),
    };
    let Some(destination) = destination else {
        tracing::warn!(target: "echoes::teleport", ?cue, "teleport.skipped=no_destination");
        return;
    };

    let mut query = world.query::<(&mut Transform, &mut PlayerBody)>();
    match query.get_single_mut(world) {
        Ok((mut transform, mut body)) => {
            transform.translation = destination.translation;
            transform.rotation = destination.rotation;
            body.linear_velocity = Vec3::ZERO;
            body.angular_velocity = Vec3::ZERO;
            tracing::info!(
                target: "echoes::teleport",
                ?cue,
                x = destination.translation.x,
                y = destination.translation.y,
                z = destination.translation.z,
                "teleport.applied"
            );
        }
        Err(err) => {
            tracing::warn!(
                target: "echoes::teleport",
                ?cue,
                error = %err,
                "teleport.skipped=no_player"
            );
            return;
        }
    }

    if cue == TeleportCue::ReturnFromFlashback {
        world.insert_resource(ReturnPoint(None));
    }
}
