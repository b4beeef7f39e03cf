use std::sync::Arc;

use bevy::prelude::*;

use crate::blend::{self, ProfileBlender};
use crate::clock::FrameClock;
use crate::config::{InsanityConfig, InsanityConfigHandle};
use crate::cure::{self, CureSequencer};
use crate::events::{EventBus, GameEvent, SubscriptionId};
use crate::insanity::{self, InsanityMeter};
use crate::output::{self, RenderedPostProcess};
use crate::profile::{ProfileId, ProfileLibrary};
use crate::shader::{self, ShaderInsanityDriver};
use crate::teleport::ReturnPoint;
use crate::transition::{self, TransitionSequencer};

/// Modules that own a resource and, optionally, a bus subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Module {
    Insanity,
    Cure,
    Blender,
    Transition,
    Shader,
}

impl Module {
    pub fn as_str(&self) -> &'static str {
        match self {
            Module::Insanity => "insanity",
            Module::Cure => "cure",
            Module::Blender => "blender",
            Module::Transition => "transition",
            Module::Shader => "shader",
        }
    }
}

/// Bus subscriptions made by [`InsanityPlugin`], kept so a module can be
/// retired cleanly.
#[derive(Resource, Debug, Default, Clone)]
pub struct ModuleSubscriptions {
    entries: Vec<(Module, SubscriptionId)>,
}

impl ModuleSubscriptions {
    pub fn get(&self, module: Module) -> Option<SubscriptionId> {
        self.entries
            .iter()
            .find(|(owner, _)| *owner == module)
            .map(|(_, id)| *id)
    }

    fn take(&mut self, module: Module) -> Option<SubscriptionId> {
        let index = self.entries.iter().position(|(owner, _)| *owner == module)?;
        Some(self.entries.remove(index).1)
    }
}

/// Wires the insanity meter, cure, profile blender, transition sequencer and
/// shader driver into an [`App`].
///
/// Subscription order decides dispatch order: the meter reacts to a
/// flashback before the visuals do, so any level reset it publishes reaches
/// the blender first.
pub struct InsanityPlugin {
    config: Arc<InsanityConfig>,
}

impl InsanityPlugin {
    pub fn new(config: Arc<InsanityConfig>) -> Self {
        Self { config }
    }
}

impl Default for InsanityPlugin {
    fn default() -> Self {
        Self::new(InsanityConfig::builtin())
    }
}

impl Plugin for InsanityPlugin {
    fn build(&self, app: &mut App) {
        let config = Arc::clone(&self.config);
        let meter = InsanityMeter::from_config(&config);
        let initial_level = meter.level();

        app.insert_resource(InsanityConfigHandle::new(Arc::clone(&config)))
            .init_resource::<FrameClock>()
            .init_resource::<EventBus>()
            .init_resource::<ReturnPoint>()
            .add_event::<GameEvent>()
            .insert_resource(meter)
            .insert_resource(CureSequencer::new(&config.cure))
            .insert_resource(ShaderInsanityDriver::new(
                &config.shader,
                config.visuals.smoothing,
                initial_level,
            ));

        match ProfileLibrary::from_set(&config.profiles) {
            Ok(library) => {
                app.insert_resource(RenderedPostProcess::new(
                    *library.get(ProfileId::Sane).params(),
                ))
                .insert_resource(ProfileBlender::new(
                    &library,
                    &config.visuals,
                    initial_level,
                ))
                .insert_resource(TransitionSequencer::new(library.clone(), &config))
                .insert_resource(library);
            }
            Err(err) => {
                tracing::warn!(
                    target: "echoes::visuals",
                    error = %err,
                    "visuals.disabled"
                );
                app.insert_resource(RenderedPostProcess::default());
            }
        }

        let subscriptions = subscribe_modules(&mut app.world);
        app.insert_resource(subscriptions).add_systems(
            Update,
            (
                output::begin_output_frame,
                insanity::advance_insanity,
                cure::advance_cure,
                blend::blend_profiles,
                transition::advance_transition,
                shader::advance_shader_insanity,
                output::flush_render_sink,
            )
                .chain(),
        );
    }
}

fn subscribe_modules(world: &mut World) -> ModuleSubscriptions {
    let mut bus = world.get_resource_or_insert_with(EventBus::default);
    let entries = vec![
        (Module::Insanity, bus.subscribe(insanity::handle_game_event)),
        (Module::Blender, bus.subscribe(blend::handle_game_event)),
        (
            Module::Transition,
            bus.subscribe(transition::handle_game_event),
        ),
        (Module::Shader, bus.subscribe(shader::handle_game_event)),
    ];
    ModuleSubscriptions { entries }
}

/// Detach `module` from the bus and remove the state it owns.
///
/// Returns false when the module was not installed.
pub fn retire_module(world: &mut World, module: Module) -> bool {
    let subscription = world
        .get_resource_mut::<ModuleSubscriptions>()
        .and_then(|mut subscriptions| subscriptions.take(module));
    let unsubscribed = match (subscription, world.get_resource_mut::<EventBus>()) {
        (Some(id), Some(mut bus)) => bus.unsubscribe(id),
        _ => false,
    };
    let removed = match module {
        Module::Insanity => world.remove_resource::<InsanityMeter>().is_some(),
        Module::Cure => world.remove_resource::<CureSequencer>().is_some(),
        Module::Blender => world.remove_resource::<ProfileBlender>().is_some(),
        Module::Transition => world.remove_resource::<TransitionSequencer>().is_some(),
        Module::Shader => world.remove_resource::<ShaderInsanityDriver>().is_some(),
    };
    tracing::info!(
        target: "echoes::events",
        module = module.as_str(),
        unsubscribed,
        removed,
        "module.retired"
    );
    unsubscribed || removed
}
