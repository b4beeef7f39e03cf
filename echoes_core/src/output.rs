use bevy::prelude::*;

use crate::profile::PostProcessParams;
use crate::shader::ShaderInsanityDriver;

/// Which module produced the current rendered parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamWriter {
    Blender,
    Sequencer,
}

impl ParamWriter {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamWriter::Blender => "blender",
            ParamWriter::Sequencer => "sequencer",
        }
    }
}

/// The parameter set currently on screen.
///
/// Exactly one writer may touch it per frame; the per-frame counter makes a
/// violation observable instead of silently compositing two sources.
#[derive(Resource, Debug, Clone, Default)]
pub struct RenderedPostProcess {
    params: PostProcessParams,
    last_writer: Option<ParamWriter>,
    writes_this_frame: u32,
    total_writes: u64,
}

impl RenderedPostProcess {
    pub fn new(params: PostProcessParams) -> Self {
        Self {
            params,
            ..Self::default()
        }
    }

    pub fn params(&self) -> &PostProcessParams {
        &self.params
    }

    pub fn last_writer(&self) -> Option<ParamWriter> {
        self.last_writer
    }

    pub fn writes_this_frame(&self) -> u32 {
        self.writes_this_frame
    }

    pub fn total_writes(&self) -> u64 {
        self.total_writes
    }

    pub fn write(&mut self, params: PostProcessParams, writer: ParamWriter) {
        if self.writes_this_frame > 0 {
            tracing::warn!(
                target: "echoes::visuals",
                writer = writer.as_str(),
                "rendered_params.double_write"
            );
        }
        self.params = params;
        self.last_writer = Some(writer);
        self.writes_this_frame += 1;
        self.total_writes += 1;
    }

    pub fn begin_frame(&mut self) {
        self.writes_this_frame = 0;
    }
}

/// Renderer-side consumer of the computed values. Write-only.
pub trait PostProcessSink: Send + Sync {
    fn apply(&mut self, params: &PostProcessParams);

    /// Smoothed insanity level for material shaders.
    fn apply_shader_insanity(&mut self, _level: f32) {}
}

#[derive(Resource)]
pub struct RenderSink(Box<dyn PostProcessSink>);

impl RenderSink {
    pub fn new(sink: impl PostProcessSink + 'static) -> Self {
        Self(Box::new(sink))
    }
}

pub fn begin_output_frame(mut rendered: ResMut<RenderedPostProcess>) {
    rendered.begin_frame();
}

/// Push this frame's output to the renderer, if one is attached.
pub fn flush_render_sink(
    rendered: Res<RenderedPostProcess>,
    shader: Option<Res<ShaderInsanityDriver>>,
    sink: Option<ResMut<RenderSink>>,
) {
    let Some(mut sink) = sink else {
        return;
    };
    sink.0.apply(rendered.params());
    if let Some(shader) = shader {
        sink.0.apply_shader_insanity(shader.value());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bevy_ecs::system::RunSystemOnce;
    use std::sync::{Arc, Mutex};

    #[derive(Default, Clone)]
    struct Capture(Arc<Mutex<Vec<PostProcessParams>>>);

    impl PostProcessSink for Capture {
        fn apply(&mut self, params: &PostProcessParams) {
            self.0.lock().expect("capture lock").push(*params);
        }
    }

    #[test]
    fn write_tracks_writer_and_frame_count() {
        let mut rendered = RenderedPostProcess::default();
        let params = PostProcessParams {
            saturation: -20.0,
            ..Default::default()
        };
        rendered.write(params, ParamWriter::Sequencer);
        assert_eq!(rendered.writes_this_frame(), 1);
        assert_eq!(rendered.last_writer(), Some(ParamWriter::Sequencer));
        rendered.begin_frame();
        assert_eq!(rendered.writes_this_frame(), 0);
        assert_eq!(rendered.total_writes(), 1);
        assert_eq!(rendered.params().saturation, -20.0);
    }

    #[test]
    fn flush_forwards_current_params() {
        let capture = Capture::default();
        let mut world = World::default();
        world.insert_resource(RenderedPostProcess::new(PostProcessParams {
            contrast: 12.0,
            ..Default::default()
        }));
        world.insert_resource(RenderSink::new(capture.clone()));

        world.run_system_once(flush_render_sink);

        let frames = capture.0.lock().expect("capture lock");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].contrast, 12.0);
    }

    #[test]
    fn flush_without_sink_does_nothing() {
        let mut world = World::default();
        world.insert_resource(RenderedPostProcess::default());
        world.run_system_once(flush_render_sink);
    }
}
