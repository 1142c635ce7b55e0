use std::sync::Arc;
use std::time::Duration;

use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use mreye_core::{ScreenGeometry, StimulusSpec};
use mreye_render::{Canvas, FrameSequence, MemoryLoader, Projection, Scene};
use tiny_skia::{Color, Pixmap};

const CLIP: &str = "clip";

fn clip_frame(width: u32, height: u32) -> Arc<Pixmap> {
    let mut pixmap = Pixmap::new(width, height).unwrap();
    pixmap.fill(Color::from_rgba8(90, 120, 160, 255));
    Arc::new(pixmap)
}

/// The standard task block: a full-height looping video under a fixation dot.
fn task_scene(geometry: &ScreenGeometry) -> Scene {
    let frames = (0..30).map(|_| clip_frame(960, 1080)).collect();
    let mut loader = MemoryLoader::new().with_source(CLIP, FrameSequence::new(frames));
    let mut scene = Scene::new(Projection::new(geometry));
    let stimuli = [
        StimulusSpec::Circle {
            x: 0.0,
            y: 0.0,
            radius: 0.25,
            color: [0, 0, 255],
            z: 1,
        },
        StimulusSpec::Video {
            path: CLIP.into(),
            x: 0.0,
            y: 0.0,
            z: 0,
            looping: true,
            fps: Some(30.0),
        },
    ];
    for spec in &stimuli {
        scene.add(spec, &mut loader).unwrap();
    }
    scene
}

pub fn bench_compose(c: &mut Criterion) {
    let geometry = ScreenGeometry::default();
    let mut g = c.benchmark_group("compose");
    g.sample_size(40);

    g.bench_function("task_frame", |b| {
        let scene = task_scene(&geometry);
        let mut canvas = Canvas::new(geometry.width(), geometry.height()).unwrap();
        b.iter(|| {
            scene.compose(&mut canvas);
            black_box(canvas.data());
        })
    });

    g.bench_function("advance_and_compose", |b| {
        b.iter_batched(
            || {
                let canvas = Canvas::new(geometry.width(), geometry.height()).unwrap();
                (task_scene(&geometry), canvas)
            },
            |(mut scene, mut canvas)| {
                for _ in 0..10 {
                    black_box(scene.advance(Duration::from_micros(16_667)));
                    scene.compose(&mut canvas);
                }
            },
            BatchSize::LargeInput,
        )
    });

    g.finish();
}

criterion_group!(benches, bench_compose);
criterion_main!(benches);
