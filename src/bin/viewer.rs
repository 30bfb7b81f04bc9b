// src/bin/viewer.rs
// Interactive viewer: window + input plumbing around a render session.
// Usage: viewer <scene.obj> [sky.hdr]

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use winit::event::{ElementState, Event, WindowEvent};
use winit::event_loop::EventLoop;
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::WindowBuilder;

use raywave::input::{Input, Key};
use raywave::{Session, Settings};

const DEFAULT_WIDTH: u32 = 1280;
const DEFAULT_HEIGHT: u32 = 720;

struct Args {
    scene: PathBuf,
    sky: PathBuf,
}

fn parse_args() -> Result<Args> {
    let mut positional = std::env::args().skip(1);
    let Some(scene) = positional.next() else {
        bail!("usage: viewer <scene.obj> [sky.hdr]");
    };
    let sky = positional
        .next()
        .unwrap_or_else(|| "data/sky.hdr".to_string());
    Ok(Args {
        scene: PathBuf::from(scene),
        sky: PathBuf::from(sky),
    })
}

fn map_key(code: KeyCode) -> Option<Key> {
    match code {
        KeyCode::KeyW => Some(Key::W),
        KeyCode::KeyA => Some(Key::A),
        KeyCode::KeyS => Some(Key::S),
        KeyCode::KeyD => Some(Key::D),
        KeyCode::Space => Some(Key::Space),
        KeyCode::ShiftLeft => Some(Key::LShift),
        KeyCode::ArrowUp => Some(Key::Up),
        KeyCode::ArrowDown => Some(Key::Down),
        KeyCode::ArrowLeft => Some(Key::Left),
        KeyCode::ArrowRight => Some(Key::Right),
        KeyCode::KeyF => Some(Key::F),
        _ => None,
    }
}

/// Settings toggles on key press; returns the changed settings.
fn toggle_settings(settings: Settings, code: KeyCode) -> Settings {
    let mut s = settings;
    match code {
        KeyCode::Digit1 => s.enable_rasterization = !s.enable_rasterization,
        KeyCode::Digit2 => s.enable_svgf = !s.enable_svgf,
        KeyCode::Digit3 => s.enable_spatial_variance = !s.enable_spatial_variance,
        KeyCode::Digit4 => s.enable_taa = !s.enable_taa,
        KeyCode::Digit5 => s.enable_albedo = !s.enable_albedo,
        KeyCode::BracketLeft => {
            s.svgf.atrous_iterations = (s.svgf.atrous_iterations - 1).max(0)
        }
        KeyCode::BracketRight => {
            s.svgf.atrous_iterations =
                (s.svgf.atrous_iterations + 1).min(raywave::svgf::MAX_ATROUS_ITERATIONS as i32)
        }
        _ => {}
    }
    s
}

fn run() -> Result<()> {
    env_logger::init();
    let args = parse_args()?;

    let event_loop = EventLoop::new().context("event loop creation failed")?;
    let window = Arc::new(
        WindowBuilder::new()
            .with_title("raywave")
            .with_inner_size(winit::dpi::LogicalSize::new(
                DEFAULT_WIDTH as f64,
                DEFAULT_HEIGHT as f64,
            ))
            .build(&event_loop)
            .context("window creation failed")?,
    );

    let mut session: Option<Session> = None;
    let mut input = Input::new();
    let mut last_frame = Instant::now();

    event_loop.run(move |event, elwt| {
        elwt.set_control_flow(winit::event_loop::ControlFlow::Poll);
        match event {
            Event::Resumed => {
                if session.is_none() {
                    let size = window.inner_size();
                    match Session::init(
                        &args.scene,
                        &args.sky,
                        Arc::clone(&window),
                        size.width.max(1),
                        size.height.max(1),
                    ) {
                        Ok(s) => {
                            session = Some(s);
                            last_frame = Instant::now();
                        }
                        Err(e) => {
                            eprintln!("fatal: {e}");
                            std::process::exit(1);
                        }
                    }
                }
            }
            Event::WindowEvent { event, .. } => match event {
                WindowEvent::CloseRequested => elwt.exit(),
                WindowEvent::Resized(size) => {
                    if let Some(session) = session.as_mut() {
                        if let Err(e) = session.resize(size.width, size.height) {
                            eprintln!("fatal: {e}");
                            std::process::exit(1);
                        }
                    }
                }
                WindowEvent::KeyboardInput { event, .. } => {
                    if let PhysicalKey::Code(code) = event.physical_key {
                        let down = event.state == ElementState::Pressed;
                        if let Some(key) = map_key(code) {
                            input.set_key(key, down);
                        }
                        if down && !event.repeat {
                            if let Some(session) = session.as_mut() {
                                let settings = toggle_settings(session.settings(), code);
                                session.set_settings(settings);
                            }
                        }
                    }
                }
                WindowEvent::RedrawRequested => {
                    if let Some(session) = session.as_mut() {
                        let now = Instant::now();
                        let delta = (now - last_frame).as_secs_f32();
                        last_frame = now;

                        session.update(delta, &input);
                        input.begin_frame();

                        if let Err(e) = session.render() {
                            eprintln!("fatal: {e}");
                            std::process::exit(1);
                        }
                    }
                    window.request_redraw();
                }
                _ => {}
            },
            Event::AboutToWait => {
                window.request_redraw();
            }
            _ => {}
        }
    })?;

    Ok(())
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}
