use renderer_bootstrap::{RendererConfig, RendererSession};
use std::{error::Error, process::ExitCode};
use tracing_subscriber::EnvFilter;
use winit::{
    dpi::PhysicalSize,
    event::{Event, KeyboardInput, StartCause, VirtualKeyCode, WindowEvent},
    event_loop::{ControlFlow, EventLoop},
    platform::run_return::EventLoopExtRunReturn,
    window::WindowBuilder,
};

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match RendererConfig::default().apply_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };

    let mut event_loop = EventLoop::new();
    let window = match WindowBuilder::new()
        .with_title(&config.window.title)
        .with_inner_size(PhysicalSize::new(config.window.width, config.window.height))
        .with_resizable(config.window.resizable)
        .build(&event_loop)
    {
        Ok(window) => window,
        Err(err) => {
            eprintln!("error: failed to create window: {err}");
            return ExitCode::FAILURE;
        }
    };

    let session = match RendererSession::new(&config, &window) {
        Ok(session) => session,
        Err(err) => {
            eprintln!("error: {err}");
            let mut source = err.source();
            while let Some(cause) = source {
                eprintln!("  caused by: {cause}");
                source = cause.source();
            }
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(
        metadata = ?session.instance_metadata(),
        device = ?session.device(),
        "renderer bootstrapped"
    );

    event_loop.run_return(|event, _, control_flow| match event {
        Event::NewEvents(StartCause::Init) => *control_flow = ControlFlow::Poll,
        Event::WindowEvent {
            event:
                WindowEvent::CloseRequested
                | WindowEvent::KeyboardInput {
                    input:
                        KeyboardInput {
                            virtual_keycode: Some(VirtualKeyCode::Escape),
                            ..
                        },
                    ..
                },
            ..
        } => *control_flow = ControlFlow::Exit,
        _ => (),
    });

    // The surface must go before the window it was created for.
    drop(session);
    drop(window);

    ExitCode::SUCCESS
}
