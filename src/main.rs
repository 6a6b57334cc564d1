// =============================================================================
// VULKAN TRIANGLE RENDERER
// =============================================================================
//
// Opens a window and draws one triangle every frame until the window is
// closed, then tears every GPU object down in reverse dependency order.
//
// ARCHITECTURE OVERVIEW:
// ┌─────────────────────────────────────────────────────────────────┐
// │  main loop (draw_frame, poll_events)                            │
// │    └── Renderer (owning context, Drop = teardown)               │
// │          └── Device context (instance, adapter, device, queues) │
// │                └── Pipeline + vertex buffer + recordings        │
// │                      └── Frame sync set (fence, semaphores)     │
// └─────────────────────────────────────────────────────────────────┘
//
// FRAME FLOW:
// 1. Wait for the previous frame's fence
// 2. Reset the fence
// 3. Acquire swapchain image
// 4. Submit the pre-recorded commands for that image
// 5. Present
//
// =============================================================================

mod backend;
mod config;
mod error;
mod platform;
mod renderer;

use anyhow::Result;
use config::Config;
use platform::AppWindow;
use renderer::Renderer;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::time::Instant;

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    let config = Config::load();

    init_logging(&config);
    log::info!("Starting Vulkan triangle renderer");
    log::info!(
        "Window: {}x{} ({})",
        config.window.width,
        config.window.height,
        config.window.title
    );
    log::info!("Present mode: {}", config.graphics.present_mode);

    let mut window = AppWindow::create(
        config.window.width,
        config.window.height,
        &config.window.title,
    )
    .map_err(fatal)?;

    // A failed init has already torn down whatever it created
    let mut renderer = match Renderer::new(&config, &window) {
        Ok(renderer) => renderer,
        Err(e) => {
            window.destroy();
            return Err(fatal(e));
        }
    };

    if let Some(name) = renderer.adapter_name() {
        log::info!("Rendering on {}", name);
    }

    let started = Instant::now();
    let result = run(&mut renderer, &mut window);

    let elapsed = started.elapsed().as_secs_f32();
    if elapsed > 0.0 {
        log::info!(
            "{} frames in {:.1}s ({:.1} fps)",
            renderer.frames_drawn(),
            elapsed,
            renderer.frames_drawn() as f32 / elapsed
        );
    }

    // GPU objects reference the surface, so they go before the window
    drop(renderer);
    window.destroy();

    result.map_err(fatal)
}

/// Draw until the window asks to close or a frame fails
fn run(renderer: &mut Renderer, window: &mut AppWindow) -> error::RendererResult<()> {
    while !window.should_close() {
        let report = renderer.draw_frame()?;
        log::trace!("Image {} -> {:?}", report.image_index, report.present);
        window.poll_events();
    }
    Ok(())
}

/// Log the failing stage and convert for the process exit path
fn fatal(e: error::RendererError) -> anyhow::Error {
    log::error!("failed stage: {}: {}", e.stage(), e);
    e.into()
}

/// Initialize logging, to stderr or to the configured log file
fn init_logging(config: &Config) {
    use env_logger::{Builder, Target};
    use log::LevelFilter;

    let mut builder = Builder::new();
    builder.filter_level(LevelFilter::Info);
    builder.parse_default_env();

    let mut file_error = None;
    if config.debug.log_to_file {
        match open_log_file(Path::new(&config.debug.log_file)) {
            Ok(file) => {
                builder.target(Target::Pipe(Box::new(file)));
            }
            Err(e) => file_error = Some(e),
        }
    }

    builder.init();

    if let Some(e) = file_error {
        log::warn!(
            "Could not open log file {:?}, logging to stderr: {}",
            config.debug.log_file,
            e
        );
    }
}

/// Create/clear the log file and write its banner
fn open_log_file(path: &Path) -> std::io::Result<File> {
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)?;

    writeln!(file, "=== Vulkan Triangle Renderer Log ===")?;
    writeln!(file, "Started: {:?}", std::time::SystemTime::now())?;
    writeln!(file)?;
    Ok(file)
}
