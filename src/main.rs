//! AutoAxe - Play-again macro
//!
//! Clicks the "Play Again" button whenever it is on screen and otherwise
//! holds the skip key to move the game along. Press Q (or Ctrl+C) to exit.

use autoaxe::{
    create_injector, elevation, logging::init_logging, resolve_target_image, AutoAxeError,
    Automation, Config, HotkeyWatcher, InterruptiblePacer, Session, StopReason, XcapLocator,
};
use std::io::{self, BufRead, Write};
use std::process::ExitCode;
use std::sync::atomic::Ordering;
use tracing::{error, info};

/// Keep the console open until the operator acknowledges
fn wait_for_enter() {
    print!("Press Enter to exit...");
    let _ = io::stdout().flush();
    let _ = io::stdin().lock().read_line(&mut String::new());
}

fn fail(message: &str) -> ExitCode {
    println!("Error: {}", message);
    wait_for_enter();
    ExitCode::FAILURE
}

fn main() -> ExitCode {
    let config = Config::from_env();

    // Re-launching replaces the process, so it has to happen before the
    // log file is opened.
    let elevation = if config.elevate {
        elevation::ensure_elevated()
    } else {
        Ok(())
    };

    let _guard = match init_logging(&config) {
        Ok(guard) => guard,
        Err(e) => return fail(&e.to_string()),
    };

    if let Err(e) = elevation {
        error!("{}", e);
        return fail(&e.to_string());
    }

    info!("Starting AutoAxe: {:?} input + screen template matching", config.injector);
    info!(
        "Config: image='{}', confidence={}, grayscale={}, hold={:?}",
        config.image_name, config.confidence, config.grayscale, config.hold_duration
    );

    // Set up Ctrl+C handler for graceful shutdown
    let session = Session::new();
    let running = session.running_flag();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("Shutdown signal received");
        running.store(false, Ordering::SeqCst);
    }) {
        error!("Failed to set Ctrl+C handler: {}", e);
        return fail(&e.to_string());
    }

    let target = match resolve_target_image(&config.image_name) {
        Ok(target) => target,
        Err(AutoAxeError::AssetNotFound { candidates }) => {
            let checked: Vec<String> = candidates.iter().map(|p| p.display().to_string()).collect();
            error!("Cannot find '{}'. Checked: {}", config.image_name, checked.join(", "));
            println!(
                "Error: Cannot find '{}'. Please put the screenshot in one of:",
                config.image_name
            );
            for path in &candidates {
                println!("  {}", path.display());
            }
            wait_for_enter();
            return ExitCode::FAILURE;
        }
        Err(e) => {
            error!("{}", e);
            return fail(&e.to_string());
        }
    };

    let locator = match XcapLocator::new(config.pyramid_factor) {
        Ok(locator) => locator,
        Err(e) => {
            error!("{}", e);
            return fail(&e.to_string());
        }
    };

    let injector = match create_injector(config.injector) {
        Ok(injector) => injector,
        Err(e) => {
            error!("{}", e);
            error!("For uinput access run as root (AUTOAXE_ELEVATE=1) or add your user to the 'input' group");
            return fail(&e.to_string());
        }
    };

    info!("Input simulator ready");

    let hotkey = HotkeyWatcher::start(config.exit_key);
    let pacer = InterruptiblePacer::new(session.running_flag());
    let exit_key = config.exit_key;

    println!("Script is running. Press {:?} to exit.", exit_key);

    let mut automation = Automation::new(
        config,
        target,
        Box::new(locator),
        injector,
        Box::new(hotkey),
        Box::new(pacer),
        session,
    );
    let session = automation.run();
    info!(
        "AutoAxe shutting down after {} iterations ({} clicks, {} fallbacks)",
        session.iterations, session.clicks, session.fallbacks
    );

    match &session.stop_reason {
        Some(StopReason::Hotkey) => {
            println!("\n{:?} key pressed. Script stopped.", exit_key);
            ExitCode::SUCCESS
        }
        Some(StopReason::Interrupted) | None => {
            println!("\nScript stopped.");
            ExitCode::SUCCESS
        }
        Some(StopReason::Failed(e)) => {
            println!("An error occurred: {}", e);
            wait_for_enter();
            ExitCode::FAILURE
        }
    }
}
