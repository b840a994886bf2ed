use std::io::BufRead;
use std::path::PathBuf;

use ting_sdk::{App, ButtonState, Settings};

/// Headless runner: reads `<index> <down|up>` lines from stdin as button
/// edges and logs the resulting actions. An optional image location given
/// as the first argument is loaded through the cache every few seconds.
fn main() -> anyhow::Result<()> {
    let settings = Settings::load("settings.json")?;
    ting_sdk::logging::init(settings.debug_logging, settings.log_file.clone().map(PathBuf::from));

    let app = App::new(settings)?;

    for name in ting_sdk::button::BUTTON_NAMES {
        if let Some(button) = app.buttons().get(name) {
            button.on_press(move || {
                tracing::info!(button = name, "press");
                Ok(())
            });
            button.on_hold(move || {
                tracing::info!(button = name, "hold");
                Ok(())
            });
        }
    }

    let sink = app.edge_sink();
    let stopper = app.run_loop().deferred_sender();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            let mut parts = line.split_whitespace();
            let index = parts.next().and_then(|s| s.parse::<usize>().ok());
            let state = parts.next().and_then(|s| s.parse::<ButtonState>().ok());
            match (index, state) {
                (Some(index), Some(state)) => sink.button_callback(index, state),
                _ => tracing::warn!("expected '<index> <down|up>', got '{line}'"),
            }
        }
        let _ = stopper.call(|rl| {
            rl.stop();
            Ok(())
        });
    });

    if let Some(location) = std::env::args().nth(1) {
        let images = app.images().clone();
        app.run_loop()
            .every(std::time::Duration::from_secs(5), move |_| {
                let image = images.get_image(&location)?;
                tracing::info!(%location, width = image.width(), height = image.height(), "image ready");
                Ok(())
            });
    }

    app.run(None::<fn() -> anyhow::Result<()>>);
    Ok(())
}
