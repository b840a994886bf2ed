//! Wiring of the run loop, buttons and image cache into one application.

use crate::button::{Buttons, EdgeSink};
use crate::cache::{HttpClient, ImageCache, ReqwestClient};
use crate::clock::{Clock, SystemClock};
use crate::run_loop::RunLoop;
use crate::settings::Settings;
use anyhow::Result;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

pub struct App {
    settings: Settings,
    run_loop: RunLoop,
    buttons: Rc<Buttons>,
    images: Arc<ImageCache>,
}

impl App {
    /// Build an app that talks to the network with `reqwest` and reads the
    /// system clock.
    pub fn new(settings: Settings) -> Result<Self> {
        let http = ReqwestClient::from_settings(&settings)?;
        Ok(Self::with_parts(settings, Arc::new(http), Arc::new(SystemClock)))
    }

    pub fn with_parts(settings: Settings, http: Arc<dyn HttpClient>, clock: Arc<dyn Clock>) -> Self {
        let run_loop = RunLoop::with_config(settings.loop_config());
        let buttons = Rc::new(Buttons::new(settings.hold_time, clock.clone()));
        buttons.install(&run_loop);
        let images = Arc::new(ImageCache::new(settings.image_cache_capacity, http, clock));
        Self {
            settings,
            run_loop,
            buttons,
            images,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn run_loop(&self) -> &RunLoop {
        &self.run_loop
    }

    pub fn buttons(&self) -> &Rc<Buttons> {
        &self.buttons
    }

    pub fn images(&self) -> &Arc<ImageCache> {
        &self.images
    }

    /// Sink for hardware edges; may be moved to another thread.
    pub fn edge_sink(&self) -> EdgeSink {
        self.buttons.edge_sink()
    }

    /// Refresh the display after every timer action and on every wait spin.
    pub fn set_redraw_callback<F>(&self, redraw: F)
    where
        F: FnMut() -> Result<()> + 'static,
    {
        let redraw = Rc::new(RefCell::new(redraw));
        let after = Rc::clone(&redraw);
        self.run_loop.add_after_action_callback(move || match after.try_borrow_mut() {
            Ok(mut f) => (&mut *f)(),
            Err(_) => Ok(()),
        });
        self.run_loop.add_wait_callback(move || match redraw.try_borrow_mut() {
            Ok(mut f) => (&mut *f)(),
            Err(_) => Ok(()),
        });
    }

    /// Run until the loop is stopped, calling `loop_fn` at `loop_fps`.
    pub fn run<F>(&self, loop_fn: Option<F>)
    where
        F: FnMut() -> Result<()> + 'static,
    {
        if let Some(mut loop_fn) = loop_fn {
            self.run_loop
                .every(self.settings.loop_period(), move |_| loop_fn());
        }
        tracing::info!(fps = self.settings.loop_fps, "starting app");
        self.run_loop.run();
    }

    pub fn stop(&self) {
        self.run_loop.stop();
    }
}
