pub mod app;
pub mod button;
pub mod cache;
pub mod callbacks;
pub mod clock;
pub mod logging;
pub mod run_loop;
pub mod settings;

pub use app::App;
pub use button::{ActionKind, Button, ButtonState, ButtonStateMachine, Buttons, EdgeSink};
pub use cache::{CacheError, Image, ImageCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use run_loop::{ActionRef, LoopConfig, RunLoop, RunLoopError, Timer, TimerHandle};
pub use settings::Settings;
