pub mod app;
pub mod asset;
pub mod error;
pub mod io;
pub mod params;
pub mod render_loop;
pub mod renderer;
pub mod scene;
pub mod settings;
pub mod showcase;
pub mod stage;
pub mod time;

use std::sync::Arc;

use app::App;
use error::StartupError;
use io::FileFetcher;
use settings::ShowcaseSettings;
use showcase::Showcase;
use time::FrameClock;
use winit::event_loop::EventLoop;

pub fn init_logging() {
    let _ = env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .try_init();
}

pub fn run() -> Result<(), StartupError> {
    init_logging();

    log::info!("Starting orbit showcase");

    let settings = ShowcaseSettings::load();
    let fetcher = Arc::new(FileFetcher::new(&settings.assets.root));
    let showcase = Showcase::new(&settings, fetcher, FrameClock::monotonic())?;

    let event_loop = EventLoop::new()?;
    let mut app = App::new(settings, showcase);

    let result = event_loop.run_app(&mut app);

    if let Err(ref err) = result {
        log::error!("Application error: {}", err);
    }
    if let Some(err) = app.take_startup_error() {
        return Err(err);
    }

    log::info!("Application shutdown complete");

    result.map_err(StartupError::from)
}
