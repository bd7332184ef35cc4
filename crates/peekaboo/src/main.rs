use peekaboo::config::Config;
use peekaboo::face::BlazeFaceDetector;
use peekaboo::gui::Display;
use peekaboo::hand::MediaPipeHands;
use peekaboo::session::Session;
use peekaboo::video::HttpCamera;

fn main() {
    peekaboo::init_logging!();

    if let Err(e) = run() {
        log::error!("an unexpected error occurred: {e:#}");
    }
    log::info!("window closed and resources released");
}

fn run() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    log::debug!("{config:#?}");

    let face_detector = BlazeFaceDetector::from_config(&config.face)?;
    let hand_detector = MediaPipeHands::from_config(&config.hand)?;
    let source = HttpCamera::from_config(&config.stream);
    let display = Display::new()?;

    let shutdown = Session::new(config, source, face_detector, hand_detector, display).run()?;
    log::debug!("session ended: {shutdown:?}");
    Ok(())
}
