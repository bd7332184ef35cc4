//! The live annotation loop.

use std::thread;

use crate::annotate::annotate;
use crate::config::Config;
use crate::face::FaceDetector;
use crate::gui::DisplaySink;
use crate::hand::HandDetector;
use crate::preprocess::preprocess;
use crate::timer::{FpsCounter, Timer};
use crate::video::{FrameStream, StreamSource};

/// Why a [`Session`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shutdown {
    /// The quit key was pressed.
    Quit,
    /// The video stream could not be opened.
    StreamUnavailable,
    /// Reading frames kept failing for longer than the configured retry policy allows.
    RetriesExhausted,
}

/// Reads frames from a camera, annotates detected faces and hands, and shows the result.
///
/// A session owns its detectors and its display for its whole lifetime. [`Session::run`] consumes
/// the session, so the video stream and the display are released exactly once, on every exit
/// path.
pub struct Session<S, F, H, D> {
    config: Config,
    source: S,
    face_detector: F,
    hand_detector: H,
    display: D,
}

impl<S, F, H, D> Session<S, F, H, D>
where
    S: StreamSource,
    F: FaceDetector,
    H: HandDetector,
    D: DisplaySink,
{
    pub fn new(config: Config, source: S, face_detector: F, hand_detector: H, display: D) -> Self {
        Self {
            config,
            source,
            face_detector,
            hand_detector,
            display,
        }
    }

    /// Runs the loop until the quit key is pressed or the stream becomes unusable.
    ///
    /// Failing to open the stream, or running out of read retries, ends the session with the
    /// corresponding [`Shutdown`] value. Errors from the detectors or the display are returned.
    pub fn run(self) -> anyhow::Result<Shutdown> {
        let Self {
            config,
            mut source,
            mut face_detector,
            mut hand_detector,
            mut display,
        } = self;
        let url = &config.stream.url;
        let retry = config.retry;

        let mut stream = match source.open(url) {
            Ok(stream) => stream,
            Err(e) => {
                log::error!("could not open video stream at {url}: {e:#}");
                log::error!("check the URL and make sure the camera is streaming");
                return Ok(Shutdown::StreamUnavailable);
            }
        };
        log::info!(
            "successfully connected to {url}, press '{}' to quit",
            config.display.quit_key
        );

        let t_faces = Timer::new("faces");
        let t_hands = Timer::new("hands");
        let t_annotate = Timer::new("annotate");
        let t_display = Timer::new("display");
        let mut fps = FpsCounter::new("session");
        let mut failures = 0;
        loop {
            let frame = match stream.read() {
                Ok(frame) => {
                    failures = 0;
                    frame
                }
                Err(e) => {
                    failures += 1;
                    if retry.max_attempts.map_or(false, |max| failures > max) {
                        log::error!("failed to grab frame after {failures} attempts: {e:#}");
                        return Ok(Shutdown::RetriesExhausted);
                    }
                    log::warn!("failed to grab frame, retrying... ({e:#})");
                    thread::sleep(retry.delay);
                    continue;
                }
            };

            let pre = preprocess(frame);
            let faces = t_faces.time(|| face_detector.detect(pre.gray()))?;
            let hands = t_hands.time(|| hand_detector.process(pre.rgb()))?;
            log::trace!("{} faces, {} hands", faces.len(), hands.len());

            let mut frame = pre.into_frame();
            t_annotate.time(|| annotate(&mut frame, &faces, &hands));
            let key = t_display.time(|| -> anyhow::Result<_> {
                display.show(&config.display.title, &frame)?;
                display.poll_key(config.display.key_poll)
            })?;
            if key == Some(config.display.quit_key) {
                log::info!("quit key pressed");
                return Ok(Shutdown::Quit);
            }

            let stages = [&t_faces, &t_hands, &t_annotate, &t_display];
            fps.tick_with(
                stages
                    .into_iter()
                    .chain(stream.timers())
                    .chain(face_detector.timers())
                    .chain(hand_detector.timers()),
            );
        }
    }
}
