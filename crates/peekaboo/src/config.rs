//! Runtime configuration.
//!
//! [`Config::default`] reproduces the values the program always ran with. A few values can be
//! overridden through environment variables, see [`Config::from_env`].

use std::{
    env,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context;
use url::Url;

use crate::image::JpegBackend;

/// Address of the camera stream used when nothing else is configured.
pub const DEFAULT_STREAM_URL: &str = "http://192.168.1.21:81/stream";

/// Directory that model files are loaded from when nothing else is configured.
pub const DEFAULT_MODEL_DIR: &str = "models";

/// Title of the display window.
pub const WINDOW_TITLE: &str = "Hand and Face Detection";

const FACE_MODEL: &str = "face_detection_short_range.onnx";
const PALM_MODEL: &str = "palm_detection_lite.onnx";
const HAND_LANDMARK_MODEL: &str = "hand_landmark_lite.onnx";

/// Complete configuration of a [`Session`](crate::session::Session).
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub stream: StreamConfig,
    pub retry: RetryPolicy,
    pub face: FaceConfig,
    pub hand: HandConfig,
    pub display: DisplayConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self::with_model_dir(Path::new(DEFAULT_MODEL_DIR))
    }
}

impl Config {
    /// Creates the default configuration, loading all models from `dir`.
    pub fn with_model_dir(dir: &Path) -> Self {
        Self {
            stream: StreamConfig::default(),
            retry: RetryPolicy::default(),
            face: FaceConfig {
                model: dir.join(FACE_MODEL),
                ..FaceConfig::default()
            },
            hand: HandConfig {
                palm_model: dir.join(PALM_MODEL),
                landmark_model: dir.join(HAND_LANDMARK_MODEL),
                ..HandConfig::default()
            },
            display: DisplayConfig::default(),
        }
    }

    /// Creates the default configuration and applies overrides from the process environment.
    ///
    /// Recognized variables:
    ///
    /// * `PEEKABOO_STREAM_URL`: URL of the camera stream.
    /// * `PEEKABOO_MODEL_DIR`: directory containing the ONNX model files.
    /// * `PEEKABOO_JPEG_BACKEND`: `mozjpeg` or `jpeg-decoder`.
    ///
    /// Returns an error if a variable is set to an invalid value.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let mut config = match lookup("PEEKABOO_MODEL_DIR") {
            Some(dir) => Self::with_model_dir(Path::new(&dir)),
            None => Self::default(),
        };

        if let Some(url) = lookup("PEEKABOO_STREAM_URL") {
            config.stream.url = Url::parse(&url)
                .with_context(|| format!("invalid value for `PEEKABOO_STREAM_URL`: '{url}'"))?;
        }
        if let Some(backend) = lookup("PEEKABOO_JPEG_BACKEND") {
            config.stream.jpeg_backend = backend
                .parse()
                .context("invalid value for `PEEKABOO_JPEG_BACKEND`")?;
        }

        Ok(config)
    }
}

/// Where and how to read camera frames.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamConfig {
    pub url: Url,
    /// Connect and read timeout of the camera connection. `None` blocks indefinitely.
    pub timeout: Option<Duration>,
    pub jpeg_backend: JpegBackend,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            url: default_stream_url(),
            timeout: None,
            jpeg_backend: JpegBackend::default(),
        }
    }
}

fn default_stream_url() -> Url {
    match Url::parse(DEFAULT_STREAM_URL) {
        Ok(url) => url,
        Err(e) => unreachable!("default stream URL is invalid: {e}"),
    }
}

/// How the session reacts to frames that could not be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Time to wait before the next read attempt.
    pub delay: Duration,
    /// How often a failed read is retried before giving up. `None` retries forever.
    ///
    /// Counts consecutive failures only; a successful read resets the count.
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(500),
            max_attempts: None,
        }
    }
}

/// Parameters of the face detector.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceConfig {
    /// Size ratio between consecutive levels of the detection pyramid.
    pub scale_factor: f32,
    /// Number of overlapping raw detections, besides the strongest one, a face needs to be
    /// reported.
    pub min_neighbors: u32,
    /// Maximum number of pyramid levels to run the network on.
    pub max_levels: u32,
    pub model: PathBuf,
}

impl Default for FaceConfig {
    fn default() -> Self {
        Self {
            scale_factor: 1.3,
            min_neighbors: 5,
            max_levels: 4,
            model: Path::new(DEFAULT_MODEL_DIR).join(FACE_MODEL),
        }
    }
}

/// Parameters of the hand landmark detector.
#[derive(Debug, Clone, PartialEq)]
pub struct HandConfig {
    pub max_hands: usize,
    /// Minimum palm detection confidence.
    pub min_detection_confidence: f32,
    /// Minimum hand presence score reported by the landmark network.
    pub min_presence: f32,
    pub palm_model: PathBuf,
    pub landmark_model: PathBuf,
}

impl Default for HandConfig {
    fn default() -> Self {
        let dir = Path::new(DEFAULT_MODEL_DIR);
        Self {
            max_hands: 2,
            min_detection_confidence: 0.5,
            min_presence: 0.5,
            palm_model: dir.join(PALM_MODEL),
            landmark_model: dir.join(HAND_LANDMARK_MODEL),
        }
    }
}

/// Display window settings.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayConfig {
    pub title: String,
    /// How long each iteration waits for keyboard input.
    pub key_poll: Duration,
    /// Key that ends the session.
    pub quit_key: char,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            title: WINDOW_TITLE.to_string(),
            key_poll: Duration::from_millis(1),
            quit_key: 'q',
        }
    }
}
