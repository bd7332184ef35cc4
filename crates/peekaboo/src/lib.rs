//! Live face and hand annotation for network camera streams.
//!
//! A [`Session`](session::Session) reads frames from an IP camera, mirrors them, detects faces
//! (on a grayscale copy) and hand landmarks (on the color frame), draws the results and shows them
//! in a window until the quit key is pressed.
//!
//! Detection runs pretrained MediaPipe networks (BlazeFace, palm detection and hand landmarks)
//! through [tract]. The model files are loaded from disk at startup, see [`config`].
//!
//! # Coordinates
//!
//! All 2D coordinates are in pixels with X pointing right and Y pointing down, unless noted
//! otherwise. Hand landmarks are reported normalized to the frame size.
//!
//! # Environment Variables
//!
//! * `PEEKABOO_STREAM_URL`: URL of the camera stream (default `http://192.168.1.21:81/stream`).
//! * `PEEKABOO_MODEL_DIR`: directory containing the ONNX model files (default `models`).
//! * `PEEKABOO_JPEG_BACKEND`: JPEG decoder to use. Allowed values are:
//!   * `mozjpeg`: uses the [mozjpeg] library (default).
//!   * `jpeg-decoder`: uses the pure-Rust decoder of the `image` crate.
//! * `RUST_LOG`: overrides the log filter set up by [`init_logging!`].
//!
//! [tract]: https://github.com/sonos/tract
//! [mozjpeg]: https://github.com/mozilla/mozjpeg

use std::any::Any;

use log::LevelFilter;

pub mod annotate;
pub mod config;
pub mod detection;
pub mod face;
pub mod gui;
pub mod hand;
pub mod image;
pub mod landmark;
pub mod nn;
pub mod num;
pub mod preprocess;
pub mod rect;
pub mod resolution;
pub mod session;
pub mod timer;
pub mod video;

#[doc(hidden)]
pub fn init_logging(binary: &'static str) {
    let mut builder = env_logger::Builder::new();
    for target in [binary, env!("CARGO_CRATE_NAME")] {
        builder.filter(Some(target), LevelFilter::Debug);
    }
    // The GPU stack is chatty below warn level.
    for target in ["wgpu", "naga"] {
        builder.filter(Some(target), LevelFilter::Warn);
    }
    // A logger installed earlier (by a test harness, say) stays in place.
    builder.parse_default_env().try_init().ok();
}

/// Sets up *stderr* logging for the calling binary.
///
/// Both the binary and this library log at *debug* level; `wgpu` and `naga` are limited to
/// *warn*. `RUST_LOG` takes precedence over these defaults.
#[macro_export]
macro_rules! init_logging {
    () => {
        $crate::init_logging(env!("CARGO_CRATE_NAME"))
    };
}

/// Extracts the message from the payload of a caught panic.
pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(msg) => *msg,
        Err(payload) => match payload.downcast::<&'static str>() {
            Ok(msg) => msg.to_string(),
            Err(_) => "unknown panic payload".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use std::panic::catch_unwind;

    use super::*;

    #[test]
    fn panic_messages() {
        let payload = catch_unwind(|| panic!("static message")).unwrap_err();
        assert_eq!(panic_message(payload), "static message");

        let code = 7;
        let payload = catch_unwind(|| panic!("formatted {code}")).unwrap_err();
        assert_eq!(panic_message(payload), "formatted 7");

        let payload = catch_unwind(|| std::panic::panic_any(3u8)).unwrap_err();
        assert_eq!(panic_message(payload), "unknown panic payload");
    }
}
