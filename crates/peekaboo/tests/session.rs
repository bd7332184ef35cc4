//! Runs whole sessions against a local MJPEG server, with scripted detectors and display.

use std::{
    cell::RefCell,
    io::{prelude::*, BufReader, Cursor},
    net::TcpListener,
    rc::Rc,
    thread,
    time::Duration,
};

use image::{ImageOutputFormat, Rgb, RgbImage};
use peekaboo::{
    annotate::hand_bounds,
    config::Config,
    face::{DetectedFace, FaceDetector},
    gui::DisplaySink,
    hand::{DetectedHand, HandDetector, NUM_LANDMARKS},
    image::{Color, Image, ImageView, JpegBackend, Rect},
    session::{Session, Shutdown},
    video::HttpCamera,
};
use url::Url;

const BOUNDARY: &str = "123456789000000000000987654321";

fn jpeg(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, Rgb([128, 128, 128]));
    let mut out = Vec::new();
    img.write_to(&mut Cursor::new(&mut out), ImageOutputFormat::Jpeg(90))
        .unwrap();
    out
}

/// Serves a single MJPEG stream of `frames` and returns its URL.
///
/// The server closes the connection after the last frame and does not accept another one.
fn serve_mjpeg(frames: Vec<Vec<u8>>) -> Url {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    thread::spawn(move || {
        let (mut conn, _) = listener.accept().unwrap();
        let mut reader = BufReader::new(&conn);
        let mut line = String::new();
        while reader.read_line(&mut line).unwrap() > 0 && line != "\r\n" {
            line.clear();
        }
        drop(reader);

        let mut response = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: multipart/x-mixed-replace;boundary={BOUNDARY}\r\n\r\n"
        )
        .into_bytes();
        for frame in frames {
            response.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
                    frame.len()
                )
                .as_bytes(),
            );
            response.extend_from_slice(&frame);
            response.extend_from_slice(b"\r\n");
        }
        let _ = conn.write_all(&response);
    });
    Url::parse(&format!("http://{addr}/stream")).unwrap()
}

fn config(url: Url) -> Config {
    let mut config = Config::default();
    config.stream.url = url;
    config.stream.timeout = Some(Duration::from_secs(5));
    config.stream.jpeg_backend = JpegBackend::JpegDecoder;
    config.retry.delay = Duration::from_millis(10);
    config.retry.max_attempts = Some(3);
    config
}

struct OneFace(Rect);

impl FaceDetector for OneFace {
    fn detect(&mut self, _gray: ImageView<'_>) -> anyhow::Result<Vec<DetectedFace>> {
        Ok(vec![DetectedFace::new(self.0, 0.95)])
    }
}

struct OneHand(DetectedHand);

impl HandDetector for OneHand {
    fn process(&mut self, _rgb: ImageView<'_>) -> anyhow::Result<Vec<DetectedHand>> {
        Ok(vec![self.0.clone()])
    }
}

struct Recorder {
    frames: Rc<RefCell<Vec<Image>>>,
    quit_after: usize,
}

impl DisplaySink for Recorder {
    fn show(&mut self, _title: &str, frame: &Image) -> anyhow::Result<()> {
        self.frames.borrow_mut().push(frame.clone());
        Ok(())
    }

    fn poll_key(&mut self, _timeout: Duration) -> anyhow::Result<Option<char>> {
        Ok((self.frames.borrow().len() >= self.quit_after).then_some('q'))
    }
}

fn hand() -> DetectedHand {
    let mut landmarks = [[0.6, 0.6, 0.0]; NUM_LANDMARKS];
    landmarks[0] = [0.5, 0.8, 0.0];
    landmarks[4] = [0.8, 0.55, 0.0];
    landmarks[12] = [0.65, 0.25, 0.0];
    DetectedHand::new(landmarks, 0.9)
}

#[test]
fn annotates_streamed_frames() {
    let url = serve_mjpeg(vec![jpeg(80, 60), jpeg(80, 60)]);
    let frames = Rc::new(RefCell::new(Vec::new()));
    let face = Rect::from_top_left(8.0, 16.0, 20.0, 20.0);

    let config = config(url);
    let source = HttpCamera::from_config(&config.stream);
    let display = Recorder {
        frames: frames.clone(),
        quit_after: 2,
    };
    let shutdown = Session::new(config, source, OneFace(face), OneHand(hand()), display)
        .run()
        .unwrap();
    assert_eq!(shutdown, Shutdown::Quit);

    let frames = frames.borrow();
    assert_eq!(frames.len(), 2);
    for frame in frames.iter() {
        assert_eq!((frame.width(), frame.height()), (80, 60));
        assert_eq!(frame.get(8, 26), Color::BLUE);

        let bounds = hand_bounds(&hand(), frame.resolution());
        assert_eq!(bounds, Rect::from_ranges(40.0..=64.0, 15.0..=48.0));
        assert_eq!(frame.get(40, 30), Color::GREEN);
    }
}

#[test]
fn stream_that_ends_exhausts_retries() {
    let url = serve_mjpeg(vec![jpeg(32, 32)]);
    let frames = Rc::new(RefCell::new(Vec::new()));

    let config = config(url);
    let source = HttpCamera::from_config(&config.stream);
    let display = Recorder {
        frames: frames.clone(),
        quit_after: usize::MAX,
    };
    let face = OneFace(Rect::from_top_left(0.0, 0.0, 4.0, 4.0));
    let shutdown = Session::new(config, source, face, OneHand(hand()), display)
        .run()
        .unwrap();

    // The server only accepts one connection, so reconnecting fails too.
    assert_eq!(shutdown, Shutdown::RetriesExhausted);
    assert_eq!(frames.borrow().len(), 1);
}

#[test]
fn unreachable_camera() {
    let addr = TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap();
    let config = config(Url::parse(&format!("http://{addr}/stream")).unwrap());
    let source = HttpCamera::from_config(&config.stream);
    let frames = Rc::new(RefCell::new(Vec::new()));
    let display = Recorder {
        frames: frames.clone(),
        quit_after: 1,
    };

    let face = OneFace(Rect::from_top_left(0.0, 0.0, 4.0, 4.0));
    let shutdown = Session::new(config, source, face, OneHand(hand()), display)
        .run()
        .unwrap();
    assert_eq!(shutdown, Shutdown::StreamUnavailable);
    assert!(frames.borrow().is_empty());
}
