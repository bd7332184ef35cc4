//! On-screen display of annotated frames.
//!
//! [`Display`] drives the windowing event loop on the calling thread: events are only processed
//! while [`DisplaySink::show`] or [`DisplaySink::poll_key`] run.

mod renderer;

use std::{
    collections::VecDeque,
    panic::catch_unwind,
    time::{Duration, Instant},
};

use anyhow::anyhow;

use winit::{
    event::{Event, WindowEvent},
    event_loop::{ControlFlow, EventLoop, EventLoopBuilder},
    platform::run_return::EventLoopExtRunReturn,
};

use crate::image::Image;

use self::renderer::Renderer;

/// Something annotated frames can be shown on.
pub trait DisplaySink {
    /// Shows `frame` in the window titled `title`, replacing the previous frame.
    fn show(&mut self, title: &str, frame: &Image) -> anyhow::Result<()>;

    /// Waits up to `timeout` for a keypress and returns the typed character, if any.
    fn poll_key(&mut self, timeout: Duration) -> anyhow::Result<Option<char>>;
}

impl<D: DisplaySink + ?Sized> DisplaySink for Box<D> {
    fn show(&mut self, title: &str, frame: &Image) -> anyhow::Result<()> {
        (**self).show(title, frame)
    }

    fn poll_key(&mut self, timeout: Duration) -> anyhow::Result<Option<char>> {
        (**self).poll_key(timeout)
    }
}

/// A native window showing one frame at a time.
///
/// The window is opened when the first frame is shown and closed when the [`Display`] is dropped.
/// Requests to close the window through the window manager are ignored; the window stays open
/// until its owner is done with it.
pub struct Display {
    event_loop: EventLoop<()>,
    renderer: Option<Renderer>,
    title: String,
    keys: VecDeque<char>,
}

impl Display {
    /// Connects to the native display server.
    ///
    /// Must be called on the main thread. Fails when no display server is available.
    pub fn new() -> anyhow::Result<Self> {
        // winit panics instead of returning an error when it cannot connect.
        let event_loop = catch_unwind(|| EventLoopBuilder::new().build()).map_err(|panic| {
            anyhow!(
                "failed to connect to the display server: {}",
                crate::panic_message(panic)
            )
        })?;

        Ok(Self {
            event_loop,
            renderer: None,
            title: String::new(),
            keys: VecDeque::new(),
        })
    }

    /// Processes pending window events until `deadline` or until a key was typed.
    fn pump_events(&mut self, deadline: Instant) -> anyhow::Result<()> {
        let renderer = &mut self.renderer;
        let keys = &mut self.keys;
        let mut error = None;
        self.event_loop.run_return(|event, _, flow| match event {
            Event::NewEvents(_) => *flow = ControlFlow::WaitUntil(deadline),
            Event::WindowEvent { event, .. } => match event {
                WindowEvent::ReceivedCharacter(c) => keys.push_back(c),
                WindowEvent::CloseRequested => log::debug!("ignoring request to close the window"),
                _ => {}
            },
            Event::RedrawRequested(_) => {
                if let Some(renderer) = renderer.as_mut() {
                    if let Err(e) = renderer.redraw() {
                        error = Some(e);
                        *flow = ControlFlow::Exit;
                    }
                }
            }
            Event::MainEventsCleared => {
                if !keys.is_empty() || Instant::now() >= deadline {
                    *flow = ControlFlow::Exit;
                }
            }
            _ => {}
        });

        match error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl DisplaySink for Display {
    fn show(&mut self, title: &str, frame: &Image) -> anyhow::Result<()> {
        let renderer = match &mut self.renderer {
            Some(renderer) => renderer,
            None => {
                let res = frame.resolution();
                log::debug!("creating window '{title}' at {res}");
                let renderer = Renderer::open(&self.event_loop, title, res)?;
                self.title = title.to_string();
                self.renderer.insert(renderer)
            }
        };
        if self.title != title {
            renderer.window().set_title(title);
            self.title = title.to_string();
        }

        renderer.upload(frame.resolution(), frame.data());
        renderer.redraw()?;
        self.pump_events(Instant::now())
    }

    fn poll_key(&mut self, timeout: Duration) -> anyhow::Result<Option<char>> {
        if self.keys.is_empty() {
            self.pump_events(Instant::now() + timeout)?;
        }
        Ok(self.keys.pop_front())
    }
}

impl Drop for Display {
    fn drop(&mut self) {
        if self.renderer.is_some() {
            log::debug!("closing window '{}'", self.title);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_failure_is_an_error() {
        // Test threads are not the main thread, and CI machines usually have no display server.
        // Both make winit panic, which has to surface as an error instead.
        match Display::new() {
            Ok(display) => assert!(display.renderer.is_none()),
            Err(e) => {
                let msg = format!("{e:#}");
                assert!(msg.contains("display server"), "{msg}");
            }
        }
    }
}
