//! Real pointer and keyboard input using enigo
//!
//! The enigo handle is confined to one worker thread; callers send requests
//! over a channel and wait for the reply.

use enigo::{Axis, Button, Coordinate, Direction, Enigo, Key, Keyboard, Mouse, Settings};
use flume::{Receiver, Sender};
use std::thread;
use std::time::Duration;

use super::{Action, MouseKeyboard, ScreenSize};
use crate::error::{ControlError, Result};
use crate::worker::spawn_named;

/// Windows wheel units per notch
const WHEEL_DELTA: i32 = 120;

enum Request {
    Perform(Action, Sender<Result<()>>),
    Combo {
        modifiers: Vec<String>,
        key: String,
        reply: Sender<Result<()>>,
    },
    Display(Sender<Result<(u32, u32)>>),
}

pub struct DesktopActuator {
    tx: Sender<Request>,
}

impl DesktopActuator {
    /// Open the input connection on a dedicated thread
    pub fn new() -> Result<Self> {
        let (tx, rx) = flume::unbounded::<Request>();
        let (ready_tx, ready_rx) = flume::bounded::<Result<()>>(1);

        spawn_named("os-input", move || {
            let mut enigo = match Enigo::new(&Settings::default()) {
                Ok(enigo) => {
                    let _ = ready_tx.send(Ok(()));
                    enigo
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(ControlError::BackendUnavailable(format!(
                        "failed to initialize enigo: {}",
                        e
                    ))));
                    return;
                }
            };
            serve(&mut enigo, rx);
        })?;

        ready_rx
            .recv()
            .map_err(|_| ControlError::BackendUnavailable("os-input thread exited".into()))??;
        Ok(Self { tx })
    }

    fn call<T>(&self, build: impl FnOnce(Sender<Result<T>>) -> Request) -> Result<T> {
        let (reply_tx, reply_rx) = flume::bounded(1);
        self.tx
            .send(build(reply_tx))
            .map_err(|_| ControlError::Actuation("os-input thread stopped".into()))?;
        reply_rx
            .recv()
            .map_err(|_| ControlError::Actuation("os-input thread dropped request".into()))?
    }

    fn perform(&self, action: Action) -> Result<()> {
        self.call(|reply| Request::Perform(action, reply))
    }
}

fn serve(enigo: &mut Enigo, rx: Receiver<Request>) {
    // Ends once every DesktopActuator handle is dropped
    while let Ok(request) = rx.recv() {
        match request {
            Request::Perform(action, reply) => {
                let _ = reply.send(perform(enigo, &action));
            }
            Request::Combo {
                modifiers,
                key,
                reply,
            } => {
                let _ = reply.send(combo(enigo, &modifiers, &key));
            }
            Request::Display(reply) => {
                let size = enigo
                    .main_display()
                    .map(|(w, h)| (w.max(0) as u32, h.max(0) as u32))
                    .map_err(|e| ControlError::Actuation(format!("main display: {}", e)));
                let _ = reply.send(size);
            }
        }
    }
}

fn perform(enigo: &mut Enigo, action: &Action) -> Result<()> {
    let result = match action {
        Action::Move { x, y } => enigo.move_mouse(*x, *y, Coordinate::Abs),
        Action::ClickLeft => enigo.button(Button::Left, Direction::Click),
        Action::ClickRight => enigo.button(Button::Right, Direction::Click),
        Action::DoubleClick => enigo
            .button(Button::Left, Direction::Click)
            .and_then(|_| enigo.button(Button::Left, Direction::Click)),
        Action::Scroll(delta) => {
            // enigo scrolls down for positive lengths
            let notches = match *delta / WHEEL_DELTA {
                0 => delta.signum(),
                n => n,
            };
            enigo.scroll(-notches, Axis::Vertical)
        }
        Action::Key(name) => enigo.key(key_for(name)?, Direction::Click),
    };
    result.map_err(|e| ControlError::Actuation(format!("{}: {}", action, e)))
}

/// Hold the modifiers, click the key, release in reverse order
fn combo(enigo: &mut Enigo, modifiers: &[String], key: &str) -> Result<()> {
    let err = |e: enigo::InputError| ControlError::Actuation(format!("key combo: {}", e));

    let modifier_keys = modifiers
        .iter()
        .map(|m| key_for(m))
        .collect::<Result<Vec<_>>>()?;
    let main_key = key_for(key)?;

    for modifier in &modifier_keys {
        enigo.key(*modifier, Direction::Press).map_err(err)?;
    }
    thread::sleep(Duration::from_millis(10));
    let clicked = enigo.key(main_key, Direction::Click).map_err(err);
    thread::sleep(Duration::from_millis(50));
    for modifier in modifier_keys.iter().rev() {
        enigo.key(*modifier, Direction::Release).map_err(err)?;
    }
    clicked
}

fn key_for(name: &str) -> Result<Key> {
    let key = match name {
        "volumeup" => Key::VolumeUp,
        "volumedown" => Key::VolumeDown,
        "volumemute" => Key::VolumeMute,
        "win" | "super" | "cmd" => Key::Meta,
        "ctrl" => Key::Control,
        "alt" => Key::Alt,
        "shift" => Key::Shift,
        "enter" => Key::Return,
        "escape" => Key::Escape,
        "tab" => Key::Tab,
        "space" => Key::Space,
        other => {
            let mut chars = other.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Key::Unicode(c),
                _ => return Err(ControlError::Actuation(format!("unknown key '{}'", other))),
            }
        }
    };
    Ok(key)
}

impl MouseKeyboard for DesktopActuator {
    fn move_to(&self, x: i32, y: i32) -> Result<()> {
        self.perform(Action::Move { x, y })
    }

    fn click_left(&self) -> Result<()> {
        self.perform(Action::ClickLeft)
    }

    fn click_right(&self) -> Result<()> {
        self.perform(Action::ClickRight)
    }

    fn double_click(&self) -> Result<()> {
        self.perform(Action::DoubleClick)
    }

    fn scroll(&self, delta: i32) -> Result<()> {
        self.perform(Action::Scroll(delta))
    }

    fn key_press(&self, key: &str) -> Result<()> {
        self.perform(Action::Key(key.to_string()))
    }

    fn key_combo(&self, modifiers: &[&str], key: &str) -> Result<()> {
        let modifiers = modifiers.iter().map(|m| m.to_string()).collect();
        let key = key.to_string();
        self.call(|reply| Request::Combo {
            modifiers,
            key,
            reply,
        })
    }
}

impl ScreenSize for DesktopActuator {
    fn size(&self) -> (u32, u32) {
        match self.call(Request::Display) {
            Ok(size) => size,
            Err(e) => {
                tracing::warn!("falling back to 1920x1080: {}", e);
                (1920, 1080)
            }
        }
    }
}
