// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::io;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tokio::{sync::mpsc::Sender, task::JoinHandle};
use tracing::{error, info, span, Instrument, Level};

use crate::capture::CaptureTarget;
use crate::keys::KeyEvent;
use crate::session::{KeyOutcome, Session};
use crate::sound::SoundId;

pub mod keyboard;

/// Controller events that will trigger behavior in the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A key went down.
    Key(KeyEvent),

    /// Arms a key capture. The next key event is bound instead of dispatched.
    Capture(CaptureTarget),

    /// Disarms a pending key capture.
    CancelCapture,

    /// Plays a sound regardless of its key.
    Play(SoundId),

    /// Stops everything that is playing.
    StopAll,

    /// Prints the library, newest first.
    List,

    /// Whether an editable control has focus. Key events are ignored while it does.
    Focus(bool),

    /// Ends the session.
    Quit,
}

pub trait Driver: Send + Sync + 'static {
    fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>>;
}

/// Feeds driver events into a session.
pub struct Controller {
    handle: JoinHandle<Session>,
}

impl Controller {
    /// Creates a new controller with the given driver.
    pub fn new(session: Session, driver: Arc<dyn Driver>) -> Controller {
        Controller {
            handle: tokio::spawn(
                Controller::trigger_events(session, driver)
                    .instrument(span!(Level::INFO, "controller")),
            ),
        }
    }

    /// Join will block until the controller finishes, handing the session back.
    pub async fn join(&mut self) -> Result<Session, JoinError> {
        (&mut self.handle).await
    }

    /// Applies driver events to the session until the driver closes or asks to quit.
    async fn trigger_events(mut session: Session, driver: Arc<dyn Driver>) -> Session {
        let (events_tx, mut events_rx) = mpsc::channel(1);
        let join_handle = driver.monitor_events(events_tx);

        info!(sounds = session.sounds().len(), "Controller started.");

        let mut editable = false;
        loop {
            let Some(event) = events_rx.recv().await else {
                info!("Controller closing.");
                if let Err(e) = join_handle.await {
                    error!("Error waiting for event monitor to stop: {}", e);
                }
                return session;
            };

            info!(event = format!("{:?}", event), "Received event.");
            match event {
                Event::Key(key) => match session.handle_key(&key, editable).await {
                    Ok(outcome) => report(&outcome),
                    Err(e) => error!("Error handling key: {}", e),
                },
                Event::Capture(target) => match session.begin_capture(target) {
                    Ok(()) => println!("Press a key to bind."),
                    Err(e) => error!("Unable to start capture: {}", e),
                },
                Event::CancelCapture => match session.cancel_capture() {
                    Some(_) => println!("Capture cancelled."),
                    None => info!("No capture to cancel."),
                },
                Event::Play(id) => {
                    if let Err(e) = session.play(id) {
                        error!("Unable to play: {}", e);
                    }
                }
                Event::StopAll => {
                    session.stop_all();
                }
                Event::List => {
                    for sound in session.sounds_by_recency() {
                        println!("{}", sound);
                    }
                }
                Event::Focus(focused) => editable = focused,
                Event::Quit => {
                    // The driver may be parked on a blocking read, so it is not awaited.
                    info!("Controller quitting.");
                    session.stop_all();
                    return session;
                }
            }
        }
    }
}

fn report(outcome: &KeyOutcome) {
    match outcome {
        KeyOutcome::Captured {
            target: CaptureTarget::Pending,
            label,
        } => println!("Captured {} for the next sound.", label),
        KeyOutcome::Captured {
            target: CaptureTarget::Sound(id),
            label,
        } => println!("Bound {} to sound {}.", label, id),
        KeyOutcome::StoppedAll(count) => info!(stopped = *count, "Stopped all playback."),
        KeyOutcome::Played(_) | KeyOutcome::Ignored | KeyOutcome::Unbound(_) => {}
    }
}

#[cfg(test)]
mod test {
    use std::{io, sync::Arc};

    use tokio::{sync::mpsc::Sender, task::JoinHandle};

    use super::{Driver, Event};
    use crate::audio;
    use crate::capture::CaptureTarget;
    use crate::keys::{KeyEvent, KeyLabel};
    use crate::playback::PlaybackManager;
    use crate::session::{Session, SessionOptions};
    use crate::sound::Blob;
    use crate::store::{self, sqlite};
    use crate::testutil::{eventually, wav_bytes};

    /// Sends a fixed script of events, then closes.
    struct ScriptDriver {
        script: Vec<Event>,
    }

    impl Driver for ScriptDriver {
        fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>> {
            let script = self.script.clone();
            tokio::task::spawn_blocking(move || {
                for event in script {
                    assert!(events_tx.blocking_send(event).is_ok());
                }
                Ok(())
            })
        }
    }

    fn key(token: &str) -> Event {
        Event::Key(KeyEvent::from_token(token).unwrap())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_controller() {
        let device = audio::get_device("mock-device").unwrap();
        let mock = device.to_mock().unwrap();
        let mut session = Session::open(
            store::open(sqlite::IN_MEMORY),
            PlaybackManager::new(device),
            SessionOptions::default(),
        )
        .await
        .unwrap();
        let id = session
            .add_sound("Jump", None, Blob::new("audio/wav", wav_bytes(30.0, 8000, 1)))
            .await
            .unwrap();

        let driver = Arc::new(ScriptDriver {
            script: vec![
                Event::Capture(CaptureTarget::Sound(id)),
                key("j"),
                Event::Focus(true),
                key("j"),
                Event::Focus(false),
                Event::List,
                key("j"),
            ],
        });
        let mut controller = super::Controller::new(session, driver);
        let session = controller.join().await.unwrap();

        assert_eq!(
            session.sound(id).unwrap().key,
            Some(KeyLabel::from_stored("J"))
        );
        // Only the last press played: the first was captured and the second was typed.
        eventually(|| mock.started() == 1, "Bound sound never played");
        assert_eq!(session.playback().active_count(), 1);
        session.stop_all();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_controller_quit_stops_playback() {
        let device = audio::get_device("mock-device").unwrap();
        let mut session = Session::open(
            store::open(sqlite::IN_MEMORY),
            PlaybackManager::new(device),
            SessionOptions::default(),
        )
        .await
        .unwrap();
        let id = session
            .add_sound("Loop", None, Blob::new("audio/wav", wav_bytes(30.0, 8000, 1)))
            .await
            .unwrap();

        let driver = Arc::new(ScriptDriver {
            script: vec![Event::Play(id), Event::Quit],
        });
        let mut controller = super::Controller::new(session, driver);
        let session = controller.join().await.unwrap();
        assert_eq!(session.playback().active_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_controller_cancel_capture() {
        let device = audio::get_device("mock-device").unwrap();
        let mock = device.to_mock().unwrap();
        let mut session = Session::open(
            store::open(sqlite::IN_MEMORY),
            PlaybackManager::new(device),
            SessionOptions::default(),
        )
        .await
        .unwrap();
        let id = session
            .add_sound(
                "Coin",
                Some(KeyLabel::from_stored("C")),
                Blob::new("audio/wav", wav_bytes(30.0, 8000, 1)),
            )
            .await
            .unwrap();

        let driver = Arc::new(ScriptDriver {
            script: vec![
                Event::Capture(CaptureTarget::Sound(id)),
                Event::CancelCapture,
                key("c"),
            ],
        });
        let mut controller = super::Controller::new(session, driver);
        let session = controller.join().await.unwrap();

        // The key was dispatched, not captured, so the binding is unchanged and the sound played.
        assert!(!session.is_capturing());
        assert_eq!(
            session.sound(id).unwrap().key,
            Some(KeyLabel::from_stored("C"))
        );
        eventually(|| mock.started() == 1, "Bound sound never played");
        session.stop_all();
    }
}
