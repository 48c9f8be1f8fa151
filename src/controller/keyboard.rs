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

use tokio::{sync::mpsc::Sender, task::JoinHandle};
use tracing::{info, span, warn, Level};

use super::Event;
use crate::capture::CaptureTarget;
use crate::keys::KeyEvent;
use crate::sound::SoundId;

const BIND: &str = ":bind";
const CAPTURE: &str = ":capture";
const CANCEL: &str = ":cancel";
const PLAY: &str = ":play";
const STOP: &str = ":stop";
const LIST: &str = ":list";
const FOCUS: &str = ":focus";
const BLUR: &str = ":blur";
const QUIT: &str = ":quit";

/// A driver that reads one key-down per stdin line. Lines starting with ':' are commands.
#[derive(Default)]
pub struct Driver {}

impl Driver {
    pub fn new() -> Driver {
        Driver {}
    }

    /// Parses one input line. Returns None for blank or unrecognized input.
    pub fn parse_line(line: &str) -> Option<Event> {
        let line = line.trim_end_matches(['\r', '\n']);

        // A line of nothing but spaces is the space key.
        if !line.is_empty() && line.chars().all(|c| c == ' ') {
            return KeyEvent::from_token(" ").map(Event::Key);
        }

        let line = line.trim();
        if !line.starts_with(':') || line == ":" {
            return KeyEvent::from_token(line).map(Event::Key);
        }

        let mut parts = line.split_whitespace();
        let command = parts.next().unwrap_or_default().to_lowercase();
        let argument = parts.next();
        let id = || argument.and_then(|arg| arg.parse::<i64>().ok()).map(SoundId);

        let event = match command.as_str() {
            BIND => id().map(|id| Event::Capture(CaptureTarget::Sound(id))),
            CAPTURE => Some(Event::Capture(CaptureTarget::Pending)),
            CANCEL => Some(Event::CancelCapture),
            PLAY => id().map(Event::Play),
            STOP => Some(Event::StopAll),
            LIST => Some(Event::List),
            FOCUS => Some(Event::Focus(true)),
            BLUR => Some(Event::Focus(false)),
            QUIT => Some(Event::Quit),
            _ => None,
        };
        if event.is_none() {
            warn!(input = line, "Unrecognized input");
        }
        event
    }

    /// Reads and forwards one line. Returns false once the input is exhausted.
    fn monitor_io<R, W>(
        events_tx: &Sender<Event>,
        mut reader: R,
        mut writer: W,
    ) -> io::Result<bool>
    where
        R: io::BufRead,
        W: io::Write,
    {
        write!(
            writer,
            "Key or command ({} <id>, {}, {}, {} <id>, {}, {}, {}, {}, {}): ",
            BIND, CAPTURE, CANCEL, PLAY, STOP, LIST, FOCUS, BLUR, QUIT,
        )?;
        writer.flush()?;

        let mut input = String::default();
        if reader.read_line(&mut input)? == 0 {
            events_tx
                .blocking_send(Event::Quit)
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
            return Ok(false);
        }

        let Some(event) = Self::parse_line(&input) else {
            return Ok(true);
        };
        let quit = event == Event::Quit;
        events_tx
            .blocking_send(event)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        Ok(!quit)
    }
}

impl super::Driver for Driver {
    fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>> {
        tokio::task::spawn_blocking(move || {
            let span = span!(Level::INFO, "keyboard driver");
            let _enter = span.enter();

            info!("Keyboard driver started.");

            while Self::monitor_io(&events_tx, io::stdin().lock(), io::stdout())? {}
            Ok(())
        })
    }
}

#[cfg(test)]
mod test {
    use std::io::{self, BufReader, BufWriter};

    use tokio::sync::mpsc;

    use super::*;

    fn get_event(input: &str) -> Result<(bool, Option<Event>), io::Error> {
        let (sender, mut receiver) = mpsc::channel::<Event>(1);

        let reader = BufReader::new(input.as_bytes());
        let writer = BufWriter::new(Vec::new());
        let more = Driver::monitor_io(&sender, reader, writer)?;

        // Force the sender to close.
        drop(sender);
        Ok((more, receiver.blocking_recv()))
    }

    fn key(token: &str) -> Event {
        Event::Key(KeyEvent::from_token(token).unwrap())
    }

    #[test]
    fn test_keys() -> Result<(), io::Error> {
        assert_eq!((true, Some(key("a"))), get_event("a\n")?);
        assert_eq!((true, Some(key("F1"))), get_event("F1\n")?);
        assert_eq!((true, Some(key("space"))), get_event(" \n")?);
        assert_eq!((true, Some(key("space"))), get_event("space\n")?);
        assert_eq!((true, None), get_event("\n")?);
        Ok(())
    }

    #[test]
    fn test_commands() -> Result<(), io::Error> {
        assert_eq!(
            (true, Some(Event::Capture(CaptureTarget::Sound(SoundId(3))))),
            get_event(":bind 3\n")?
        );
        assert_eq!(
            (true, Some(Event::Capture(CaptureTarget::Pending))),
            get_event(":capture\n")?
        );
        assert_eq!((true, Some(Event::CancelCapture)), get_event(":cancel\n")?);
        assert_eq!((true, Some(Event::Play(SoundId(12)))), get_event(":play 12\n")?);
        assert_eq!((true, Some(Event::StopAll)), get_event(":stop\n")?);
        assert_eq!((true, Some(Event::List)), get_event(":LIST\n")?);
        assert_eq!((true, Some(Event::Focus(true))), get_event(":focus\n")?);
        assert_eq!((true, Some(Event::Focus(false))), get_event(":blur\n")?);
        assert_eq!((false, Some(Event::Quit)), get_event(":quit\n")?);

        assert_eq!((true, None), get_event(":bind\n")?);
        assert_eq!((true, None), get_event(":play abc\n")?);
        assert_eq!((true, None), get_event(":unknown\n")?);
        Ok(())
    }

    #[test]
    fn test_end_of_input_quits() -> Result<(), io::Error> {
        assert_eq!((false, Some(Event::Quit)), get_event("")?);
        Ok(())
    }
}
