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
use std::error::Error;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{crate_version, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use soundpad::audio;
use soundpad::config::Soundpad;
use soundpad::controller::{keyboard, Controller};
use soundpad::keys::{KeyEvent, KeyLabel};
use soundpad::playback::PlaybackManager;
use soundpad::session::{Session, SessionOptions};
use soundpad::snapshot::{ImportPolicy, DEFAULT_EXPORT_FILE};
use soundpad::sound::SoundId;
use soundpad::store;

/// Output used by commands that never make a sound.
const SILENT_DEVICE: &str = "mock-silent";

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A keyboard-driven soundboard."
)]
struct Cli {
    /// Path to a YAML config file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// The sound library database. Overrides the config file.
    #[arg(short, long, global = true)]
    database: Option<String>,
    /// The audio output device. Overrides the config file.
    #[arg(long, global = true)]
    device: Option<String>,
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Adds a sound from an audio file.
    Add {
        /// The audio file.
        path: PathBuf,
        /// The display name. Defaults to the file name.
        #[arg(short, long)]
        name: Option<String>,
        /// The key to bind, e.g. "a", "space" or "F1".
        #[arg(short, long)]
        key: Option<String>,
    },
    /// Lists the library, newest first.
    List {},
    /// Renames a sound.
    Rename { id: i64, name: String },
    /// Binds a sound to a key.
    Bind { id: i64, key: String },
    /// Removes the key binding of a sound.
    Unbind { id: i64 },
    /// Replaces the audio of a sound with another file.
    Replace { id: i64, path: PathBuf },
    /// Deletes a sound.
    Delete { id: i64 },
    /// Exports the whole library to a snapshot file.
    Export {
        #[arg(default_value = DEFAULT_EXPORT_FILE)]
        path: PathBuf,
    },
    /// Imports a snapshot file. Every item becomes a new sound.
    Import {
        path: PathBuf,
        /// "abort" or "skip". Overrides the config file.
        #[arg(long)]
        policy: Option<ImportPolicy>,
    },
    /// Plays a sound and waits for it to finish.
    Play { id: i64 },
    /// Lists the available audio output devices.
    Devices {},
    /// Starts an interactive session reading keys from stdin.
    Start {},
}

fn parse_key(key: &str) -> Result<KeyLabel, Box<dyn Error>> {
    Ok(KeyEvent::from_token(key)
        .ok_or("key must not be empty")?
        .label())
}

async fn open_session(config: &Soundpad, device: &str) -> Result<Session, Box<dyn Error>> {
    open_session_with(config, device, config.session_options()).await
}

async fn open_session_with(
    config: &Soundpad,
    device: &str,
    options: SessionOptions,
) -> Result<Session, Box<dyn Error>> {
    let device = audio::get_device(device)?;
    let store = store::open(config.database());
    Ok(Session::open(store, PlaybackManager::new(device), options).await?)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Soundpad::deserialize(path)?,
        None => Soundpad::default(),
    }
    .with_database(cli.database)
    .with_audio_device(cli.device);

    match cli.command {
        Commands::Add { path, name, key } => {
            let key = key.as_deref().map(parse_key).transpose()?;
            let mut session = open_session(&config, SILENT_DEVICE).await?;
            let id = session.add_file(&path, name.as_deref(), key).await?;
            if let Some(sound) = session.sound(id) {
                println!("{}", sound);
            }
        }
        Commands::List {} => {
            let session = open_session(&config, SILENT_DEVICE).await?;
            let sounds = session.sounds_by_recency();
            if sounds.is_empty() {
                println!("No sounds in {}.", config.database());
                return Ok(());
            }
            println!("Sounds (count: {}):", sounds.len());
            for sound in sounds {
                println!("{}", sound);
            }
        }
        Commands::Rename { id, name } => {
            let mut session = open_session(&config, SILENT_DEVICE).await?;
            session.rename(SoundId(id), &name).await?;
        }
        Commands::Bind { id, key } => {
            let key = parse_key(&key)?;
            let mut session = open_session(&config, SILENT_DEVICE).await?;
            session.bind(SoundId(id), Some(key)).await?;
        }
        Commands::Unbind { id } => {
            let mut session = open_session(&config, SILENT_DEVICE).await?;
            session.unbind(SoundId(id)).await?;
        }
        Commands::Replace { id, path } => {
            let mut session = open_session(&config, SILENT_DEVICE).await?;
            session.replace_file(SoundId(id), &path).await?;
        }
        Commands::Delete { id } => {
            let mut session = open_session(&config, SILENT_DEVICE).await?;
            session.delete(SoundId(id)).await?;
        }
        Commands::Export { path } => {
            let session = open_session(&config, SILENT_DEVICE).await?;
            let document = session.export().await?;
            fs::write(&path, document)?;
            println!(
                "Exported {} sounds to {}.",
                session.sounds().len(),
                path.display()
            );
        }
        Commands::Import { path, policy } => {
            let mut options = config.session_options();
            if let Some(policy) = policy {
                options.import_policy = policy;
            }

            let mut session = open_session_with(&config, SILENT_DEVICE, options).await?;
            let report = session.import(&fs::read_to_string(&path)?).await?;

            println!("Imported {} sounds.", report.created.len());
            for (index, err) in &report.failed {
                println!("Item {} failed: {}", index, err);
            }
            if report.aborted {
                println!("Import stopped at the first failure.");
            }
        }
        Commands::Play { id } => {
            let session = open_session(&config, config.audio_device()).await?;
            let handle = session.play(SoundId(id))?;
            while !handle.is_finished() {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        }
        Commands::Devices {} => {
            let devices = audio::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::Start {} => {
            let session = open_session(&config, config.audio_device()).await?;
            let mut controller = Controller::new(session, Arc::new(keyboard::Driver::new()));
            controller.join().await?;
        }
    }

    Ok(())
}
