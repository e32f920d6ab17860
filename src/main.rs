// Copyright (C) 2025 Michael Wilson <mike@mdwn.dev>
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
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::{crate_version, Parser, Subcommand};
use duration_string::DurationString;
use tracing::info;
use tracing_subscriber::EnvFilter;

use padseq::audio::{self, context};
use padseq::codec::{self, EncodedState};
use padseq::config::{Kit, Settings};
use padseq::library::Library;
use padseq::playsync::CancelHandle;
use padseq::samples::{FileFetcher, VoiceEngine};
use padseq::sequencer::clock::Clock;
use padseq::session::Session;
use padseq::util::{duration_minutes_seconds, format_row};

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A sixteen pad drum sampler and step sequencer."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lists the sample library by category.
    Library {
        /// A kit file whose sample list replaces the built-in library.
        #[arg[short, long]]
        kit: Option<String>,
    },
    /// Lists the available audio output devices.
    Devices {},
    /// Prints the pads and pattern held in a share token or share URL.
    Decode {
        /// The share token, or a URL carrying one.
        token: String,
        /// The URL query parameter holding the token.
        #[arg[short, long, default_value = codec::DEFAULT_URL_PARAM]]
        param: String,
    },
    /// Encodes a kit file as a share token.
    Encode {
        /// The path to the kit file.
        kit_path: String,
        /// Prints a full share URL against this base instead of the bare token.
        #[arg[short, long]]
        base_url: Option<String>,
    },
    /// Plays a pattern through the audio interface.
    Play {
        /// The path to the settings file.
        settings_path: String,
        /// A share token to start from. Overrides the kit.
        token: Option<String>,
        /// A kit file to start from. Overrides the kit in the settings.
        #[arg[short, long]]
        kit: Option<String>,
        /// How long to play for, e.g. 30s. Plays until interrupted if unset.
        #[arg[short, long]]
        duration: Option<String>,
    },
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Library { kit } => {
            let library = match kit {
                Some(kit) => Kit::deserialize(Path::new(&kit))?.library(),
                None => Library::builtin(),
            };

            println!("Samples (count: {}):", library.samples().len());
            for (category, samples) in library.samples_by_category() {
                println!("\n{}:", category);
                for sample in samples {
                    println!("- {} ({})", sample.name, sample.id);
                }
            }
        }
        Commands::Devices {} => {
            let devices = audio::cpal::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::Decode { token, param } => {
            let state = if token.contains("://") || token.contains('?') {
                codec::parse_share_url(&token, &param)
            } else {
                codec::decode_state(&token)
            };
            let Some(state) = state else {
                return Err("unable to decode share token".into());
            };
            print_state(&state, &Library::builtin());
        }
        Commands::Encode { kit_path, base_url } => {
            let state = Kit::deserialize(Path::new(&kit_path))?.to_state()?;
            match base_url {
                Some(base_url) => {
                    println!(
                        "{}",
                        codec::share_url(&base_url, &state, codec::DEFAULT_URL_PARAM)
                    )
                }
                None => println!("{}", codec::encode_state(&state)),
            }
        }
        Commands::Play {
            settings_path,
            token,
            kit,
            duration,
        } => {
            let settings = Settings::deserialize(Path::new(&settings_path))?;
            let kit = match kit.map(PathBuf::from).or_else(|| settings.kit()) {
                Some(kit) => Some(Kit::deserialize(&kit)?),
                None => None,
            };
            let duration = match duration {
                Some(duration) => Some(Duration::from(DurationString::from_string(duration)?)),
                None => None,
            };

            let output = context::output_for_device(settings.device())?;
            info!(device = settings.device(), "Using output");
            let engine = VoiceEngine::new(
                output,
                Arc::new(FileFetcher::new(settings.samples_dir())),
            );
            let clock = Clock::with_timing(settings.lookahead(), settings.schedule_interval()?);
            let mut session = Session::new(engine, clock, settings.url_param());

            let library = kit.as_ref().map(Kit::library).unwrap_or_default();
            let requests = library.samples_for_loading();
            let loaded = session.load_samples(&requests);
            info!(loaded, requested = requests.len(), "Loaded samples");

            if !session.init(token.as_deref()) {
                if let Some(kit) = kit.as_ref() {
                    session.restore(kit.to_state()?);
                }
            }
            print_state(&session.state(), &library);

            let cancel_handle = CancelHandle::new();
            if let Some(duration) = duration {
                let cancel_handle = cancel_handle.clone();
                thread::spawn(move || {
                    thread::sleep(duration);
                    cancel_handle.cancel();
                });
                println!("Playing for {}", duration_minutes_seconds(duration));
            }

            session.play();
            session.run_until(&cancel_handle);
            session.stop();
            session.dispose();
            context::release_shared_output();
        }
    }

    Ok(())
}

fn print_state(state: &EncodedState, library: &Library) {
    let pattern = &state.pattern;
    println!("{} BPM, {} steps", pattern.bpm(), pattern.steps());
    for (index, (pad, row)) in state.pads.iter().zip(pattern.rows().iter()).enumerate() {
        println!(
            "{:>2} {} {:<20} pitch {:>3} vol {:.2} group {}",
            index + 1,
            format_row(row),
            library.sample_name(pad.sample_id.as_deref()),
            pad.pitch,
            pad.volume,
            pad.mute_group,
        );
    }
}
