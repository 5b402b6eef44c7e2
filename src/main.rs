use std::path::PathBuf;
use std::{panic, process};

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command, value_parser};
use log::{error, info};
use tokio_util::sync::CancellationToken;

use castrec::config::{PipelineConfig, app_name, version};
use castrec::pipeline::FrameRate;
use castrec::recorder::Recorder;

fn cli() -> Command {
    Command::new(app_name())
        .version(version())
        .author(env!("CARGO_PKG_AUTHORS"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("JSON settings file; flags override its values.")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("FILE")
                .help("Recording file to write.")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("fps")
                .long("fps")
                .value_name("FPS")
                .help("Capture frame rate.")
                .value_parser(value_parser!(u32).range(1..)),
        )
        .arg(
            Arg::new("duration")
                .short('d')
                .long("duration")
                .value_name("SECONDS")
                .help("Stop after this many seconds instead of waiting for Ctrl-C.")
                .value_parser(value_parser!(u64)),
        )
        .arg(
            Arg::new("no-audio")
                .long("no-audio")
                .help("Record without an audio track.")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("strict-timestamps")
                .long("strict-timestamps")
                .help("Abort when output timestamps stop increasing.")
                .action(ArgAction::SetTrue),
        )
}

fn load_config(matches: &ArgMatches) -> Result<PipelineConfig> {
    let mut config = match matches.get_one::<PathBuf>("config") {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };

    if let Some(output) = matches.get_one::<PathBuf>("output") {
        config.output = output.clone();
    }
    if let Some(fps) = matches.get_one::<u32>("fps") {
        config.frame_rate = FrameRate::new(*fps, 1);
    }
    if let Some(duration) = matches.get_one::<u64>("duration") {
        config.duration_secs = Some(*duration);
    }
    if matches.get_flag("no-audio") {
        config.audio = false;
    }
    if matches.get_flag("strict-timestamps") {
        config.strict_timestamps = true;
    }

    config.validate()?;
    Ok(config)
}

fn main() {
    tracing_subscriber::fmt::init();

    let matches = cli().get_matches();

    // kill the main thread as soon as a secondary thread panics
    let orig_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        orig_hook(panic_info);
        process::exit(105);
    }));

    if let Err(e) = run(&matches) {
        error!("{:#}", e);
        process::exit(1);
    }
}

fn run(matches: &ArgMatches) -> Result<()> {
    let config = load_config(matches)?;

    let stop = CancellationToken::new();
    let on_signal = stop.clone();
    // first Ctrl-C drains, a second one exits at once
    ctrlc::set_handler(move || {
        if on_signal.is_cancelled() {
            process::exit(130);
        }
        on_signal.cancel();
    })
    .context("Error setting Ctrl-C handler")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start the runtime")?;

    let summary = runtime.block_on(async move {
        let recorder = Recorder::new(config)?;
        recorder.run(stop).await
    })?;

    info!("Recording finished. {}", summary);
    Ok(())
}
