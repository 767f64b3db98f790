use anyhow::{Context, Result, bail};
use avsplice::config::{app_name, version};
use avsplice::engine::FfmpegEngine;
use avsplice::{
    AsyncDecoder, Config, DecodeHooks, DecodeOptions, Demuxer, Flow, Frame, InputSource, Muxer,
    OutputSink, StopFlag,
};
use clap::{Arg, ArgAction, ArgMatches, Command};
use log::info;
use std::time::Duration;
use std::{panic, process, thread};
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    let format_hint = Arg::new("format")
        .short('f')
        .long("format")
        .value_name("FORMAT")
        .help("Force the input container format.");

    Command::new(app_name())
        .version(version())
        .author(env!("CARGO_PKG_AUTHORS"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .global(true)
                .help("JSON configuration file."),
        )
        .subcommand(
            Command::new("split")
                .about("Extract the video and audio streams of a container into separate files.")
                .arg(Arg::new("input").required(true))
                .arg(
                    Arg::new("video")
                        .long("video")
                        .value_name("FILE")
                        .help("Video-only output."),
                )
                .arg(
                    Arg::new("audio")
                        .long("audio")
                        .value_name("FILE")
                        .help("Audio-only output."),
                )
                .arg(format_hint.clone()),
        )
        .subcommand(
            Command::new("merge")
                .about("Combine a video input and an audio input into one container.")
                .arg(Arg::new("output").required(true))
                .arg(Arg::new("video").long("video").value_name("FILE"))
                .arg(Arg::new("audio").long("audio").value_name("FILE"))
                .arg(
                    Arg::new("muxer")
                        .short('m')
                        .long("muxer")
                        .value_name("FORMAT")
                        .help("Output container format, guessed from the file name otherwise."),
                )
                .arg(
                    Arg::new("fps")
                        .long("fps")
                        .value_name("RATE")
                        .value_parser(clap::value_parser!(f64))
                        .help("Override the nominal video frame rate."),
                ),
        )
        .subcommand(
            Command::new("decode")
                .about("Decode the video stream of a source and report what was decoded.")
                .arg(Arg::new("input").required(true))
                .arg(
                    Arg::new("software")
                        .long("software")
                        .action(ArgAction::SetTrue)
                        .help("Skip hardware decoders."),
                )
                .arg(format_hint),
        )
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // kill the main thread as soon as a secondary thread panics
    let orig_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        orig_hook(panic_info);
        process::exit(105);
    }));

    // exit on SIGINT, SIGTERM, or SIGHUP
    ctrlc::set_handler(move || {
        process::exit(130);
    })
    .context("Error setting Ctrl-C handler")?;

    let matches = cli().get_matches();
    let config = match matches.get_one::<String>("config") {
        Some(path) => Config::load(path).with_context(|| format!("loading {}", path))?,
        None => Config::default(),
    };

    match matches.subcommand() {
        Some(("split", args)) => split(config, args),
        Some(("merge", args)) => merge(config, args),
        Some(("decode", args)) => decode(config, args),
        _ => bail!("unknown command"),
    }
}

fn split(config: Config, args: &ArgMatches) -> Result<()> {
    let input = args.get_one::<String>("input").context("missing input")?;
    let video = args.get_one::<String>("video");
    let audio = args.get_one::<String>("audio");
    if video.is_none() && audio.is_none() {
        bail!("nothing to extract, pass --video and/or --audio");
    }

    let mut demuxer = Demuxer::with_engine(FfmpegEngine::new(), config);
    demuxer
        .open_input(
            InputSource::path(input),
            args.get_one::<String>("format").map(String::as_str),
        )
        .with_context(|| format!("opening {}", input))?;
    if let Some(path) = video {
        demuxer
            .open_video_output(OutputSink::path(path))
            .with_context(|| format!("creating {}", path))?;
    }
    if let Some(path) = audio {
        demuxer
            .open_audio_output(OutputSink::path(path))
            .with_context(|| format!("creating {}", path))?;
    }

    let (mut written, mut dropped) = (0u64, 0u64);
    loop {
        match demuxer.flush()? {
            Flow::Written(_) => written += 1,
            Flow::Dropped => dropped += 1,
            Flow::Again => {}
            Flow::EndOfStream => break,
        }
    }
    demuxer.close()?;

    info!(
        "split: {} packets written, {} dropped, last pts video {} ms / audio {} ms",
        written,
        dropped,
        demuxer.video_pts(),
        demuxer.audio_pts()
    );
    Ok(())
}

fn merge(config: Config, args: &ArgMatches) -> Result<()> {
    let output = args.get_one::<String>("output").context("missing output")?;
    let video = args.get_one::<String>("video");
    let audio = args.get_one::<String>("audio");
    if video.is_none() && audio.is_none() {
        bail!("nothing to merge, pass --video and/or --audio");
    }

    let mut muxer = Muxer::with_engine(FfmpegEngine::new(), config);
    if let Some(path) = video {
        muxer
            .open_video_input(InputSource::path(path), None)
            .with_context(|| format!("opening {}", path))?;
    }
    if let Some(path) = audio {
        muxer
            .open_audio_input(InputSource::path(path), None)
            .with_context(|| format!("opening {}", path))?;
    }
    if let Some(&fps) = args.get_one::<f64>("fps") {
        muxer.set_video_frame_rate(fps);
    }
    muxer
        .open_output(
            OutputSink::path(output),
            args.get_one::<String>("muxer").map(String::as_str),
        )
        .with_context(|| format!("creating {}", output))?;

    while !muxer.flush()?.is_end_of_stream() {}
    muxer.close()?;

    info!(
        "merge: video cursor {:?}, audio cursor {:?}",
        muxer.video_cursor(),
        muxer.audio_cursor()
    );
    Ok(())
}

#[derive(Default)]
struct FrameCounter {
    frames: u64,
    last: Option<(usize, usize, String)>,
}

impl DecodeHooks for FrameCounter {
    fn on_decode(&mut self, _stop: &StopFlag, frame: Frame) {
        self.frames += 1;
        self.last = Some((frame.width, frame.height, frame.pixel_format));
    }
}

fn decode(config: Config, args: &ArgMatches) -> Result<()> {
    let input = args.get_one::<String>("input").context("missing input")?;
    let hardware = config.decoder.hardware && !args.get_flag("software");
    let mut options = DecodeOptions::from(&config).with_hardware(hardware);
    if let Some(hint) = args.get_one::<String>("format") {
        options = options.with_format_hint(hint);
    }

    let mut decoder = AsyncDecoder::new(FrameCounter::default());
    if !decoder.start(InputSource::path(input), options) {
        bail!("decoder busy");
    }
    while decoder.is_running() {
        thread::sleep(Duration::from_millis(20));
    }
    decoder.stop();

    let state = decoder.state();
    let counter = decoder.hooks().context("decode worker panicked")?;
    match &counter.last {
        Some((width, height, format)) => info!(
            "decode: {} frames of {}x{} {} at {:.3} fps ({})",
            counter.frames,
            width,
            height,
            format,
            decoder.frame_rate(),
            state
        ),
        None => info!("decode: no frames ({})", state),
    }
    if state == avsplice::SessionState::Failed {
        bail!("decoding {} failed", input);
    }
    Ok(())
}
