use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError};
use log::{error, info, warn};
use std::io::BufRead;
use std::thread;
use std::time::Duration;

use stbplay::cli::{execute, Args, ControlCommand};
use stbplay::config::{OutputOptions, PlayerConfig};
use stbplay::core::{PlayFiles, TrackKind};
use stbplay::platform::Platform;
use stbplay::player::{
    ffmpeg_init, AvSink, Container, EsFileSink, FfmpegContainer, JsonSubtitleSink, NullSink,
    Output, PcmSpeakerSink,
};

fn av_sink(kind: TrackKind, path: Option<&std::path::Path>) -> Result<Box<dyn AvSink>> {
    Ok(match path {
        Some(path) => Box::new(EsFileSink::create(kind, path)?),
        None => Box::new(NullSink::new()),
    })
}

fn build_output(opts: &OutputOptions) -> Result<Output> {
    let video = av_sink(TrackKind::Video, opts.video_device.as_deref())?;
    let audio: Box<dyn AvSink> = if opts.pcm_to_speaker {
        match PcmSpeakerSink::new() {
            Ok(sink) => Box::new(sink),
            Err(e) => {
                warn!("⚠️ 无法打开声卡: {}", e);
                av_sink(TrackKind::Audio, opts.audio_device.as_deref())?
            }
        }
    } else {
        av_sink(TrackKind::Audio, opts.audio_device.as_deref())?
    };
    Ok(Output::new(video, audio, Box::new(JsonSubtitleSink::stdout())))
}

fn spawn_stdin_reader() -> Result<Receiver<String>> {
    let (tx, rx) = unbounded();
    thread::Builder::new()
        .name("stdin".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        })?;
    Ok(rx)
}

fn main() -> Result<()> {
    // 初始化日志
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        // cpal 的设备枚举日志
        .filter_module("cpal", log::LevelFilter::Warn)
        .parse_default_env()
        .init();

    let args = Args::parse();
    let mut cfg = match &args.config {
        Some(path) => PlayerConfig::load(path)
            .with_context(|| format!("配置加载失败: {}", path.display()))?,
        None => PlayerConfig::default(),
    };
    args.apply(&mut cfg);

    info!("🎬 stbplay 启动");
    ffmpeg_init().context("ffmpeg init")?;

    let _platform = if cfg.platform.enable {
        Some(Platform::init(&cfg.platform).context("platform init")?)
    } else {
        None
    };

    let output = build_output(&cfg.output)?.shared();
    let mut container = FfmpegContainer::new(cfg.decoder.clone(), cfg.playback.clone(), output);
    let files = PlayFiles {
        first: args.url.clone(),
        second: args.second.clone(),
    };
    container.init(&files).context("打开失败")?;
    container.play().context("播放失败")?;

    let commands = spawn_stdin_reader()?;
    loop {
        match commands.recv_timeout(Duration::from_millis(200)) {
            Ok(line) => {
                let Some(cmd) = ControlCommand::parse(&line) else {
                    warn!("unknown command: {}", line.trim());
                    continue;
                };
                if cmd == ControlCommand::Quit {
                    break;
                }
                if let Some(value) = execute(&mut container, &cmd) {
                    println!("{}", value);
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            // stdin closed, keep playing until the end
            Err(RecvTimeoutError::Disconnected) => thread::sleep(Duration::from_millis(200)),
        }
        if !container.status() {
            info!("🏁 playback finished");
            break;
        }
    }

    if let Err(e) = container.stop() {
        error!("stop: {}", e);
    }
    Ok(())
}
