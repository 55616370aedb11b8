use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};

use gif_session::{OffscreenSurface, PixelBuffer, PlaybackSettings, SessionHandle, Source};

const USAGE: &str = "usage: gif-session <file.gif> [--speed F] [--loops N] [--seconds S] \
                     [--dump-frame INDEX OUT.png]";

struct Args {
    path: PathBuf,
    speed: Option<f32>,
    loops: Option<i32>,
    seconds: f64,
    dump: Option<(usize, PathBuf)>,
}

fn parse_args() -> Result<Args> {
    let mut args = std::env::args().skip(1);
    let mut path = None;
    let mut parsed = Args {
        path: PathBuf::new(),
        speed: None,
        loops: None,
        seconds: 3.0,
        dump: None,
    };

    while let Some(arg) = args.next() {
        let mut value = |name: &str| args.next().with_context(|| format!("{name} needs a value"));
        match arg.as_str() {
            "--speed" => parsed.speed = Some(value("--speed")?.parse()?),
            "--loops" => parsed.loops = Some(value("--loops")?.parse()?),
            "--seconds" => parsed.seconds = value("--seconds")?.parse()?,
            "--dump-frame" => {
                let index = value("--dump-frame")?.parse()?;
                let out = value("--dump-frame")?;
                parsed.dump = Some((index, PathBuf::from(out)));
            }
            "-h" | "--help" => {
                println!("{USAGE}");
                std::process::exit(0);
            }
            other if other.starts_with("--") => bail!("unknown option {other}\n{USAGE}"),
            other => path = Some(PathBuf::from(other)),
        }
    }

    parsed.path = path.with_context(|| USAGE.to_string())?;
    Ok(parsed)
}

fn dump_frame(handle: &SessionHandle, index: usize, out: &Path) -> Result<()> {
    let mut frame = PixelBuffer::new(handle.width(), handle.height());
    let shown = handle.seek_to_frame(index, &mut frame)?;
    image::save_buffer(
        out,
        frame.as_bytes(),
        frame.width(),
        frame.height(),
        image::ExtendedColorType::Rgba8,
    )
    .with_context(|| format!("failed to write {}", out.display()))?;
    println!("Wrote frame {shown} to {}", out.display());
    Ok(())
}

fn play_time(seconds: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(seconds.max(0.0))
        .with_context(|| format!("--seconds {seconds} is out of range"))
}

fn play(handle: &SessionHandle, seconds: f64) -> Result<()> {
    let surface = Arc::new(OffscreenSurface::for_session(handle));
    if !handle.start_decoder(surface.clone()) {
        bail!("decode driver did not start");
    }

    let deadline = std::time::Instant::now() + play_time(seconds)?;
    while std::time::Instant::now() < deadline && !handle.is_animation_completed() {
        std::thread::sleep(Duration::from_millis(20));
    }
    handle.stop_decoder();

    println!(
        "Presented {} frames, now at frame {} of loop {}{}",
        surface.presented_count(),
        handle.current_frame_index(),
        handle.current_loop(),
        if handle.is_animation_completed() { " (completed)" } else { "" }
    );
    if handle.native_error_code().is_error() {
        println!("Engine error: {}", handle.native_error_code());
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = parse_args()?;
    let settings = PlaybackSettings::load();
    let handle = SessionHandle::open_with_settings(Source::path(&args.path), &settings)?;

    if let Some(speed) = args.speed {
        handle.set_speed_factor(speed)?;
    }
    if let Some(loops) = args.loops {
        handle.set_loop_count(loops)?;
    }

    println!(
        "{}: {}x{}, {} frames, {:?} per pass, loop count {}{}",
        args.path.display(),
        handle.width(),
        handle.height(),
        handle.frame_count(),
        handle.duration(),
        handle.loop_count(),
        if handle.is_opaque() { ", opaque" } else { "" }
    );
    if let Some(comment) = handle.comment() {
        println!("Comment: {comment}");
    }

    let result = match &args.dump {
        Some((index, out)) => dump_frame(&handle, *index, out),
        None => play(&handle, args.seconds),
    };
    handle.destroy();
    result
}
