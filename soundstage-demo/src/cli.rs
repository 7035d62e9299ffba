use anyhow::{Context, Result, bail};
use soundstage::{
    ConvertToMono, FileStream, LoadOptions, Pose, SceneNode, SharedStream, SoundEvent, SoundId,
    SoundSystem, SoundSystemDesc, Vec3, load_pcm_file,
};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub const USAGE: &str = "Usage: soundstage-demo <audio-file> [--stream] [--device <index>] \
[--seconds <n>] [--list-devices]";

const TICK: Duration = Duration::from_millis(16);
const ORBIT_RADIUS: f32 = 5.0;

#[derive(Debug, Default)]
pub struct DemoOptions {
    pub path: Option<String>,
    pub stream: bool,
    pub device: Option<usize>,
    pub seconds: Option<f32>,
    pub list_devices: bool,
}

impl DemoOptions {
    pub fn parse(args: &[String]) -> Result<Self> {
        let mut options = Self::default();
        let mut args = args.iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--stream" => options.stream = true,
                "--list-devices" => options.list_devices = true,
                "--device" => {
                    let value = args.next().context("--device needs an index")?;
                    options.device = Some(value.parse().context("invalid device index")?);
                }
                "--seconds" => {
                    let value = args.next().context("--seconds needs a value")?;
                    options.seconds = Some(value.parse().context("invalid duration")?);
                }
                flag if flag.starts_with("--") => bail!("unknown option {}", flag),
                path => {
                    if options.path.replace(path.to_string()).is_some() {
                        bail!("only one audio file can be played");
                    }
                }
            }
        }
        if options.path.is_none() && !options.list_devices {
            bail!("missing audio file");
        }
        Ok(options)
    }
}

pub fn run(options: DemoOptions) -> Result<()> {
    let mut system = SoundSystem::with_default_backend(SoundSystemDesc::default())?;

    if options.list_devices {
        for index in 0..system.device_count() {
            if let Some(name) = system.device_name(index) {
                println!("{}: {}", index, name);
            }
        }
        if options.path.is_none() {
            return Ok(());
        }
    }
    if let Some(index) = options.device {
        system.set_device(index)?;
    }

    let Some(path) = options.path.as_deref() else {
        return Ok(());
    };
    // Positional playback needs mono data
    let load = LoadOptions::new().convert_to_mono(ConvertToMono::ForceMono);
    let id = if options.stream {
        log::info!("Streaming {}", path);
        let stream: SharedStream = Arc::new(Mutex::new(FileStream::open(path, &load)?));
        system.create_stream(stream)?
    } else {
        log::info!("Loading {}", path);
        let resource = load_pcm_file(path, &load)?;
        system.create_sound(Arc::new(resource))?
    };

    // Everything below is queued until the device opens
    let length = {
        let mut sound = system.sound(id)?;
        sound.set_gain(0.0)?;
        sound.set_looping(true)?;
        sound.play()?;
        sound.fade_up()?;
        sound.length()?
    };
    log::info!(
        "Sound {} is {:.2}s long, {} action(s) queued",
        id,
        length.as_secs_f32(),
        system.queued_action_count()
    );

    system.initialize()?;
    report_events(&mut system);
    if !system.is_ready() {
        log::warn!("No output device, the demo will run silently");
    }

    let total = Duration::from_secs_f32(options.seconds.unwrap_or(10.0).max(1.0));
    let fade_at = total.saturating_sub(system.desc().fade_duration);
    orbit(&mut system, id, total, fade_at)?;

    log::info!(
        "Played {:.2}s of sound {}",
        system.sound(id)?.elapsed_time()?.as_secs_f32(),
        id
    );
    system.sound(id)?.stop()?;
    system.deinitialize()?;
    report_events(&mut system);
    Ok(())
}

/// Moves the sound around the listener until `total` has passed, starting a
/// fade-down at `fade_at`.
fn orbit<B: soundstage::AudioBackend>(
    system: &mut SoundSystem<B>,
    id: SoundId,
    total: Duration,
    fade_at: Duration,
) -> Result<()> {
    let listener = Pose::identity();
    let start = Instant::now();
    let mut fading = false;
    loop {
        let elapsed = start.elapsed();
        if elapsed >= total {
            break;
        }
        if !fading && elapsed >= fade_at {
            log::info!("Fading out");
            system.sound(id)?.fade_down()?;
            fading = true;
        }

        let angle = elapsed.as_secs_f32() * std::f32::consts::FRAC_PI_2;
        let offset = Vec3::new(angle.cos(), 0.0, angle.sin()) * ORBIT_RADIUS;
        let scene = SceneNode::translate(offset, vec![SceneNode::sound(id)]);
        system.render(&listener, &scene)?;
        system.process(TICK)?;
        report_events(system);
        std::thread::sleep(TICK);
    }
    Ok(())
}

fn report_events<B: soundstage::AudioBackend>(system: &mut SoundSystem<B>) {
    for event in system.poll_events() {
        match event {
            SoundEvent::DeviceReady { device_name } => log::info!("Playing on {}", device_name),
            SoundEvent::DeviceUnavailable { reason } => log::warn!("Device unavailable: {}", reason),
            SoundEvent::BackendError { error } => log::error!("Backend error: {}", error),
            other => log::debug!("{:?}", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_options() {
        let options =
            DemoOptions::parse(&args(&["song.ogg", "--stream", "--device", "1", "--seconds", "4"]))
                .unwrap();
        assert_eq!(options.path.as_deref(), Some("song.ogg"));
        assert!(options.stream);
        assert_eq!(options.device, Some(1));
        assert_eq!(options.seconds, Some(4.0));
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(DemoOptions::parse(&args(&[])).is_err());
        assert!(DemoOptions::parse(&args(&["a.wav", "--device"])).is_err());
        assert!(DemoOptions::parse(&args(&["a.wav", "--bogus"])).is_err());
        assert!(DemoOptions::parse(&args(&["--list-devices"])).is_ok());
    }
}
