use super::*;
use crate::backend::{
    HardwareCall, HeadlessBackend, SourceFlag, SourceFloat, SourceId, SourceState, SourceVector,
    error_code,
};
use crate::math::{Pose, Vec3};
use crate::queue::Action;
use crate::resource::{MemoryStream, PcmResource, StreamingSoundResource};
use crate::scene::SceneNode;
use crate::sound::SoundKind;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn system_with(desc: SoundSystemDesc) -> SoundSystem<HeadlessBackend> {
    init_logger();
    SoundSystem::new(desc, HeadlessBackend::new()).unwrap()
}

fn system() -> SoundSystem<HeadlessBackend> {
    system_with(SoundSystemDesc::default())
}

fn mono(frames: usize) -> Arc<dyn SoundResource> {
    Arc::new(PcmResource::new(vec![0; frames * 2], 1, 16, 44100))
}

fn stereo(frames: usize) -> Arc<dyn SoundResource> {
    Arc::new(PcmResource::from_i16_samples(&vec![0; frames * 2], 2, 44100))
}

fn source_of(system: &SoundSystem<HeadlessBackend>, id: SoundId) -> SourceId {
    match system.handle(id).unwrap() {
        SoundHandle::Mono(sound) => sound.source().unwrap(),
        SoundHandle::Stereo(sound) => sound.left().source().unwrap(),
        SoundHandle::Streaming(sound) => sound.source().unwrap(),
    }
}

fn stereo_sources(system: &SoundSystem<HeadlessBackend>, id: SoundId) -> [SourceId; 2] {
    match system.handle(id).unwrap() {
        SoundHandle::Stereo(sound) => [
            sound.left().source().unwrap(),
            sound.right().source().unwrap(),
        ],
        _ => panic!("not a stereo sound"),
    }
}

/// Transport calls and looping flag changes, in order.
fn transport_calls(system: &SoundSystem<HeadlessBackend>) -> Vec<HardwareCall> {
    system
        .backend()
        .calls()
        .iter()
        .filter(|call| {
            matches!(
                call,
                HardwareCall::Play(_)
                    | HardwareCall::Stop(_)
                    | HardwareCall::Pause(_)
                    | HardwareCall::SetFlag {
                        param: SourceFlag::Looping,
                        ..
                    }
            )
        })
        .cloned()
        .collect()
}

/// Memory stream that counts how often it is pulled.
struct CountingStream {
    inner: MemoryStream,
    pulls: Arc<AtomicUsize>,
}

impl StreamingSoundResource for CountingStream {
    fn channels(&self) -> u16 {
        self.inner.channels()
    }

    fn bits_per_sample(&self) -> u16 {
        self.inner.bits_per_sample()
    }

    fn frequency(&self) -> u32 {
        self.inner.frequency()
    }

    fn sample_count(&self) -> u64 {
        self.inner.sample_count()
    }

    fn next_chunk(&mut self, out: &mut [u8]) -> Result<usize> {
        self.pulls.fetch_add(1, Ordering::SeqCst);
        self.inner.next_chunk(out)
    }

    fn seek(&mut self, byte_offset: u64) -> Result<()> {
        self.inner.seek(byte_offset)
    }
}

fn byte_stream(len: u8) -> SharedStream {
    MemoryStream::new(PcmResource::new((0..len).collect(), 1, 8, 1000)).shared()
}

fn small_chunks() -> SoundSystemDesc {
    SoundSystemDesc::default()
        .initial_chunk_bytes(8)
        .refill_chunk_bytes(4)
}

#[test]
fn test_unavailable_device_degrades_silently() {
    init_logger();
    let mut system =
        SoundSystem::new(SoundSystemDesc::default(), HeadlessBackend::unavailable()).unwrap();
    system.initialize().unwrap();
    assert_eq!(system.state(), DeviceState::Uninitialized);
    let events = system.poll_events();
    assert!(matches!(
        events.as_slice(),
        [SoundEvent::DeviceUnavailable { .. }]
    ));

    let id = system.create_sound(mono(100)).unwrap();
    let mut sound = system.sound(id).unwrap();
    sound.play().unwrap();
    assert!(!sound.is_playing().unwrap());
    assert_eq!(system.queued_action_count(), 1);
    assert_eq!(system.pending_count(), 1);
}

#[test]
fn test_length_of_one_second_sound() {
    let mut system = system();
    system.initialize().unwrap();
    let id = system.create_sound(mono(44100)).unwrap();
    let sound = system.sound(id).unwrap();
    assert_eq!(sound.length_in_samples().unwrap(), 44100);
    assert_eq!(sound.length().unwrap(), Duration::from_secs(1));
}

#[test]
fn test_gain_set_before_initialize_reaches_hardware() {
    let mut system = system();
    let id = system.create_sound(mono(100)).unwrap();
    system.sound(id).unwrap().set_gain(0.5).unwrap();
    assert!(system.backend().calls().is_empty());

    system.initialize().unwrap();
    let source = source_of(&system, id);
    assert_eq!(
        system.backend().source_f32(source, SourceFloat::Gain),
        Some(0.5)
    );
    assert_eq!(
        system.backend().source_f32(source, SourceFloat::ReferenceDistance),
        Some(50.0)
    );
    assert_eq!(
        system.backend().source_f32(source, SourceFloat::RolloffFactor),
        Some(1.0)
    );
}

#[test]
fn test_consumed_stream_chunks_are_pulled_and_requeued() {
    let mut system = system();
    let pulls = Arc::new(AtomicUsize::new(0));
    let stream: SharedStream = Arc::new(Mutex::new(CountingStream {
        inner: MemoryStream::new(PcmResource::new(vec![0; 1024 * 1024], 1, 16, 44100)),
        pulls: pulls.clone(),
    }));
    let id = system.create_stream(stream).unwrap();
    system.sound(id).unwrap().play().unwrap();
    system.initialize().unwrap();
    assert!(system.is_streaming(id));

    let source = source_of(&system, id);
    let primed = system.backend().queued_buffers(source);
    assert_eq!(primed.len(), 2);
    assert_eq!(pulls.load(Ordering::SeqCst), 2);

    system.backend_mut().mark_processed(source, 2);
    system.process(Duration::from_millis(10)).unwrap();

    assert_eq!(pulls.load(Ordering::SeqCst), 4);
    assert_eq!(system.backend().queued_buffers(source), primed);
    for buffer in primed {
        assert_eq!(system.backend().buffer_bytes(buffer).unwrap().len(), 32 * 1024);
    }
}

#[test]
fn test_upload_happens_once_per_resource() {
    let mut system = system();
    system.initialize().unwrap();
    let resource = mono(100);
    let a = system.create_sound(resource.clone()).unwrap();
    let b = system.create_sound(resource).unwrap();
    assert_eq!(system.upload_count(), 1);

    let buffer_of = |system: &SoundSystem<HeadlessBackend>, id| {
        system.backend().attached_buffer(source_of(system, id))
    };
    assert_eq!(buffer_of(&system, a), buffer_of(&system, b));

    system.destroy_sound(a).unwrap();
    assert_eq!(system.backend().live_buffers(), 1);
    system.destroy_sound(b).unwrap();
    assert_eq!(system.backend().live_buffers(), 0);
    assert_eq!(system.backend().live_sources(), 0);
}

#[test]
fn test_queued_actions_replay_in_order() {
    let mut system = system();
    let id = system.create_sound(mono(100)).unwrap();
    {
        let mut sound = system.sound(id).unwrap();
        sound.set_looping(true).unwrap();
        sound.play().unwrap();
        sound.pause().unwrap();
        sound.set_looping(false).unwrap();
        sound.stop().unwrap();
    }
    assert_eq!(system.queued_action_count(), 5);
    assert!(!system.sound(id).unwrap().looping().unwrap());

    system.initialize().unwrap();
    let source = source_of(&system, id);
    let looping = |value| HardwareCall::SetFlag {
        source,
        param: SourceFlag::Looping,
        value,
    };
    assert_eq!(
        transport_calls(&system),
        vec![
            looping(true),
            HardwareCall::Play(vec![source]),
            HardwareCall::Pause(vec![source]),
            looping(false),
            HardwareCall::Stop(vec![source]),
        ]
    );
    assert_eq!(system.queued_action_count(), 0);
    assert!(matches!(
        system.poll_events().last(),
        Some(SoundEvent::DeviceReady { .. })
    ));
}

#[test]
fn test_actions_on_ready_device_run_at_once() {
    let mut system = system();
    system.initialize().unwrap();
    let id = system.create_sound(mono(100)).unwrap();
    system.sound(id).unwrap().play().unwrap();
    assert_eq!(system.queued_action_count(), 0);
    assert!(system.sound(id).unwrap().is_playing().unwrap());
}

#[test]
fn test_gain_survives_device_transitions() {
    let mut system = system();
    let id = system.create_sound(mono(100)).unwrap();
    system.sound(id).unwrap().set_gain(0.3).unwrap();
    system.initialize().unwrap();
    system.sound(id).unwrap().set_gain(0.7).unwrap();
    system.deinitialize().unwrap();
    system.sound(id).unwrap().set_gain(0.9).unwrap();
    assert_eq!(system.sound(id).unwrap().gain().unwrap(), 0.9);

    system.initialize().unwrap();
    assert_eq!(system.sound(id).unwrap().gain().unwrap(), 0.9);
    let source = source_of(&system, id);
    assert_eq!(
        system.backend().source_f32(source, SourceFloat::Gain),
        Some(0.9)
    );
}

#[test]
fn test_negative_gain_is_clamped_on_hardware_only() {
    let mut system = system();
    system.initialize().unwrap();
    let id = system.create_sound(mono(100)).unwrap();
    system.sound(id).unwrap().set_gain(-1.0).unwrap();
    assert_eq!(system.sound(id).unwrap().gain().unwrap(), -1.0);
    let source = source_of(&system, id);
    assert_eq!(
        system.backend().source_f32(source, SourceFloat::Gain),
        Some(0.0)
    );
}

#[test]
fn test_stereo_operations_fan_out() {
    let mut system = system();
    let id = system.create_sound(stereo(100)).unwrap();
    assert_eq!(system.sound(id).unwrap().kind().unwrap(), SoundKind::Stereo);
    system.sound(id).unwrap().set_looping(true).unwrap();
    match system.handle(id).unwrap() {
        SoundHandle::Stereo(sound) => {
            assert!(sound.left().shadow().looping);
            assert!(sound.right().shadow().looping);
        }
        _ => panic!("not a stereo sound"),
    }

    system.initialize().unwrap();
    let [left, right] = stereo_sources(&system, id);
    assert_eq!(
        system.backend().source_flag(left, SourceFlag::Looping),
        Some(true)
    );
    assert_eq!(
        system.backend().source_flag(right, SourceFlag::Looping),
        Some(true)
    );

    system.backend_mut().clear_calls();
    system.sound(id).unwrap().play().unwrap();
    assert_eq!(
        system.backend().calls(),
        &[HardwareCall::Play(vec![left, right])]
    );
    assert!(system.sound(id).unwrap().is_playing().unwrap());

    system
        .backend_mut()
        .set_source_state(right, SourceState::Stopped);
    assert!(matches!(
        system.sound(id).unwrap().is_playing(),
        Err(SoundError::Consistency(_))
    ));
}

#[test]
fn test_stereo_sounds_share_split_buffers() {
    let mut system = system();
    system.initialize().unwrap();
    let resource = stereo(50);
    let a = system.create_sound(resource.clone()).unwrap();
    let b = system.create_sound(resource).unwrap();
    assert_eq!(system.upload_count(), 2);
    assert_eq!(
        system.backend().attached_buffer(stereo_sources(&system, a)[0]),
        system.backend().attached_buffer(stereo_sources(&system, b)[0])
    );
}

#[test]
fn test_looping_stream_wraps_to_start() {
    let mut system = system_with(small_chunks());
    let id = system.create_stream(byte_stream(18)).unwrap();
    {
        let mut sound = system.sound(id).unwrap();
        sound.set_looping(true).unwrap();
        sound.play().unwrap();
    }
    system.initialize().unwrap();
    system.poll_events();
    let source = source_of(&system, id);
    assert_eq!(
        system.backend().source_flag(source, SourceFlag::Looping),
        None
    );

    system.backend_mut().mark_processed(source, 1);
    system.process(Duration::from_millis(10)).unwrap();
    assert_eq!(
        system.poll_events(),
        vec![SoundEvent::StreamLooped { sound: id }]
    );
    let tail = *system.backend().queued_buffers(source).last().unwrap();
    assert_eq!(system.backend().buffer_bytes(tail), Some(&[16u8, 17][..]));

    system.backend_mut().mark_processed(source, 1);
    system.process(Duration::from_millis(10)).unwrap();
    let head = *system.backend().queued_buffers(source).last().unwrap();
    assert_eq!(system.backend().buffer_bytes(head), Some(&[0u8, 1, 2, 3][..]));
    assert!(system.is_streaming(id));
}

#[test]
fn test_finished_stream_leaves_playing_set() {
    let mut system = system_with(small_chunks());
    system.initialize().unwrap();
    let id = system.create_stream(byte_stream(12)).unwrap();
    system.sound(id).unwrap().play().unwrap();
    let source = source_of(&system, id);
    system.poll_events();

    system.backend_mut().mark_processed(source, 2);
    system.process(Duration::from_millis(10)).unwrap();
    assert_eq!(
        system.poll_events(),
        vec![SoundEvent::StreamFinished { sound: id }]
    );
    assert!(!system.is_streaming(id));
    let sound = system.sound(id).unwrap();
    assert!(!sound.is_playing().unwrap());
    assert!(sound.is_at_end().unwrap());
}

#[test]
fn test_stream_cannot_back_two_sounds() {
    let mut system = system();
    let stream = byte_stream(16);
    system.create_stream(stream.clone()).unwrap();
    assert!(matches!(
        system.create_stream(stream),
        Err(SoundError::StreamInUse)
    ));
}

#[test]
fn test_fade_down_ramps_and_completes() {
    let mut system = system_with(SoundSystemDesc::default().fade_duration(Duration::from_millis(100)));
    system.initialize().unwrap();
    let id = system.create_sound(mono(100)).unwrap();
    system.sound(id).unwrap().fade_down().unwrap();
    system.poll_events();

    system.process(Duration::from_millis(50)).unwrap();
    let gain = system.sound(id).unwrap().gain().unwrap();
    assert!((gain - 0.5).abs() < 1e-3, "gain was {}", gain);

    system.process(Duration::from_millis(100)).unwrap();
    assert_eq!(system.sound(id).unwrap().gain().unwrap(), 0.0);
    assert_eq!(
        system.poll_events(),
        vec![SoundEvent::FadeCompleted {
            sound: id,
            gain: 0.0
        }]
    );
    let source = source_of(&system, id);
    assert_eq!(
        system.backend().source_f32(source, SourceFloat::Gain),
        Some(0.0)
    );
}

#[test]
fn test_fade_queued_before_ready_starts_on_replay() {
    let mut system = system_with(SoundSystemDesc::default().fade_duration(Duration::from_millis(100)));
    let id = system.create_sound(mono(100)).unwrap();
    {
        let mut sound = system.sound(id).unwrap();
        sound.set_gain(0.0).unwrap();
        sound.fade_up().unwrap();
    }
    system.process(Duration::from_secs(1)).unwrap();
    assert_eq!(system.sound(id).unwrap().gain().unwrap(), 0.0);

    system.initialize().unwrap();
    system.process(Duration::from_millis(200)).unwrap();
    assert_eq!(system.sound(id).unwrap().gain().unwrap(), 1.0);
}

#[test]
fn test_destroy_discards_queued_actions() {
    let mut system = system();
    let id = system.create_sound(mono(100)).unwrap();
    system.dispatch(id, Action::Play).unwrap();
    system.dispatch(id, Action::FadeDown).unwrap();
    system.sound(id).unwrap().destroy().unwrap();
    assert_eq!(system.queued_action_count(), 0);
    assert_eq!(system.pending_count(), 0);
    assert!(!system.contains(id));

    system.initialize().unwrap();
    assert!(transport_calls(&system).is_empty());
    assert_eq!(system.backend().live_sources(), 0);
    assert!(matches!(
        system.sound(id),
        Err(SoundError::UnknownSound(_))
    ));
}

#[test]
fn test_render_places_sounds_in_any_state() {
    let mut system = system();
    let id = system.create_sound(mono(100)).unwrap();
    let scene = SceneNode::translate(Vec3::new(3.0, 0.0, 0.0), vec![SceneNode::sound(id)]);
    system.render(&Pose::identity(), &scene).unwrap();
    assert_eq!(
        system.sound(id).unwrap().position().unwrap(),
        Vec3::new(3.0, 0.0, 0.0)
    );
    assert!(system.backend().calls().is_empty());

    system.initialize().unwrap();
    let source = source_of(&system, id);
    assert_eq!(
        system.backend().source_vec3(source, SourceVector::Position),
        Some(Vec3::new(3.0, 0.0, 0.0))
    );

    system.backend_mut().clear_calls();
    let listener = Pose::from_position(Vec3::new(0.0, 1.0, 0.0));
    let moved = SceneNode::translate(Vec3::new(-2.0, 0.0, 0.0), vec![SceneNode::sound(id)]);
    system.render(&listener, &moved).unwrap();
    assert_eq!(
        system.backend().calls()[0],
        HardwareCall::ListenerPosition(Vec3::new(0.0, 1.0, 0.0))
    );
    assert_eq!(
        system.backend().source_vec3(source, SourceVector::Position),
        Some(Vec3::new(-2.0, 0.0, 0.0))
    );
}

#[test]
fn test_deinitialize_orphans_and_rebinds() {
    let mut system = system();
    system.initialize().unwrap();
    let id = system.create_sound(mono(44100)).unwrap();
    system.sound(id).unwrap().play().unwrap();
    let source = source_of(&system, id);
    system.backend_mut().set_sample_offset(source, 1000).unwrap();

    system.deinitialize().unwrap();
    assert_eq!(system.state(), DeviceState::Uninitialized);
    assert!(!system.backend().is_context_active());
    assert_eq!(system.pending_count(), 1);
    assert!(system.poll_events().contains(&SoundEvent::DeviceClosed));
    assert_eq!(system.sound(id).unwrap().elapsed_samples().unwrap(), 1000);
    assert!(!system.sound(id).unwrap().is_playing().unwrap());

    system.sound(id).unwrap().set_position(Vec3::Z).unwrap();
    system.initialize().unwrap();
    let rebound = source_of(&system, id);
    assert_eq!(system.backend().sample_offset(rebound).unwrap(), 1000);
    assert_eq!(
        system.backend().source_vec3(rebound, SourceVector::Position),
        Some(Vec3::Z)
    );
    assert_eq!(system.pending_count(), 0);
}

#[test]
fn test_hardware_errors_propagate() {
    let mut system = system();
    system.initialize().unwrap();
    let id = system.create_sound(mono(100)).unwrap();
    system
        .backend_mut()
        .fail_next_call(error_code::INVALID_OPERATION);
    let result = system.sound(id).unwrap().play();
    assert!(matches!(
        result,
        Err(SoundError::HardwareCall {
            operation: "play sources",
            code: error_code::INVALID_OPERATION
        })
    ));
}

#[test]
fn test_unsupported_formats_fail_at_creation() {
    let mut system = system();
    let surround: Arc<dyn SoundResource> =
        Arc::new(PcmResource::new(vec![0; 12], 3, 16, 44100));
    assert!(matches!(
        system.create_sound(surround),
        Err(SoundError::UnsupportedSoundFormat(3))
    ));
    let wide: Arc<dyn SoundResource> = Arc::new(PcmResource::new(vec![0; 12], 1, 24, 44100));
    assert!(matches!(
        system.create_sound(wide),
        Err(SoundError::UnsupportedFormat { .. })
    ));
    assert_eq!(system.sound_count(), 0);
}

#[test]
fn test_device_selection_applies_on_initialize() {
    init_logger();
    let backend = HeadlessBackend::with_devices(vec!["First".to_string(), "Second".to_string()]);
    let mut system = SoundSystem::new(SoundSystemDesc::default(), backend).unwrap();
    assert_eq!(system.device_count(), 2);
    assert_eq!(system.device_name(1).as_deref(), Some("Second"));
    assert!(matches!(
        system.set_device(5),
        Err(SoundError::Configuration(_))
    ));

    system.set_device(1).unwrap();
    system.initialize().unwrap();
    assert_eq!(
        system.backend().calls()[0],
        HardwareCall::OpenDevice(Some("Second".to_string()))
    );
    assert_eq!(
        system.poll_events(),
        vec![SoundEvent::DeviceReady {
            device_name: "Second".to_string()
        }]
    );
}

#[test]
fn test_initialize_twice_is_a_no_op() {
    let mut system = system();
    system.initialize().unwrap();
    system.initialize().unwrap();
    let opens = system
        .backend()
        .calls()
        .iter()
        .filter(|call| matches!(call, HardwareCall::OpenDevice(_)))
        .count();
    assert_eq!(opens, 1);
}

#[test]
fn test_backend_errors_surface_as_events() {
    let mut system = system();
    system.backend_mut().push_device_error("stream underrun");
    system.process(Duration::from_millis(16)).unwrap();
    assert_eq!(
        system.poll_events(),
        vec![SoundEvent::BackendError {
            error: "stream underrun".to_string()
        }]
    );
}

#[test]
fn test_elapsed_time_round_trips_through_hardware() {
    let mut system = system();
    system.initialize().unwrap();
    let id = system.create_sound(mono(44100)).unwrap();
    let mut sound = system.sound(id).unwrap();
    sound.set_elapsed_time(Duration::from_millis(500)).unwrap();
    assert_eq!(sound.elapsed_samples().unwrap(), 22050);
    assert_eq!(sound.elapsed_time().unwrap(), Duration::from_millis(500));
    assert_eq!(sound.time_left().unwrap(), Duration::from_millis(500));
    assert!(!sound.is_at_end().unwrap());
}

#[test]
fn test_velocity_and_distance_attributes() {
    let mut system = system();
    let id = system.create_sound(mono(100)).unwrap();
    {
        let mut sound = system.sound(id).unwrap();
        sound.set_velocity(Vec3::new(0.0, 0.0, -3.0)).unwrap();
        sound.set_max_distance(25.0).unwrap();
        sound.set_relative_position(true).unwrap();
        assert_eq!(sound.max_distance().unwrap(), 25.0);
        assert!(sound.relative_position().unwrap());
    }
    system.initialize().unwrap();
    let source = source_of(&system, id);
    let backend = system.backend();
    assert_eq!(
        backend.source_vec3(source, SourceVector::Velocity),
        Some(Vec3::new(0.0, 0.0, -3.0))
    );
    assert_eq!(backend.source_f32(source, SourceFloat::MaxDistance), Some(25.0));
    assert_eq!(backend.source_flag(source, SourceFlag::Relative), Some(true));
}

#[test]
fn test_looping_survives_device_restart() {
    let mut system = system();
    let id = system.create_sound(mono(100)).unwrap();
    system.initialize().unwrap();
    system.sound(id).unwrap().set_looping(true).unwrap();
    system.deinitialize().unwrap();
    system.initialize().unwrap();

    let source = source_of(&system, id);
    assert_eq!(
        system.backend().source_flag(source, SourceFlag::Looping),
        Some(true)
    );
    assert!(system.sound(id).unwrap().looping().unwrap());
}

#[test]
fn test_failed_upload_keeps_other_sounds() {
    let mut system = system();
    // Three bytes cannot hold whole 16-bit frames
    let broken: Arc<dyn SoundResource> = Arc::new(PcmResource::new(vec![0; 3], 1, 16, 44100));
    let broken = system.create_sound(broken).unwrap();
    let good = system.create_sound(mono(100)).unwrap();
    system.sound(broken).unwrap().play().unwrap();
    system.sound(good).unwrap().play().unwrap();

    let result = system.initialize();
    assert!(matches!(
        result,
        Err(SoundError::HardwareCall {
            operation: "buffer data",
            ..
        })
    ));
    assert_eq!(system.state(), DeviceState::Ready);
    assert!(system.sound(good).unwrap().is_playing().unwrap());
    assert_eq!(system.pending_count(), 1);
    assert_eq!(system.queued_action_count(), 1);
    assert_eq!(system.backend().live_buffers(), 1);
    assert!(matches!(
        system.poll_events().last(),
        Some(SoundEvent::DeviceReady { .. })
    ));
}

#[test]
fn test_failed_release_still_closes_device() {
    let mut system = system();
    system.initialize().unwrap();
    let id = system.create_sound(mono(100)).unwrap();
    system
        .backend_mut()
        .fail_next_call(error_code::INVALID_OPERATION);

    assert!(system.deinitialize().is_err());
    assert_eq!(system.state(), DeviceState::Uninitialized);
    assert!(!system.backend().is_context_active());
    assert_eq!(system.pending_count(), 1);
    assert_eq!(system.backend().live_buffers(), 0);

    system.initialize().unwrap();
    source_of(&system, id);
    assert_eq!(system.backend().live_sources(), 1);
    assert_eq!(system.pending_count(), 0);
}

#[test]
fn test_paused_stream_resumes_where_it_was() {
    let mut system = system_with(small_chunks());
    system.initialize().unwrap();
    let id = system.create_stream(byte_stream(40)).unwrap();
    {
        let mut sound = system.sound(id).unwrap();
        sound.play().unwrap();
        sound.set_elapsed_samples(5).unwrap();
        sound.pause().unwrap();
    }
    system.deinitialize().unwrap();
    assert_eq!(system.sound(id).unwrap().elapsed_samples().unwrap(), 5);
}

#[test]
fn test_odd_chunk_sizes_keep_streaming() {
    let desc = SoundSystemDesc::default()
        .initial_chunk_bytes(10)
        .refill_chunk_bytes(5);
    let mut system = system_with(desc);
    let stream = MemoryStream::new(PcmResource::new(vec![0; 400], 1, 16, 1000)).shared();
    let id = system.create_stream(stream).unwrap();
    system.sound(id).unwrap().play().unwrap();
    system.initialize().unwrap();
    assert!(system.is_streaming(id));

    let source = source_of(&system, id);
    system.backend_mut().mark_processed(source, 1);
    system.process(Duration::from_millis(10)).unwrap();
    assert!(system.is_streaming(id));
    assert!(!system
        .poll_events()
        .iter()
        .any(|event| matches!(event, SoundEvent::StreamFinished { .. })));
}

#[test]
fn test_destroy_releases_buffers_after_source_error() {
    let mut system = system();
    system.initialize().unwrap();
    let resource = mono(100);
    let id = system.create_sound(resource.clone()).unwrap();
    system
        .backend_mut()
        .fail_next_call(error_code::INVALID_OPERATION);

    assert!(system.destroy_sound(id).is_err());
    assert!(!system.contains(id));
    assert_eq!(system.backend().live_buffers(), 0);

    let again = system.create_sound(resource).unwrap();
    assert_eq!(system.upload_count(), 2);
    assert_eq!(system.backend().live_buffers(), 1);
    source_of(&system, again);
}

#[test]
fn test_listener_velocity_applies_on_initialize() {
    let mut system = system();
    let velocity = Vec3::new(1.0, 0.0, -2.0);
    system.set_listener_velocity(velocity).unwrap();
    assert!(system.backend().calls().is_empty());

    system.initialize().unwrap();
    assert!(system
        .backend()
        .calls()
        .contains(&HardwareCall::ListenerVelocity(velocity)));

    system.set_listener_velocity(Vec3::ZERO).unwrap();
    assert_eq!(
        system.backend().calls().last(),
        Some(&HardwareCall::ListenerVelocity(Vec3::ZERO))
    );
    assert_eq!(system.listener_velocity(), Vec3::ZERO);
}

#[test]
fn test_actions_on_unbound_sound_stay_queued() {
    let mut system = system();
    let broken: Arc<dyn SoundResource> = Arc::new(PcmResource::new(vec![0; 3], 1, 16, 44100));
    let id = system.create_sound(broken).unwrap();
    assert!(system.initialize().is_err());

    system.sound(id).unwrap().play().unwrap();
    assert_eq!(system.queued_action_count(), 1);
    assert!(!system.sound(id).unwrap().is_playing().unwrap());
}
