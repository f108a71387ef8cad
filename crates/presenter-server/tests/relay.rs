use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use bytes::{BufMut, BytesMut};
use presenter_channel::{
    ChannelRegistry, ChannelStatus, ConsumerApi, ConsumerConfig, ManualClock, MediaKind,
    RegistryConfig, VideoFrame,
};
use presenter_frame::{encode_frame, FrameError, FrameReader};
use presenter_server::{
    AgentConfig, ImageFormat, OpenChannelErrorCode, OpenChannelRequest, PresentDataErrorCode,
    PresentImageRequest, PresenterAgent, PresenterServer, RouterConfig, ServerConfig, ServerError,
    ServerHandle,
};
use presenter_transport::PresenterStream;

struct Relay {
    handle: ServerHandle,
    consumer: ConsumerApi,
}

impl Relay {
    fn start() -> Self {
        Self::start_with(Arc::new(ChannelRegistry::new()), RouterConfig::default())
    }

    fn start_with(registry: Arc<ChannelRegistry>, router: RouterConfig) -> Self {
        Self::start_config(
            registry,
            ServerConfig {
                router,
                ..test_config()
            },
        )
    }

    fn start_config(registry: Arc<ChannelRegistry>, config: ServerConfig) -> Self {
        let server = PresenterServer::bind(config, Arc::clone(&registry)).unwrap();
        let consumer = ConsumerApi::with_config(
            registry,
            ConsumerConfig {
                video_wait: Duration::from_millis(200),
                image_wait: Duration::from_millis(200),
            },
        );
        Self {
            handle: server.spawn().unwrap(),
            consumer,
        }
    }

    fn addr(&self) -> SocketAddr {
        self.handle.local_addr()
    }

    fn agent(&self) -> PresenterAgent {
        PresenterAgent::connect(self.addr(), &AgentConfig::default()).unwrap()
    }

    fn registry(&self) -> &Arc<ChannelRegistry> {
        self.consumer.registry()
    }
}

fn test_config() -> ServerConfig {
    ServerConfig {
        addr: "127.0.0.1:0".parse().unwrap(),
        poll_interval: Duration::from_millis(10),
        sweep_interval: Duration::from_millis(20),
        ..ServerConfig::default()
    }
}

fn raw_frame(name: &str, message: &impl prost::Message, out: &mut BytesMut) {
    encode_frame(name, &message.encode_to_vec(), out).unwrap();
}

fn eventually(what: &str, mut check: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !check() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        std::thread::sleep(Duration::from_millis(5));
    }
}

fn jpeg(tag: &'static [u8]) -> VideoFrame {
    VideoFrame::new(tag, 100, 100)
}

fn assert_closed_by_server(stream: PresenterStream) {
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    let mut reader = FrameReader::new(stream);
    loop {
        match reader.read_frame() {
            Ok(_) => continue,
            Err(err) => {
                assert!(
                    matches!(err, FrameError::ConnectionClosed | FrameError::Io(_)),
                    "unexpected error {err:?}"
                );
                return;
            }
        }
    }
}

#[test]
fn video_channel_end_to_end() {
    let relay = Relay::start();
    let mut agent = relay.agent();

    agent.open_channel("cam1", MediaKind::Video).unwrap();
    assert_eq!(agent.channel(), Some("cam1"));
    assert!(relay.registry().is_channel_busy("cam1"));

    agent.present_image(&jpeg(b"A")).unwrap();
    let state = relay.consumer.get_channel_state("cam1");
    assert_eq!(state.status, ChannelStatus::Ok);
    assert_eq!(state.media_kind, Some(MediaKind::Video));
    assert_eq!(state.image.as_deref(), Some(&b"A"[..]));
    assert_eq!((state.width, state.height), (Some(100), Some(100)));
    assert_eq!(state.fps, Some(1));

    assert_eq!(
        relay.consumer.get_channel_state("cam1").status,
        ChannelStatus::Loading
    );

    let channels = relay.consumer.list_channels();
    assert_eq!(channels.len(), 1);
    assert!(channels[0].busy);
}

#[test]
fn image_channel_keeps_last_image_after_disconnect() {
    let relay = Relay::start();
    let mut agent = relay.agent();
    agent.open_channel("still", MediaKind::Image).unwrap();
    agent.present_image(&jpeg(b"one")).unwrap();
    agent.present_image(&jpeg(b"two")).unwrap();
    agent.close();

    eventually("binding release", || !relay.registry().is_channel_busy("still"));
    let state = relay.consumer.get_channel_state("still");
    assert_eq!(state.status, ChannelStatus::Ok);
    assert_eq!(state.image.as_deref(), Some(&b"two"[..]));

    let update = relay.consumer.next_image("still", 0).unwrap().unwrap();
    assert_eq!(update.generation, 2);
}

#[test]
fn second_producer_gets_already_opened_until_unregistered() {
    let relay = Relay::start();
    let mut first = relay.agent();
    let mut second = relay.agent();
    first.open_channel("cam1", MediaKind::Video).unwrap();

    match second.open_channel("cam1", MediaKind::Video) {
        Err(ServerError::OpenRejected { code, message }) => {
            assert_eq!(code, OpenChannelErrorCode::AlreadyOpened);
            assert_eq!(message, "channel cam1 is busy.");
        }
        other => panic!("expected busy rejection, got {other:?}"),
    }

    // The refused connection stays usable.
    assert!(relay.consumer.delete_channels("cam1").success);
    second.open_channel("cam1", MediaKind::Video).unwrap();
    second.present_image(&jpeg(b"B")).unwrap();

    // The first producer is still connected but no longer bound.
    match first.present_image(&jpeg(b"late")) {
        Err(ServerError::PresentRejected { code, .. }) => {
            assert_eq!(code, PresentDataErrorCode::Other)
        }
        other => panic!("expected rejection, got {other:?}"),
    }
}

#[test]
fn unsupported_format_is_answered_and_connection_survives() {
    let relay = Relay::start();
    let mut agent = relay.agent();
    agent.open_channel("cam1", MediaKind::Image).unwrap();

    let mut request = PresentImageRequest::jpeg(&jpeg(b"png?"));
    request.format = 7;
    let response = agent.present(&request).unwrap();
    assert_eq!(response.error_code(), PresentDataErrorCode::UnsupportedFormat);
    assert_eq!(response.error_message, "Present data not support format.");

    agent.heartbeat().unwrap();
    request.format = ImageFormat::Jpeg as i32;
    let response = agent.present(&request).unwrap();
    assert_eq!(response.error_code(), PresentDataErrorCode::None);
}

#[test]
fn open_without_auto_register_needs_registered_channel() {
    let relay = Relay::start_with(
        Arc::new(ChannelRegistry::new()),
        RouterConfig {
            auto_register: false,
        },
    );
    let mut agent = relay.agent();

    match agent.open_channel("cam1", MediaKind::Video) {
        Err(ServerError::OpenRejected { code, message }) => {
            assert_eq!(code, OpenChannelErrorCode::NoSuchChannel);
            assert_eq!(message, "channel cam1 not exist.");
        }
        other => panic!("expected rejection, got {other:?}"),
    }

    assert!(relay.consumer.add_channel("cam1").success);
    agent.open_channel("cam1", MediaKind::Video).unwrap();
}

#[test]
fn eleventh_channel_is_refused() {
    let relay = Relay::start();
    for i in 0..10 {
        relay.registry().register(&format!("cam{i}")).unwrap();
    }
    let mut agent = relay.agent();

    match agent.open_channel("cam10", MediaKind::Video) {
        Err(ServerError::OpenRejected { code, .. }) => {
            assert_eq!(code, OpenChannelErrorCode::Other)
        }
        other => panic!("expected rejection, got {other:?}"),
    }
    agent.open_channel("cam3", MediaKind::Video).unwrap();
}

#[test]
fn unknown_message_closes_connection() {
    let relay = Relay::start();
    let mut raw = PresenterStream::connect(relay.addr(), Some(Duration::from_secs(2))).unwrap();
    let mut buf = BytesMut::new();
    encode_frame("ascend.presenter.proto.Mystery", b"", &mut buf).unwrap();
    raw.write_all(&buf).unwrap();

    assert_closed_by_server(raw);
}

#[test]
fn malformed_frame_tears_down_only_that_connection() {
    let relay = Relay::start();
    let mut healthy = relay.agent();
    healthy.open_channel("good", MediaKind::Video).unwrap();

    let mut victim = relay.agent();
    victim.open_channel("bad", MediaKind::Video).unwrap();

    let mut raw = PresenterStream::connect(relay.addr(), Some(Duration::from_secs(2))).unwrap();
    let mut buf = BytesMut::new();
    // total length shorter than header plus name
    buf.put_u32(6);
    buf.put_u8(10);
    raw.write_all(&buf).unwrap();
    assert_closed_by_server(raw);

    healthy.present_image(&jpeg(b"still-fine")).unwrap();
    assert!(relay.registry().is_channel_busy("good"));
    assert!(relay.registry().is_channel_busy("bad"));
}

#[test]
fn disconnect_mid_frame_releases_binding() {
    let relay = Relay::start();
    let mut agent = relay.agent();
    agent.open_channel("cam1", MediaKind::Video).unwrap();

    // Hand the channel over to a raw socket.
    agent.close();
    eventually("release", || !relay.registry().is_channel_busy("cam1"));

    let mut raw = PresenterStream::connect(relay.addr(), Some(Duration::from_secs(2))).unwrap();
    let mut open = BytesMut::new();
    let body = prost::Message::encode_to_vec(&presenter_server::OpenChannelRequest {
        channel_name: "cam1".to_string(),
        content_type: 1,
    });
    encode_frame("ascend.presenter.proto.OpenChannelRequest", &body, &mut open).unwrap();
    raw.write_all(&open).unwrap();
    eventually("raw bind", || relay.registry().is_channel_busy("cam1"));

    let mut partial = BytesMut::new();
    encode_frame("ascend.presenter.proto.PresentImageRequest", &[0u8; 64], &mut partial).unwrap();
    raw.write_all(&partial[..20]).unwrap();
    drop(raw);

    eventually("release after partial frame", || {
        !relay.registry().is_channel_busy("cam1")
    });
    assert!(relay.registry().is_channel_exist("cam1"));
}

#[test]
fn heartbeat_timeout_unregisters_and_disconnects() {
    let clock = Arc::new(ManualClock::new());
    let registry = Arc::new(ChannelRegistry::with_clock(
        RegistryConfig::default(),
        clock.clone(),
    ));
    let relay = Relay::start_with(registry, RouterConfig::default());

    let mut quiet = relay.agent();
    quiet.open_channel("quiet", MediaKind::Video).unwrap();
    let mut chatty = relay.agent();
    chatty.open_channel("chatty", MediaKind::Image).unwrap();

    clock.advance(Duration::from_secs(60));
    chatty.heartbeat().unwrap();
    // The round trip guarantees the heartbeat was handled before time jumps.
    chatty.present_image(&jpeg(b"ping")).unwrap();
    clock.advance(Duration::from_secs(41));

    eventually("expiry", || !relay.registry().is_channel_exist("quiet"));
    assert!(relay.registry().is_channel_busy("chatty"));

    match quiet.present_image(&jpeg(b"too late")) {
        Err(err) => assert_eq!(err.class(), presenter_server::ErrorClass::Transport),
        Ok(()) => panic!("expired producer should be disconnected"),
    }
}

#[test]
fn shutdown_closes_producers_and_runtimes() {
    let relay = Relay::start();
    let mut agent = relay.agent();
    agent.open_channel("cam1", MediaKind::Video).unwrap();
    let runtime = relay.registry().runtime_for_channel("cam1").unwrap();

    let Relay { handle, consumer } = relay;
    handle.shutdown();
    handle.join().unwrap();

    assert!(runtime.is_closed());
    assert!(!consumer.registry().is_channel_busy("cam1"));
    assert!(agent.present_image(&jpeg(b"after")).is_err());
}

#[test]
fn producer_that_never_reads_does_not_stall_the_server() {
    let relay = Relay::start_config(
        Arc::new(ChannelRegistry::new()),
        ServerConfig {
            max_outbound: 16 * 1024,
            ..test_config()
        },
    );

    let mut flood = PresenterStream::connect(relay.addr(), Some(Duration::from_secs(2))).unwrap();
    flood
        .set_write_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    let mut open = BytesMut::new();
    raw_frame(
        "ascend.presenter.proto.OpenChannelRequest",
        &OpenChannelRequest {
            channel_name: "flood".to_string(),
            content_type: 0,
        },
        &mut open,
    );
    flood.write_all(&open).unwrap();
    eventually("flood bind", || relay.registry().is_channel_busy("flood"));

    // 200k image requests, written in batches, never reading a reply.
    let flooder = thread::spawn(move || {
        let mut batch = BytesMut::new();
        for _ in 0..1000 {
            raw_frame(
                "ascend.presenter.proto.PresentImageRequest",
                &PresentImageRequest::jpeg(&jpeg(b"flood")),
                &mut batch,
            );
        }
        for _ in 0..200 {
            if flood.write_all(&batch).is_err() {
                break;
            }
        }
        flood
    });

    thread::sleep(Duration::from_millis(100));
    let started = Instant::now();
    let mut other = relay.agent();
    other.open_channel("other", MediaKind::Image).unwrap();
    other.present_image(&jpeg(b"ok")).unwrap();
    assert!(
        started.elapsed() < Duration::from_secs(1),
        "open took {:?}",
        started.elapsed()
    );

    eventually("stalled producer teardown", || {
        !relay.registry().is_channel_busy("flood")
    });

    let Relay { handle, .. } = relay;
    let started = Instant::now();
    handle.shutdown();
    handle.join().unwrap();
    assert!(started.elapsed() < Duration::from_secs(3));
    drop(flooder.join().unwrap());
}

#[test]
fn undrained_video_frames_do_not_delay_other_producers() {
    let relay = Relay::start();
    let mut video = relay.agent();
    video.open_channel("cam1", MediaKind::Video).unwrap();

    let pusher = thread::spawn(move || {
        let started = Instant::now();
        for _ in 0..10 {
            video.present_image(&jpeg(b"frame")).unwrap();
        }
        started.elapsed()
    });

    let started = Instant::now();
    let mut still = relay.agent();
    still.open_channel("still", MediaKind::Image).unwrap();
    still.present_image(&jpeg(b"image")).unwrap();
    assert!(
        started.elapsed() < Duration::from_millis(500),
        "unrelated producer took {:?}",
        started.elapsed()
    );

    let pushed = pusher.join().unwrap();
    assert!(pushed < Duration::from_secs(1), "ten frames took {pushed:?}");

    let runtime = relay.registry().runtime_for_channel("cam1").unwrap();
    assert!(runtime.has_frame());
    assert!(runtime.dropped_frames() >= 1);
}
