use lumen_cache::{derive_key, TieredCache};
use lumen_core::{
    DecodedImage, Error, LoaderConfig, LoaderConfigBuilder, Locator, PixelFormat, Result,
};
use lumen_loader::{
    Decoder, DispatchMode, Dispatcher, EventLoop, ImageCreator, Layer, ProcessedImage, TaskState,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc as std_mpsc, Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;

const FADE: Duration = Duration::from_millis(200);

fn solid(fill: u8) -> DecodedImage {
    DecodedImage::new(2, 2, PixelFormat::Rgba8, vec![fill; 16]).unwrap()
}

fn config(dir: &TempDir, workers: usize) -> LoaderConfig {
    LoaderConfigBuilder::new()
        .with_cache_dir(dir.path())
        .with_memory_budget(1 << 20)
        .with_workers(workers)
        .with_fade_duration(FADE)
        .build()
        .unwrap()
}

/// Decoder that blocks until released and counts its calls
struct GatedDecoder {
    calls: AtomicUsize,
    gate: Mutex<std_mpsc::Receiver<()>>,
    fail: bool,
}

impl GatedDecoder {
    fn new(fail: bool) -> (Arc<Self>, std_mpsc::Sender<()>) {
        let (release, gate) = std_mpsc::channel();
        let decoder = Arc::new(Self {
            calls: AtomicUsize::new(0),
            gate: Mutex::new(gate),
            fail,
        });
        (decoder, release)
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Decoder for GatedDecoder {
    fn decode(&self, locator: &Locator) -> Result<DecodedImage> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        // A dropped sender opens the gate for good
        let _ = self.gate.lock().unwrap().recv();
        if self.fail {
            Err(Error::decode_failure(locator.as_str(), "not an image"))
        } else {
            Ok(solid(7))
        }
    }
}

struct Fixture {
    _dir: TempDir,
    dispatcher: Dispatcher,
    decoder: Arc<GatedDecoder>,
    release: Option<std_mpsc::Sender<()>>,
}

impl Fixture {
    async fn new(workers: usize, fail: bool) -> Self {
        let dir = TempDir::new().unwrap();
        let config = config(&dir, workers);
        let cache = Arc::new(TieredCache::open(&config).await.unwrap());
        let (decoder, release) = GatedDecoder::new(fail);
        let dispatcher = Dispatcher::new(cache, decoder.clone(), &config).unwrap();
        Self {
            _dir: dir,
            dispatcher,
            decoder,
            release: Some(release),
        }
    }

    /// Let every current and future decode through
    fn open_gate(&mut self) {
        self.release.take();
    }

    async fn wait_for_decodes(&self, expected: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.decoder.calls() < expected {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("decoder was not called in time");
    }
}

type Deliveries = mpsc::UnboundedReceiver<Option<ProcessedImage>>;

fn collector() -> (
    impl Fn() -> Box<dyn FnOnce(Option<ProcessedImage>) + Send>,
    Deliveries,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let make = move || {
        let tx = tx.clone();
        Box::new(move |result: Option<ProcessedImage>| {
            let _ = tx.send(result);
        }) as Box<dyn FnOnce(Option<ProcessedImage>) + Send>
    };
    (make, rx)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_loads_decode_once() {
    let mut fixture = Fixture::new(4, false).await;
    let (receiver, mut deliveries) = collector();

    let spellings = ["/srv/img/a.png", "/srv//img/./a.png", "file:///srv/img/a.png"];
    let mut handles = Vec::new();
    for i in 0..16 {
        let locator = spellings[i % spellings.len()];
        handles.push(
            fixture
                .dispatcher
                .load(locator, receiver(), ImageCreator::Identity, DispatchMode::Plain)
                .unwrap(),
        );
    }
    fixture.wait_for_decodes(1).await;
    fixture.open_gate();

    for _ in 0..16 {
        let result = deliveries.recv().await.unwrap();
        assert_eq!(**result.unwrap().image(), solid(7));
    }
    for handle in &handles {
        assert_eq!(handle.finished().await, TaskState::Completed);
    }

    assert_eq!(fixture.decoder.calls(), 1);
    assert!(!handles[0].is_coalesced());
    assert!(handles[1..].iter().all(|h| h.is_coalesced()));

    let stats = fixture.dispatcher.statistics();
    assert_eq!(stats.requests, 16);
    assert_eq!(stats.coalesced, 15);
    assert_eq!(stats.tasks_spawned, 1);
    assert_eq!(stats.deliveries, 16);
    assert_eq!(stats.in_flight, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancelled_load_delivers_nothing_but_still_caches() {
    let mut fixture = Fixture::new(2, false).await;
    let (receiver, mut deliveries) = collector();

    let handle = fixture
        .dispatcher
        .load("/a.png", receiver(), ImageCreator::CompositeFade, DispatchMode::Plain)
        .unwrap();
    fixture.wait_for_decodes(1).await;

    assert!(handle.cancel());
    assert!(!handle.cancel());
    fixture.open_gate();

    assert_eq!(handle.finished().await, TaskState::Cancelled);
    assert!(deliveries.try_recv().is_err());
    assert!(fixture
        .dispatcher
        .cache()
        .contains_in_memory(&derive_key(&Locator::new("/a.png"))));

    // The next load is a memory hit: no decode, no fade
    let again = fixture
        .dispatcher
        .load("/a.png", receiver(), ImageCreator::CompositeFade, DispatchMode::Plain)
        .unwrap();
    assert_eq!(again.finished().await, TaskState::Completed);
    assert!(matches!(
        deliveries.recv().await.unwrap(),
        Some(ProcessedImage::Drawable(_))
    ));
    assert_eq!(fixture.decoder.calls(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancelling_one_receiver_keeps_the_others() {
    let mut fixture = Fixture::new(2, false).await;
    let (receiver, mut deliveries) = collector();

    let first = fixture
        .dispatcher
        .load("/a.png", receiver(), ImageCreator::Identity, DispatchMode::Plain)
        .unwrap();
    let second = fixture
        .dispatcher
        .load("/a.png", receiver(), ImageCreator::Identity, DispatchMode::Plain)
        .unwrap();
    fixture.wait_for_decodes(1).await;

    assert!(fixture.dispatcher.cancel(&first));
    fixture.open_gate();

    assert_eq!(second.finished().await, TaskState::Completed);
    assert!(deliveries.recv().await.unwrap().is_some());
    assert!(deliveries.try_recv().is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn pending_task_cancelled_before_it_starts() {
    let mut fixture = Fixture::new(1, false).await;
    let (receiver, mut deliveries) = collector();

    let busy = fixture
        .dispatcher
        .load("/busy.png", receiver(), ImageCreator::Identity, DispatchMode::Plain)
        .unwrap();
    fixture.wait_for_decodes(1).await;

    let queued = fixture
        .dispatcher
        .load("/queued.png", receiver(), ImageCreator::Identity, DispatchMode::Plain)
        .unwrap();
    assert_eq!(queued.task_state(), TaskState::Pending);
    assert!(queued.cancel());
    fixture.open_gate();

    assert_eq!(busy.finished().await, TaskState::Completed);
    assert_eq!(queued.finished().await, TaskState::Cancelled);
    assert!(deliveries.recv().await.unwrap().is_some());
    assert!(deliveries.try_recv().is_err());
    assert_eq!(fixture.decoder.calls(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn decode_failure_delivers_absence_once_on_calling_context() {
    let mut fixture = Fixture::new(2, true).await;
    fixture.open_gate();

    let mut event_loop = EventLoop::new();
    let context = event_loop.handle();
    fixture.dispatcher.container_created(&context).unwrap();

    let calling_thread = std::thread::current().id();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let handle = {
        let seen = seen.clone();
        fixture
            .dispatcher
            .load(
                "/broken.png",
                move |result: Option<ProcessedImage>| {
                    seen.lock()
                        .unwrap()
                        .push((result.is_none(), std::thread::current().id()));
                },
                ImageCreator::CompositeFade,
                DispatchMode::Context(context),
            )
            .unwrap()
    };

    assert_eq!(handle.finished().await, TaskState::Failed);
    assert!(seen.lock().unwrap().is_empty());

    assert_eq!(event_loop.run_pending(), 1);
    assert_eq!(event_loop.run_pending(), 0);
    assert_eq!(*seen.lock().unwrap(), vec![(true, calling_thread)]);
    assert_eq!(fixture.dispatcher.statistics().failed, 1);
}

#[tokio::test]
async fn malformed_locator_is_rejected_immediately() {
    let fixture = Fixture::new(2, false).await;
    let (receiver, mut deliveries) = collector();

    let handle = fixture
        .dispatcher
        .load("  ", receiver(), ImageCreator::Identity, DispatchMode::Plain)
        .unwrap();

    assert_eq!(handle.task_state(), TaskState::Failed);
    assert!(handle.key().is_invalid());
    assert_eq!(deliveries.try_recv().unwrap(), None);
    assert_eq!(fixture.dispatcher.in_flight_count(), 0);
    assert_eq!(fixture.decoder.calls(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn destroyed_container_receives_nothing() {
    let mut fixture = Fixture::new(2, false).await;
    let mut event_loop = EventLoop::new();
    let context = event_loop.handle();
    let (receiver, _deliveries) = collector();

    // Unregistered contexts are refused
    let err = fixture
        .dispatcher
        .load("/a.png", receiver(), ImageCreator::Identity, DispatchMode::Context(context.clone()))
        .unwrap_err();
    assert!(matches!(err, Error::PreconditionViolation { .. }));

    fixture.dispatcher.container_created(&context).unwrap();
    let handle = fixture
        .dispatcher
        .load("/a.png", receiver(), ImageCreator::Identity, DispatchMode::Context(context.clone()))
        .unwrap();
    fixture.wait_for_decodes(1).await;

    assert_eq!(fixture.dispatcher.container_destroyed(&context), 1);
    fixture.open_gate();

    assert_eq!(handle.finished().await, TaskState::Cancelled);
    assert_eq!(event_loop.run_pending(), 0);

    let err = fixture
        .dispatcher
        .load("/b.png", receiver(), ImageCreator::Identity, DispatchMode::Context(context))
        .unwrap_err();
    assert!(matches!(err, Error::PreconditionViolation { .. }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_cancels_queued_tasks_and_refuses_loads() {
    let mut fixture = Fixture::new(1, false).await;
    let (receiver, mut deliveries) = collector();

    let running = fixture
        .dispatcher
        .load("/running.png", receiver(), ImageCreator::Identity, DispatchMode::Plain)
        .unwrap();
    fixture.wait_for_decodes(1).await;
    let queued = fixture
        .dispatcher
        .load("/queued.png", receiver(), ImageCreator::Identity, DispatchMode::Plain)
        .unwrap();

    fixture.dispatcher.shutdown();
    let err = fixture
        .dispatcher
        .load("/late.png", receiver(), ImageCreator::Identity, DispatchMode::Plain)
        .unwrap_err();
    assert!(matches!(err, Error::PreconditionViolation { .. }));

    fixture.open_gate();
    assert_eq!(running.finished().await, TaskState::Completed);
    assert_eq!(queued.finished().await, TaskState::Cancelled);
    assert!(deliveries.recv().await.unwrap().is_some());
    assert!(deliveries.try_recv().is_err());
    assert_eq!(fixture.decoder.calls(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn fade_applies_only_on_first_appearance() {
    let mut fixture = Fixture::new(2, false).await;
    fixture.open_gate();
    let (receiver, mut deliveries) = collector();

    let load = |creator| {
        fixture
            .dispatcher
            .load("/a.png", receiver(), creator, DispatchMode::Plain)
            .unwrap()
    };

    // Decoded
    load(ImageCreator::CompositeFade).finished().await;
    match deliveries.recv().await.unwrap() {
        Some(ProcessedImage::Transition(transition)) => {
            assert_eq!(transition.from, Layer::Transparent);
            assert_eq!(transition.duration, FADE);
        }
        other => panic!("expected a fade-in, got {other:?}"),
    }

    // Memory hit
    load(ImageCreator::CompositeFade).finished().await;
    assert!(matches!(
        deliveries.recv().await.unwrap(),
        Some(ProcessedImage::Drawable(_))
    ));

    // Durable hit after the memory tier is dropped
    fixture.dispatcher.cache().clear_memory();
    load(ImageCreator::CompositeFade).finished().await;
    assert!(deliveries.recv().await.unwrap().unwrap().is_transition());

    load(ImageCreator::Identity).finished().await;
    assert!(matches!(
        deliveries.recv().await.unwrap(),
        Some(ProcessedImage::Plain(_))
    ));
    assert_eq!(fixture.decoder.calls(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn receivers_on_one_task_get_their_own_post_processing() {
    let mut fixture = Fixture::new(2, false).await;
    let (receiver, mut deliveries) = collector();

    let plain = fixture
        .dispatcher
        .load("/a.png", receiver(), ImageCreator::Identity, DispatchMode::Plain)
        .unwrap();
    let fading = fixture
        .dispatcher
        .load("/a.png", receiver(), ImageCreator::CompositeFade, DispatchMode::Plain)
        .unwrap();
    assert!(fading.is_coalesced());
    fixture.wait_for_decodes(1).await;
    fixture.open_gate();
    plain.finished().await;

    let mut kinds = vec![
        deliveries.recv().await.unwrap().unwrap(),
        deliveries.recv().await.unwrap().unwrap(),
    ];
    kinds.sort_by_key(|p| p.is_transition());
    assert!(matches!(kinds[0], ProcessedImage::Plain(_)));
    assert!(kinds[1].is_transition());
}

#[test]
fn dispatcher_requires_a_runtime() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir, 1);
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let cache = Arc::new(runtime.block_on(TieredCache::open(&config)).unwrap());
    let decoder: Arc<dyn Decoder> =
        Arc::new(|_: &Locator| -> Result<DecodedImage> { Ok(solid(1)) });

    let err = Dispatcher::new(cache.clone(), decoder.clone(), &config).unwrap_err();
    assert!(matches!(err, Error::PreconditionViolation { .. }));
    assert!(Dispatcher::with_runtime(cache, decoder, &config, runtime.handle().clone()).is_ok());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn panicking_plain_receiver_does_not_strand_the_others() {
    let mut fixture = Fixture::new(1, false).await;
    let (receiver, mut deliveries) = collector();

    let first = fixture
        .dispatcher
        .load(
            "/srv/img/panic.png",
            |_: Option<ProcessedImage>| panic!("receiver blew up"),
            ImageCreator::Identity,
            DispatchMode::Plain,
        )
        .unwrap();
    let second = fixture
        .dispatcher
        .load("/srv/img/panic.png", receiver(), ImageCreator::Identity, DispatchMode::Plain)
        .unwrap();
    assert!(second.is_coalesced());

    fixture.wait_for_decodes(1).await;
    fixture.open_gate();

    assert!(deliveries.recv().await.unwrap().is_some());
    let state = tokio::time::timeout(Duration::from_secs(5), first.finished())
        .await
        .expect("task never finished");
    assert_eq!(state, TaskState::Completed);
    assert_eq!(fixture.dispatcher.in_flight_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn decoder_defect_still_ends_as_absence() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir, 1);
    let cache = Arc::new(TieredCache::open(&config).await.unwrap());
    let decoder: Arc<dyn Decoder> = Arc::new(|_: &Locator| -> Result<DecodedImage> {
        Err(Error::precondition("decoder used before init"))
    });
    let dispatcher = Dispatcher::new(cache, decoder, &config).unwrap();
    let (receiver, mut deliveries) = collector();

    let handle = dispatcher
        .load("/srv/img/b.png", receiver(), ImageCreator::Identity, DispatchMode::Plain)
        .unwrap();

    assert!(deliveries.recv().await.unwrap().is_none());
    assert_eq!(handle.finished().await, TaskState::Failed);
    assert_eq!(dispatcher.statistics().failed, 1);
}
