use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use mcu_periph::{
    BusFactory, BusOps, DeviceHandle, Error, I2cBus, I2cOps, I2cParams, Registry,
};

// ---------------------------------------------------------------------------
// Mock backend
// ---------------------------------------------------------------------------

/// Operation table handed out by every mock factory.
struct MockI2c {
    released: Arc<AtomicUsize>,
}

impl BusOps for MockI2c {
    fn release(&mut self) -> mcu_periph::Result<()> {
        self.released.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl I2cOps for MockI2c {
    fn open(&mut self, address: u16) -> mcu_periph::Result<DeviceHandle> {
        Ok(DeviceHandle::from_raw(address.into()))
    }

    fn read(&mut self, _dev: DeviceHandle, buf: &mut [u8]) -> mcu_periph::Result<usize> {
        buf.fill(0xaa);
        Ok(buf.len())
    }

    fn write(&mut self, _dev: DeviceHandle, data: &[u8]) -> mcu_periph::Result<usize> {
        Ok(data.len())
    }

    fn close(&mut self, _dev: DeviceHandle) -> mcu_periph::Result<()> {
        Ok(())
    }
}

/// Shared record of factory activity.
#[derive(Clone, Default)]
struct MockCounters {
    /// Names of the factories invoked, in call order.
    calls: Arc<Mutex<Vec<&'static str>>>,
    released: Arc<AtomicUsize>,
}

impl MockCounters {
    fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }
}

struct MockFactory {
    name: &'static str,
    /// Fail every `create` with this error.
    fail_with: Option<Error>,
    counters: MockCounters,
}

impl MockFactory {
    fn ok(name: &'static str, counters: &MockCounters) -> Self {
        Self { name, fail_with: None, counters: counters.clone() }
    }

    fn failing(name: &'static str, err: Error, counters: &MockCounters) -> Self {
        Self { name, fail_with: Some(err), counters: counters.clone() }
    }
}

impl BusFactory<I2cBus> for MockFactory {
    fn name(&self) -> &str {
        self.name
    }

    fn create(&self, _params: &I2cParams) -> mcu_periph::Result<I2cBus> {
        self.counters.calls.lock().unwrap().push(self.name);
        match self.fail_with {
            Some(err) => Err(err),
            None => Ok(I2cBus::new(
                self.name,
                MockI2c { released: self.counters.released.clone() },
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Log capture
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for LogBuffer {
    type Writer = LogBuffer;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Run `f` with a subscriber that records everything at debug and above.
fn capture_logs<T>(f: impl FnOnce() -> T) -> (T, String) {
    let buffer = LogBuffer::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(buffer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .finish();
    let out = tracing::subscriber::with_default(subscriber, f);
    let logs = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
    (out, logs)
}

/// The first captured line containing `message`.
fn line_with<'a>(logs: &'a str, message: &str) -> Option<&'a str> {
    logs.lines().find(|line| line.contains(message))
}

// ---------------------------------------------------------------------------
// Registration
// ---------------------------------------------------------------------------

#[test]
fn register_inserts_at_head() {
    let counters = MockCounters::default();
    let mut registry = Registry::<I2cBus>::new();

    registry.register(MockFactory::ok("a", &counters)).unwrap();
    registry.register(MockFactory::ok("b", &counters)).unwrap();
    registry.register(MockFactory::ok("c", &counters)).unwrap();

    assert_eq!(registry.names().collect::<Vec<_>>(), ["c", "b", "a"]);
    assert_eq!(registry.len(), 3);
    assert!(registry.contains("b"));
    assert!(!registry.contains("d"));
}

#[test]
fn duplicate_name_is_rejected_and_first_entry_kept() {
    let first = MockCounters::default();
    let second = MockCounters::default();
    let mut registry = Registry::<I2cBus>::new();

    registry.register(MockFactory::ok("dup", &first)).unwrap();
    let result = registry.register(MockFactory::failing("dup", Error::Busy, &second));
    assert_eq!(result, Err(Error::InvalidName));
    assert_eq!(registry.len(), 1);

    // The surviving entry is the first one.
    let bus = registry
        .create_bus(&I2cParams::default().with_backend("dup"))
        .unwrap();
    assert_eq!(bus.backend(), "dup");
    assert_eq!(first.calls(), ["dup"]);
    assert!(second.calls().is_empty());
}

#[test]
fn same_instance_is_rejected() {
    let counters = MockCounters::default();
    let mut registry = Registry::<I2cBus>::new();
    let shared: Arc<dyn BusFactory<I2cBus>> =
        Arc::new(MockFactory::ok("shared", &counters));

    registry.register_shared(shared.clone()).unwrap();
    assert_eq!(registry.register_shared(shared), Err(Error::InvalidName));
    assert_eq!(registry.len(), 1);
}

#[test]
fn unnamed_backend_is_rejected() {
    let counters = MockCounters::default();
    let mut registry = Registry::<I2cBus>::new();

    assert_eq!(
        registry.register(MockFactory::ok("", &counters)),
        Err(Error::InvalidName)
    );
    assert!(registry.is_empty());
}

#[test]
fn duplicate_registration_logs_an_error() {
    let counters = MockCounters::default();
    let mut registry = Registry::<I2cBus>::new();

    let (_, logs) = capture_logs(|| {
        registry.register(MockFactory::ok("x", &counters)).unwrap();
        registry.register(MockFactory::ok("x", &counters))
    });

    let registered = line_with(&logs, "backend registered").unwrap();
    assert!(registered.contains("DEBUG"));
    let duplicate = line_with(&logs, "already registered").unwrap();
    assert!(duplicate.contains("ERROR"));
}

// ---------------------------------------------------------------------------
// Explicit selection
// ---------------------------------------------------------------------------

fn three_backends(counters: &MockCounters) -> Registry<I2cBus> {
    let mut registry = Registry::new();
    registry.register(MockFactory::ok("alpha", counters)).unwrap();
    registry.register(MockFactory::ok("beta", counters)).unwrap();
    registry.register(MockFactory::ok("gamma", counters)).unwrap();
    registry
}

#[test]
fn explicit_name_invokes_only_that_factory() {
    let counters = MockCounters::default();
    let registry = three_backends(&counters);

    let bus = registry
        .create_bus(&I2cParams::default().with_backend("beta"))
        .unwrap();
    assert_eq!(bus.backend(), "beta");
    assert_eq!(counters.calls(), ["beta"]);
}

#[test]
fn uri_scheme_selects_backend() {
    let counters = MockCounters::default();
    let registry = three_backends(&counters);

    let bus = registry
        .create_bus(&I2cParams::default().with_uri("alpha://host:1234/5"))
        .unwrap();
    assert_eq!(bus.backend(), "alpha");
    assert_eq!(counters.calls(), ["alpha"]);
}

#[test]
fn backend_name_takes_precedence_over_uri() {
    let counters = MockCounters::default();
    let registry = three_backends(&counters);

    let params = I2cParams::default()
        .with_backend("gamma")
        .with_uri("alpha://");
    let bus = registry.create_bus(&params).unwrap();
    assert_eq!(bus.backend(), "gamma");
    assert_eq!(counters.calls(), ["gamma"]);
}

#[test]
fn unknown_name_fails_without_invoking_anything() {
    let counters = MockCounters::default();
    let registry = three_backends(&counters);

    let (result, logs) = capture_logs(|| {
        registry.create_bus(&I2cParams::default().with_uri("alphabet://"))
    });
    assert_eq!(result.unwrap_err(), Error::InvalidName);
    assert!(counters.calls().is_empty());
    assert!(line_with(&logs, "no backend matches").unwrap().contains("WARN"));
}

#[test]
fn explicit_failure_is_not_retried_elsewhere() {
    let counters = MockCounters::default();
    let mut registry = Registry::<I2cBus>::new();
    registry.register(MockFactory::ok("good", &counters)).unwrap();
    registry
        .register(MockFactory::failing("bad", Error::NoDevice, &counters))
        .unwrap();

    let result = registry.create_bus(&I2cParams::default().with_backend("bad"));
    assert_eq!(result.unwrap_err(), Error::NoDevice);
    assert_eq!(counters.calls(), ["bad"]);
}

#[test]
fn preferred_backend_applies_only_to_unnamed_requests() {
    let counters = MockCounters::default();
    let mut registry = three_backends(&counters);
    registry.set_preferred(Some("alpha".into()));

    let bus = registry.create_bus(&I2cParams::default()).unwrap();
    assert_eq!(bus.backend(), "alpha");

    let bus = registry
        .create_bus(&I2cParams::default().with_backend("beta"))
        .unwrap();
    assert_eq!(bus.backend(), "beta");
    assert_eq!(counters.calls(), ["alpha", "beta"]);
}

// ---------------------------------------------------------------------------
// Probing
// ---------------------------------------------------------------------------

#[test]
fn probing_tries_most_recently_registered_first() {
    let counters = MockCounters::default();
    let mut registry = Registry::<I2cBus>::new();
    registry
        .register(MockFactory::failing("a", Error::NoDevice, &counters))
        .unwrap();
    registry.register(MockFactory::ok("b", &counters)).unwrap();

    let bus = registry.create_bus(&I2cParams::default()).unwrap();
    assert_eq!(bus.backend(), "b");
    assert_eq!(counters.calls(), ["b"]);
}

#[test]
fn probing_falls_through_failures() {
    let counters = MockCounters::default();
    let mut registry = Registry::<I2cBus>::new();
    registry.register(MockFactory::ok("a", &counters)).unwrap();
    registry
        .register(MockFactory::failing("b", Error::NoDevice, &counters))
        .unwrap();

    let bus = registry.create_bus(&I2cParams::default()).unwrap();
    assert_eq!(bus.backend(), "a");
    assert_eq!(counters.calls(), ["b", "a"]);
}

#[test]
fn probing_returns_last_failure() {
    let counters = MockCounters::default();
    let mut registry = Registry::<I2cBus>::new();
    registry
        .register(MockFactory::failing("a", Error::Busy, &counters))
        .unwrap();
    registry
        .register(MockFactory::failing("b", Error::IoError, &counters))
        .unwrap();

    let (result, logs) = capture_logs(|| registry.create_bus(&I2cParams::default()));
    // "a" is probed last.
    assert_eq!(result.unwrap_err(), Error::Busy);
    assert_eq!(counters.calls(), ["b", "a"]);
    assert!(line_with(&logs, "can't create instance").unwrap().contains("WARN"));
}

#[test]
fn probing_empty_registry_is_no_device() {
    let registry = Registry::<I2cBus>::new();
    assert_eq!(
        registry.create_bus(&I2cParams::default()).unwrap_err(),
        Error::NoDevice
    );
}

// ---------------------------------------------------------------------------
// Isolation
// ---------------------------------------------------------------------------

#[test]
fn registries_are_independent() {
    let counters = MockCounters::default();
    let mut one = Registry::<I2cBus>::new();
    let mut two = Registry::<I2cBus>::new();

    one.register(MockFactory::ok("same", &counters)).unwrap();
    two.register(MockFactory::ok("same", &counters)).unwrap();

    assert_eq!(one.len(), 1);
    assert_eq!(two.len(), 1);
}

#[test]
fn created_bus_is_released_on_drop() {
    let counters = MockCounters::default();
    let mut registry = Registry::<I2cBus>::new();
    registry.register(MockFactory::ok("a", &counters)).unwrap();

    let bus = registry.create_bus(&I2cParams::default()).unwrap();
    assert_eq!(counters.released.load(Ordering::SeqCst), 0);
    drop(bus);
    assert_eq!(counters.released.load(Ordering::SeqCst), 1);
}
