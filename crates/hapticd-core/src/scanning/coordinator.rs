use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use hapticd_types::LogLevel;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{BackendEvent, BackendEventReceiver, BackendEventSender, BackendMessage, ScanBackend};
use crate::device::DeviceManager;
use crate::error::ScanError;
use crate::events::{EventBus, ServerEvent};

struct BackendSlot {
    backend: Arc<dyn ScanBackend>,
    active: bool,
}

#[derive(Default)]
struct ScanState {
    slots: Vec<BackendSlot>,
    /// Backends still scanning in the current activation.
    scanning: usize,
}

/// Presents any number of backends as one scanner.
///
/// `ScanningFinished` is raised once per activation, when the last active
/// backend reports that it is done.
pub struct ScanCoordinator {
    state: Mutex<ScanState>,
    tx: mpsc::UnboundedSender<BackendMessage>,
    events: EventBus,
}

impl ScanCoordinator {
    /// Returns the coordinator and the receiving end its pump drains.
    #[must_use]
    pub fn new(events: EventBus) -> (Self, BackendEventReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let coordinator = Self {
            state: Mutex::new(ScanState::default()),
            tx,
            events,
        };
        (coordinator, rx)
    }

    fn state(&self) -> MutexGuard<'_, ScanState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register_backend(&self, backend: Arc<dyn ScanBackend>) -> usize {
        let id = {
            let mut state = self.state();
            state.slots.push(BackendSlot {
                backend: Arc::clone(&backend),
                active: false,
            });
            state.slots.len() - 1
        };
        backend.attach(BackendEventSender::new(id, self.tx.clone()));
        info!("[backend {}] Registered", backend.name());
        id
    }

    #[must_use]
    pub fn backend_count(&self) -> usize {
        self.state().slots.len()
    }

    #[must_use]
    pub fn is_scanning(&self) -> bool {
        self.state().scanning > 0
    }

    /// Start every registered backend.
    ///
    /// A backend that fails to start counts as finished; the first such
    /// error is returned after all backends were tried.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::NoBackends`], [`ScanError::AlreadyScanning`], or
    /// the first backend failure.
    pub fn start_scanning_all(&self) -> Result<(), ScanError> {
        let backends: Vec<_> = {
            let mut state = self.state();
            if state.slots.is_empty() {
                return Err(ScanError::NoBackends);
            }
            let busy = state
                .slots
                .iter()
                .any(|slot| slot.active || slot.backend.is_scanning());
            if state.scanning > 0 || busy {
                return Err(ScanError::AlreadyScanning);
            }

            for slot in &mut state.slots {
                slot.active = true;
            }
            state.scanning = state.slots.len();
            state
                .slots
                .iter()
                .enumerate()
                .map(|(id, slot)| (id, Arc::clone(&slot.backend)))
                .collect()
        };

        info!("Starting scan on {} backends", backends.len());
        let mut first_error = None;
        for (id, backend) in backends {
            if let Err(e) = backend.start_scanning() {
                warn!("[backend {}] Failed to start scanning: {e}", backend.name());
                self.backend_finished(id);
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Ask every active backend to stop. Each reports its own finish.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::NoBackends`] or the first backend failure.
    pub fn stop_scanning_all(&self) -> Result<(), ScanError> {
        let active: Vec<_> = {
            let state = self.state();
            if state.slots.is_empty() {
                return Err(ScanError::NoBackends);
            }
            state
                .slots
                .iter()
                .enumerate()
                .filter(|(_, slot)| slot.active)
                .map(|(id, slot)| (id, Arc::clone(&slot.backend)))
                .collect()
        };

        if active.is_empty() {
            debug!("Stop requested while not scanning");
            return Ok(());
        }

        let mut first_error = None;
        for (id, backend) in active {
            if let Err(e) = backend.stop_scanning() {
                warn!("[backend {}] Failed to stop scanning: {e}", backend.name());
                self.backend_finished(id);
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Record that `backend` stopped. Finishes from idle backends are ignored.
    pub fn backend_finished(&self, backend: usize) {
        let all_done = {
            let mut state = self.state();
            let Some(slot) = state.slots.get_mut(backend) else {
                warn!("[backend #{backend}] Finish from unregistered backend");
                return;
            };
            if !slot.active {
                debug!("[backend {}] Ignoring spurious finish", slot.backend.name());
                return;
            }
            slot.active = false;
            state.scanning = state.scanning.saturating_sub(1);
            state.scanning == 0
        };

        if all_done {
            info!("Scanning finished on all backends");
            self.events.log(LogLevel::Debug, "Scanning finished");
            self.events.emit(ServerEvent::ScanningFinished);
        }
    }

    /// Apply one backend event.
    pub fn apply(&self, message: BackendMessage, devices: &DeviceManager) {
        match message.event {
            BackendEvent::DeviceFound { identity, device } => {
                devices.add_device(identity, device);
            }
            BackendEvent::DeviceRemoved { identity } => {
                devices.remove_device(&identity);
            }
            BackendEvent::ScanningFinished => self.backend_finished(message.backend),
        }
    }

    /// Drain backend events until cancelled or every sender is gone.
    ///
    /// On cancel, finishes already queued are still counted so the scan
    /// state settles. Queued discoveries are dropped.
    pub async fn run_pump(
        self: Arc<Self>,
        mut rx: BackendEventReceiver,
        devices: Arc<DeviceManager>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    self.settle(&mut rx);
                    break;
                }
                message = rx.recv() => match message {
                    Some(message) => self.apply(message, &devices),
                    None => break,
                },
            }
        }
        debug!("Backend event pump stopped");
    }

    fn settle(&self, rx: &mut BackendEventReceiver) {
        while let Ok(message) = rx.try_recv() {
            match message.event {
                BackendEvent::ScanningFinished => self.backend_finished(message.backend),
                BackendEvent::DeviceFound { identity, .. } => {
                    debug!("Dropping late discovery of {identity}");
                }
                BackendEvent::DeviceRemoved { .. } => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventReceiver;
    use crate::simulated::{SimulatedBackend, SimulatedDevice};

    struct Harness {
        coordinator: ScanCoordinator,
        rx: BackendEventReceiver,
        devices: DeviceManager,
        events: EventReceiver,
    }

    impl Harness {
        fn new() -> Self {
            let bus = EventBus::new();
            let events = bus.subscribe();
            let (coordinator, rx) = ScanCoordinator::new(bus.clone());
            let devices = DeviceManager::new(bus, CancellationToken::new());
            Self {
                coordinator,
                rx,
                devices,
                events,
            }
        }

        fn backend(&self, name: &str) -> Arc<SimulatedBackend> {
            let backend = Arc::new(SimulatedBackend::new(name));
            self.coordinator.register_backend(backend.clone());
            backend
        }

        /// Apply queued backend events; returns aggregate finishes seen.
        fn pump(&mut self) -> usize {
            while let Ok(message) = self.rx.try_recv() {
                self.coordinator.apply(message, &self.devices);
            }
            let mut finished = 0;
            while let Ok(event) = self.events.try_recv() {
                if event == ServerEvent::ScanningFinished {
                    finished += 1;
                }
            }
            finished
        }
    }

    #[test]
    fn test_start_without_backends() {
        let harness = Harness::new();
        assert_eq!(
            harness.coordinator.start_scanning_all(),
            Err(ScanError::NoBackends)
        );
        assert_eq!(
            harness.coordinator.stop_scanning_all(),
            Err(ScanError::NoBackends)
        );
    }

    #[test]
    fn test_single_finish_after_all_backends() {
        let mut harness = Harness::new();
        let backends: Vec<_> = ["a", "b", "c"].iter().map(|n| harness.backend(n)).collect();

        harness.coordinator.start_scanning_all().unwrap();
        assert!(harness.coordinator.is_scanning());

        for i in [2, 0] {
            backends[i].finish_scan();
            assert_eq!(harness.pump(), 0);
        }
        backends[1].finish_scan();
        assert_eq!(harness.pump(), 1);
        assert!(!harness.coordinator.is_scanning());
    }

    #[test]
    fn test_start_while_scanning() {
        let mut harness = Harness::new();
        harness.backend("a");
        harness.coordinator.start_scanning_all().unwrap();
        assert_eq!(
            harness.coordinator.start_scanning_all(),
            Err(ScanError::AlreadyScanning)
        );
        assert_eq!(harness.pump(), 0);
    }

    #[test]
    fn test_spurious_finish_ignored() {
        let mut harness = Harness::new();
        let a = harness.backend("a");
        harness.backend("b");

        harness.coordinator.backend_finished(0);
        assert_eq!(harness.pump(), 0);

        harness.coordinator.start_scanning_all().unwrap();
        a.finish_scan();
        assert_eq!(harness.pump(), 0);
        harness.coordinator.backend_finished(0);
        assert_eq!(harness.pump(), 0);
        assert!(harness.coordinator.is_scanning());
    }

    #[test]
    fn test_stop_scanning_finishes_once() {
        let mut harness = Harness::new();
        harness.backend("a");
        harness.backend("b");

        harness.coordinator.start_scanning_all().unwrap();
        harness.coordinator.stop_scanning_all().unwrap();
        assert_eq!(harness.pump(), 1);

        harness.coordinator.stop_scanning_all().unwrap();
        assert_eq!(harness.pump(), 0);
    }

    #[test]
    fn test_failed_backend_counts_as_finished() {
        let mut harness = Harness::new();
        let broken = harness.backend("broken");
        let good = harness.backend("good");
        broken.set_fail_start(true);

        let result = harness.coordinator.start_scanning_all();
        assert!(matches!(result, Err(ScanError::Backend { .. })));
        assert!(harness.coordinator.is_scanning());
        assert_eq!(harness.pump(), 0);

        good.finish_scan();
        assert_eq!(harness.pump(), 1);
    }

    #[test]
    fn test_all_backends_fail() {
        let mut harness = Harness::new();
        harness.backend("a").set_fail_start(true);

        assert!(harness.coordinator.start_scanning_all().is_err());
        assert!(!harness.coordinator.is_scanning());
        assert_eq!(harness.pump(), 1);
    }

    #[test]
    fn test_rescan_after_finish() {
        let mut harness = Harness::new();
        let a = harness.backend("a");

        for _ in 0..2 {
            harness.coordinator.start_scanning_all().unwrap();
            a.finish_scan();
            assert_eq!(harness.pump(), 1);
        }
    }

    #[test]
    fn test_discovered_devices_registered() {
        let mut harness = Harness::new();
        let backend = Arc::new(
            SimulatedBackend::new("sim")
                .with_device("one", Arc::new(SimulatedDevice::new("One")))
                .with_device("two", Arc::new(SimulatedDevice::new("Two")))
                .finishing_after_discovery(),
        );
        harness.coordinator.register_backend(backend.clone());

        harness.coordinator.start_scanning_all().unwrap();
        assert_eq!(harness.pump(), 1);
        assert_eq!(harness.devices.list_devices().len(), 2);

        assert!(backend.disconnect_device("one"));
        harness.pump();
        let names: Vec<_> = harness
            .devices
            .list_devices()
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, vec!["Two"]);
    }

    #[tokio::test]
    async fn test_pump_stops_on_cancel() {
        let bus = EventBus::new();
        let cancel = CancellationToken::new();
        let (coordinator, rx) = ScanCoordinator::new(bus.clone());
        let devices = Arc::new(DeviceManager::new(bus, cancel.clone()));
        let pump = tokio::spawn(Arc::new(coordinator).run_pump(rx, devices, cancel.clone()));

        cancel.cancel();
        pump.await.unwrap();
    }

    #[tokio::test]
    async fn test_pump_counts_queued_finish_on_cancel() {
        let bus = EventBus::new();
        let mut events = bus.subscribe();
        let cancel = CancellationToken::new();
        let (coordinator, rx) = ScanCoordinator::new(bus.clone());
        let coordinator = Arc::new(coordinator);
        let devices = Arc::new(DeviceManager::new(bus, cancel.clone()));
        coordinator.register_backend(Arc::new(SimulatedBackend::new("sim")));

        coordinator.start_scanning_all().unwrap();
        coordinator.stop_scanning_all().unwrap();
        cancel.cancel();
        let pump = tokio::spawn(Arc::clone(&coordinator).run_pump(rx, devices, cancel.clone()));
        pump.await.unwrap();

        assert!(!coordinator.is_scanning());
        let finished = std::iter::from_fn(|| events.try_recv().ok())
            .filter(|event| *event == ServerEvent::ScanningFinished)
            .count();
        assert_eq!(finished, 1);
    }
}
