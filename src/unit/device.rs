//! Keyed cache of emitter and receiver devices
//!
//! Radio devices are expensive to open and are shared by every unit that
//! targets the same interface. The cache is owned by the framework and handed
//! to units through their [`RunContext`](super::RunContext); a device is created
//! on the first miss for its `(role, technology, interface)` key and lives until
//! it is invalidated or the framework exits.

use super::ArgTable;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::{debug, info};

/// Reserved argument names routed to a wireless unit's device configuration.
pub const DEVICE_PARAMETERS: &[&str] = &[
    "GAIN",
    "FREQUENCY",
    "SAMPLE_RATE",
    "BANDWIDTH",
    "TX_GAIN",
    "RX_GAIN",
    "LNA_GAIN",
    "VGA_GAIN",
];

pub fn is_device_parameter(name: &str) -> bool {
    DEVICE_PARAMETERS.contains(&name)
}

/// A hardware-facing emitter or receiver.
pub trait Device: Send {
    fn interface(&self) -> &str;

    /// Push the latest device configuration (gain, frequency, ...).
    fn apply_config(&mut self, config: &ArgTable) {
        let _ = config;
    }

    fn stop(&mut self) {}
}

pub type DeviceHandle = Arc<Mutex<dyn Device>>;

/// Opens a device for an interface name.
pub type DeviceFactory = Box<dyn Fn(&str) -> Result<Box<dyn Device>, DeviceError> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceRole {
    Emitter,
    Receiver,
}

impl fmt::Display for DeviceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceRole::Emitter => write!(f, "emitter"),
            DeviceRole::Receiver => write!(f, "receiver"),
        }
    }
}

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("No {role} registered for technology: {technology}")]
    NoFactory {
        role: DeviceRole,
        technology: String,
    },
    #[error("Device not found: {0}")]
    NotFound(String),
    #[error("Device failure: {0}")]
    Failure(String),
}

/// Lock a device, recovering the guard if a previous holder panicked
pub fn lock_device(handle: &DeviceHandle) -> MutexGuard<'_, dyn Device + 'static> {
    handle.lock().unwrap_or_else(PoisonError::into_inner)
}

type DeviceKey = (DeviceRole, String, String);

#[derive(Default)]
pub struct DeviceCache {
    emitter_factories: HashMap<String, DeviceFactory>,
    receiver_factories: HashMap<String, DeviceFactory>,
    devices: HashMap<DeviceKey, DeviceHandle>,
}

impl DeviceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_emitter<S: Into<String>>(&mut self, technology: S, factory: DeviceFactory) {
        self.emitter_factories.insert(technology.into(), factory);
    }

    pub fn register_receiver<S: Into<String>>(&mut self, technology: S, factory: DeviceFactory) {
        self.receiver_factories.insert(technology.into(), factory);
    }

    pub fn emitter(
        &mut self,
        technology: &str,
        interface: &str,
        config: &ArgTable,
    ) -> Result<DeviceHandle, DeviceError> {
        self.fetch(DeviceRole::Emitter, technology, interface, config)
    }

    pub fn receiver(
        &mut self,
        technology: &str,
        interface: &str,
        config: &ArgTable,
    ) -> Result<DeviceHandle, DeviceError> {
        self.fetch(DeviceRole::Receiver, technology, interface, config)
    }

    fn fetch(
        &mut self,
        role: DeviceRole,
        technology: &str,
        interface: &str,
        config: &ArgTable,
    ) -> Result<DeviceHandle, DeviceError> {
        let key = (role, technology.to_string(), interface.to_string());
        let handle = match self.devices.get(&key) {
            Some(handle) => handle.clone(),
            None => {
                let factories = match role {
                    DeviceRole::Emitter => &self.emitter_factories,
                    DeviceRole::Receiver => &self.receiver_factories,
                };
                let factory = factories
                    .get(technology)
                    .ok_or_else(|| DeviceError::NoFactory {
                        role,
                        technology: technology.to_string(),
                    })?;
                let device: DeviceHandle = Arc::new(Mutex::new(BoxedDevice(factory(interface)?)));
                info!(%role, technology, interface, "Opened device");
                self.devices.insert(key, device.clone());
                device
            }
        };

        lock_device(&handle).apply_config(config);
        Ok(handle)
    }

    /// Stop and forget every device bound to `interface`; returns how many were dropped.
    pub fn invalidate(&mut self, interface: &str) -> usize {
        let keys: Vec<_> = self
            .devices
            .keys()
            .filter(|(_, _, bound)| bound == interface)
            .cloned()
            .collect();

        for key in &keys {
            if let Some(handle) = self.devices.remove(key) {
                lock_device(&handle).stop();
                debug!(role = %key.0, technology = %key.1, interface, "Invalidated device");
            }
        }
        keys.len()
    }

    pub fn stop_all(&mut self) {
        for ((role, technology, interface), handle) in self.devices.drain() {
            lock_device(&handle).stop();
            debug!(%role, technology, interface, "Stopped device");
        }
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

/// Adapter so factory output can sit behind `Mutex<dyn Device>`.
struct BoxedDevice(Box<dyn Device>);

impl Device for BoxedDevice {
    fn interface(&self) -> &str {
        self.0.interface()
    }

    fn apply_config(&mut self, config: &ArgTable) {
        self.0.apply_config(config)
    }

    fn stop(&mut self) {
        self.0.stop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeRadio {
        interface: String,
        configs: Arc<Mutex<Vec<ArgTable>>>,
        stops: Arc<AtomicUsize>,
    }

    impl Device for FakeRadio {
        fn interface(&self) -> &str {
            &self.interface
        }

        fn apply_config(&mut self, config: &ArgTable) {
            self.configs.lock().unwrap().push(config.clone());
        }

        fn stop(&mut self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn cache_with_radio(
        opened: Arc<AtomicUsize>,
        configs: Arc<Mutex<Vec<ArgTable>>>,
        stops: Arc<AtomicUsize>,
    ) -> DeviceCache {
        let mut cache = DeviceCache::new();
        cache.register_emitter(
            "ble",
            Box::new(move |interface: &str| {
                opened.fetch_add(1, Ordering::SeqCst);
                Ok(Box::new(FakeRadio {
                    interface: interface.to_string(),
                    configs: configs.clone(),
                    stops: stops.clone(),
                }) as Box<dyn Device>)
            }),
        );
        cache
    }

    #[test]
    fn test_device_created_once_per_interface() {
        let opened = Arc::new(AtomicUsize::new(0));
        let configs = Arc::new(Mutex::new(Vec::new()));
        let stops = Arc::new(AtomicUsize::new(0));
        let mut cache = cache_with_radio(opened.clone(), configs.clone(), stops);

        let mut config = ArgTable::new();
        config.insert("GAIN".to_string(), json!(20));

        let first = cache.emitter("ble", "hci0", &config).unwrap();
        let second = cache.emitter("ble", "hci0", &ArgTable::new()).unwrap();
        cache.emitter("ble", "hci1", &ArgTable::new()).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(opened.load(Ordering::SeqCst), 2);
        assert_eq!(configs.lock().unwrap().len(), 3);
        assert_eq!(lock_device(&first).interface(), "hci0");
    }

    #[test]
    fn test_technologies_do_not_share_an_interface_device() {
        let opened = Arc::new(Mutex::new(Vec::new()));
        let mut cache = DeviceCache::new();
        for technology in ["ble", "bt"] {
            let opened = opened.clone();
            cache.register_emitter(
                technology,
                Box::new(move |interface: &str| {
                    opened.lock().unwrap().push(technology);
                    Ok(Box::new(FakeRadio {
                        interface: interface.to_string(),
                        configs: Arc::default(),
                        stops: Arc::default(),
                    }) as Box<dyn Device>)
                }),
            );
        }

        let ble = cache.emitter("ble", "ubertooth0", &ArgTable::new()).unwrap();
        let bt = cache.emitter("bt", "ubertooth0", &ArgTable::new()).unwrap();

        assert!(!Arc::ptr_eq(&ble, &bt));
        assert_eq!(*opened.lock().unwrap(), vec!["ble", "bt"]);
        assert_eq!(cache.len(), 2);

        // invalidation is per interface, across technologies
        assert_eq!(cache.invalidate("ubertooth0"), 2);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_missing_factory() {
        let mut cache = DeviceCache::new();
        let result = cache.receiver("zigbee", "rfstorm0", &ArgTable::new());
        assert!(matches!(result, Err(DeviceError::NoFactory { .. })));
    }

    #[test]
    fn test_invalidate_and_stop_all() {
        let opened = Arc::new(AtomicUsize::new(0));
        let stops = Arc::new(AtomicUsize::new(0));
        let mut cache = cache_with_radio(opened.clone(), Arc::default(), stops.clone());

        cache.emitter("ble", "hci0", &ArgTable::new()).unwrap();
        cache.emitter("ble", "hci1", &ArgTable::new()).unwrap();

        assert_eq!(cache.invalidate("hci0"), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(stops.load(Ordering::SeqCst), 1);

        cache.emitter("ble", "hci0", &ArgTable::new()).unwrap();
        assert_eq!(opened.load(Ordering::SeqCst), 3);

        cache.stop_all();
        assert!(cache.is_empty());
        assert_eq!(stops.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_device_parameter_names() {
        assert!(is_device_parameter("FREQUENCY"));
        assert!(!is_device_parameter("frequency"));
        assert!(!is_device_parameter("INTERFACE"));
    }
}
