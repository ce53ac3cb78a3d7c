use std::sync::{Arc, Mutex};
use futures::channel::mpsc::Sender;
use log::{debug, error, warn};
use tokio::spawn;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::types::DriverConfig;
use crate::device::connection::ConnectionManager;
use crate::device::constants::DEVICE_INTERFACE;
use crate::device::events::EventSink;
use crate::device::reader::read_scale;
use crate::device::types::{DeviceIdentity, ScaleEvent, Status};
use crate::device::usb::UsbBackend;
use crate::error::ConfigError;

/// Start/stop handle around the background task that talks to the scale.
///
/// Readings and status changes are sent to every sender passed to [`ScaleDriver::new`].
/// The driver waits for a full subscriber, so every subscriber must keep reading; once
/// [`ScaleDriver::stop`] is called pending sends are abandoned.
pub struct ScaleDriver {
    backend: Arc<dyn UsbBackend>,
    config: DriverConfig,
    senders: Vec<Sender<ScaleEvent>>,
    // last status sent, kept across restarts
    status: Arc<Mutex<Option<Status>>>,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl ScaleDriver {
    pub fn new(
        backend: Arc<dyn UsbBackend>,
        config: DriverConfig,
        senders: Vec<Sender<ScaleEvent>>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        Ok(ScaleDriver {
            backend,
            config,
            senders,
            status: Arc::new(Mutex::new(None)),
            cancel: CancellationToken::new(),
            handle: None,
        })
    }

    pub fn is_running(&self) -> bool {
        match &self.handle {
            Some(handle) => !handle.is_finished() && !self.cancel.is_cancelled(),
            None => false,
        }
    }

    /// Spawn the background task and return immediately. Must be called from within a tokio
    /// runtime.
    pub fn start(&mut self) {
        if let Some(handle) = &self.handle {
            if !handle.is_finished() {
                if self.cancel.is_cancelled() {
                    // the old task may still own the device
                    warn!("Scale driver is still stopping, not starting it again");
                } else {
                    warn!("Scale driver is already running");
                }
                return;
            }
        }

        let cancel = CancellationToken::new();
        let manager = ConnectionManager::new(
            self.backend.clone(),
            DeviceIdentity::dymo_scale(),
            DEVICE_INTERFACE,
            self.config.reconnect_interval(),
            cancel.clone(),
        );
        let sink = EventSink::with_status(self.senders.clone(), self.status.clone(), cancel.clone());

        debug!("Starting scale driver");
        self.handle = Some(spawn(read_scale(manager, sink, self.config.read_interval(), cancel.clone())));
        self.cancel = cancel;
    }

    /// Ask the background task to stop. Does not wait for it; see [`ScaleDriver::join`].
    pub fn stop(&mut self) {
        if !self.cancel.is_cancelled() {
            debug!("Halting read operations");
        }
        self.cancel.cancel();
    }

    /// Wait for the background task to finish. The device is released once this returns.
    pub async fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            debug!("Waiting for the scale driver to stop");
            if let Err(err) = handle.await {
                error!("Scale driver task failed: {}", err);
            }
        }
    }
}

impl Drop for ScaleDriver {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
