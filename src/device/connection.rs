use std::sync::Arc;
use std::time::Duration;
use log::{debug, error, info, warn};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::device::events::EventSink;
use crate::device::types::{DeviceIdentity, EndpointDescriptor, Status};
use crate::device::usb::{ScaleDevice, UsbBackend};
use crate::error::DeviceError;

/// A configured scale, ready to be read from.
pub struct Connection {
    pub device: Box<dyn ScaleDevice>,
    pub endpoint: EndpointDescriptor,
}

pub enum ConnectOutcome {
    Connected(Connection),
    /// The driver was stopped before a connection could be made.
    Aborted,
}

enum ConnectionState {
    Disconnected {
        retry: bool,
    },
    Connecting {
        device: Box<dyn ScaleDevice>,
    },
    Connected(Connection),
}

/// Sleep for `duration`, or less if `cancel` is cancelled in the meantime.
pub(crate) async fn sleep_unless_cancelled(cancel: &CancellationToken, duration: Duration) {
    tokio::select! {
        _ = cancel.cancelled() => {},
        _ = sleep(duration) => {},
    }
}

/// Switch to the warning status. The message is logged as an error the first time, subsequent
/// failures (while still in warning) are logged as warnings.
pub(crate) async fn report_warning(sink: &mut EventSink, message: &str) {
    if sink.report_status(Status::Warning).await {
        error!("{}", message);
    } else {
        warn!("{}", message);
    }
}

pub struct ConnectionManager {
    backend: Arc<dyn UsbBackend>,
    identity: DeviceIdentity,
    interface: u8,
    reconnect_interval: Duration,
    cancel: CancellationToken,
}

impl ConnectionManager {
    pub fn new(
        backend: Arc<dyn UsbBackend>,
        identity: DeviceIdentity,
        interface: u8,
        reconnect_interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        ConnectionManager { backend, identity, interface, reconnect_interval, cancel }
    }

    /// Keep trying to connect to the scale until it works, or until the driver is stopped.
    /// The first attempt is made immediately; failed attempts are followed by a
    /// `reconnect_interval` delay.
    pub async fn connect(&self, sink: &mut EventSink) -> ConnectOutcome {
        debug!("Connecting to scale device...");
        let mut state = ConnectionState::Disconnected { retry: false };

        loop {
            if self.cancel.is_cancelled() {
                debug!("Connecting aborted");
                return ConnectOutcome::Aborted;
            }

            state = match state {
                ConnectionState::Disconnected { retry: true } => {
                    sleep_unless_cancelled(&self.cancel, self.reconnect_interval).await;
                    ConnectionState::Disconnected { retry: false }
                },
                ConnectionState::Disconnected { retry: false } => self.discover(sink).await,
                ConnectionState::Connecting { device } => self.initialize(device, sink).await,
                ConnectionState::Connected(connection) => {
                    sink.report_status(Status::Ok).await;
                    info!("Scale ready");
                    return ConnectOutcome::Connected(connection);
                },
            };
        }
    }

    async fn discover(&self, sink: &mut EventSink) -> ConnectionState {
        match self.backend.find(self.identity).await {
            Ok(Some(device)) => {
                debug!("Device discovered");
                ConnectionState::Connecting { device }
            },
            Ok(None) => {
                let message = format!(
                    "Scale not found, trying again in {} seconds",
                    self.reconnect_interval.as_secs_f64(),
                );
                report_warning(sink, &message).await;
                ConnectionState::Disconnected { retry: true }
            },
            Err(err) => {
                self.report_connect_failure(sink, &err).await;
                ConnectionState::Disconnected { retry: true }
            },
        }
    }

    async fn initialize(&self, mut device: Box<dyn ScaleDevice>, sink: &mut EventSink) -> ConnectionState {
        match self.setup(device.as_mut()).await {
            Ok(endpoint) => ConnectionState::Connected(Connection { device, endpoint }),
            Err(err) => {
                // dropping `device` releases the partially configured handle
                self.report_connect_failure(sink, &err).await;
                ConnectionState::Disconnected { retry: true }
            },
        }
    }

    async fn setup(&self, device: &mut dyn ScaleDevice) -> Result<EndpointDescriptor, DeviceError> {
        device.reset().await?;
        debug!("Device reset");

        if device.is_kernel_driver_active(self.interface).await? {
            device.detach_kernel_driver(self.interface).await?;
            debug!("Detached kernel driver");
        } else {
            debug!("No active kernel driver found");
        }

        device.set_configuration().await?;
        debug!("Device configured");

        device.claim_interface(self.interface).await?;
        let endpoint = device.in_endpoint(self.interface).await?;
        debug!(
            "Reading from endpoint 0x{:02x}, max packet size {}",
            endpoint.address,
            endpoint.max_packet_size,
        );

        Ok(endpoint)
    }

    async fn report_connect_failure(&self, sink: &mut EventSink, err: &DeviceError) {
        let message = format!(
            "Unable to connect to scale, trying again in {} seconds: {}",
            self.reconnect_interval.as_secs_f64(),
            err,
        );
        report_warning(sink, &message).await;
    }
}
