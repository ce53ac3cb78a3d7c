use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use async_trait::async_trait;
use log::{debug, info};
use rusb::{Context, Device, DeviceHandle, Direction, TransferType, UsbContext};
use tokio::task::spawn_blocking;

use crate::device::types::{DeviceIdentity, EndpointDescriptor};
use crate::error::DeviceError;

/**
 * Zero means "no timeout" for libusb: a read blocks until the scale sends a report or the
 * transfer fails (for example because the scale was unplugged).
 */
const READ_TIMEOUT: Duration = Duration::ZERO;

/// Finds the scale on the bus.
#[async_trait]
pub trait UsbBackend: Send + Sync {
    /// `Ok(None)` means that no matching device is attached (yet).
    async fn find(&self, identity: DeviceIdentity) -> Result<Option<Box<dyn ScaleDevice>>, DeviceError>;
}

/// An opened scale. Dropping it releases the device.
#[async_trait]
pub trait ScaleDevice: Send + Sync {
    async fn reset(&mut self) -> Result<(), DeviceError>;

    async fn is_kernel_driver_active(&self, interface: u8) -> Result<bool, DeviceError>;

    async fn detach_kernel_driver(&mut self, interface: u8) -> Result<(), DeviceError>;

    /// Activate the first configuration of the device.
    async fn set_configuration(&mut self) -> Result<(), DeviceError>;

    async fn claim_interface(&mut self, interface: u8) -> Result<(), DeviceError>;

    /// The first IN endpoint of the first alternate setting of `interface`.
    async fn in_endpoint(&mut self, interface: u8) -> Result<EndpointDescriptor, DeviceError>;

    /// Blocking read of one packet of at most `endpoint.max_packet_size` bytes.
    async fn read(&self, endpoint: EndpointDescriptor) -> Result<Vec<u8>, DeviceError>;
}

pub struct RusbBackend {
    context: Context,
}

impl RusbBackend {
    pub fn new() -> Result<Self, DeviceError> {
        let context = Context::new()?;
        Ok(RusbBackend { context })
    }
}

fn find_device(context: &Context, identity: DeviceIdentity) -> Result<Option<Device<Context>>, DeviceError> {
    for device in context.devices()?.iter() {
        let descriptor = match device.device_descriptor() {
            Ok(v) => v,
            Err(err) => {
                debug!("Could not query device descriptor (bus {} address {}): {}", device.bus_number(), device.address(), err);
                continue;
            },
        };

        if descriptor.vendor_id() == identity.vendor_id && descriptor.product_id() == identity.product_id {
            info!("Using device {} on bus {} address {}", identity, device.bus_number(), device.address());
            return Ok(Some(device));
        }
    }

    Ok(None)
}

#[async_trait]
impl UsbBackend for RusbBackend {
    async fn find(&self, identity: DeviceIdentity) -> Result<Option<Box<dyn ScaleDevice>>, DeviceError> {
        let context = self.context.clone();

        let handle = spawn_blocking(move || -> Result<Option<DeviceHandle<Context>>, DeviceError> {
            match find_device(&context, identity)? {
                None => Ok(None),
                Some(device) => Ok(Some(device.open()?)),
            }
        }).await??;

        Ok(handle.map(|handle| Box::new(RusbScaleDevice::new(handle)) as Box<dyn ScaleDevice>))
    }
}

struct RusbScaleDevice {
    // libusb handles are thread safe, the mutex only exists because a few calls need `&mut`
    handle: Arc<Mutex<DeviceHandle<Context>>>,
    transfer_type: TransferType,
}

fn lock(handle: &Mutex<DeviceHandle<Context>>) -> MutexGuard<'_, DeviceHandle<Context>> {
    // a poisoned handle is still a valid libusb handle
    handle.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl RusbScaleDevice {
    fn new(handle: DeviceHandle<Context>) -> Self {
        RusbScaleDevice {
            handle: Arc::new(Mutex::new(handle)),
            transfer_type: TransferType::Interrupt,
        }
    }

    async fn with_handle<T, F>(&self, f: F) -> Result<T, DeviceError>
    where
        T: Send + 'static,
        F: FnOnce(&mut DeviceHandle<Context>) -> Result<T, DeviceError> + Send + 'static,
    {
        let handle = self.handle.clone();
        spawn_blocking(move || f(&mut lock(&handle))).await?
    }
}

#[async_trait]
impl ScaleDevice for RusbScaleDevice {
    async fn reset(&mut self) -> Result<(), DeviceError> {
        self.with_handle(|handle| Ok(handle.reset()?)).await
    }

    async fn is_kernel_driver_active(&self, interface: u8) -> Result<bool, DeviceError> {
        self.with_handle(move |handle| Ok(handle.kernel_driver_active(interface)?)).await
    }

    async fn detach_kernel_driver(&mut self, interface: u8) -> Result<(), DeviceError> {
        self.with_handle(move |handle| Ok(handle.detach_kernel_driver(interface)?)).await
    }

    async fn set_configuration(&mut self) -> Result<(), DeviceError> {
        self.with_handle(|handle| {
            let config = handle.device().config_descriptor(0)?;
            handle.set_active_configuration(config.number())?;
            Ok(())
        }).await
    }

    async fn claim_interface(&mut self, interface: u8) -> Result<(), DeviceError> {
        self.with_handle(move |handle| Ok(handle.claim_interface(interface)?)).await
    }

    async fn in_endpoint(&mut self, interface: u8) -> Result<EndpointDescriptor, DeviceError> {
        let (endpoint, transfer_type) = self.with_handle(move |handle| {
            let config = handle.device().active_config_descriptor()?;

            let setting = config.interfaces()
                .filter(|candidate| candidate.number() == interface)
                .flat_map(|candidate| candidate.descriptors())
                .find(|descriptor| descriptor.setting_number() == 0)
                .ok_or(DeviceError::MissingEndpoint { interface })?;

            let endpoint = setting.endpoint_descriptors()
                .find(|endpoint| endpoint.direction() == Direction::In)
                .ok_or(DeviceError::MissingEndpoint { interface })?;

            Ok((
                EndpointDescriptor {
                    address: endpoint.address(),
                    max_packet_size: endpoint.max_packet_size(),
                },
                endpoint.transfer_type(),
            ))
        }).await?;

        self.transfer_type = transfer_type;
        Ok(endpoint)
    }

    async fn read(&self, endpoint: EndpointDescriptor) -> Result<Vec<u8>, DeviceError> {
        let transfer_type = self.transfer_type;

        self.with_handle(move |handle| {
            let mut buf = vec![0u8; usize::from(endpoint.max_packet_size)];
            let size = match transfer_type {
                TransferType::Bulk => handle.read_bulk(endpoint.address, &mut buf, READ_TIMEOUT)?,
                _ => handle.read_interrupt(endpoint.address, &mut buf, READ_TIMEOUT)?,
            };
            buf.truncate(size);
            Ok(buf)
        }).await
    }
}
