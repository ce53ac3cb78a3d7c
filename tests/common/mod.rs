#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use async_trait::async_trait;
use futures::StreamExt;
use futures::channel::mpsc::Receiver;
use tokio::sync::oneshot;
use tokio::time::Instant;

use dymo_scale::device::types::{DeviceIdentity, EndpointDescriptor, ScaleEvent};
use dymo_scale::device::usb::{ScaleDevice, UsbBackend};
use dymo_scale::error::DeviceError;

/// 35.6 oz
pub const OUNCES_35_6: [u8; 8] = [3, 4, 11, 255, 100, 1, 0, 0];

pub const ENDPOINT: EndpointDescriptor = EndpointDescriptor { address: 0x82, max_packet_size: 8 };

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Call {
    Find(DeviceIdentity),
    Reset,
    IsKernelDriverActive(u8),
    DetachKernelDriver(u8),
    SetConfiguration,
    ClaimInterface(u8),
    InEndpoint(u8),
    Read(EndpointDescriptor),
    /// The device handle was released
    Dropped,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FindStep {
    Absent,
    Error,
    Found,
    /// Found, but configuring the device fails
    FoundBroken,
    /// Found, but resetting the device fails
    FoundResetFails,
    /// Found with a kernel driver bound, and detaching it fails
    FoundDetachFails,
    /// Found, but the interface has no IN endpoint
    FoundNoEndpoint,
    /// Found, with a kernel driver bound to the interface
    FoundClaimed,
}

pub enum ReadStep {
    Packet(Vec<u8>),
    Fail,
    /// Blocks until the test sends the packet
    Gate(oneshot::Receiver<Vec<u8>>),
}

type CallLog = Arc<Mutex<Vec<(Call, Instant)>>>;

fn usb_error() -> DeviceError {
    DeviceError::Usb { source: rusb::Error::NoDevice }
}

fn record(calls: &CallLog, call: Call) {
    calls.lock().unwrap().push((call, Instant::now()));
}

/// Plays back scripted discovery and read results. Once `finds` runs out every discovery returns
/// `fallback`; once `reads` runs out every read blocks forever.
pub struct MockBackend {
    finds: Mutex<VecDeque<FindStep>>,
    fallback: FindStep,
    reads: Arc<Mutex<VecDeque<ReadStep>>>,
    calls: CallLog,
}

impl MockBackend {
    pub fn new(finds: Vec<FindStep>, reads: Vec<ReadStep>) -> Arc<Self> {
        Self::with_fallback(finds, FindStep::Found, reads)
    }

    pub fn with_fallback(finds: Vec<FindStep>, fallback: FindStep, reads: Vec<ReadStep>) -> Arc<Self> {
        Arc::new(MockBackend {
            finds: Mutex::new(finds.into()),
            fallback,
            reads: Arc::new(Mutex::new(reads.into())),
            calls: Arc::new(Mutex::new(Vec::new())),
        })
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().iter().map(|(call, _)| *call).collect()
    }

    pub fn times_of(&self, matcher: fn(&Call) -> bool) -> Vec<Instant> {
        self.calls.lock().unwrap().iter()
            .filter(|(call, _)| matcher(call))
            .map(|(_, at)| *at)
            .collect()
    }

    pub fn count(&self, matcher: fn(&Call) -> bool) -> usize {
        self.times_of(matcher).len()
    }
}

pub fn is_find(call: &Call) -> bool {
    matches!(call, Call::Find(_))
}

pub fn is_read(call: &Call) -> bool {
    matches!(call, Call::Read(_))
}

#[async_trait]
impl UsbBackend for MockBackend {
    async fn find(&self, identity: DeviceIdentity) -> Result<Option<Box<dyn ScaleDevice>>, DeviceError> {
        record(&self.calls, Call::Find(identity));
        let step = self.finds.lock().unwrap().pop_front().unwrap_or(self.fallback);

        let device = |kernel_driver_active, fails: Option<Call>| -> Box<dyn ScaleDevice> {
            Box::new(MockDevice {
                kernel_driver_active,
                fails,
                reads: self.reads.clone(),
                calls: self.calls.clone(),
            })
        };

        match step {
            FindStep::Absent => Ok(None),
            FindStep::Error => Err(usb_error()),
            FindStep::Found => Ok(Some(device(false, None))),
            FindStep::FoundBroken => Ok(Some(device(false, Some(Call::SetConfiguration)))),
            FindStep::FoundResetFails => Ok(Some(device(false, Some(Call::Reset)))),
            FindStep::FoundDetachFails => Ok(Some(device(true, Some(Call::DetachKernelDriver(0))))),
            FindStep::FoundNoEndpoint => Ok(Some(device(false, Some(Call::InEndpoint(0))))),
            FindStep::FoundClaimed => Ok(Some(device(true, None))),
        }
    }
}

pub struct MockDevice {
    kernel_driver_active: bool,
    /// The setup call that returns an error
    fails: Option<Call>,
    reads: Arc<Mutex<VecDeque<ReadStep>>>,
    calls: CallLog,
}

impl MockDevice {
    fn call(&self, call: Call) -> Result<(), DeviceError> {
        record(&self.calls, call);
        if self.fails == Some(call) {
            return Err(DeviceError::Usb { source: rusb::Error::Busy });
        }
        Ok(())
    }
}

impl Drop for MockDevice {
    fn drop(&mut self) {
        record(&self.calls, Call::Dropped);
    }
}

#[async_trait]
impl ScaleDevice for MockDevice {
    async fn reset(&mut self) -> Result<(), DeviceError> {
        self.call(Call::Reset)
    }

    async fn is_kernel_driver_active(&self, interface: u8) -> Result<bool, DeviceError> {
        record(&self.calls, Call::IsKernelDriverActive(interface));
        Ok(self.kernel_driver_active)
    }

    async fn detach_kernel_driver(&mut self, interface: u8) -> Result<(), DeviceError> {
        self.call(Call::DetachKernelDriver(interface))?;
        self.kernel_driver_active = false;
        Ok(())
    }

    async fn set_configuration(&mut self) -> Result<(), DeviceError> {
        self.call(Call::SetConfiguration)
    }

    async fn claim_interface(&mut self, interface: u8) -> Result<(), DeviceError> {
        record(&self.calls, Call::ClaimInterface(interface));
        Ok(())
    }

    async fn in_endpoint(&mut self, interface: u8) -> Result<EndpointDescriptor, DeviceError> {
        match self.call(Call::InEndpoint(interface)) {
            Ok(()) => Ok(ENDPOINT),
            Err(_) => Err(DeviceError::MissingEndpoint { interface }),
        }
    }

    async fn read(&self, endpoint: EndpointDescriptor) -> Result<Vec<u8>, DeviceError> {
        record(&self.calls, Call::Read(endpoint));
        let step = self.reads.lock().unwrap().pop_front();

        match step {
            Some(ReadStep::Packet(packet)) => Ok(packet),
            Some(ReadStep::Fail) => Err(usb_error()),
            Some(ReadStep::Gate(gate)) => gate.await.map_err(|_| usb_error()),
            None => std::future::pending().await,
        }
    }
}

/// Receive exactly `count` events.
pub async fn next_events(receiver: &mut Receiver<ScaleEvent>, count: usize) -> Vec<ScaleEvent> {
    let mut events = Vec::with_capacity(count);
    while events.len() < count {
        match receiver.next().await {
            Some(event) => events.push(event),
            None => panic!("event channel closed after {:?}", events),
        }
    }
    events
}
