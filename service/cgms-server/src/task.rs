//! Running the service within its own task
//!
//! The GATT server and the sensor are usually driven from different places. [`spawn`] moves a
//! [`CgmsService`] into a tokio task and returns a [`ServiceHandle`] for sending it events and
//! measurements from anywhere else.

use crate::{CgmsService, EventResponse, GattBearer, GattEvent, ServiceError};
use cgms_racp::record::GlucoseRecord;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// The owned form of a [`GattEvent`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ServiceEvent {
    Connected,
    Disconnected,
    CharacteristicWritten { handle: u16, value: Vec<u8> },
    CharacteristicRead { handle: u16 },
    IndicationConfirmed { handle: u16 },
}

impl ServiceEvent {
    pub fn as_gatt_event(&self) -> GattEvent<'_> {
        match self {
            ServiceEvent::Connected => GattEvent::Connected,
            ServiceEvent::Disconnected => GattEvent::Disconnected,
            ServiceEvent::CharacteristicWritten { handle, value } => GattEvent::CharacteristicWritten {
                handle: *handle,
                value,
            },
            ServiceEvent::CharacteristicRead { handle } => GattEvent::CharacteristicRead { handle: *handle },
            ServiceEvent::IndicationConfirmed { handle } => GattEvent::IndicationConfirmed { handle: *handle },
        }
    }
}

impl From<GattEvent<'_>> for ServiceEvent {
    fn from(event: GattEvent<'_>) -> Self {
        match event {
            GattEvent::Connected => ServiceEvent::Connected,
            GattEvent::Disconnected => ServiceEvent::Disconnected,
            GattEvent::CharacteristicWritten { handle, value } => ServiceEvent::CharacteristicWritten {
                handle,
                value: value.to_vec(),
            },
            GattEvent::CharacteristicRead { handle } => ServiceEvent::CharacteristicRead { handle },
            GattEvent::IndicationConfirmed { handle } => ServiceEvent::IndicationConfirmed { handle },
        }
    }
}

enum Command<E> {
    Event(ServiceEvent, oneshot::Sender<Result<EventResponse, ServiceError<E>>>),
    PushMeasurement(GlucoseRecord, oneshot::Sender<Result<usize, ServiceError<E>>>),
    Shutdown,
}

/// Error returned by a [`ServiceHandle`]
#[derive(Debug, thiserror::Error)]
pub enum TaskError<E> {
    /// The service task is no longer running
    #[error("the service task has stopped")]
    Stopped,
    #[error(transparent)]
    Service(ServiceError<E>),
}

/// A handle to a service running in a task
pub struct ServiceHandle<E> {
    sender: UnboundedSender<Command<E>>,
}

impl<E> Clone for ServiceHandle<E> {
    fn clone(&self) -> Self {
        ServiceHandle {
            sender: self.sender.clone(),
        }
    }
}

impl<E> ServiceHandle<E> {
    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<Result<T, ServiceError<E>>>) -> Command<E>,
    ) -> Result<T, TaskError<E>> {
        let (sender, receiver) = oneshot::channel();

        self.sender.send(command(sender)).map_err(|_| TaskError::Stopped)?;

        receiver
            .await
            .map_err(|_| TaskError::Stopped)?
            .map_err(TaskError::Service)
    }

    /// Process a GATT event
    pub async fn event<V>(&self, event: V) -> Result<EventResponse, TaskError<E>>
    where
        V: Into<ServiceEvent>,
    {
        let event = event.into();

        self.request(|sender| Command::Event(event, sender)).await
    }

    /// Add a new measurement
    pub async fn push_measurement(&self, record: GlucoseRecord) -> Result<usize, TaskError<E>> {
        self.request(|sender| Command::PushMeasurement(record, sender)).await
    }

    /// Stop the service task
    ///
    /// The task ends after the commands sent before this one are processed.
    pub fn shutdown(&self) -> Result<(), TaskError<E>> {
        self.sender.send(Command::Shutdown).map_err(|_| TaskError::Stopped)
    }

    /// Check if the service task is still running
    pub fn is_running(&self) -> bool {
        !self.sender.is_closed()
    }
}

/// Spawn a task to run the service
///
/// The task ends when [`shutdown`](ServiceHandle::shutdown) is called or every handle is dropped.
/// The service and bearer are returned by the join handle so that they can be inspected or
/// reused afterwards.
pub fn spawn<B>(service: CgmsService, bearer: B) -> (ServiceHandle<B::Error>, JoinHandle<(CgmsService, B)>)
where
    B: GattBearer + Send + 'static,
    B::Error: core::fmt::Debug + Send + 'static,
{
    let (sender, receiver) = unbounded_channel();

    let join_handle = tokio::spawn(run(service, bearer, receiver));

    (ServiceHandle { sender }, join_handle)
}

async fn run<B>(
    mut service: CgmsService,
    mut bearer: B,
    mut receiver: UnboundedReceiver<Command<B::Error>>,
) -> (CgmsService, B)
where
    B: GattBearer,
    B::Error: core::fmt::Debug,
{
    log::info!("(CGMS) service task started");

    while let Some(command) = receiver.recv().await {
        match command {
            Command::Event(event, sender) => {
                let result = service.process_event(event.as_gatt_event(), &mut bearer);

                if let Err(ServiceError::Bearer(e)) = &result {
                    log::error!("(CGMS) bearer failed while processing {:?}: {:?}", event, e);
                }

                sender.send(result).ok();
            }
            Command::PushMeasurement(record, sender) => {
                let result = service.push_measurement(record, &mut bearer);

                if let Err(ServiceError::Bearer(e)) = &result {
                    log::error!("(CGMS) bearer failed to send a measurement: {:?}", e);
                }

                sender.send(result).ok();
            }
            Command::Shutdown => break,
        }
    }

    log::info!("(CGMS) service task stopped");

    (service, bearer)
}
