//! The boundary between the service and the GATT server
//!
//! The service does not know of any Bluetooth stack. Whatever hosts the GATT server passes the
//! events the service reacts to as a [`GattEvent`] and gets back an [`EventResponse`] to answer
//! the client with. Notifications and indications are sent by the service through a
//! [`GattBearer`].

use crate::AttError;

/// An event of the GATT server
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GattEvent<'a> {
    Connected,
    Disconnected,
    CharacteristicWritten { handle: u16, value: &'a [u8] },
    CharacteristicRead { handle: u16 },
    /// The client confirmed an indication sent on `handle`
    IndicationConfirmed { handle: u16 },
}

/// The response to a [`GattEvent`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventResponse {
    WriteAccepted,
    ReadValue(Vec<u8>),
    /// The read or write is to be answered with an error response
    Rejected(AttError),
    /// There is nothing to respond with
    Ignored,
}

/// The sending half of the GATT server
pub trait GattBearer {
    type Error;

    fn send_notification(&mut self, handle: u16, value: &[u8]) -> Result<(), Self::Error>;

    fn send_indication(&mut self, handle: u16, value: &[u8]) -> Result<(), Self::Error>;
}

impl<T> GattBearer for &mut T
where
    T: GattBearer + ?Sized,
{
    type Error = T::Error;

    fn send_notification(&mut self, handle: u16, value: &[u8]) -> Result<(), Self::Error> {
        (**self).send_notification(handle, value)
    }

    fn send_indication(&mut self, handle: u16, value: &[u8]) -> Result<(), Self::Error> {
        (**self).send_indication(handle, value)
    }
}
