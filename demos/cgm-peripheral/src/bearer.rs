//! A GATT bearer over a tokio channel
//!
//! There is no radio in this demo, the notifications and indications of the service are sent
//! through a channel to the [`Collector`](crate::collector::Collector) instead.

use cgms::server::GattBearer;
use tokio::sync::mpsc::error::SendError;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

#[derive(Debug)]
pub enum Outgoing {
    Notification { handle: u16, value: Vec<u8> },
    Indication { handle: u16, value: Vec<u8> },
}

pub struct ChannelBearer(UnboundedSender<Outgoing>);

impl ChannelBearer {
    pub fn new() -> (Self, UnboundedReceiver<Outgoing>) {
        let (sender, receiver) = unbounded_channel();

        (ChannelBearer(sender), receiver)
    }
}

impl GattBearer for ChannelBearer {
    type Error = SendError<Outgoing>;

    fn send_notification(&mut self, handle: u16, value: &[u8]) -> Result<(), Self::Error> {
        self.0.send(Outgoing::Notification {
            handle,
            value: value.to_vec(),
        })
    }

    fn send_indication(&mut self, handle: u16, value: &[u8]) -> Result<(), Self::Error> {
        self.0.send(Outgoing::Indication {
            handle,
            value: value.to_vec(),
        })
    }
}
