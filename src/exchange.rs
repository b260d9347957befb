//! Whole messages over an [`Endpoint`]: header, command, argument and
//! payload each go out as their own chunked transmission, header first.

use thiserror::Error;
use tracing::debug;

use crate::frame::{FrameError, Header, Message};
use crate::protocol::HEADER_LEN;
use crate::transport::{Datagram, Endpoint, TransportError};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExchangeError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("malformed frame: {0}")]
    Frame(#[from] FrameError),
}

impl<D: Datagram> Endpoint<D> {
    pub async fn send_message(&mut self, message: &Message) -> Result<(), ExchangeError> {
        let frame = message.encode()?;
        let (header, body) = frame.split_at(HEADER_LEN);
        let (command, body) = body.split_at(message.command.len());
        let (argument, payload) = body.split_at(message.argument.len());

        self.send(header, "header").await?;
        self.send(command, "command").await?;
        self.send(argument, "argument").await?;
        self.send(payload, "payload").await?;

        debug!(
            seq = message.sequence_num,
            command = %message.command,
            status = %message.status,
            payload_len = payload.len(),
            "sent message"
        );
        Ok(())
    }

    pub async fn receive_message(&mut self) -> Result<Message, ExchangeError> {
        let mut frame = self.receive(HEADER_LEN, "header").await?;
        let header = Header::decode(&frame)?;
        let payload_len = header.payload_len()?;
        frame.reserve(
            (header.command_length as usize + header.argument_length as usize)
                .saturating_add(payload_len.min(self.config().mtu.get())),
        );

        self.receive_into(&mut frame, header.command_length as usize, "command").await?;
        self.receive_into(&mut frame, header.argument_length as usize, "argument").await?;
        self.receive_into(&mut frame, payload_len, "payload").await?;

        // The header is checked again against the bytes that actually arrived.
        let message = Message::decode(&frame)?;
        debug!(
            seq = message.sequence_num,
            command = %message.command,
            status = %message.status,
            payload_len = message.payload.len(),
            "received message"
        );
        Ok(message)
    }
}
