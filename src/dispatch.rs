//! Executes one decoded request against a [`FileStore`].

use tracing::{debug, info};

use crate::frame::Message;
use crate::fs::{FileStore, FsError};
use crate::protocol::{Command, StatusCode};

#[derive(Debug)]
pub struct Dispatched {
    pub response: Message,
    /// The client said `exit`.
    pub end_session: bool,
}

pub struct Dispatcher<F> {
    store: F,
}

impl<F: FileStore> Dispatcher<F> {
    pub fn new(store: F) -> Self {
        Dispatcher { store }
    }

    pub async fn dispatch(&self, request: &Message) -> Dispatched {
        let command = Command::parse(&request.command);
        let path = request.argument.as_str();

        let (status, payload) = if command.takes_path() && path.is_empty() {
            debug!(command = %request.command, "missing file argument");
            (StatusCode::BadCommand, Vec::new())
        } else {
            match command {
                Command::Exit => (StatusCode::NoErr, Vec::new()),
                Command::Ls => match self.store.list_directory(".").await {
                    Ok(listing) => (StatusCode::NoErr, listing.into_bytes()),
                    Err(err) => {
                        debug!(error = %err, "could not list directory");
                        (StatusCode::BadPermissions, Vec::new())
                    }
                },
                Command::Get => match self.store.read_file(path).await {
                    Ok(bytes) => (StatusCode::NoErr, bytes),
                    Err(err) => (failure(&err, path), Vec::new()),
                },
                Command::Put => match self.store.write_file(path, &request.payload).await {
                    Ok(()) => (StatusCode::NoErr, Vec::new()),
                    // A missing parent directory is not a missing file.
                    Err(FsError::NotFound) => (StatusCode::Unknown, Vec::new()),
                    Err(err) => (failure(&err, path), Vec::new()),
                },
                Command::Delete => match self.store.delete_file(path).await {
                    Ok(()) => (StatusCode::NoErr, Vec::new()),
                    Err(err) => (failure(&err, path), Vec::new()),
                },
                Command::Unknown => (StatusCode::BadCommand, Vec::new()),
            }
        };

        info!(
            seq = request.sequence_num,
            command = %request.command,
            argument = %request.argument,
            %status,
            payload_len = payload.len(),
            "request handled"
        );
        Dispatched {
            response: Message::reply_to(request, status, payload),
            end_session: command == Command::Exit,
        }
    }
}

fn failure(err: &FsError, path: &str) -> StatusCode {
    debug!(path, error = %err, "filesystem operation failed");
    StatusCode::from(err)
}
