/* How a message travels
 * ---------------------
 * Every message is a frame made of a fixed 24 byte header followed by three
 * variable length fields. All integers are big endian, there is no padding.
 *
 * sync:            4 bytes; SYNC_WORD
 * status code:     4 bytes; StatusCode
 * command length:  2 bytes unsigned integer
 * argument length: 2 bytes unsigned integer
 * message length:  8 bytes unsigned integer
 * sequence number: 4 bytes unsigned integer
 *
 * The header, the command, the argument and the payload are each sent as a
 * separate transmission. A transmission is split into segments of at most
 * MTU bytes and the receiver answers every segment with a single ACK byte.
 * The sender does not move on to the next segment before it has the ACK.
 *
 * The client stamps each request with a sequence number. The server keeps
 * the last sequence number it answered together with the response, and a
 * request repeating that number gets the stored response back instead of
 * being executed again.
 */

use std::fmt;
use std::time::Duration;

// Protocol configuration constants
pub const SYNC_WORD: u32 = 0x5555_5555;
pub const HEADER_LEN: usize = 24;
pub const MTU: usize = 65000;
pub const ACK: u8 = b'!';

pub const SEGMENT_ATTEMPTS: u32 = 3;
pub const RECV_TIMEOUT: Duration = Duration::from_secs(2);
pub const SEND_TIMEOUT: Duration = Duration::from_secs(2);

/// Outcome of a request, carried in every response header.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    NoErr = 0,
    FileNotFound,
    BadPermissions,
    BadCommand,
    Unknown,
}

impl StatusCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            StatusCode::NoErr => "No Error",
            StatusCode::FileNotFound => "File Not Found",
            StatusCode::BadPermissions => "Bad Permissions",
            StatusCode::BadCommand => "Bad Command",
            StatusCode::Unknown => "Unknown Error",
        }
    }

    pub const fn is_ok(self) -> bool {
        matches!(self, StatusCode::NoErr)
    }
}

impl From<u32> for StatusCode {
    /// Codes outside the table are reported as [`StatusCode::Unknown`].
    fn from(code: u32) -> Self {
        match code {
            0 => StatusCode::NoErr,
            1 => StatusCode::FileNotFound,
            2 => StatusCode::BadPermissions,
            3 => StatusCode::BadCommand,
            _ => StatusCode::Unknown,
        }
    }
}

impl From<StatusCode> for u32 {
    fn from(code: StatusCode) -> Self {
        code as u32
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operations a client can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Exit,
    Ls,
    Get,
    Put,
    Delete,
    Unknown,
}

impl Command {
    pub fn parse(text: &str) -> Self {
        match text {
            "exit" => Command::Exit,
            "ls" => Command::Ls,
            "get" => Command::Get,
            "put" => Command::Put,
            "delete" => Command::Delete,
            _ => Command::Unknown,
        }
    }

    /// Whether the argument names a file the command operates on.
    pub const fn takes_path(self) -> bool {
        matches!(self, Command::Get | Command::Put | Command::Delete)
    }
}
