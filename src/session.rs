use crate::frame::Message;

/// Sequence number no client reaches in practice; clients start at 0.
pub const NO_SEQUENCE: u32 = u32::MAX;

/// The last answered request of the current client, kept so that a
/// retransmitted request gets the same answer without running again.
#[derive(Debug)]
pub struct Session {
    last_sequence_num: u32,
    last_response: Option<Message>,
}

impl Session {
    pub fn new() -> Self {
        Session {
            last_sequence_num: NO_SEQUENCE,
            last_response: None,
        }
    }

    pub fn last_sequence_num(&self) -> u32 {
        self.last_sequence_num
    }

    /// The stored response if `sequence_num` was already answered.
    pub fn replay(&self, sequence_num: u32) -> Option<&Message> {
        if sequence_num != self.last_sequence_num {
            return None;
        }
        self.last_response.as_ref()
    }

    pub fn record(&mut self, sequence_num: u32, response: Message) {
        self.last_sequence_num = sequence_num;
        self.last_response = Some(response);
    }

    pub fn reset(&mut self) {
        *self = Session::new();
    }
}

impl Default for Session {
    fn default() -> Self {
        Session::new()
    }
}
