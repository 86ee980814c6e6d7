use chrono::{DateTime, Utc};

/// One of a worker socket's capacity units.
///
/// Raw-integer sentinels (`fd = -1`, `key = 0` meaning "free") are
/// replaced with an explicit sum type: zero is a valid element of the
/// session-key space, so a zero key can never be mistaken for
/// "unreserved" here the way it could with a bare `u32` field.
#[derive(Debug, Clone, PartialEq)]
pub enum SlotState {
    Free,
    /// Router has reserved this slot for `key`; the client has not yet
    /// dialed in.
    Reserved { key: u32, username: String },
    /// The client presented `key` and was admitted.
    Admitted {
        key: u32,
        username: String,
        last_active: DateTime<Utc>,
    },
}

impl SlotState {
    pub fn is_free(&self) -> bool {
        matches!(self, SlotState::Free)
    }

    pub fn is_admitted(&self) -> bool {
        matches!(self, SlotState::Admitted { .. })
    }

    pub fn reserved_key(&self) -> Option<u32> {
        match self {
            SlotState::Reserved { key, .. } => Some(*key),
            _ => None,
        }
    }

    pub fn admitted_key(&self) -> Option<u32> {
        match self {
            SlotState::Admitted { key, .. } => Some(*key),
            _ => None,
        }
    }

    pub fn username(&self) -> Option<&str> {
        match self {
            SlotState::Free => None,
            SlotState::Reserved { username, .. } => Some(username),
            SlotState::Admitted { username, .. } => Some(username),
        }
    }
}
