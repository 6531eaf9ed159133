//! Wire format of chat messages on the broadcast topic.
//!
//! Messages are JSON objects with the keys `Clock`, `ID`, `Name` and `Text`.
//! Unknown keys are ignored so newer peers can add fields. `Name` may be left
//! out and reads as empty; the other keys are required.

use crate::common::ChatMessage;
use crate::error::DecodeError;

pub fn encode(message: &ChatMessage) -> Vec<u8> {
    // Serializing a struct of strings and integers into memory cannot fail.
    serde_json::to_vec(message).unwrap_or_default()
}

pub fn decode(bytes: &[u8]) -> Result<ChatMessage, DecodeError> {
    Ok(serde_json::from_slice(bytes)?)
}
