//! Monotonic signature counter.

use crate::element::{
    ElementLayout, SecureElementChannel, COUNTER_MODE_INCREMENT, OP_COUNTER,
};
use crate::error::TokenError;

/// Increment the hardware counter and return the new value in host byte
/// order. The increment is an irreversible side effect on the element; a
/// lost response does not roll it back.
pub(crate) fn increment<C: SecureElementChannel>(
    channel: &mut C,
    layout: &ElementLayout,
) -> Result<u32, TokenError> {
    let response = channel.execute(OP_COUNTER, COUNTER_MODE_INCREMENT, layout.counter_id, &[])?;
    let bytes: [u8; 4] = response.as_slice().try_into().map_err(|_| {
        TokenError::Protocol(format!(
            "counter response was {} bytes (expected 4)",
            response.len()
        ))
    })?;
    Ok(u32::from_le_bytes(bytes))
}
