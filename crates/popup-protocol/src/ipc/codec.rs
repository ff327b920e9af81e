use thiserror::Error;

use crate::Envelope;

/// Errors from encoding/decoding envelopes.
#[derive(Debug, Error)]
pub enum Error {
    /// The payload was empty.
    #[error("empty envelope payload")]
    Empty,
    /// Serialization or deserialization via serde_json failed.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Encode an `Envelope` into its JSON wire form.
pub fn envelope_to_string(envelope: &Envelope) -> Result<String, Error> {
    Ok(serde_json::to_string(envelope)?)
}

/// Decode the JSON wire form back into an `Envelope`.
///
/// # Errors
/// Returns an error if the input is blank or is not a valid envelope.
pub fn string_to_envelope(raw: &str) -> Result<Envelope, Error> {
    if raw.trim().is_empty() {
        return Err(Error::Empty);
    }
    Ok(serde_json::from_str(raw)?)
}
