/// Errors raised while decoding or encoding the tagged binary wire format.
///
/// `tars-codec`'s own `TarsError` was not present in the retrieved sources
/// (only `ser.rs`/`de.rs`/`types.rs`/`lib.rs` were available) so this set is
/// inferred from how those modules use it: a type-id byte outside the known
/// range, a `TryFrom<TarsValue>` mismatch, a `Struct` map missing a required
/// tag, and the frame-level failures from the length-prefixed transport.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("unknown wire type id {0}")]
    UnknownTypeId(u8),

    #[error("type mismatch decoding field: expected {expected}, got {actual}")]
    TypeMismatch { expected: &'static str, actual: &'static str },

    #[error("missing required field tag {0}")]
    MissingRequiredField(u8),

    #[error("unknown message tag {0}")]
    UnknownMessageTag(u8),

    #[error("unknown value {value} for enumerated field {field}")]
    UnknownEnumValue { field: &'static str, value: i32 },

    #[error("frame of {size} bytes exceeds the {max} byte limit")]
    FrameTooLarge { size: usize, max: usize },

    #[error("connection closed mid-frame")]
    ConnectionClosed,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
