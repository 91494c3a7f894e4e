use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PacketError {
    /// A cursor operation ran past the end of its buffer.
    #[error("short buffer")]
    ShortBuffer,

    /// A declared length points past the captured frame.
    #[error("truncated frame: {0}")]
    Truncated(&'static str),

    /// The chain cannot be serialized as written.
    #[error("cannot encode chain: {0}")]
    Encode(&'static str),

    /// A stored checksum does not verify; produced only by the explicit
    /// verification helpers, never by `unpack`.
    #[error("bad {0} checksum")]
    BadChecksum(&'static str),
}
