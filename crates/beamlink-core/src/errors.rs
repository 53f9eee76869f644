//! Error types for the beamlink engine
//!
//! Decode errors are plain values consumed by callers deciding on fallback
//! behavior. Transport errors abort only the attempt that raised them.

use alloc::string::String;

cfg_if::cfg_if! {
    if #[cfg(not(feature = "std"))] {
        use alloc::string::ToString;
    }
}

// ----------------------------------------------------------------------------
// Decode Errors
// ----------------------------------------------------------------------------

cfg_if::cfg_if! {
    if #[cfg(feature = "std")] {
        /// Failure to interpret a binary record
        #[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
        pub enum DecodeError {
            #[error("Truncated record: needed {needed} bytes, {remaining} remaining")]
            Truncated { needed: usize, remaining: usize },
            #[error("Malformed record: {reason}")]
            Malformed { reason: String },
        }
    } else {
        /// Failure to interpret a binary record (no_std version)
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub enum DecodeError {
            Truncated { needed: usize, remaining: usize },
            Malformed { reason: String },
        }

        impl core::fmt::Display for DecodeError {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                match self {
                    Self::Truncated { needed, remaining } => write!(
                        f,
                        "Truncated record: needed {} bytes, {} remaining",
                        needed, remaining
                    ),
                    Self::Malformed { reason } => write!(f, "Malformed record: {}", reason),
                }
            }
        }
    }
}

impl DecodeError {
    pub fn truncated(needed: usize, remaining: usize) -> Self {
        Self::Truncated { needed, remaining }
    }

    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
        }
    }

    /// More bytes could still turn this into a successful decode
    pub fn is_truncated(&self) -> bool {
        matches!(self, Self::Truncated { .. })
    }
}

// ----------------------------------------------------------------------------
// Transport Errors
// ----------------------------------------------------------------------------

cfg_if::cfg_if! {
    if #[cfg(feature = "std")] {
        /// Link channel failures
        #[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
        pub enum TransportError {
            #[error("Could not connect to {service}: {reason}")]
            ConnectFailed { service: String, reason: String },
            #[error("Send failed: {reason}")]
            SendFailed { reason: String },
            #[error("Receive failed: {reason}")]
            ReceiveFailed { reason: String },
            #[error("Channel closed by peer")]
            Closed,
            #[error("Protocol error: {reason}")]
            Protocol { reason: String },
            #[error("Operation canceled")]
            Canceled,
        }
    } else {
        /// Link channel failures (no_std version)
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub enum TransportError {
            ConnectFailed { service: String, reason: String },
            SendFailed { reason: String },
            ReceiveFailed { reason: String },
            Closed,
            Protocol { reason: String },
            Canceled,
        }
    }
}

impl TransportError {
    pub fn connect_failed(service: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConnectFailed {
            service: service.into(),
            reason: reason.into(),
        }
    }

    pub fn send_failed(reason: impl Into<String>) -> Self {
        Self::SendFailed {
            reason: reason.into(),
        }
    }

    pub fn receive_failed(reason: impl Into<String>) -> Self {
        Self::ReceiveFailed {
            reason: reason.into(),
        }
    }

    pub fn protocol(reason: impl Into<String>) -> Self {
        Self::Protocol {
            reason: reason.into(),
        }
    }
}

impl From<DecodeError> for TransportError {
    fn from(err: DecodeError) -> Self {
        match err {
            DecodeError::Truncated { .. } => TransportError::protocol("truncated frame"),
            DecodeError::Malformed { reason } => TransportError::Protocol { reason },
        }
    }
}

// ----------------------------------------------------------------------------
// Main Error Type
// ----------------------------------------------------------------------------

cfg_if::cfg_if! {
    if #[cfg(feature = "std")] {
        /// Umbrella error for the beamlink crates
        #[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
        pub enum BeamlinkError {
            #[error("Decode error: {0}")]
            Decode(#[from] DecodeError),
            #[error("Transport error: {0}")]
            Transport(#[from] TransportError),
            #[error("Invalid carrier address: {0}")]
            InvalidAddress(String),
            #[error("Invalid configuration: {reason}")]
            InvalidConfiguration { reason: String },
            #[error("Channel error: {message}")]
            Channel { message: String },
        }
    } else {
        /// Umbrella error for the beamlink crates (no_std version)
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub enum BeamlinkError {
            Decode(DecodeError),
            Transport(TransportError),
            InvalidAddress(String),
            InvalidConfiguration { reason: String },
            Channel { message: String },
        }

        impl From<DecodeError> for BeamlinkError {
            fn from(err: DecodeError) -> Self {
                BeamlinkError::Decode(err)
            }
        }

        impl From<TransportError> for BeamlinkError {
            fn from(err: TransportError) -> Self {
                BeamlinkError::Transport(err)
            }
        }
    }
}

impl BeamlinkError {
    pub fn invalid_address(address: &str) -> Self {
        Self::InvalidAddress(address.to_string())
    }

    pub fn invalid_configuration(reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            reason: reason.into(),
        }
    }

    pub fn channel(message: impl Into<String>) -> Self {
        Self::Channel {
            message: message.into(),
        }
    }
}

pub type Result<T> = core::result::Result<T, BeamlinkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncated_is_recoverable() {
        assert!(DecodeError::truncated(4, 1).is_truncated());
        assert!(!DecodeError::malformed("bad flags").is_truncated());
    }

    #[test]
    fn test_decode_error_maps_to_protocol_error() {
        let err: TransportError = DecodeError::malformed("bad header").into();
        assert_eq!(err, TransportError::protocol("bad header"));
    }

    #[test]
    fn test_umbrella_conversion() {
        let err: BeamlinkError = TransportError::Closed.into();
        assert!(matches!(err, BeamlinkError::Transport(TransportError::Closed)));
    }
}
