use crate::client::ClientError;
use num_enum::TryFromPrimitive;
use std::{convert::TryFrom, fmt, io};

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, TryFromPrimitive)]
pub enum QoS {
    AtMostOnce = 0,  // QoS 0
    AtLeastOnce = 1, // QoS 1
    ExactlyOnce = 2, // QoS 2
}

impl From<QoS> for u8 {
    fn from(qos: QoS) -> u8 {
        qos as u8
    }
}

/// Validation failures for topics and QoS values. These are never retried.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValidationError {
    /// The raw topic string had zero length.
    EmptyTopic,
    /// A `#` level appeared somewhere other than the last level.
    MisplacedMultiLevelWildcard,
    /// The QoS byte was outside {0, 1, 2}.
    InvalidQos(u8),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::EmptyTopic => write!(f, "invalid topic; empty string"),
            ValidationError::MisplacedMultiLevelWildcard => {
                write!(f, "invalid topic; multi-level wildcard must be last level")
            },
            ValidationError::InvalidQos(qos) => write!(f, "invalid QoS {}", qos),
        }
    }
}

impl std::error::Error for ValidationError {}

pub fn validate_qos(qos: u8) -> Result<QoS, ValidationError> {
    QoS::try_from(qos).map_err(|_| ValidationError::InvalidQos(qos))
}

/// Failure to hand an inbound payload to the reading side of a stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryError {
    /// The reader fell behind and the pipe had no room for another message.
    PipeFull { capacity: usize },
}

impl fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryError::PipeFull { capacity } => {
                write!(f, "message dropped; pipe full ({} messages buffered)", capacity)
            },
        }
    }
}

impl std::error::Error for DeliveryError {}

#[derive(Debug)]
pub enum Error {
    Validation(ValidationError),
    /// Failure reported by the underlying client's acknowledgment token.
    Client(ClientError),
    Delivery(DeliveryError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Validation(err) => write!(f, "{}", err),
            Error::Client(err) => write!(f, "client error: {}", err),
            Error::Delivery(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Validation(err) => Some(err),
            Error::Client(err) => Some(&**err),
            Error::Delivery(err) => Some(err),
        }
    }
}

impl From<ValidationError> for Error {
    fn from(err: ValidationError) -> Error {
        Error::Validation(err)
    }
}

impl From<ClientError> for Error {
    fn from(err: ClientError) -> Error {
        Error::Client(err)
    }
}

impl From<DeliveryError> for Error {
    fn from(err: DeliveryError) -> Error {
        Error::Delivery(err)
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> io::Error {
        io::Error::new(io::ErrorKind::Other, err)
    }
}
