use std::backtrace::Backtrace;
use std::error::Error as StdError;
use std::fmt;

#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// Error related to the durable record store
    Storage,
    /// Error related to the transport provider or the live connection
    Transport,
    /// Error related to process configuration
    Config,
    /// Error surfaced by the external message handler
    Handler,
    /// Internal error from dependencies
    Internal,
}

#[derive(Debug)]
pub struct Error {
    kind: Kind,
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
    backtrace: Backtrace,
}

impl Error {
    pub fn with_source<S: StdError + Send + Sync + 'static>(kind: Kind, source: S) -> Self {
        Self {
            kind,
            source: Some(Box::new(source)),
            backtrace: Backtrace::capture(),
        }
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }

    pub fn inner(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.source.as_deref()
    }

    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        let e = self.source.as_deref()?;
        e.downcast_ref::<E>()
    }

    pub fn storage<S: Into<String>>(message: S) -> Self {
        StorageFault {
            reason: message.into(),
        }
        .into()
    }

    pub fn transport<S: Into<String>>(message: S) -> Self {
        TransportFault {
            reason: message.into(),
        }
        .into()
    }

    pub fn config<S: Into<String>>(message: S) -> Self {
        ConfigFault {
            reason: message.into(),
        }
        .into()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(src) => write!(f, "{:?}: {}", self.kind, src),
            None => write!(f, "{:?}", self.kind),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn StdError + 'static))
    }
}

/// Failure reading from or writing to the durable record store.
#[non_exhaustive]
#[derive(Debug)]
pub struct StorageFault {
    pub reason: String,
}

impl fmt::Display for StorageFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "storage: {}", self.reason)
    }
}

impl StdError for StorageFault {}

/// Failure establishing or operating a transport connection.
#[non_exhaustive]
#[derive(Debug)]
pub struct TransportFault {
    pub reason: String,
}

impl fmt::Display for TransportFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "transport: {}", self.reason)
    }
}

impl StdError for TransportFault {}

/// Invalid process configuration.
#[non_exhaustive]
#[derive(Debug)]
pub struct ConfigFault {
    pub reason: String,
}

impl fmt::Display for ConfigFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid configuration: {}", self.reason)
    }
}

impl StdError for ConfigFault {}

impl From<StorageFault> for Error {
    fn from(err: StorageFault) -> Self {
        Error::with_source(Kind::Storage, err)
    }
}

impl From<TransportFault> for Error {
    fn from(err: TransportFault) -> Self {
        Error::with_source(Kind::Transport, err)
    }
}

impl From<ConfigFault> for Error {
    fn from(err: ConfigFault) -> Self {
        Error::with_source(Kind::Config, err)
    }
}

impl From<base64::DecodeError> for Error {
    fn from(e: base64::DecodeError) -> Self {
        Error::with_source(Kind::Internal, e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::with_source(Kind::Internal, e)
    }
}

impl From<mongodb::error::Error> for Error {
    fn from(e: mongodb::error::Error) -> Self {
        Error::with_source(Kind::Storage, e)
    }
}

impl From<bson::ser::Error> for Error {
    fn from(e: bson::ser::Error) -> Self {
        Error::with_source(Kind::Storage, e)
    }
}

impl From<bson::de::Error> for Error {
    fn from(e: bson::de::Error) -> Self {
        Error::with_source(Kind::Storage, e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::with_source(Kind::Internal, e)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "panicking is the desired test behavior")]

    use super::*;

    #[test]
    fn storage_fault_display_should_succeed() {
        let err = Error::storage("record missing");

        assert_eq!(err.kind(), Kind::Storage);
        assert_eq!(err.to_string(), "Storage: storage: record missing");
    }

    #[test]
    fn transport_fault_carries_kind() {
        let err = Error::transport("event stream ended");

        assert_eq!(err.kind(), Kind::Transport);
        assert!(err.to_string().contains("event stream ended"));
    }

    #[test]
    fn downcast_recovers_payload() {
        let err = Error::config("PORT out of range");

        let fault = err.downcast_ref::<ConfigFault>().expect("missing source");
        assert_eq!(fault.reason, "PORT out of range");
    }

    #[test]
    fn json_error_maps_to_internal() {
        let parse = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: Error = parse.into();

        assert_eq!(err.kind(), Kind::Internal);
    }
}
