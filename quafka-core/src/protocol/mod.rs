//! Line-delimited text protocol spoken between clients and the broker.
//!
//! Every request and every response is a single UTF-8 line terminated by `\n`.
//!
//! ```text
//! TEXT:<content>               -> OK: Mesaj topic'e eklendi (partition: P, offset: O)
//! POLL:<topic>:<partition>     -> OK: <payload> (offset: O) | OK: Mesaj bulunamadı
//! COMMIT:<group>               -> OK: <group> için commit başarılı
//! <anything malformed>         -> HATA: <reason>
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use quafka_core::protocol::{Command, Request, Response};
//!
//! let request = Request::parse("POLL:orders:2").unwrap();
//! assert_eq!(request.command(), Command::Poll);
//! assert_eq!(request.encode(), "POLL:orders:2");
//!
//! let response = Response::parse(Command::Poll, "OK: Mesaj bulunamadı").unwrap();
//! assert_eq!(response, Response::Empty);
//! ```

pub mod request;
pub mod response;

pub use request::{Command, ProtocolViolation, Request};
pub use response::Response;

/// Protocol constants.
pub mod constants {
    /// Separator between command and payload.
    pub const SEPARATOR: char = ':';

    /// Prefix of every successful response.
    pub const OK_PREFIX: &str = "OK: ";

    /// Prefix of every error response.
    pub const ERROR_PREFIX: &str = "HATA: ";

    /// Topic that `TEXT` requests publish into.
    pub const DEFAULT_TOPIC: &str = "default-topic";
}
