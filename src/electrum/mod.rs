//! Electrum Protocol Client
//!
//! Sessions over `electrum-client`, plaintext or TLS.

pub mod client;
pub mod messages;
pub mod url;

pub use client::{ElectrumConnection, ElectrumConnector, ElectrumOptions};
pub use messages::UnspentEntry;
pub use self::url::{ElectrumUrl, UrlError};
