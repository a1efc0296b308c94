//! # mailwatch-mime
//!
//! Just enough MIME to turn a fetched message into comparable, readable text.
//!
//! ## Features
//!
//! - **Headers**: folded-line parsing with case-insensitive lookup
//! - **Encoded words**: RFC 2047 `B` and `Q` decoding, adjacent-word joining
//! - **Addresses**: reduce `"Name <addr@host>"` to `addr@host`
//! - **Bodies**: multipart traversal, Base64 / Quoted-Printable, HTML fallback
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailwatch_mime::{Message, extract_address};
//!
//! let message = Message::parse(raw_bytes);
//! let sender = extract_address(message.from().unwrap_or_default());
//! let subject = message.subject().unwrap_or_default();
//! let text = message.text_content();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod address;
mod content_type;
mod date;
mod error;
mod header;
mod message;

pub mod encoding;

pub use address::extract_address;
pub use content_type::ContentType;
pub use date::parse_date;
pub use encoding::decode_header_value;
pub use error::{Error, Result};
pub use header::Headers;
pub use message::{Message, TransferEncoding};
