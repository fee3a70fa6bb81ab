//! Compatibility library for artifacts produced by Ruby on Rails.
//!
//! Rails hands browsers two kinds of opaque tokens: encrypted session
//! cookies and standalone signed messages. Both ultimately carry data
//! serialized with Ruby's native Marshal format (version 4.8). This crate
//! reads all three layers without a Ruby runtime in sight:
//!
//! - [`decode`] parses Marshal 4.8 byte streams into a [`Value`] tree,
//!   honoring symbol back-references and rejecting malformed or oversized
//!   input.
//! - [`KeyGenerator`] derives keys with PBKDF2-HMAC-SHA1, memoized the way
//!   Rails' own key generator memoizes them.
//! - [`Session`] parses and decrypts the AES-256-GCM cookie envelope and
//!   returns the session hash as decoded values.
//! - [`MessageVerifier`] generates and verifies the HMAC-SHA256 signed
//!   messages Rails emits for signed ids and the like.
//!
//! Re-encoding values back into Marshal format is out of scope, as is
//! instantiating user-defined Ruby objects: those are preserved as opaque
//! [`Wrapper`] values for callers to pattern-match on.

mod tag;

mod error;
pub use error::{Error, Result};

pub mod value;
pub use value::{Value, Wrapper, WrapperKind};

mod decode;
pub use decode::{decode, decode_b64};

mod key_generator;
pub use key_generator::KeyGenerator;

mod session;
pub use session::{Session, SESSION_KEY_SALT};

mod verifier;
pub use verifier::MessageVerifier;

/// The maximum nesting depth the decoder will follow before giving up.
pub const MAX_DEPTH: usize = 1000;
/// The maximum allowed size of a decoder input is 100 MiB. Length prefixes
/// inside the stream are capped against this same bound, so no single
/// allocation can be asked to exceed it.
pub const MAX_INPUT: usize = 100 * 1024 * 1024; // 100 MiB
