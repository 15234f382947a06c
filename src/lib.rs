// Copyright (c) 2025 Webwx-rs Contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! # webwx
//!
//! A Rust client for the web messaging protocol used by the browser version
//! of WeChat: QR-code login followed by a long-polling sync loop.
//!
//! The crate covers the session and sync-key state machine. Message content
//! is handed back as raw JSON for higher layers to decode.

pub mod auth;
pub mod client;
pub mod error;
pub mod sync;
pub mod transport;
pub mod types;
pub mod util;
pub mod wire;

pub use client::{ClientConfig, Endpoints, ProtocolClient};
pub use error::{Error, Result};
pub use types::*;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
