//! termhost: run an editor extension headless behind a terminal front end.
//!
//! The crate emulates the host environment an extension bundle expects,
//! relays typed messages between the extension and the terminal, and
//! provides the two pieces of front end logic that make streaming output and
//! slash commands usable in a terminal:
//!
//! - [`transcript`] decides which transcript entries are final so they can be
//!   written once and never redrawn.
//! - [`autocomplete`] classifies partial input and ranks command and argument
//!   completions.
//!
//! # Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use termhost::host::{ExtensionHost, HostOptions, StaticModuleLoader};
//! use termhost::logs::LogService;
//! use termhost::protocol::WebviewMessage;
//!
//! # async fn example() {
//! let mut loader = StaticModuleLoader::new();
//! termhost::demo::register(&mut loader, Default::default());
//! let host = ExtensionHost::new(Arc::new(loader), Arc::new(LogService::default()));
//! let mut rx = host.backend_messages();
//! host.start(HostOptions::new(".", "./bundle")).await.unwrap();
//! host.post_to_backend(WebviewMessage::new_task("hello")).unwrap();
//! while let Some(message) = rx.recv().await {
//!     println!("{}", message.kind());
//! }
//! # }
//! ```

pub mod autocomplete;
pub mod bridge;
pub mod commands;
pub mod config;
pub mod console;
pub mod demo;
pub mod error;
pub mod host;
pub mod logging;
pub mod logs;
pub mod protocol;
#[cfg(test)]
pub mod testsupport;
pub mod transcript;
