// (c) 2025 qfs contributors

#![allow(clippy::doc_markdown)]
//! `qfs` is a client for a remote file service.
//!
//! The service offers four remote calls, one of each RPC shape:
//!
//! | Call | Shape | Client method |
//! |---|---|---|
//! | ListFiles | unary | [`FileServiceClient::list_files`](client::FileServiceClient::list_files) |
//! | Download | server streaming | [`FileServiceClient::download`](client::FileServiceClient::download) |
//! | Upload | client streaming | [`FileServiceClient::upload`](client::FileServiceClient::upload) |
//! | UploadAndNotifyProgress | bidirectional | [`FileServiceClient::upload_with_progress`](client::FileServiceClient::upload_with_progress) |
//!
//! ## 📖 Documentation
//!
//! * [The wire protocol](protocol)
//! * [Transports and security](transport)
//! * [Making calls](call): deadlines, cancellation, streaming, and error classification
//! * [Configuring qfs](config)
//!
//! ## 🧰 Getting Started
//!
//! * Point qfs at the service: `qfs --address files.example.com:50051 --ca-cert ca.pem ls`
//! * Put the settings you use every time in a [config] file. A bearer token can go there too.
//! * `qfs get report.pdf -o report.pdf` downloads a file.
//! * `qfs put notes.txt` uploads one; `qfs put-progress notes.txt` does the same,
//!   printing the server's progress messages as they arrive.
//!
//! The exit status is 2 if the server has no such file, 3 if a call ran out of time,
//! and 1 for any other failure.
//!
//! ## Use as a library
//!
//! ```no_run
//! # async fn example(config: &qfs::Configuration) -> anyhow::Result<()> {
//! let client = qfs::client::FileServiceClient::connect(config).await?;
//! for name in client.list_files(client.context()).await? {
//!     println!("{name}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! #### MSRV policy
//!
//! As this is an application crate, the MSRV is not guaranteed to remain stable.
//! The MSRV may be upgraded from time to time to take advantage of new language features.
//!
//! #### Feature flags
#![doc = document_features::document_features!()]
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub(crate) mod cli;
pub use cli::cli as main;

pub mod call;
pub use call::CallContext;
pub mod client;
pub mod config;
pub use config::Configuration;
pub mod protocol;
pub mod transport;
pub mod util;

mod version;
