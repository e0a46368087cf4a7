//! SAT Descarga Masiva - Bulk download of Mexican electronic invoices.
//!
//! This crate is a client for the SAT bulk download web service: it signs in
//! with an e.firma, submits download requests, polls them and fetches the
//! resulting packages. Package contents are classified with [`sat_cfdi`].
//!
//! # Example
//!
//! ```
//! use sat_descarga::config;
//!
//! // Validate RFC and date before building a request
//! assert!(config::validate_rfc("GOGR810728TV5").is_ok());
//! assert!(config::validate_date("2024-01-31").is_ok());
//! ```
//!
//! # Architecture
//!
//! - [`config`]: Endpoints, defaults and validation
//! - [`error`]: Error types and Result alias
//! - [`credential`]: Certificate, key and passphrase
//! - [`keys`]: Private key decoding
//! - [`signer`]: WS-Security timestamp signature
//! - [`soap`]: Envelopes and response parsing
//! - [`transport`]: HTTP with retry
//! - [`session`]: Token cache
//! - [`lifecycle`]: Request states and polling results
//! - [`client`]: The service client
//! - [`package`]: Package contents to records
//! - [`cli`]: Command-line interface

pub mod cli;
pub mod client;
pub mod config;
pub mod credential;
pub mod error;
pub mod keys;
pub mod lifecycle;
pub mod package;
pub mod session;
pub mod signer;
pub mod soap;
pub mod transport;

pub use client::DescargaClient;
pub use config::{validate_date, validate_rfc, ClientConfig, ServiceEndpoints, TransportConfig};
pub use credential::Credential;
pub use error::{DescargaError, Result};
pub use lifecycle::{DocumentKind, DownloadRequest, RequestParams, RequestStatus, Verification};
pub use package::{
    process_package, ArchiveEntry, ArchiveExtractor, DirectoryExtractor, PackageReport,
};
pub use transport::{HttpTransport, ReqwestTransport};
