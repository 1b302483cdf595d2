//! Backend for mdoc reader apps.
//!
//! Reader apps register with a device attestation, then repeatedly ask the backend to
//! certify freshly generated reader authentication keys. Certificates are issued under
//! a root chosen by how much the backend trusts the device and, optionally, by the
//! Google account the app is signed in with. The backend also hands out the issuer
//! trust list the app uses to verify mdocs.
pub mod attestation;
pub mod backend;
pub mod cbor;
pub mod certifier;
pub mod client;
pub mod config;
pub mod google;
pub mod identity;
pub mod nonce;
pub mod storage;
pub mod trust_list;
pub mod x509;

pub use backend::{ReaderBackend, ReaderBackendSettings};
