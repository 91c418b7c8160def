#![forbid(unsafe_code)]
#![doc = "X.509 certificates, CRLs, OCSP and RFC 5280 certification path validation."]

#[cfg(feature = "x509")]
pub mod x509;

#[cfg(feature = "path")]
pub mod cert_store;

#[cfg(feature = "path")]
pub mod path;

#[cfg(feature = "path")]
pub mod revocation;

#[cfg(all(test, feature = "x509"))]
pub(crate) mod test_support;
