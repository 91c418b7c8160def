//! X.509 certificate, CRL and OCSP handling (RFC 5280, RFC 6960).

mod builder;
mod certificate;
mod crl;
mod extensions;
mod name;
mod ocsp;
mod signing;

pub use builder::{CertificateBuilder, CrlBuilder, OcspResponseBuilder, RevokedEntry, SingleResponseSpec};
pub use certificate::{
    parse_pem_bundle, AlgorithmIdentifier, Certificate, Extension, SubjectPublicKeyInfo, Validity,
};
pub use crl::{parse_crls_pem, CertificateRevocationList, RevocationReason, RevokedCertificate};
pub use extensions::{
    AccessDescription, AuthorityInfoAccess, AuthorityKeyIdentifier, BasicConstraints,
    CertificatePolicies, CrlDistributionPoints, DistributionPoint, DistributionPointName,
    ExtendedKeyUsage, ExtensionValue, GeneralName, GeneralSubtree, InhibitAnyPolicy,
    IssuingDistributionPoint, KeyUsage, NameConstraints, PolicyConstraints, PolicyInformation,
    PolicyMapping, PolicyMappings, PolicyQualifier, ReasonFlags, SubjectAltName,
    SubjectKeyIdentifier,
};
pub use name::{AttributeValue, DistinguishedName, NameAttribute};
pub use ocsp::{
    BasicOcspResponse, CertId, OcspCertStatus, OcspRequest, OcspResponse, OcspResponseStatus,
    ResponderId, SingleResponse,
};
pub use signing::{
    compute_hash, hash_for_signature, RsaVerifier, SignatureVerifier, Signer, SigningKey,
};
