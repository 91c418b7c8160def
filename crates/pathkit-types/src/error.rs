/// ASN.1 decoding and encoding errors.
///
/// Every decode failure carries the byte offset at which it was detected,
/// relative to the start of the buffer handed to the decoder. Schema parsers
/// wrap failures in [`Asn1Error::Field`] so the caller also sees which field
/// was being read.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Asn1Error {
    #[error("truncated input at offset {offset}")]
    TruncatedInput { offset: usize },
    #[error("malformed encoding at offset {offset}: {reason}")]
    MalformedEncoding { offset: usize, reason: String },
    #[error("unexpected tag at offset {offset}: expected {expected}, found {found}")]
    UnexpectedTag {
        offset: usize,
        expected: String,
        found: String,
    },
    #[error("unknown CHOICE alternative {tag}")]
    UnknownChoiceAlternative { tag: String },
    #[error("invalid character for {string_type} at offset {offset}")]
    InvalidCharacterSet {
        string_type: &'static str,
        offset: usize,
    },
    #[error("integer does not fit the requested width")]
    IntegerOverflow,
    #[error("invalid object identifier: {0}")]
    InvalidOid(String),
    #[error("{path}: {source}")]
    Field {
        path: String,
        #[source]
        source: Box<Asn1Error>,
    },
}

impl Asn1Error {
    pub fn malformed(offset: usize, reason: impl Into<String>) -> Self {
        Asn1Error::MalformedEncoding {
            offset,
            reason: reason.into(),
        }
    }

    /// The innermost error, with every field path stripped.
    pub fn root_cause(&self) -> &Asn1Error {
        match self {
            Asn1Error::Field { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Wrap the error with a field name. Nested calls build a dotted path
    /// from the outermost structure inward.
    pub fn in_field(self, field: &str) -> Self {
        match self {
            Asn1Error::Field { path, source } => Asn1Error::Field {
                path: format!("{field}.{path}"),
                source,
            },
            other => Asn1Error::Field {
                path: field.to_string(),
                source: Box::new(other),
            },
        }
    }
}

/// Attach a field path to an ASN.1 result while propagating it with `?`.
pub trait Asn1ResultExt<T> {
    fn at(self, field: &str) -> Result<T, Asn1Error>;
}

impl<T> Asn1ResultExt<T> for Result<T, Asn1Error> {
    fn at(self, field: &str) -> Result<T, Asn1Error> {
        self.map_err(|e| e.in_field(field))
    }
}

/// PEM armor and Base64 errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PemError {
    #[error("invalid base64 character {0:?}")]
    InvalidBase64Char(char),
    #[error("invalid base64 length")]
    InvalidBase64Length,
    #[error("missing PEM end line for {0}")]
    MissingEnd(String),
    #[error("PEM label mismatch: begin {begin}, end {end}")]
    LabelMismatch { begin: String, end: String },
    #[error("no PEM block labelled {0}")]
    NoBlock(String),
}

/// Errors raised by the pluggable signature and digest capabilities.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CryptoError {
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),
    #[error("invalid key: {0}")]
    InvalidKey(String),
    #[error("signature mismatch")]
    SignatureMismatch,
    #[error("signing failed: {0}")]
    SigningFailed(String),
}

/// PKI object errors: certificates, CRLs, OCSP messages and builders.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PkiError {
    #[error("asn1 error: {0}")]
    Asn1(#[from] Asn1Error),
    #[error("pem error: {0}")]
    Pem(#[from] PemError),
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
    #[error("invalid certificate: {0}")]
    InvalidCert(String),
    #[error("invalid CRL: {0}")]
    InvalidCrl(String),
    #[error("invalid OCSP message: {0}")]
    InvalidOcsp(String),
    #[error("duplicate extension {0}")]
    DuplicateExtension(String),
    #[error("builder error: {0}")]
    Builder(String),
    #[error("issuer not found for {0}")]
    IssuerNotFound(String),
    #[error("operation cancelled")]
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_path_nesting() {
        let inner: Result<(), Asn1Error> = Err(Asn1Error::TruncatedInput { offset: 7 });
        let err = inner.at("notAfter").at("validity").at("tbsCertificate").unwrap_err();
        match &err {
            Asn1Error::Field { path, .. } => assert_eq!(path, "tbsCertificate.validity.notAfter"),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(err.root_cause(), &Asn1Error::TruncatedInput { offset: 7 });
        assert!(err.to_string().contains("offset 7"));
    }

    #[test]
    fn test_pki_error_from_asn1() {
        let e: PkiError = Asn1Error::IntegerOverflow.into();
        assert!(matches!(e, PkiError::Asn1(Asn1Error::IntegerOverflow)));
    }
}
