//! Core X.509 types and DER/PEM parsing.

use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use pathkit_types::{Asn1Error, Asn1ResultExt, CryptoError, PkiError};
use pathkit_utils::asn1::{Asn1Time, BitString, Decoder, Encoder, Tag, TagClass};
use pathkit_utils::oid::{known, Oid};

use super::extensions::{
    AuthorityInfoAccess, AuthorityKeyIdentifier, BasicConstraints, CertificatePolicies,
    CrlDistributionPoints, ExtendedKeyUsage, ExtensionValue, InhibitAnyPolicy, KeyUsage,
    NameConstraints, PolicyConstraints, PolicyMappings, SubjectAltName, SubjectKeyIdentifier,
};
use super::name::DistinguishedName;
use super::signing::{RsaVerifier, SignatureVerifier};

// ---------------------------------------------------------------------------
// Shared building blocks
// ---------------------------------------------------------------------------

/// `AlgorithmIdentifier ::= SEQUENCE { algorithm OID, parameters ANY OPTIONAL }`.
///
/// `parameters` holds the complete DER TLV of the parameters, if present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlgorithmIdentifier {
    pub oid: Oid,
    pub parameters: Option<Vec<u8>>,
}

impl AlgorithmIdentifier {
    pub fn new(oid: Oid) -> Self {
        AlgorithmIdentifier {
            oid,
            parameters: None,
        }
    }

    /// RSA algorithms carry an explicit NULL.
    pub fn with_null_parameters(oid: Oid) -> Self {
        AlgorithmIdentifier {
            oid,
            parameters: Some(vec![0x05, 0x00]),
        }
    }

    pub fn parse(dec: &mut Decoder<'_>) -> Result<Self, Asn1Error> {
        let mut seq = dec.read_sequence()?;
        let oid = seq.read_oid().at("algorithm")?;
        let parameters = if seq.is_empty() {
            None
        } else {
            Some(seq.read_tlv().at("parameters")?.raw.to_vec())
        };
        seq.finish()?;
        Ok(AlgorithmIdentifier { oid, parameters })
    }

    pub fn encode(&self) -> Result<Vec<u8>, Asn1Error> {
        let mut inner = Encoder::new();
        inner.write_oid(&self.oid)?;
        if let Some(params) = &self.parameters {
            inner.write_raw(params);
        }
        let mut out = Encoder::new();
        out.write_sequence(&inner.finish());
        Ok(out.finish())
    }
}

impl fmt::Display for AlgorithmIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.oid.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "{}", self.oid),
        }
    }
}

/// Subject public key info.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectPublicKeyInfo {
    pub algorithm: AlgorithmIdentifier,
    pub subject_public_key: BitString,
    der: Vec<u8>,
}

impl SubjectPublicKeyInfo {
    pub fn new(algorithm: AlgorithmIdentifier, key: &[u8]) -> Result<Self, Asn1Error> {
        let mut inner = Encoder::new();
        inner.write_raw(&algorithm.encode()?);
        inner.write_bit_string(0, key);
        let mut out = Encoder::new();
        out.write_sequence(&inner.finish());
        Ok(SubjectPublicKeyInfo {
            algorithm,
            subject_public_key: BitString::from_bytes(key),
            der: out.finish(),
        })
    }

    pub fn parse(dec: &mut Decoder<'_>) -> Result<Self, Asn1Error> {
        let tlv = dec.read_expected(Tag::SEQUENCE)?;
        let mut seq = tlv.contents();
        let algorithm = AlgorithmIdentifier::parse(&mut seq).at("algorithm")?;
        let subject_public_key = seq.read_bit_string().at("subjectPublicKey")?;
        seq.finish()?;
        Ok(SubjectPublicKeyInfo {
            algorithm,
            subject_public_key,
            der: tlv.raw.to_vec(),
        })
    }

    pub fn from_der(data: &[u8]) -> Result<Self, Asn1Error> {
        let mut dec = Decoder::new(data);
        let spki = Self::parse(&mut dec)?;
        dec.finish()?;
        Ok(spki)
    }

    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// The key bits, without the unused-bits octet.
    pub fn key_bytes(&self) -> &[u8] {
        self.subject_public_key.as_bytes()
    }
}

/// An X.509 extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extension {
    pub oid: Oid,
    pub critical: bool,
    /// Contents of the `extnValue` OCTET STRING.
    pub value: Vec<u8>,
}

impl Extension {
    /// Encode a typed extension value.
    pub fn new<T: ExtensionValue>(value: &T, critical: bool) -> Result<Self, Asn1Error> {
        Ok(Extension {
            oid: T::oid(),
            critical,
            value: value.encode()?,
        })
    }

    pub fn parse(dec: &mut Decoder<'_>) -> Result<Self, Asn1Error> {
        let mut seq = dec.read_sequence()?;
        let oid = seq.read_oid().at("extnID")?;
        // critical BOOLEAN DEFAULT FALSE
        let critical = if seq.next_is(TagClass::Universal, pathkit_utils::asn1::tags::BOOLEAN) {
            seq.read_boolean().at("critical")?
        } else {
            false
        };
        let value = seq.read_octet_string().at("extnValue")?.into_owned();
        seq.finish()?;
        Ok(Extension {
            oid,
            critical,
            value,
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>, Asn1Error> {
        let mut inner = Encoder::new();
        inner.write_oid(&self.oid)?;
        if self.critical {
            inner.write_boolean(true);
        }
        inner.write_octet_string(&self.value);
        let mut out = Encoder::new();
        out.write_sequence(&inner.finish());
        Ok(out.finish())
    }

    /// Decode the value as `T`, failing if this is a different extension.
    pub fn decode<T: ExtensionValue>(&self) -> Result<T, Asn1Error> {
        if self.oid != T::oid() {
            return Err(Asn1Error::InvalidOid(format!(
                "expected extension {}, found {}",
                T::oid(),
                self.oid
            )));
        }
        T::parse(&self.value)
    }
}

/// Read `Extensions ::= SEQUENCE SIZE (1..MAX) OF Extension`.
pub(crate) fn parse_extensions(dec: &mut Decoder<'_>) -> Result<Vec<Extension>, Asn1Error> {
    let mut seq = dec.read_sequence()?;
    let mut extensions = Vec::new();
    while !seq.is_empty() {
        let index = extensions.len();
        extensions.push(Extension::parse(&mut seq).at(&index.to_string())?);
    }
    Ok(extensions)
}

/// RFC 5280 §4.2: a certificate must not include more than one instance of
/// a particular extension.
pub(crate) fn check_unique_extensions(extensions: &[Extension]) -> Result<(), PkiError> {
    for (i, ext) in extensions.iter().enumerate() {
        if extensions[..i].iter().any(|e| e.oid == ext.oid) {
            return Err(PkiError::DuplicateExtension(ext.oid.to_string()));
        }
    }
    Ok(())
}

pub(crate) fn encode_extensions(extensions: &[Extension]) -> Result<Vec<u8>, Asn1Error> {
    let mut inner = Encoder::new();
    for ext in extensions {
        inner.write_raw(&ext.encode()?);
    }
    let mut out = Encoder::new();
    out.write_sequence(&inner.finish());
    Ok(out.finish())
}

/// The validity window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validity {
    pub not_before: Asn1Time,
    pub not_after: Asn1Time,
}

impl Validity {
    pub fn parse(dec: &mut Decoder<'_>) -> Result<Self, Asn1Error> {
        let mut seq = dec.read_sequence()?;
        let not_before = seq.read_time().at("notBefore")?;
        let not_after = seq.read_time().at("notAfter")?;
        seq.finish()?;
        Ok(Validity {
            not_before,
            not_after,
        })
    }

    pub fn from_timestamps(not_before: i64, not_after: i64) -> Result<Self, Asn1Error> {
        Ok(Validity {
            not_before: Asn1Time::x509(not_before)?,
            not_after: Asn1Time::x509(not_after)?,
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>, Asn1Error> {
        let mut inner = Encoder::new();
        inner.write_time(&self.not_before);
        inner.write_time(&self.not_after);
        let mut out = Encoder::new();
        out.write_sequence(&inner.finish());
        Ok(out.finish())
    }

    /// Whether `time` lies within `[notBefore, notAfter]`.
    pub fn contains(&self, time: i64) -> bool {
        self.not_before.timestamp() <= time && time <= self.not_after.timestamp()
    }
}

// ---------------------------------------------------------------------------
// Certificate
// ---------------------------------------------------------------------------

/// An X.509 certificate.
///
/// The DER bytes are shared, so clones are cheap and the to-be-signed span
/// used for signature checks is always the original encoding.
#[derive(Clone)]
pub struct Certificate {
    der: Arc<[u8]>,
    tbs: Range<usize>,
    version: u32,
    serial_number: Vec<u8>,
    signature: AlgorithmIdentifier,
    issuer: DistinguishedName,
    validity: Validity,
    subject: DistinguishedName,
    public_key: SubjectPublicKeyInfo,
    extensions: Vec<Extension>,
    signature_algorithm: AlgorithmIdentifier,
    signature_value: Vec<u8>,
}

impl Certificate {
    /// Parse a certificate from DER-encoded bytes.
    pub fn from_der(data: &[u8]) -> Result<Self, PkiError> {
        let mut top = Decoder::new(data);
        let mut outer = top.read_sequence().at("certificate")?;
        top.finish().at("certificate")?;

        let tbs_tlv = outer.read_expected(Tag::SEQUENCE).at("tbsCertificate")?;
        let tbs = tbs_tlv.offset..tbs_tlv.offset + tbs_tlv.raw.len();
        let mut tbs_dec = tbs_tlv.contents();
        let fields = parse_tbs(&mut tbs_dec).at("tbsCertificate")?;

        let signature_algorithm =
            AlgorithmIdentifier::parse(&mut outer).at("signatureAlgorithm")?;
        let signature_bits = outer.read_bit_string().at("signatureValue")?;
        outer.finish().at("certificate")?;

        if fields.version > 2 {
            return Err(PkiError::InvalidCert(format!(
                "unsupported version {}",
                fields.version + 1
            )));
        }
        if !fields.extensions.is_empty() && fields.version != 2 {
            return Err(PkiError::InvalidCert(
                "extensions present in a pre-v3 certificate".into(),
            ));
        }
        if fields.signature != signature_algorithm {
            return Err(PkiError::InvalidCert(
                "signature algorithm differs from tbsCertificate.signature".into(),
            ));
        }
        if signature_bits.unused_bits() != 0 {
            return Err(PkiError::InvalidCert(
                "signature value is not octet aligned".into(),
            ));
        }
        check_unique_extensions(&fields.extensions)?;

        Ok(Certificate {
            der: Arc::from(data),
            tbs,
            version: fields.version + 1,
            serial_number: fields.serial_number,
            signature: fields.signature,
            issuer: fields.issuer,
            validity: fields.validity,
            subject: fields.subject,
            public_key: fields.public_key,
            extensions: fields.extensions,
            signature_algorithm,
            signature_value: signature_bits.as_bytes().to_vec(),
        })
    }

    /// Parse the first `CERTIFICATE` block of a PEM string.
    pub fn from_pem(pem: &str) -> Result<Self, PkiError> {
        let der = pathkit_utils::pem::find(pem, "CERTIFICATE")?;
        Self::from_der(&der)
    }

    pub fn to_der(&self) -> &[u8] {
        &self.der
    }

    pub fn to_pem(&self) -> String {
        pathkit_utils::pem::encode("CERTIFICATE", &self.der)
    }

    /// The exact to-be-signed bytes of the original encoding.
    pub fn tbs_der(&self) -> &[u8] {
        &self.der[self.tbs.clone()]
    }

    /// Version as written in text (1, 2 or 3).
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Serial number content octets (two's complement, big-endian).
    pub fn serial_number(&self) -> &[u8] {
        &self.serial_number
    }

    pub fn serial_hex(&self) -> String {
        self.serial_number.iter().map(|b| format!("{b:02X}")).collect()
    }

    /// The `tbsCertificate.signature` algorithm.
    pub fn signature(&self) -> &AlgorithmIdentifier {
        &self.signature
    }

    pub fn signature_algorithm(&self) -> &AlgorithmIdentifier {
        &self.signature_algorithm
    }

    pub fn signature_value(&self) -> &[u8] {
        &self.signature_value
    }

    pub fn issuer(&self) -> &DistinguishedName {
        &self.issuer
    }

    pub fn subject(&self) -> &DistinguishedName {
        &self.subject
    }

    pub fn validity(&self) -> &Validity {
        &self.validity
    }

    pub fn not_before(&self) -> i64 {
        self.validity.not_before.timestamp()
    }

    pub fn not_after(&self) -> i64 {
        self.validity.not_after.timestamp()
    }

    pub fn public_key(&self) -> &SubjectPublicKeyInfo {
        &self.public_key
    }

    pub fn extensions(&self) -> &[Extension] {
        &self.extensions
    }

    pub fn extension(&self, oid: &Oid) -> Option<&Extension> {
        self.extensions.iter().find(|e| &e.oid == oid)
    }

    /// Decode a typed extension if present.
    pub fn get<T: ExtensionValue>(&self) -> Result<Option<T>, PkiError> {
        let oid = T::oid();
        match self.extension(&oid) {
            Some(ext) => Ok(Some(T::parse(&ext.value).at(&oid.to_string())?)),
            None => Ok(None),
        }
    }

    pub fn basic_constraints(&self) -> Result<Option<BasicConstraints>, PkiError> {
        self.get()
    }

    pub fn key_usage(&self) -> Result<Option<KeyUsage>, PkiError> {
        self.get()
    }

    pub fn extended_key_usage(&self) -> Result<Option<ExtendedKeyUsage>, PkiError> {
        self.get()
    }

    pub fn subject_alt_name(&self) -> Result<Option<SubjectAltName>, PkiError> {
        self.get()
    }

    pub fn authority_key_identifier(&self) -> Result<Option<AuthorityKeyIdentifier>, PkiError> {
        self.get()
    }

    pub fn subject_key_identifier(&self) -> Result<Option<SubjectKeyIdentifier>, PkiError> {
        self.get()
    }

    pub fn authority_info_access(&self) -> Result<Option<AuthorityInfoAccess>, PkiError> {
        self.get()
    }

    pub fn name_constraints(&self) -> Result<Option<NameConstraints>, PkiError> {
        self.get()
    }

    pub fn certificate_policies(&self) -> Result<Option<CertificatePolicies>, PkiError> {
        self.get()
    }

    pub fn policy_mappings(&self) -> Result<Option<PolicyMappings>, PkiError> {
        self.get()
    }

    pub fn policy_constraints(&self) -> Result<Option<PolicyConstraints>, PkiError> {
        self.get()
    }

    pub fn inhibit_any_policy(&self) -> Result<Option<InhibitAnyPolicy>, PkiError> {
        self.get()
    }

    pub fn crl_distribution_points(&self) -> Result<Option<CrlDistributionPoints>, PkiError> {
        self.get()
    }

    /// Whether basicConstraints asserts `cA`. Unparseable extensions read as
    /// not a CA.
    pub fn is_ca(&self) -> bool {
        matches!(self.basic_constraints(), Ok(Some(bc)) if bc.ca)
    }

    /// Subject and issuer are the same name (RFC 5280 §6.1).
    pub fn is_self_issued(&self) -> bool {
        self.issuer == self.subject
    }

    /// Self-issued and verifiable with its own key.
    pub fn is_self_signed(&self) -> bool {
        self.is_self_issued()
            && self
                .verify_signature(&self.public_key, &RsaVerifier)
                .is_ok()
    }

    /// Verify this certificate's signature with the issuer's public key.
    pub fn verify_signature(
        &self,
        issuer_key: &SubjectPublicKeyInfo,
        verifier: &dyn SignatureVerifier,
    ) -> Result<(), CryptoError> {
        verifier.verify(
            &self.signature_algorithm,
            issuer_key,
            self.tbs_der(),
            &self.signature_value,
        )
    }

    /// Whether this certificate is the OCSP responder delegated by its issuer
    /// (RFC 6960 §4.2.2.2).
    pub fn has_ocsp_signing(&self) -> bool {
        matches!(self.extended_key_usage(), Ok(Some(eku)) if eku.contains(&known::kp_ocsp_signing()))
    }
}

struct TbsFields {
    version: u32,
    serial_number: Vec<u8>,
    signature: AlgorithmIdentifier,
    issuer: DistinguishedName,
    validity: Validity,
    subject: DistinguishedName,
    public_key: SubjectPublicKeyInfo,
    extensions: Vec<Extension>,
}

fn parse_tbs(dec: &mut Decoder<'_>) -> Result<TbsFields, Asn1Error> {
    // version [0] EXPLICIT Version DEFAULT v1
    let version = match dec.try_read_explicit(0).at("version")? {
        Some(mut v) => {
            let n = v.read_u32().at("version")?;
            v.finish().at("version")?;
            n
        }
        None => 0,
    };
    let serial_number = dec.read_integer().at("serialNumber")?.to_vec();
    let signature = AlgorithmIdentifier::parse(dec).at("signature")?;
    let issuer = DistinguishedName::parse(dec).at("issuer")?;
    let validity = Validity::parse(dec).at("validity")?;
    let subject = DistinguishedName::parse(dec).at("subject")?;
    let public_key = SubjectPublicKeyInfo::parse(dec).at("subjectPublicKeyInfo")?;
    // issuerUniqueID [1], subjectUniqueID [2]: read and dropped
    dec.try_read_context_specific(1, false).at("issuerUniqueID")?;
    dec.try_read_context_specific(2, false).at("subjectUniqueID")?;
    let extensions = match dec.try_read_explicit(3).at("extensions")? {
        Some(mut ext) => {
            let list = parse_extensions(&mut ext).at("extensions")?;
            ext.finish().at("extensions")?;
            list
        }
        None => Vec::new(),
    };
    dec.finish()?;
    Ok(TbsFields {
        version,
        serial_number,
        signature,
        issuer,
        validity,
        subject,
        public_key,
        extensions,
    })
}

impl PartialEq for Certificate {
    fn eq(&self, other: &Self) -> bool {
        self.der == other.der
    }
}

impl Eq for Certificate {}

impl fmt::Debug for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Certificate")
            .field("serial", &self.serial_hex())
            .field("subject", &self.subject.to_string())
            .field("issuer", &self.issuer.to_string())
            .field("not_before", &self.validity.not_before.to_string())
            .field("not_after", &self.validity.not_after.to_string())
            .finish()
    }
}

/// Parse every `CERTIFICATE` block in a PEM bundle.
pub fn parse_pem_bundle(pem: &str) -> Result<Vec<Certificate>, PkiError> {
    pathkit_utils::pem::parse(pem)?
        .iter()
        .filter(|b| b.label == "CERTIFICATE")
        .map(|b| Certificate::from_der(&b.data))
        .collect()
}
