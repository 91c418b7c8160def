//! X.509 certificate revocation lists (RFC 5280 §5).

use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use num_bigint::BigInt;
use pathkit_types::{Asn1Error, Asn1ResultExt, CryptoError, PkiError};
use pathkit_utils::asn1::{tags, Asn1Time, Decoder, Encoder, Tag, TagClass};
use pathkit_utils::oid::{known, Oid};

use super::certificate::{
    check_unique_extensions, parse_extensions, AlgorithmIdentifier, Extension,
    SubjectPublicKeyInfo,
};
use super::extensions::{
    encode_general_names, parse_general_names, ExtensionValue, GeneralName,
    IssuingDistributionPoint, ReasonFlags,
};
use super::name::DistinguishedName;
use super::signing::SignatureVerifier;

/// CRL revocation reason codes (RFC 5280 §5.3.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RevocationReason {
    Unspecified = 0,
    KeyCompromise = 1,
    CaCompromise = 2,
    AffiliationChanged = 3,
    Superseded = 4,
    CessationOfOperation = 5,
    CertificateHold = 6,
    // 7 is not used
    RemoveFromCrl = 8,
    PrivilegeWithdrawn = 9,
    AaCompromise = 10,
}

impl RevocationReason {
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::Unspecified),
            1 => Some(Self::KeyCompromise),
            2 => Some(Self::CaCompromise),
            3 => Some(Self::AffiliationChanged),
            4 => Some(Self::Superseded),
            5 => Some(Self::CessationOfOperation),
            6 => Some(Self::CertificateHold),
            8 => Some(Self::RemoveFromCrl),
            9 => Some(Self::PrivilegeWithdrawn),
            10 => Some(Self::AaCompromise),
            _ => None,
        }
    }

    pub fn code(self) -> u32 {
        self as u32
    }

    /// The matching `ReasonFlags` bit. `unspecified` and `removeFromCRL` have
    /// no bit of their own.
    pub fn flag(self) -> Option<u16> {
        match self {
            Self::KeyCompromise => Some(ReasonFlags::KEY_COMPROMISE),
            Self::CaCompromise => Some(ReasonFlags::CA_COMPROMISE),
            Self::AffiliationChanged => Some(ReasonFlags::AFFILIATION_CHANGED),
            Self::Superseded => Some(ReasonFlags::SUPERSEDED),
            Self::CessationOfOperation => Some(ReasonFlags::CESSATION_OF_OPERATION),
            Self::CertificateHold => Some(ReasonFlags::CERTIFICATE_HOLD),
            Self::PrivilegeWithdrawn => Some(ReasonFlags::PRIVILEGE_WITHDRAWN),
            Self::AaCompromise => Some(ReasonFlags::AA_COMPROMISE),
            Self::Unspecified | Self::RemoveFromCrl => None,
        }
    }

    pub(crate) fn parse_enumerated(dec: &mut Decoder<'_>) -> Result<Self, Asn1Error> {
        let offset = dec.offset();
        let code = dec.read_enumerated()?;
        Self::from_code(code)
            .ok_or_else(|| Asn1Error::malformed(offset, format!("unknown CRLReason {code}")))
    }

    pub(crate) fn encode_enumerated(self) -> Vec<u8> {
        let mut enc = Encoder::new();
        enc.write_enumerated(self.code());
        enc.finish()
    }
}

impl fmt::Display for RevocationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unspecified => "unspecified",
            Self::KeyCompromise => "keyCompromise",
            Self::CaCompromise => "cACompromise",
            Self::AffiliationChanged => "affiliationChanged",
            Self::Superseded => "superseded",
            Self::CessationOfOperation => "cessationOfOperation",
            Self::CertificateHold => "certificateHold",
            Self::RemoveFromCrl => "removeFromCRL",
            Self::PrivilegeWithdrawn => "privilegeWithdrawn",
            Self::AaCompromise => "aACompromise",
        };
        f.write_str(name)
    }
}

/// A revoked certificate entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevokedCertificate {
    /// Serial number content octets.
    pub serial_number: Vec<u8>,
    pub revocation_date: Asn1Time,
    /// From the `reasonCode` entry extension.
    pub reason: Option<RevocationReason>,
    /// From the `invalidityDate` entry extension.
    pub invalidity_date: Option<Asn1Time>,
    /// From the `certificateIssuer` entry extension, as written on this entry.
    pub certificate_issuer: Option<Vec<GeneralName>>,
    pub extensions: Vec<Extension>,
}

impl RevokedCertificate {
    fn parse(dec: &mut Decoder<'_>) -> Result<Self, Asn1Error> {
        let mut seq = dec.read_sequence()?;
        let serial_number = seq.read_integer().at("userCertificate")?.to_vec();
        let revocation_date = seq.read_time().at("revocationDate")?;
        let extensions = if seq.is_empty() {
            Vec::new()
        } else {
            parse_extensions(&mut seq).at("crlEntryExtensions")?
        };
        seq.finish()?;

        let mut entry = RevokedCertificate {
            serial_number,
            revocation_date,
            reason: None,
            invalidity_date: None,
            certificate_issuer: None,
            extensions: Vec::new(),
        };
        for ext in &extensions {
            let mut value = Decoder::new(&ext.value);
            if ext.oid == known::crl_reason() {
                let reason = RevocationReason::parse_enumerated(&mut value).at("reasonCode")?;
                entry.reason = Some(reason);
            } else if ext.oid == known::invalidity_date() {
                entry.invalidity_date = Some(value.read_time().at("invalidityDate")?);
            } else if ext.oid == known::certificate_issuer() {
                let mut names = value.read_sequence().at("certificateIssuer")?;
                entry.certificate_issuer =
                    Some(parse_general_names(&mut names).at("certificateIssuer")?);
            } else {
                continue;
            }
            value.finish()?;
        }
        entry.extensions = extensions;
        Ok(entry)
    }

    /// Serial number with leading zero octets removed.
    fn serial_key(&self) -> &[u8] {
        strip_leading_zeros(&self.serial_number)
    }

    /// Entry extensions this crate knows how to process.
    fn is_known_extension(oid: &Oid) -> bool {
        *oid == known::crl_reason()
            || *oid == known::invalidity_date()
            || *oid == known::certificate_issuer()
    }
}

/// A certificate revocation list.
#[derive(Clone)]
pub struct CertificateRevocationList {
    der: Arc<[u8]>,
    tbs: Range<usize>,
    version: u32,
    signature: AlgorithmIdentifier,
    issuer: DistinguishedName,
    this_update: Asn1Time,
    next_update: Option<Asn1Time>,
    revoked: Vec<RevokedCertificate>,
    extensions: Vec<Extension>,
    signature_algorithm: AlgorithmIdentifier,
    signature_value: Vec<u8>,
}

impl CertificateRevocationList {
    /// Parse a CRL from DER-encoded bytes.
    pub fn from_der(data: &[u8]) -> Result<Self, PkiError> {
        let mut top = Decoder::new(data);
        let mut outer = top.read_sequence().at("certificateList")?;
        top.finish().at("certificateList")?;

        let tbs_tlv = outer.read_expected(Tag::SEQUENCE).at("tbsCertList")?;
        let tbs = tbs_tlv.offset..tbs_tlv.offset + tbs_tlv.raw.len();
        let mut tbs_dec = tbs_tlv.contents();

        // version Version OPTIONAL, v2 when present
        let version = if tbs_dec.next_is(TagClass::Universal, tags::INTEGER) {
            tbs_dec.read_u32().at("tbsCertList.version")? + 1
        } else {
            1
        };
        let signature = AlgorithmIdentifier::parse(&mut tbs_dec).at("tbsCertList.signature")?;
        let issuer = DistinguishedName::parse(&mut tbs_dec).at("tbsCertList.issuer")?;
        let this_update = tbs_dec.read_time().at("tbsCertList.thisUpdate")?;
        let next_update = match tbs_dec.peek_tag() {
            Ok(tag) if tag == Tag::UTC_TIME || tag == Tag::GENERALIZED_TIME => {
                Some(tbs_dec.read_time().at("tbsCertList.nextUpdate")?)
            }
            _ => None,
        };
        let mut revoked = Vec::new();
        if tbs_dec.next_is(TagClass::Universal, tags::SEQUENCE) {
            let mut list = tbs_dec.read_sequence().at("tbsCertList.revokedCertificates")?;
            while !list.is_empty() {
                let index = revoked.len();
                let entry = RevokedCertificate::parse(&mut list)
                    .at(&index.to_string())
                    .at("tbsCertList.revokedCertificates")?;
                revoked.push(entry);
            }
        }
        let extensions = match tbs_dec.try_read_explicit(0).at("tbsCertList.crlExtensions")? {
            Some(mut ext) => {
                let list = parse_extensions(&mut ext).at("tbsCertList.crlExtensions")?;
                ext.finish().at("tbsCertList.crlExtensions")?;
                list
            }
            None => Vec::new(),
        };
        tbs_dec.finish().at("tbsCertList")?;

        let signature_algorithm =
            AlgorithmIdentifier::parse(&mut outer).at("signatureAlgorithm")?;
        let signature_bits = outer.read_bit_string().at("signatureValue")?;
        outer.finish().at("certificateList")?;

        if version > 2 {
            return Err(PkiError::InvalidCrl(format!("unsupported version {version}")));
        }
        let has_entry_extensions = revoked.iter().any(|e| !e.extensions.is_empty());
        if version == 1 && (!extensions.is_empty() || has_entry_extensions) {
            return Err(PkiError::InvalidCrl("extensions present in a v1 CRL".into()));
        }
        if signature != signature_algorithm {
            return Err(PkiError::InvalidCrl(
                "signature algorithm differs from tbsCertList.signature".into(),
            ));
        }
        if signature_bits.unused_bits() != 0 {
            return Err(PkiError::InvalidCrl("signature value is not octet aligned".into()));
        }
        check_unique_extensions(&extensions)?;
        for entry in &revoked {
            check_unique_extensions(&entry.extensions)?;
        }

        Ok(CertificateRevocationList {
            der: Arc::from(data),
            tbs,
            version,
            signature,
            issuer,
            this_update,
            next_update,
            revoked,
            extensions,
            signature_algorithm,
            signature_value: signature_bits.as_bytes().to_vec(),
        })
    }

    /// Parse the first `X509 CRL` block of a PEM string.
    pub fn from_pem(pem: &str) -> Result<Self, PkiError> {
        let der = pathkit_utils::pem::find(pem, "X509 CRL")?;
        Self::from_der(&der)
    }

    pub fn to_der(&self) -> &[u8] {
        &self.der
    }

    pub fn to_pem(&self) -> String {
        pathkit_utils::pem::encode("X509 CRL", &self.der)
    }

    pub fn tbs_der(&self) -> &[u8] {
        &self.der[self.tbs.clone()]
    }

    /// 1 or 2.
    pub fn version(&self) -> u32 {
        self.version
    }

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

    pub fn this_update(&self) -> &Asn1Time {
        &self.this_update
    }

    pub fn next_update(&self) -> Option<&Asn1Time> {
        self.next_update.as_ref()
    }

    pub fn revoked_certificates(&self) -> &[RevokedCertificate] {
        &self.revoked
    }

    pub fn extensions(&self) -> &[Extension] {
        &self.extensions
    }

    pub fn extension(&self, oid: &Oid) -> Option<&Extension> {
        self.extensions.iter().find(|e| &e.oid == oid)
    }

    /// Decode a typed CRL extension if present.
    pub fn get<T: ExtensionValue>(&self) -> Result<Option<T>, PkiError> {
        let oid = T::oid();
        match self.extension(&oid) {
            Some(ext) => Ok(Some(T::parse(&ext.value).at(&oid.to_string())?)),
            None => Ok(None),
        }
    }

    pub fn crl_number(&self) -> Result<Option<BigInt>, PkiError> {
        self.integer_extension(&known::crl_number())
    }

    /// The base CRL number of a delta CRL.
    pub fn delta_crl_indicator(&self) -> Result<Option<BigInt>, PkiError> {
        self.integer_extension(&known::delta_crl_indicator())
    }

    pub fn is_delta(&self) -> bool {
        self.extension(&known::delta_crl_indicator()).is_some()
    }

    pub fn issuing_distribution_point(&self) -> Result<Option<IssuingDistributionPoint>, PkiError> {
        self.get()
    }

    fn integer_extension(&self, oid: &Oid) -> Result<Option<BigInt>, PkiError> {
        let Some(ext) = self.extension(oid) else {
            return Ok(None);
        };
        let mut dec = Decoder::new(&ext.value);
        let n = dec.read_big_integer().at(&oid.to_string())?;
        dec.finish().at(&oid.to_string())?;
        Ok(Some(n))
    }

    /// The first critical CRL or entry extension this crate cannot process.
    /// A CRL carrying one must not be used to decide revocation status.
    pub fn unsupported_critical_extension(&self) -> Option<&Oid> {
        let crl_level = self
            .extensions
            .iter()
            .filter(|e| e.critical)
            .map(|e| &e.oid)
            .find(|oid| {
                **oid != known::crl_number()
                    && **oid != known::delta_crl_indicator()
                    && **oid != known::issuing_distribution_point()
                    && **oid != known::authority_key_identifier()
            });
        crl_level.or_else(|| {
            self.revoked
                .iter()
                .flat_map(|entry| entry.extensions.iter())
                .filter(|e| e.critical)
                .map(|e| &e.oid)
                .find(|oid| !RevokedCertificate::is_known_extension(oid))
        })
    }

    /// Verify the CRL's signature with the issuer's public key.
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

    /// Look up a serial number, ignoring leading zero octets.
    pub fn find(&self, serial: &[u8]) -> Option<&RevokedCertificate> {
        let wanted = strip_leading_zeros(serial);
        self.revoked.iter().find(|entry| entry.serial_key() == wanted)
    }

    /// Look up a certificate by serial number and issuer.
    ///
    /// In an indirect CRL every entry belongs to the issuer named by the most
    /// recent `certificateIssuer` extension, or to the CRL issuer before the
    /// first one (RFC 5280 §5.3.3). In a direct CRL the issuer must be the CRL
    /// issuer.
    pub fn find_for_issuer(
        &self,
        serial: &[u8],
        cert_issuer: &DistinguishedName,
    ) -> Result<Option<&RevokedCertificate>, PkiError> {
        let indirect = self
            .issuing_distribution_point()?
            .map(|idp| idp.indirect_crl)
            .unwrap_or(false);
        let wanted = strip_leading_zeros(serial);
        if !indirect {
            if self.issuer != *cert_issuer {
                return Ok(None);
            }
            return Ok(self.find(wanted));
        }

        let mut current: Option<&[GeneralName]> = None;
        for entry in &self.revoked {
            if let Some(names) = &entry.certificate_issuer {
                current = Some(names);
            }
            let issuer_matches = match current {
                None => self.issuer == *cert_issuer,
                Some(names) => names
                    .iter()
                    .any(|n| matches!(n, GeneralName::DirectoryName(dn) if dn == cert_issuer)),
            };
            if issuer_matches && entry.serial_key() == wanted {
                return Ok(Some(entry));
            }
        }
        Ok(None)
    }
}

impl PartialEq for CertificateRevocationList {
    fn eq(&self, other: &Self) -> bool {
        self.der == other.der
    }
}

impl Eq for CertificateRevocationList {}

impl fmt::Debug for CertificateRevocationList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateRevocationList")
            .field("issuer", &self.issuer.to_string())
            .field("this_update", &self.this_update.to_string())
            .field("next_update", &self.next_update.as_ref().map(|t| t.to_string()))
            .field("entries", &self.revoked.len())
            .finish()
    }
}

/// Encode the `certificateIssuer` entry extension value.
pub(crate) fn encode_certificate_issuer(names: &[GeneralName]) -> Result<Vec<u8>, Asn1Error> {
    let mut enc = Encoder::new();
    enc.write_sequence(&encode_general_names(names)?);
    Ok(enc.finish())
}

fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
    &bytes[start..]
}

/// Parse every `X509 CRL` block in a PEM string.
pub fn parse_crls_pem(pem: &str) -> Result<Vec<CertificateRevocationList>, PkiError> {
    pathkit_utils::pem::parse(pem)?
        .iter()
        .filter(|b| b.label == "X509 CRL")
        .map(|b| CertificateRevocationList::from_der(&b.data))
        .collect()
}
