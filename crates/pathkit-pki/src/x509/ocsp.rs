//! Online Certificate Status Protocol messages (RFC 6960).
//!
//! Request and response encoding only; transport is left to the caller.

use std::fmt;
use std::ops::Range;

use pathkit_types::{Asn1Error, Asn1ResultExt, CryptoError, HashAlgId, PkiError};
use pathkit_utils::asn1::{Asn1Time, ChoiceTable, Decoder, Encoder, Tag, TagClass, Tlv};
use pathkit_utils::oid::known;

use super::certificate::{
    check_unique_extensions, encode_extensions, parse_extensions, AlgorithmIdentifier,
    Certificate, Extension, SubjectPublicKeyInfo,
};
use super::crl::RevocationReason;
use super::name::DistinguishedName;
use super::signing::{compute_hash, digest_from_oid, digest_oid, SignatureVerifier};

fn sequence(contents: &[u8]) -> Vec<u8> {
    let mut out = Encoder::new();
    out.write_sequence(contents);
    out.finish()
}

/// Read `[n] EXPLICIT Extensions` if present.
fn parse_explicit_extensions(dec: &mut Decoder<'_>, n: u32) -> Result<Vec<Extension>, Asn1Error> {
    match dec.try_read_explicit(n)? {
        Some(mut inner) => {
            let list = parse_extensions(&mut inner)?;
            inner.finish()?;
            Ok(list)
        }
        None => Ok(Vec::new()),
    }
}

fn nonce_extension(nonce: &[u8]) -> Extension {
    let mut value = Encoder::new();
    value.write_octet_string(nonce);
    Extension {
        oid: known::ocsp_nonce(),
        critical: false,
        value: value.finish(),
    }
}

/// The nonce of an extension list. Some responders put the raw nonce in
/// `extnValue` instead of an OCTET STRING; those bytes are taken as is.
fn find_nonce(extensions: &[Extension]) -> Option<Vec<u8>> {
    let ext = extensions.iter().find(|e| e.oid == known::ocsp_nonce())?;
    let mut dec = Decoder::new(&ext.value);
    match dec.read_octet_string() {
        Ok(nonce) if dec.is_empty() => Some(nonce.into_owned()),
        _ => Some(ext.value.clone()),
    }
}

// ---------------------------------------------------------------------------
// CertID
// ---------------------------------------------------------------------------

/// OCSP certificate identifier (RFC 6960 §4.1.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertId {
    pub hash_algorithm: HashAlgId,
    /// Hash of the DER issuer name.
    pub issuer_name_hash: Vec<u8>,
    /// Hash of the issuer's subjectPublicKey bits.
    pub issuer_key_hash: Vec<u8>,
    pub serial_number: Vec<u8>,
}

impl CertId {
    /// Identify `cert`, issued by `issuer`, using `hash`.
    pub fn new(cert: &Certificate, issuer: &Certificate, hash: HashAlgId) -> Self {
        Self::from_parts(cert.issuer(), issuer.public_key(), cert.serial_number(), hash)
    }

    pub fn from_parts(
        issuer_name: &DistinguishedName,
        issuer_key: &SubjectPublicKeyInfo,
        serial_number: &[u8],
        hash: HashAlgId,
    ) -> Self {
        CertId {
            hash_algorithm: hash,
            issuer_name_hash: compute_hash(hash, issuer_name.der()),
            issuer_key_hash: compute_hash(hash, issuer_key.key_bytes()),
            serial_number: serial_number.to_vec(),
        }
    }

    pub fn parse(dec: &mut Decoder<'_>) -> Result<Self, Asn1Error> {
        let mut seq = dec.read_sequence()?;
        let alg = AlgorithmIdentifier::parse(&mut seq).at("hashAlgorithm")?;
        let hash_algorithm = digest_from_oid(&alg.oid).ok_or_else(|| {
            Asn1Error::InvalidOid(format!("unsupported CertID digest {}", alg.oid))
        })?;
        let issuer_name_hash = seq.read_octet_string().at("issuerNameHash")?.into_owned();
        let issuer_key_hash = seq.read_octet_string().at("issuerKeyHash")?.into_owned();
        let serial_number = seq.read_integer().at("serialNumber")?.to_vec();
        seq.finish()?;
        Ok(CertId {
            hash_algorithm,
            issuer_name_hash,
            issuer_key_hash,
            serial_number,
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>, Asn1Error> {
        let mut inner = Encoder::new();
        let alg = AlgorithmIdentifier::with_null_parameters(digest_oid(self.hash_algorithm));
        inner.write_raw(&alg.encode()?);
        inner.write_octet_string(&self.issuer_name_hash);
        inner.write_octet_string(&self.issuer_key_hash);
        inner.write_integer(&self.serial_number);
        Ok(sequence(&inner.finish()))
    }
}

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// An unsigned OCSP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcspRequest {
    pub cert_ids: Vec<CertId>,
    nonce: Option<Vec<u8>>,
}

impl OcspRequest {
    pub fn new(cert_id: CertId) -> Self {
        OcspRequest {
            cert_ids: vec![cert_id],
            nonce: None,
        }
    }

    pub fn add(&mut self, cert_id: CertId) -> &mut Self {
        self.cert_ids.push(cert_id);
        self
    }

    /// Set the request nonce, replacing any earlier one.
    pub fn set_nonce(&mut self, nonce: Vec<u8>) -> &mut Self {
        self.nonce = Some(nonce);
        self
    }

    pub fn nonce(&self) -> Option<&[u8]> {
        self.nonce.as_deref()
    }

    pub fn to_der(&self) -> Result<Vec<u8>, PkiError> {
        if self.cert_ids.is_empty() {
            return Err(PkiError::InvalidOcsp("request without CertIDs".into()));
        }
        let mut list = Encoder::new();
        for id in &self.cert_ids {
            list.write_sequence(&id.encode()?);
        }
        let mut tbs = Encoder::new();
        tbs.write_sequence(&list.finish());
        if let Some(nonce) = &self.nonce {
            let extensions = encode_extensions(&[nonce_extension(nonce)])?;
            tbs.write_explicit(2, &extensions);
        }
        let mut outer = Encoder::new();
        outer.write_sequence(&tbs.finish());
        Ok(sequence(&outer.finish()))
    }

    pub fn from_der(data: &[u8]) -> Result<Self, PkiError> {
        let mut top = Decoder::new(data);
        let mut outer = top.read_sequence().at("OCSPRequest")?;
        top.finish().at("OCSPRequest")?;
        let mut tbs = outer.read_sequence().at("tbsRequest")?;
        if let Some(mut v) = tbs.try_read_explicit(0).at("tbsRequest.version")? {
            let version = v.read_u32().at("tbsRequest.version")?;
            if version != 0 {
                return Err(PkiError::InvalidOcsp(format!("unsupported version {}", version + 1)));
            }
        }
        // requestorName [1] is not interpreted
        tbs.try_read_explicit(1).at("tbsRequest.requestorName")?;
        let mut list = tbs.read_sequence().at("tbsRequest.requestList")?;
        let mut cert_ids = Vec::new();
        while !list.is_empty() {
            let mut request = list.read_sequence().at("tbsRequest.requestList")?;
            cert_ids.push(CertId::parse(&mut request).at("reqCert")?);
            parse_explicit_extensions(&mut request, 0).at("singleRequestExtensions")?;
            request.finish().at("tbsRequest.requestList")?;
        }
        let extensions =
            parse_explicit_extensions(&mut tbs, 2).at("tbsRequest.requestExtensions")?;
        tbs.finish().at("tbsRequest")?;
        // optionalSignature [0] is accepted but not verified
        outer.try_read_explicit(0).at("optionalSignature")?;
        outer.finish().at("OCSPRequest")?;
        if cert_ids.is_empty() {
            return Err(PkiError::InvalidOcsp("request without CertIDs".into()));
        }
        Ok(OcspRequest {
            cert_ids,
            nonce: find_nonce(&extensions),
        })
    }
}

// ---------------------------------------------------------------------------
// Response
// ---------------------------------------------------------------------------

/// `OCSPResponseStatus` (RFC 6960 §4.2.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OcspResponseStatus {
    Successful = 0,
    MalformedRequest = 1,
    InternalError = 2,
    TryLater = 3,
    SigRequired = 5,
    Unauthorized = 6,
}

impl OcspResponseStatus {
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::Successful),
            1 => Some(Self::MalformedRequest),
            2 => Some(Self::InternalError),
            3 => Some(Self::TryLater),
            5 => Some(Self::SigRequired),
            6 => Some(Self::Unauthorized),
            _ => None,
        }
    }
}

impl fmt::Display for OcspResponseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Successful => "successful",
            Self::MalformedRequest => "malformedRequest",
            Self::InternalError => "internalError",
            Self::TryLater => "tryLater",
            Self::SigRequired => "sigRequired",
            Self::Unauthorized => "unauthorized",
        };
        f.write_str(name)
    }
}

/// `CertStatus` CHOICE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OcspCertStatus {
    Good,
    Revoked {
        time: Asn1Time,
        reason: Option<RevocationReason>,
    },
    Unknown,
}

fn status_good(tlv: &Tlv<'_>) -> Result<OcspCertStatus, Asn1Error> {
    expect_empty(tlv).map(|_| OcspCertStatus::Good)
}

fn status_revoked(tlv: &Tlv<'_>) -> Result<OcspCertStatus, Asn1Error> {
    let mut info = tlv.contents();
    let time = info.read_time().at("revocationTime")?;
    let reason = match info.try_read_explicit(0).at("revocationReason")? {
        Some(mut r) => Some(RevocationReason::parse_enumerated(&mut r).at("revocationReason")?),
        None => None,
    };
    info.finish()?;
    Ok(OcspCertStatus::Revoked { time, reason })
}

fn status_unknown(tlv: &Tlv<'_>) -> Result<OcspCertStatus, Asn1Error> {
    expect_empty(tlv).map(|_| OcspCertStatus::Unknown)
}

fn expect_empty(tlv: &Tlv<'_>) -> Result<(), Asn1Error> {
    if tlv.value.is_empty() {
        Ok(())
    } else {
        Err(Asn1Error::malformed(tlv.content_offset, "NULL with content"))
    }
}

static CERT_STATUS: ChoiceTable<OcspCertStatus> = ChoiceTable::new(
    "CertStatus",
    &[
        (TagClass::ContextSpecific, 0, status_good),
        (TagClass::ContextSpecific, 1, status_revoked),
        (TagClass::ContextSpecific, 2, status_unknown),
    ],
);

impl OcspCertStatus {
    fn encode(&self) -> Result<Vec<u8>, Asn1Error> {
        let mut enc = Encoder::new();
        match self {
            OcspCertStatus::Good => {
                enc.write_context_specific(0, false, &[]);
            }
            OcspCertStatus::Revoked { time, reason } => {
                let mut info = Encoder::new();
                info.write_time(time);
                if let Some(reason) = reason {
                    info.write_explicit(0, &reason.encode_enumerated());
                }
                enc.write_context_specific(1, true, &info.finish());
            }
            OcspCertStatus::Unknown => {
                enc.write_context_specific(2, false, &[]);
            }
        }
        Ok(enc.finish())
    }
}

/// `ResponderID` CHOICE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponderId {
    ByName(DistinguishedName),
    /// SHA-1 of the responder's subjectPublicKey bits.
    ByKey(Vec<u8>),
}

fn responder_by_name(tlv: &Tlv<'_>) -> Result<ResponderId, Asn1Error> {
    let mut dec = tlv.contents();
    let name = DistinguishedName::parse(&mut dec)?;
    dec.finish()?;
    Ok(ResponderId::ByName(name))
}

fn responder_by_key(tlv: &Tlv<'_>) -> Result<ResponderId, Asn1Error> {
    let mut dec = tlv.contents();
    let hash = dec.read_octet_string()?.into_owned();
    dec.finish()?;
    Ok(ResponderId::ByKey(hash))
}

static RESPONDER_ID: ChoiceTable<ResponderId> = ChoiceTable::new(
    "ResponderID",
    &[
        (TagClass::ContextSpecific, 1, responder_by_name),
        (TagClass::ContextSpecific, 2, responder_by_key),
    ],
);

impl ResponderId {
    pub fn by_key(key: &SubjectPublicKeyInfo) -> Self {
        ResponderId::ByKey(compute_hash(HashAlgId::Sha1, key.key_bytes()))
    }

    /// Whether `cert` is the responder this id names.
    pub fn matches(&self, cert: &Certificate) -> bool {
        match self {
            ResponderId::ByName(name) => cert.subject() == name,
            ResponderId::ByKey(hash) => {
                compute_hash(HashAlgId::Sha1, cert.public_key().key_bytes()) == *hash
            }
        }
    }

    pub(crate) fn encode(&self) -> Vec<u8> {
        let mut enc = Encoder::new();
        match self {
            ResponderId::ByName(name) => {
                enc.write_explicit(1, name.der());
            }
            ResponderId::ByKey(hash) => {
                let mut inner = Encoder::new();
                inner.write_octet_string(hash);
                enc.write_explicit(2, &inner.finish());
            }
        }
        enc.finish()
    }
}

/// One `SingleResponse`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SingleResponse {
    pub cert_id: CertId,
    pub status: OcspCertStatus,
    pub this_update: Asn1Time,
    pub next_update: Option<Asn1Time>,
    pub extensions: Vec<Extension>,
}

impl SingleResponse {
    fn parse(dec: &mut Decoder<'_>) -> Result<Self, Asn1Error> {
        let mut seq = dec.read_sequence()?;
        let cert_id = CertId::parse(&mut seq).at("certID")?;
        let status = CERT_STATUS.decode(&mut seq).at("certStatus")?;
        let this_update = seq.read_time().at("thisUpdate")?;
        let next_update = match seq.try_read_explicit(0).at("nextUpdate")? {
            Some(mut t) => {
                let time = t.read_time().at("nextUpdate")?;
                t.finish().at("nextUpdate")?;
                Some(time)
            }
            None => None,
        };
        let extensions = parse_explicit_extensions(&mut seq, 1).at("singleExtensions")?;
        seq.finish()?;
        Ok(SingleResponse {
            cert_id,
            status,
            this_update,
            next_update,
            extensions,
        })
    }

    pub(crate) fn encode(&self) -> Result<Vec<u8>, Asn1Error> {
        let mut inner = Encoder::new();
        inner.write_raw(&self.cert_id.encode()?);
        inner.write_raw(&self.status.encode()?);
        inner.write_time(&self.this_update);
        if let Some(next) = &self.next_update {
            let mut t = Encoder::new();
            t.write_time(next);
            inner.write_explicit(0, &t.finish());
        }
        if !self.extensions.is_empty() {
            inner.write_explicit(1, &encode_extensions(&self.extensions)?);
        }
        Ok(sequence(&inner.finish()))
    }

    /// Whether `time` lies within `[thisUpdate, nextUpdate]`, allowing
    /// `skew` seconds on each side. A missing nextUpdate only bounds below.
    pub fn is_current(&self, time: i64, skew: i64) -> bool {
        if time + skew < self.this_update.timestamp() {
            return false;
        }
        match &self.next_update {
            Some(next) => time - skew <= next.timestamp(),
            None => true,
        }
    }
}

/// `BasicOCSPResponse` (RFC 6960 §4.2.1).
#[derive(Clone, PartialEq, Eq)]
pub struct BasicOcspResponse {
    der: Vec<u8>,
    tbs: Range<usize>,
    responder_id: ResponderId,
    produced_at: Asn1Time,
    responses: Vec<SingleResponse>,
    extensions: Vec<Extension>,
    signature_algorithm: AlgorithmIdentifier,
    signature_value: Vec<u8>,
    certs: Vec<Certificate>,
}

impl BasicOcspResponse {
    pub fn from_der(data: &[u8]) -> Result<Self, PkiError> {
        let mut top = Decoder::new(data);
        let mut outer = top.read_sequence().at("BasicOCSPResponse")?;
        top.finish().at("BasicOCSPResponse")?;

        let tbs_tlv = outer.read_expected(Tag::SEQUENCE).at("tbsResponseData")?;
        let tbs = tbs_tlv.offset..tbs_tlv.offset + tbs_tlv.raw.len();
        let mut data_dec = tbs_tlv.contents();
        if let Some(mut v) = data_dec.try_read_explicit(0).at("tbsResponseData.version")? {
            let version = v.read_u32().at("tbsResponseData.version")?;
            if version != 0 {
                return Err(PkiError::InvalidOcsp(format!("unsupported version {}", version + 1)));
            }
        }
        let responder_id = RESPONDER_ID
            .decode(&mut data_dec)
            .at("tbsResponseData.responderID")?;
        let produced_at = data_dec.read_time().at("tbsResponseData.producedAt")?;
        let mut list = data_dec.read_sequence().at("tbsResponseData.responses")?;
        let mut responses = Vec::new();
        while !list.is_empty() {
            let index = responses.len();
            let single = SingleResponse::parse(&mut list)
                .at(&index.to_string())
                .at("tbsResponseData.responses")?;
            responses.push(single);
        }
        let extensions = parse_explicit_extensions(&mut data_dec, 1)
            .at("tbsResponseData.responseExtensions")?;
        data_dec.finish().at("tbsResponseData")?;

        let signature_algorithm =
            AlgorithmIdentifier::parse(&mut outer).at("signatureAlgorithm")?;
        let signature_bits = outer.read_bit_string().at("signature")?;
        let mut certs = Vec::new();
        if let Some(mut wrapper) = outer.try_read_explicit(0).at("certs")? {
            let mut seq = wrapper.read_sequence().at("certs")?;
            while !seq.is_empty() {
                let tlv = seq.read_expected(Tag::SEQUENCE).at("certs")?;
                certs.push(Certificate::from_der(tlv.raw)?);
            }
            wrapper.finish().at("certs")?;
        }
        outer.finish().at("BasicOCSPResponse")?;

        if signature_bits.unused_bits() != 0 {
            return Err(PkiError::InvalidOcsp("signature is not octet aligned".into()));
        }
        check_unique_extensions(&extensions)?;

        Ok(BasicOcspResponse {
            der: data.to_vec(),
            tbs,
            responder_id,
            produced_at,
            responses,
            extensions,
            signature_algorithm,
            signature_value: signature_bits.as_bytes().to_vec(),
            certs,
        })
    }

    pub fn to_der(&self) -> &[u8] {
        &self.der
    }

    pub fn tbs_der(&self) -> &[u8] {
        &self.der[self.tbs.clone()]
    }

    pub fn responder_id(&self) -> &ResponderId {
        &self.responder_id
    }

    pub fn produced_at(&self) -> &Asn1Time {
        &self.produced_at
    }

    pub fn responses(&self) -> &[SingleResponse] {
        &self.responses
    }

    pub fn extensions(&self) -> &[Extension] {
        &self.extensions
    }

    pub fn signature_algorithm(&self) -> &AlgorithmIdentifier {
        &self.signature_algorithm
    }

    /// Certificates the responder attached, typically its delegated
    /// signing certificate.
    pub fn certs(&self) -> &[Certificate] {
        &self.certs
    }

    pub fn nonce(&self) -> Option<Vec<u8>> {
        find_nonce(&self.extensions)
    }

    /// The single response for `cert_id`, if any.
    pub fn find(&self, cert_id: &CertId) -> Option<&SingleResponse> {
        self.responses.iter().find(|r| r.cert_id == *cert_id)
    }

    pub fn verify_signature(
        &self,
        key: &SubjectPublicKeyInfo,
        verifier: &dyn SignatureVerifier,
    ) -> Result<(), CryptoError> {
        verifier.verify(
            &self.signature_algorithm,
            key,
            self.tbs_der(),
            &self.signature_value,
        )
    }
}

impl fmt::Debug for BasicOcspResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicOcspResponse")
            .field("responder_id", &self.responder_id)
            .field("produced_at", &self.produced_at.to_string())
            .field("responses", &self.responses.len())
            .field("certs", &self.certs.len())
            .finish()
    }
}

/// A complete `OCSPResponse`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcspResponse {
    der: Vec<u8>,
    status: OcspResponseStatus,
    basic: Option<BasicOcspResponse>,
}

impl OcspResponse {
    pub fn from_der(data: &[u8]) -> Result<Self, PkiError> {
        let mut top = Decoder::new(data);
        let mut outer = top.read_sequence().at("OCSPResponse")?;
        top.finish().at("OCSPResponse")?;
        let code = outer.read_enumerated().at("responseStatus")?;
        let status = OcspResponseStatus::from_code(code)
            .ok_or_else(|| PkiError::InvalidOcsp(format!("unknown response status {code}")))?;

        let mut basic = None;
        if let Some(mut wrapper) = outer.try_read_explicit(0).at("responseBytes")? {
            let mut bytes = wrapper.read_sequence().at("responseBytes")?;
            let response_type = bytes.read_oid().at("responseBytes.responseType")?;
            let response = bytes.read_octet_string().at("responseBytes.response")?;
            bytes.finish().at("responseBytes")?;
            wrapper.finish().at("responseBytes")?;
            if response_type != known::ocsp_basic() {
                return Err(PkiError::InvalidOcsp(format!(
                    "unsupported response type {response_type}"
                )));
            }
            basic = Some(BasicOcspResponse::from_der(&response)?);
        }
        outer.finish().at("OCSPResponse")?;

        if status == OcspResponseStatus::Successful && basic.is_none() {
            return Err(PkiError::InvalidOcsp("successful response without responseBytes".into()));
        }
        Ok(OcspResponse {
            der: data.to_vec(),
            status,
            basic,
        })
    }

    /// A response carrying only an error status.
    pub fn unsuccessful(status: OcspResponseStatus) -> Result<Self, PkiError> {
        if status == OcspResponseStatus::Successful {
            return Err(PkiError::Builder("a successful response needs a body".into()));
        }
        let mut inner = Encoder::new();
        inner.write_enumerated(status as u32);
        Self::from_der(&sequence(&inner.finish()))
    }

    /// Wrap a signed basic response.
    pub(crate) fn successful(basic_der: &[u8]) -> Result<Self, PkiError> {
        let mut bytes = Encoder::new();
        bytes.write_oid(&known::ocsp_basic())?;
        bytes.write_octet_string(basic_der);
        let mut inner = Encoder::new();
        inner.write_enumerated(OcspResponseStatus::Successful as u32);
        inner.write_explicit(0, &sequence(&bytes.finish()));
        Self::from_der(&sequence(&inner.finish()))
    }

    pub fn to_der(&self) -> &[u8] {
        &self.der
    }

    pub fn status(&self) -> OcspResponseStatus {
        self.status
    }

    pub fn basic(&self) -> Option<&BasicOcspResponse> {
        self.basic.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{key, leaf_cert, root_cert, root_signer, NOW};
    use crate::x509::{OcspResponseBuilder, RsaVerifier, Signer, SigningKey, SingleResponseSpec};
    use hex_literal::hex;

    #[test]
    fn test_cert_id_hashes_issuer_name_and_key() {
        let root = root_cert();
        let leaf = leaf_cert(&root, NOW, NOW + 100);
        let id = CertId::new(&leaf, &root, HashAlgId::Sha1);
        assert_eq!(id.issuer_name_hash, compute_hash(HashAlgId::Sha1, root.subject().der()));
        assert_eq!(
            id.issuer_key_hash,
            compute_hash(HashAlgId::Sha1, root.public_key().key_bytes())
        );
        assert_eq!(id.serial_number, leaf.serial_number());
        let der = id.encode().unwrap();
        assert_eq!(CertId::parse(&mut Decoder::new(&der)).unwrap(), id);
        assert_ne!(CertId::new(&leaf, &root, HashAlgId::Sha256), id);
    }

    #[test]
    fn test_cert_id_unknown_digest() {
        // SEQUENCE { AlgId { 1.2.3 }, OCTET STRING, OCTET STRING, INTEGER 1 }
        let der = hex!("300d300406022a0304000400020101");
        assert!(matches!(
            CertId::parse(&mut Decoder::new(&der)),
            Err(Asn1Error::InvalidOid(_))
        ));
    }

    #[test]
    fn test_request_roundtrip_with_nonce() {
        let root = root_cert();
        let leaf = leaf_cert(&root, NOW, NOW + 100);
        let mut request = OcspRequest::new(CertId::new(&leaf, &root, HashAlgId::Sha256));
        request.set_nonce(vec![1, 2, 3]).set_nonce(vec![9, 9]);
        assert_eq!(request.nonce(), Some(&[9u8, 9][..]));
        let der = request.to_der().unwrap();
        let parsed = OcspRequest::from_der(&der).unwrap();
        assert_eq!(parsed, request);
    }

    #[test]
    fn test_request_without_nonce() {
        let root = root_cert();
        let leaf = leaf_cert(&root, NOW, NOW + 100);
        let request = OcspRequest::new(CertId::new(&leaf, &root, HashAlgId::Sha1));
        let parsed = OcspRequest::from_der(&request.to_der().unwrap()).unwrap();
        assert_eq!(parsed.nonce(), None);
        assert_eq!(parsed.cert_ids.len(), 1);
    }

    #[test]
    fn test_unsuccessful_response() {
        let response = OcspResponse::unsuccessful(OcspResponseStatus::TryLater).unwrap();
        assert_eq!(response.to_der(), hex!("30030a0103"));
        assert_eq!(response.status(), OcspResponseStatus::TryLater);
        assert!(response.basic().is_none());
        assert!(OcspResponse::unsuccessful(OcspResponseStatus::Successful).is_err());
    }

    #[test]
    fn test_unknown_response_status() {
        assert!(matches!(
            OcspResponse::from_der(&hex!("30030a0104")),
            Err(PkiError::InvalidOcsp(_))
        ));
    }

    #[test]
    fn test_successful_response_parse() {
        let root = root_cert();
        let leaf = leaf_cert(&root, NOW, NOW + 100);
        let id = CertId::new(&leaf, &root, HashAlgId::Sha1);
        let response = OcspResponseBuilder::new()
            .responder_id(ResponderId::ByName(root.subject().clone()))
            .produced_at(NOW)
            .add_response(SingleResponseSpec::new(
                id.clone(),
                OcspCertStatus::Revoked {
                    time: Asn1Time::generalized(NOW - 50).unwrap(),
                    reason: Some(RevocationReason::Superseded),
                },
                NOW - 10,
                Some(NOW + 3600),
            ))
            .nonce(vec![7; 16])
            .build(&root_signer())
            .unwrap();

        let parsed = OcspResponse::from_der(response.to_der()).unwrap();
        assert_eq!(parsed.status(), OcspResponseStatus::Successful);
        let basic = parsed.basic().unwrap();
        assert!(basic.responder_id().matches(&root));
        assert!(!basic.responder_id().matches(&leaf));
        assert_eq!(basic.produced_at().timestamp(), NOW);
        assert_eq!(basic.nonce(), Some(vec![7; 16]));
        let single = basic.find(&id).unwrap();
        match &single.status {
            OcspCertStatus::Revoked { time, reason } => {
                assert_eq!(time.timestamp(), NOW - 50);
                assert_eq!(*reason, Some(RevocationReason::Superseded));
            }
            other => panic!("unexpected status {other:?}"),
        }
        assert!(single.is_current(NOW, 0));
        assert!(!single.is_current(NOW + 7200, 0));
        assert!(!single.is_current(NOW - 20, 0));
        assert!(single.is_current(NOW - 20, 15));
        assert!(basic.verify_signature(root.public_key(), &RsaVerifier).is_ok());
        assert_eq!(
            basic.verify_signature(leaf.public_key(), &RsaVerifier),
            Err(CryptoError::SignatureMismatch)
        );
    }

    #[test]
    fn test_responder_by_key_and_embedded_certs() {
        let root = root_cert();
        let leaf = leaf_cert(&root, NOW, NOW + 100);
        let responder = SigningKey::new(key(2).clone(), HashAlgId::Sha256);
        let responder_key = responder.public_key_info().unwrap();
        let response = OcspResponseBuilder::new()
            .responder_id(ResponderId::by_key(&responder_key))
            .produced_at(NOW)
            .add_response(SingleResponseSpec::new(
                CertId::new(&leaf, &root, HashAlgId::Sha256),
                OcspCertStatus::Good,
                NOW,
                None,
            ))
            .add_certificate(leaf.clone())
            .build(&responder)
            .unwrap();
        let basic = response.basic().unwrap();
        assert_eq!(basic.certs(), &[leaf][..]);
        assert!(matches!(basic.responder_id(), ResponderId::ByKey(h) if h.len() == 20));
        assert!(basic.nonce().is_none());
        assert!(basic.verify_signature(&responder_key, &RsaVerifier).is_ok());
        assert_eq!(basic.responses()[0].status, OcspCertStatus::Good);
    }

    #[test]
    fn test_cert_status_unknown_tag() {
        // [3] is not a CertStatus alternative
        let der = hex!("8300");
        assert!(matches!(
            CERT_STATUS.decode(&mut Decoder::new(&der)),
            Err(Asn1Error::UnknownChoiceAlternative { .. })
        ));
    }
}
