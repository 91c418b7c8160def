//! `CertificateBuilder`, `CrlBuilder` and `OcspResponseBuilder`.
//!
//! Each builder collects optional fields through consuming setters and
//! checks them once in `build`, which signs the to-be-signed structure and
//! hands the result back through the regular parser.

use pathkit_types::{Asn1Error, HashAlgId, PkiError};
use pathkit_utils::asn1::{Asn1Time, Encoder};
use pathkit_utils::oid::{known, Oid};

use super::certificate::{encode_extensions, Certificate, Extension, SubjectPublicKeyInfo, Validity};
use super::crl::{encode_certificate_issuer, CertificateRevocationList, RevocationReason};
use super::extensions::{
    BasicConstraints, CertificatePolicies, ExtendedKeyUsage, ExtensionValue, GeneralName,
    KeyUsage, SubjectAltName, SubjectKeyIdentifier,
};
use super::name::DistinguishedName;
use super::ocsp::{CertId, OcspCertStatus, OcspResponse, ResponderId, SingleResponse};
use super::signing::{compute_hash, Signer};

fn missing(field: &str) -> PkiError {
    PkiError::Builder(format!("{field} not set"))
}

fn sequence(contents: &[u8]) -> Vec<u8> {
    let mut out = Encoder::new();
    out.write_sequence(contents);
    out.finish()
}

/// Sign `tbs` and assemble `SEQUENCE { tbs, signatureAlgorithm, signature }`.
fn sign_structure(tbs: &[u8], signer: &dyn Signer) -> Result<Vec<u8>, PkiError> {
    let signature = signer.sign(tbs)?;
    let mut body = Encoder::new();
    body.write_raw(tbs);
    body.write_raw(&signer.signature_algorithm().encode()?);
    body.write_bit_string(0, &signature);
    Ok(sequence(&body.finish()))
}

/// Encode a typed extension, remembering the first failure for `build`.
fn push_extension<T: ExtensionValue>(
    extensions: &mut Vec<Extension>,
    error: &mut Option<Asn1Error>,
    value: &T,
    critical: bool,
) {
    match Extension::new(value, critical) {
        Ok(ext) => extensions.push(ext),
        Err(e) => {
            error.get_or_insert(e);
        }
    }
}

// ---------------------------------------------------------------------------
// Certificate Builder
// ---------------------------------------------------------------------------

/// Builder for X.509 v3 certificates.
#[derive(Debug, Clone, Default)]
pub struct CertificateBuilder {
    serial_number: Option<Vec<u8>>,
    issuer: Option<DistinguishedName>,
    subject: Option<DistinguishedName>,
    validity: Option<(i64, i64)>,
    subject_public_key: Option<SubjectPublicKeyInfo>,
    extensions: Vec<Extension>,
    error: Option<Asn1Error>,
}

impl CertificateBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serial number as unsigned big-endian octets.
    pub fn serial_number(mut self, serial: &[u8]) -> Self {
        self.serial_number = Some(serial.to_vec());
        self
    }

    pub fn issuer(mut self, dn: DistinguishedName) -> Self {
        self.issuer = Some(dn);
        self
    }

    pub fn subject(mut self, dn: DistinguishedName) -> Self {
        self.subject = Some(dn);
        self
    }

    /// Validity window as UNIX timestamps, both ends inclusive.
    pub fn validity(mut self, not_before: i64, not_after: i64) -> Self {
        self.validity = Some((not_before, not_after));
        self
    }

    pub fn subject_public_key(mut self, spki: SubjectPublicKeyInfo) -> Self {
        self.subject_public_key = Some(spki);
        self
    }

    pub fn add_extension(mut self, extension: Extension) -> Self {
        self.extensions.push(extension);
        self
    }

    pub fn add_extension_value<T: ExtensionValue>(mut self, value: &T, critical: bool) -> Self {
        push_extension(&mut self.extensions, &mut self.error, value, critical);
        self
    }

    /// Critical basicConstraints.
    pub fn add_basic_constraints(self, ca: bool, path_len: Option<u32>) -> Self {
        let bc = BasicConstraints {
            ca,
            path_len_constraint: path_len,
        };
        self.add_extension_value(&bc, true)
    }

    /// Critical keyUsage from `KeyUsage::*` flags.
    pub fn add_key_usage(self, usage: u16) -> Self {
        self.add_extension_value(&KeyUsage(usage), true)
    }

    pub fn add_extended_key_usage(self, purposes: &[Oid], critical: bool) -> Self {
        let eku = ExtendedKeyUsage {
            purposes: purposes.to_vec(),
        };
        self.add_extension_value(&eku, critical)
    }

    pub fn add_subject_alt_name_dns(self, dns_names: &[&str]) -> Self {
        let san = SubjectAltName {
            names: dns_names
                .iter()
                .map(|n| GeneralName::DnsName((*n).to_string()))
                .collect(),
        };
        self.add_extension_value(&san, false)
    }

    pub fn add_certificate_policies(self, policies: &[Oid]) -> Self {
        self.add_extension_value(&CertificatePolicies::from_oids(policies), false)
    }

    /// subjectKeyIdentifier derived from the subject key, RFC 5280
    /// §4.2.1.2 method (1). Set the public key first.
    pub fn add_subject_key_identifier(self) -> Self {
        let ski = self
            .subject_public_key
            .as_ref()
            .map(|spki| SubjectKeyIdentifier(compute_hash(HashAlgId::Sha1, spki.key_bytes())));
        match ski {
            Some(ski) => self.add_extension_value(&ski, false),
            None => self,
        }
    }

    /// Build and sign the certificate.
    pub fn build(self, signer: &dyn Signer) -> Result<Certificate, PkiError> {
        let serial = self.serial_number.ok_or_else(|| missing("serial number"))?;
        let issuer = self.issuer.ok_or_else(|| missing("issuer"))?;
        let subject = self.subject.ok_or_else(|| missing("subject"))?;
        let (not_before, not_after) = self.validity.ok_or_else(|| missing("validity"))?;
        let spki = self
            .subject_public_key
            .ok_or_else(|| missing("subject public key"))?;
        if let Some(e) = self.error {
            return Err(e.into());
        }
        if serial.is_empty() {
            return Err(PkiError::Builder("empty serial number".into()));
        }
        if issuer.is_empty() {
            return Err(PkiError::Builder("empty issuer name".into()));
        }
        if not_after < not_before {
            return Err(PkiError::Builder("notAfter precedes notBefore".into()));
        }

        let mut tbs = Encoder::new();
        // version [0] EXPLICIT INTEGER v3 (2)
        let mut version = Encoder::new();
        version.write_u64(2);
        tbs.write_explicit(0, &version.finish());
        tbs.write_integer(&serial);
        tbs.write_raw(&signer.signature_algorithm().encode()?);
        tbs.write_raw(issuer.der());
        tbs.write_raw(&Validity::from_timestamps(not_before, not_after)?.encode()?);
        tbs.write_raw(subject.der());
        tbs.write_raw(spki.der());
        if !self.extensions.is_empty() {
            tbs.write_explicit(3, &encode_extensions(&self.extensions)?);
        }

        let der = sign_structure(&sequence(&tbs.finish()), signer)?;
        Certificate::from_der(&der)
    }

    /// A self-signed CA certificate with keyCertSign and cRLSign. The serial
    /// number is derived from the public key.
    pub fn self_signed(
        subject: DistinguishedName,
        signer: &dyn Signer,
        not_before: i64,
        not_after: i64,
    ) -> Result<Certificate, PkiError> {
        let spki = signer.public_key_info()?;
        let mut serial = compute_hash(HashAlgId::Sha256, spki.key_bytes());
        serial.truncate(16);
        serial[0] &= 0x7f;

        CertificateBuilder::new()
            .serial_number(&serial)
            .issuer(subject.clone())
            .subject(subject)
            .validity(not_before, not_after)
            .subject_public_key(spki)
            .add_basic_constraints(true, None)
            .add_key_usage(KeyUsage::KEY_CERT_SIGN | KeyUsage::CRL_SIGN)
            .add_subject_key_identifier()
            .build(signer)
    }
}

// ---------------------------------------------------------------------------
// CRL Builder
// ---------------------------------------------------------------------------

/// One revoked certificate for [`CrlBuilder`].
#[derive(Debug, Clone)]
pub struct RevokedEntry {
    serial_number: Vec<u8>,
    revocation_date: i64,
    reason: Option<RevocationReason>,
    invalidity_date: Option<i64>,
    certificate_issuer: Option<Vec<GeneralName>>,
}

impl RevokedEntry {
    pub fn new(serial_number: &[u8], revocation_date: i64) -> Self {
        RevokedEntry {
            serial_number: serial_number.to_vec(),
            revocation_date,
            reason: None,
            invalidity_date: None,
            certificate_issuer: None,
        }
    }

    pub fn reason(mut self, reason: RevocationReason) -> Self {
        self.reason = Some(reason);
        self
    }

    pub fn invalidity_date(mut self, time: i64) -> Self {
        self.invalidity_date = Some(time);
        self
    }

    /// Start a run of entries for another issuer in an indirect CRL.
    pub fn certificate_issuer(mut self, names: Vec<GeneralName>) -> Self {
        self.certificate_issuer = Some(names);
        self
    }

    fn encode(&self) -> Result<Vec<u8>, PkiError> {
        let mut extensions = Vec::new();
        if let Some(reason) = self.reason {
            extensions.push(Extension {
                oid: known::crl_reason(),
                critical: false,
                value: reason.encode_enumerated(),
            });
        }
        if let Some(time) = self.invalidity_date {
            let mut value = Encoder::new();
            value.write_generalized_time(time)?;
            extensions.push(Extension {
                oid: known::invalidity_date(),
                critical: false,
                value: value.finish(),
            });
        }
        if let Some(names) = &self.certificate_issuer {
            // RFC 5280 §5.3.3: MUST be critical
            extensions.push(Extension {
                oid: known::certificate_issuer(),
                critical: true,
                value: encode_certificate_issuer(names)?,
            });
        }

        let mut inner = Encoder::new();
        inner.write_integer(&self.serial_number);
        inner.write_x509_time(self.revocation_date)?;
        if !extensions.is_empty() {
            inner.write_raw(&encode_extensions(&extensions)?);
        }
        Ok(sequence(&inner.finish()))
    }
}

/// Builder for v2 CRLs.
#[derive(Debug, Clone, Default)]
pub struct CrlBuilder {
    issuer: Option<DistinguishedName>,
    this_update: Option<i64>,
    next_update: Option<i64>,
    crl_number: Option<u64>,
    revoked: Vec<RevokedEntry>,
    extensions: Vec<Extension>,
    error: Option<Asn1Error>,
}

impl CrlBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issuer(mut self, dn: DistinguishedName) -> Self {
        self.issuer = Some(dn);
        self
    }

    pub fn this_update(mut self, time: i64) -> Self {
        self.this_update = Some(time);
        self
    }

    pub fn next_update(mut self, time: i64) -> Self {
        self.next_update = Some(time);
        self
    }

    pub fn crl_number(mut self, number: u64) -> Self {
        self.crl_number = Some(number);
        self
    }

    pub fn add_revoked(mut self, entry: RevokedEntry) -> Self {
        self.revoked.push(entry);
        self
    }

    pub fn add_extension(mut self, extension: Extension) -> Self {
        self.extensions.push(extension);
        self
    }

    pub fn add_extension_value<T: ExtensionValue>(mut self, value: &T, critical: bool) -> Self {
        push_extension(&mut self.extensions, &mut self.error, value, critical);
        self
    }

    pub fn build(self, signer: &dyn Signer) -> Result<CertificateRevocationList, PkiError> {
        let issuer = self.issuer.ok_or_else(|| missing("issuer"))?;
        let this_update = self.this_update.ok_or_else(|| missing("thisUpdate"))?;
        if let Some(e) = self.error {
            return Err(e.into());
        }
        if issuer.is_empty() {
            return Err(PkiError::Builder("empty issuer name".into()));
        }
        if matches!(self.next_update, Some(next) if next < this_update) {
            return Err(PkiError::Builder("nextUpdate precedes thisUpdate".into()));
        }

        let mut extensions = Vec::with_capacity(self.extensions.len() + 1);
        if let Some(number) = self.crl_number {
            let mut value = Encoder::new();
            value.write_u64(number);
            extensions.push(Extension {
                oid: known::crl_number(),
                critical: false,
                value: value.finish(),
            });
        }
        extensions.extend(self.extensions);

        let mut tbs = Encoder::new();
        // version v2 (1)
        tbs.write_u64(1);
        tbs.write_raw(&signer.signature_algorithm().encode()?);
        tbs.write_raw(issuer.der());
        tbs.write_x509_time(this_update)?;
        if let Some(next) = self.next_update {
            tbs.write_x509_time(next)?;
        }
        if !self.revoked.is_empty() {
            let mut list = Encoder::new();
            for entry in &self.revoked {
                list.write_raw(&entry.encode()?);
            }
            tbs.write_sequence(&list.finish());
        }
        if !extensions.is_empty() {
            tbs.write_explicit(0, &encode_extensions(&extensions)?);
        }

        let der = sign_structure(&sequence(&tbs.finish()), signer)?;
        CertificateRevocationList::from_der(&der)
    }
}

// ---------------------------------------------------------------------------
// OCSP Response Builder
// ---------------------------------------------------------------------------

/// One certificate status for [`OcspResponseBuilder`].
#[derive(Debug, Clone)]
pub struct SingleResponseSpec {
    pub cert_id: CertId,
    pub status: OcspCertStatus,
    pub this_update: i64,
    pub next_update: Option<i64>,
}

impl SingleResponseSpec {
    pub fn new(
        cert_id: CertId,
        status: OcspCertStatus,
        this_update: i64,
        next_update: Option<i64>,
    ) -> Self {
        SingleResponseSpec {
            cert_id,
            status,
            this_update,
            next_update,
        }
    }

    fn to_response(&self) -> Result<SingleResponse, PkiError> {
        if matches!(self.next_update, Some(next) if next < self.this_update) {
            return Err(PkiError::Builder("nextUpdate precedes thisUpdate".into()));
        }
        Ok(SingleResponse {
            cert_id: self.cert_id.clone(),
            status: self.status.clone(),
            this_update: Asn1Time::generalized(self.this_update)?,
            next_update: self.next_update.map(Asn1Time::generalized).transpose()?,
            extensions: Vec::new(),
        })
    }
}

/// Builder for signed, successful OCSP responses.
#[derive(Debug, Clone, Default)]
pub struct OcspResponseBuilder {
    responder_id: Option<ResponderId>,
    produced_at: Option<i64>,
    responses: Vec<SingleResponseSpec>,
    nonce: Option<Vec<u8>>,
    certs: Vec<Certificate>,
}

impl OcspResponseBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn responder_id(mut self, id: ResponderId) -> Self {
        self.responder_id = Some(id);
        self
    }

    pub fn produced_at(mut self, time: i64) -> Self {
        self.produced_at = Some(time);
        self
    }

    pub fn add_response(mut self, response: SingleResponseSpec) -> Self {
        self.responses.push(response);
        self
    }

    /// Echo a request nonce.
    pub fn nonce(mut self, nonce: Vec<u8>) -> Self {
        self.nonce = Some(nonce);
        self
    }

    /// Attach a certificate, e.g. the delegated responder's own.
    pub fn add_certificate(mut self, cert: Certificate) -> Self {
        self.certs.push(cert);
        self
    }

    pub fn build(self, signer: &dyn Signer) -> Result<OcspResponse, PkiError> {
        let responder_id = self.responder_id.ok_or_else(|| missing("responder id"))?;
        let produced_at = self.produced_at.ok_or_else(|| missing("producedAt"))?;
        if self.responses.is_empty() {
            return Err(PkiError::Builder("no single responses".into()));
        }

        let mut list = Encoder::new();
        for response in &self.responses {
            list.write_raw(&response.to_response()?.encode()?);
        }
        let mut data = Encoder::new();
        data.write_raw(&responder_id.encode());
        data.write_generalized_time(produced_at)?;
        data.write_sequence(&list.finish());
        if let Some(nonce) = &self.nonce {
            let mut value = Encoder::new();
            value.write_octet_string(nonce);
            let ext = Extension {
                oid: known::ocsp_nonce(),
                critical: false,
                value: value.finish(),
            };
            data.write_explicit(1, &encode_extensions(&[ext])?);
        }
        let tbs = sequence(&data.finish());

        let signature = signer.sign(&tbs)?;
        let mut body = Encoder::new();
        body.write_raw(&tbs);
        body.write_raw(&signer.signature_algorithm().encode()?);
        body.write_bit_string(0, &signature);
        if !self.certs.is_empty() {
            let mut certs = Encoder::new();
            for cert in &self.certs {
                certs.write_raw(cert.to_der());
            }
            body.write_explicit(0, &sequence(&certs.finish()));
        }
        OcspResponse::successful(&sequence(&body.finish()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{key, name, root_cert, root_signer, NOW};
    use crate::x509::SigningKey;

    fn leaf_builder() -> CertificateBuilder {
        let spki = SigningKey::new(key(1).clone(), HashAlgId::Sha256)
            .public_key_info()
            .unwrap();
        CertificateBuilder::new()
            .serial_number(&[0x01, 0x02])
            .issuer(root_cert().subject().clone())
            .subject(name("Builder Leaf"))
            .validity(NOW, NOW + 86_400)
            .subject_public_key(spki)
    }

    #[test]
    fn test_certificate_builder_fields() {
        let cert = leaf_builder()
            .add_subject_alt_name_dns(&["a.example", "b.example"])
            .add_extended_key_usage(&[known::kp_server_auth()], false)
            .add_subject_key_identifier()
            .build(&root_signer())
            .unwrap();
        assert_eq!(cert.version(), 3);
        assert_eq!(cert.serial_number(), &[0x01, 0x02]);
        assert_eq!(cert.serial_hex(), "0102");
        assert_eq!(cert.subject().common_name(), Some("Builder Leaf"));
        let san = cert.subject_alt_name().unwrap().unwrap();
        assert_eq!(san.dns_names().collect::<Vec<_>>(), ["a.example", "b.example"]);
        assert!(cert
            .extended_key_usage()
            .unwrap()
            .unwrap()
            .contains(&known::kp_server_auth()));
        let ski = cert.subject_key_identifier().unwrap().unwrap();
        assert_eq!(ski.0.len(), 20);
    }

    #[test]
    fn test_certificate_builder_missing_fields() {
        let err = CertificateBuilder::new().build(&root_signer()).unwrap_err();
        assert_eq!(err, PkiError::Builder("serial number not set".into()));
        let err = CertificateBuilder::new()
            .serial_number(&[1])
            .issuer(name("I"))
            .subject(name("S"))
            .validity(NOW, NOW + 1)
            .build(&root_signer())
            .unwrap_err();
        assert_eq!(err, PkiError::Builder("subject public key not set".into()));
    }

    #[test]
    fn test_certificate_builder_inverted_validity() {
        let err = leaf_builder()
            .validity(NOW + 10, NOW)
            .build(&root_signer())
            .unwrap_err();
        assert_eq!(err, PkiError::Builder("notAfter precedes notBefore".into()));
    }

    #[test]
    fn test_certificate_builder_bad_extension_value() {
        // PolicyConstraints with neither field is not encodable
        let err = leaf_builder()
            .add_extension_value(&crate::x509::PolicyConstraints::default(), true)
            .build(&root_signer())
            .unwrap_err();
        assert!(matches!(err, PkiError::Asn1(_)));
    }

    #[test]
    fn test_self_signed_ca() {
        let signer = SigningKey::new(key(4).clone(), HashAlgId::Sha384);
        let cert =
            CertificateBuilder::self_signed(name("Self CA"), &signer, NOW, NOW + 3600).unwrap();
        assert!(cert.is_self_signed());
        assert!(cert.is_ca());
        assert_eq!(cert.serial_number().len(), 16);
        assert!(cert.serial_number()[0] < 0x80);
        assert_eq!(
            cert.signature_algorithm().oid,
            known::sha384_with_rsa_encryption()
        );
    }

    #[test]
    fn test_crl_builder_rejects_inverted_window() {
        let err = CrlBuilder::new()
            .issuer(name("CA"))
            .this_update(NOW)
            .next_update(NOW - 1)
            .build(&root_signer())
            .unwrap_err();
        assert_eq!(err, PkiError::Builder("nextUpdate precedes thisUpdate".into()));
        let err = CrlBuilder::new().issuer(name("CA")).build(&root_signer()).unwrap_err();
        assert_eq!(err, PkiError::Builder("thisUpdate not set".into()));
    }

    #[test]
    fn test_crl_builder_certificate_issuer_is_critical() {
        let crl = CrlBuilder::new()
            .issuer(name("CA"))
            .this_update(NOW)
            .add_revoked(
                RevokedEntry::new(&[5], NOW)
                    .certificate_issuer(vec![GeneralName::DirectoryName(name("Other"))]),
            )
            .build(&root_signer())
            .unwrap();
        let entry = &crl.revoked_certificates()[0];
        assert!(entry.extensions[0].critical);
        assert_eq!(
            entry.certificate_issuer,
            Some(vec![GeneralName::DirectoryName(name("Other"))])
        );
    }

    #[test]
    fn test_ocsp_builder_requires_responses() {
        let err = OcspResponseBuilder::new()
            .responder_id(ResponderId::ByName(name("R")))
            .produced_at(NOW)
            .build(&root_signer())
            .unwrap_err();
        assert_eq!(err, PkiError::Builder("no single responses".into()));
    }
}
