//! OID (Object Identifier) management.

use pathkit_types::Asn1Error;
use std::fmt;
use std::str::FromStr;

/// A parsed OID represented as a sequence of arc values.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Oid {
    arcs: Vec<u64>,
}

impl Oid {
    /// Create an OID from a slice of arc values.
    pub fn new(arcs: &[u64]) -> Self {
        Self {
            arcs: arcs.to_vec(),
        }
    }

    /// Return the arc values.
    pub fn arcs(&self) -> &[u64] {
        &self.arcs
    }

    /// True if `self` equals `prefix` or lies beneath it.
    pub fn starts_with(&self, prefix: &[u64]) -> bool {
        self.arcs.starts_with(prefix)
    }

    /// Encode this OID to DER content octets (no tag or length).
    ///
    /// Fails if the OID has fewer than two arcs or its first two arcs are
    /// out of range (first arc above 2, or second arc above 39 under 0 or 1).
    pub fn to_der_value(&self) -> Result<Vec<u8>, Asn1Error> {
        check_arcs(&self.arcs)?;
        let first = self.arcs[0]
            .checked_mul(40)
            .and_then(|v| v.checked_add(self.arcs[1]))
            .ok_or(Asn1Error::IntegerOverflow)?;
        let mut buf = Vec::with_capacity(self.arcs.len() + 4);
        encode_subidentifier(&mut buf, first);
        for &arc in &self.arcs[2..] {
            encode_subidentifier(&mut buf, arc);
        }
        Ok(buf)
    }

    /// Parse an OID from DER content octets.
    ///
    /// The first subidentifier packs the first two arcs as `40 * a1 + a2`
    /// and may itself span several octets (e.g. `2.999`). Subidentifiers
    /// with a leading `0x80` octet are not minimal and are rejected.
    pub fn from_der_value(data: &[u8]) -> Result<Self, Asn1Error> {
        if data.is_empty() {
            return Err(Asn1Error::malformed(0, "empty object identifier"));
        }
        let mut arcs = Vec::new();
        let mut i = 0;
        while i < data.len() {
            let (value, used) = decode_subidentifier(&data[i..], i)?;
            if i == 0 {
                let (a1, a2) = match value {
                    0..=39 => (0, value),
                    40..=79 => (1, value - 40),
                    _ => (2, value - 80),
                };
                arcs.push(a1);
                arcs.push(a2);
            } else {
                arcs.push(value);
            }
            i += used;
        }
        Ok(Self { arcs })
    }

    /// Return the dotted-string representation (e.g., "1.2.840.113549.1.1.1").
    pub fn to_dot_string(&self) -> String {
        self.arcs
            .iter()
            .map(|a| a.to_string())
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Short name from the built-in table, if this OID is well known.
    pub fn name(&self) -> Option<&'static str> {
        known::name_of(self)
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_dot_string())
    }
}

impl FromStr for Oid {
    type Err = Asn1Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let arcs = s
            .split('.')
            .map(|part| {
                if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(Asn1Error::InvalidOid(s.to_string()));
                }
                if part.len() > 1 && part.starts_with('0') {
                    return Err(Asn1Error::InvalidOid(s.to_string()));
                }
                part.parse::<u64>()
                    .map_err(|_| Asn1Error::InvalidOid(s.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        check_arcs(&arcs).map_err(|_| Asn1Error::InvalidOid(s.to_string()))?;
        Ok(Self { arcs })
    }
}

impl PartialEq<[u64]> for Oid {
    fn eq(&self, other: &[u64]) -> bool {
        self.arcs == other
    }
}

fn check_arcs(arcs: &[u64]) -> Result<(), Asn1Error> {
    let text = || arcs.iter().map(|a| a.to_string()).collect::<Vec<_>>().join(".");
    match arcs {
        [a1, a2, ..] if *a1 < 2 && *a2 < 40 => Ok(()),
        [2, _, ..] => Ok(()),
        _ => Err(Asn1Error::InvalidOid(text())),
    }
}

fn encode_subidentifier(buf: &mut Vec<u8>, mut value: u64) {
    let mut groups = [0u8; 10];
    let mut n = 0;
    loop {
        groups[n] = (value & 0x7F) as u8;
        value >>= 7;
        n += 1;
        if value == 0 {
            break;
        }
    }
    for i in (0..n).rev() {
        let cont = if i > 0 { 0x80 } else { 0x00 };
        buf.push(groups[i] | cont);
    }
}

fn decode_subidentifier(data: &[u8], offset: usize) -> Result<(u64, usize), Asn1Error> {
    if data[0] == 0x80 {
        return Err(Asn1Error::malformed(offset, "non-minimal OID subidentifier"));
    }
    let mut value: u64 = 0;
    for (i, &byte) in data.iter().enumerate() {
        if value > (u64::MAX >> 7) {
            return Err(Asn1Error::malformed(offset + i, "OID arc too large"));
        }
        value = (value << 7) | (byte & 0x7F) as u64;
        if (byte & 0x80) == 0 {
            return Ok((value, i + 1));
        }
    }
    Err(Asn1Error::TruncatedInput {
        offset: offset + data.len(),
    })
}

/// Well-known OIDs and the process-wide name table.
pub mod known {
    use super::Oid;

    // Signature and key algorithms
    pub fn rsa_encryption() -> Oid {
        Oid::new(&[1, 2, 840, 113549, 1, 1, 1])
    }
    pub fn sha1_with_rsa_encryption() -> Oid {
        Oid::new(&[1, 2, 840, 113549, 1, 1, 5])
    }
    pub fn sha256_with_rsa_encryption() -> Oid {
        Oid::new(&[1, 2, 840, 113549, 1, 1, 11])
    }
    pub fn sha384_with_rsa_encryption() -> Oid {
        Oid::new(&[1, 2, 840, 113549, 1, 1, 12])
    }
    pub fn sha512_with_rsa_encryption() -> Oid {
        Oid::new(&[1, 2, 840, 113549, 1, 1, 13])
    }
    pub fn ec_public_key() -> Oid {
        Oid::new(&[1, 2, 840, 10045, 2, 1])
    }
    pub fn ed25519() -> Oid {
        Oid::new(&[1, 3, 101, 112])
    }

    // Digests
    pub fn sha1() -> Oid {
        Oid::new(&[1, 3, 14, 3, 2, 26])
    }
    pub fn sha256() -> Oid {
        Oid::new(&[2, 16, 840, 1, 101, 3, 4, 2, 1])
    }
    pub fn sha384() -> Oid {
        Oid::new(&[2, 16, 840, 1, 101, 3, 4, 2, 2])
    }
    pub fn sha512() -> Oid {
        Oid::new(&[2, 16, 840, 1, 101, 3, 4, 2, 3])
    }

    // X.509 extensions (RFC 5280)
    pub fn subject_key_identifier() -> Oid {
        Oid::new(&[2, 5, 29, 14])
    }
    pub fn key_usage() -> Oid {
        Oid::new(&[2, 5, 29, 15])
    }
    pub fn subject_alt_name() -> Oid {
        Oid::new(&[2, 5, 29, 17])
    }
    pub fn issuer_alt_name() -> Oid {
        Oid::new(&[2, 5, 29, 18])
    }
    pub fn basic_constraints() -> Oid {
        Oid::new(&[2, 5, 29, 19])
    }
    pub fn crl_number() -> Oid {
        Oid::new(&[2, 5, 29, 20])
    }
    pub fn crl_reason() -> Oid {
        Oid::new(&[2, 5, 29, 21])
    }
    pub fn invalidity_date() -> Oid {
        Oid::new(&[2, 5, 29, 24])
    }
    pub fn delta_crl_indicator() -> Oid {
        Oid::new(&[2, 5, 29, 27])
    }
    pub fn issuing_distribution_point() -> Oid {
        Oid::new(&[2, 5, 29, 28])
    }
    pub fn certificate_issuer() -> Oid {
        Oid::new(&[2, 5, 29, 29])
    }
    pub fn name_constraints() -> Oid {
        Oid::new(&[2, 5, 29, 30])
    }
    pub fn crl_distribution_points() -> Oid {
        Oid::new(&[2, 5, 29, 31])
    }
    pub fn certificate_policies() -> Oid {
        Oid::new(&[2, 5, 29, 32])
    }
    pub fn policy_mappings() -> Oid {
        Oid::new(&[2, 5, 29, 33])
    }
    pub fn authority_key_identifier() -> Oid {
        Oid::new(&[2, 5, 29, 35])
    }
    pub fn policy_constraints() -> Oid {
        Oid::new(&[2, 5, 29, 36])
    }
    pub fn ext_key_usage() -> Oid {
        Oid::new(&[2, 5, 29, 37])
    }
    pub fn inhibit_any_policy() -> Oid {
        Oid::new(&[2, 5, 29, 54])
    }
    pub fn authority_info_access() -> Oid {
        Oid::new(&[1, 3, 6, 1, 5, 5, 7, 1, 1])
    }
    pub fn any_policy() -> Oid {
        Oid::new(&[2, 5, 29, 32, 0])
    }
    pub fn any_extended_key_usage() -> Oid {
        Oid::new(&[2, 5, 29, 37, 0])
    }

    // Key purposes and access methods
    pub fn kp_server_auth() -> Oid {
        Oid::new(&[1, 3, 6, 1, 5, 5, 7, 3, 1])
    }
    pub fn kp_client_auth() -> Oid {
        Oid::new(&[1, 3, 6, 1, 5, 5, 7, 3, 2])
    }
    pub fn kp_ocsp_signing() -> Oid {
        Oid::new(&[1, 3, 6, 1, 5, 5, 7, 3, 9])
    }
    pub fn ad_ocsp() -> Oid {
        Oid::new(&[1, 3, 6, 1, 5, 5, 7, 48, 1])
    }
    pub fn ad_ca_issuers() -> Oid {
        Oid::new(&[1, 3, 6, 1, 5, 5, 7, 48, 2])
    }

    // OCSP (RFC 6960)
    pub fn ocsp_basic() -> Oid {
        Oid::new(&[1, 3, 6, 1, 5, 5, 7, 48, 1, 1])
    }
    pub fn ocsp_nonce() -> Oid {
        Oid::new(&[1, 3, 6, 1, 5, 5, 7, 48, 1, 2])
    }
    pub fn ocsp_no_check() -> Oid {
        Oid::new(&[1, 3, 6, 1, 5, 5, 7, 48, 1, 5])
    }

    // DN attribute types (X.520)
    pub fn common_name() -> Oid {
        Oid::new(&[2, 5, 4, 3])
    }
    pub fn country_name() -> Oid {
        Oid::new(&[2, 5, 4, 6])
    }
    pub fn organization_name() -> Oid {
        Oid::new(&[2, 5, 4, 10])
    }
    pub fn organizational_unit_name() -> Oid {
        Oid::new(&[2, 5, 4, 11])
    }
    pub fn email_address() -> Oid {
        Oid::new(&[1, 2, 840, 113549, 1, 9, 1])
    }

    /// Immutable name table, searched linearly. Entries are unique by OID.
    static NAMES: &[(&[u64], &str)] = &[
        (&[2, 5, 4, 3], "CN"),
        (&[2, 5, 4, 4], "SN"),
        (&[2, 5, 4, 5], "serialNumber"),
        (&[2, 5, 4, 6], "C"),
        (&[2, 5, 4, 7], "L"),
        (&[2, 5, 4, 8], "ST"),
        (&[2, 5, 4, 9], "street"),
        (&[2, 5, 4, 10], "O"),
        (&[2, 5, 4, 11], "OU"),
        (&[2, 5, 4, 12], "title"),
        (&[2, 5, 4, 42], "GN"),
        (&[2, 5, 4, 46], "dnQualifier"),
        (&[0, 9, 2342, 19200300, 100, 1, 25], "DC"),
        (&[0, 9, 2342, 19200300, 100, 1, 1], "UID"),
        (&[1, 2, 840, 113549, 1, 9, 1], "emailAddress"),
        (&[1, 2, 840, 113549, 1, 1, 1], "rsaEncryption"),
        (&[1, 2, 840, 113549, 1, 1, 5], "sha1WithRSAEncryption"),
        (&[1, 2, 840, 113549, 1, 1, 10], "RSASSA-PSS"),
        (&[1, 2, 840, 113549, 1, 1, 11], "sha256WithRSAEncryption"),
        (&[1, 2, 840, 113549, 1, 1, 12], "sha384WithRSAEncryption"),
        (&[1, 2, 840, 113549, 1, 1, 13], "sha512WithRSAEncryption"),
        (&[1, 2, 840, 10045, 2, 1], "id-ecPublicKey"),
        (&[1, 2, 840, 10045, 4, 3, 2], "ecdsa-with-SHA256"),
        (&[1, 2, 840, 10045, 4, 3, 3], "ecdsa-with-SHA384"),
        (&[1, 3, 101, 112], "Ed25519"),
        (&[1, 3, 14, 3, 2, 26], "SHA1"),
        (&[2, 16, 840, 1, 101, 3, 4, 2, 1], "SHA256"),
        (&[2, 16, 840, 1, 101, 3, 4, 2, 2], "SHA384"),
        (&[2, 16, 840, 1, 101, 3, 4, 2, 3], "SHA512"),
        (&[2, 5, 29, 14], "subjectKeyIdentifier"),
        (&[2, 5, 29, 15], "keyUsage"),
        (&[2, 5, 29, 17], "subjectAltName"),
        (&[2, 5, 29, 18], "issuerAltName"),
        (&[2, 5, 29, 19], "basicConstraints"),
        (&[2, 5, 29, 20], "cRLNumber"),
        (&[2, 5, 29, 21], "cRLReason"),
        (&[2, 5, 29, 24], "invalidityDate"),
        (&[2, 5, 29, 27], "deltaCRLIndicator"),
        (&[2, 5, 29, 28], "issuingDistributionPoint"),
        (&[2, 5, 29, 29], "certificateIssuer"),
        (&[2, 5, 29, 30], "nameConstraints"),
        (&[2, 5, 29, 31], "cRLDistributionPoints"),
        (&[2, 5, 29, 32], "certificatePolicies"),
        (&[2, 5, 29, 32, 0], "anyPolicy"),
        (&[2, 5, 29, 33], "policyMappings"),
        (&[2, 5, 29, 35], "authorityKeyIdentifier"),
        (&[2, 5, 29, 36], "policyConstraints"),
        (&[2, 5, 29, 37], "extKeyUsage"),
        (&[2, 5, 29, 37, 0], "anyExtendedKeyUsage"),
        (&[2, 5, 29, 54], "inhibitAnyPolicy"),
        (&[1, 3, 6, 1, 5, 5, 7, 1, 1], "authorityInfoAccess"),
        (&[1, 3, 6, 1, 5, 5, 7, 3, 1], "serverAuth"),
        (&[1, 3, 6, 1, 5, 5, 7, 3, 2], "clientAuth"),
        (&[1, 3, 6, 1, 5, 5, 7, 3, 9], "OCSPSigning"),
        (&[1, 3, 6, 1, 5, 5, 7, 48, 1], "ocsp"),
        (&[1, 3, 6, 1, 5, 5, 7, 48, 1, 1], "basicOCSPResponse"),
        (&[1, 3, 6, 1, 5, 5, 7, 48, 1, 2], "ocspNonce"),
        (&[1, 3, 6, 1, 5, 5, 7, 48, 1, 5], "ocspNoCheck"),
        (&[1, 3, 6, 1, 5, 5, 7, 48, 2], "caIssuers"),
    ];

    /// Look up the short name of a well-known OID.
    pub fn name_of(oid: &Oid) -> Option<&'static str> {
        NAMES
            .iter()
            .find(|(arcs, _)| oid.arcs() == *arcs)
            .map(|(_, name)| *name)
    }

    /// Reverse lookup by short name (case-sensitive).
    pub fn from_name(name: &str) -> Option<Oid> {
        NAMES
            .iter()
            .find(|(_, n)| *n == name)
            .map(|(arcs, _)| Oid::new(arcs))
    }

    /// Map a well-known DN attribute OID to its short name.
    pub fn oid_to_dn_short_name(oid: &Oid) -> Option<&'static str> {
        let is_attr = oid.starts_with(&[2, 5, 4])
            || oid.starts_with(&[0, 9, 2342, 19200300, 100, 1])
            || oid.starts_with(&[1, 2, 840, 113549, 1, 9]);
        if is_attr {
            name_of(oid)
        } else {
            None
        }
    }
}
