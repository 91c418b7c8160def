//! Integration tests for pathkit.
//! Cross-crate scenarios: PEM in, path building, revocation, reports out.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pathkit_pki::cert_store::CertStore;
    use pathkit_pki::path::{CancellationToken, PathBuilder, PathValidator, ValidationParameters};
    use pathkit_pki::revocation::{CrlChecker, CrlStore, OcspChecker, OcspResponder};
    use pathkit_pki::x509::{
        parse_crls_pem, CertId, Certificate, CertificateBuilder, CrlBuilder, DistinguishedName,
        KeyUsage, OcspCertStatus, OcspRequest, OcspResponse, OcspResponseBuilder,
        OcspResponseStatus, ResponderId, RevocationReason, RevokedEntry, Signer,
        SingleResponseSpec, SigningKey,
    };
    use pathkit_types::{HashAlgId, PkiError};
    use pathkit_utils::asn1::{Asn1Value, EncodingRules};
    use pathkit_utils::oid::known;
    use rand_chacha::rand_core::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    const NOW: i64 = 1_700_000_000;
    const DAY: i64 = 86_400;
    const YEAR: i64 = 365 * DAY;

    fn key(seed: u64) -> SigningKey {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        SigningKey::generate(&mut rng, 1024, HashAlgId::Sha256).unwrap()
    }

    fn name(cn: &str) -> DistinguishedName {
        DistinguishedName::new(&[(known::common_name(), cn)]).unwrap()
    }

    struct Pki {
        root_key: SigningKey,
        ca_key: SigningKey,
        root: Certificate,
        ca: Certificate,
        leaf: Certificate,
    }

    fn pki() -> Pki {
        let root_key = key(1);
        let ca_key = key(2);
        let leaf_key = key(3);
        let root =
            CertificateBuilder::self_signed(name("Interop Root"), &root_key, NOW - YEAR, NOW + YEAR)
                .unwrap();
        let ca = CertificateBuilder::new()
            .serial_number(&[0x02])
            .issuer(root.subject().clone())
            .subject(name("Interop CA"))
            .validity(NOW - YEAR, NOW + YEAR)
            .subject_public_key(ca_key.public_key_info().unwrap())
            .add_basic_constraints(true, Some(0))
            .add_key_usage(KeyUsage::KEY_CERT_SIGN | KeyUsage::CRL_SIGN)
            .build(&root_key)
            .unwrap();
        let leaf = CertificateBuilder::new()
            .serial_number(&[0x30, 0x39])
            .issuer(ca.subject().clone())
            .subject(name("interop.example"))
            .validity(NOW - DAY, NOW + DAY * 90)
            .subject_public_key(leaf_key.public_key_info().unwrap())
            .add_key_usage(KeyUsage::DIGITAL_SIGNATURE)
            .add_subject_alt_name_dns(&["interop.example"])
            .add_extended_key_usage(&[known::kp_server_auth()], false)
            .build(&ca_key)
            .unwrap();
        Pki {
            root_key,
            ca_key,
            root,
            ca,
            leaf,
        }
    }

    fn base_params(pki: &Pki) -> ValidationParameters {
        let mut params = ValidationParameters::new();
        params
            .add_trusted_cert(pki.root.clone())
            .set_validation_time(NOW);
        params
    }

    fn crl(pki: &Pki, revoked: &[&Certificate]) -> pathkit_pki::x509::CertificateRevocationList {
        let mut builder = CrlBuilder::new()
            .issuer(pki.ca.subject().clone())
            .this_update(NOW - DAY)
            .next_update(NOW + 7 * DAY)
            .crl_number(7);
        for cert in revoked {
            builder = builder.add_revoked(
                RevokedEntry::new(cert.serial_number(), NOW - 3600)
                    .reason(RevocationReason::KeyCompromise),
            );
        }
        builder.build(&pki.ca_key).unwrap()
    }

    type Handler = dyn Fn(&OcspRequest) -> Result<OcspResponse, PkiError> + Send + Sync;

    /// Answers from memory after a DER round trip of request and response,
    /// as a transport would.
    struct InProcessResponder(Box<Handler>);

    impl OcspResponder for InProcessResponder {
        fn query(&self, request: &OcspRequest) -> Result<OcspResponse, PkiError> {
            let request = OcspRequest::from_der(&request.to_der()?)?;
            let response = (self.0)(&request)?;
            OcspResponse::from_der(response.to_der())
        }
    }

    // -------------------------------------------------------
    // 1. PEM bundle -> store -> built and validated path
    // -------------------------------------------------------
    #[test]
    fn test_pem_bundle_path_building() {
        let pki = pki();
        let bundle = format!("{}{}", pki.ca.to_pem(), pki.root.to_pem());
        let store = CertStore::from_pem(&bundle).unwrap();
        assert_eq!(store.len(), 2);

        let leaf = Certificate::from_pem(&pki.leaf.to_pem()).unwrap();
        let mut params = base_params(&pki);
        params
            .add_cert_store(Arc::new(store))
            .add_acceptable_purpose(known::kp_server_auth());

        let built = PathBuilder::new(&params).build(&leaf).unwrap();
        let text = built.result.report.render();
        assert!(built.is_valid(), "{text}");
        assert_eq!(built.certificates.len(), 2);
        assert_eq!(built.certificates[1].subject(), pki.ca.subject());
        assert!(text.ends_with("certification path accepted\n"));
        assert!(built.result.working_public_key.is_some());
    }

    // -------------------------------------------------------
    // 2. CRL via PEM, revoked leaf
    // -------------------------------------------------------
    #[test]
    fn test_crl_pem_revokes_leaf() {
        let pki = pki();
        let pem = crl(&pki, &[&pki.leaf]).to_pem();
        let mut store = CrlStore::new();
        for crl in parse_crls_pem(&pem).unwrap() {
            store.add(crl);
        }

        let mut params = base_params(&pki);
        params
            .set_revocation_enabled(true)
            .add_revocation_checker(Arc::new(CrlChecker::new(Arc::new(store))));
        let result = PathValidator::new(&params).validate(&[pki.leaf.clone(), pki.ca.clone()]);

        assert!(!result.is_valid());
        let errors: Vec<_> = result.report.errors().collect();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].index, Some(0));
        assert_eq!(errors[0].id(), "certpath.revoked");
        assert!(result.policy_tree.is_none());
    }

    #[test]
    fn test_crl_for_other_serial_is_good() {
        let pki = pki();
        let mut store = CrlStore::new();
        store.add(crl(&pki, &[&pki.ca]));
        // the root publishes an empty CRL for the intermediate
        let root_crl = CrlBuilder::new()
            .issuer(pki.root.subject().clone())
            .this_update(NOW - DAY)
            .next_update(NOW + 7 * DAY)
            .build(&pki.root_key)
            .unwrap();
        store.add(root_crl);

        let mut params = base_params(&pki);
        params
            .set_revocation_enabled(true)
            .set_revocation_mandatory(true)
            .add_revocation_checker(Arc::new(CrlChecker::new(Arc::new(store))));
        let result = PathValidator::new(&params).validate(&[pki.leaf.clone(), pki.ca.clone()]);
        assert!(result.is_valid(), "{}", result.report.render());
    }

    // -------------------------------------------------------
    // 3. OCSP over DER, falling back to CRL
    // -------------------------------------------------------
    #[test]
    fn test_ocsp_good_over_der() {
        let pki = pki();
        let ca = pki.ca.clone();
        let ca_key = key(2);
        let responder = InProcessResponder(Box::new(move |req| {
            let mut builder = OcspResponseBuilder::new()
                .responder_id(ResponderId::ByName(ca.subject().clone()))
                .produced_at(NOW);
            for id in &req.cert_ids {
                builder = builder.add_response(SingleResponseSpec::new(
                    id.clone(),
                    OcspCertStatus::Good,
                    NOW - 600,
                    Some(NOW + DAY),
                ));
            }
            if let Some(nonce) = req.nonce() {
                builder = builder.nonce(nonce.to_vec());
            }
            builder.build(&ca_key)
        }));

        let mut checker = OcspChecker::new(Arc::new(responder));
        checker.set_require_nonce(true);
        let mut params = base_params(&pki);
        params
            .set_revocation_enabled(true)
            .add_revocation_checker(Arc::new(checker));
        let result = PathValidator::new(&params).validate(&[pki.leaf.clone(), pki.ca.clone()]);

        // the intermediate has no OCSP answer from the root: notification only
        assert!(result.is_valid(), "{}", result.report.render());
        assert!(result.report.at(0).next().is_none());
        assert!(result.report.contains("certpath.revocation-unknown"));
    }

    #[test]
    fn test_ocsp_try_later_falls_back_to_crl() {
        let pki = pki();
        let ocsp = OcspChecker::new(Arc::new(InProcessResponder(Box::new(|_| {
            OcspResponse::unsuccessful(OcspResponseStatus::TryLater)
        }))));
        let mut store = CrlStore::new();
        store.add(crl(&pki, &[]));

        let mut params = base_params(&pki);
        params
            .set_revocation_enabled(true)
            .add_revocation_checker(Arc::new(ocsp))
            .add_revocation_checker(Arc::new(CrlChecker::new(Arc::new(store))));
        let result = PathValidator::new(&params).validate(&[pki.leaf.clone(), pki.ca.clone()]);

        assert!(result.is_valid());
        assert!(result.report.at(0).next().is_none());
    }

    #[test]
    fn test_cert_id_matches_after_round_trip() {
        let pki = pki();
        let id = CertId::new(&pki.leaf, &pki.ca, HashAlgId::Sha1);
        let der = OcspRequest::new(id.clone()).to_der().unwrap();
        let parsed = OcspRequest::from_der(&der).unwrap();
        assert_eq!(parsed.cert_ids, vec![id]);
    }

    // -------------------------------------------------------
    // 4. Shared parameters across threads
    // -------------------------------------------------------
    #[test]
    fn test_concurrent_validations_share_parameters() {
        let pki = pki();
        let mut store = CrlStore::new();
        store.add(crl(&pki, &[&pki.leaf]));
        let mut params = base_params(&pki);
        params
            .set_revocation_enabled(true)
            .add_revocation_checker(Arc::new(CrlChecker::new(Arc::new(store))));

        let path = vec![pki.leaf.clone(), pki.ca.clone()];
        let outcomes: Vec<bool> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..4)
                .map(|_| s.spawn(|| PathValidator::new(&params).validate(&path).is_valid()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert_eq!(outcomes, vec![false; 4]);
    }

    #[test]
    fn test_cancel_from_another_thread() {
        let pki = pki();
        let token = CancellationToken::new();
        let mut params = base_params(&pki);
        params.set_cancellation_token(token.clone());

        std::thread::spawn(move || token.cancel()).join().unwrap();
        let result = PathValidator::new(&params).validate(&[pki.leaf.clone(), pki.ca.clone()]);
        assert!(!result.is_valid());
        assert!(result.report.contains("certpath.cancelled"));
    }

    // -------------------------------------------------------
    // 5. Generic ASN.1 view of a real certificate
    // -------------------------------------------------------
    #[test]
    fn test_certificate_generic_der_round_trip() {
        let pki = pki();
        let der = pki.leaf.to_der();
        let value = Asn1Value::decode(der, EncodingRules::Der).unwrap();
        assert_eq!(value.to_der().unwrap(), der);
        // the same bytes are valid BER
        let ber = Asn1Value::decode(der, EncodingRules::Ber).unwrap();
        assert_eq!(ber, value);
    }

    #[test]
    fn test_truncated_certificate_rejected() {
        let pki = pki();
        let der = pki.root.to_der();
        assert!(Certificate::from_der(&der[..der.len() - 1]).is_err());
        assert!(Asn1Value::from_der(&der[..der.len() / 2]).is_err());
    }

    #[test]
    fn test_root_key_signs_only_the_intermediate() {
        let pki = pki();
        let verifier = pathkit_pki::x509::RsaVerifier;
        assert!(pki.ca.verify_signature(pki.root.public_key(), &verifier).is_ok());
        assert!(pki.leaf.verify_signature(pki.root.public_key(), &verifier).is_err());
    }
}
