//! An in-memory collection of certificates used when building paths.

use pathkit_types::PkiError;

use crate::x509::{parse_pem_bundle, Certificate, DistinguishedName};

/// Untrusted certificates indexed by subject name.
#[derive(Debug, Clone, Default)]
pub struct CertStore {
    certs: Vec<Certificate>,
}

impl CertStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every certificate from a PEM bundle.
    pub fn from_pem(pem: &str) -> Result<Self, PkiError> {
        Ok(CertStore {
            certs: parse_pem_bundle(pem)?,
        })
    }

    /// Add a certificate. Exact duplicates are ignored.
    pub fn add(&mut self, cert: Certificate) -> &mut Self {
        if !self.certs.iter().any(|c| c.to_der() == cert.to_der()) {
            self.certs.push(cert);
        }
        self
    }

    /// Certificates whose subject equals `name` under RFC 5280 §7.1 rules.
    pub fn find_by_subject<'a>(
        &'a self,
        name: &'a DistinguishedName,
    ) -> impl Iterator<Item = &'a Certificate> + 'a {
        self.certs.iter().filter(move |c| c.subject() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Certificate> {
        self.certs.iter()
    }

    pub fn len(&self) -> usize {
        self.certs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.certs.is_empty()
    }
}

impl FromIterator<Certificate> for CertStore {
    fn from_iter<I: IntoIterator<Item = Certificate>>(iter: I) -> Self {
        let mut store = CertStore::new();
        for cert in iter {
            store.add(cert);
        }
        store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;

    #[test]
    fn test_find_by_subject() {
        let (root, intermediate, leaf) = chain();
        let store: CertStore = [root.clone(), intermediate.clone(), leaf].into_iter().collect();
        assert_eq!(store.len(), 3);
        let found: Vec<_> = store.find_by_subject(intermediate.subject()).collect();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].to_der(), intermediate.to_der());
        assert_eq!(store.find_by_subject(&name("Nobody")).count(), 0);
    }

    #[test]
    fn test_duplicates_ignored() {
        let mut store = CertStore::new();
        store.add(root_cert().clone()).add(root_cert().clone());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_from_pem_bundle() {
        let (root, intermediate, _) = chain();
        let pem = format!("{}{}", root.to_pem(), intermediate.to_pem());
        let store = CertStore::from_pem(&pem).unwrap();
        assert_eq!(store.len(), 2);
        assert!(!store.is_empty());
    }
}
