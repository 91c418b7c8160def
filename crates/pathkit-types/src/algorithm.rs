/// Digest algorithm identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlgId {
    Sha1,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlgId {
    /// Digest output length in bytes.
    pub fn output_len(self) -> usize {
        match self {
            HashAlgId::Sha1 => 20,
            HashAlgId::Sha224 => 28,
            HashAlgId::Sha256 => 32,
            HashAlgId::Sha384 => 48,
            HashAlgId::Sha512 => 64,
        }
    }
}

/// Public key algorithm identifiers, as named by a SubjectPublicKeyInfo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PkeyAlgId {
    Rsa,
    Dsa,
    Ecdsa,
    Ed25519,
    Ed448,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_output_len() {
        assert_eq!(HashAlgId::Sha1.output_len(), 20);
        assert_eq!(HashAlgId::Sha256.output_len(), 32);
        assert_eq!(HashAlgId::Sha512.output_len(), 64);
    }
}
