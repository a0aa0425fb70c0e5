use crate::config::TokenTable;
use crate::services::encryption::{CryptoError, EncryptionService};

/// Ready-to-use bearer credential. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken(String);

impl BearerToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("BearerToken(***)")
    }
}

/// Derives per-organization bearer tokens from the tier table.
///
/// Stored tokens are `"Encrypted: " + base64(iv || ct)` of the base64-encoded
/// bearer. Resolution undoes both layers with the key supplied by the job.
#[derive(Debug, Clone)]
pub struct CredentialResolver {
    tokens: TokenTable,
}

impl CredentialResolver {
    pub fn new(tokens: TokenTable) -> Self {
        Self { tokens }
    }

    /// `Ok(None)` when no tier is configured for `organization_id`.
    pub fn resolve(
        &self,
        organization_id: &str,
        decrypt_key: &str,
    ) -> Result<Option<BearerToken>, CryptoError> {
        let Some(stored) = self.tokens.token_for_org(organization_id) else {
            return Ok(None);
        };

        let encoded = EncryptionService::decrypt(stored, decrypt_key)?;
        let bearer = EncryptionService::decode_base64(&encoded)?;

        Ok(Some(BearerToken(bearer)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TierConfig;

    fn stored_token(bearer: &str, key: &str) -> String {
        EncryptionService::encrypt(&EncryptionService::encode_base64(bearer), key).unwrap()
    }

    fn table(org: &str, token: String) -> TokenTable {
        TokenTable {
            hom: TierConfig {
                organization_id: Some(org.to_string()),
                token: Some(token),
            },
            ..TokenTable::default()
        }
    }

    #[test]
    fn test_resolves_bearer_for_matching_org() {
        let key = EncryptionService::new_base64_secret_256();
        let resolver = CredentialResolver::new(table("org1", stored_token("B", &key)));

        let token = resolver.resolve("org1", &key).unwrap().unwrap();
        assert_eq!(token.as_str(), "B");
    }

    #[test]
    fn test_unknown_org_has_no_credential() {
        let key = EncryptionService::new_base64_secret_256();
        let resolver = CredentialResolver::new(table("org1", stored_token("B", &key)));

        assert!(resolver.resolve("org2", &key).unwrap().is_none());
    }

    #[test]
    fn test_wrong_key_fails() {
        let key = EncryptionService::new_base64_secret_256();
        let other = EncryptionService::new_base64_secret_256();
        let resolver = CredentialResolver::new(table("org1", stored_token("B", &key)));

        assert!(matches!(
            resolver.resolve("org1", &other),
            Err(CryptoError::AuthenticationFailed)
        ));
    }

    #[test]
    fn test_concurrent_resolution_with_different_keys() {
        let key_a = EncryptionService::new_base64_secret_256();
        let key_b = EncryptionService::new_base64_secret_256();
        let tokens = TokenTable {
            dev: TierConfig {
                organization_id: Some("org-a".to_string()),
                token: Some(stored_token("token-A", &key_a)),
            },
            prd: TierConfig {
                organization_id: Some("org-b".to_string()),
                token: Some(stored_token("token-B", &key_b)),
            },
            ..TokenTable::default()
        };
        let resolver = std::sync::Arc::new(CredentialResolver::new(tokens));

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let resolver = resolver.clone();
                let (org, key, expected) = if i % 2 == 0 {
                    ("org-a", key_a.clone(), "token-A")
                } else {
                    ("org-b", key_b.clone(), "token-B")
                };
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        let token = resolver.resolve(org, &key).unwrap().unwrap();
                        assert_eq!(token.as_str(), expected);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
    }

    #[test]
    fn test_debug_is_redacted() {
        let token = BearerToken("secret".to_string());
        assert_eq!(format!("{:?}", token), "BearerToken(***)");
    }
}
