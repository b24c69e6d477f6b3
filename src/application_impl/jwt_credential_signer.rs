use crate::application_port::*;
use crate::domain_model::*;
use crate::logger::*;
use chrono::Utc;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use uuid::Uuid;

/// Asymmetric algorithms accepted for access tokens.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Deserialize)]
pub enum SigningAlgorithm {
    #[serde(rename = "EdDSA")]
    EdDsa,
    #[serde(rename = "RS256")]
    Rs256,
}

impl SigningAlgorithm {
    fn jwt(self) -> Algorithm {
        match self {
            SigningAlgorithm::EdDsa => Algorithm::EdDSA,
            SigningAlgorithm::Rs256 => Algorithm::RS256,
        }
    }

    fn encoding_key(self, pem: &[u8]) -> jsonwebtoken::errors::Result<EncodingKey> {
        match self {
            SigningAlgorithm::EdDsa => EncodingKey::from_ed_pem(pem),
            SigningAlgorithm::Rs256 => EncodingKey::from_rsa_pem(pem),
        }
    }

    fn decoding_key(self, pem: &[u8]) -> jsonwebtoken::errors::Result<DecodingKey> {
        match self {
            SigningAlgorithm::EdDsa => DecodingKey::from_ed_pem(pem),
            SigningAlgorithm::Rs256 => DecodingKey::from_rsa_pem(pem),
        }
    }
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub issuer: String,
    pub algorithm: SigningAlgorithm,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

/// PEM-encoded key material, read once at startup.
pub struct KeyPair {
    private_pem: Vec<u8>,
    public_pem: Vec<u8>,
}

impl KeyPair {
    pub fn from_pem(private_pem: impl Into<Vec<u8>>, public_pem: impl Into<Vec<u8>>) -> Self {
        Self {
            private_pem: private_pem.into(),
            public_pem: public_pem.into(),
        }
    }

    pub fn load(
        private_path: impl AsRef<Path>,
        public_path: impl AsRef<Path>,
    ) -> Result<Self, AuthError> {
        let read = |path: &Path| {
            std::fs::read(path)
                .map_err(|e| AuthError::KeyLoad(format!("{}: {}", path.display(), e)))
        };
        Ok(Self {
            private_pem: read(private_path.as_ref())?,
            public_pem: read(public_path.as_ref())?,
        })
    }

    pub fn public_pem(&self) -> &[u8] {
        &self.public_pem
    }
}

/// Verification half of the signer. Holds only the public key, so it can be
/// handed to processes that must not be able to mint tokens.
pub struct JwtAccessVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtAccessVerifier {
    pub fn from_public_pem(
        public_pem: &[u8],
        algorithm: SigningAlgorithm,
        issuer: &str,
    ) -> Result<Self, AuthError> {
        let key = algorithm
            .decoding_key(public_pem)
            .map_err(|e| AuthError::KeyLoad(format!("public key: {}", e)))?;

        let mut validation = Validation::new(algorithm.jwt());
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.set_issuer(&[issuer]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);

        Ok(Self { key, validation })
    }

    pub fn verify(&self, token: &str) -> Result<AccessClaims, AuthError> {
        let data = decode::<AccessClaims>(token, &self.key, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::TokenInvalid,
            }
        })?;
        // the library accepts exp == now; an access token is dead at its exp
        if data.claims.exp <= Utc::now().timestamp() {
            return Err(AuthError::TokenExpired);
        }
        Ok(data.claims)
    }
}

pub struct JwtCredentialSigner {
    cfg: JwtConfig,
    encoding_key: EncodingKey,
    verifier: JwtAccessVerifier,
}

impl JwtCredentialSigner {
    /// Fails with `KeyLoad` if either key cannot be parsed or the two keys do
    /// not belong together.
    pub fn new(cfg: JwtConfig, keys: &KeyPair) -> Result<Self, AuthError> {
        let encoding_key = cfg
            .algorithm
            .encoding_key(&keys.private_pem)
            .map_err(|e| AuthError::KeyLoad(format!("private key: {}", e)))?;
        let verifier =
            JwtAccessVerifier::from_public_pem(&keys.public_pem, cfg.algorithm, &cfg.issuer)?;

        let signer = Self {
            cfg,
            encoding_key,
            verifier,
        };
        signer.probe()?;
        info!(
            issuer = %signer.cfg.issuer,
            algorithm = ?signer.cfg.algorithm,
            "access token keys loaded"
        );
        Ok(signer)
    }

    pub fn config(&self) -> &JwtConfig {
        &self.cfg
    }

    pub fn verifier(&self) -> &JwtAccessVerifier {
        &self.verifier
    }

    fn probe(&self) -> Result<(), AuthError> {
        let probe = Principal {
            user_id: UserId(Uuid::nil()),
            role: Role::new("probe"),
        };
        let (token, _) = self.encode_access(&probe, Self::gen_jti(), Duration::from_secs(60))?;
        self.verifier
            .verify(&token)
            .map(|_| ())
            .map_err(|_| AuthError::KeyLoad("private and public key do not match".to_string()))
    }

    fn encode_access(
        &self,
        principal: &Principal,
        jti: String,
        ttl: Duration,
    ) -> Result<(String, chrono::DateTime<Utc>), AuthError> {
        let iat_dt = Utc::now();
        let exp_dt = iat_dt + ttl;
        let claims = AccessClaims {
            sub: principal.user_id.to_string(),
            role: principal.role.to_string(),
            iss: self.cfg.issuer.clone(),
            jti,
            iat: iat_dt.timestamp(),
            exp: exp_dt.timestamp(),
        };
        let token = encode(
            &Header::new(self.cfg.algorithm.jwt()),
            &claims,
            &self.encoding_key,
        )
        .map_err(|e| AuthError::InternalError(e.to_string()))?;
        Ok((token, exp_dt))
    }

    #[inline]
    fn gen_jti() -> String {
        Uuid::new_v4().to_string()
    }
}

#[async_trait::async_trait]
impl CredentialSigner for JwtCredentialSigner {
    async fn issue_access_token(
        &self,
        principal: &Principal,
    ) -> Result<IssuedAccessToken, AuthError> {
        let jti = Self::gen_jti();
        let (token, expires_at) = self.encode_access(principal, jti.clone(), self.cfg.access_ttl)?;
        Ok(IssuedAccessToken {
            token: AccessToken(token),
            jti,
            expires_at,
        })
    }

    async fn verify_access_token(&self, token: &str) -> Result<AccessClaims, AuthError> {
        self.verifier.verify(token)
    }

    async fn issue_refresh_token(&self, user_id: UserId) -> Result<IssuedRefreshToken, AuthError> {
        let token = RefreshToken::generate();
        debug!(%user_id, token_fp = %token.short_fingerprint(), "refresh token minted");
        Ok(IssuedRefreshToken {
            token,
            expires_at: Utc::now() + self.cfg.refresh_ttl,
        })
    }
}
