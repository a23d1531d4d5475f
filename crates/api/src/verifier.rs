//! HS256 bearer-token verification.

use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};

use inspectra_auth::{validate_claims, AuthenticationError, IdentityClaims, IdentityVerifier, Principal};

/// Verifies HS256-signed identity tokens with a shared secret.
///
/// Only the signature is checked by `jsonwebtoken`; the issued/expiry window
/// is validated against the caller-supplied clock by [`validate_claims`].
pub struct Hs256IdentityVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl Hs256IdentityVerifier {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        Self {
            key: DecodingKey::from_secret(secret.as_ref()),
            validation,
        }
    }
}

impl IdentityVerifier for Hs256IdentityVerifier {
    fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<Principal, AuthenticationError> {
        let data = jsonwebtoken::decode::<IdentityClaims>(token, &self.key, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => {
                    AuthenticationError::Rejected(e.to_string())
                }
                _ => AuthenticationError::Malformed(e.to_string()),
            }
        })?;

        validate_claims(&data.claims, now)?;
        Ok(Principal::from_claims(&data.claims))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use inspectra_auth::IdpId;
    use jsonwebtoken::{EncodingKey, Header};

    fn token(secret: &str, iat: DateTime<Utc>, exp: DateTime<Utc>) -> String {
        let claims = IdentityClaims {
            sub: IdpId::new("idp|inspector-7"),
            email: "inspector@example.com".into(),
            preferred_username: Some("inspector7".into()),
            name: None,
            given_name: Some("Ada".into()),
            family_name: Some("Lovelace".into()),
            iat: iat.timestamp(),
            exp: exp.timestamp(),
        };
        jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn accepts_a_fresh_token() {
        let now = Utc::now();
        let verifier = Hs256IdentityVerifier::new("s3cret");
        let principal = verifier
            .verify(&token("s3cret", now, now + Duration::minutes(5)), now)
            .unwrap();

        assert_eq!(principal.idp_id().as_str(), "idp|inspector-7");
        assert_eq!(principal.email(), "inspector@example.com");
        assert_eq!(principal.username(), "inspector7");
    }

    #[test]
    fn rejects_a_foreign_signature() {
        let now = Utc::now();
        let verifier = Hs256IdentityVerifier::new("s3cret");
        let err = verifier
            .verify(&token("other", now, now + Duration::minutes(5)), now)
            .unwrap_err();
        assert!(matches!(err, AuthenticationError::Rejected(_)), "{err:?}");
    }

    #[test]
    fn expiry_is_checked_against_the_given_clock() {
        let issued = Utc::now() - Duration::hours(2);
        let verifier = Hs256IdentityVerifier::new("s3cret");
        let t = token("s3cret", issued, issued + Duration::hours(1));

        assert_eq!(verifier.verify(&t, Utc::now()).unwrap_err(), AuthenticationError::Expired);
        assert!(verifier.verify(&t, issued + Duration::minutes(30)).is_ok());
    }

    #[test]
    fn garbage_is_malformed() {
        let verifier = Hs256IdentityVerifier::new("s3cret");
        let err = verifier.verify("not-a-jwt", Utc::now()).unwrap_err();
        assert!(matches!(err, AuthenticationError::Malformed(_)), "{err:?}");
    }
}
