//! RS256 warrant issuance: one of two RSA-4096 signing keys, chosen by the
//! policy engine's routing decision.

use chrono::Utc;
use ipg_guard::policy::Route;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::WarrantConfig;
use crate::error::WarrantError;

const PRODUCTION_KID: &str = "prime_key_1";
const SHADOW_KID: &str = "shadow_key_1";
const ISSUER: &str = "ipg-gateway";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarrantClaims {
    pub iss: String,
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
    pub scope: Route,
    pub risk_score: f64,
}

/// Holds both signing keys, loaded once at startup. Key-load failure is
/// fatal -- there is no safe degraded mode for a component whose entire
/// purpose is proving which environment a call was authorized for.
pub struct WarrantAuthority {
    production_key: EncodingKey,
    shadow_key: EncodingKey,
    ttl_secs: i64,
}

impl WarrantAuthority {
    pub fn load(config: &WarrantConfig) -> anyhow::Result<Self> {
        let production_pem = std::fs::read(&config.production_key_path).map_err(|e| {
            anyhow::anyhow!(
                "reading production key at {:?}: {e}",
                config.production_key_path
            )
        })?;
        let shadow_pem = std::fs::read(&config.shadow_key_path).map_err(|e| {
            anyhow::anyhow!("reading shadow key at {:?}: {e}", config.shadow_key_path)
        })?;
        let production_key = EncodingKey::from_rsa_pem(&production_pem)
            .map_err(|e| anyhow::anyhow!("parsing production key: {e}"))?;
        let shadow_key = EncodingKey::from_rsa_pem(&shadow_pem)
            .map_err(|e| anyhow::anyhow!("parsing shadow key: {e}"))?;
        Ok(Self {
            production_key,
            shadow_key,
            ttl_secs: config.ttl_secs,
        })
    }

    /// Issue a signed warrant for `route`. Returns `None` for [`Route::Deny`]
    /// -- a denied call is never dressed up with a warrant.
    pub fn issue_warrant(
        &self,
        session_id: &str,
        accumulated_risk: f64,
        route: Route,
    ) -> Result<Option<String>, WarrantError> {
        let (key, kid) = match route {
            Route::Production => (&self.production_key, PRODUCTION_KID),
            Route::Shadow => (&self.shadow_key, SHADOW_KID),
            Route::Deny => return Ok(None),
        };
        let now = Utc::now().timestamp();
        let claims = WarrantClaims {
            iss: ISSUER.to_string(),
            sub: session_id.to_string(),
            iat: now,
            exp: now + self.ttl_secs,
            jti: Uuid::new_v4().to_string(),
            scope: route,
            risk_score: accumulated_risk,
        };
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(kid.to_string());
        let token = encode(&header, &claims, key)?;
        Ok(Some(token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::pkcs8::EncodePrivateKey;
    use rsa::RsaPrivateKey;
    use std::io::Write;

    fn write_test_key(path: &std::path::Path) {
        let mut rng = rand::thread_rng();
        let key = RsaPrivateKey::new(&mut rng, 2048).unwrap();
        let pem = key
            .to_pkcs8_pem(rsa::pkcs8::LineEnding::LF)
            .unwrap();
        let mut file = std::fs::File::create(path).unwrap();
        file.write_all(pem.as_bytes()).unwrap();
    }

    #[test]
    fn deny_route_issues_no_warrant() {
        let dir = tempfile::tempdir().unwrap();
        let prod = dir.path().join("prod.pem");
        let shadow = dir.path().join("shadow.pem");
        write_test_key(&prod);
        write_test_key(&shadow);
        let authority = WarrantAuthority::load(&WarrantConfig {
            production_key_path: prod,
            shadow_key_path: shadow,
            ttl_secs: 60,
        })
        .unwrap();
        let warrant = authority.issue_warrant("s1", 0.1, Route::Deny).unwrap();
        assert!(warrant.is_none());
    }

    #[test]
    fn production_and_shadow_routes_use_distinct_keys() {
        let dir = tempfile::tempdir().unwrap();
        let prod = dir.path().join("prod.pem");
        let shadow = dir.path().join("shadow.pem");
        write_test_key(&prod);
        write_test_key(&shadow);
        let authority = WarrantAuthority::load(&WarrantConfig {
            production_key_path: prod,
            shadow_key_path: shadow,
            ttl_secs: 60,
        })
        .unwrap();
        let prod_warrant = authority
            .issue_warrant("s1", 0.1, Route::Production)
            .unwrap()
            .unwrap();
        let shadow_warrant = authority
            .issue_warrant("s1", 0.1, Route::Shadow)
            .unwrap()
            .unwrap();
        assert_ne!(prod_warrant, shadow_warrant);
    }
}
