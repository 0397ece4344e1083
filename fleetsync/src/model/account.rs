//! Account identity and credentials.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Number of hex characters of the SHA-256 digest kept in an account id.
const ACCOUNT_ID_HEX_LEN: usize = 16;

/// Vehicle brand served by the connected-car API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Brand {
    Kia,
    Hyundai,
    Genesis,
}

impl Brand {
    /// Stable lowercase name used in config files and id derivation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Brand::Kia => "kia",
            Brand::Hyundai => "hyundai",
            Brand::Genesis => "genesis",
        }
    }
}

impl fmt::Display for Brand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Brand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "kia" => Ok(Brand::Kia),
            "hyundai" => Ok(Brand::Hyundai),
            "genesis" => Ok(Brand::Genesis),
            other => Err(format!("unknown brand '{}'", other)),
        }
    }
}

/// API region an account is registered in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Region {
    Europe,
    Canada,
    Usa,
    China,
    Australia,
    India,
    NewZealand,
    Brazil,
}

impl Region {
    /// Stable lowercase name used in config files and id derivation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Region::Europe => "europe",
            Region::Canada => "canada",
            Region::Usa => "usa",
            Region::China => "china",
            Region::Australia => "australia",
            Region::India => "india",
            Region::NewZealand => "new_zealand",
            Region::Brazil => "brazil",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Region {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(['-', ' '], "_").as_str() {
            "europe" | "eu" => Ok(Region::Europe),
            "canada" | "ca" => Ok(Region::Canada),
            "usa" | "us" => Ok(Region::Usa),
            "china" | "cn" => Ok(Region::China),
            "australia" | "au" => Ok(Region::Australia),
            "india" | "in" => Ok(Region::India),
            "new_zealand" | "nz" => Ok(Region::NewZealand),
            "brazil" | "br" => Ok(Region::Brazil),
            other => Err(format!("unknown region '{}'", other)),
        }
    }
}

/// Stable identifier of an account.
///
/// Derived from brand, region and username only, so a password or PIN change
/// never changes it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountId(String);

impl AccountId {
    /// Derive the id for a brand/region/username triple.
    ///
    /// The username is trimmed and case-folded first, matching how the
    /// remote API treats logins.
    pub fn derive(brand: Brand, region: Region, username: &str) -> Self {
        let normalized = username.trim().to_lowercase();
        let mut hasher = Sha256::new();
        hasher.update(brand.as_str().as_bytes());
        hasher.update(b"\0");
        hasher.update(region.as_str().as_bytes());
        hasher.update(b"\0");
        hasher.update(normalized.as_bytes());
        let digest = hasher.finalize();

        let hex: String = digest
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect::<String>()
            .chars()
            .take(ACCOUNT_ID_HEX_LEN)
            .collect();
        Self(format!("acct-{}", hex))
    }

    /// Wrap an id string read from storage.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Login material for the vehicle API. Opaque to the coordinator.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub pin: Option<String>,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            pin: None,
        }
    }

    pub fn with_pin(mut self, pin: impl Into<String>) -> Self {
        self.pin = Some(pin.into());
        self
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("pin", &self.pin.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// A configured account: who logs in, where, and under which brand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub brand: Brand,
    pub region: Region,
    pub credentials: Credentials,
}

impl Account {
    pub fn new(brand: Brand, region: Region, credentials: Credentials) -> Self {
        Self {
            brand,
            region,
            credentials,
        }
    }

    /// The derived, stable account id.
    pub fn id(&self) -> AccountId {
        AccountId::derive(self.brand, self.region, &self.credentials.username)
    }

    /// Human-readable label for logs.
    pub fn label(&self) -> String {
        format!(
            "{} {} {}",
            self.brand, self.region, self.credentials.username
        )
    }

    /// Re-derive the id for an account that was stored with an explicit id.
    ///
    /// Older configurations persisted the id next to the credentials. The
    /// derived id always wins; a mismatch is reported so operators can spot
    /// hand-edited entries.
    pub fn migrate_stored_id(&self, stored: Option<&str>) -> AccountId {
        let derived = self.id();
        if let Some(stored) = stored {
            if stored != derived.as_str() {
                tracing::warn!(
                    stored = stored,
                    derived = %derived,
                    account = %self.label(),
                    "Stored account id differs from derived id, using derived id"
                );
            }
        }
        derived
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(password: &str) -> Account {
        Account::new(
            Brand::Kia,
            Region::Europe,
            Credentials::new("Driver@Example.com", password),
        )
    }

    #[test]
    fn test_account_id_is_deterministic() {
        let a = AccountId::derive(Brand::Kia, Region::Europe, "driver@example.com");
        let b = AccountId::derive(Brand::Kia, Region::Europe, "driver@example.com");
        assert_eq!(a, b);
        assert!(a.as_str().starts_with("acct-"));
        assert_eq!(a.as_str().len(), "acct-".len() + ACCOUNT_ID_HEX_LEN);
    }

    #[test]
    fn test_account_id_ignores_case_and_whitespace() {
        let a = AccountId::derive(Brand::Kia, Region::Europe, "  Driver@Example.COM ");
        let b = AccountId::derive(Brand::Kia, Region::Europe, "driver@example.com");
        assert_eq!(a, b);
    }

    #[test]
    fn test_account_id_distinguishes_brand_and_region() {
        let kia = AccountId::derive(Brand::Kia, Region::Europe, "u");
        let hyundai = AccountId::derive(Brand::Hyundai, Region::Europe, "u");
        let kia_us = AccountId::derive(Brand::Kia, Region::Usa, "u");
        assert_ne!(kia, hyundai);
        assert_ne!(kia, kia_us);
    }

    #[test]
    fn test_account_id_stable_under_credential_update() {
        let before = account("old-password");
        let mut after = account("new-password");
        after.credentials = after.credentials.with_pin("1234");
        assert_eq!(before.id(), after.id());
    }

    #[test]
    fn test_migrate_stored_id_prefers_derived() {
        let acct = account("pw");
        assert_eq!(acct.migrate_stored_id(Some("legacy-id")), acct.id());
        assert_eq!(acct.migrate_stored_id(None), acct.id());
        assert_eq!(acct.migrate_stored_id(Some(acct.id().as_str())), acct.id());
    }

    #[test]
    fn test_credentials_debug_redacts_secrets() {
        let creds = Credentials::new("user", "hunter2").with_pin("0000");
        let printed = format!("{:?}", creds);
        assert!(printed.contains("user"));
        assert!(!printed.contains("hunter2"));
        assert!(!printed.contains("0000"));
    }

    #[test]
    fn test_region_parse_aliases() {
        assert_eq!("EU".parse::<Region>().unwrap(), Region::Europe);
        assert_eq!("new-zealand".parse::<Region>().unwrap(), Region::NewZealand);
        assert!("mars".parse::<Region>().is_err());
        assert_eq!("Hyundai".parse::<Brand>().unwrap(), Brand::Hyundai);
    }
}
