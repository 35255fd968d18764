//! USM security parameters.
//!
//! Protocol names resolve fail-open: an unrecognized authentication or
//! privacy protocol (including an empty one) becomes NoAuth / NoPriv rather
//! than an error.

use std::fmt;

use crate::config::schema::UsmConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthProtocol {
    NoAuth,
    Md5,
    Sha,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
}

impl AuthProtocol {
    pub fn from_name(name: &str) -> Self {
        match name {
            "MD5" => AuthProtocol::Md5,
            "SHA" => AuthProtocol::Sha,
            "SHA224" => AuthProtocol::Sha224,
            "SHA256" => AuthProtocol::Sha256,
            "SHA384" => AuthProtocol::Sha384,
            "SHA512" => AuthProtocol::Sha512,
            _ => AuthProtocol::NoAuth,
        }
    }

    /// Name understood by the net-snmp tools' `-a` flag.
    pub fn netsnmp_name(self) -> Option<&'static str> {
        match self {
            AuthProtocol::NoAuth => None,
            AuthProtocol::Md5 => Some("MD5"),
            AuthProtocol::Sha => Some("SHA"),
            AuthProtocol::Sha224 => Some("SHA-224"),
            AuthProtocol::Sha256 => Some("SHA-256"),
            AuthProtocol::Sha384 => Some("SHA-384"),
            AuthProtocol::Sha512 => Some("SHA-512"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrivProtocol {
    NoPriv,
    Des,
    Aes,
    Aes192,
    Aes256,
    Aes192C,
    Aes256C,
}

impl PrivProtocol {
    pub fn from_name(name: &str) -> Self {
        match name {
            "DES" => PrivProtocol::Des,
            "AES" => PrivProtocol::Aes,
            "AES192" => PrivProtocol::Aes192,
            "AES256" => PrivProtocol::Aes256,
            "AES192C" => PrivProtocol::Aes192C,
            "AES256C" => PrivProtocol::Aes256C,
            _ => PrivProtocol::NoPriv,
        }
    }

    /// Name understood by the net-snmp tools' `-x` flag.
    pub fn netsnmp_name(self) -> Option<&'static str> {
        match self {
            PrivProtocol::NoPriv => None,
            PrivProtocol::Des => Some("DES"),
            PrivProtocol::Aes => Some("AES"),
            PrivProtocol::Aes192 => Some("AES-192"),
            PrivProtocol::Aes256 => Some("AES-256"),
            PrivProtocol::Aes192C => Some("AES-192-C"),
            PrivProtocol::Aes256C => Some("AES-256-C"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityLevel {
    NoAuthNoPriv,
    AuthNoPriv,
    AuthPriv,
}

impl SecurityLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            SecurityLevel::NoAuthNoPriv => "noAuthNoPriv",
            SecurityLevel::AuthNoPriv => "authNoPriv",
            SecurityLevel::AuthPriv => "authPriv",
        }
    }
}

/// Resolved USM parameters for one session.
#[derive(Clone, PartialEq, Eq)]
pub struct SecurityParams {
    pub username: String,
    pub auth_protocol: AuthProtocol,
    pub auth_passphrase: String,
    pub priv_protocol: PrivProtocol,
    pub priv_passphrase: String,
}

impl SecurityParams {
    pub fn from_usm(usm: &UsmConfig) -> Self {
        Self {
            username: usm.username.clone(),
            auth_protocol: AuthProtocol::from_name(&usm.auth_protocol),
            auth_passphrase: usm.auth_passphrase.clone(),
            priv_protocol: PrivProtocol::from_name(&usm.priv_protocol),
            priv_passphrase: usm.priv_passphrase.clone(),
        }
    }

    /// Privacy requires authentication, so NoAuth always yields noAuthNoPriv.
    pub fn level(&self) -> SecurityLevel {
        match (self.auth_protocol, self.priv_protocol) {
            (AuthProtocol::NoAuth, _) => SecurityLevel::NoAuthNoPriv,
            (_, PrivProtocol::NoPriv) => SecurityLevel::AuthNoPriv,
            _ => SecurityLevel::AuthPriv,
        }
    }
}

impl fmt::Debug for SecurityParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityParams")
            .field("username", &self.username)
            .field("auth_protocol", &self.auth_protocol)
            .field("priv_protocol", &self.priv_protocol)
            .field("level", &self.level())
            .finish_non_exhaustive()
    }
}
