use std::fmt;

use crate::error::TenantDbError;

/// Longest encoded key. Together with a prefix of at most
/// `MAX_PREFIX_LEN` bytes it stays within PostgreSQL's 63-byte identifier limit.
pub const TENANT_KEY_MAX_LEN: usize = 48;
pub const MAX_PREFIX_LEN: usize = 63 - TENANT_KEY_MAX_LEN;

/// Canonical, database-name-safe form of an organization identifier.
///
/// Encoding: `a-z` and `0-9` are kept, `_` becomes `__`, `-` becomes `_0`
/// and an uppercase letter becomes `_` followed by its lowercase form.
/// The code is prefix-free, so distinct organizations never share a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TenantKey(String);

impl TenantKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Physical database name for this tenant, e.g. `tenant_acme`.
    pub fn database_name(&self, prefix: &str) -> String {
        format!("{prefix}{}", self.0)
    }

    /// Recovers the organization identifier the key was derived from.
    pub fn organization_id(&self) -> String {
        let mut out = String::with_capacity(self.0.len());
        let mut chars = self.0.chars();
        while let Some(c) = chars.next() {
            if c != '_' {
                out.push(c);
                continue;
            }
            match chars.next() {
                Some('_') => out.push('_'),
                Some('0') => out.push('-'),
                Some(l) => out.push(l.to_ascii_uppercase()),
                None => {}
            }
        }
        out
    }

    /// Parses an already-encoded key, e.g. one read back from `pg_database`.
    /// Returns `None` when `encoded` is not something `resolve` could produce.
    pub fn from_encoded(encoded: &str) -> Option<Self> {
        let key = TenantKey(encoded.to_string());
        match resolve(&key.organization_id()) {
            Ok(round_trip) if round_trip == key => Some(key),
            _ => None,
        }
    }
}

impl fmt::Display for TenantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Normalizes an external organization identifier into a [`TenantKey`].
pub fn resolve(raw_org_id: &str) -> Result<TenantKey, TenantDbError> {
    if raw_org_id.is_empty() {
        return Err(TenantDbError::invalid("organization identifier is empty"));
    }

    let mut key = String::with_capacity(raw_org_id.len() * 2);
    for c in raw_org_id.chars() {
        match c {
            'a'..='z' | '0'..='9' => key.push(c),
            '_' => key.push_str("__"),
            '-' => key.push_str("_0"),
            'A'..='Z' => {
                key.push('_');
                key.push(c.to_ascii_lowercase());
            }
            other => {
                return Err(TenantDbError::invalid(format!(
                    "unsupported character {other:?} in organization identifier"
                )))
            }
        }
        if key.len() > TENANT_KEY_MAX_LEN {
            return Err(TenantDbError::invalid(format!(
                "organization identifier encodes to more than {TENANT_KEY_MAX_LEN} bytes"
            )));
        }
    }

    Ok(TenantKey(key))
}
