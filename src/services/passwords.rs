use lazy_static::lazy_static;

#[cfg(not(test))]
const BCRYPT_COST: u32 = bcrypt::DEFAULT_COST;
#[cfg(test)]
const BCRYPT_COST: u32 = 4;

pub const MIN_PASSWORD_LEN: usize = 8;

lazy_static! {
    /// Hash at the live cost, verified when no account matches an email.
    static ref UNKNOWN_ACCOUNT_HASH: String =
        bcrypt::hash("unknown-account", BCRYPT_COST).unwrap_or_default();
}

pub fn hash_password(password: &str) -> anyhow::Result<String> {
    if password.is_empty() {
        anyhow::bail!("Password must not be empty");
    }
    Ok(bcrypt::hash(password, BCRYPT_COST)?)
}

/// An empty password or hash never verifies; a corrupt hash is a mismatch.
pub fn verify_password(password: &str, password_hash: &str) -> bool {
    if password.is_empty() || password_hash.is_empty() {
        return false;
    }
    bcrypt::verify(password, password_hash).unwrap_or(false)
}

/// Spend the same bcrypt work as a real check, for an email with no account.
/// Never matches.
pub fn verify_unknown_account(password: &str) -> bool {
    let _ = bcrypt::verify(password, &UNKNOWN_ACCOUNT_HASH);
    false
}
