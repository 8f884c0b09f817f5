//! Single-use backup codes.
//!
//! Backup codes substitute for a time-based code when the authenticator
//! device is unavailable. Plaintext codes are shown to the principal once;
//! only Argon2id hashes (peppered server-side) are stored, and each code is
//! permanently invalidated on first use.

use anyhow::{anyhow, Context, Result};
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use rand::rngs::OsRng;
use rand::RngCore;

pub(crate) const BACKUP_CODE_LEN: usize = 12;
const BACKUP_CODE_GROUP_SIZE: usize = 4;
// No 0/O/1/I: codes get read off paper.
const BACKUP_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// A freshly generated batch of backup codes: display form plus hashes.
#[derive(Debug)]
pub struct BackupCodeBatch {
    pub codes: Vec<String>,
    pub code_hashes: Vec<String>,
}

impl BackupCodeBatch {
    /// Generate `count` unique codes hashed with the given pepper.
    pub fn generate(count: usize, pepper: &[u8]) -> Result<Self> {
        let mut rng = OsRng;
        let mut codes = Vec::with_capacity(count);
        let mut code_hashes = Vec::with_capacity(count);
        while codes.len() < count {
            let code = generate_code(&mut rng)?;
            // Uniqueness within the batch is required; collisions are
            // astronomically rare but cheap to re-roll.
            if codes.contains(&code) {
                continue;
            }
            code_hashes.push(hash_backup_code(&code, pepper)?);
            codes.push(code);
        }
        Ok(Self { codes, code_hashes })
    }
}

/// Strip separators, uppercase, and validate length/alphabet.
pub fn normalize_backup_code(input: &str) -> Result<String> {
    let normalized: String = input
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|ch| ch.to_ascii_uppercase())
        .collect();

    if normalized.len() != BACKUP_CODE_LEN {
        return Err(anyhow!("invalid backup code length"));
    }
    if !normalized
        .as_bytes()
        .iter()
        .all(|ch| BACKUP_CODE_ALPHABET.contains(ch))
    {
        return Err(anyhow!("invalid backup code characters"));
    }
    Ok(normalized)
}

/// Group a normalized code as `XXXX-XXXX-XXXX` for display.
pub fn format_backup_code(normalized: &str) -> Result<String> {
    if normalized.len() != BACKUP_CODE_LEN {
        return Err(anyhow!("invalid backup code length"));
    }
    let mut out = String::with_capacity(BACKUP_CODE_LEN + 2);
    for (idx, chunk) in normalized.as_bytes().chunks(BACKUP_CODE_GROUP_SIZE).enumerate() {
        if idx > 0 {
            out.push('-');
        }
        out.push_str(std::str::from_utf8(chunk).context("invalid backup code chunk")?);
    }
    Ok(out)
}

/// Check a submitted code against one stored hash.
pub fn verify_backup_code(code: &str, stored_hash: &str, pepper: &[u8]) -> Result<bool> {
    let Ok(normalized) = normalize_backup_code(code) else {
        return Ok(false);
    };
    let parsed =
        PasswordHash::new(stored_hash).map_err(|_| anyhow!("invalid backup code hash"))?;
    Ok(peppered_argon2(pepper)?
        .verify_password(normalized.as_bytes(), &parsed)
        .is_ok())
}

fn generate_code<R: RngCore + ?Sized>(rng: &mut R) -> Result<String> {
    let mut raw = [0u8; BACKUP_CODE_LEN];
    rng.fill_bytes(&mut raw);
    let mut normalized = String::with_capacity(BACKUP_CODE_LEN);
    for byte in raw {
        let idx = usize::from(byte) % BACKUP_CODE_ALPHABET.len();
        if let Some(&char_byte) = BACKUP_CODE_ALPHABET.get(idx) {
            normalized.push(char_byte as char);
        }
    }
    format_backup_code(&normalized)
}

fn hash_backup_code(code: &str, pepper: &[u8]) -> Result<String> {
    let normalized = normalize_backup_code(code)?;
    let salt = SaltString::generate(&mut OsRng);
    let hash = peppered_argon2(pepper)?
        .hash_password(normalized.as_bytes(), &salt)
        .map_err(|_| anyhow!("failed to hash backup code"))?
        .to_string();
    Ok(hash)
}

fn peppered_argon2(pepper: &[u8]) -> Result<Argon2<'_>> {
    Argon2::new_with_secret(
        pepper,
        argon2::Algorithm::Argon2id,
        argon2::Version::V0x13,
        argon2::Params::default(),
    )
    .map_err(|_| anyhow!("failed to initialize Argon2id"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::{format_backup_code, normalize_backup_code, verify_backup_code, BackupCodeBatch};
    use std::collections::HashSet;

    #[test]
    fn normalize_strips_separators_and_uppercases() {
        assert_eq!(
            normalize_backup_code("abcd-efgh-jklm").unwrap(),
            "ABCDEFGHJKLM"
        );
    }

    #[test]
    fn normalize_rejects_wrong_length_and_alphabet() {
        assert!(normalize_backup_code("short").is_err());
        // 0 and 1 are excluded from the alphabet.
        assert!(normalize_backup_code("ABCD-EFGH-JK01").is_err());
    }

    #[test]
    fn format_groups_in_fours() {
        assert_eq!(format_backup_code("ABCDEFGHJKLM").unwrap(), "ABCD-EFGH-JKLM");
    }

    #[test]
    fn batch_codes_are_unique_and_verify() {
        let pepper = b"pepper";
        let batch = BackupCodeBatch::generate(10, pepper).unwrap();
        assert_eq!(batch.codes.len(), 10);
        let unique: HashSet<_> = batch.codes.iter().collect();
        assert_eq!(unique.len(), 10);

        let code = batch.codes.first().unwrap();
        let hash = batch.code_hashes.first().unwrap();
        assert!(verify_backup_code(code, hash, pepper).unwrap());
        assert!(!verify_backup_code("ABCD-EFGH-9999", hash, pepper).unwrap());
    }

    #[test]
    fn wrong_pepper_fails_verification() {
        let batch = BackupCodeBatch::generate(1, b"pepper").unwrap();
        let code = batch.codes.first().unwrap();
        let hash = batch.code_hashes.first().unwrap();
        assert!(!verify_backup_code(code, hash, b"other-pepper").unwrap());
    }
}
