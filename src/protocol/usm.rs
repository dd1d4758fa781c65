//! User-based Security Model (RFC 3414): password-to-key localization,
//! authentication digests, and privacy encryption/decryption.

use aes::Aes128;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use cfb_mode::{Decryptor as CfbDecryptor, Encryptor as CfbEncryptor};
use des::Des;
use hmac::{Hmac, Mac};
use md5::Md5;
use sha1::Sha1;
use sha2::{Sha224, Sha256, Sha384, Sha512};

use crate::{Error, Result};

/// Authentication protocols supported by a v3 user (RFC 3414 + RFC 7860).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthProtocol {
    Md5,
    Sha1,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
}

impl AuthProtocol {
    /// Truncated digest length carried on the wire (usmHMAC…-96, or the
    /// first half of the full digest for the SHA-2 variants, per RFC 7860).
    pub(crate) fn wire_len(&self) -> usize {
        match self {
            AuthProtocol::Md5 | AuthProtocol::Sha1 => 12,
            AuthProtocol::Sha224 => 16,
            AuthProtocol::Sha256 => 24,
            AuthProtocol::Sha384 => 32,
            AuthProtocol::Sha512 => 48,
        }
    }
}

/// Privacy protocols supported by a v3 user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrivProtocol {
    Des,
    Aes128,
}

/// A fully localized (per-engine) USM user, ready to authenticate/encrypt.
#[derive(Debug, Clone)]
pub struct UsmUser {
    pub user_name: String,
    pub auth: Option<(AuthProtocol, Vec<u8>)>,
    pub privacy: Option<(PrivProtocol, Vec<u8>)>,
}

/// Password-to-key (RFC 3414 Appendix A.2): repeats the password to fill 1MB,
/// hashes it, then localizes against the engine ID (Appendix A.3).
pub fn localize_key(proto: AuthProtocol, password: &[u8], engine_id: &[u8]) -> Vec<u8> {
    const EXPANDED_LEN: usize = 1024 * 1024;
    let mut expanded = Vec::with_capacity(EXPANDED_LEN);
    while expanded.len() < EXPANDED_LEN {
        let remaining = EXPANDED_LEN - expanded.len();
        expanded.extend(password.iter().take(remaining));
    }
    let ku = digest(proto, &expanded);

    let mut localized_input = Vec::with_capacity(ku.len() * 2 + engine_id.len());
    localized_input.extend(&ku);
    localized_input.extend(engine_id);
    localized_input.extend(&ku);
    digest(proto, &localized_input)
}

fn digest(proto: AuthProtocol, data: &[u8]) -> Vec<u8> {
    match proto {
        AuthProtocol::Md5 => <Md5 as md5::Digest>::digest(data).to_vec(),
        AuthProtocol::Sha1 => <Sha1 as sha1::Digest>::digest(data).to_vec(),
        AuthProtocol::Sha224 => <Sha224 as sha2::Digest>::digest(data).to_vec(),
        AuthProtocol::Sha256 => <Sha256 as sha2::Digest>::digest(data).to_vec(),
        AuthProtocol::Sha384 => <Sha384 as sha2::Digest>::digest(data).to_vec(),
        AuthProtocol::Sha512 => <Sha512 as sha2::Digest>::digest(data).to_vec(),
    }
}

/// Computes the truncated HMAC digest placed in `msgAuthenticationParameters`.
/// `message` is the whole BER message with the auth-parameters field
/// zero-filled to its final length, per RFC 3414 §6.3.1.
pub fn auth_digest(proto: AuthProtocol, key: &[u8], message: &[u8]) -> Result<Vec<u8>> {
    let full = match proto {
        AuthProtocol::Md5 => hmac_digest::<Hmac<Md5>>(key, message)?,
        AuthProtocol::Sha1 => hmac_digest::<Hmac<Sha1>>(key, message)?,
        AuthProtocol::Sha224 => hmac_digest::<Hmac<Sha224>>(key, message)?,
        AuthProtocol::Sha256 => hmac_digest::<Hmac<Sha256>>(key, message)?,
        AuthProtocol::Sha384 => hmac_digest::<Hmac<Sha384>>(key, message)?,
        AuthProtocol::Sha512 => hmac_digest::<Hmac<Sha512>>(key, message)?,
    };
    Ok(full[..proto.wire_len()].to_vec())
}

fn hmac_digest<M: Mac + hmac::digest::KeyInit>(key: &[u8], message: &[u8]) -> Result<Vec<u8>> {
    let mut mac =
        <M as hmac::digest::KeyInit>::new_from_slice(key).map_err(|e| Error::usm(e.to_string()))?;
    mac.update(message);
    Ok(mac.finalize().into_bytes().to_vec())
}

pub fn verify_auth_digest(
    proto: AuthProtocol,
    key: &[u8],
    message: &[u8],
    claimed: &[u8],
) -> Result<bool> {
    let expected = auth_digest(proto, key, message)?;
    Ok(expected.len() == claimed.len() && expected == claimed)
}

/// Encrypts a scoped PDU with DES-CBC (RFC 3414 §8.1.1) or AES-128-CFB
/// (RFC 3826), returning (ciphertext, salt-based `privParameters`).
pub fn encrypt(
    proto: PrivProtocol,
    priv_key: &[u8],
    engine_boots: i32,
    engine_time: i32,
    salt_seed: u64,
    plaintext: &[u8],
) -> Result<(Vec<u8>, Vec<u8>)> {
    match proto {
        PrivProtocol::Des => {
            if priv_key.len() < 16 {
                return Err(Error::usm("DES privacy key must be at least 16 bytes"));
            }
            let des_key = &priv_key[..8];
            let pre_iv = &priv_key[8..16];
            let salt = salt_seed.to_be_bytes();
            let mut iv = [0u8; 8];
            for i in 0..8 {
                iv[i] = pre_iv[i] ^ salt[i];
            }
            let padded_len = ((plaintext.len() + 7) / 8) * 8;
            let mut buf = plaintext.to_vec();
            buf.resize(padded_len, 0);
            let encryptor = cbc::Encryptor::<Des>::new(des_key.into(), (&iv).into());
            let ciphertext = encryptor
                .encrypt_padded_vec_mut::<cbc::cipher::block_padding::NoPadding>(&buf);
            Ok((ciphertext, salt.to_vec()))
        }
        PrivProtocol::Aes128 => {
            if priv_key.len() < 16 {
                return Err(Error::usm("AES privacy key must be at least 16 bytes"));
            }
            use cfb_mode::cipher::AsyncStreamCipher;
            let iv = aes_iv(engine_boots, engine_time, salt_seed);
            let mut buf = plaintext.to_vec();
            CfbEncryptor::<Aes128>::new(priv_key[..16].into(), (&iv).into()).encrypt(&mut buf);
            Ok((buf, salt_seed.to_be_bytes().to_vec()))
        }
    }
}

pub fn decrypt(
    proto: PrivProtocol,
    priv_key: &[u8],
    engine_boots: i32,
    engine_time: i32,
    priv_params: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>> {
    match proto {
        PrivProtocol::Des => {
            if priv_key.len() < 16 {
                return Err(Error::usm("DES privacy key must be at least 16 bytes"));
            }
            if priv_params.len() != 8 {
                return Err(Error::usm("DES privParameters must be 8 bytes"));
            }
            if ciphertext.len() % 8 != 0 {
                return Err(Error::usm("DES ciphertext is not block-aligned"));
            }
            let des_key = &priv_key[..8];
            let pre_iv = &priv_key[8..16];
            let mut iv = [0u8; 8];
            for i in 0..8 {
                iv[i] = pre_iv[i] ^ priv_params[i];
            }
            let decryptor = cbc::Decryptor::<Des>::new(des_key.into(), (&iv).into());
            decryptor
                .decrypt_padded_vec_mut::<cbc::cipher::block_padding::NoPadding>(ciphertext)
                .map_err(|_| Error::usm("DES decryption failed"))
        }
        PrivProtocol::Aes128 => {
            if priv_key.len() < 16 {
                return Err(Error::usm("AES privacy key must be at least 16 bytes"));
            }
            if priv_params.len() != 8 {
                return Err(Error::usm("AES privParameters must be 8 bytes"));
            }
            let mut salt_bytes = [0u8; 8];
            salt_bytes.copy_from_slice(priv_params);
            use cfb_mode::cipher::AsyncStreamCipher;
            let iv = aes_iv(engine_boots, engine_time, u64::from_be_bytes(salt_bytes));
            let mut buf = ciphertext.to_vec();
            CfbDecryptor::<Aes128>::new(priv_key[..16].into(), (&iv).into()).decrypt(&mut buf);
            Ok(buf)
        }
    }
}

fn aes_iv(engine_boots: i32, engine_time: i32, salt_seed: u64) -> [u8; 16] {
    let mut iv = [0u8; 16];
    iv[0..4].copy_from_slice(&(engine_boots as u32).to_be_bytes());
    iv[4..8].copy_from_slice(&(engine_time as u32).to_be_bytes());
    iv[8..16].copy_from_slice(&salt_seed.to_be_bytes());
    iv
}

/// Accepted clock skew between a v3 request's `engineTime` and ours (§4.2).
pub const TIME_WINDOW_SECS: i32 = 150;

/// True if the request falls inside the time window for the given
/// authoritative `(engine_boots, engine_time)`; a boots mismatch always fails.
pub fn in_time_window(
    local_boots: i32,
    local_time: i32,
    received_boots: i32,
    received_time: i32,
) -> bool {
    received_boots == local_boots && (received_time - local_time).abs() <= TIME_WINDOW_SECS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn md5_key_localizes_to_16_bytes() {
        let key = localize_key(AuthProtocol::Md5, b"maplesyrup", &[0x00, 0x00, 0x00, 0x00, 0x00]);
        assert_eq!(key.len(), 16);
    }

    #[test]
    fn sha1_key_localizes_to_20_bytes() {
        let key = localize_key(AuthProtocol::Sha1, b"maplesyrup", &[0x00, 0x00, 0x00, 0x00, 0x00]);
        assert_eq!(key.len(), 20);
    }

    #[test]
    fn auth_digest_round_trips_through_verify() {
        let key = localize_key(AuthProtocol::Sha1, b"auctoritas", b"engine-id-bytes");
        let message = b"a fake BER-encoded SNMPv3 message with zeroed auth params";
        let digest = auth_digest(AuthProtocol::Sha1, &key, message).unwrap();
        assert_eq!(digest.len(), 12);
        assert!(verify_auth_digest(AuthProtocol::Sha1, &key, message, &digest).unwrap());
    }

    #[test]
    fn wrong_key_fails_verification() {
        let key = localize_key(AuthProtocol::Md5, b"correct", b"engine-id-bytes");
        let wrong_key = localize_key(AuthProtocol::Md5, b"incorrect", b"engine-id-bytes");
        let message = b"payload";
        let digest = auth_digest(AuthProtocol::Md5, &key, message).unwrap();
        assert!(!verify_auth_digest(AuthProtocol::Md5, &wrong_key, message, &digest).unwrap());
    }

    #[test]
    fn des_privacy_round_trips() {
        let key = vec![0x11; 16];
        let (ciphertext, priv_params) =
            encrypt(PrivProtocol::Des, &key, 1, 100, 0xdead_beef, b"0123456789abcdef").unwrap();
        let plaintext = decrypt(PrivProtocol::Des, &key, 1, 100, &priv_params, &ciphertext).unwrap();
        assert_eq!(plaintext, b"0123456789abcdef");
    }

    #[test]
    fn aes_privacy_round_trips() {
        let key = vec![0x22; 16];
        let (ciphertext, priv_params) =
            encrypt(PrivProtocol::Aes128, &key, 2, 500, 42, b"scoped pdu bytes").unwrap();
        let plaintext =
            decrypt(PrivProtocol::Aes128, &key, 2, 500, &priv_params, &ciphertext).unwrap();
        assert_eq!(plaintext, b"scoped pdu bytes");
    }

    #[test]
    fn time_window_accepts_within_150s_and_matching_boots() {
        assert!(in_time_window(5, 1000, 5, 1100));
        assert!(in_time_window(5, 1000, 5, 900));
        assert!(!in_time_window(5, 1000, 5, 1200));
        assert!(!in_time_window(5, 1000, 6, 1000));
    }
}
