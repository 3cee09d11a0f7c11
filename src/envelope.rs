//! The layered MCS cryptographic envelope: leading-byte detection, XOR
//! masking, zlib (de)compression, and the [`crate::nls::NlsCipher`] innermost
//! layer.
//!
//! Two envelope variants are recognized on decrypt: the "redirect" variant
//! (leading byte `0x35`, XOR-masked zlib with no NLS layer) and the standard
//! variant (leading bytes `0xE5 0x1F`, NLS-enciphered zlib). `encrypt` is the
//! inverse of each, selected by `ContentType`.

use crate::{
    error::{Error, Report},
    nls::NlsCipher,
};
use flate2::{
    write::{ZlibDecoder, ZlibEncoder},
    Compression,
};
use std::io::Write as _;

const MCPK: [u8; 4] = *b"MCPK";
const BCBC_PREFIX: &[u8] = b"bcbc";
const BCBC_XOR_LEN: usize = 130;
const BCBC_XOR_KEY: u8 = 0x9C;

/// Selects which encryption scheme `encrypt` produces. There is no wire
/// marker for this; a producer and its consumer must agree on it out of
/// band, exactly as the reference tooling does (it is a CLI flag).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    /// The standard variant: reverse, XOR the first 130 bytes, zlib-deflate,
    /// then NLS-encrypt.
    Standard,
    /// The "redirect.mcs" variant: zlib-deflate, then XOR the first 4 bytes
    /// with `"MCPK"`.
    Redirect,
}

fn xor_prefix(buf: &mut [u8], len: usize, key: u8) {
    for byte in buf.iter_mut().take(len) {
        *byte ^= key;
    }
}

pub(crate) fn inflate(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(Vec::new());
    decoder.write_all(data)?;
    decoder.finish()
}

pub(crate) fn deflate(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
    // Writing to an in-memory Vec<u8> target cannot fail.
    encoder.write_all(data).expect("in-memory zlib write");
    encoder.finish().expect("in-memory zlib finish")
}

/// Reverses the layered envelope, returning the recovered plaintext. Rather
/// than aborting on malformed input, failures are recorded as warnings
/// alongside the best-effort buffer recovered up to that point, matching the
/// reference tool's recovery behavior.
#[must_use]
pub fn decrypt(data: &[u8]) -> Report<Vec<u8>> {
    let zlib_content = match data.first() {
        Some(0x35) => {
            let mut buf = data.to_vec();
            for i in 0..4.min(buf.len()) {
                buf[i] = data[i] ^ MCPK[i];
            }
            buf
        }
        Some(0xE5) if data.get(1) == Some(&0x1F) => NlsCipher::default().decrypt(data),
        _ => return Report::new(data.to_vec(), vec![Error::UnrecognizedEnvelope]),
    };

    if zlib_content.len() <= 2 {
        return Report::new(zlib_content, vec![Error::UnrecognizedEnvelope]);
    }

    let (h1, h2) = (zlib_content[0], zlib_content[1]);
    if h1 != 0x78 || !matches!(h2, 0x01 | 0x9C | 0xDA) {
        return Report::new(zlib_content, vec![Error::UnrecognizedEnvelope]);
    }

    match inflate(&zlib_content) {
        Ok(mut final_content) => {
            if final_content.starts_with(BCBC_PREFIX) {
                let n = final_content.len().min(BCBC_XOR_LEN);
                xor_prefix(&mut final_content, n, BCBC_XOR_KEY);
                final_content.reverse();
            }
            Report::ok(final_content)
        }
        Err(_) => Report::new(zlib_content, vec![Error::Zlib]),
    }
}

/// Produces an envelope of the given `content_type` wrapping `plaintext`.
/// This is the literal inverse of `decrypt`'s corresponding branch; it never
/// fails (in-memory zlib compression does not error).
#[must_use]
pub fn encrypt(plaintext: &[u8], content_type: ContentType) -> Vec<u8> {
    match content_type {
        ContentType::Redirect => {
            let mut zlib_content = deflate(plaintext);
            for i in 0..4.min(zlib_content.len()) {
                zlib_content[i] ^= MCPK[i];
            }
            zlib_content
        }
        ContentType::Standard => {
            let mut wrapped: Vec<u8> = plaintext.iter().rev().copied().collect();
            let n = wrapped.len().min(BCBC_XOR_LEN);
            xor_prefix(&mut wrapped, n, BCBC_XOR_KEY);
            let zlib_content = deflate(&wrapped);
            NlsCipher::default().encrypt(&zlib_content)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{decrypt, encrypt, ContentType};

    #[test]
    fn standard_envelope_round_trips() {
        let plaintext = b"the quick brown fox jumps over the lazy dog".repeat(4);
        let enveloped = encrypt(&plaintext, ContentType::Standard);
        let recovered = decrypt(&enveloped);
        assert!(recovered.is_clean());
        assert_eq!(recovered.value, plaintext);
    }

    #[test]
    fn redirect_envelope_round_trips() {
        let plaintext = b"redirect.mcs payload".to_vec();
        let enveloped = encrypt(&plaintext, ContentType::Redirect);
        let recovered = decrypt(&enveloped);
        assert!(recovered.is_clean());
        assert_eq!(recovered.value, plaintext);
    }

    #[test]
    fn bcbc_prefixed_payload_is_reversed_after_inflate() {
        let mut inner = b"bcbc".to_vec();
        inner.extend_from_slice(&[0u8; 200]);
        let enveloped = encrypt(&inner, ContentType::Standard);
        let recovered = decrypt(&enveloped);
        assert!(recovered.is_clean());
        assert_eq!(recovered.value, inner);
    }

    #[test]
    fn unrecognized_leading_byte_reports_warning() {
        let garbage = vec![0x00, 0x01, 0x02, 0x03];
        let recovered = decrypt(&garbage);
        assert!(!recovered.is_clean());
        assert_eq!(recovered.value, garbage);
    }
}
