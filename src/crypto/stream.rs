//! Lumen Vault - Streaming Authenticated Encryption
//!
//! File format (version 1):
//! ```text
//! [MAGIC 8B]["LMNVAULT"]
//! [VERSION 1B][0x01]
//! [CHUNK]*[ciphertext + 16B GCM tag, 4 MiB of plaintext per chunk]
//! [MARKER 8B]["LMNV-END"]
//! ```
//!
//! Chunk nonces are never stored: the nonce for chunk *i* is the 96-bit
//! big-endian counter *i*, so reordered or duplicated chunks fail their
//! tags. The trailing marker is the only signal that encryption ran to
//! completion - a stream without it is *incomplete* (interrupted write),
//! which is distinct from a stream whose chunk tags fail (tampering).

use std::io::{ErrorKind, Read, Write};

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};

use super::keys::VaultKey;
use crate::error::{VaultError, VaultResult};
use crate::progress::CancelToken;

/// Magic bytes identifying a Lumen Vault encrypted file
pub const MAGIC: [u8; 8] = *b"LMNVAULT";

/// Current format version
pub const FORMAT_VERSION: u8 = 0x01;

/// Trailing marker written only after the final chunk
pub const COMPLETION_MARKER: [u8; 8] = *b"LMNV-END";

/// Plaintext bytes per chunk (4 MiB)
pub const CHUNK_SIZE: usize = 4 * 1024 * 1024;

/// GCM nonce size (96 bits)
pub const NONCE_LEN: usize = 12;

/// GCM authentication tag size
pub const TAG_LEN: usize = 16;

/// Header size: MAGIC(8) + VERSION(1)
pub const HEADER_LEN: usize = MAGIC.len() + 1;

fn chunk_nonce(counter: u64) -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    nonce[4..].copy_from_slice(&counter.to_be_bytes());
    nonce
}

fn cipher_for(key: &VaultKey) -> VaultResult<Aes256Gcm> {
    Aes256Gcm::new_from_slice(key.expose())
        .map_err(|_| VaultError::InvalidKeyLength {
            expected: super::keys::KEY_LEN,
            actual: key.expose().len(),
        })
}

/// Fill `buf` from the reader, stopping only at EOF. Returns bytes read.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Append to `buf` until it holds `target` bytes or the reader hits EOF.
fn fill_to<R: Read>(reader: &mut R, buf: &mut Vec<u8>, target: usize) -> std::io::Result<()> {
    let mut len = buf.len();
    buf.resize(target, 0);
    while len < target {
        match reader.read(&mut buf[len..]) {
            Ok(0) => break,
            Ok(n) => len += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                buf.truncate(len);
                return Err(e);
            }
        }
    }
    buf.truncate(len);
    Ok(())
}

/// Encrypting stream that processes plaintext in chunks.
pub struct StreamEncryptor<'a> {
    key: &'a VaultKey,
    chunk_size: usize,
}

impl<'a> StreamEncryptor<'a> {
    pub fn new(key: &'a VaultKey) -> Self {
        Self {
            key,
            chunk_size: CHUNK_SIZE,
        }
    }

    /// Override the chunk size (tests use small chunks)
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        assert!(size > 0);
        self.chunk_size = size;
        self
    }

    /// Encrypt everything from `reader` into `writer`.
    /// Returns the number of plaintext bytes consumed.
    pub fn encrypt<R: Read, W: Write>(&self, reader: R, writer: W) -> VaultResult<u64> {
        self.encrypt_with(reader, writer, &CancelToken::new(), &mut |_| {})
    }

    /// Encrypt with cooperative cancellation and per-chunk progress.
    ///
    /// The cancel flag is checked between chunks; on cancellation the
    /// output is abandoned mid-stream (no completion marker), so the
    /// caller must discard it - vault pipelines write through a temp
    /// file that is removed on error.
    pub fn encrypt_with<R: Read, W: Write>(
        &self,
        mut reader: R,
        mut writer: W,
        cancel: &CancelToken,
        on_chunk: &mut dyn FnMut(u64),
    ) -> VaultResult<u64> {
        let cipher = cipher_for(self.key)?;

        writer.write_all(&MAGIC)?;
        writer.write_all(&[FORMAT_VERSION])?;

        let mut buf = vec![0u8; self.chunk_size];
        let mut counter: u64 = 0;
        let mut total: u64 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(VaultError::Cancelled);
            }

            let n = read_full(&mut reader, &mut buf)?;
            if n == 0 {
                break;
            }

            let nonce = chunk_nonce(counter);
            let ciphertext = cipher
                .encrypt(Nonce::from_slice(&nonce), &buf[..n])
                .map_err(|_| VaultError::EncryptionFailed(format!("chunk {}", counter)))?;
            writer.write_all(&ciphertext)?;

            counter += 1;
            total += n as u64;
            on_chunk(total);

            if n < self.chunk_size {
                break;
            }
        }

        writer.write_all(&COMPLETION_MARKER)?;
        writer.flush()?;

        Ok(total)
    }
}

/// Decrypting stream. Restartable only from the start: nonces are
/// recomputed by chunk index, so there is no mid-stream seeking.
pub struct StreamDecryptor<'a> {
    key: &'a VaultKey,
    chunk_size: usize,
}

impl<'a> StreamDecryptor<'a> {
    pub fn new(key: &'a VaultKey) -> Self {
        Self {
            key,
            chunk_size: CHUNK_SIZE,
        }
    }

    /// Override the chunk size (must match the encryptor's)
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        assert!(size > 0);
        self.chunk_size = size;
        self
    }

    /// Decrypt everything from `reader` into `writer`.
    /// Returns the number of plaintext bytes produced.
    pub fn decrypt<R: Read, W: Write>(&self, reader: R, writer: W) -> VaultResult<u64> {
        self.decrypt_with(reader, writer, &CancelToken::new(), &mut |_| {})
    }

    /// Decrypt with cooperative cancellation and per-chunk progress.
    ///
    /// Fails fast: a tag mismatch on any chunk aborts the whole decrypt
    /// with [`VaultError::IntegrityCheckFailed`]. A missing completion
    /// marker is reported as [`VaultError::IncompleteFile`] instead.
    pub fn decrypt_with<R: Read, W: Write>(
        &self,
        mut reader: R,
        mut writer: W,
        cancel: &CancelToken,
        on_chunk: &mut dyn FnMut(u64),
    ) -> VaultResult<u64> {
        let cipher = cipher_for(self.key)?;

        let mut header = [0u8; HEADER_LEN];
        if read_full(&mut reader, &mut header)? < HEADER_LEN {
            return Err(VaultError::InvalidFileFormat("truncated header".into()));
        }
        if header[..MAGIC.len()] != MAGIC {
            return Err(VaultError::InvalidFileFormat("bad magic bytes".into()));
        }
        let version = header[MAGIC.len()];
        if version != FORMAT_VERSION {
            // Fail closed on silently up- or downgraded formats.
            return Err(VaultError::UnsupportedVersion(version));
        }

        let enc_chunk_len = self.chunk_size + TAG_LEN;
        let marker_len = COMPLETION_MARKER.len();

        // Keep an 8-byte holdback while reading: until EOF we cannot tell
        // whether the trailing bytes are the marker or more chunk data.
        let mut pending: Vec<u8> = Vec::with_capacity(enc_chunk_len + marker_len);
        let mut counter: u64 = 0;
        let mut total: u64 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(VaultError::Cancelled);
            }

            fill_to(&mut reader, &mut pending, enc_chunk_len + marker_len)?;

            if pending.len() == enc_chunk_len + marker_len {
                // A full chunk is present regardless of what the holdback is.
                let nonce = chunk_nonce(counter);
                let plaintext = cipher
                    .decrypt(Nonce::from_slice(&nonce), &pending[..enc_chunk_len])
                    .map_err(|_| VaultError::IntegrityCheckFailed)?;
                writer.write_all(&plaintext)?;

                counter += 1;
                total += plaintext.len() as u64;
                on_chunk(total);

                pending.drain(..enc_chunk_len);
                continue;
            }

            // EOF: `pending` holds the whole remainder of the stream.
            if pending.len() < marker_len {
                return Err(VaultError::IncompleteFile);
            }
            let body_len = pending.len() - marker_len;
            if pending[body_len..] != COMPLETION_MARKER {
                return Err(VaultError::IncompleteFile);
            }
            if body_len == 0 {
                break; // empty plaintext, or marker right after the last full chunk
            }
            if body_len < TAG_LEN {
                return Err(VaultError::InvalidFileFormat(
                    "final chunk shorter than its tag".into(),
                ));
            }

            let nonce = chunk_nonce(counter);
            let plaintext = cipher
                .decrypt(Nonce::from_slice(&nonce), &pending[..body_len])
                .map_err(|_| VaultError::IntegrityCheckFailed)?;
            writer.write_all(&plaintext)?;

            total += plaintext.len() as u64;
            on_chunk(total);
            break;
        }

        writer.flush()?;
        Ok(total)
    }
}

/// Encrypt a complete byte slice. Convenience for small payloads
/// (thumbnails, catalog) where everything fits in memory.
pub fn encrypt_bytes(key: &VaultKey, data: &[u8]) -> VaultResult<Vec<u8>> {
    let mut output = Vec::with_capacity(HEADER_LEN + data.len() + TAG_LEN + COMPLETION_MARKER.len());
    StreamEncryptor::new(key).encrypt(data, &mut output)?;
    Ok(output)
}

/// Decrypt a complete byte slice produced by [`encrypt_bytes`] or
/// [`StreamEncryptor`]. No plaintext is released unless every chunk
/// authenticates and the completion marker is present.
pub fn decrypt_bytes(key: &VaultKey, data: &[u8]) -> VaultResult<Vec<u8>> {
    let mut output = Vec::new();
    StreamDecryptor::new(key).decrypt(data, &mut output)?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_CHUNK: usize = 1024;

    fn test_key() -> VaultKey {
        VaultKey::new([42u8; 32])
    }

    fn encrypt_small(key: &VaultKey, data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        StreamEncryptor::new(key)
            .with_chunk_size(TEST_CHUNK)
            .encrypt(data, &mut out)
            .unwrap();
        out
    }

    fn decrypt_small(key: &VaultKey, data: &[u8]) -> VaultResult<Vec<u8>> {
        let mut out = Vec::new();
        StreamDecryptor::new(key)
            .with_chunk_size(TEST_CHUNK)
            .decrypt(data, &mut out)?;
        Ok(out)
    }

    #[test]
    fn test_roundtrip_boundary_lengths() {
        let key = test_key();
        for len in [0, 1, TEST_CHUNK - 1, TEST_CHUNK, TEST_CHUNK + 1, 3 * TEST_CHUNK] {
            let plaintext: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
            let encrypted = encrypt_small(&key, &plaintext);
            let decrypted = decrypt_small(&key, &encrypted).unwrap();
            assert_eq!(decrypted, plaintext, "length {}", len);
        }
    }

    #[test]
    fn test_header_layout() {
        let key = test_key();
        let encrypted = encrypt_small(&key, b"tiny");

        assert_eq!(&encrypted[..8], &MAGIC);
        assert_eq!(encrypted[8], FORMAT_VERSION);
        assert_eq!(&encrypted[encrypted.len() - 8..], &COMPLETION_MARKER);
        // header + ciphertext + tag + marker
        assert_eq!(encrypted.len(), HEADER_LEN + 4 + TAG_LEN + 8);
    }

    #[test]
    fn test_wrong_key_fails() {
        let encrypted = encrypt_small(&test_key(), b"secret media bytes");
        let result = decrypt_small(&VaultKey::generate(), &encrypted);
        assert!(matches!(result, Err(VaultError::IntegrityCheckFailed)));
    }

    #[test]
    fn test_tamper_any_byte_is_integrity_failure() {
        let key = test_key();
        let plaintext = vec![0xA5u8; 2 * TEST_CHUNK + 100];
        let encrypted = encrypt_small(&key, &plaintext);

        // Flip every 97th byte of the chunk region, one at a time.
        for pos in (HEADER_LEN..encrypted.len() - 8).step_by(97) {
            let mut tampered = encrypted.clone();
            tampered[pos] ^= 0x01;
            let result = decrypt_small(&key, &tampered);
            assert!(
                matches!(result, Err(VaultError::IntegrityCheckFailed)),
                "byte {} accepted after tampering",
                pos
            );
        }
    }

    #[test]
    fn test_missing_marker_is_incomplete_not_corrupt() {
        let key = test_key();
        let encrypted = encrypt_small(&key, &vec![1u8; TEST_CHUNK + 17]);

        let truncated = &encrypted[..encrypted.len() - 8];
        let result = decrypt_small(&key, truncated);
        assert!(matches!(result, Err(VaultError::IncompleteFile)));

        // Same file with the marker intact but a tag bit flipped is
        // corruption, and the two must be distinguishable.
        let mut tampered = encrypted.clone();
        let tag_byte = encrypted.len() - 9; // last byte of the final tag
        tampered[tag_byte] ^= 0x80;
        let result = decrypt_small(&key, &tampered);
        assert!(matches!(result, Err(VaultError::IntegrityCheckFailed)));
    }

    #[test]
    fn test_truncated_mid_chunk_is_incomplete() {
        let key = test_key();
        let encrypted = encrypt_small(&key, &vec![9u8; 3 * TEST_CHUNK]);

        let cut = HEADER_LEN + TEST_CHUNK + TAG_LEN + 100; // inside chunk 2
        let result = decrypt_small(&key, &encrypted[..cut]);
        assert!(matches!(result, Err(VaultError::IncompleteFile)));
    }

    #[test]
    fn test_bad_magic_is_format_error() {
        let key = test_key();
        let mut encrypted = encrypt_small(&key, b"data");
        encrypted[0] = b'X';

        let result = decrypt_small(&key, &encrypted);
        assert!(matches!(result, Err(VaultError::InvalidFileFormat(_))));
    }

    #[test]
    fn test_unknown_version_fails_closed() {
        let key = test_key();
        let mut encrypted = encrypt_small(&key, b"data");
        encrypted[8] = 0x02;

        let result = decrypt_small(&key, &encrypted);
        assert!(matches!(result, Err(VaultError::UnsupportedVersion(2))));
    }

    #[test]
    fn test_empty_plaintext_roundtrip() {
        let key = test_key();
        let encrypted = encrypt_small(&key, b"");
        assert_eq!(encrypted.len(), HEADER_LEN + 8);
        assert_eq!(decrypt_small(&key, &encrypted).unwrap(), b"");
    }

    #[test]
    fn test_cancellation_stops_between_chunks() {
        let key = test_key();
        let cancel = CancelToken::new();
        cancel.cancel();

        let mut out = Vec::new();
        let result = StreamEncryptor::new(&key)
            .with_chunk_size(TEST_CHUNK)
            .encrypt_with(&b"some data"[..], &mut out, &cancel, &mut |_| {});
        assert!(matches!(result, Err(VaultError::Cancelled)));
    }

    #[test]
    fn test_progress_reports_cumulative_bytes() {
        let key = test_key();
        let plaintext = vec![3u8; 2 * TEST_CHUNK + 50];

        let mut reported = Vec::new();
        let mut out = Vec::new();
        StreamEncryptor::new(&key)
            .with_chunk_size(TEST_CHUNK)
            .encrypt_with(&plaintext[..], &mut out, &CancelToken::new(), &mut |n| {
                reported.push(n)
            })
            .unwrap();

        assert_eq!(
            reported,
            vec![TEST_CHUNK as u64, 2 * TEST_CHUNK as u64, plaintext.len() as u64]
        );

        let mut reported = Vec::new();
        let mut plain = Vec::new();
        StreamDecryptor::new(&key)
            .with_chunk_size(TEST_CHUNK)
            .decrypt_with(&out[..], &mut plain, &CancelToken::new(), &mut |n| {
                reported.push(n)
            })
            .unwrap();
        assert_eq!(*reported.last().unwrap(), plaintext.len() as u64);
    }

    #[test]
    fn test_default_chunk_size_roundtrip() {
        // One small file through the real 4 MiB configuration.
        let key = test_key();
        let encrypted = encrypt_bytes(&key, b"full-size chunk config").unwrap();
        assert_eq!(
            decrypt_bytes(&key, &encrypted).unwrap(),
            b"full-size chunk config"
        );
    }
}
