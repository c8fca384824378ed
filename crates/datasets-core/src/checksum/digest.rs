//! Checksums of byte buffers, readers and files.
//!
//! ```no_run
//! use _datasets_core::checksum::digest::{digest_file, hash_bytes, HashMethod};
//!
//! let h = hash_bytes(HashMethod::Sha1, b"hello");
//! assert_eq!(h.to_string(), "sha1:aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d");
//! let f = digest_file(HashMethod::Sha1, "file.txt").unwrap();
//! ```

use std::fmt;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha224, Sha256, Sha384, Sha512};
use sha3::{Sha3_224, Sha3_256, Sha3_384, Sha3_512};

use crate::checksum::hash::Hash;
use crate::errors::{DatasetsError, DatasetsResult};

const READ_CHUNK: usize = 64 * 1024;

/// Digest algorithms available to `hash_bytes` / `digest_*`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HashMethod {
    Md5,
    Sha1,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
    Sha3_224,
    Sha3_256,
    Sha3_384,
    Sha3_512,
}

impl HashMethod {
    pub const ALL: [HashMethod; 10] = [
        HashMethod::Md5,
        HashMethod::Sha1,
        HashMethod::Sha224,
        HashMethod::Sha256,
        HashMethod::Sha384,
        HashMethod::Sha512,
        HashMethod::Sha3_224,
        HashMethod::Sha3_256,
        HashMethod::Sha3_384,
        HashMethod::Sha3_512,
    ];

    /// Name as used in the text encoding (`sha1:...`), matching `hashlib`.
    pub fn name(self) -> &'static str {
        match self {
            HashMethod::Md5 => "md5",
            HashMethod::Sha1 => "sha1",
            HashMethod::Sha224 => "sha224",
            HashMethod::Sha256 => "sha256",
            HashMethod::Sha384 => "sha384",
            HashMethod::Sha512 => "sha512",
            HashMethod::Sha3_224 => "sha3_224",
            HashMethod::Sha3_256 => "sha3_256",
            HashMethod::Sha3_384 => "sha3_384",
            HashMethod::Sha3_512 => "sha3_512",
        }
    }
}

impl fmt::Display for HashMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HashMethod {
    type Err = DatasetsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HashMethod::ALL
            .into_iter()
            .find(|m| m.name() == s)
            .ok_or_else(|| {
                let available: Vec<&str> = HashMethod::ALL.iter().map(|m| m.name()).collect();
                DatasetsError::Validation(format!(
                    "Algorithm '{s}' is not available, must be one of {}",
                    available.join(", ")
                ))
            })
    }
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn hex_of<D: Digest>(data: &[u8]) -> String {
    to_hex(&D::digest(data))
}

fn hex_of_reader<D: Digest, R: Read>(reader: &mut R) -> std::io::Result<String> {
    let mut hasher = D::new();
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(to_hex(&hasher.finalize()))
}

fn hexdigest_reader<R: Read>(method: HashMethod, reader: &mut R) -> std::io::Result<String> {
    match method {
        HashMethod::Md5 => hex_of_reader::<Md5, R>(reader),
        HashMethod::Sha1 => hex_of_reader::<Sha1, R>(reader),
        HashMethod::Sha224 => hex_of_reader::<Sha224, R>(reader),
        HashMethod::Sha256 => hex_of_reader::<Sha256, R>(reader),
        HashMethod::Sha384 => hex_of_reader::<Sha384, R>(reader),
        HashMethod::Sha512 => hex_of_reader::<Sha512, R>(reader),
        HashMethod::Sha3_224 => hex_of_reader::<Sha3_224, R>(reader),
        HashMethod::Sha3_256 => hex_of_reader::<Sha3_256, R>(reader),
        HashMethod::Sha3_384 => hex_of_reader::<Sha3_384, R>(reader),
        HashMethod::Sha3_512 => hex_of_reader::<Sha3_512, R>(reader),
    }
}

/// Hash an in-memory buffer. The result carries no filename.
pub fn hash_bytes(method: HashMethod, data: &[u8]) -> Hash {
    let hexdigest = match method {
        HashMethod::Md5 => hex_of::<Md5>(data),
        HashMethod::Sha1 => hex_of::<Sha1>(data),
        HashMethod::Sha224 => hex_of::<Sha224>(data),
        HashMethod::Sha256 => hex_of::<Sha256>(data),
        HashMethod::Sha384 => hex_of::<Sha384>(data),
        HashMethod::Sha512 => hex_of::<Sha512>(data),
        HashMethod::Sha3_224 => hex_of::<Sha3_224>(data),
        HashMethod::Sha3_256 => hex_of::<Sha3_256>(data),
        HashMethod::Sha3_384 => hex_of::<Sha3_384>(data),
        HashMethod::Sha3_512 => hex_of::<Sha3_512>(data),
    };
    build(method, hexdigest, None)
}

/// Hash everything readable from `reader`. The result carries no filename.
pub fn digest_reader<R: Read>(method: HashMethod, mut reader: R) -> DatasetsResult<Hash> {
    let hexdigest = hexdigest_reader(method, &mut reader)?;
    Ok(build(method, hexdigest, None))
}

/// Hash a file on disk; the path, as given, becomes the hash's filename.
pub fn digest_file(method: HashMethod, path: impl AsRef<Path>) -> DatasetsResult<Hash> {
    let path = path.as_ref();
    let filename = path.to_string_lossy().to_string();
    if filename.contains('@') {
        return Err(DatasetsError::Validation(format!(
            "Filename cannot contain '@': '{filename}'"
        )));
    }
    let mut file = std::fs::File::open(path)?;
    let hexdigest = hexdigest_reader(method, &mut file)?;
    Ok(build(method, hexdigest, Some(filename)))
}

fn build(method: HashMethod, hexdigest: String, filename: Option<String>) -> Hash {
    Hash::from_parts(method.name().to_string(), hexdigest, filename)
}
