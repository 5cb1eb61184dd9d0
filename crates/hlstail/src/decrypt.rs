use std::{collections::HashMap, fmt, sync::Arc};

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, KeyIvInit};

use crate::error::{TailError, TailResult};

pub const METHOD_NONE: &str = "NONE";
pub const METHOD_AES_128: &str = "AES-128";

/// A decryption primitive for one `METHOD` of `#EXT-X-KEY`.
pub trait Decrypter: Send + Sync {
    /// Rejects key material that can never decrypt anything.
    fn validate_key(&self, _key: &[u8]) -> TailResult<()> {
        Ok(())
    }

    fn decrypt(&self, key: &[u8], iv: &[u8; 16], data: &[u8]) -> TailResult<Vec<u8>>;
}

/// AES-128 in CBC mode with PKCS#7 padding.
pub struct Aes128Cbc;

impl Decrypter for Aes128Cbc {
    fn validate_key(&self, key: &[u8]) -> TailResult<()> {
        if key.len() != 16 {
            return Err(TailError::InvalidAes128Key(key.to_vec()));
        }
        Ok(())
    }

    fn decrypt(&self, key: &[u8], iv: &[u8; 16], data: &[u8]) -> TailResult<Vec<u8>> {
        let decryptor = cbc::Decryptor::<aes::Aes128>::new_from_slices(key, iv)
            .map_err(|_| TailError::InvalidAes128Key(key.to_vec()))?;
        Ok(decryptor.decrypt_padded_vec_mut::<Pkcs7>(data)?)
    }
}

/// Decryption methods known to the downloader, keyed by method name.
#[derive(Clone)]
pub struct DecrypterRegistry {
    methods: HashMap<String, Arc<dyn Decrypter>>,
}

impl DecrypterRegistry {
    pub fn empty() -> Self {
        Self {
            methods: HashMap::new(),
        }
    }

    pub fn register(&mut self, method: impl Into<String>, decrypter: impl Decrypter + 'static) {
        self.methods.insert(method.into(), Arc::new(decrypter));
    }

    pub fn with(mut self, method: impl Into<String>, decrypter: impl Decrypter + 'static) -> Self {
        self.register(method, decrypter);
        self
    }

    pub fn get(&self, method: &str) -> TailResult<Arc<dyn Decrypter>> {
        self.methods
            .get(method)
            .cloned()
            .ok_or_else(|| TailError::UnsupportedKeyMethod(method.to_string()))
    }

    pub fn contains(&self, method: &str) -> bool {
        self.methods.contains_key(method)
    }
}

impl Default for DecrypterRegistry {
    fn default() -> Self {
        Self::empty().with(METHOD_AES_128, Aes128Cbc)
    }
}

/// Key material of one chunk list generation.
pub struct EncryptionContext {
    method: String,
    key: Vec<u8>,
    iv: [u8; 16],
    decrypter: Arc<dyn Decrypter>,
}

impl EncryptionContext {
    /// `iv` defaults to sixteen zero bytes.
    pub fn new(
        registry: &DecrypterRegistry,
        method: impl Into<String>,
        key: Vec<u8>,
        iv: Option<[u8; 16]>,
    ) -> TailResult<Self> {
        let method = method.into();
        let decrypter = registry.get(&method)?;
        decrypter.validate_key(&key)?;

        Ok(Self {
            method,
            key,
            iv: iv.unwrap_or([0; 16]),
            decrypter,
        })
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }

    pub fn iv(&self) -> &[u8; 16] {
        &self.iv
    }

    pub fn decrypt(&self, data: &[u8]) -> TailResult<Vec<u8>> {
        self.decrypter.decrypt(&self.key, &self.iv, data)
    }
}

impl fmt::Debug for EncryptionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionContext")
            .field("method", &self.method)
            .field("iv", &hex::encode(self.iv))
            .finish_non_exhaustive()
    }
}

/// Parses the `IV` attribute of `#EXT-X-KEY`: a hexadecimal number, optionally
/// prefixed with `0x`, left padded to 16 bytes.
pub fn parse_iv(iv: &str) -> TailResult<[u8; 16]> {
    let digits = iv
        .strip_prefix("0x")
        .or_else(|| iv.strip_prefix("0X"))
        .unwrap_or(iv);
    if digits.is_empty() || digits.len() > 32 {
        return Err(TailError::InvalidIv(iv.to_string()));
    }

    let padded = format!("{digits:0>32}");
    let bytes = hex::decode(padded).map_err(|_| TailError::InvalidIv(iv.to_string()))?;

    let mut result = [0; 16];
    result.copy_from_slice(&bytes);
    Ok(result)
}
