use std::fmt;

use data_encoding::HEXLOWER;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::helpers::rng::get_crypto_rng;

/// Keeps credential material out of `Debug` output and log records. The
/// inner value is only reachable through [`Secret::expose`], which makes
/// every read grep-able.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret<T> {
    inner: T,
}

impl<T> Secret<T> {
    pub const fn new(inner: T) -> Self {
        Self { inner }
    }

    pub fn expose(&self) -> &T {
        &self.inner
    }
}

impl Secret<String> {
    /// 256 bits of entropy, hex-encoded. Used for generated session
    /// signing keys.
    pub fn random() -> Self {
        let mut bytes = [0u8; 32];
        get_crypto_rng().fill(&mut bytes);
        Secret::new(HEXLOWER.encode(&bytes))
    }
}

impl<T: Serialize> Serialize for Secret<T> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.inner.serialize(serializer)
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Secret<T> {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        T::deserialize(deserializer).map(Secret::new)
    }
}

impl<T> fmt::Debug for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_never_prints_the_value() {
        let secret = Secret::new("hunter2".to_owned());
        let printed = format!("{secret:?}");
        assert_eq!(printed, "<redacted>");
        assert_eq!(secret.expose(), "hunter2");
    }

    #[test]
    fn test_random_is_hex_of_32_bytes() {
        let secret = Secret::random();
        assert_eq!(secret.expose().len(), 64);
        assert_ne!(secret, Secret::random());
    }

    #[test]
    fn test_serde_passthrough() {
        let secret: Secret<String> = serde_json::from_str(r#""p""#).unwrap();
        assert_eq!(secret.expose(), "p");
        assert_eq!(serde_json::to_string(&secret).unwrap(), r#""p""#);
    }
}
