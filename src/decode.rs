use std::{fmt, marker::PhantomData};

use serde::{de::DeserializeOwned, Deserialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("payload is not valid UTF-8")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("payload is not valid JSON")]
    Json(#[from] serde_json::Error),
}

/// Turns raw message bytes into the value handed to a business process.
pub trait Decoder: Send + Sync + 'static {
    type Output: fmt::Debug + Send + 'static;

    fn decode(&self, bytes: &[u8]) -> Result<Self::Output, DecodeError>;
}

pub struct JsonDecoder<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonDecoder<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for JsonDecoder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Decoder for JsonDecoder<T>
where
    T: DeserializeOwned + fmt::Debug + Send + 'static,
{
    type Output = T;

    fn decode(&self, bytes: &[u8]) -> Result<T, DecodeError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct TextDecoder;

impl Decoder for TextDecoder {
    type Output = String;

    fn decode(&self, bytes: &[u8]) -> Result<String, DecodeError> {
        Ok(std::str::from_utf8(bytes)?.to_owned())
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct BytesDecoder;

impl Decoder for BytesDecoder {
    type Output = Vec<u8>;

    fn decode(&self, bytes: &[u8]) -> Result<Vec<u8>, DecodeError> {
        Ok(bytes.to_vec())
    }
}

/// Decoder picked at runtime, e.g. from the command line.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DecoderKind {
    #[default]
    Text,
    Json,
    Bytes,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Decoded {
    Text(String),
    Json(serde_json::Value),
    Bytes(Vec<u8>),
}

impl fmt::Display for Decoded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Json(value) => write!(f, "{value}"),
            Self::Bytes(bytes) => write!(f, "{bytes:02x?}"),
        }
    }
}

impl Decoder for DecoderKind {
    type Output = Decoded;

    fn decode(&self, bytes: &[u8]) -> Result<Decoded, DecodeError> {
        match self {
            Self::Text => TextDecoder.decode(bytes).map(Decoded::Text),
            Self::Json => JsonDecoder::<serde_json::Value>::new()
                .decode(bytes)
                .map(Decoded::Json),
            Self::Bytes => BytesDecoder.decode(bytes).map(Decoded::Bytes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Order {
        id: u32,
        item: String,
    }

    #[test]
    fn json_decoder_builds_typed_value() {
        let order = JsonDecoder::<Order>::new()
            .decode(br#"{"id": 7, "item": "tea"}"#)
            .unwrap();

        assert_eq!(
            order,
            Order {
                id: 7,
                item: "tea".into()
            }
        );
    }

    #[test]
    fn json_decoder_rejects_garbage() {
        let error = JsonDecoder::<Order>::new().decode(b"not json").unwrap_err();

        assert!(matches!(error, DecodeError::Json(..)));
    }

    #[test]
    fn text_decoder_is_strict() {
        assert_eq!(TextDecoder.decode(b"hello").unwrap(), "hello");
        assert!(matches!(
            TextDecoder.decode(&[0xff, 0xfe]),
            Err(DecodeError::Utf8(..))
        ));
    }

    #[test]
    fn empty_payload_decodes_to_empty_text() {
        assert_eq!(TextDecoder.decode(&[]).unwrap(), "");
        assert!(JsonDecoder::<Order>::new().decode(&[]).is_err());
    }

    #[test]
    fn runtime_decoder_selects_format() {
        assert_eq!(
            DecoderKind::Text.decode(b"plain").unwrap(),
            Decoded::Text("plain".into())
        );
        assert_eq!(
            DecoderKind::Json.decode(b"[1, 2]").unwrap(),
            Decoded::Json(serde_json::json!([1, 2]))
        );
        assert_eq!(
            DecoderKind::Bytes.decode(&[1, 2]).unwrap().to_string(),
            "[01, 02]"
        );
    }
}
