//! Uuid compression into the token form embedded in asset documents.
//!
//! Scene and prefab documents reference scripts by a compressed uuid: a
//! short head of the hex digits is kept verbatim and every following hex
//! triple (12 bits) is packed into two base64 characters.

use uuid::Uuid;

const BASE64_KEYS: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

/// Deterministic, one-way transform from a uuid to its embedded token.
pub trait TokenCodec: Send + Sync {
    /// Compress a canonical dashed uuid into its token form.
    fn compress(&self, uuid: &str) -> String;
}

impl<F> TokenCodec for F
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn compress(&self, uuid: &str) -> String {
        self(uuid)
    }
}

/// The uuid compression used by Cocos Creator documents.
#[derive(Debug, Clone, Copy)]
pub struct CocosUuidCodec {
    reserved_head: usize,
}

impl CocosUuidCodec {
    /// Standard 23-character tokens (5 hex digits kept verbatim).
    pub fn new() -> Self {
        Self { reserved_head: 5 }
    }

    /// Minimal 22-character tokens (2 hex digits kept verbatim).
    pub fn min() -> Self {
        Self { reserved_head: 2 }
    }
}

impl Default for CocosUuidCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenCodec for CocosUuidCodec {
    fn compress(&self, uuid: &str) -> String {
        // Anything that is not a uuid passes through untouched.
        if Uuid::parse_str(uuid).is_err() {
            return uuid.to_string();
        }

        let hex: Vec<u8> = uuid.bytes().filter(|b| *b != b'-').collect();
        if hex.len() != 32 {
            return uuid.to_string();
        }

        compress_hex(&hex, self.reserved_head)
    }
}

fn compress_hex(hex: &[u8], reserved_head: usize) -> String {
    let mut token = String::with_capacity(reserved_head + (hex.len() - reserved_head) / 3 * 2);
    token.extend(hex[..reserved_head].iter().map(|b| *b as char));

    for triple in hex[reserved_head..].chunks(3) {
        let nibble = |i: usize| triple.get(i).map(|b| hex_value(*b)).unwrap_or(0) as usize;
        let (a, b, c) = (nibble(0), nibble(1), nibble(2));
        token.push(BASE64_KEYS[(a << 2) | (b >> 2)] as char);
        token.push(BASE64_KEYS[((b & 3) << 4) | c] as char);
    }

    token
}

fn hex_value(digit: u8) -> u8 {
    (digit as char).to_digit(16).unwrap_or(0) as u8
}
