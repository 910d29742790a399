//! Just enough Solidity ABI for `mint(string)` and `name()`.

use super::ChainError;

/// `keccak256("mint(string)")[..4]`
pub const MINT_SELECTOR: [u8; 4] = [0xd8, 0x5d, 0x3d, 0x27];
/// `keccak256("name()")[..4]`
pub const NAME_SELECTOR: [u8; 4] = [0x06, 0xfd, 0xde, 0x03];

const WORD: usize = 32;

fn word(value: u64) -> [u8; WORD] {
    let mut out = [0u8; WORD];
    out[WORD - 8..].copy_from_slice(&value.to_be_bytes());
    out
}

fn read_word(data: &[u8], at: usize) -> Result<usize, ChainError> {
    let end = checked_end(at, WORD)?;
    let slot = data
        .get(at..end)
        .ok_or_else(|| ChainError::Decode(format!("return data too short for word at {}", at)))?;
    if slot[..WORD - 8].iter().any(|b| *b != 0) {
        return Err(ChainError::Decode("ABI offset does not fit in 64 bits".into()));
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&slot[WORD - 8..]);
    usize::try_from(u64::from_be_bytes(buf)).map_err(|e| ChainError::Decode(e.to_string()))
}

fn checked_end(start: usize, len: usize) -> Result<usize, ChainError> {
    start
        .checked_add(len)
        .ok_or_else(|| ChainError::Decode(format!("ABI range {}+{} overflows", start, len)))
}

/// Calldata for a function taking no arguments.
pub fn encode_call(selector: [u8; 4]) -> Vec<u8> {
    selector.to_vec()
}

/// Calldata for a function whose only argument is a `string`.
pub fn encode_string_call(selector: [u8; 4], value: &str) -> Vec<u8> {
    let bytes = value.as_bytes();
    let padded = bytes.len().div_ceil(WORD) * WORD;

    let mut out = Vec::with_capacity(4 + 2 * WORD + padded);
    out.extend_from_slice(&selector);
    out.extend_from_slice(&word(WORD as u64));
    out.extend_from_slice(&word(bytes.len() as u64));
    out.extend_from_slice(bytes);
    out.resize(4 + 2 * WORD + padded, 0);
    out
}

/// Decode a single dynamic `string` return value.
pub fn decode_string(data: &[u8]) -> Result<String, ChainError> {
    let offset = read_word(data, 0)?;
    let len = read_word(data, offset)?;
    let start = checked_end(offset, WORD)?;
    let raw = data
        .get(start..checked_end(start, len)?)
        .ok_or_else(|| ChainError::Decode("string runs past end of return data".into()))?;
    String::from_utf8(raw.to_vec()).map_err(|e| ChainError::Decode(e.to_string()))
}

pub fn to_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

pub fn from_hex(value: &str) -> Result<Vec<u8>, ChainError> {
    let trimmed = value.strip_prefix("0x").unwrap_or(value);
    hex::decode(trimmed).map_err(|e| ChainError::Decode(format!("invalid hex {:?}: {}", value, e)))
}

/// JSON-RPC quantity encoding (minimal hex, `0x` prefixed).
pub fn quantity(value: u128) -> String {
    format!("{:#x}", value)
}

pub fn parse_quantity(value: &str) -> Result<u64, ChainError> {
    let trimmed = value.strip_prefix("0x").unwrap_or(value);
    u64::from_str_radix(trimmed, 16).map_err(|e| ChainError::Decode(format!("invalid quantity {:?}: {}", value, e)))
}
