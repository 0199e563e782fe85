//! Little-endian encoding helpers.

/// Append a u32 to the output buffer in little-endian byte order.
#[inline]
pub fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

/// Chop a little-endian u32 off the front of the data.
/// Modifies the data slice to point to the remaining bytes.
pub fn chop_u32(data: &mut &[u8]) -> Option<u32> {
    if data.len() < 4 {
        return None;
    }
    let (head, rest) = data.split_at(4);
    *data = rest;
    Some(u32::from_le_bytes([head[0], head[1], head[2], head[3]]))
}

/// Reassemble payload words into bytes, each word little-endian.
pub fn words_to_bytes(words: &[u32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(words.len() * 4);
    for &word in words {
        out.extend_from_slice(&word.to_le_bytes());
    }
    out
}

/// Pack bytes into payload words. Returns `None` unless the input is a whole
/// number of words; nonce bytes survive the round trip unchanged because each
/// word is re-encoded little-endian on the wire.
pub fn bytes_to_words(bytes: &[u8]) -> Option<Vec<u32>> {
    if bytes.len() % 4 != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
    )
}
