//! PKCS#7 padding for the AES-CTR payload.

pub(crate) const BLOCK_SIZE: usize = 16;

/// Pad `data` up to the next block boundary.
///
/// Empty input pads to one full block, so the ciphertext is never empty.
pub(crate) fn pad(data: &[u8]) -> Vec<u8> {
    let pad_len = BLOCK_SIZE - data.len() % BLOCK_SIZE;
    let mut padded = Vec::with_capacity(data.len() + pad_len);
    padded.extend_from_slice(data);
    padded.resize(data.len() + pad_len, pad_len as u8);
    padded
}

/// Strip the padding from a decrypted block sequence.
///
/// Returns `None` when the trailing bytes are not a valid PKCS#7 run,
/// which after decryption means the key (and so the password) was wrong
/// in a way the HMAC check did not already catch, or the payload is
/// corrupt.
pub(crate) fn unpad(data: &[u8]) -> Option<&[u8]> {
    if data.is_empty() || data.len() % BLOCK_SIZE != 0 {
        return None;
    }
    let last = *data.last()?;
    let pad_len = last as usize;
    if pad_len == 0 || pad_len > BLOCK_SIZE {
        return None;
    }
    let (rest, padding) = data.split_at(data.len() - pad_len);
    padding.iter().all(|&b| b == last).then_some(rest)
}
