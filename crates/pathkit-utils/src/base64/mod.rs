//! Base64 encoding and decoding (RFC 4648, standard alphabet, padded).

use pathkit_types::PemError;

const ENCODE_TABLE: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

/// Encode bytes to a Base64 string.
pub fn encode(input: &[u8]) -> String {
    let mut output = String::with_capacity(input.len().div_ceil(3) * 4);
    for chunk in input.chunks(3) {
        let mut group = [0u8; 3];
        group[..chunk.len()].copy_from_slice(chunk);
        let triple = u32::from_be_bytes([0, group[0], group[1], group[2]]);
        for i in 0..4 {
            if i <= chunk.len() {
                let index = (triple >> (18 - 6 * i)) & 0x3F;
                output.push(ENCODE_TABLE[index as usize] as char);
            } else {
                output.push('=');
            }
        }
    }
    output
}

/// Decode a Base64 string to bytes. ASCII whitespace is ignored;
/// padding may appear only at the end of the final quantum.
pub fn decode(input: &str) -> Result<Vec<u8>, PemError> {
    let filtered: Vec<u8> = input
        .bytes()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    if filtered.len() % 4 != 0 {
        return Err(PemError::InvalidBase64Length);
    }

    let mut output = Vec::with_capacity(filtered.len() / 4 * 3);
    let quanta = filtered.len() / 4;
    for (n, chunk) in filtered.chunks_exact(4).enumerate() {
        let pad = chunk.iter().rev().take_while(|&&b| b == b'=').count();
        if pad > 2 || (pad > 0 && n + 1 != quanta) {
            return Err(PemError::InvalidBase64Length);
        }
        let mut triple = 0u32;
        for &c in &chunk[..4 - pad] {
            triple = (triple << 6) | decode_char(c)?;
        }
        triple <<= 6 * pad as u32;
        let bytes = triple.to_be_bytes();
        output.extend_from_slice(&bytes[1..4 - pad]);
    }
    Ok(output)
}

fn decode_char(c: u8) -> Result<u32, PemError> {
    match c {
        b'A'..=b'Z' => Ok((c - b'A') as u32),
        b'a'..=b'z' => Ok((c - b'a' + 26) as u32),
        b'0'..=b'9' => Ok((c - b'0' + 52) as u32),
        b'+' => Ok(62),
        b'/' => Ok(63),
        _ => Err(PemError::InvalidBase64Char(c as char)),
    }
}
