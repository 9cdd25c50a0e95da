//! Packet payload checksum.
//!
//! This is a positional rolling sum in the spirit of Adler-32, but it is not
//! Adler-32: there is no modulus, and the 4-byte unrolled loop stops while at
//! least one byte is left over, even when the length is a multiple of four.
//! Peers compare the value bit for bit, so the loop bound must stay as is.

/// Compute the checksum of a serialized envelope.
///
/// Inputs shorter than four bytes always yield 0.
pub fn checksum(data: &[u8]) -> u32 {
    if data.len() < 4 {
        return 0;
    }

    let mut s1: u32 = 0;
    let mut s2: u32 = 0;

    // Only the low 16 bits of each accumulator survive the final mix, so
    // wrapping arithmetic gives the same result as unbounded integers.
    let mut i = 0;
    while i < data.len() - 4 {
        let (b0, b1, b2, b3) = (
            u32::from(data[i]),
            u32::from(data[i + 1]),
            u32::from(data[i + 2]),
            u32::from(data[i + 3]),
        );
        s2 = s2.wrapping_add(
            s1.wrapping_add(b0)
                .wrapping_mul(4)
                .wrapping_add(3 * b1)
                .wrapping_add(2 * b2)
                .wrapping_add(b3),
        );
        s1 = s1.wrapping_add(b0 + b1 + b2 + b3);
        i += 4;
    }

    for &byte in &data[i..] {
        s1 = s1.wrapping_add(u32::from(byte));
        s2 = s2.wrapping_add(s1);
    }

    (s1 & 0xFFFF).wrapping_add(s2 << 16)
}
