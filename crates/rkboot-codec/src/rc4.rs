//! Fixed-key RC4, used as a scrambler rather than a security primitive.
//!
//! Logical sectors 0, 2 and 3 are stored XORed with this keystream on NAND;
//! sector 1 is cleartext. The cipher state is rebuilt on every call, so each
//! sector sees the keystream from position zero and scrambling is its own
//! inverse.

const KEY: [u8; 16] = [
    0x7C, 0x4E, 0x03, 0x04, 0x55, 0x05, 0x09, 0x07, 0x2D, 0x2C, 0x7B, 0x38,
    0x17, 0x0D, 0x17, 0x11,
];

/// XORs `buf[offset..offset + len]` in place with the RC4 keystream.
/// Bytes outside the window are untouched.
///
/// # Panics
///
/// Panics if the window does not fit in `buf`; that is a caller bug.
pub fn rc4_xor(buf: &mut [u8], offset: usize, len: usize) {
    assert!(
        offset.checked_add(len).is_some_and(|end| end <= buf.len()),
        "RC4 window out of bounds"
    );

    let mut s = [0u8; 256];
    let mut k = [0u8; 256];
    for i in 0..256 {
        s[i] = i as u8;
        k[i] = KEY[i % KEY.len()];
    }

    let mut j = 0u8;
    for i in 0..256 {
        j = j.wrapping_add(s[i]).wrapping_add(k[i]);
        s.swap(i, usize::from(j));
    }

    let mut i = 0u8;
    let mut j = 0u8;
    for byte in &mut buf[offset..offset + len] {
        i = i.wrapping_add(1);
        j = j.wrapping_add(s[usize::from(i)]);
        s.swap(usize::from(i), usize::from(j));
        let t = s[usize::from(i)].wrapping_add(s[usize::from(j)]);
        *byte ^= s[usize::from(t)];
    }
}
