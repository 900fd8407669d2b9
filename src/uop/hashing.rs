/// Hashes a synthetic entry name into the 64-bit key used by UOP directories.
///
/// The three accumulators consume the input in 12-byte strides; the final
/// partial stride (1 to 12 bytes) is folded in afterwards and mixed once more.
/// The result must match what the archive writer produced bit for bit: a
/// divergence silently hides entries instead of failing.
#[must_use]
pub fn create_hash(s: &[u8]) -> u64 {
    let word = |i: usize| u32::from_le_bytes([s[i], s[i + 1], s[i + 2], s[i + 3]]);

    // lengths are folded modulo 2^32
    #[allow(clippy::cast_possible_truncation)]
    let seed = (s.len() as u32).wrapping_add(0xDEAD_BEEF);
    let (mut a, mut b, mut c) = (seed, seed, seed);
    let mut i = 0;

    while i + 12 < s.len() {
        b = b.wrapping_add(word(i + 4));
        c = c.wrapping_add(word(i + 8));
        let mut d = word(i).wrapping_sub(c);

        d = d.wrapping_add(a) ^ (c >> 28) ^ (c << 4);
        c = c.wrapping_add(b);
        b = b.wrapping_sub(d) ^ (d >> 26) ^ (d << 6);
        d = d.wrapping_add(c);
        c = c.wrapping_sub(b) ^ (b >> 24) ^ (b << 8);
        b = b.wrapping_add(d);
        a = d.wrapping_sub(c) ^ (c >> 16) ^ (c << 16);
        c = c.wrapping_add(b);
        b = b.wrapping_sub(a) ^ (a >> 13) ^ (a << 19);
        a = a.wrapping_add(c);
        c = c.wrapping_sub(b) ^ (b >> 28) ^ (b << 4);
        b = b.wrapping_add(a);

        i += 12;
    }

    let tail = &s[i..];
    if tail.is_empty() {
        return u64::from(c) << 32;
    }

    for (k, &byte) in tail.iter().enumerate() {
        let v = u32::from(byte) << ((k % 4) * 8);
        match k / 4 {
            0 => a = a.wrapping_add(v),
            1 => b = b.wrapping_add(v),
            _ => c = c.wrapping_add(v),
        }
    }

    c = (c ^ b).wrapping_sub((b >> 18) ^ (b << 14));
    let x = (c ^ a).wrapping_sub((c >> 21) ^ (c << 11));
    b = (b ^ x).wrapping_sub((x >> 7) ^ (x << 25));
    c = (c ^ b).wrapping_sub((b >> 16) ^ (b << 16));
    let d = (c ^ x).wrapping_sub((c >> 28) ^ (c << 4));
    b = (b ^ d).wrapping_sub((d >> 18) ^ (d << 14));
    let lo = (c ^ b).wrapping_sub((b >> 8) ^ (b << 24));

    (u64::from(b) << 32) | u64::from(lo)
}
