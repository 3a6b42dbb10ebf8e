//! Book identifiers: 13-character Crockford base32 strings.

use uuid::Uuid;

const CROCKFORD_ALPHABET: &[u8; 32] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";

pub const BOOK_ID_LEN: usize = 13;

/// Encodes `num` in Crockford base32, left-padded with `0` to `length`.
pub fn encode_crockford(mut num: u128, length: usize) -> String {
    let mut chars = Vec::with_capacity(length);

    while num > 0 {
        chars.push(CROCKFORD_ALPHABET[(num % 32) as usize]);
        num /= 32;
    }

    while chars.len() < length {
        chars.push(b'0');
    }

    chars.reverse();
    chars.into_iter().map(char::from).collect()
}

/// Generates a random book identifier from the random bits of a v4 UUID.
pub fn generate_book_id() -> String {
    let bits = (BOOK_ID_LEN * 5) as u32;
    let mask = (1u128 << bits) - 1;
    encode_crockford(Uuid::new_v4().as_u128() & mask, BOOK_ID_LEN)
}

pub fn is_valid_book_id(id: &str) -> bool {
    id.len() == BOOK_ID_LEN && id.bytes().all(|b| CROCKFORD_ALPHABET.contains(&b))
}
