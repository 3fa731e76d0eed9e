//! League join codes.
//!
//! Codes are six upper-case characters drawn from an alphabet without the
//! easily confused `0`, `O`, `1`, `I` and `L`. Lookups normalize the
//! candidate the same way so "abc234 " finds "ABC234".

use rand::Rng;

use crate::error::{LeagueError, Result};

pub const JOIN_CODE_LEN: usize = 6;

/// Shortest code accepted when joining
pub const MIN_JOIN_CODE_LEN: usize = 4;

const ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";

/// Draw a fresh random join code
pub fn generate_join_code() -> String {
    let mut rng = rand::thread_rng();
    (0..JOIN_CODE_LEN)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

/// Trim and upper-case a user supplied code
pub fn normalize_join_code(candidate: &str) -> Result<String> {
    let code = candidate.trim().to_uppercase();
    if code.chars().count() < MIN_JOIN_CODE_LEN {
        return Err(LeagueError::validation(
            "code",
            format!("join code must be at least {} characters", MIN_JOIN_CODE_LEN),
        ));
    }
    Ok(code)
}
