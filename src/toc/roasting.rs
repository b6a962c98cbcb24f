//! The credential obfuscation and challenge response required by the sign-on command. Neither
//!  is cryptographically meaningful, both are fixed by the protocol.

const ROAST_KEY: &[u8] = b"Tic/Toc";


/// XORs each byte of the password with the cycled key, rendered as lower case hex with a single
///  `0x` prefix
pub fn roast_password(password: &str) -> String {
    let mut result = String::with_capacity(2 + 2 * password.len());
    result.push_str("0x");
    for (i, b) in password.bytes().enumerate() {
        result.push_str(&format!("{:02x}", b ^ ROAST_KEY[i % ROAST_KEY.len()]));
    }
    result
}

/// Reverses [roast_password]. `None` if `roasted` is not well-formed.
pub fn unroast_password(roasted: &str) -> Option<String> {
    let hex = roasted.strip_prefix("0x")?;
    if hex.len() % 2 != 0 {
        return None;
    }
    let bytes = (0..hex.len()).step_by(2)
        .map(|i| hex.get(i..i + 2).and_then(|b| u8::from_str_radix(b, 16).ok()))
        .enumerate()
        .map(|(i, b)| b.map(|b| b ^ ROAST_KEY[i % ROAST_KEY.len()]))
        .collect::<Option<Vec<u8>>>()?;
    String::from_utf8(bytes).ok()
}

fn first_unit(s: &str) -> i32 {
    s.encode_utf16().next().unwrap_or(0) as i32 - 96
}

/// The challenge response for `toc2_signon`, in wrapping 32 bit arithmetic. Note that it depends
///  on the case of the screen name's first letter.
pub fn challenge_code(screen_name: &str, password: &str) -> i32 {
    let sn = first_unit(screen_name);
    let pw = first_unit(password);

    let a = sn.wrapping_mul(7696).wrapping_add(738816);
    let b = sn.wrapping_mul(746512);
    let c = pw.wrapping_mul(a);
    c.wrapping_sub(a).wrapping_add(b).wrapping_add(71665152)
}


#[cfg(test)]
mod test {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::password("password", "0x2408105c23001130")]
    #[case::single_char("a", "0x35")]
    #[case::key_wraps_around("secretpass1", "0x270c005d311b13351a101e")]
    #[case::empty("", "0x")]
    fn test_roast_password(#[case] password: &str, #[case] expected: &str) {
        assert_eq!(roast_password(password), expected);
        assert_eq!(roast_password(password), roast_password(password));
    }

    #[rstest]
    #[case::password("password")]
    #[case::key_wraps_around("secretpass1")]
    #[case::non_ascii("pässwörd")]
    #[case::empty("")]
    fn test_unroast_password(#[case] password: &str) {
        assert_eq!(unroast_password(&roast_password(password)).as_deref(), Some(password));
    }

    #[rstest]
    #[case::no_prefix("2408")]
    #[case::odd_length("0x240")]
    #[case::not_hex("0xzz")]
    fn test_unroast_password_malformed(#[case] roasted: &str) {
        assert_eq!(unroast_password(roasted), None);
    }

    #[rstest]
    #[case("alice", "password", 83609344)]
    #[case("bob", "secret", 86733920)]
    #[case("testuser", "Hunter2", 64276992)]
    #[case::case_sensitive("Bob", "secret", 58412640)]
    fn test_challenge_code(#[case] screen_name: &str, #[case] password: &str, #[case] expected: i32) {
        assert_eq!(challenge_code(screen_name, password), expected);
    }

    #[test]
    fn test_challenge_code_does_not_overflow() {
        challenge_code("\u{ffff}", "\u{ffff}");
        challenge_code("", "");
    }
}
