/// Screen names are compared case-insensitively and ignoring whitespace, both by the server and
///  in all local lookups (buddy list, session keys, probe echo detection).
pub fn normalize(screen_name: &str) -> String {
    screen_name.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

pub fn same_identity(a: &str, b: &str) -> bool {
    normalize(a) == normalize(b)
}

#[cfg(test)]
mod test {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::plain("bob", "bob")]
    #[case::upper("BoB", "bob")]
    #[case::spaces(" Big Bob ", "bigbob")]
    #[case::tabs("big\tbob", "bigbob")]
    #[case::empty("", "")]
    fn test_normalize(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(normalize(raw), expected);
    }

    #[test]
    fn test_same_identity() {
        assert!(same_identity("Big Bob", "bigbob"));
        assert!(!same_identity("bob", "carol"));
    }
}
