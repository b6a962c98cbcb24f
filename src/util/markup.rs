/// Reduces an HTML-ish message body as sent by official clients to plain text: tags are removed
///  and the handful of entities the server actually produces are decoded.
pub fn strip_markup(body: &str) -> String {
    let mut result = String::with_capacity(body.len());
    let mut in_tag = false;

    for c in body.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            c if !in_tag => result.push(c),
            _ => {}
        }
    }

    decode_entities(&result)
}

fn decode_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }

    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod test {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::plain("hello", "hello")]
    #[case::html("<HTML><BODY BGCOLOR=\"#ffffff\">hi <B>there</B></BODY></HTML>", "hi there")]
    #[case::entities("a &lt;b&gt; &amp; &quot;c&quot;", "a <b> & \"c\"")]
    #[case::double_escaped("&amp;lt;", "&lt;")]
    #[case::unterminated_tag("before <font", "before ")]
    #[case::stray_gt("a > b", "a > b")]
    fn test_strip_markup(#[case] body: &str, #[case] expected: &str) {
        assert_eq!(strip_markup(body), expected);
    }
}
