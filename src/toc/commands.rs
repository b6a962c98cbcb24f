//! Builders for the outbound text commands. They produce command lines only, sending them is up
//!  to the caller (see [crate::sender::rate_limited_sender::RateLimitedSender]).

use crate::buddy::buddy_list::PermitMode;
use crate::toc::roasting::{challenge_code, roast_password};
use crate::util::normalize::normalize;


pub const INIT_DONE: &str = "toc_init_done";

/// Maximum number of message body bytes per `toc2_send_im` command
pub const DEFAULT_MAX_MESSAGE_CHUNK: usize = 1024;

/// Maximum size of the buddy list part of a single buddy list modification command
pub const DEFAULT_MAX_BUDDY_BATCH: usize = 1800;

/// The fixed magic number the sign-on command carries between revision and challenge response
const SIGNON_MAGIC: u32 = 160;


/// Backslash-escapes the characters the server's argument parser treats specially
pub fn escape(text: &str) -> String {
    let mut result = String::with_capacity(text.len() + 8);
    for ch in text.chars() {
        if matches!(ch, '$' | '{' | '}' | '[' | ']' | '(' | ')' | '"' | '\\') {
            result.push('\\');
        }
        result.push(ch);
    }
    result
}

pub fn quote(text: &str) -> String {
    format!("\"{}\"", escape(text))
}


#[derive(Clone, Debug)]
pub struct SignonParams<'a> {
    pub auth_host: &'a str,
    pub auth_port: u16,
    pub screen_name: &'a str,
    pub password: &'a str,
    pub language: &'a str,
    pub revision: &'a str,
}

pub fn signon(params: &SignonParams) -> String {
    let screen_name = normalize(params.screen_name);
    format!("toc2_signon {} {} {} {} {} {} {} {}",
            params.auth_host,
            params.auth_port,
            screen_name,
            roast_password(params.password),
            params.language,
            quote(params.revision),
            SIGNON_MAGIC,
            challenge_code(&screen_name, params.password),
    )
}

pub fn set_info(profile: &str) -> String {
    format!("toc_set_info {}", quote(profile))
}

/// Splits `text` into chunks of at most `max_bytes` bytes without splitting characters. An
///  empty text yields a single empty chunk.
pub fn split_chunks(text: &str, max_bytes: usize) -> Vec<&str> {
    let max_bytes = max_bytes.max(4);

    let mut result = Vec::new();
    let mut rest = text;
    while rest.len() > max_bytes {
        let mut split_at = max_bytes;
        while !rest.is_char_boundary(split_at) {
            split_at -= 1;
        }
        let (chunk, remainder) = rest.split_at(split_at);
        result.push(chunk);
        rest = remainder;
    }
    result.push(rest);
    result
}

/// One `toc2_send_im` command per chunk of the message body
pub fn send_im(recipient: &str, message: &str, auto_response: bool, max_chunk: usize) -> Vec<String> {
    let recipient = normalize(recipient);
    split_chunks(message, max_chunk).into_iter()
        .map(|chunk| {
            if auto_response {
                format!("toc2_send_im {} {} auto", recipient, quote(chunk))
            }
            else {
                format!("toc2_send_im {} {}", recipient, quote(chunk))
            }
        })
        .collect()
}

/// `None` comes back from being away
pub fn set_away(message: Option<&str>) -> String {
    match message {
        Some(message) => format!("toc_set_away {}", quote(message)),
        None => "toc_set_away".to_string(),
    }
}

pub fn evil(user: &str, anonymous: bool) -> String {
    format!("toc_evil {} {}", normalize(user), if anonymous { "anon" } else { "norm" })
}

/// Adds buddies to a group, creating the group if necessary. The buddy list part of each command
///  stays within `max_batch` bytes (unless a single buddy exceeds it on its own).
pub fn new_buddies<'a>(group: &str, buddies: impl IntoIterator<Item = &'a str>, max_batch: usize) -> Vec<String> {
    let header = format!("g:{}\n", group);

    let mut result = Vec::new();
    let mut body = header.clone();
    for buddy in buddies.into_iter().map(normalize).filter(|b| !b.is_empty()) {
        let line = format!("b:{}\n", buddy);
        if body.len() + line.len() > max_batch && body.len() > header.len() {
            result.push(format!("toc2_new_buddies {{{}}}", body));
            body = header.clone();
        }
        body.push_str(&line);
    }
    if body.len() > header.len() {
        result.push(format!("toc2_new_buddies {{{}}}", body));
    }
    result
}

/// Removes buddies from a group, batched like [new_buddies]
pub fn remove_buddies<'a>(group: &str, buddies: impl IntoIterator<Item = &'a str>, max_batch: usize) -> Vec<String> {
    let group = quote(group);
    batched_list("toc2_remove_buddy", buddies, &group, max_batch)
}

pub fn add_permit<'a>(users: impl IntoIterator<Item = &'a str>, max_batch: usize) -> Vec<String> {
    batched_list("toc2_add_permit", users, "", max_batch)
}

pub fn add_deny<'a>(users: impl IntoIterator<Item = &'a str>, max_batch: usize) -> Vec<String> {
    batched_list("toc2_add_deny", users, "", max_batch)
}

fn batched_list<'a>(command: &str, users: impl IntoIterator<Item = &'a str>, suffix: &str, max_batch: usize) -> Vec<String> {
    let finish = |names: &str| {
        if suffix.is_empty() {
            format!("{}{}", command, names)
        }
        else {
            format!("{}{} {}", command, names, suffix)
        }
    };

    let mut result = Vec::new();
    let mut names = String::new();
    for user in users.into_iter().map(normalize).filter(|u| !u.is_empty()) {
        if names.len() + user.len() + 1 > max_batch && !names.is_empty() {
            result.push(finish(&names));
            names.clear();
        }
        names.push(' ');
        names.push_str(&user);
    }
    if !names.is_empty() {
        result.push(finish(&names));
    }
    result
}

pub fn set_pdmode(mode: PermitMode) -> String {
    format!("toc2_set_pdmode {}", u8::from(mode))
}

pub fn rvous_accept(peer: &str, cookie: &str, service: &str) -> String {
    format!("toc_rvous_accept {} {} {}", normalize(peer), cookie, service)
}

pub fn rvous_cancel(peer: &str, cookie: &str, service: &str) -> String {
    format!("toc_rvous_cancel {} {} {}", normalize(peer), cookie, service)
}


#[cfg(test)]
mod test {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::plain("hello world", "hello world")]
    #[case::all_special(r#"${}[]()"\"#, r#"\$\{\}\[\]\(\)\"\\"#)]
    #[case::colon_untouched("a:b", "a:b")]
    fn test_escape(#[case] text: &str, #[case] expected: &str) {
        assert_eq!(escape(text), expected);
    }

    #[test]
    fn test_signon() {
        let command = signon(&SignonParams {
            auth_host: "login.oscar.aol.com",
            auth_port: 29999,
            screen_name: "Alice Smith",
            password: "password",
            language: "english",
            revision: "TIC:TOC2",
        });
        assert_eq!(command, format!("toc2_signon login.oscar.aol.com 29999 alicesmith 0x2408105c23001130 english \"TIC:TOC2\" 160 {}", challenge_code("alicesmith", "password")));
    }

    #[rstest]
    #[case::capitalized("Alice")]
    #[case::spaced("a l i c e")]
    #[case::already_normalized("alice")]
    fn test_signon_challenge_matches_sent_screen_name(#[case] screen_name: &str) {
        let command = signon(&SignonParams {
            auth_host: "login.oscar.aol.com",
            auth_port: 29999,
            screen_name,
            password: "password",
            language: "english",
            revision: "TIC:TOC2",
        });
        let fields = command.split(' ').collect::<Vec<_>>();
        assert_eq!(fields[3], "alice");
        assert_eq!(fields.last().copied(), Some("83609344"));
        assert_eq!(fields.last().copied(), Some(challenge_code(fields[3], "password").to_string().as_str()));
    }

    #[test]
    fn test_set_info() {
        assert_eq!(set_info("I am (here)"), r#"toc_set_info "I am \(here\)""#);
    }

    #[test]
    fn test_send_im_splits_long_messages() {
        let message = "x".repeat(2050);
        let commands = send_im("Bob", &message, false, DEFAULT_MAX_MESSAGE_CHUNK);

        assert_eq!(commands.len(), 3);
        assert_eq!(commands[0], format!("toc2_send_im bob \"{}\"", "x".repeat(1024)));
        assert_eq!(commands[1], format!("toc2_send_im bob \"{}\"", "x".repeat(1024)));
        assert_eq!(commands[2], "toc2_send_im bob \"xx\"");
    }

    #[test]
    fn test_send_im_auto_response() {
        assert_eq!(send_im("bob", "away", true, DEFAULT_MAX_MESSAGE_CHUNK), vec!["toc2_send_im bob \"away\" auto".to_string()]);
    }

    #[rstest]
    #[case::empty("", 10, vec![""])]
    #[case::exact("abcd", 4, vec!["abcd"])]
    #[case::ascii("abcdefghij", 4, vec!["abcd", "efgh", "ij"])]
    #[case::multi_byte("ääää", 5, vec!["ää", "ää"])]
    fn test_split_chunks(#[case] text: &str, #[case] max_bytes: usize, #[case] expected: Vec<&str>) {
        assert_eq!(split_chunks(text, max_bytes), expected);
    }

    #[test]
    fn test_set_away() {
        assert_eq!(set_away(Some("gone")), "toc_set_away \"gone\"");
        assert_eq!(set_away(None), "toc_set_away");
    }

    #[test]
    fn test_evil() {
        assert_eq!(evil("Bob Smith", false), "toc_evil bobsmith norm");
        assert_eq!(evil("bob", true), "toc_evil bob anon");
    }

    #[test]
    fn test_new_buddies() {
        assert_eq!(new_buddies("Friends", ["Bob", "carol"], DEFAULT_MAX_BUDDY_BATCH), vec!["toc2_new_buddies {g:Friends\nb:bob\nb:carol\n}".to_string()]);
        assert!(new_buddies("Friends", Vec::<&str>::new(), DEFAULT_MAX_BUDDY_BATCH).is_empty());
    }

    #[test]
    fn test_new_buddies_batching() {
        let names = (0..300).map(|i| format!("buddy{:04}", i)).collect::<Vec<_>>();
        let commands = new_buddies("Friends", names.iter().map(|s| s.as_str()), DEFAULT_MAX_BUDDY_BATCH);

        assert!(commands.len() > 1);
        let mut total = 0;
        for command in &commands {
            let body = command.strip_prefix("toc2_new_buddies {").unwrap().strip_suffix('}').unwrap();
            assert!(body.len() <= DEFAULT_MAX_BUDDY_BATCH);
            assert!(body.starts_with("g:Friends\n"));
            total += body.matches("b:").count();
        }
        assert_eq!(total, 300);
    }

    #[test]
    fn test_remove_buddies() {
        assert_eq!(remove_buddies("My Friends", ["Bob", "carol"], DEFAULT_MAX_BUDDY_BATCH), vec!["toc2_remove_buddy bob carol \"My Friends\"".to_string()]);

        let names = (0..500).map(|i| format!("buddy{:04}", i)).collect::<Vec<_>>();
        let commands = remove_buddies("g", names.iter().map(|s| s.as_str()), DEFAULT_MAX_BUDDY_BATCH);
        assert!(commands.len() > 1);
        assert!(commands.iter().all(|c| c.len() <= "toc2_remove_buddy".len() + DEFAULT_MAX_BUDDY_BATCH + " \"g\"".len()));
        assert_eq!(commands.iter().map(|c| c.split(' ').count() - 2).sum::<usize>(), 500);
    }

    #[test]
    fn test_permit_deny() {
        assert_eq!(add_permit(["Bob", "Carol"], DEFAULT_MAX_BUDDY_BATCH), vec!["toc2_add_permit bob carol".to_string()]);
        assert_eq!(add_deny(["Eve"], DEFAULT_MAX_BUDDY_BATCH), vec!["toc2_add_deny eve".to_string()]);
        assert_eq!(set_pdmode(PermitMode::DenySome), "toc2_set_pdmode 4");
    }

    #[test]
    fn test_rvous() {
        assert_eq!(rvous_accept("Bob", "AAAAAAAAAAE=", "09461343-4C7F-11D1-8222-444553540000"), "toc_rvous_accept bob AAAAAAAAAAE= 09461343-4C7F-11D1-8222-444553540000");
        assert_eq!(rvous_cancel("bob", "AAAAAAAAAAE=", "x"), "toc_rvous_cancel bob AAAAAAAAAAE= x");
    }
}
