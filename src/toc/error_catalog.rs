use crate::toc::command_line::CommandLine;


/// Incorrect nickname or password. Terminal: retrying with the same credentials is pointless.
pub const AUTHENTICATION_FAILED: u32 = 980;

pub const UNKNOWN_ERROR: &str = "unknown error";

const CATALOG: &[(u32, &str)] = &[
    // general
    (901, "$1 not currently available"),
    (902, "Warning of $1 not currently available"),
    (903, "A message has been dropped, you are exceeding the server speed limit"),
    // chat
    (950, "Chat in $1 is unavailable"),
    // instant messaging
    (960, "You are sending messages too fast to $1"),
    (961, "You missed an IM from $1 because it was too big"),
    (962, "You missed an IM from $1 because it was sent too fast"),
    // directory
    (970, "Failure"),
    (971, "Too many matches"),
    (972, "Need more qualifiers"),
    (973, "Directory service temporarily unavailable"),
    (974, "Email lookup restricted"),
    (975, "Keyword ignored"),
    (976, "No keywords"),
    (977, "Language not supported"),
    (978, "Country not supported"),
    (979, "Failure unknown $1"),
    // sign-on
    (AUTHENTICATION_FAILED, "Incorrect nickname or password"),
    (981, "The service is temporarily unavailable"),
    (982, "Your warning level is currently too high to sign on"),
    (983, "You have been connecting and disconnecting too frequently. Wait 10 minutes and try again. If you continue to try, you will need to wait even longer."),
    (989, "An unknown sign-on error has occurred $1"),
];

/// Looks up the text for a server error code, substituting `argument` for `$1`
pub fn describe(code: u32, argument: Option<&str>) -> String {
    match CATALOG.iter().find(|(c, _)| *c == code) {
        Some((_, text)) => text.replace("$1", argument.unwrap_or("")).trim_end().to_string(),
        None => UNKNOWN_ERROR.to_string(),
    }
}

pub fn is_known(code: u32) -> bool {
    CATALOG.iter().any(|(c, _)| *c == code)
}


/// `ERROR:<code>[:<argument>]`
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ServerError {
    pub code: u32,
    pub argument: Option<String>,
    pub message: String,
}
impl ServerError {
    /// `None` if the line is not an error or its code is not numeric
    pub fn from_command(line: &CommandLine) -> Option<ServerError> {
        if line.name() != "ERROR" {
            return None;
        }
        let code = line.arg(0)?.trim().parse::<u32>().ok()?;
        let argument = Some(line.tail(1)).filter(|a| !a.is_empty());

        Some(ServerError {
            code,
            message: describe(code, argument.as_deref()),
            argument,
        })
    }

    pub fn is_authentication_failure(&self) -> bool {
        self.code == AUTHENTICATION_FAILED
    }
}
