//! User-caused errors
//!
//! Failures caused by the pipeline author (bad references, invalid timeouts)
//! are wrapped in [`UserError`] so the message recorded on the run carries
//! the `[User error]` label, while the reason taxonomy stays unchanged.

use std::error::Error as StdError;
use std::fmt;

/// Label prepended to failure messages caused by a user error
pub const USER_ERROR_LABEL: &str = "[User error]";

/// An error caused by the user's configuration rather than by the system
#[derive(Debug)]
pub struct UserError {
    source: Box<dyn StdError + Send + Sync + 'static>,
}

impl UserError {
    /// Wraps `err` as a user error
    pub fn wrap(err: impl Into<Box<dyn StdError + Send + Sync + 'static>>) -> Self {
        Self { source: err.into() }
    }

    /// The label attached to messages carrying this error
    pub fn label(&self) -> &'static str {
        USER_ERROR_LABEL
    }

    /// Returns true if `err` or any error in its source chain is a [`UserError`]
    pub fn is_user_error(err: &(dyn StdError + 'static)) -> bool {
        let mut current = Some(err);
        while let Some(e) = current {
            if e.is::<UserError>() {
                return true;
            }
            current = e.source();
        }
        false
    }
}

/// Displays the wrapped message without the label
impl fmt::Display for UserError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}

impl StdError for UserError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(self.source.as_ref())
    }
}

/// One argument substituted into a failure message template
#[derive(Debug)]
pub enum MessageArg {
    /// A plain value, substituted verbatim
    Plain(String),
    /// A user error; substitutes its unwrapped message and labels the whole message
    User(UserError),
}

impl From<&str> for MessageArg {
    fn from(value: &str) -> Self {
        MessageArg::Plain(value.to_string())
    }
}

impl From<String> for MessageArg {
    fn from(value: String) -> Self {
        MessageArg::Plain(value)
    }
}

impl From<UserError> for MessageArg {
    fn from(value: UserError) -> Self {
        MessageArg::User(value)
    }
}

impl fmt::Display for MessageArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageArg::Plain(s) => write!(f, "{}", s),
            MessageArg::User(e) => write!(f, "{}", e),
        }
    }
}

/// Substitutes `args` into the `{}` placeholders of `template`
///
/// Placeholders without a matching argument are left as-is and surplus
/// arguments are ignored. When any argument is a [`UserError`] the result is
/// prefixed with [`USER_ERROR_LABEL`].
pub fn format_message(template: &str, args: &[MessageArg]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut args_iter = args.iter();
    let mut rest = template;

    while let Some(pos) = rest.find("{}") {
        out.push_str(&rest[..pos]);
        match args_iter.next() {
            Some(arg) => out.push_str(&arg.to_string()),
            None => out.push_str("{}"),
        }
        rest = &rest[pos + 2..];
    }
    out.push_str(rest);

    if args.iter().any(|a| matches!(a, MessageArg::User(_))) {
        format!("{} {}", USER_ERROR_LABEL, out)
    } else {
        out
    }
}
