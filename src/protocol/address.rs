//! Recipient address grammar.
//!
//! ```text
//! @Name                     group in the current movie
//! Name                      user in the current movie
//! Local@Movie               Local resolved inside Movie
//! Local@AllMovies           Local resolved inside every movie
//! system.<ns>.<command>     system command
//! ```
//! A cross-movie split happens at the first `@` that is not the leading
//! character, so `@Group@Movie` names a group in another movie.

/// Pseudo-movie that expands to every registered movie.
pub const ALL_MOVIES: &str = "AllMovies";

const SYSTEM_PREFIX: &str = "system.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Address<'a> {
    User(&'a str),
    Group(&'a str),
    System { namespace: &'a str, command: &'a str },
    /// `system.` prefix without exactly three dot-separated tokens.
    MalformedSystem,
}

impl<'a> Address<'a> {
    /// Classifies an address local to one movie.
    pub fn parse(recipient: &'a str) -> Self {
        if is_system(recipient) {
            let mut tokens = recipient.split('.');
            return match (tokens.next(), tokens.next(), tokens.next(), tokens.next()) {
                (Some(_), Some(ns), Some(cmd), None) if !ns.is_empty() && !cmd.is_empty() => {
                    Address::System {
                        namespace: ns,
                        command: cmd,
                    }
                }
                _ => Address::MalformedSystem,
            };
        }
        if recipient.starts_with('@') {
            Address::Group(recipient)
        } else {
            Address::User(recipient)
        }
    }
}

fn is_system(recipient: &str) -> bool {
    recipient
        .get(..SYSTEM_PREFIX.len())
        .is_some_and(|p| p.eq_ignore_ascii_case(SYSTEM_PREFIX))
}

/// Splits `Local@Movie` into `(Local, Movie)`; `None` for a local address.
pub fn split_cross_movie(recipient: &str) -> Option<(&str, &str)> {
    let at = recipient.get(1..)?.find('@')? + 1;
    Some((&recipient[..at], &recipient[at + 1..]))
}

pub fn is_all_movies(movie: &str) -> bool {
    movie.eq_ignore_ascii_case(ALL_MOVIES)
}
