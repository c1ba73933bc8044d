use crate::core::error::{Error, ErrorKind, Result};

pub const MAX_NAME_LENGTH: usize = 64;

/// Checks a collection name.
///
/// The first character of a user collection must be a letter; system
/// collections may start with `_`. Later characters may be letters, digits,
/// `_` or `-`.
pub fn is_allowed_name(is_system: bool, name: &str) -> bool {
    let mut length = 0;

    for (i, c) in name.chars().enumerate() {
        let ok = if i > 0 || is_system {
            c == '_' || c == '-' || c.is_ascii_alphanumeric()
        } else {
            c.is_ascii_alphabetic()
        };

        if !ok {
            return false;
        }

        length += 1;
    }

    length > 0 && length <= MAX_NAME_LENGTH
}

pub fn check_name(is_system: bool, name: &str) -> Result<()> {
    if is_allowed_name(is_system, name) {
        Ok(())
    } else {
        Err(Error::new(
            ErrorKind::IllegalName,
            format!("illegal collection name '{}'", name),
        ))
    }
}
