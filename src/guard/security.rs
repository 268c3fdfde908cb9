use std::fmt;
use std::path::{Component, Path};

//===============
// Name Handling
//===============
#[derive(Debug, PartialEq, Eq)]
pub enum NameValidationError {
    Empty,
    NullByte,
    NoFileName,
}

impl fmt::Display for NameValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NameValidationError::Empty => write!(f, "File name is empty"),
            NameValidationError::NullByte => write!(f, "File name contains null byte"),
            NameValidationError::NoFileName => {
                write!(f, "File name has no final component")
            }
        }
    }
}

impl std::error::Error for NameValidationError {}

// Reduce a caller supplied name to its last component.
// "a/b/1.jpg" -> "1.jpg", "../../etc/passwd" -> "passwd"
// Names that only walk directories ("..", "/", "a/..") have nothing left
pub fn safe_basename(name: &str) -> Result<&str, NameValidationError> {
    if name.is_empty() {
        return Err(NameValidationError::Empty);
    }

    // rust uses C-style APIs so \0 can end str early
    if name.contains('\0') {
        return Err(NameValidationError::NullByte);
    }

    match Path::new(name).components().next_back() {
        Some(Component::Normal(last)) => last.to_str().ok_or(NameValidationError::NoFileName),
        _ => Err(NameValidationError::NoFileName),
    }
}
