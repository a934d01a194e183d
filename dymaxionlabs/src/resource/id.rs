//! Resource identifiers used by the Dymaxion Labs API.

use serde::de::Unexpected;
use serde::{self, Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::str::FromStr;

use super::Resource;
use crate::errors::*;

/// A strongly-typed "resource ID" used to identify many different kinds of
/// Dymaxion Labs resources.
///
/// Some collections use UUIDs and others use integers. Either way, we store
/// the ID as a string.
pub struct Id<R: Resource> {
    /// The ID of the resource.
    id: String,
    /// A special 0-byte field which exists just to mention the type `R`
    /// inside the struct, and thus avoid compiler errors about unused type
    /// parameters.
    _phantom: PhantomData<R>,
}

impl<R: Resource> Id<R> {
    /// Get this resource ID as a string.
    pub fn as_str(&self) -> &str {
        &self.id
    }

    /// The API path of this resource, relative to the API root.
    pub fn path(&self) -> String {
        format!("{}/{}/", R::base_path(), self.id)
    }

    fn new_unchecked(id: String) -> Self {
        Id {
            id,
            _phantom: PhantomData,
        }
    }
}

impl<R: Resource> FromStr for Id<R> {
    type Err = Error;

    fn from_str(id: &str) -> Result<Self> {
        if id.is_empty() || id.contains('/') {
            Err(Error::invalid_argument(format!(
                "{:?} is not a valid ID for {}",
                id,
                R::base_path(),
            )))
        } else {
            Ok(Id::new_unchecked(id.to_owned()))
        }
    }
}

impl<R: Resource> Clone for Id<R> {
    fn clone(&self) -> Self {
        Id::new_unchecked(self.id.clone())
    }
}

impl<R: Resource> PartialEq for Id<R> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<R: Resource> Eq for Id<R> {}

impl<R: Resource> PartialOrd for Id<R> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<R: Resource> Ord for Id<R> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

impl<R: Resource> Hash for Id<R> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state)
    }
}

impl<R: Resource> fmt::Debug for Id<R> {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "{}", &self.id)
    }
}

impl<R: Resource> fmt::Display for Id<R> {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "{}", &self.id)
    }
}

/// The wire forms an ID may take.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Str(String),
    Int(u64),
}

impl<'de, R: Resource> Deserialize<'de> for Id<R> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let id = match RawId::deserialize(deserializer)? {
            RawId::Str(id) => id,
            RawId::Int(id) => id.to_string(),
        };
        if id.is_empty() {
            let expected = format!("a non-empty ID for {}", R::base_path());
            Err(<D::Error as serde::de::Error>::invalid_value(
                Unexpected::Str(&id),
                &&expected[..],
            ))
        } else {
            Ok(Id::new_unchecked(id))
        }
    }
}

impl<R: Resource> Serialize for Id<R> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.id.serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::Task;

    #[test]
    fn parses_and_builds_paths() {
        let id: Id<Task> = "42".parse().unwrap();
        assert_eq!(id.as_str(), "42");
        assert_eq!(id.path(), "/tasks/42/");
        assert!("".parse::<Id<Task>>().is_err());
        assert!("a/b".parse::<Id<Task>>().is_err());
    }

    #[test]
    fn deserializes_strings_and_integers() {
        let from_int: Id<Task> = serde_json::from_str("7").unwrap();
        let from_str: Id<Task> = serde_json::from_str("\"7\"").unwrap();
        assert_eq!(from_int, from_str);
        assert_eq!(serde_json::to_string(&from_int).unwrap(), "\"7\"");
        assert!(serde_json::from_str::<Id<Task>>("\"\"").is_err());
    }
}
