//! Purpose: The two-field JSON record posted to the user endpoint.
//! Exports: `User`, `decode_first`.
//! Invariants: Keys match `First`/`Last` ignoring ASCII case; missing or `null` fields are empty.
//! Invariants: Only the first JSON value in a body is decoded; trailing data is ignored.
use serde::de::{self, Deserializer, IgnoredAny, MapAccess, Visitor};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::error::{Error, ErrorKind};

/// JSON payload accepted by the user endpoint: `{"First": "...", "Last": "..."}`.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct User {
    #[serde(rename = "First")]
    pub first: String,
    #[serde(rename = "Last")]
    pub last: String,
}

impl User {
    pub fn new(first: impl Into<String>, last: impl Into<String>) -> Self {
        Self {
            first: first.into(),
            last: last.into(),
        }
    }
}

impl<'de> Deserialize<'de> for User {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(UserVisitor)
    }
}

struct UserVisitor;

impl<'de> Visitor<'de> for UserVisitor {
    type Value = User;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a JSON object with string fields First and Last")
    }

    // A bare `null` leaves the record empty.
    fn visit_unit<E: de::Error>(self) -> Result<User, E> {
        Ok(User::default())
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<User, A::Error> {
        let mut user = User::default();
        while let Some(key) = map.next_key::<String>()? {
            if key.eq_ignore_ascii_case("first") {
                user.first = map.next_value::<Option<String>>()?.unwrap_or_default();
            } else if key.eq_ignore_ascii_case("last") {
                user.last = map.next_value::<Option<String>>()?.unwrap_or_default();
            } else {
                map.next_value::<IgnoredAny>()?;
            }
        }
        Ok(user)
    }
}

/// Decodes the first JSON value in `body` as a `User`.
pub fn decode_first(body: &[u8]) -> Result<User, Error> {
    match serde_json::Deserializer::from_slice(body)
        .into_iter::<User>()
        .next()
    {
        Some(Ok(user)) => Ok(user),
        Some(Err(err)) => Err(Error::new(ErrorKind::Decode)
            .with_message("failed to decode user")
            .with_source(err)),
        None => Err(Error::new(ErrorKind::Decode).with_message("empty request body")),
    }
}
