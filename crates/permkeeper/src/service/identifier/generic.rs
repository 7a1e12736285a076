use std::{ops::Deref, str::FromStr};

use http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::api::ErrorModel;

macro_rules! define_id_type {
    ($name:ident) => {
        #[derive(Debug, Clone, Serialize, PartialEq, Eq, Hash, PartialOrd, Ord, Copy)]
        #[serde(transparent)]
        pub struct $name(uuid::Uuid);

        impl $name {
            #[must_use]
            pub fn new(id: uuid::Uuid) -> Self {
                Self(id)
            }

            #[must_use]
            pub fn new_random() -> Self {
                Self(uuid::Uuid::now_v7())
            }

            /// Parses the ID from a string
            ///
            /// # Errors
            /// Returns `ErrorModel` with `BAD_REQUEST` status code if the string is not a valid UUID
            pub fn from_str_or_bad_request(s: &str) -> Result<Self, ErrorModel> {
                Ok($name(uuid::Uuid::from_str(s).map_err(|e| {
                    ErrorModel::builder()
                        .code(StatusCode::BAD_REQUEST.as_u16())
                        .message(format!(
                            concat!("Provided ", stringify!($name), " is not a valid UUID. Got: {}"),
                            s
                        ))
                        .r#type(concat!(stringify!($name), "IsNotUUID"))
                        .source(Some(Box::new(e)))
                        .build()
                })?))
            }
        }

        impl FromStr for $name {
            type Err = ErrorModel;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::from_str_or_bad_request(s)
            }
        }

        impl Deref for $name {
            type Target = uuid::Uuid;

            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl From<uuid::Uuid> for $name {
            fn from(value: uuid::Uuid) -> Self {
                Self(value)
            }
        }

        impl From<$name> for uuid::Uuid {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        // Deserialize is separately implemented to provide better error messages
        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> std::result::Result<$name, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                Ok($name::from(uuid::Uuid::from_str(&s).map_err(|_| {
                    serde::de::Error::custom(format!(
                        "Provided {} is not a valid UUID. Got {s}.",
                        stringify!($name),
                    ))
                })?))
            }
        }
    };
}

define_id_type!(UserId);
define_id_type!(GroupId);
define_id_type!(EntityId);
define_id_type!(OrganizationId);
define_id_type!(TemplateId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serde() {
        let id = EntityId::new_random();
        let serialized = serde_json::to_value(id).unwrap();
        assert_eq!(serialized, serde_json::json!(id.0.to_string()));
        let deserialized: EntityId = serde_json::from_value(serialized).unwrap();
        assert_eq!(id, deserialized);
    }

    #[test]
    fn test_type_name_in_error() {
        let err = TemplateId::from_str_or_bad_request("not-a-uuid").unwrap_err();
        assert_eq!(err.code, StatusCode::BAD_REQUEST);
        assert_eq!(err.r#type, "TemplateIdIsNotUUID");
        assert!(err.message.contains("not-a-uuid"));
        assert!(err.source.is_some());
    }

    #[test]
    fn test_parse() {
        let id = UserId::new_random();
        assert_eq!(id.to_string().parse::<UserId>().unwrap(), id);
        assert_eq!(
            "x".parse::<GroupId>().unwrap_err().r#type,
            "GroupIdIsNotUUID"
        );
    }

    #[test]
    fn test_deserialize_error_names_type() {
        let err = serde_json::from_value::<GroupId>(serde_json::json!("nope")).unwrap_err();
        assert!(err.to_string().contains("GroupId"));
    }
}
