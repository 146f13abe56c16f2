use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern.
/// The wire and column spelling are the same string; extra spellings
/// after `|` are accepted on input only.
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal $(| $alias:literal)*),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $s $(, alias = $alias)*)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s $(| $alias)* => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }
    };
}

str_enum!(Gender {
    Male => "Male",
    Female => "Female",
    Other => "Other",
});

str_enum!(AccountKind {
    User => "user",
    Hospital => "hospital",
});

str_enum!(AppointmentStatus {
    Pending => "pending",
    Confirmed => "confirmed",
    Completed => "completed",
    Canceled => "canceled" | "cancelled",
});

impl AppointmentStatus {
    /// Active appointments hold their doctor slot.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Confirmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn appointment_status_round_trip() {
        for (variant, s) in [
            (AppointmentStatus::Pending, "pending"),
            (AppointmentStatus::Confirmed, "confirmed"),
            (AppointmentStatus::Completed, "completed"),
            (AppointmentStatus::Canceled, "canceled"),
        ] {
            assert_eq!(variant.as_str(), s);
            assert_eq!(AppointmentStatus::from_str(s).unwrap(), variant);
        }
    }

    #[test]
    fn british_cancel_spelling_accepted() {
        assert_eq!(
            AppointmentStatus::from_str("cancelled").unwrap(),
            AppointmentStatus::Canceled
        );
        let parsed: AppointmentStatus = serde_json::from_str("\"cancelled\"").unwrap();
        assert_eq!(parsed, AppointmentStatus::Canceled);
        assert_eq!(serde_json::to_string(&parsed).unwrap(), "\"canceled\"");
    }

    #[test]
    fn only_pending_and_confirmed_are_active() {
        assert!(AppointmentStatus::Pending.is_active());
        assert!(AppointmentStatus::Confirmed.is_active());
        assert!(!AppointmentStatus::Completed.is_active());
        assert!(!AppointmentStatus::Canceled.is_active());
    }

    #[test]
    fn account_kind_uses_lowercase_wire_names() {
        let kind: AccountKind = serde_json::from_str("\"hospital\"").unwrap();
        assert_eq!(kind, AccountKind::Hospital);
        assert_eq!(AccountKind::User.to_string(), "user");
    }

    #[test]
    fn invalid_enum_returns_error() {
        assert!(Gender::from_str("male").is_err());
        assert!(AccountKind::from_str("admin").is_err());
        assert!(AppointmentStatus::from_str("").is_err());
    }
}
