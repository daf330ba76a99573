use diesel::{
    deserialize::{self, FromSql, FromSqlRow},
    expression::AsExpression,
    pg::{Pg, PgValue},
    serialize::{self, Output, ToSql},
    sql_types::Text,
};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown {kind} name: {name:?}")]
pub struct UnknownName {
    pub kind: &'static str,
    pub name: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, AsExpression, FromSqlRow)]
#[diesel(sql_type = Text)]
pub enum Role {
    Admin,
    DataCollector,
    Verifier,
    Approver,
    User,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, AsExpression, FromSqlRow)]
#[diesel(sql_type = Text)]
pub enum VerificationStatus {
    Pending,
    Proposed,
    Verified,
    Rejected,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, AsExpression, FromSqlRow)]
#[diesel(sql_type = Text)]
pub enum ApplicationStatus {
    Pending,
    Proposed,
    Approved,
    Rejected,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, AsExpression, FromSqlRow)]
#[diesel(sql_type = Text)]
pub enum LogStatus {
    Proposed,
    Approved,
    Rejected,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, AsExpression, FromSqlRow)]
#[diesel(sql_type = Text)]
pub enum EntityType {
    Applicant,
    Application,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, AsExpression, FromSqlRow)]
#[diesel(sql_type = Text)]
pub enum Action {
    Verify,
    Approve,
}

impl Role {
    /// Accepts both `ROLE_ADMIN` and the bare `ADMIN` form, ignoring case.
    pub fn from_role_name(name: &str) -> Result<Self, UnknownName> {
        let upper = name.trim().to_ascii_uppercase();
        let prefixed = if upper.starts_with("ROLE_") {
            upper
        } else {
            format!("ROLE_{upper}")
        };
        prefixed.parse().map_err(|_| UnknownName {
            kind: "role",
            name: name.to_owned(),
        })
    }
}

macro_rules! impl_status_name {
    {
        Enum $enum_type:ident, Kind $kind:expr; $($variant:ident => $name:expr),+
    } => {
        impl $enum_type {
            pub const ALL: &'static [$enum_type] = &[$($enum_type::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($enum_type::$variant => $name),+
                }
            }
        }

        impl std::str::FromStr for $enum_type {
            type Err = UnknownName;

            fn from_str(name: &str) -> Result<Self, Self::Err> {
                match name {
                    $($name => Ok($enum_type::$variant),)+
                    other => Err(UnknownName {
                        kind: $kind,
                        name: other.to_owned(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $enum_type {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ToSql<Text, Pg> for $enum_type {
            fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
                <str as ToSql<Text, Pg>>::to_sql(self.as_str(), out)
            }
        }

        impl FromSql<Text, Pg> for $enum_type {
            fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
                let name = <String as FromSql<Text, Pg>>::from_sql(bytes)?;
                name.parse().map_err(Into::into)
            }
        }

        impl serde::Serialize for $enum_type {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> serde::Deserialize<'de> for $enum_type {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let name = <String as serde::Deserialize>::deserialize(deserializer)?;
                name.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

impl_status_name! {
    Enum Role, Kind "role";
    Admin => "ROLE_ADMIN",
    DataCollector => "ROLE_DATA_COLLECTOR",
    Verifier => "ROLE_VERIFIER",
    Approver => "ROLE_APPROVER",
    User => "ROLE_USER"
}

impl_status_name! {
    Enum VerificationStatus, Kind "verification status";
    Pending => "Pending",
    Proposed => "Proposed",
    Verified => "Verified",
    Rejected => "Rejected"
}

impl_status_name! {
    Enum ApplicationStatus, Kind "application status";
    Pending => "Pending",
    Proposed => "Proposed",
    Approved => "Approved",
    Rejected => "Rejected"
}

impl_status_name! {
    Enum LogStatus, Kind "maker-checker status";
    Proposed => "Proposed",
    Approved => "Approved",
    Rejected => "Rejected"
}

impl_status_name! {
    Enum EntityType, Kind "entity type";
    Applicant => "Applicant",
    Application => "Application"
}

impl_status_name! {
    Enum Action, Kind "action";
    Verify => "Verify",
    Approve => "Approve"
}
