//! Entity Records
//!
//! The four stored entity kinds and their status enums. Records carry an
//! `Option<i64>` id: `None` until the Store assigns one on first save.

use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// =============================================================================
// Entity Kind
// =============================================================================

/// Discriminator for the stored entity kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Patient,
    Order,
    Test,
    TestType,
}

impl EntityKind {
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Patient,
        EntityKind::Order,
        EntityKind::Test,
        EntityKind::TestType,
    ];
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::Patient => write!(f, "Patient"),
            EntityKind::Order => write!(f, "Order"),
            EntityKind::Test => write!(f, "Test"),
            EntityKind::TestType => write!(f, "TestType"),
        }
    }
}

// =============================================================================
// Enumerations
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Gender {
    Male,
    Female,
}

/// Lifecycle of a laboratory order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Registered,
    InProgress,
    Completed,
    Canceled,
}

/// Lifecycle of a single test within an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TestStatus {
    Pending,
    InProgress,
    Completed,
    Canceled,
}

macro_rules! literal_enum {
    ($ty:ident { $($variant:ident => $lit:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $lit,)+
                }
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                match s.trim().to_ascii_uppercase().as_str() {
                    $($lit => Ok($ty::$variant),)+
                    other => Err(Error::InvalidArgument(format!(
                        "unknown {} value '{}'",
                        stringify!($ty),
                        other
                    ))),
                }
            }
        }
    };
}

literal_enum!(Gender { Male => "MALE", Female => "FEMALE" });
literal_enum!(OrderStatus {
    Registered => "REGISTERED",
    InProgress => "IN_PROGRESS",
    Completed => "COMPLETED",
    Canceled => "CANCELED",
});
literal_enum!(TestStatus {
    Pending => "PENDING",
    InProgress => "IN_PROGRESS",
    Completed => "COMPLETED",
    Canceled => "CANCELED",
});

// =============================================================================
// Records
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    pub id: Option<i64>,
    pub last_name: String,
    pub first_name: String,
    pub middle_name: Option<String>,
    pub birth_date: NaiveDate,
    pub gender: Gender,
    pub phone_number: Option<String>,
    /// National insurance number
    pub snils: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: Option<i64>,
    pub patient_id: i64,
    pub created_at: NaiveDateTime,
    pub status: OrderStatus,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Test {
    pub id: Option<i64>,
    pub order_id: i64,
    pub test_type_id: i64,
    pub executed_at: Option<NaiveDateTime>,
    pub result: Option<String>,
    pub reference_values: Option<String>,
    pub status: TestStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestType {
    pub id: Option<i64>,
    pub name: String,
    pub code: String,
    pub description: Option<String>,
    pub price: f64,
}

/// Common surface of stored records.
pub trait Record: Clone + Send + Sync + 'static {
    const KIND: EntityKind;

    fn id(&self) -> Option<i64>;

    fn set_id(&mut self, id: i64);
}

macro_rules! impl_record {
    ($ty:ident => $kind:ident) => {
        impl Record for $ty {
            const KIND: EntityKind = EntityKind::$kind;

            fn id(&self) -> Option<i64> {
                self.id
            }

            fn set_id(&mut self, id: i64) {
                self.id = Some(id);
            }
        }
    };
}

impl_record!(Patient => Patient);
impl_record!(Order => Order);
impl_record!(Test => Test);
impl_record!(TestType => TestType);

/// Current wall-clock time without timezone, as stored in timestamp columns.
pub fn now() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_literals_round_trip() {
        for status in [
            OrderStatus::Registered,
            OrderStatus::InProgress,
            OrderStatus::Completed,
            OrderStatus::Canceled,
        ] {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
        }
        assert_eq!("pending".parse::<TestStatus>().unwrap(), TestStatus::Pending);
    }

    #[test]
    fn test_unknown_literal_is_invalid_argument() {
        let err = "SHIPPED".parse::<OrderStatus>().unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert!(err.to_string().contains("OrderStatus"));
    }

    #[test]
    fn test_serde_uses_screaming_case() {
        let json = serde_json::to_string(&OrderStatus::InProgress).unwrap();
        assert_eq!(json, "\"IN_PROGRESS\"");
        let gender: Gender = serde_json::from_str("\"FEMALE\"").unwrap();
        assert_eq!(gender, Gender::Female);
    }

    #[test]
    fn test_record_ids() {
        let mut tt = TestType {
            id: None,
            name: "Complete blood count".into(),
            code: "CBC-01".into(),
            description: None,
            price: 12.5,
        };
        assert_eq!(tt.id(), None);
        tt.set_id(3);
        assert_eq!(tt.id(), Some(3));
        assert_eq!(<TestType as Record>::KIND, EntityKind::TestType);
        assert_eq!(EntityKind::TestType.to_string(), "TestType");
    }
}
