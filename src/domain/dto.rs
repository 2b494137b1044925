//! Snapshots and Requests
//!
//! DTOs are the immutable snapshots handed to callers and held in the cache.
//! Requests carry the caller-supplied fields for create and update.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use super::model::{Gender, Order, OrderStatus, Patient, Test, TestStatus, TestType};
use crate::error::{Error, Result};

// =============================================================================
// Response Snapshots
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientDto {
    pub id: i64,
    pub last_name: String,
    pub first_name: String,
    pub middle_name: Option<String>,
    pub birth_date: NaiveDate,
    pub gender: Gender,
    pub phone_number: Option<String>,
    pub snils: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDto {
    pub id: i64,
    pub patient_id: i64,
    pub created_at: NaiveDateTime,
    pub status: OrderStatus,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestDto {
    pub id: i64,
    pub order_id: i64,
    pub test_type_id: i64,
    pub executed_at: Option<NaiveDateTime>,
    pub result: Option<String>,
    pub reference_values: Option<String>,
    pub status: TestStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestTypeDto {
    pub id: i64,
    pub name: String,
    pub code: String,
    pub description: Option<String>,
    pub price: f64,
}

// Snapshots are only taken of saved records; an unsaved record maps to id 0.

impl From<&Patient> for PatientDto {
    fn from(p: &Patient) -> Self {
        Self {
            id: p.id.unwrap_or_default(),
            last_name: p.last_name.clone(),
            first_name: p.first_name.clone(),
            middle_name: p.middle_name.clone(),
            birth_date: p.birth_date,
            gender: p.gender,
            phone_number: p.phone_number.clone(),
            snils: p.snils.clone(),
        }
    }
}

impl From<&Order> for OrderDto {
    fn from(o: &Order) -> Self {
        Self {
            id: o.id.unwrap_or_default(),
            patient_id: o.patient_id,
            created_at: o.created_at,
            status: o.status,
            comment: o.comment.clone(),
        }
    }
}

impl From<&Test> for TestDto {
    fn from(t: &Test) -> Self {
        Self {
            id: t.id.unwrap_or_default(),
            order_id: t.order_id,
            test_type_id: t.test_type_id,
            executed_at: t.executed_at,
            result: t.result.clone(),
            reference_values: t.reference_values.clone(),
            status: t.status,
        }
    }
}

impl From<&TestType> for TestTypeDto {
    fn from(t: &TestType) -> Self {
        Self {
            id: t.id.unwrap_or_default(),
            name: t.name.clone(),
            code: t.code.clone(),
            description: t.description.clone(),
            price: t.price,
        }
    }
}

// =============================================================================
// Requests
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientRequest {
    pub last_name: String,
    pub first_name: String,
    pub middle_name: Option<String>,
    pub birth_date: NaiveDate,
    pub gender: Gender,
    pub phone_number: Option<String>,
    pub snils: Option<String>,
}

impl PatientRequest {
    pub fn into_record(self) -> Patient {
        let mut patient = Patient {
            id: None,
            last_name: String::new(),
            first_name: String::new(),
            middle_name: None,
            birth_date: self.birth_date,
            gender: self.gender,
            phone_number: None,
            snils: None,
        };
        self.apply_to(&mut patient);
        patient
    }

    /// Overwrite every mutable field of `patient`.
    pub fn apply_to(self, patient: &mut Patient) {
        patient.last_name = self.last_name;
        patient.first_name = self.first_name;
        patient.middle_name = self.middle_name;
        patient.birth_date = self.birth_date;
        patient.gender = self.gender;
        patient.phone_number = self.phone_number;
        patient.snils = self.snils;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    pub patient_id: i64,
    /// Defaults to `REGISTERED`
    pub status: Option<OrderStatus>,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRequest {
    pub order_id: i64,
    pub test_type_id: i64,
    pub result: Option<String>,
    pub reference_values: Option<String>,
    pub status: TestStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestTypeRequest {
    pub name: String,
    pub code: String,
    pub description: Option<String>,
    pub price: f64,
}

impl TestTypeRequest {
    pub fn apply_to(self, test_type: &mut TestType) {
        test_type.name = self.name;
        test_type.code = self.code;
        test_type.description = self.description;
        test_type.price = self.price;
    }
}

/// Combined patient search criteria. At least one field must be set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientSearch {
    pub last_name: Option<String>,
    pub first_name: Option<String>,
    pub middle_name: Option<String>,
    pub birth_date: Option<NaiveDate>,
}

impl PatientSearch {
    pub fn has_name(&self) -> bool {
        self.last_name.is_some() || self.first_name.is_some() || self.middle_name.is_some()
    }

    pub fn is_complete(&self) -> bool {
        self.last_name.is_some()
            && self.first_name.is_some()
            && self.middle_name.is_some()
            && self.birth_date.is_some()
    }
}

// =============================================================================
// Pagination
// =============================================================================

/// Zero-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: usize,
    pub size: usize,
}

impl PageRequest {
    pub fn new(page: usize, size: usize) -> Result<Self> {
        if size == 0 {
            return Err(Error::InvalidArgument("page size must be positive".into()));
        }
        Ok(Self { page, size })
    }

    pub fn offset(&self) -> usize {
        self.page.saturating_mul(self.size)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self { page: 0, size: 20 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub size: usize,
    /// Total records across all pages
    pub total: usize,
}

impl<T> Page<T> {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn total_pages(&self) -> usize {
        self.total.div_ceil(self.size.max(1))
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            page: self.page,
            size: self.size,
            total: self.total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_request_rejects_zero_size() {
        assert!(PageRequest::new(0, 0).is_err());
        assert_eq!(PageRequest::new(2, 10).unwrap().offset(), 20);
    }

    #[test]
    fn test_page_map_keeps_counts() {
        let page = Page {
            items: vec![1, 2, 3],
            page: 0,
            size: 3,
            total: 7,
        };
        let mapped = page.map(|n| n * 10);
        assert_eq!(mapped.items, vec![10, 20, 30]);
        assert_eq!(mapped.total_pages(), 3);
    }

    #[test]
    fn test_search_criteria_flags() {
        let mut search = PatientSearch::default();
        assert!(!search.has_name());
        search.first_name = Some("Ivan".into());
        assert!(search.has_name());
        assert!(!search.is_complete());
    }
}
