//! Standard response envelope.

use crate::error::{ApiError, FieldError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;

/// Body of every generated endpoint response.
#[derive(Clone, Debug, Serialize)]
pub struct Envelope {
    pub data: Value,
    pub success: bool,
    pub error: String,
    pub code: u16,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub validation_error: Vec<FieldError>,
    pub total: u64,
    pub total_pages: u64,
    pub current_page: u64,
    pub size: u64,
    pub offset: u64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub page_range: Vec<u64>,
}

impl Default for Envelope {
    fn default() -> Self {
        Envelope {
            data: Value::Null,
            success: true,
            error: String::new(),
            code: StatusCode::OK.as_u16(),
            validation_error: Vec::new(),
            total: 1,
            total_pages: 1,
            current_page: 1,
            size: 1,
            offset: 0,
            page_range: Vec::new(),
        }
    }
}

impl Envelope {
    /// Records a failed outcome: one dominant message, or the full validation list.
    pub fn fail(&mut self, err: &ApiError) {
        self.success = false;
        self.code = err.status().as_u16();
        self.error = err.public_message();
        if let ApiError::Validation(errors) = err {
            self.validation_error = errors.clone();
        }
    }

    /// Clears data and paging fields of unsuccessful responses.
    pub fn prepare(mut self) -> Self {
        if !self.success {
            self.data = Value::Null;
            self.size = 0;
            self.current_page = 0;
            self.total = 0;
            self.total_pages = 0;
            self.offset = 0;
            self.page_range.clear();
        }
        self
    }

    /// Sets list data and its row counters.
    pub fn set_rows(&mut self, rows: Vec<Value>) {
        let count = rows.len() as u64;
        self.total = count;
        self.size = count;
        self.data = Value::Array(rows);
    }
}

/// A dispatched response: status plus prepared envelope.
#[derive(Debug)]
pub struct Reply {
    pub status: StatusCode,
    pub envelope: Envelope,
}

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        (self.status, Json(self.envelope)).into_response()
    }
}
