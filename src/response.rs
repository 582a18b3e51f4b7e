use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema, Clone)]
pub struct Meta {
    pub page: Option<i64>,
    pub size: Option<i64>,
    #[serde(rename = "totalElements")]
    pub total_elements: Option<i64>,
}

impl Meta {
    pub fn new(page: i64, size: i64, total_elements: i64) -> Self {
        Self {
            page: Some(page),
            size: Some(size),
            total_elements: Some(total_elements),
        }
    }

    pub fn empty() -> Self {
        Self {
            page: None,
            size: None,
            total_elements: None,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub message: String,
    pub data: Option<T>,
    pub meta: Option<Meta>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(message: impl Into<String>, data: T, meta: Option<Meta>) -> Self {
        Self {
            message: message.into(),
            data: Some(data),
            meta,
        }
    }
}
