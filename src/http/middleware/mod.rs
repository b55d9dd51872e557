//! Tower middleware applied around the application router.

pub mod request_log;

pub use request_log::{
    build_record, status_text, RequestLogLayer, RequestLogOptions, RequestLogService, StatusError,
};
