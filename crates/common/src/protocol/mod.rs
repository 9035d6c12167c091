// Wire formats spoken with the document service.

pub mod api;
pub mod chunk;
pub mod sse;
