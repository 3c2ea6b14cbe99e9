//! Types and helpers shared between the notifier client and its tests:
//! Classroom API DTOs, endpoint builders, the REST client and OAuth helpers.

pub mod api;
pub mod domain;
pub mod oauth;
