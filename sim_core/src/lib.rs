//! Ambient simulation services: logging facade and sticky-error capture.
#![forbid(unsafe_code)]

pub mod logging;
pub mod observability;
