//! Refract parameter resolution engine.
//!
//! Turns a request URL into the canonical transform option map:
//!
//! ```text
//! RequestFacts ──► parsers (canonical | compact | path | legacy)
//!                     │ (name, value, source, priority) tuples
//!                     ▼
//!               ParamProcessor ──► ResolvedOptions
//!                (merge ▸ validate ▸ strategies ▸ format)
//! ```
//!
//! The vocabulary (registry, value types, size codes, overlays) lives in
//! `refract-kernel::params`; this crate owns the extraction and
//! reconciliation logic.
//!
//! # Example
//!
//! ```rust
//! use refract_params::request::RequestFacts;
//! use refract_params::parsers::parse_request;
//! use refract_params::processor::ParamProcessor;
//! use refract_kernel::config::{FeatureFlags, TransformSettings};
//!
//! let req = RequestFacts::new("/img.jpg", Some("f=xl&height=600"));
//! let processor = ParamProcessor::new(&TransformSettings::default());
//! let options = processor.process(parse_request(&req, &FeatureFlags::default()));
//!
//! assert_eq!(options.map.width(), Some(900));
//! assert_eq!(options.map.height(), Some(600));
//! ```

pub mod parsers;
pub mod processor;
pub mod request;

pub use parsers::{ParamParser, ParseYield, active_parsers, parse_request};
pub use processor::{ParamProcessor, ParamStrategy};
pub use request::RequestFacts;
