//! Picserve-Common: shared types used across picserve.
//!
//! - **Format Registry**: which image extensions may be requested, what they
//!   are served as, and which ones need conversion first
//! - **Error Handling**: the closed error taxonomy of image resolution
//!
//! # Examples
//!
//! ```
//! use picserve_common::formats::{content_type, is_allowed, ImageFormat};
//! use std::path::Path;
//!
//! assert!(is_allowed(Path::new("holiday/IMG_0001.HEIC")));
//! assert_eq!(content_type(Path::new("cat.jpg")), Some("image/jpeg"));
//! assert_eq!(ImageFormat::Heic.conversion_target(), Some(ImageFormat::Jpeg));
//! ```

pub mod error;
pub mod formats;

pub use error::{Error, Result};
pub use formats::ImageFormat;
