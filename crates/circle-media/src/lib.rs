//! Profile picture storage on Cloudinary.

pub mod cloudinary;

pub use cloudinary::{CloudinaryClient, CloudinaryConfig, MediaError};
