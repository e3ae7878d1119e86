//! One module per supported network (spec.md §4.2 catalog).

pub mod facebook;
pub mod instagram;
pub mod pinterest;
pub mod threads;
pub mod tiktok;
pub mod x;
pub mod youtube;
