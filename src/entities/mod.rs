//! Entities module - page model and image sources
//!
//! - `dom` / `page`: the parsed page the tracker queries
//! - `loader`: asynchronous image decode sources
//! - `traits`: interfaces the tracker depends on

pub mod dom;
pub mod loader;
pub mod page;
pub mod traits;

pub use dom::{Document, Element, SelectorError, parse_selector};
pub use loader::{DecodeSource, ImageId, ImageInfo, ImageSource, LoadError, LoadEvent, ManualSource};
pub use page::{load_page, page_for_images, page_markup};
pub use traits::{DomQuery, ElementHandle, WorkerPool};
