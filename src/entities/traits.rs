//! Abstract traits for dependency inversion.
//!
//! The tracker only talks to the page and to the thread pool through these
//! interfaces. The in-memory page lives in `entities::dom`, the pool in
//! `core::workers`.

/// Live element handle (a DOM node reference).
///
/// Handles are cheap to clone and all clones point at the same node, so
/// mutations go through `&self`.
pub trait ElementHandle: Clone {
    /// Attribute value, `None` when absent.
    fn attribute(&self, name: &str) -> Option<String>;

    fn set_attribute(&self, name: &str, value: &str);

    fn has_class(&self, class: &str) -> bool;

    /// Add class if not already present.
    fn add_class(&self, class: &str);

    fn remove_class(&self, class: &str);

    /// Set one inline style property (`width`, ...).
    fn set_style(&self, property: &str, value: &str);

    /// Replace text content.
    fn set_text(&self, text: &str);

    /// Short human-readable form for log messages, e.g. `<img#hero.thumb>`.
    fn describe(&self) -> String;
}

/// Query layer over a page.
pub trait DomQuery {
    type Element: ElementHandle;

    /// All elements matching `selector`, in document order.
    ///
    /// Invalid selectors match nothing.
    fn query_all(&self, selector: &str) -> Vec<Self::Element>;

    /// First element matching `selector`.
    fn query(&self, selector: &str) -> Option<Self::Element> {
        self.query_all(selector).into_iter().next()
    }
}

/// Abstract worker pool for decode jobs.
pub trait WorkerPool: Send + Sync {
    /// Run `f` on some worker thread.
    fn execute(&self, f: Box<dyn FnOnce() + Send + 'static>);
}
