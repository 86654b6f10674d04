/// The host page surface the router drives: which pages exist, which nav
/// buttons are shown, and the scroll position of the visible page.
///
/// A browser host backs this with the DOM; the CLI and tests use the
/// in-process headless surface.
pub trait PageSurface: Send + Sync {
    /// Ids of the pages currently present on the surface.
    fn pages(&self) -> Vec<String>;

    /// Tab ids of the navigation buttons, in display order.
    fn nav_buttons(&self) -> Vec<String>;

    /// Show `tab` and mark its nav button active; hide everything else.
    fn activate(&self, tab: &str);

    fn scroll_offset(&self) -> f64;

    fn set_scroll_offset(&self, offset: f64);

    /// Flag the surface as fully loaded once startup finishes.
    fn mark_loaded(&self);

    fn has_page(&self, tab: &str) -> bool {
        self.pages().iter().any(|p| p == tab)
    }
}
