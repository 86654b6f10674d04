use parking_lot::Mutex;

use lifeos_core::PageSurface;

#[derive(Debug, Default)]
struct SurfaceState {
    pages: Vec<String>,
    active: Option<String>,
    scroll: f64,
    activations: usize,
    loaded: bool,
}

/// In-process page surface: a list of pages with one visible at a time.
/// Navigation buttons follow page order.
#[derive(Debug, Default)]
pub struct HeadlessSurface {
    state: Mutex<SurfaceState>,
}

impl HeadlessSurface {
    pub fn new<I, S>(pages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            state: Mutex::new(SurfaceState {
                pages: pages.into_iter().map(Into::into).collect(),
                ..Default::default()
            }),
        }
    }

    pub fn active(&self) -> Option<String> {
        self.state.lock().active.clone()
    }

    /// How many times a page was activated.
    pub fn activations(&self) -> usize {
        self.state.lock().activations
    }

    pub fn is_loaded(&self) -> bool {
        self.state.lock().loaded
    }

    pub fn add_page(&self, page: impl Into<String>) {
        self.state.lock().pages.push(page.into());
    }

    pub fn remove_page(&self, page: &str) {
        self.state.lock().pages.retain(|p| p != page);
    }
}

impl PageSurface for HeadlessSurface {
    fn pages(&self) -> Vec<String> {
        self.state.lock().pages.clone()
    }

    fn nav_buttons(&self) -> Vec<String> {
        self.pages()
    }

    fn activate(&self, tab: &str) {
        let mut state = self.state.lock();
        state.active = Some(tab.to_string());
        state.activations += 1;
    }

    fn scroll_offset(&self) -> f64 {
        self.state.lock().scroll
    }

    fn set_scroll_offset(&self, offset: f64) {
        self.state.lock().scroll = offset;
    }

    fn mark_loaded(&self) {
        self.state.lock().loaded = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activation_and_scroll() {
        let surface = HeadlessSurface::new(["inicio", "metas"]);
        assert!(surface.has_page("metas"));
        assert!(!surface.has_page("ajustes"));
        assert_eq!(surface.active(), None);

        surface.activate("metas");
        surface.set_scroll_offset(42.5);
        assert_eq!(surface.active().as_deref(), Some("metas"));
        assert_eq!(surface.activations(), 1);
        assert_eq!(surface.scroll_offset(), 42.5);
        assert_eq!(surface.nav_buttons(), vec!["inicio", "metas"]);
    }

    #[test]
    fn pages_are_live() {
        let surface = HeadlessSurface::new(["inicio"]);
        surface.add_page("diario");
        assert!(surface.has_page("diario"));
        surface.remove_page("diario");
        assert!(!surface.has_page("diario"));
        assert!(!surface.is_loaded());
        surface.mark_loaded();
        assert!(surface.is_loaded());
    }
}
