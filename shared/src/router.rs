/// Pages reachable by path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Route {
    Garage,
    Winners,
    Wheel,
    NotFound(String),
}

impl Route {
    pub fn parse(path: &str) -> Self {
        let trimmed = path.trim();
        let normalized = if trimmed.len() > 1 {
            trimmed.trim_end_matches('/')
        } else {
            trimmed
        };
        match normalized {
            "" | "/" | "/garage" => Route::Garage,
            "/winners" => Route::Winners,
            "/wheel" => Route::Wheel,
            other => Route::NotFound(other.to_string()),
        }
    }

    pub fn path(&self) -> &str {
        match self {
            Route::Garage => "/",
            Route::Winners => "/winners",
            Route::Wheel => "/wheel",
            Route::NotFound(path) => path,
        }
    }
}

/// Back/forward stack of visited routes.
#[derive(Clone, Debug)]
pub struct History {
    entries: Vec<Route>,
    cursor: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::new(Route::Garage)
    }
}

impl History {
    pub fn new(start: Route) -> Self {
        Self {
            entries: vec![start],
            cursor: 0,
        }
    }

    pub fn current(&self) -> &Route {
        &self.entries[self.cursor]
    }

    /// Pushes `path` unless it is already the current page. Forward entries are dropped.
    pub fn navigate(&mut self, path: &str) -> &Route {
        let route = Route::parse(path);
        if &route != self.current() {
            self.entries.truncate(self.cursor + 1);
            self.entries.push(route);
            self.cursor += 1;
        }
        self.current()
    }

    pub fn back(&mut self) -> Option<&Route> {
        if self.cursor == 0 {
            return None;
        }
        self.cursor -= 1;
        Some(self.current())
    }

    pub fn forward(&mut self) -> Option<&Route> {
        if self.cursor + 1 >= self.entries.len() {
            return None;
        }
        self.cursor += 1;
        Some(self.current())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        assert_eq!(Route::parse("/"), Route::Garage);
        assert_eq!(Route::parse("/garage/"), Route::Garage);
        assert_eq!(Route::parse("/winners"), Route::Winners);
        assert_eq!(Route::parse("/wheel"), Route::Wheel);
        assert_eq!(Route::parse("/nope"), Route::NotFound("/nope".to_string()));
    }

    #[test]
    fn test_back_and_forward() {
        let mut history = History::default();
        history.navigate("/winners");
        history.navigate("/wheel");
        assert_eq!(history.back(), Some(&Route::Winners));
        assert_eq!(history.back(), Some(&Route::Garage));
        assert_eq!(history.back(), None);
        assert_eq!(history.forward(), Some(&Route::Winners));

        // navigating from the middle drops the forward entries
        history.navigate("/garage");
        assert_eq!(history.forward(), None);
    }

    #[test]
    fn test_navigate_to_current_is_noop() {
        let mut history = History::default();
        history.navigate("/");
        assert_eq!(history.back(), None);
    }
}
