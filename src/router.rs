//! Navigation through the location hash.
//!
//! The whole navigation state is the hash string: `#` (or nothing) is the map, `#/ar/<digits>`
//! is the AR view of one building, anything else is not found. Like the browser's
//! `hashchange`, only an actual change of the hash schedules a transition.

use log::debug;

use crate::catalog::LocationId;

/// Where the application is.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Route {
    /// The map.
    Home,
    /// The AR view of one catalog entry.
    ArView(LocationId),
    /// Anything else.
    NotFound,
}

impl Route {
    /// Parses a location hash.
    pub fn from_hash(hash: &str) -> Self {
        if hash.is_empty() || hash == "#" {
            return Route::Home;
        }

        match hash.strip_prefix("#/ar/") {
            Some(id) if !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit()) => {
                Route::ArView(LocationId::from(id))
            }
            _ => Route::NotFound,
        }
    }

    /// The canonical hash of a route. Not-found has none of its own and maps to `None`.
    pub fn to_hash(&self) -> Option<String> {
        match self {
            Route::Home => Some("#".to_string()),
            Route::ArView(id) => Some(format!("#/ar/{}", id)),
            Route::NotFound => None,
        }
    }
}

/// Holds the current hash and reports changes of it.
#[derive(Debug)]
pub struct Router {
    hash: String,
    changed: bool,
}

impl Router {
    /// Starts at `initial_hash`. The first [`Router::poll`] reports its route.
    pub fn new(initial_hash: impl Into<String>) -> Self {
        Self {
            hash: initial_hash.into(),
            changed: true,
        }
    }

    /// The current hash.
    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// The route of the current hash.
    pub fn current(&self) -> Route {
        Route::from_hash(&self.hash)
    }

    /// Sets the hash. Setting the hash it already has does nothing.
    pub fn navigate(&mut self, hash: impl Into<String>) {
        let hash = hash.into();
        if hash != self.hash {
            debug!("Navigating from {:?} to {:?}", self.hash, hash);
            self.hash = hash;
            self.changed = true;
        }
    }

    /// Navigates to the hash of `route`.
    pub fn navigate_to(&mut self, route: &Route) {
        if let Some(hash) = route.to_hash() {
            self.navigate(hash);
        }
    }

    /// Returns the new route once after every change of the hash.
    pub fn poll(&mut self) -> Option<Route> {
        if std::mem::take(&mut self.changed) {
            Some(self.current())
        } else {
            None
        }
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new("#")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_home() {
        assert_eq!(Route::from_hash(""), Route::Home);
        assert_eq!(Route::from_hash("#"), Route::Home);
    }

    #[test]
    fn parses_ar_view() {
        assert_eq!(
            Route::from_hash("#/ar/1"),
            Route::ArView(LocationId::from("1"))
        );
        assert_eq!(
            Route::from_hash("#/ar/0042"),
            Route::ArView(LocationId::from("0042"))
        );
    }

    #[test]
    fn everything_else_is_not_found() {
        for hash in [
            "#/ar/",
            "#/ar/abc",
            "#/ar/1a",
            "#/ar/1/",
            "#/ar/-1",
            "#/ar/ 1",
            "#/qr-scanner",
            "#/",
            "##",
            "/ar/1",
            "#/AR/1",
        ] {
            assert_eq!(Route::from_hash(hash), Route::NotFound, "{hash}");
        }
    }

    #[test]
    fn hash_roundtrip() {
        let route = Route::ArView(LocationId::from("7"));
        assert_eq!(route.to_hash().as_deref(), Some("#/ar/7"));
        assert_eq!(Route::from_hash(&route.to_hash().unwrap()), route);
        assert_eq!(Route::Home.to_hash().as_deref(), Some("#"));
        assert_eq!(Route::NotFound.to_hash(), None);
    }

    #[test]
    fn initial_route_is_reported_once() {
        let mut router = Router::new("#/ar/3");
        assert_eq!(router.poll(), Some(Route::ArView(LocationId::from("3"))));
        assert_eq!(router.poll(), None);
    }

    #[test]
    fn only_changes_are_reported() {
        let mut router = Router::default();
        router.poll();

        router.navigate("#");
        assert_eq!(router.poll(), None);

        router.navigate("#/ar/1");
        router.navigate("#");
        // Both changes coalesce into the latest route.
        assert_eq!(router.poll(), Some(Route::Home));

        router.navigate_to(&Route::ArView(LocationId::from("2")));
        assert_eq!(router.hash(), "#/ar/2");
        assert_eq!(router.poll(), Some(Route::ArView(LocationId::from("2"))));

        router.navigate_to(&Route::NotFound);
        assert_eq!(router.poll(), None);
    }
}
