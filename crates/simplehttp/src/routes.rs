use std::{collections::HashMap, path::PathBuf};

use anyhow::Error;
use bytes::Bytes;
use tracing::{event, Level};

use crate::{Connection, Request};

/// Application handler for a callback route.
///
/// The handler is responsible for writing the complete response, status line included.
pub type Callback<C> =
    Box<dyn Fn(&mut Connection, &Request, &C) -> Result<(), Error> + Send + Sync + 'static>;

/// How a registered path is answered.
pub enum Route<C> {
    /// In-memory payload, served verbatim after the extra header block.
    Content { content: Bytes, headers: String },
    /// File read fresh from disk on every request.
    File { path: PathBuf, headers: String },
    Callback(Callback<C>),
}

/// Exact path to `Route` table.
///
/// Populated before the server starts, the server only ever reads it afterwards. Registering
/// a path again replaces the earlier route, except that a callback always wins over content or
/// files on the same path.
pub struct Routes<C> {
    routes: HashMap<String, Route<C>>,
}

impl<C> Default for Routes<C> {
    fn default() -> Self {
        Self {
            routes: HashMap::new(),
        }
    }
}

impl<C> Routes<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `content` on `path`.
    pub fn page(&mut self, path: impl Into<String>, content: impl Into<Bytes>) -> &mut Self {
        self.page_with_headers(path, content, "")
    }

    /// Serve `content` on `path`, with extra header lines following the status line.
    pub fn page_with_headers(
        &mut self,
        path: impl Into<String>,
        content: impl Into<Bytes>,
        headers: impl Into<String>,
    ) -> &mut Self {
        let route = Route::Content {
            content: content.into(),
            headers: headers.into(),
        };
        self.insert_static(path.into(), route)
    }

    /// Serve the file at `file` on `path`.
    pub fn file(&mut self, path: impl Into<String>, file: impl Into<PathBuf>) -> &mut Self {
        self.file_with_headers(path, file, "")
    }

    pub fn file_with_headers(
        &mut self,
        path: impl Into<String>,
        file: impl Into<PathBuf>,
        headers: impl Into<String>,
    ) -> &mut Self {
        let route = Route::File {
            path: file.into(),
            headers: headers.into(),
        };
        self.insert_static(path.into(), route)
    }

    /// Answer `path` with an application handler, for any method.
    pub fn callback<F>(&mut self, path: impl Into<String>, callback: F) -> &mut Self
    where
        F: Fn(&mut Connection, &Request, &C) -> Result<(), Error> + Send + Sync + 'static,
    {
        let path = path.into();
        event!(Level::DEBUG, %path, "registering callback route");

        self.routes.insert(path, Route::Callback(Box::new(callback)));
        self
    }

    fn insert_static(&mut self, path: String, route: Route<C>) -> &mut Self {
        if let Some(Route::Callback(_)) = self.routes.get(&path) {
            event!(Level::DEBUG, %path, "route shadowed by callback, not registering");
            return self;
        }

        event!(Level::DEBUG, %path, "registering static route");
        self.routes.insert(path, route);
        self
    }

    pub fn get(&self, path: &str) -> Option<&Route<C>> {
        self.routes.get(path)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_: &mut Connection, _: &Request, _: &()) -> Result<(), Error> {
        Ok(())
    }

    #[test]
    fn last_registration_wins() {
        let mut routes = Routes::<()>::new();
        routes.page("/", "first").file("/", "second.html");

        match routes.get("/") {
            Some(Route::File { path, headers }) => {
                assert_eq!(path, &PathBuf::from("second.html"));
                assert!(headers.is_empty());
            }
            _ => panic!("expected file route"),
        }
        assert_eq!(routes.len(), 1);
    }

    #[test]
    fn callback_takes_precedence() {
        let mut routes = Routes::<()>::new();
        routes.page("/a", "before").callback("/a", noop);
        routes.callback("/b", noop).page("/b", "after");

        assert!(matches!(routes.get("/a"), Some(Route::Callback(_))));
        assert!(matches!(routes.get("/b"), Some(Route::Callback(_))));
    }

    #[test]
    fn paths_match_exactly() {
        let mut routes = Routes::<()>::new();
        routes.page_with_headers("/index.html", "hi", "Content-Type: text/html\r\n");

        assert!(routes.get("/index.html").is_some());
        assert!(routes.get("/index.html/").is_none());
        assert!(routes.get("/INDEX.html").is_none());
    }
}
