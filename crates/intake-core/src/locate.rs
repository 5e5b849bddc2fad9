//! Literal text -> page-space rectangle

use tracing::warn;

use crate::document::Page;
use crate::geometry::Rect;

/// First occurrence of `literal` on `page`, in the engine's reading order.
///
/// Blank literals resolve to `None` without querying the engine. Engine
/// failures are logged and also resolve to `None`.
pub fn locate(page: &Page<'_>, literal: &str) -> Option<Rect> {
    if literal.trim().is_empty() {
        return None;
    }

    match page.search(literal) {
        Ok(hits) => hits.into_iter().next(),
        Err(e) => {
            warn!(page = page.number(), error = %e, "text search failed");
            None
        }
    }
}
