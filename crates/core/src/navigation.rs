//! Page navigation and render request coalescing
//!
//! At most one render is in flight. While it runs, further requests replace
//! a single pending slot, so only the newest one is rendered next.

use crate::error::{EditorError, EditorResult};
use serde::{Deserialize, Serialize};

/// Page dimensions in PDF points
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

impl PageSize {
    /// Overlay extent in pixels at `scale`
    pub fn scaled(&self, scale: f32) -> (f32, f32) {
        (self.width * scale, self.height * scale)
    }
}

/// Rasterized page reported back by the rendering collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedPage {
    pub page: u32,
    pub width: u32,
    pub height: u32,
}

/// Errors raised by a [`PageSource`]
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PageSourceError {
    #[error("page {page} out of range (page_count={page_count})")]
    OutOfRange { page: u32, page_count: u32 },

    #[error("render failed: {0}")]
    Render(String),
}

/// Document rendering collaborator
pub trait PageSource {
    fn page_count(&self) -> u32;

    /// Size of a 1-based page
    fn page_size(&self, page: u32) -> Result<PageSize, PageSourceError>;

    fn render(&self, page: u32, scale: f32) -> Result<RenderedPage, PageSourceError>;
}

/// A render the host should perform
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RenderRequest {
    pub page: u32,
    pub scale: f32,
}

/// Current page plus in-flight and pending renders
#[derive(Debug, Clone, PartialEq)]
pub struct PageNavigator {
    current: u32,
    page_count: u32,
    in_flight: Option<RenderRequest>,
    pending: Option<RenderRequest>,
}

impl PageNavigator {
    /// Start on `start_page`, clamped into the document
    pub fn new(page_count: u32, start_page: u32) -> Self {
        Self {
            current: start_page.clamp(1, page_count.max(1)),
            page_count,
            in_flight: None,
            pending: None,
        }
    }

    pub fn current(&self) -> u32 {
        self.current
    }

    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    pub fn in_flight(&self) -> Option<RenderRequest> {
        self.in_flight
    }

    pub fn pending(&self) -> Option<RenderRequest> {
        self.pending
    }

    /// Make `page` current; `Ok(false)` when it already was
    pub fn go_to(&mut self, page: u32) -> EditorResult<bool> {
        if page == 0 || page > self.page_count {
            return Err(EditorError::PageOutOfRange { page, page_count: self.page_count });
        }
        if page == self.current {
            return Ok(false);
        }
        self.current = page;
        Ok(true)
    }

    /// Advance one page; `None` on the last page
    pub fn next(&mut self) -> Option<u32> {
        if self.current >= self.page_count {
            return None;
        }
        self.current += 1;
        Some(self.current)
    }

    /// Go back one page; `None` on the first page
    pub fn previous(&mut self) -> Option<u32> {
        if self.current <= 1 {
            return None;
        }
        self.current -= 1;
        Some(self.current)
    }

    /// Queue a render of `page`
    ///
    /// Returns the request to start now, or `None` when it was parked behind
    /// the one in flight (replacing any older pending request).
    pub fn request(&mut self, page: u32, scale: f32) -> Option<RenderRequest> {
        let request = RenderRequest { page, scale };
        if self.in_flight.is_some() {
            if let Some(replaced) = self.pending.replace(request) {
                tracing::debug!(dropped = replaced.page, page, "pending render superseded");
            }
            return None;
        }
        self.in_flight = Some(request);
        Some(request)
    }

    /// Mark the in-flight render finished and start the pending one, if any
    pub fn complete(&mut self) -> Option<RenderRequest> {
        self.in_flight = self.pending.take();
        self.in_flight
    }

    /// Drop all render bookkeeping
    pub fn cancel(&mut self) {
        self.in_flight = None;
        self.pending = None;
    }
}
