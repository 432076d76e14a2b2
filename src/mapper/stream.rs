// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Marker-gated stream buffer for user-facing text.
//!
//! Text deltas arriving before the user-message marker are control-field
//! content and must never reach a user-facing stream. The gate accumulates
//! deltas until the marker appears in the buffer, then releases everything
//! after it: leading whitespace is trimmed until the first non-empty release,
//! and every later delta passes through verbatim.
//!
//! This is the only buffering point in the pipeline; everything downstream
//! observes chunks in production order.

use super::USER_MESSAGE_MARKER;

/// Marker-gated accumulator over streamed text deltas.
#[derive(Debug)]
pub struct MarkerGate {
    marker: String,
    /// Withheld text, only populated before the marker is seen.
    buffer: String,
    /// Marker observed; subsequent deltas stream through.
    released: bool,
    /// A non-empty chunk has been released; stop trimming.
    emitted_any: bool,
}

impl MarkerGate {
    /// Create a gate for the standard user-message marker.
    pub fn new() -> Self {
        Self::with_marker(USER_MESSAGE_MARKER)
    }

    /// Create a gate for a custom marker.
    pub fn with_marker(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
            buffer: String::new(),
            released: false,
            emitted_any: false,
        }
    }

    /// Push a text delta; returns the chunk to surface, if any.
    ///
    /// Never returns an empty string: pre-marker deltas and releases that
    /// trim to nothing yield `None`.
    pub fn push_delta(&mut self, delta: &str) -> Option<String> {
        if self.released {
            if self.emitted_any {
                if delta.is_empty() {
                    return None;
                }
                return Some(delta.to_string());
            }
            let trimmed = delta.trim_start();
            if trimmed.is_empty() {
                return None;
            }
            self.emitted_any = true;
            return Some(trimmed.to_string());
        }

        self.buffer.push_str(delta);
        let marker_index = self.buffer.find(&self.marker)?;

        self.released = true;
        let after = self.buffer[marker_index + self.marker.len()..].trim_start();
        let chunk = if after.is_empty() {
            None
        } else {
            self.emitted_any = true;
            Some(after.to_string())
        };
        self.buffer.clear();
        chunk
    }

    /// Whether the marker has been observed.
    pub fn has_released(&self) -> bool {
        self.released
    }

    /// The withheld pre-marker text.
    pub fn buffered(&self) -> &str {
        &self.buffer
    }

    /// Drain the gate at end of stream.
    ///
    /// If the marker never appeared the whole withheld text is returned
    /// verbatim (a markerless response is entirely user-visible).
    pub fn finalize_and_drain(&mut self) -> Option<String> {
        if self.released || self.buffer.is_empty() {
            self.reset();
            return None;
        }
        let text = std::mem::take(&mut self.buffer);
        self.reset();
        Some(text)
    }

    /// Reset the gate for a new response.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.released = false;
        self.emitted_any = false;
    }
}

impl Default for MarkerGate {
    fn default() -> Self {
        Self::new()
    }
}
