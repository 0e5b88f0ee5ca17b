//! Automation driver capability set
//!
//! The harness only talks to the page through these two traits. Any backend
//! that can navigate, locate a text field and read/write its value is enough:
//!
//! - [`playwright::PlaywrightDriver`] drives a real browser via a Node bridge
//! - [`simulated::SimulatedDriver`] is an in-process widget for dry runs and tests

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::HarnessResult;

pub mod playwright;
pub mod simulated;

/// Named keys the harness presses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Key {
    Space,
    Backspace,
}

impl Key {
    pub fn as_str(&self) -> &'static str {
        match self {
            Key::Space => "Space",
            Key::Backspace => "Backspace",
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A page the harness can steer
#[async_trait]
pub trait AutomationDriver: Send + Sync {
    /// Load `url` and wait until the page is usable
    async fn navigate(&self, url: &str) -> HarnessResult<()>;

    /// Resolve a text field by CSS selector
    async fn locate(&self, selector: &str) -> HarnessResult<Box<dyn FieldHandle>>;

    /// Release browser resources
    async fn shutdown(&self) -> HarnessResult<()> {
        Ok(())
    }
}

/// A remote text field
#[async_trait]
pub trait FieldHandle: Send + Sync {
    async fn wait_visible(&self, timeout: Duration) -> HarnessResult<()>;

    async fn focus(&self) -> HarnessResult<()>;

    async fn clear(&self) -> HarnessResult<()>;

    /// Replace the value in one operation. Does not fire input listeners.
    async fn set_value(&self, text: &str) -> HarnessResult<()>;

    /// Type a single character, waiting `delay` after the keystroke
    async fn type_char(&self, c: char, delay: Duration) -> HarnessResult<()>;

    async fn press_key(&self, key: Key) -> HarnessResult<()>;

    async fn current_value(&self) -> HarnessResult<String>;

    /// Fire a bubbling `input` event so listeners see a direct value change
    async fn dispatch_input_event(&self) -> HarnessResult<()>;
}
