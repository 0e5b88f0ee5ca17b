//! In-process transliteration widget
//!
//! Behaves like the remote converter closely enough to exercise every harness
//! path without a browser: completed words are converted from a lexicon after a
//! latency counted in value reads, conversion can be withheld from bulk input
//! events so only a nudge triggers it, and page loads can carry injected faults.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::trace;

use super::{AutomationDriver, FieldHandle, Key};
use crate::error::{HarnessError, HarnessResult};

const DEFAULT_LEXICON: &[(&str, &str)] = &[
    ("nalama", "நலமா"),
    ("poren", "போறேன்"),
    ("vilayaduren", "விளையாடுறேன்"),
    ("eppadi", "எப்படி"),
    ("enna", "என்ன"),
    ("daa", "டா"),
    ("thaanga", "தாங்க"),
    ("sairen", "செய்றேன்"),
    ("saiyamaten", "செய்யமாட்டேன்"),
    ("vilayaditen", "விளையாடினேன்"),
    ("irrukiren", "இருக்கிறேன்"),
    ("vilayaduven", "விளையாடுவேன்"),
    ("irruken", "இருக்கேன்"),
    ("veetuku", "வீட்டுக்கு"),
    ("vilayaduvom", "விளையாடுவோம்"),
    ("vaalthukal", "வாழ்த்துகள்"),
    ("naal", "நாள்"),
    ("nanba", "நண்பா"),
    ("sollren", "சொல்றேன்"),
    ("ithu", "இது"),
    ("sariya", "சரியா"),
    ("enakku", "எனக்கு"),
    ("neenga", "நீங்க"),
    ("maaten", "மாட்டேன்"),
    ("panringa", "பண்றீங்க"),
];

/// Faults applied to one page load (0-based, counted by `navigate`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PageFaults {
    /// `wait_visible` fails this many times; `u32::MAX` never shows the field
    pub invisible_checks: u32,
    /// The next N element interactions fail as detached
    pub stale_calls: u32,
    /// The field ignores every write, including clears
    pub frozen: bool,
    pub initial_value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatedConfig {
    pub selector: String,
    /// Latin word -> converted word
    pub lexicon: HashMap<String, String>,
    /// Value reads between a trigger and the conversion landing
    pub latency_reads: u32,
    /// Whether a synthetic input event triggers conversion
    pub convert_on_input_event: bool,
    /// Whether a typed or pressed space triggers conversion
    pub convert_on_keystroke: bool,
    /// Delimiter keystrokes ignored before the widget reacts
    pub ignored_keystrokes: u32,
    #[serde(with = "crate::policy::millis")]
    pub read_delay: Duration,
    pub faults: BTreeMap<usize, PageFaults>,
}

impl Default for SimulatedConfig {
    fn default() -> Self {
        Self {
            selector: "#transliterateTextarea".to_string(),
            lexicon: DEFAULT_LEXICON
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            latency_reads: 2,
            convert_on_input_event: true,
            convert_on_keystroke: true,
            ignored_keystrokes: 0,
            read_delay: Duration::ZERO,
            faults: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Default)]
struct FieldState {
    value: String,
    pending: Option<u32>,
    keystrokes_ignored: u32,
    faults: PageFaults,
    reads: u64,
}

/// Simulated page holding one transliteration textarea
pub struct SimulatedDriver {
    config: Arc<SimulatedConfig>,
    page_loads: AtomicUsize,
    field: Arc<Mutex<FieldState>>,
}

impl SimulatedDriver {
    pub fn new(config: SimulatedConfig) -> Self {
        Self {
            config: Arc::new(config),
            page_loads: AtomicUsize::new(0),
            field: Arc::new(Mutex::new(FieldState::default())),
        }
    }

    /// Number of `navigate` calls so far
    pub fn page_loads(&self) -> usize {
        self.page_loads.load(Ordering::SeqCst)
    }

    /// Total value reads on the current page
    pub fn reads(&self) -> u64 {
        self.field.lock().reads
    }
}

impl Default for SimulatedDriver {
    fn default() -> Self {
        Self::new(SimulatedConfig::default())
    }
}

#[async_trait]
impl AutomationDriver for SimulatedDriver {
    async fn navigate(&self, url: &str) -> HarnessResult<()> {
        let page = self.page_loads.fetch_add(1, Ordering::SeqCst);
        let faults = self.config.faults.get(&page).cloned().unwrap_or_default();
        trace!("simulated page load #{} for {}", page, url);

        let mut state = self.field.lock();
        *state = FieldState {
            value: faults.initial_value.clone(),
            faults,
            ..FieldState::default()
        };
        Ok(())
    }

    async fn locate(&self, selector: &str) -> HarnessResult<Box<dyn FieldHandle>> {
        if selector != self.config.selector {
            return Err(HarnessError::Acquisition(format!(
                "no element matches {}",
                selector
            )));
        }
        Ok(Box::new(SimulatedField {
            selector: selector.to_string(),
            config: Arc::clone(&self.config),
            state: Arc::clone(&self.field),
        }))
    }
}

struct SimulatedField {
    selector: String,
    config: Arc<SimulatedConfig>,
    state: Arc<Mutex<FieldState>>,
}

impl SimulatedField {
    /// Consume one stale fault, if any are left
    fn touch(&self, state: &mut FieldState) -> HarnessResult<()> {
        if state.faults.stale_calls > 0 {
            state.faults.stale_calls -= 1;
            return Err(HarnessError::Driver(format!(
                "element {} is not attached to the DOM",
                self.selector
            )));
        }
        Ok(())
    }

    fn schedule(&self, state: &mut FieldState) {
        if state.pending.is_none() {
            state.pending = Some(self.config.latency_reads);
        }
    }

    fn delimiter_typed(&self, state: &mut FieldState) {
        if !self.config.convert_on_keystroke {
            return;
        }
        if state.keystrokes_ignored < self.config.ignored_keystrokes {
            state.keystrokes_ignored += 1;
            return;
        }
        self.schedule(state);
    }
}

/// Convert every word that is followed by a space
fn convert(value: &str, lexicon: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(value.len());
    let mut word = String::new();
    for c in value.chars() {
        if c == ' ' {
            out.push_str(&convert_word(&word, lexicon));
            word.clear();
            out.push(c);
        } else {
            word.push(c);
        }
    }
    out.push_str(&word);
    out
}

fn convert_word(word: &str, lexicon: &HashMap<String, String>) -> String {
    let stem = word.trim_end_matches(['?', '!', '.', ',']);
    match lexicon.get(stem) {
        Some(converted) => format!("{}{}", converted, &word[stem.len()..]),
        None => word.to_string(),
    }
}

#[async_trait]
impl FieldHandle for SimulatedField {
    async fn wait_visible(&self, timeout: Duration) -> HarnessResult<()> {
        let mut state = self.state.lock();
        if state.faults.invisible_checks > 0 {
            if state.faults.invisible_checks != u32::MAX {
                state.faults.invisible_checks -= 1;
            }
            return Err(HarnessError::Acquisition(format!(
                "{} not visible after {} ms",
                self.selector,
                timeout.as_millis()
            )));
        }
        Ok(())
    }

    async fn focus(&self) -> HarnessResult<()> {
        let mut state = self.state.lock();
        self.touch(&mut state)
    }

    async fn clear(&self) -> HarnessResult<()> {
        let mut state = self.state.lock();
        self.touch(&mut state)?;
        if !state.faults.frozen {
            state.value.clear();
            state.pending = None;
        }
        Ok(())
    }

    async fn set_value(&self, text: &str) -> HarnessResult<()> {
        let mut state = self.state.lock();
        self.touch(&mut state)?;
        if !state.faults.frozen {
            state.value = text.to_string();
        }
        Ok(())
    }

    async fn type_char(&self, c: char, delay: Duration) -> HarnessResult<()> {
        {
            let mut state = self.state.lock();
            self.touch(&mut state)?;
            if !state.faults.frozen {
                state.value.push(c);
                if c == ' ' {
                    self.delimiter_typed(&mut state);
                }
            }
        }
        tokio::time::sleep(delay).await;
        Ok(())
    }

    async fn press_key(&self, key: Key) -> HarnessResult<()> {
        let mut state = self.state.lock();
        self.touch(&mut state)?;
        if state.faults.frozen {
            return Ok(());
        }
        match key {
            Key::Space => {
                state.value.push(' ');
                self.delimiter_typed(&mut state);
            }
            Key::Backspace => {
                state.value.pop();
            }
        }
        Ok(())
    }

    async fn current_value(&self) -> HarnessResult<String> {
        if !self.config.read_delay.is_zero() {
            tokio::time::sleep(self.config.read_delay).await;
        }
        let mut state = self.state.lock();
        state.reads += 1;
        match state.pending {
            Some(0) => {
                state.value = convert(&state.value, &self.config.lexicon);
                state.pending = None;
            }
            Some(n) => state.pending = Some(n - 1),
            None => {}
        }
        Ok(state.value.clone())
    }

    async fn dispatch_input_event(&self) -> HarnessResult<()> {
        let mut state = self.state.lock();
        self.touch(&mut state)?;
        if self.config.convert_on_input_event && !state.faults.frozen {
            self.schedule(&mut state);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::OutputClassifier;

    const SELECTOR: &str = "#transliterateTextarea";

    #[test]
    fn test_convert_only_completed_known_words() {
        let lexicon = SimulatedConfig::default().lexicon;
        assert_eq!(convert("nalama? ", &lexicon), "நலமா? ");
        assert_eq!(convert("xyz123abc ", &lexicon), "xyz123abc ");
        // trailing word without delimiter is still being typed
        assert_eq!(convert("enna nalama", &lexicon), "என்ன nalama");
    }

    #[tokio::test(start_paused = true)]
    async fn test_conversion_lands_after_latency() {
        let driver = SimulatedDriver::new(SimulatedConfig {
            latency_reads: 2,
            ..Default::default()
        });
        driver.navigate("sim://").await.unwrap();
        let field = driver.locate(SELECTOR).await.unwrap();

        for c in "nalama? ".chars() {
            field.type_char(c, Duration::from_millis(50)).await.unwrap();
        }
        assert_eq!(field.current_value().await.unwrap(), "nalama? ");
        assert_eq!(field.current_value().await.unwrap(), "nalama? ");
        let converted = field.current_value().await.unwrap();
        assert!(OutputClassifier::default().classify(&converted));
    }

    #[tokio::test]
    async fn test_unknown_selector_is_acquisition_error() {
        let driver = SimulatedDriver::default();
        let err = driver.locate("#missing").await.err().unwrap();
        assert!(matches!(err, HarnessError::Acquisition(_)));
    }

    #[tokio::test]
    async fn test_faults_apply_per_page_load() {
        let mut faults = BTreeMap::new();
        faults.insert(
            1,
            PageFaults {
                invisible_checks: 1,
                stale_calls: 1,
                ..Default::default()
            },
        );
        let driver = SimulatedDriver::new(SimulatedConfig {
            faults,
            ..Default::default()
        });

        driver.navigate("sim://").await.unwrap();
        let field = driver.locate(SELECTOR).await.unwrap();
        field.wait_visible(Duration::from_secs(1)).await.unwrap();

        driver.navigate("sim://").await.unwrap();
        assert!(field.wait_visible(Duration::from_secs(1)).await.is_err());
        field.wait_visible(Duration::from_secs(1)).await.unwrap();
        assert!(matches!(field.focus().await, Err(HarnessError::Driver(_))));
        field.focus().await.unwrap();
        assert_eq!(driver.page_loads(), 2);
    }

    #[tokio::test]
    async fn test_bulk_event_withheld_until_keystroke() {
        let driver = SimulatedDriver::new(SimulatedConfig {
            latency_reads: 0,
            convert_on_input_event: false,
            ..Default::default()
        });
        driver.navigate("sim://").await.unwrap();
        let field = driver.locate(SELECTOR).await.unwrap();

        field.set_value("ithu sariya? ").await.unwrap();
        field.dispatch_input_event().await.unwrap();
        assert_eq!(field.current_value().await.unwrap(), "ithu sariya? ");

        field.press_key(Key::Space).await.unwrap();
        field.press_key(Key::Backspace).await.unwrap();
        assert_eq!(field.current_value().await.unwrap(), "இது சரியா? ");
    }
}
